//! Per-frame input context.
//!
//! The window layer feeds raw events into an [`InputAccumulator`]; once per
//! frame it is drained into an immutable [`FrameInput`] that is handed to the
//! active scene. Nothing here is global.

/// Mouse button.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    /// Left mouse button.
    Left,
    /// Right mouse button.
    Right,
    /// Middle mouse button (scroll wheel click).
    Middle,
}

/// Keys the demo reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    /// Move forward.
    W,
    /// Strafe left.
    A,
    /// Move backward.
    S,
    /// Strafe right.
    D,
    /// Toggle culling freeze.
    F,
    /// Move up.
    Space,
    /// Move down.
    LeftShift,
    /// Toggle camera mode.
    Tab,
    /// Exit.
    Escape,
}

/// Snapshot of input for one frame.
#[derive(Debug, Clone, Default)]
pub struct FrameInput {
    keys_down: Vec<Key>,
    keys_pressed: Vec<Key>,
    buttons_down: u8,
    /// Mouse movement since the previous frame; `+y` is up.
    pub mouse_delta: (f32, f32),
    /// Vertical scroll since the previous frame; `+` is away from the user.
    pub scroll_delta: f32,
}

impl FrameInput {
    /// Returns true if the key is currently held.
    #[must_use]
    pub fn key_held(&self, key: Key) -> bool {
        self.keys_down.contains(&key)
    }

    /// Returns true if the key went down during this frame.
    #[must_use]
    pub fn key_pressed(&self, key: Key) -> bool {
        self.keys_pressed.contains(&key)
    }

    /// Returns true if the mouse button is currently held.
    #[must_use]
    pub fn mouse_down(&self, button: MouseButton) -> bool {
        (self.buttons_down & button_mask(button)) != 0
    }
}

/// Collects window events between frames.
#[derive(Debug, Default)]
pub struct InputAccumulator {
    keys_down: Vec<Key>,
    keys_pressed: Vec<Key>,
    buttons_down: u8,
    mouse_delta: (f32, f32),
    scroll_delta: f32,
}

impl InputAccumulator {
    /// Creates an empty accumulator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a key press. Auto-repeat presses are ignored.
    pub fn key_down(&mut self, key: Key) {
        if !self.keys_down.contains(&key) {
            self.keys_pressed.push(key);
            self.keys_down.push(key);
        }
    }

    /// Records a key release.
    pub fn key_up(&mut self, key: Key) {
        self.keys_down.retain(|&k| k != key);
    }

    /// Records a mouse button press.
    pub fn mouse_button_down(&mut self, button: MouseButton) {
        self.buttons_down |= button_mask(button);
    }

    /// Records a mouse button release.
    pub fn mouse_button_up(&mut self, button: MouseButton) {
        self.buttons_down &= !button_mask(button);
    }

    /// Records raw mouse motion in window coordinates (`+y` is down).
    pub fn mouse_motion(&mut self, dx: f32, dy: f32) {
        self.mouse_delta.0 += dx;
        self.mouse_delta.1 -= dy;
    }

    /// Records vertical scroll.
    pub fn scroll(&mut self, dy: f32) {
        self.scroll_delta += dy;
    }

    /// Releases everything, e.g. when the window loses focus.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Produces this frame's snapshot and resets the per-frame deltas.
    /// Held keys and buttons carry over.
    pub fn end_frame(&mut self) -> FrameInput {
        FrameInput {
            keys_down: self.keys_down.clone(),
            keys_pressed: std::mem::take(&mut self.keys_pressed),
            buttons_down: self.buttons_down,
            mouse_delta: std::mem::take(&mut self.mouse_delta),
            scroll_delta: std::mem::take(&mut self.scroll_delta),
        }
    }
}

const fn button_mask(button: MouseButton) -> u8 {
    match button {
        MouseButton::Left => 1,
        MouseButton::Right => 2,
        MouseButton::Middle => 4,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_press_is_single_frame() {
        let mut acc = InputAccumulator::new();
        acc.key_down(Key::F);
        acc.key_down(Key::F);

        let first = acc.end_frame();
        assert!(first.key_pressed(Key::F));
        assert!(first.key_held(Key::F));

        let second = acc.end_frame();
        assert!(!second.key_pressed(Key::F));
        assert!(second.key_held(Key::F));

        acc.key_up(Key::F);
        assert!(!acc.end_frame().key_held(Key::F));
    }

    #[test]
    fn test_deltas_reset_each_frame() {
        let mut acc = InputAccumulator::new();
        acc.mouse_motion(3.0, 4.0);
        acc.mouse_motion(1.0, 1.0);
        acc.scroll(2.0);

        let frame = acc.end_frame();
        assert_eq!(frame.mouse_delta, (4.0, -5.0));
        assert_eq!(frame.scroll_delta, 2.0);

        let next = acc.end_frame();
        assert_eq!(next.mouse_delta, (0.0, 0.0));
        assert_eq!(next.scroll_delta, 0.0);
    }

    #[test]
    fn test_mouse_buttons() {
        let mut acc = InputAccumulator::new();
        acc.mouse_button_down(MouseButton::Right);
        assert!(acc.end_frame().mouse_down(MouseButton::Right));
        acc.mouse_button_up(MouseButton::Right);
        let frame = acc.end_frame();
        assert!(!frame.mouse_down(MouseButton::Right));
        assert!(!frame.mouse_down(MouseButton::Left));
    }
}
