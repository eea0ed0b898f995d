//! Window loop: winit events in, one culled frame per redraw out.

use crate::config::DemoConfig;
use crate::error::{AppError, AppResult};
use crate::scene::{InstancingScene, SceneManager};
use frustra_core::{InputAccumulator, Key, MouseButton};
use frustra_rendering::{FrameCycle, FrameStatus, FrameTarget, WgpuRenderer};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};
use winit::{
    dpi::PhysicalSize,
    event::{DeviceEvent, ElementState, Event, KeyEvent, MouseScrollDelta, WindowEvent},
    event_loop::{ControlFlow, EventLoop, EventLoopWindowTarget},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowBuilder},
};

const STATUS_INTERVAL: Duration = Duration::from_secs(2);
const MAX_FRAME_TIME: f32 = 0.1;
/// Pixels of trackpad scroll per wheel line.
const PIXELS_PER_LINE: f32 = 20.0;

fn map_key(code: KeyCode) -> Option<Key> {
    Some(match code {
        KeyCode::KeyW => Key::W,
        KeyCode::KeyA => Key::A,
        KeyCode::KeyS => Key::S,
        KeyCode::KeyD => Key::D,
        KeyCode::KeyF => Key::F,
        KeyCode::Space => Key::Space,
        KeyCode::ShiftLeft | KeyCode::ShiftRight => Key::LeftShift,
        KeyCode::Tab => Key::Tab,
        KeyCode::Escape => Key::Escape,
        _ => return None,
    })
}

fn map_button(button: winit::event::MouseButton) -> Option<MouseButton> {
    match button {
        winit::event::MouseButton::Left => Some(MouseButton::Left),
        winit::event::MouseButton::Right => Some(MouseButton::Right),
        winit::event::MouseButton::Middle => Some(MouseButton::Middle),
        _ => None,
    }
}

struct DemoApp {
    window: Arc<Window>,
    cycle: FrameCycle<WgpuRenderer>,
    scenes: SceneManager<WgpuRenderer>,
    input: InputAccumulator,
    last_frame: Instant,
    last_status: Instant,
    frames_since_status: u32,
    failure: Option<AppError>,
}

impl DemoApp {
    fn redraw(&mut self) -> AppResult<()> {
        let now = Instant::now();
        let dt = (now - self.last_frame).as_secs_f32().min(MAX_FRAME_TIME);
        self.last_frame = now;

        self.scenes.process_pending_switch(&mut self.cycle)?;
        let input = self.input.end_frame();
        self.scenes.update(&input, dt);

        let Some(mut frame) = self.cycle.begin_frame()? else {
            return Ok(());
        };
        let (width, height) = self.cycle.target().extent();
        let aspect = width as f32 / height.max(1) as f32;
        self.scenes.record(self.cycle.target_mut(), &mut frame, aspect)?;
        if self.cycle.end_frame(frame)? == FrameStatus::Dropped {
            self.scenes.frame_dropped();
        }
        self.cycle.poll();

        self.frames_since_status += 1;
        let elapsed = now - self.last_status;
        if elapsed >= STATUS_INTERVAL {
            self.log_status(elapsed);
            self.last_status = now;
            self.frames_since_status = 0;
        }
        Ok(())
    }

    fn log_status(&self, elapsed: Duration) {
        let fps = self.frames_since_status as f32 / elapsed.as_secs_f32();
        let counters = self.cycle.counters();
        let (frozen, instances) = self.scenes.current().map_or((false, 0), |scene| {
            (
                scene.is_frozen(),
                scene.stats().map_or(0, |s| s.total_instances),
            )
        });
        info!(
            "FPS: {:.0} | instances: {} | culling {} | dropped: {} | rebuilds: {}",
            fps,
            instances,
            if frozen { "frozen" } else { "live" },
            counters.dropped,
            counters.rebuilds
        );
    }

    fn handle_window_event(&mut self, event: WindowEvent, elwt: &EventLoopWindowTarget<()>) {
        match event {
            WindowEvent::CloseRequested => elwt.exit(),
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(code),
                        state,
                        repeat: false,
                        ..
                    },
                ..
            } => {
                let Some(key) = map_key(code) else {
                    return;
                };
                match state {
                    ElementState::Pressed if key == Key::Escape => elwt.exit(),
                    ElementState::Pressed => self.input.key_down(key),
                    ElementState::Released => self.input.key_up(key),
                }
            }
            WindowEvent::MouseInput { button, state, .. } => {
                if let Some(button) = map_button(button) {
                    match state {
                        ElementState::Pressed => self.input.mouse_button_down(button),
                        ElementState::Released => self.input.mouse_button_up(button),
                    }
                }
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let lines = match delta {
                    MouseScrollDelta::LineDelta(_, y) => y,
                    MouseScrollDelta::PixelDelta(position) => position.y as f32 / PIXELS_PER_LINE,
                };
                self.input.scroll(lines);
            }
            WindowEvent::Focused(false) => self.input.clear(),
            WindowEvent::Resized(size) => {
                if size.width > 0 && size.height > 0 {
                    self.cycle.target_mut().resize(size.width, size.height);
                    self.cycle.mark_stale();
                }
            }
            WindowEvent::RedrawRequested => {
                if let Err(e) = self.redraw() {
                    error!("frame failed: {}", e);
                    self.failure = Some(e);
                    elwt.exit();
                }
            }
            _ => {}
        }
    }
}

/// Opens the window and runs the demo until it is closed.
///
/// # Errors
///
/// `Window` if the event loop, window or surface cannot be created; render
/// and scene errors raised while running.
pub fn run(config: &DemoConfig) -> AppResult<()> {
    let event_loop = EventLoop::new().map_err(|e| AppError::Window(e.to_string()))?;
    let window = Arc::new(
        WindowBuilder::new()
            .with_title(config.window.title.as_str())
            .with_inner_size(PhysicalSize::new(config.window.width, config.window.height))
            .build(&event_loop)
            .map_err(|e| AppError::Window(e.to_string()))?,
    );

    let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        ..Default::default()
    });
    let surface = instance
        .create_surface(Arc::clone(&window))
        .map_err(|e| AppError::Window(e.to_string()))?;

    let size = window.inner_size();
    let mut renderer =
        pollster::block_on(WgpuRenderer::new(&instance, surface, size.width, size.height))?;
    let [r, g, b] = config.window.clear_color;
    renderer.set_clear_color(wgpu::Color { r, g, b, a: 1.0 });
    let cycle = FrameCycle::new(renderer, config.culling.frames_in_flight)?;

    let mut scenes = SceneManager::new();
    scenes.add_scene(Box::new(InstancingScene::new(config)));

    info!(
        "Scenes: {}",
        scenes.scene_names().collect::<Vec<_>>().join(", ")
    );
    info!("Controls: WASD/Space/Shift move | RMB look | wheel zoom | Tab orbit | F freeze | Esc quit");

    let now = Instant::now();
    let mut app = DemoApp {
        window,
        cycle,
        scenes,
        input: InputAccumulator::new(),
        last_frame: now,
        last_status: now,
        frames_since_status: 0,
        failure: None,
    };

    event_loop
        .run(|event, elwt| {
            elwt.set_control_flow(ControlFlow::Poll);
            match event {
                Event::WindowEvent { event, window_id } if window_id == app.window.id() => {
                    app.handle_window_event(event, elwt);
                }
                Event::DeviceEvent {
                    event: DeviceEvent::MouseMotion { delta },
                    ..
                } => app.input.mouse_motion(delta.0 as f32, delta.1 as f32),
                Event::AboutToWait => app.window.request_redraw(),
                Event::LoopExiting => {
                    if let Err(e) = app.scenes.shutdown(&mut app.cycle) {
                        warn!("shutdown: {}", e);
                    }
                }
                _ => {}
            }
        })
        .map_err(|e| AppError::Window(e.to_string()))?;

    app.failure.map_or(Ok(()), Err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_mapping() {
        assert_eq!(map_key(KeyCode::KeyF), Some(Key::F));
        assert_eq!(map_key(KeyCode::ShiftRight), Some(Key::LeftShift));
        assert_eq!(map_key(KeyCode::KeyQ), None);
        assert_eq!(
            map_button(winit::event::MouseButton::Right),
            Some(MouseButton::Right)
        );
        assert_eq!(map_button(winit::event::MouseButton::Back), None);
    }
}
