//! Bounded frames in flight.
//!
//! Each frame slot moves `Idle → Recording → Submitted → Idle`. Slots are
//! used round-robin; reusing a slot waits on the fence of its previous
//! submission, which is the only place the host blocks on the device.

use crate::commands::CommandList;
use crate::error::{RenderError, RenderResult};
use tracing::{debug, trace, warn};

/// Result of acquiring an output image.
#[derive(Debug)]
pub enum Acquire<I> {
    /// An image to render into.
    Image(I),
    /// The image set no longer matches the target; rebuild before use.
    Stale,
}

/// Render target plus device queue driven by [`FrameCycle`].
pub trait FrameTarget {
    /// Output image handed out by `acquire`.
    type Image;
    /// Completion handle of one submission.
    type Fence;

    /// Acquires the next output image.
    ///
    /// # Errors
    ///
    /// Unrecoverable surface or device failures.
    fn acquire(&mut self) -> RenderResult<Acquire<Self::Image>>;

    /// Executes `commands` into `image`, presents it and returns a fence
    /// that signals when the device is done with the slot's resources.
    ///
    /// # Errors
    ///
    /// Invalid command lists or device failures.
    fn submit(&mut self, image: Self::Image, commands: &CommandList) -> RenderResult<Self::Fence>;

    /// Blocks until `fence` signals.
    ///
    /// # Errors
    ///
    /// Device loss.
    fn wait(&mut self, fence: Self::Fence) -> RenderResult<()>;

    /// Non-blocking fence check.
    fn is_signaled(&mut self, fence: &Self::Fence) -> bool;

    /// Recreates the output image set after staleness.
    ///
    /// # Errors
    ///
    /// Unrecoverable surface failures.
    fn rebuild(&mut self) -> RenderResult<()>;

    /// Output size in pixels.
    fn extent(&self) -> (u32, u32);
}

/// State of one frame slot.
#[derive(Debug)]
pub enum SlotState<F> {
    /// Free to record.
    Idle,
    /// Handed out by `begin_frame`.
    Recording,
    /// Submitted; the fence signals on completion.
    Submitted(F),
}

/// A frame being recorded.
#[derive(Debug)]
pub struct Frame<I> {
    slot: usize,
    image: I,
    commands: CommandList,
}

impl<I> Frame<I> {
    /// Frame slot index; selects the per-slot uniforms.
    #[must_use]
    pub const fn slot(&self) -> usize {
        self.slot
    }

    /// The acquired output image.
    #[must_use]
    pub const fn image(&self) -> &I {
        &self.image
    }

    /// Command list to record into.
    pub fn commands_mut(&mut self) -> &mut CommandList {
        &mut self.commands
    }

    /// Recorded commands.
    #[must_use]
    pub const fn commands(&self) -> &CommandList {
        &self.commands
    }
}

/// What `end_frame` did with the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    /// Submitted and presented.
    Presented,
    /// Dropped unsubmitted because the target went stale while recording.
    Dropped,
}

/// Counters kept by the cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameCounters {
    /// Frames submitted.
    pub submitted: u64,
    /// Frames dropped during recording.
    pub dropped: u64,
    /// Target rebuilds.
    pub rebuilds: u64,
    /// Fence waits that actually blocked on an unsignaled fence.
    pub blocking_waits: u64,
}

/// Round-robin frame slots over a [`FrameTarget`].
pub struct FrameCycle<T: FrameTarget> {
    target: T,
    slots: Vec<SlotState<T::Fence>>,
    lists: Vec<CommandList>,
    next: usize,
    stale: bool,
    counters: FrameCounters,
}

impl<T: FrameTarget> FrameCycle<T> {
    /// Creates a cycle with `frames_in_flight` slots.
    ///
    /// # Errors
    ///
    /// `Setup` if `frames_in_flight` is zero.
    pub fn new(target: T, frames_in_flight: usize) -> RenderResult<Self> {
        if frames_in_flight == 0 {
            return Err(RenderError::Setup("frames in flight must be at least 1".into()));
        }
        Ok(Self {
            target,
            slots: (0..frames_in_flight).map(|_| SlotState::Idle).collect(),
            lists: (0..frames_in_flight).map(CommandList::new).collect(),
            next: 0,
            stale: false,
            counters: FrameCounters::default(),
        })
    }

    /// Number of slots.
    #[must_use]
    pub fn frames_in_flight(&self) -> usize {
        self.slots.len()
    }

    /// The target.
    #[must_use]
    pub const fn target(&self) -> &T {
        &self.target
    }

    /// The target, mutably (uniform writes, scene upload).
    pub fn target_mut(&mut self) -> &mut T {
        &mut self.target
    }

    /// Slot states, for inspection.
    #[must_use]
    pub fn slots(&self) -> &[SlotState<T::Fence>] {
        &self.slots
    }

    /// Number of slots currently `Submitted`.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| matches!(s, SlotState::Submitted(_)))
            .count()
    }

    /// True while a frame is being recorded.
    #[must_use]
    pub fn is_recording(&self) -> bool {
        self.slots.iter().any(|s| matches!(s, SlotState::Recording))
    }

    /// Counters so far.
    #[must_use]
    pub const fn counters(&self) -> FrameCounters {
        self.counters
    }

    /// Starts the next frame.
    ///
    /// Returns `Ok(None)` when the target was stale; the image set has been
    /// rebuilt and the caller simply tries again next frame.
    ///
    /// # Errors
    ///
    /// `FrameOutOfOrder` if a frame is already recording, or target errors.
    pub fn begin_frame(&mut self) -> RenderResult<Option<Frame<T::Image>>> {
        if self.is_recording() {
            return Err(RenderError::FrameOutOfOrder("begin_frame while recording"));
        }

        let slot = self.next;
        self.retire(slot)?;

        if self.stale {
            self.rebuild()?;
            return Ok(None);
        }

        let image = match self.target.acquire()? {
            Acquire::Image(image) => image,
            Acquire::Stale => {
                warn!("output images stale at acquire");
                self.rebuild()?;
                return Ok(None);
            }
        };

        self.slots[slot] = SlotState::Recording;
        self.next = (slot + 1) % self.slots.len();
        let mut commands = std::mem::take(&mut self.lists[slot]);
        commands.reset(slot);
        trace!(slot, "frame recording");

        Ok(Some(Frame {
            slot,
            image,
            commands,
        }))
    }

    /// Finishes a frame: submit and present, or drop it if the target went
    /// stale while it was recorded.
    ///
    /// # Errors
    ///
    /// `FrameOutOfOrder` for a frame that is not recording, or target
    /// errors.
    pub fn end_frame(&mut self, frame: Frame<T::Image>) -> RenderResult<FrameStatus> {
        let Frame {
            slot,
            image,
            commands,
        } = frame;

        match self.slots.get(slot) {
            Some(SlotState::Recording) => {}
            Some(_) => return Err(RenderError::FrameOutOfOrder("end_frame without begin_frame")),
            None => {
                return Err(RenderError::InvalidFrameSlot {
                    slot,
                    frames: self.slots.len(),
                })
            }
        }

        if self.stale {
            debug!(slot, "dropping frame recorded against stale target");
            drop(image);
            self.lists[slot] = commands;
            self.slots[slot] = SlotState::Idle;
            self.counters.dropped += 1;
            self.rebuild()?;
            return Ok(FrameStatus::Dropped);
        }

        let submitted = self.target.submit(image, &commands);
        self.lists[slot] = commands;
        match submitted {
            Ok(fence) => {
                self.slots[slot] = SlotState::Submitted(fence);
                self.counters.submitted += 1;
                Ok(FrameStatus::Presented)
            }
            Err(err) => {
                self.slots[slot] = SlotState::Idle;
                Err(err)
            }
        }
    }

    /// Moves every slot whose fence has signaled back to `Idle`.
    pub fn poll(&mut self) {
        for slot in &mut self.slots {
            if let SlotState::Submitted(fence) = slot {
                if self.target.is_signaled(fence) {
                    *slot = SlotState::Idle;
                }
            }
        }
    }

    /// Marks the target stale (resize, invalidation).
    pub fn mark_stale(&mut self) {
        self.stale = true;
    }

    /// True if a rebuild is pending.
    #[must_use]
    pub const fn is_stale(&self) -> bool {
        self.stale
    }

    /// Blocks until every submitted slot has retired.
    ///
    /// # Errors
    ///
    /// `FrameOutOfOrder` while a frame is recording, or device loss.
    pub fn wait_idle(&mut self) -> RenderResult<()> {
        if self.is_recording() {
            return Err(RenderError::FrameOutOfOrder("wait_idle while recording"));
        }
        for slot in 0..self.slots.len() {
            self.retire(slot)?;
        }
        Ok(())
    }

    /// Consumes the cycle after waiting for all work, returning the target.
    ///
    /// # Errors
    ///
    /// As [`Self::wait_idle`].
    pub fn into_target(mut self) -> RenderResult<T> {
        self.wait_idle()?;
        Ok(self.target)
    }

    fn retire(&mut self, slot: usize) -> RenderResult<()> {
        if let SlotState::Submitted(fence) = std::mem::replace(&mut self.slots[slot], SlotState::Idle) {
            if !self.target.is_signaled(&fence) {
                self.counters.blocking_waits += 1;
                trace!(slot, "waiting on frame fence");
            }
            self.target.wait(fence)?;
        }
        Ok(())
    }

    fn rebuild(&mut self) -> RenderResult<()> {
        self.target.rebuild()?;
        self.stale = false;
        self.counters.rebuilds += 1;
        debug!(rebuilds = self.counters.rebuilds, "output images rebuilt");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    /// Fences only signal when a test flips them.
    struct MockTarget {
        stale_next_acquire: bool,
        rebuilds: u32,
        submitted: Vec<usize>,
        outstanding: Rc<Cell<usize>>,
    }

    struct MockFence {
        signaled: bool,
        outstanding: Rc<Cell<usize>>,
    }

    impl MockTarget {
        fn new() -> Self {
            Self {
                stale_next_acquire: false,
                rebuilds: 0,
                submitted: Vec::new(),
                outstanding: Rc::new(Cell::new(0)),
            }
        }
    }

    impl FrameTarget for MockTarget {
        type Image = u32;
        type Fence = MockFence;

        fn acquire(&mut self) -> RenderResult<Acquire<u32>> {
            if std::mem::take(&mut self.stale_next_acquire) {
                return Ok(Acquire::Stale);
            }
            Ok(Acquire::Image(7))
        }

        fn submit(&mut self, _image: u32, commands: &CommandList) -> RenderResult<MockFence> {
            self.submitted.push(commands.slot());
            self.outstanding.set(self.outstanding.get() + 1);
            Ok(MockFence {
                signaled: false,
                outstanding: Rc::clone(&self.outstanding),
            })
        }

        fn wait(&mut self, fence: MockFence) -> RenderResult<()> {
            fence.outstanding.set(fence.outstanding.get() - 1);
            Ok(())
        }

        fn is_signaled(&mut self, fence: &MockFence) -> bool {
            fence.signaled
        }

        fn rebuild(&mut self) -> RenderResult<()> {
            self.rebuilds += 1;
            Ok(())
        }

        fn extent(&self) -> (u32, u32) {
            (640, 480)
        }
    }

    #[test]
    fn test_zero_slots_rejected() {
        assert!(FrameCycle::new(MockTarget::new(), 0).is_err());
    }

    #[test]
    fn test_slots_round_robin_and_bounded() {
        let mut cycle = FrameCycle::new(MockTarget::new(), 2).unwrap();
        for _ in 0..5 {
            let frame = cycle.begin_frame().unwrap().unwrap();
            assert!(cycle.in_flight() <= 1);
            assert_eq!(cycle.end_frame(frame).unwrap(), FrameStatus::Presented);
            assert!(cycle.in_flight() <= 2);
            assert!(cycle.target().outstanding.get() <= 2);
        }
        assert_eq!(cycle.target().submitted, vec![0, 1, 0, 1, 0]);
        assert_eq!(cycle.counters().blocking_waits, 3);

        cycle.wait_idle().unwrap();
        assert_eq!(cycle.in_flight(), 0);
        assert_eq!(cycle.target().outstanding.get(), 0);
    }

    #[test]
    fn test_stale_at_acquire_returns_no_frame() {
        let mut cycle = FrameCycle::new(MockTarget::new(), 2).unwrap();
        cycle.target_mut().stale_next_acquire = true;

        assert!(cycle.begin_frame().unwrap().is_none());
        assert_eq!(cycle.target().rebuilds, 1);

        let frame = cycle.begin_frame().unwrap().unwrap();
        assert_eq!(frame.slot(), 0);
    }

    #[test]
    fn test_stale_while_recording_drops_frame() {
        let mut cycle = FrameCycle::new(MockTarget::new(), 2).unwrap();
        let frame = cycle.begin_frame().unwrap().unwrap();
        cycle.mark_stale();

        assert_eq!(cycle.end_frame(frame).unwrap(), FrameStatus::Dropped);
        assert!(cycle.target().submitted.is_empty());
        assert_eq!(cycle.target().rebuilds, 1);
        assert!(!cycle.is_stale());
        assert!(matches!(cycle.slots()[0], SlotState::Idle));
        assert_eq!(cycle.counters().dropped, 1);
    }

    #[test]
    fn test_single_recording_frame() {
        let mut cycle = FrameCycle::new(MockTarget::new(), 3).unwrap();
        let frame = cycle.begin_frame().unwrap().unwrap();
        assert!(matches!(
            cycle.begin_frame(),
            Err(RenderError::FrameOutOfOrder(_))
        ));
        assert!(cycle.wait_idle().is_err());
        cycle.end_frame(frame).unwrap();
    }

    #[test]
    fn test_poll_retires_signaled_slots() {
        let mut cycle = FrameCycle::new(MockTarget::new(), 2).unwrap();
        let frame = cycle.begin_frame().unwrap().unwrap();
        cycle.end_frame(frame).unwrap();

        if let SlotState::Submitted(fence) = &mut cycle.slots[0] {
            fence.signaled = true;
        }
        cycle.poll();
        assert_eq!(cycle.in_flight(), 0);
    }
}
