//! Frame submission.

pub mod cycle;

pub use cycle::{Acquire, Frame, FrameCounters, FrameCycle, FrameStatus, FrameTarget, SlotState};
