//! Culling statistics.

use crate::frame::FrameCounters;

/// Counters maintained by the culling pipeline and frame cycle.
///
/// The visible count is not part of this: on a real device it is never
/// read back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CullingStats {
    /// Instances uploaded for the current scene.
    pub total_instances: u32,
    /// Frames recorded by the culling pipeline and not dropped.
    pub frames_recorded: u64,
    /// Culling dispatches in submitted frames.
    pub dispatches: u64,
    /// Frames recorded while frozen.
    pub frames_frozen: u64,
    /// Frames dropped because the target went stale while recording.
    pub frames_dropped: u64,
    /// Output image set rebuilds.
    pub surface_rebuilds: u64,
}

impl CullingStats {
    /// Fraction of recorded frames that dispatched the cull.
    #[must_use]
    pub fn dispatch_ratio(&self) -> f32 {
        if self.frames_recorded > 0 {
            self.dispatches as f32 / self.frames_recorded as f32
        } else {
            0.0
        }
    }

    /// Fills the frame-cycle counters the pipeline cannot see.
    #[must_use]
    pub const fn with_cycle(mut self, counters: &FrameCounters) -> Self {
        self.frames_dropped = counters.dropped;
        self.surface_rebuilds = counters.rebuilds;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_ratio() {
        let stats = CullingStats {
            frames_recorded: 4,
            dispatches: 3,
            frames_frozen: 1,
            ..Default::default()
        };
        assert!((stats.dispatch_ratio() - 0.75).abs() < f32::EPSILON);
        assert_eq!(CullingStats::default().dispatch_ratio(), 0.0);
    }
}
