//! Barrier validation.
//!
//! Tracks, per resource, the stage of the last write and the set of stages
//! a barrier has made that write visible to. Any access from a different
//! stage that is not in the visible set is a hazard. A submission boundary
//! is a full memory dependency, so tracking starts clean for every list.

use crate::commands::{Access, CommandList, GpuCommand, ResourceId, Stage};
use crate::error::HazardError;

#[derive(Debug, Clone, Copy, Default)]
struct ResourceState {
    last_write: Option<Stage>,
    visible_to: u8,
}

/// Validates the barrier sequencing of a command list.
#[derive(Debug, Default)]
pub struct HazardTracker {
    resources: [ResourceState; ResourceId::ALL.len()],
}

impl HazardTracker {
    /// Creates a tracker with no outstanding writes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates a whole submission.
    ///
    /// # Errors
    ///
    /// The first unordered access.
    pub fn validate(commands: &CommandList) -> Result<(), HazardError> {
        let mut tracker = Self::new();
        commands.iter().try_for_each(|command| tracker.apply(command))
    }

    /// Applies one command.
    ///
    /// # Errors
    ///
    /// `MissingBarrier` if the command reads or overwrites a resource whose
    /// last write is not visible to its stage.
    pub fn apply(&mut self, command: &GpuCommand) -> Result<(), HazardError> {
        if let GpuCommand::Barrier { resource, src, dst } = *command {
            let state = &mut self.resources[resource.index()];
            // A barrier only orders the write it names.
            if state.last_write.map_or(true, |w| w == src) {
                state.visible_to |= dst.bit();
            }
            return Ok(());
        }

        for &(resource, access, stage) in command.accesses() {
            let state = &mut self.resources[resource.index()];
            if let Some(writer) = state.last_write {
                if writer != stage && state.visible_to & stage.bit() == 0 {
                    return Err(HazardError::MissingBarrier {
                        resource,
                        writer,
                        reader: stage,
                    });
                }
            }
            if access != Access::Read {
                state.last_write = Some(stage);
                state.visible_to = 0;
            }
        }
        Ok(())
    }
}
