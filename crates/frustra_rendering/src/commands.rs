//! Device-independent command model.
//!
//! A frame is recorded as a [`CommandList`] of [`GpuCommand`]s. Devices
//! lower or execute the list; the core never touches a graphics API.

/// Pipeline stage that accesses a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Buffer fill / copy.
    Transfer,
    /// Compute shader storage access.
    ComputeShader,
    /// Indirect argument fetch.
    DrawIndirect,
    /// Vertex shader storage access.
    VertexShader,
}

impl Stage {
    pub(crate) const fn bit(self) -> u8 {
        match self {
            Self::Transfer => 1,
            Self::ComputeShader => 2,
            Self::DrawIndirect => 4,
            Self::VertexShader => 8,
        }
    }
}

/// Device resource whose accesses are ordered by barriers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceId {
    /// The indirect draw record; its `instance_count` is the append counter.
    IndirectRecord,
    /// The compacted visible-index buffer.
    VisibleIndices,
}

impl ResourceId {
    /// Every tracked resource.
    pub const ALL: [Self; 2] = [Self::IndirectRecord, Self::VisibleIndices];

    pub(crate) const fn index(self) -> usize {
        match self {
            Self::IndirectRecord => 0,
            Self::VisibleIndices => 1,
        }
    }
}

/// How a command touches a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Read only.
    Read,
    /// Write only.
    Write,
    /// Atomic read-modify-write.
    ReadWrite,
}

/// One recorded device command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpuCommand {
    /// Writes the literal `0` into `instance_count` of the indirect record.
    ResetDrawCount,
    /// Makes writes by `src` on `resource` visible to `dst`.
    Barrier {
        /// Resource the dependency applies to.
        resource: ResourceId,
        /// Producing stage.
        src: Stage,
        /// Consuming stage.
        dst: Stage,
    },
    /// Culling dispatch using the camera and params of frame `slot`.
    DispatchCull {
        /// Frame slot whose uniforms are bound.
        slot: usize,
        /// Number of workgroups along X.
        workgroups: u32,
    },
    /// The single indexed-indirect draw.
    DrawIndexedIndirect {
        /// Frame slot whose camera is bound.
        slot: usize,
    },
}

impl GpuCommand {
    /// Resource accesses performed by this command, in execution order.
    #[must_use]
    pub fn accesses(&self) -> &'static [(ResourceId, Access, Stage)] {
        match self {
            Self::ResetDrawCount => &[(ResourceId::IndirectRecord, Access::Write, Stage::Transfer)],
            Self::Barrier { .. } => &[],
            Self::DispatchCull { .. } => &[
                (ResourceId::IndirectRecord, Access::ReadWrite, Stage::ComputeShader),
                (ResourceId::VisibleIndices, Access::Write, Stage::ComputeShader),
            ],
            Self::DrawIndexedIndirect { .. } => &[
                (ResourceId::IndirectRecord, Access::Read, Stage::DrawIndirect),
                (ResourceId::VisibleIndices, Access::Read, Stage::VertexShader),
            ],
        }
    }
}

/// Commands recorded for one frame slot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandList {
    slot: usize,
    commands: Vec<GpuCommand>,
}

impl CommandList {
    /// Creates an empty list for `slot`.
    #[must_use]
    pub fn new(slot: usize) -> Self {
        Self {
            slot,
            commands: Vec::with_capacity(8),
        }
    }

    /// Frame slot this list was recorded for.
    #[must_use]
    pub const fn slot(&self) -> usize {
        self.slot
    }

    /// Clears the list for reuse by `slot`, keeping its allocation.
    pub fn reset(&mut self, slot: usize) {
        self.slot = slot;
        self.commands.clear();
    }

    /// Appends a command.
    pub fn push(&mut self, command: GpuCommand) {
        self.commands.push(command);
    }

    /// Appends a barrier.
    pub fn barrier(&mut self, resource: ResourceId, src: Stage, dst: Stage) {
        self.push(GpuCommand::Barrier { resource, src, dst });
    }

    /// Recorded commands.
    #[must_use]
    pub fn commands(&self) -> &[GpuCommand] {
        &self.commands
    }

    /// Keeps only the commands matching `keep`.
    pub fn retain(&mut self, keep: impl FnMut(&GpuCommand) -> bool) {
        self.commands.retain(keep);
    }

    /// Number of commands.
    #[must_use]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// True if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Iterates the commands.
    pub fn iter(&self) -> std::slice::Iter<'_, GpuCommand> {
        self.commands.iter()
    }
}

impl<'a> IntoIterator for &'a CommandList {
    type Item = &'a GpuCommand;
    type IntoIter = std::slice::Iter<'a, GpuCommand>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
