//! The indirect draw record.
//!
//! One `DrawIndexedIndirectArgs` lives in a device buffer. The host writes
//! it once at setup; after that only `instance_count` changes, and only on
//! the device: zeroed by a transfer write before each culling dispatch and
//! incremented by the dispatch for every surviving instance.

use crate::commands::{CommandList, GpuCommand};
use crate::mesh::MeshInfo;
use bytemuck::{Pod, Zeroable};

/// Value `instance_count` is reset to before every culling dispatch.
pub const DRAW_COUNT_RESET: u32 = 0;

/// Byte offset of `instance_count` inside the record.
pub const INSTANCE_COUNT_OFFSET: u64 = 4;

/// Size in bytes of the `instance_count` field.
pub const INSTANCE_COUNT_SIZE: u64 = 4;

/// DrawIndexedIndirect arguments - `instance_count` filled by the device.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct DrawIndexedIndirectArgs {
    /// Indices per instance.
    pub index_count: u32,
    /// Number of instances to draw (filled by the device).
    pub instance_count: u32,
    /// First index.
    pub first_index: u32,
    /// Base vertex.
    pub base_vertex: i32,
    /// First instance.
    pub first_instance: u32,
}

/// Owns the fixed fields of the record and records its device-side updates.
#[derive(Debug, Clone, Copy)]
pub struct IndirectDrawAssembly {
    args: DrawIndexedIndirectArgs,
}

impl IndirectDrawAssembly {
    /// Creates the record for a mesh.
    #[must_use]
    pub const fn new(mesh: &MeshInfo) -> Self {
        Self {
            args: DrawIndexedIndirectArgs {
                index_count: mesh.index_count,
                instance_count: DRAW_COUNT_RESET,
                first_index: 0,
                base_vertex: 0,
                first_instance: 0,
            },
        }
    }

    /// Initial record contents for buffer creation.
    #[must_use]
    pub const fn initial_args(&self) -> DrawIndexedIndirectArgs {
        self.args
    }

    /// Initial record as bytes.
    #[must_use]
    pub fn initial_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(&self.args)
    }

    /// Records the transfer write of [`DRAW_COUNT_RESET`] into
    /// `instance_count`. Must precede the culling dispatch.
    pub fn record_reset(&self, commands: &mut CommandList) {
        commands.push(GpuCommand::ResetDrawCount);
    }

    /// Records the indexed-indirect draw. Must follow the culling dispatch
    /// and its barriers.
    pub fn record_draw(&self, commands: &mut CommandList) {
        let slot = commands.slot();
        commands.push(GpuCommand::DrawIndexedIndirect { slot });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_layout() {
        assert_eq!(std::mem::size_of::<DrawIndexedIndirectArgs>(), 20);
        let args = DrawIndexedIndirectArgs {
            instance_count: 0xAABB_CCDD,
            ..Default::default()
        };
        let bytes = bytemuck::bytes_of(&args);
        let offset = usize::try_from(INSTANCE_COUNT_OFFSET).unwrap_or(0);
        assert_eq!(
            u32::from_ne_bytes([bytes[offset], bytes[offset + 1], bytes[offset + 2], bytes[offset + 3]]),
            0xAABB_CCDD
        );
    }

    #[test]
    fn test_fixed_fields_from_mesh() {
        let assembly = IndirectDrawAssembly::new(&MeshInfo {
            vertex_count: 24,
            index_count: 36,
        });
        let args = assembly.initial_args();
        assert_eq!(args.index_count, 36);
        assert_eq!(args.instance_count, DRAW_COUNT_RESET);
        assert_eq!((args.first_index, args.base_vertex, args.first_instance), (0, 0, 0));
    }

    #[test]
    fn test_records_slot_of_list() {
        let assembly = IndirectDrawAssembly::new(&MeshInfo {
            vertex_count: 3,
            index_count: 3,
        });
        let mut list = CommandList::new(1);
        assembly.record_reset(&mut list);
        assembly.record_draw(&mut list);
        assert_eq!(
            list.commands(),
            &[GpuCommand::ResetDrawCount, GpuCommand::DrawIndexedIndirect { slot: 1 }]
        );
    }
}
