// This module provides the layout allocator: everything that decides where structures
// live in core memory before a single register write is produced. Two concerns meet
// here. First, tile-header (message-info) rings: every distinct message size used on a
// core needs its own ring, so we collect the sizes per chip (worker cores share one
// table per chip, Ethernet cores each get their own), sort them, and map each size to
// a ring index. Index 0 reuses the gap carved below the data-buffer base; higher
// indices stack downward from the top of core memory, below the 64-byte reserved tail.
// Second, on-device struct sizes: the epoch-info block, the per-stream summary record,
// and the DRAM descriptor records have fixed binary layouts shared with firmware, and
// their sizes are defined here so the compiler's address bookkeeping and the hex
// serializer cannot drift apart. The pipe-scatter state block and DRAM scatter offset
// arrays are variable-length and rounded up to a 32-byte boundary.

//! Memory layout: tile-header ring placement and on-device struct sizes.

use hashbrown::HashMap;
use log::debug;

use crate::core::config::{BlobGenConfig, EPOCH_MAX_NUM_TILE_SIZES, UNUSED_BUF_SPACE_BYTES};
use crate::core::coords::CoreId;
use crate::core::grid::GridConfig;
use crate::graph::PhaseGraph;

/// Size in bytes of one per-stream summary record in the epoch-info section.
pub const EPOCH_STREAM_INFO_STRUCT_SIZE: u32 = 160;
/// Size in bytes of the per-stream DRAM header record.
pub const DRAM_STREAM_INFO_STRUCT_SIZE: u32 = 32;
/// Size in bytes of one DRAM buffer state record.
pub const DRAM_STATE_STRUCT_SIZE: u32 = 96;
/// Size in bytes of the DRAM scatter state record.
pub const DRAM_SCATTER_STATE_STRUCT_SIZE: u32 = 32;

/// Size in bytes of the fixed epoch-info struct that heads the blob section.
pub fn epoch_info_struct_size(cfg: &BlobGenConfig) -> u32 {
    96 * 4
        + 40 * 4
        + 4 * (cfg.epoch_max_inputs
            + cfg.epoch_max_outputs
            + cfg.noc_num_streams
            + 2 * EPOCH_MAX_NUM_TILE_SIZES) as u32
}

fn round_up_32(bytes: u32) -> u32 {
    bytes.div_ceil(32) * 32
}

/// Size of the scatter pipe state block for a stream, given the offset-list
/// length of each recorded scatter group.
pub fn pipe_scatter_state_size(group_offset_counts: &[usize]) -> u32 {
    if group_offset_counts.is_empty() {
        return 0;
    }
    let mut length = 0u32;
    for &count in group_offset_counts {
        length += 16 + 8 * count as u32;
    }
    round_up_32(length)
}

/// Size of a DRAM scatter offset array holding `len` 64-bit offsets.
pub fn dram_scatter_offsets_size(len: usize) -> u32 {
    round_up_32(len as u32 * 8)
}

/// Start address of the tile-header ring with the given index on a core.
///
/// Ring 0 lives in the gap between the overlay region and the data-buffer
/// base; every further ring stacks downward from the top of core memory.
pub fn msg_info_buf_addr(cfg: &BlobGenConfig, is_ethernet: bool, index: usize) -> u32 {
    let (data_base, overlay_size, mem_size) = if is_ethernet {
        (
            cfg.data_buffer_space_base_eth,
            cfg.overlay_blob_size_eth,
            cfg.tensix_mem_size_eth,
        )
    } else {
        (
            cfg.data_buffer_space_base,
            cfg.overlay_blob_size,
            cfg.tensix_mem_size,
        )
    };
    if index == 0 {
        data_base - cfg.ncrisc_runtime_section_size - overlay_size - 128 - cfg.msg_info_buf_size()
    } else {
        mem_size - UNUSED_BUF_SPACE_BYTES - (index as u32 * cfg.msg_info_buf_size())
    }
}

/// Per-chip (worker) and per-core (Ethernet) tables of distinct message
/// sizes, sorted ascending; a size's position is its ring index.
#[derive(Debug, Default)]
pub struct TileHeaderLayout {
    worker_sizes: HashMap<u32, Vec<u32>>,
    eth_sizes: HashMap<CoreId, Vec<u32>>,
}

impl TileHeaderLayout {
    /// Collect every message size in the graph and assign ring indices.
    pub fn build(graph: &PhaseGraph, grid: &GridConfig) -> Self {
        let mut layout = TileHeaderLayout::default();
        for sref in graph.sorted_stream_refs() {
            let core = sref.core;
            let sizes = if grid.is_ethernet(core.y, core.x) {
                layout.eth_sizes.entry(core).or_default()
            } else {
                layout.worker_sizes.entry(core.chip).or_default()
            };
            for phase in &graph.streams[&sref].phases {
                let msg_size = phase.msg_size();
                if !sizes.contains(&msg_size) {
                    sizes.push(msg_size);
                }
            }
        }
        for sizes in layout.worker_sizes.values_mut() {
            sizes.sort_unstable();
        }
        for sizes in layout.eth_sizes.values_mut() {
            sizes.sort_unstable();
        }
        layout
    }

    /// The sorted message sizes carried by a core.
    pub fn sizes_for(&self, core: CoreId, is_ethernet: bool) -> &[u32] {
        static EMPTY: [u32; 0] = [];
        let sizes = if is_ethernet {
            self.eth_sizes.get(&core)
        } else {
            self.worker_sizes.get(&core.chip)
        };
        sizes.map_or(&EMPTY[..], Vec::as_slice)
    }

    /// Ring index of a message size on a core.
    pub fn index_of(&self, core: CoreId, is_ethernet: bool, msg_size: u32) -> usize {
        self.sizes_for(core, is_ethernet)
            .iter()
            .position(|&s| s == msg_size)
            .unwrap_or(0)
    }

    /// Stamp every phase with the address of its tile-header ring.
    pub fn assign_msg_info_addrs(
        &self,
        graph: &mut PhaseGraph,
        grid: &GridConfig,
        cfg: &BlobGenConfig,
    ) {
        for sref in graph.sorted_stream_refs() {
            let core = sref.core;
            let is_eth = grid.is_ethernet(core.y, core.x);
            let stream = graph.stream_mut(&sref).expect("stream exists");
            for phase in &mut stream.phases {
                let index = self.index_of(core, is_eth, phase.msg_size());
                let addr = msg_info_buf_addr(cfg, is_eth, index);
                phase.msg_info_buf_addr = Some(addr);
            }
        }
        debug!(
            "tile header layout: {} worker chip table(s), {} ethernet core table(s)",
            self.worker_sizes.len(),
            self.eth_sizes.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::coords::StreamRef;
    use crate::graph::Phase;

    #[test]
    fn test_epoch_info_struct_size_default_cfg() {
        let cfg = BlobGenConfig::default();
        // 96 header words, 40 per-stream index words, plus the input/output/
        // stream/tile-size tables.
        assert_eq!(epoch_info_struct_size(&cfg), 1056);
    }

    #[test]
    fn test_msg_info_buf_addr_placement() {
        let cfg = BlobGenConfig::default();
        let ring = cfg.msg_info_buf_size();
        assert_eq!(
            msg_info_buf_addr(&cfg, false, 0),
            cfg.data_buffer_space_base - cfg.overlay_blob_size - 128 - ring
        );
        assert_eq!(
            msg_info_buf_addr(&cfg, false, 1),
            cfg.tensix_mem_size - UNUSED_BUF_SPACE_BYTES - ring
        );
        assert_eq!(
            msg_info_buf_addr(&cfg, false, 2),
            cfg.tensix_mem_size - UNUSED_BUF_SPACE_BYTES - 2 * ring
        );
    }

    #[test]
    fn test_variable_length_block_rounding() {
        assert_eq!(pipe_scatter_state_size(&[]), 0);
        // One group with two unroll offsets: 16 + 2*8 = 32 exactly.
        assert_eq!(pipe_scatter_state_size(&[2]), 32);
        // One group with three offsets: 40 rounds up to 64.
        assert_eq!(pipe_scatter_state_size(&[3]), 64);
        assert_eq!(dram_scatter_offsets_size(4), 32);
        assert_eq!(dram_scatter_offsets_size(5), 64);
    }

    #[test]
    fn test_tile_header_indices_sorted_and_assigned() {
        let mut graph = PhaseGraph::new();
        let core = CoreId::new(0, 0, 0);
        for (stream_id, msg_size) in [(8u8, 2048u32), (9, 1024)] {
            graph.insert_phase(
                StreamRef::new(core, stream_id),
                Phase {
                    phase_num: 1,
                    msg_size: Some(msg_size),
                    ..Default::default()
                },
            );
        }
        graph.finalize();
        let mut grid = GridConfig::new();
        grid.add_chip(0, 1, 1);

        let layout = TileHeaderLayout::build(&graph, &grid);
        assert_eq!(layout.sizes_for(core, false), &[1024, 2048]);
        assert_eq!(layout.index_of(core, false, 1024), 0);
        assert_eq!(layout.index_of(core, false, 2048), 1);

        let cfg = BlobGenConfig::default();
        let mut graph = graph;
        layout.assign_msg_info_addrs(&mut graph, &grid, &cfg);
        let phase = graph.phase(&StreamRef::new(core, 9), 1).unwrap();
        assert_eq!(phase.msg_info_buf_addr, Some(msg_info_buf_addr(&cfg, false, 0)));
        let phase = graph.phase(&StreamRef::new(core, 8), 1).unwrap();
        assert_eq!(phase.msg_info_buf_addr, Some(msg_info_buf_addr(&cfg, false, 1)));
    }
}
