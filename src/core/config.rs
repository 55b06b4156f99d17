// This module provides BlobGenConfig, the run-wide parameter block the compiler is
// handed at startup. It mirrors the knobs the build system passes on the command line:
// grid dimensions per chip, the memory map (blob section start, data buffer space base,
// total core memory) for worker and Ethernet cores separately, the overlay blob budgets,
// per-epoch input/output/stream limits, and output naming. Defaults match the shipping
// worker-core memory map (64 KB blob budget minus the 128-byte guard, blob section at
// 140 KB + 128, data buffers at 204 KB, 1 MB core memory). Derived sizes that every
// stage needs, like the tile-header (message-info) ring size, are computed here so the
// layout allocator and the serializer cannot disagree on them.

//! Run configuration for the blob compiler.

/// Bytes per tile header entry in the message-info ring.
pub const TILE_HEADER_SIZE_BYTES: u32 = 16;
/// Trailing bytes at the top of core memory never handed to tile-header rings.
pub const UNUSED_BUF_SPACE_BYTES: u32 = 64;
/// Distinct message sizes a single core may carry.
pub const EPOCH_MAX_NUM_TILE_SIZES: usize = 8;
/// Maximum fork fan-out recorded per stream.
pub const EPOCH_MAX_OUTPUT_FORKS: usize = 16;

/// Run-wide tunables, one instance per compilation.
#[derive(Debug, Clone)]
pub struct BlobGenConfig {
    pub graph_name: String,
    pub blob_out_dir: String,
    /// NOC grid extent used by the NOC-1 coordinate flip.
    pub noc_x_size: u32,
    pub noc_y_size: u32,
    pub noc_translation_id_enabled: bool,
    pub epoch_max_inputs: usize,
    pub epoch_max_outputs: usize,
    pub noc_num_streams: usize,
    /// Overlay blob budget per worker core (extra allowance is per-core, on top).
    pub overlay_blob_size: u32,
    pub overlay_blob_size_eth: u32,
    /// Worker-core epoch-info section base address.
    pub blob_section_start: u32,
    pub blob_section_start_eth: u32,
    /// First byte above the overlay region usable for data buffers.
    pub data_buffer_space_base: u32,
    pub data_buffer_space_base_eth: u32,
    pub tensix_mem_size: u32,
    pub tensix_mem_size_eth: u32,
    /// Size of a runtime section carved below the data-buffer base on the
    /// split-config revision; zero elsewhere.
    pub ncrisc_runtime_section_size: u32,
    pub max_msgs_per_phase: u32,
}

impl Default for BlobGenConfig {
    fn default() -> Self {
        Self {
            graph_name: "overlay_graph".to_string(),
            blob_out_dir: "out".to_string(),
            noc_x_size: 1,
            noc_y_size: 1,
            noc_translation_id_enabled: false,
            epoch_max_inputs: 24,
            epoch_max_outputs: 24,
            noc_num_streams: 64,
            overlay_blob_size: (64 * 1024) - 128,
            overlay_blob_size_eth: (32 * 1024) - 128,
            blob_section_start: (140 * 1024) + 128,
            blob_section_start_eth: 0,
            data_buffer_space_base: 204 * 1024,
            data_buffer_space_base_eth: 0,
            tensix_mem_size: 1024 * 1024,
            tensix_mem_size_eth: 256 * 1024,
            ncrisc_runtime_section_size: 0,
            max_msgs_per_phase: 2048,
        }
    }
}

impl BlobGenConfig {
    /// Size of one tile-header (message-info) ring buffer.
    pub fn msg_info_buf_size(&self) -> u32 {
        self.max_msgs_per_phase * TILE_HEADER_SIZE_BYTES
    }

    /// Epoch-info section base for a core of the given class.
    pub fn epoch_info_space_start(&self, is_ethernet: bool) -> u32 {
        if is_ethernet {
            self.blob_section_start_eth
        } else {
            self.blob_section_start
        }
    }
}
