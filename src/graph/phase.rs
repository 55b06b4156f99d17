// This module provides Phase, the central mutable record of the compiler: one
// configuration epoch of one stream, keyed by (core, stream id, phase number). A phase
// is created by the loader with only the attributes the input graph spelled out,
// normalized once to fill the optional knobs with their fixed defaults, mutated in
// place by the link resolver (resolved src lists, flow-control flags, NOC choices) and
// finally read by the blob compiler. Fields that stay Option<_> after normalization are
// the ones whose "never set" state is meaningful to a later pass (for example
// incoming_data_noc, which the NOC resolver derives, or num_mcast_dests, stamped during
// destination resolution). DramBufferDesc is the input-side descriptor for off-chip
// DRAM linkage, one list entry per NCRISC buffer a stream reads or writes.

//! Phase records and DRAM buffer descriptors.

use crate::core::coords::StreamRef;

/// Default message (tile) size in bytes when the input leaves it unset.
pub const DEFAULT_MSG_SIZE: u32 = 1024;
/// Default unicast virtual channel.
pub const DEFAULT_VC: u32 = 2;
/// Default register-update virtual channel.
pub const DEFAULT_REG_UPDATE_VC: u32 = 3;
/// Default untilize tile row count.
pub const DEFAULT_TILE_DIM_R: u32 = 32;
/// Default row count per column-dimension loop of a raw-data stream.
pub const DEFAULT_C_DIM_LOOP_NUM_ROWS: u32 = 32;

/// One configuration epoch of a stream. Option fields hold their input value
/// until [`Phase::normalize`] fills the documented defaults.
#[derive(Debug, Clone, Default)]
pub struct Phase {
    pub phase_num: u64,

    // Topology.
    pub src: Vec<StreamRef>,
    pub dest: Vec<StreamRef>,
    pub source_endpoint: bool,
    pub remote_source: bool,
    pub receiver_endpoint: bool,
    pub remote_receiver: bool,
    pub local_receiver: bool,
    pub local_receiver_tile_clearing: bool,
    pub local_sources_connected: bool,
    pub eth_sender: bool,
    pub eth_receiver: bool,

    // Buffer geometry.
    pub buf_addr: u32,
    pub buf_size: u32,
    pub buf_base_addr: Option<u32>,
    pub buf_full_size_bytes: Option<u32>,
    pub msg_size: Option<u32>,
    pub num_msgs: u32,
    /// Tile-header ring location, assigned by the layout allocator.
    pub msg_info_buf_addr: Option<u32>,

    // Transport.
    pub outgoing_data_noc: Option<u32>,
    pub incoming_data_noc: Option<u32>,
    pub remote_src_update_noc: Option<u32>,
    pub vc: Option<u32>,
    pub reg_update_vc: Option<u32>,
    pub no_dest_handshake: bool,
    pub group_priority: u32,
    pub linked: bool,
    pub no_path_res: bool,
    pub mcast_xy: u32,
    pub arb_group_size: Option<u32>,
    pub src_in_order_fwd: bool,
    pub src_in_order_fwd_num_msgs: u32,
    pub local_stream_clear_num: Option<u32>,
    pub msg_group_stream_clear_type: u32,
    pub buf_space_available_ack_thr: Option<u32>,

    // Control.
    pub next_phase_src_change: Option<bool>,
    pub next_phase_dest_change: Option<bool>,
    pub phase_auto_config: bool,
    pub phase_auto_advance: bool,
    pub data_auto_send: bool,
    pub auto_run: bool,
    pub intermediate: bool,
    pub park_input: bool,
    pub park_output: bool,
    pub moves_raw_data: bool,
    pub legacy_pack: bool,
    pub ncrisc_clear: bool,
    pub no_prev_phase_outgoing_data_flush: bool,
    pub resend: bool,
    pub ptrs_not_zero: bool,
    pub num_iters_in_epoch: Option<u32>,
    pub num_msgs_in_block: u32,
    pub overlay_blob_extra_size: u32,
    pub input_index: Option<u32>,
    pub output_index: Option<u32>,
    pub producer_epoch_id: Option<u32>,
    pub has_packer_mcast_opt: bool,
    pub tile_dim_r: Option<u32>,
    pub batch_dim_size: u32,
    pub c_dim_loop_num_rows: Option<u32>,

    // Raw-data block dimensions carried into the stream summary.
    pub r_dim_size: u32,
    pub c_dim_size: u32,
    pub zr_dim_size: u32,
    pub zc_dim_size: u32,

    // Scatter-pack.
    pub is_scatter_pack: bool,
    pub scatter_order_size: u32,
    pub padding_scatter_order_size: u32,
    pub scatter_idx: u32,
    pub num_unroll_iter: u32,
    pub num_scatter_inner_loop: Option<u32>,
    pub pipe_scatter_output_loop_count: Option<u32>,

    // Output forks.
    pub fork_stream_ids: Vec<u8>,
    pub num_fork_streams: u32,

    // Block dimensions shared across a core's output/intermediate streams.
    pub ublock_rt: u32,
    pub ublock_ct: u32,
    pub mblock_m: u32,
    pub mblock_n: u32,
    pub mblock_k: u32,

    // DRAM linkage flags (descriptors live on the graph, keyed by stream).
    pub dram_io: bool,
    pub dram_input: bool,
    pub dram_output: bool,
    pub dram_streaming: bool,
    pub dram_input_no_push: bool,
    pub dram_output_no_push: bool,
    pub dram_writes_with_cmd_buf: bool,

    /// Seed words for a pre-seeded data buffer, one per message.
    pub preload_data: Vec<u32>,

    // Filled by the link resolver.
    pub src_dest_index: u32,
    pub remote_src_is_mcast: bool,
    pub num_mcast_dests: Option<u32>,
    pub data_buf_no_flow_ctrl: bool,
    pub dest_data_buf_no_flow_ctrl: bool,
    pub no_flow_ctrl_processed: bool,
    pub npsc_opt_processed: bool,
    pub saved_dest_wr_ptr: Option<u64>,
    pub saved_num_msgs_already_sent: Option<u32>,
}

impl Phase {
    /// Fill unset optional attributes with their fixed defaults. Idempotent:
    /// a second call never changes an already-normalized phase.
    pub fn normalize(&mut self) {
        if self.auto_run {
            self.phase_auto_config = true;
            self.phase_auto_advance = true;
            self.data_auto_send = true;
        }
        self.msg_size.get_or_insert(DEFAULT_MSG_SIZE);
        self.outgoing_data_noc.get_or_insert(0);
        self.next_phase_src_change.get_or_insert(true);
        self.next_phase_dest_change.get_or_insert(true);
        self.vc.get_or_insert(DEFAULT_VC);
        self.reg_update_vc.get_or_insert(DEFAULT_REG_UPDATE_VC);
        self.num_iters_in_epoch.get_or_insert(1);
        self.producer_epoch_id.get_or_insert(0);
        self.buf_full_size_bytes.get_or_insert(self.buf_size);
        self.buf_base_addr.get_or_insert(self.buf_addr);
        self.pipe_scatter_output_loop_count.get_or_insert(1);
        self.num_scatter_inner_loop.get_or_insert(1);
        self.tile_dim_r.get_or_insert(DEFAULT_TILE_DIM_R);
        self.c_dim_loop_num_rows.get_or_insert(DEFAULT_C_DIM_LOOP_NUM_ROWS);
    }

    pub fn msg_size(&self) -> u32 {
        self.msg_size.unwrap_or(DEFAULT_MSG_SIZE)
    }

    pub fn vc(&self) -> u32 {
        self.vc.unwrap_or(DEFAULT_VC)
    }

    pub fn reg_update_vc(&self) -> u32 {
        self.reg_update_vc.unwrap_or(DEFAULT_REG_UPDATE_VC)
    }

    pub fn next_phase_src_change(&self) -> bool {
        self.next_phase_src_change.unwrap_or(true)
    }

    pub fn next_phase_dest_change(&self) -> bool {
        self.next_phase_dest_change.unwrap_or(true)
    }

    pub fn buf_full_size_bytes(&self) -> u32 {
        self.buf_full_size_bytes.unwrap_or(self.buf_size)
    }

    pub fn buf_base_addr(&self) -> u32 {
        self.buf_base_addr.unwrap_or(self.buf_addr)
    }

    pub fn num_iters_in_epoch(&self) -> u32 {
        self.num_iters_in_epoch.unwrap_or(1)
    }

    pub fn outgoing_data_noc(&self) -> u32 {
        self.outgoing_data_noc.unwrap_or(0)
    }

    pub fn incoming_data_noc(&self) -> u32 {
        self.incoming_data_noc.unwrap_or(0)
    }

    pub fn remote_src_update_noc(&self) -> u32 {
        self.remote_src_update_noc.unwrap_or(0)
    }

    pub fn arb_group_size(&self) -> u32 {
        self.arb_group_size.unwrap_or(1)
    }

    pub fn local_stream_clear_num(&self) -> u32 {
        self.local_stream_clear_num.unwrap_or(1)
    }

    pub fn tile_dim_r(&self) -> u32 {
        self.tile_dim_r.unwrap_or(DEFAULT_TILE_DIM_R)
    }

    pub fn c_dim_loop_num_rows(&self) -> u32 {
        self.c_dim_loop_num_rows.unwrap_or(DEFAULT_C_DIM_LOOP_NUM_ROWS)
    }

    /// Whether this phase moves data through a DRAM NCRISC config.
    pub fn uses_dram(&self) -> bool {
        self.dram_io || self.dram_streaming
    }

    /// Scatter-pack streams unroll their blob once per scatter index.
    pub fn is_pipe_scatter(&self) -> bool {
        self.is_scatter_pack && self.scatter_order_size > 1
    }
}

/// One off-chip DRAM buffer a stream reads or writes, as described by the
/// input graph's dram_blob section.
#[derive(Debug, Clone, Default)]
pub struct DramBufferDesc {
    pub dram_buf_noc_addr: u64,
    pub dram_buf_size_bytes: u32,
    pub dram_buf_size_tiles: u32,
    pub dram_buf_size_q_slots: u32,
    pub dram_buf_read_chunk_size_tiles: u32,
    pub dram_buf_write_chunk_size_tiles: u32,
    pub dram_scatter_chunk_size_tiles: u32,
    pub msg_size: u32,
    pub num_msgs: u32,
    pub reader_index: u32,
    pub total_readers: u32,
    pub dram_padding: bool,
    pub dram_io: bool,
    pub dram_input: bool,
    pub dram_output: bool,
    pub dram_streaming: bool,
    pub dram_ram: bool,
    pub dram_streaming_dest: Option<StreamRef>,
    pub dram_scatter_offsets: Vec<u64>,
    pub dram_scatter_offsets_full_size: u32,
}

impl DramBufferDesc {
    /// Tiles in one queue slot of this buffer.
    pub fn q_slot_size_tiles(&self) -> u32 {
        if self.dram_buf_size_q_slots != 0 {
            self.dram_buf_size_tiles / self.dram_buf_size_q_slots
        } else {
            1
        }
    }

    pub fn q_slot_size_bytes(&self) -> u32 {
        self.q_slot_size_tiles() * self.msg_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_fills_defaults() {
        let mut phase = Phase {
            phase_num: 7,
            buf_addr: 0x40000,
            buf_size: 4096,
            num_msgs: 4,
            ..Default::default()
        };
        phase.normalize();
        assert_eq!(phase.msg_size(), DEFAULT_MSG_SIZE);
        assert_eq!(phase.vc(), DEFAULT_VC);
        assert_eq!(phase.reg_update_vc(), DEFAULT_REG_UPDATE_VC);
        assert!(phase.next_phase_src_change());
        assert!(phase.next_phase_dest_change());
        assert_eq!(phase.buf_full_size_bytes(), 4096);
        assert_eq!(phase.buf_base_addr(), 0x40000);
        assert_eq!(phase.num_iters_in_epoch(), 1);
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let mut phase = Phase {
            phase_num: 3,
            buf_addr: 0x30000,
            buf_size: 2048,
            msg_size: Some(512),
            vc: Some(1),
            auto_run: true,
            ..Default::default()
        };
        phase.normalize();
        let once = format!("{phase:?}");
        phase.normalize();
        assert_eq!(once, format!("{phase:?}"));
    }

    #[test]
    fn test_auto_run_expands_to_auto_flags() {
        let mut phase = Phase {
            auto_run: true,
            ..Default::default()
        };
        phase.normalize();
        assert!(phase.phase_auto_config);
        assert!(phase.phase_auto_advance);
        assert!(phase.data_auto_send);
    }

    #[test]
    fn test_dram_q_slot_sizes() {
        let buf = DramBufferDesc {
            dram_buf_size_tiles: 64,
            dram_buf_size_q_slots: 8,
            msg_size: 2048,
            ..Default::default()
        };
        assert_eq!(buf.q_slot_size_tiles(), 8);
        assert_eq!(buf.q_slot_size_bytes(), 8 * 2048);
    }
}
