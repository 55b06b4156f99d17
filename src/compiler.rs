// This module drives compilation proper: after the link resolver has settled sources,
// destinations and NOC planes, it walks every core's streams in deterministic order and
// turns each phase into its register-write list, chaining the per-phase auto-config
// headers as it goes. Along the way it accumulates the per-core epoch summary the hex
// serializer needs: stream records with message totals and buffer geometry, input and
// output operand maps, block dimensions shared across a core's output streams, DRAM
// buffer lists with their NOC addresses rewritten for the chosen data plane, and the
// scatter-unroll offset groups of pipe-scatter streams. A sender/receiver pair whose
// link carries exactly one phase additionally gets a dummy handshake phase appended
// after its last real phase so auto-config can retire the link. The output is a plain
// list of CompiledCore values; nothing here touches the filesystem.

//! Per-core blob compilation and epoch summary accumulation.

use hashbrown::{HashMap, HashSet};
use log::{debug, info};

use crate::blob::{self, blob_header_dw, PhaseBlobArgs};
use crate::core::config::{BlobGenConfig, EPOCH_MAX_OUTPUT_FORKS};
use crate::core::coords::{CoreId, StreamRef, WRAPPED_PHASE_MASK};
use crate::core::error::{BlobGenError, BlobGenResult};
use crate::core::grid::GridConfig;
use crate::graph::{DramBufferDesc, Phase, PhaseGraph};
use crate::layout::{epoch_info_struct_size, TileHeaderLayout};
use crate::regs::RegisterLayout;
use crate::resolve;

/// Scatter-unroll bookkeeping for one scatter index of a pipe-scatter
/// stream: the blob offset and register count of every unroll iteration.
#[derive(Debug, Default, Clone)]
pub struct BlobScatterGroup {
    pub offsets: Vec<u32>,
    pub phase_num_cfg_regs: Vec<u32>,
    pub num_unroll_iter: u32,
}

/// Everything the serializer needs to emit one stream's summary record.
#[derive(Debug, Default, Clone)]
pub struct StreamSummary {
    pub stream_id: u8,
    pub start_phase: u64,
    pub producer_epoch_id: u32,
    pub epoch_num_msgs: u32,
    pub msg_size_words: u32,
    pub buf_full_size_bytes: u32,
    pub buf_size_words: u32,
    pub buf_base_addr: u32,
    pub buf_addr: u32,
    pub msg_info_buf_start_words: u32,
    pub num_iters_in_epoch: u32,
    pub legacy_pack: bool,
    pub moves_raw_data: bool,
    pub is_scatter_pack: bool,
    pub num_scatter_inner_loop: u32,
    pub pipe_scatter_output_loop_count: u32,
    pub num_msgs_in_block: u32,
    pub scatter_order_size: u32,
    pub padding_scatter_order_size: u32,
    pub num_unroll_iter: u32,
    pub outgoing_data_noc: u32,
    pub incoming_data_noc: u32,
    pub num_fork_streams: u32,
    pub fork_stream_ids: Vec<u8>,
    pub flags: u32,
    pub dram_stream: bool,
    pub dram_bufs: Vec<DramBufferDesc>,
    pub dram_output_no_push: bool,
    pub dram_input_no_push: bool,
    pub batch_dim_size: u32,
    pub tile_dim_r: u32,
    pub c_dim_loop_num_rows: u32,
    pub r_dim_size: u32,
    pub c_dim_size: u32,
    pub zr_dim_size: u32,
    pub zc_dim_size: u32,
    pub dram_writes_with_cmd_buf: bool,
    pub eth_remote_fw_stream_id: u32,
    /// Scatter groups in first-encounter order, keyed by scatter index.
    pub blob_scatter: Vec<(u32, BlobScatterGroup)>,
    pub blob_start_relative_offset: u32,
    pub blob_size: u32,
    pub start_phase_num_cfg_regs: u32,
    pub last_phase_in_iter: u64,
    pub num_iter_tiles: u32,
}

impl StreamSummary {
    fn scatter_group(&mut self, scatter_idx: u32) -> &mut BlobScatterGroup {
        if let Some(pos) = self.blob_scatter.iter().position(|(i, _)| *i == scatter_idx) {
            return &mut self.blob_scatter[pos].1;
        }
        self.blob_scatter.push((scatter_idx, BlobScatterGroup::default()));
        &mut self.blob_scatter.last_mut().expect("just pushed").1
    }

    /// Offset counts per scatter group, for sizing the on-device pipe
    /// scatter state block.
    pub fn scatter_group_offset_counts(&self) -> Vec<usize> {
        self.blob_scatter
            .iter()
            .map(|(_, group)| group.offsets.len())
            .collect()
    }
}

/// One phase's compiled register-write list plus the header word chaining
/// it to the next configuration.
#[derive(Debug, Default, Clone)]
pub struct PhaseBlob {
    pub phase_num: u64,
    pub num_msgs: u32,
    pub phase_num_inc: u32,
    pub header_dw: u32,
    pub cfg_dws: Vec<u32>,
    pub intermediate: bool,
    pub buf_addr: u32,
    pub msg_size: u32,
    pub preload_data: Vec<u32>,
}

/// One stream's compiled phases in ascending phase order, with any dummy
/// handshake blobs serialized after the last real phase.
#[derive(Debug, Clone)]
pub struct StreamBlob {
    pub sref: StreamRef,
    pub phases: Vec<PhaseBlob>,
    pub dummy_blobs: Vec<Vec<u32>>,
}

/// The compiled state of one core for one epoch.
#[derive(Debug, Clone)]
pub struct CompiledCore {
    pub core: CoreId,
    pub is_ethernet: bool,
    pub num_inputs: u32,
    pub num_outputs: u32,
    pub input_streams: HashMap<u32, u8>,
    pub output_streams: HashMap<u32, u8>,
    pub stream_info: Vec<StreamSummary>,
    pub stream_to_info_index: HashMap<u8, usize>,
    pub overlay_valid: u32,
    pub skip_kernels: u32,
    pub has_eth_stream_trans: bool,
    pub has_packer_mcast_opt: bool,
    pub overlay_blob_extra_size: u32,
    pub ublock_rt: u32,
    pub ublock_ct: u32,
    pub mblock_m: u32,
    pub mblock_n: u32,
    pub mblock_k: u32,
    pub full_blob_size: u32,
    pub streams: Vec<StreamBlob>,
}

impl CompiledCore {
    fn new(core: CoreId, is_ethernet: bool) -> Self {
        CompiledCore {
            core,
            is_ethernet,
            num_inputs: 0,
            num_outputs: 0,
            input_streams: HashMap::new(),
            output_streams: HashMap::new(),
            stream_info: Vec::new(),
            stream_to_info_index: HashMap::new(),
            overlay_valid: 1,
            skip_kernels: 0,
            has_eth_stream_trans: false,
            has_packer_mcast_opt: false,
            overlay_blob_extra_size: 0,
            ublock_rt: 0,
            ublock_ct: 0,
            mblock_m: 0,
            mblock_n: 0,
            mblock_k: 0,
            full_blob_size: 0,
            streams: Vec::new(),
        }
    }

    /// The all-zero epoch record written for a core the graph never uses.
    pub fn invalid(core: CoreId, is_ethernet: bool) -> Self {
        let mut compiled = CompiledCore::new(core, is_ethernet);
        compiled.overlay_valid = 0;
        compiled.skip_kernels = 1;
        compiled
    }

    pub fn summary(&self, stream_id: u8) -> Option<&StreamSummary> {
        self.stream_to_info_index
            .get(&stream_id)
            .map(|&i| &self.stream_info[i])
    }
}

/// The whole graph compiled: one entry per core that carries phases, plus
/// the tile-header ring placement the serializer and validator read.
#[derive(Debug)]
pub struct CompiledGraph {
    pub cores: Vec<CompiledCore>,
    pub tile_headers: TileHeaderLayout,
}

/// Run the full pipeline on a loaded graph: normalization, both resolver
/// passes, tile-header placement, then per-core compilation.
pub fn compile_graph(
    graph: &mut PhaseGraph,
    grid: &GridConfig,
    cfg: &BlobGenConfig,
    layout: &dyn RegisterLayout,
) -> BlobGenResult<CompiledGraph> {
    graph.finalize();
    resolve::resolve_destinations(graph, grid)?;
    let tile_headers = TileHeaderLayout::build(graph, grid);
    tile_headers.assign_msg_info_addrs(graph, grid, cfg);
    resolve::resolve_nocs(graph)?;
    let cores = compile_cores(graph, grid, cfg, layout)?;
    Ok(CompiledGraph { cores, tile_headers })
}

/// Per-stream flags word of the epoch summary record.
pub fn stream_flags(stream_id: u8, phase: &Phase, dram_bufs: Option<&[DramBufferDesc]>) -> u32 {
    let is_fork_stream_id = phase.fork_stream_ids.contains(&stream_id);
    let is_brisc_pack = phase.source_endpoint
        && !phase.legacy_pack
        && !phase.dram_input
        && !phase.dram_streaming
        && !phase.intermediate
        && !phase.park_input;

    let mut result = 0u32;
    if phase.park_input {
        result |= 0x1;
    }
    if phase.park_output {
        result |= 0x80;
    }
    if phase.intermediate {
        result |= 0x10;
    }
    if phase.moves_raw_data {
        result |= 0x40;
    }
    if is_fork_stream_id {
        result |= 0x100;
    }
    if is_brisc_pack {
        result |= 0x400;
    }
    if phase.dram_output_no_push || phase.dram_input_no_push {
        result |= 0x800;
    }
    if phase.ncrisc_clear {
        result |= 0x1000;
    }

    if let Some(buf) = dram_bufs.and_then(|bufs| bufs.first()) {
        if buf.dram_io {
            result |= 0x2;
        }
        if buf.dram_input {
            result |= 0x4;
        }
        if buf.dram_output {
            result |= 0x8;
        }
        if buf.dram_streaming {
            result |= 0x20;
        }
        if buf.dram_ram {
            result |= 0x200;
        }
    }

    result
}

/// Group the graph's streams by core, both in deterministic sorted order.
fn streams_by_core(graph: &PhaseGraph) -> Vec<(CoreId, Vec<StreamRef>)> {
    let mut cores: Vec<(CoreId, Vec<StreamRef>)> = Vec::new();
    for sref in graph.sorted_stream_refs() {
        match cores.last_mut() {
            Some((core, srefs)) if *core == sref.core => srefs.push(sref),
            _ => cores.push((sref.core, vec![sref])),
        }
    }
    cores
}

/// Count, per sending stream, how many of its phases target each distinct
/// destination list. A link whose sender has exactly one destination list
/// with exactly one phase needs a dummy phase to retire.
fn count_sender_dests(graph: &PhaseGraph) -> HashMap<StreamRef, HashMap<Vec<StreamRef>, u32>> {
    let mut counts: HashMap<StreamRef, HashMap<Vec<StreamRef>, u32>> = HashMap::new();
    for sref in graph.sorted_stream_refs() {
        let per_dest = counts.entry(sref).or_default();
        for phase in &graph.streams[&sref].phases {
            if phase.remote_receiver {
                *per_dest.entry(phase.dest.clone()).or_insert(0) += 1;
            }
        }
    }
    counts
}

fn merge_block_dim(
    slot: &mut u32,
    value: u32,
    core: CoreId,
    attribute: &'static str,
) -> BlobGenResult<()> {
    if value != 0 {
        if *slot != 0 && *slot != value {
            return Err(BlobGenError::InconsistentBlockDim { core, attribute });
        }
        *slot = value;
    }
    Ok(())
}

/// Clone a stream's DRAM buffer descriptors with their NOC coordinate
/// fields rewritten for the data plane the phase actually uses.
fn materialize_dram_bufs(
    cfg: &BlobGenConfig,
    phase: &Phase,
    bufs: &[DramBufferDesc],
) -> Vec<DramBufferDesc> {
    // Scatter-loop control entries carry a marker bit instead of an address
    // and must not be rewritten.
    const SCATTER_LOOP_BIT: u64 = 1 << 63;

    bufs.iter()
        .map(|buf| {
            let noc_id = if buf.dram_output {
                phase.outgoing_data_noc()
            } else {
                phase.incoming_data_noc()
            };
            let mut out = buf.clone();
            out.dram_buf_noc_addr = blob::modify_dram_noc_addr(cfg, buf.dram_buf_noc_addr, noc_id);
            for offset in &mut out.dram_scatter_offsets {
                if *offset & SCATTER_LOOP_BIT == 0 {
                    *offset = blob::modify_dram_noc_addr(cfg, *offset, noc_id);
                }
            }
            out
        })
        .collect()
}

/// The destination stream's phase a sender handshakes with: the peer phase
/// with the same number, or the peer's closest earlier phase.
fn dest_handshake_phase<'a>(
    graph: &'a PhaseGraph,
    sref: StreamRef,
    dest: StreamRef,
    phase_num: u64,
) -> BlobGenResult<&'a Phase> {
    let missing = || BlobGenError::MissingPeerPhase {
        stream: sref,
        peer: dest,
        phase: phase_num,
    };
    let peer = graph.stream(&dest).ok_or_else(missing)?;
    if let Some(phase) = peer.phase(phase_num) {
        return Ok(phase);
    }
    peer.prev_index(phase_num)
        .map(|i| &peer.phases[i])
        .ok_or_else(missing)
}

/// Streams on `core` whose first phase forks into `stream_id` and which
/// carry a DRAM buffer list; the forked stream reads through that list.
fn inherited_dram_bufs<'a>(
    graph: &'a PhaseGraph,
    core_srefs: &[StreamRef],
    stream_id: u8,
) -> Option<&'a [DramBufferDesc]> {
    for other in core_srefs {
        if other.stream_id == stream_id {
            continue;
        }
        let first = graph.streams[other].phases.first()?;
        if first.fork_stream_ids.contains(&stream_id) {
            if let Some(bufs) = graph.dram_buffers.get(other) {
                return Some(bufs.as_slice());
            }
        }
    }
    None
}

fn compile_cores(
    graph: &PhaseGraph,
    grid: &GridConfig,
    cfg: &BlobGenConfig,
    layout: &dyn RegisterLayout,
) -> BlobGenResult<Vec<CompiledCore>> {
    let sender_dest_counts = count_sender_dests(graph);
    let struct_size = epoch_info_struct_size(cfg);
    let mut cores = Vec::new();

    for (core, core_srefs) in streams_by_core(graph) {
        let is_ethernet = grid.is_ethernet(core.y, core.x);
        let mut compiled = CompiledCore::new(core, is_ethernet);
        let mut curr_blob_relative_offset: u32 = 0;

        for &sref in &core_srefs {
            let stream_id = sref.stream_id;
            let phases = &graph.streams[&sref].phases;
            let last_idx = phases.len() - 1;
            let own_dram = graph.dram_buffers.get(&sref).map(Vec::as_slice);

            let mut sender_has_dummy_phase: HashSet<Vec<StreamRef>> = HashSet::new();
            let mut receiver_has_dummy_phase: HashSet<Vec<StreamRef>> = HashSet::new();
            let mut scatter_prev_phase: HashMap<u32, usize> = HashMap::new();
            let curr_blob_start_offset = curr_blob_relative_offset;
            let mut blob = StreamBlob {
                sref,
                phases: Vec::with_capacity(phases.len()),
                dummy_blobs: Vec::new(),
            };

            for (p, phase) in phases.iter().enumerate() {
                debug!(
                    "{sref} phase {} auto cfg offset {:#x} buf_addr {:#x}",
                    phase.phase_num, curr_blob_relative_offset, phase.buf_addr
                );
                if let Some(index) = phase.input_index {
                    compiled.num_inputs = compiled.num_inputs.max(index + 1);
                    compiled.input_streams.insert(index, stream_id);
                }
                if let Some(index) = phase.output_index {
                    compiled.num_outputs = compiled.num_outputs.max(index + 1);
                    compiled.output_streams.insert(index, stream_id);
                }

                if p == 0 {
                    compiled
                        .stream_to_info_index
                        .insert(stream_id, compiled.stream_info.len());
                    if phase.fork_stream_ids.len() > EPOCH_MAX_OUTPUT_FORKS {
                        return Err(BlobGenError::TooManyForks { stream: sref });
                    }
                    let info = StreamSummary {
                        stream_id,
                        start_phase: phase.phase_num,
                        producer_epoch_id: phase.producer_epoch_id.unwrap_or(0),
                        epoch_num_msgs: phase.num_msgs,
                        msg_size_words: phase.msg_size() >> 4,
                        buf_full_size_bytes: phase.buf_full_size_bytes(),
                        buf_size_words: phase.buf_size / 16,
                        buf_base_addr: phase.buf_base_addr(),
                        buf_addr: phase.buf_addr,
                        msg_info_buf_start_words: phase
                            .msg_info_buf_addr
                            .expect("layout pass assigns this")
                            >> 4,
                        num_iters_in_epoch: phase.num_iters_in_epoch(),
                        legacy_pack: phase.legacy_pack,
                        moves_raw_data: phase.moves_raw_data,
                        is_scatter_pack: phase.is_scatter_pack,
                        num_scatter_inner_loop: phase.num_scatter_inner_loop.unwrap_or(1),
                        pipe_scatter_output_loop_count: phase
                            .pipe_scatter_output_loop_count
                            .unwrap_or(1),
                        num_msgs_in_block: phase.num_msgs_in_block,
                        scatter_order_size: phase.scatter_order_size,
                        padding_scatter_order_size: phase.padding_scatter_order_size,
                        num_unroll_iter: phase.num_unroll_iter,
                        outgoing_data_noc: phase.outgoing_data_noc(),
                        incoming_data_noc: phase.incoming_data_noc(),
                        num_fork_streams: phase.num_fork_streams,
                        fork_stream_ids: phase.fork_stream_ids.clone(),
                        flags: stream_flags(stream_id, phase, own_dram),
                        dram_stream: own_dram.is_some(),
                        dram_bufs: own_dram
                            .map(|bufs| materialize_dram_bufs(cfg, phase, bufs))
                            .unwrap_or_default(),
                        dram_output_no_push: phase.dram_output_no_push,
                        dram_input_no_push: phase.dram_input_no_push,
                        batch_dim_size: phase.batch_dim_size,
                        tile_dim_r: phase.tile_dim_r(),
                        c_dim_loop_num_rows: phase.c_dim_loop_num_rows(),
                        r_dim_size: phase.r_dim_size,
                        c_dim_size: phase.c_dim_size,
                        zr_dim_size: phase.zr_dim_size,
                        zc_dim_size: phase.zc_dim_size,
                        dram_writes_with_cmd_buf: phase.dram_writes_with_cmd_buf,
                        ..Default::default()
                    };
                    compiled.stream_info.push(info);

                    if phase.overlay_blob_extra_size != 0 {
                        if compiled.overlay_blob_extra_size != 0
                            && compiled.overlay_blob_extra_size != phase.overlay_blob_extra_size
                        {
                            return Err(BlobGenError::GraphInput {
                                reason: format!(
                                    "found different overlay_blob_extra_size for {core}"
                                ),
                            });
                        }
                        compiled.overlay_blob_extra_size = phase.overlay_blob_extra_size;
                    }
                    merge_block_dim(&mut compiled.ublock_rt, phase.ublock_rt, core, "ublock_rt")?;
                    merge_block_dim(&mut compiled.ublock_ct, phase.ublock_ct, core, "ublock_ct")?;
                    merge_block_dim(&mut compiled.mblock_m, phase.mblock_m, core, "mblock_m")?;
                    merge_block_dim(&mut compiled.mblock_n, phase.mblock_n, core, "mblock_n")?;
                    merge_block_dim(&mut compiled.mblock_k, phase.mblock_k, core, "mblock_k")?;
                } else {
                    let info = compiled
                        .stream_info
                        .last_mut()
                        .expect("created at first phase");
                    if info.start_phase > phase.phase_num {
                        info.start_phase = phase.phase_num;
                    }
                    info.epoch_num_msgs += phase.num_msgs;
                }

                {
                    let info = compiled.stream_info.last().expect("created above");
                    let padded = info.dram_bufs.first().is_some_and(|buf| buf.dram_padding);
                    if info.dram_stream
                        && padded
                        && (phase.buf_base_addr() != info.buf_base_addr
                            || phase.buf_addr != info.buf_addr)
                    {
                        return Err(BlobGenError::GraphInput {
                            reason: format!(
                                "found phases with different buf_addr/buf_base_addr for \
                                 padding stream {sref}, phase {}",
                                phase.phase_num
                            ),
                        });
                    }
                }

                if p == last_idx {
                    let info = compiled
                        .stream_info
                        .last_mut()
                        .expect("created at first phase");
                    info.last_phase_in_iter = phase.phase_num;
                    info.num_iter_tiles = info.epoch_num_msgs;
                    info.epoch_num_msgs *= info.num_iters_in_epoch;
                }

                // Destination handshake peer, for phases that (re)write the
                // remote destination registers.
                let dest_phase = if phase.remote_receiver
                    || (phase.eth_sender && phase.receiver_endpoint)
                {
                    let dest = *phase.dest.first().ok_or(BlobGenError::GraphInput {
                        reason: format!(
                            "{sref}: sender phase {} has no destination",
                            phase.phase_num
                        ),
                    })?;
                    if !phase.remote_receiver {
                        let info = compiled
                            .stream_info
                            .last_mut()
                            .expect("created at first phase");
                        info.eth_remote_fw_stream_id = u32::from(dest.stream_id);
                    }
                    if phase.eth_receiver && phase.source_endpoint {
                        let src = phase.src.first().ok_or(BlobGenError::GraphInput {
                            reason: format!(
                                "{sref}: Ethernet receiver phase {} has no source",
                                phase.phase_num
                            ),
                        })?;
                        let info = compiled
                            .stream_info
                            .last_mut()
                            .expect("created at first phase");
                        info.eth_remote_fw_stream_id = u32::from(src.stream_id);
                    }
                    Some(dest_handshake_phase(graph, sref, dest, phase.phase_num)?)
                } else {
                    None
                };

                compiled.has_eth_stream_trans =
                    compiled.has_eth_stream_trans || phase.eth_sender || phase.eth_receiver;
                compiled.has_packer_mcast_opt =
                    compiled.has_packer_mcast_opt || phase.has_packer_mcast_opt;

                // A forked stream without its own DRAM buffers reads through
                // the forking stream's list.
                let dram_bufs = match own_dram {
                    Some(bufs) => Some(bufs),
                    None if phase.fork_stream_ids.contains(&stream_id) => {
                        inherited_dram_bufs(graph, &core_srefs, stream_id)
                    }
                    None => None,
                };

                let is_pipe_scatter = phase.is_pipe_scatter();

                let has_dummy_phase_sender = {
                    let per_dest = &sender_dest_counts[&sref];
                    per_dest.get(&phase.dest) == Some(&1)
                        && per_dest.len() == 1
                        && !sender_has_dummy_phase.contains(&phase.dest)
                };
                if has_dummy_phase_sender {
                    sender_has_dummy_phase.insert(phase.dest.clone());
                }
                let has_dummy_phase_receiver = phase.src.first().is_some_and(|src| {
                    sender_dest_counts.get(src).is_some_and(|per_dest| {
                        per_dest.len() == 1 && per_dest.values().next() == Some(&1)
                    })
                }) && !receiver_has_dummy_phase.contains(&phase.src);
                if has_dummy_phase_receiver {
                    receiver_has_dummy_phase.insert(phase.src.clone());
                }
                let has_dummy_phase = has_dummy_phase_sender || has_dummy_phase_receiver;

                let next_phase_is_dummy =
                    (has_dummy_phase || !blob.dummy_blobs.is_empty()) && p == last_idx;
                let mut cfg_dws = blob::phase_blob(
                    layout,
                    cfg,
                    &PhaseBlobArgs {
                        sref,
                        phase,
                        prev_phase: (p > 0).then(|| &phases[p - 1]),
                        has_next_phase: p < last_idx,
                        next_phase_is_dummy,
                        dest_phase,
                        dram_bufs: dram_bufs.unwrap_or(&[]),
                    },
                )?;

                let mut appended_dummies = 0usize;
                if has_dummy_phase {
                    let dummy_phase_addr =
                        cfg.epoch_info_space_start(is_ethernet) + struct_size - 16;
                    if has_dummy_phase_receiver {
                        blob.dummy_blobs.push(blob::dummy_phase_blob(
                            layout,
                            cfg,
                            sref,
                            phase,
                            dummy_phase_addr,
                            0,
                            false,
                            true,
                        )?);
                        appended_dummies += 1;
                    }
                    if has_dummy_phase_sender {
                        let dest = phase.dest.first().expect("matched a recorded destination");
                        let dest_is_eth = grid.is_ethernet(dest.core.y, dest.core.x);
                        let dest_dummy_phase_addr =
                            cfg.epoch_info_space_start(dest_is_eth) + struct_size - 16;
                        blob.dummy_blobs.push(blob::dummy_phase_blob(
                            layout,
                            cfg,
                            sref,
                            phase,
                            dummy_phase_addr,
                            dest_dummy_phase_addr,
                            true,
                            false,
                        )?);
                        appended_dummies += 1;
                    }
                }

                if phase.intermediate {
                    // Infinite loop for intermediates: the last word is
                    // patched to the absolute blob address at serialization,
                    // a placeholder keeps the length bookkeeping honest.
                    cfg_dws.push(0xaabbccdd);
                }

                let cfg_len = cfg_dws.len() as u32;
                let phase_num_inc;
                if p > 0 {
                    let prev = &phases[p - 1];
                    let inc = phase.phase_num - prev.phase_num;
                    let wrapped = (phase.phase_num & !WRAPPED_PHASE_MASK)
                        != (prev.phase_num & !WRAPPED_PHASE_MASK);
                    phase_num_inc = if inc >= 4096 || wrapped { 0 } else { inc as u32 };

                    let scatter_changed = is_pipe_scatter && prev.scatter_idx != phase.scatter_idx;
                    if scatter_changed {
                        let info = compiled
                            .stream_info
                            .last_mut()
                            .expect("created at first phase");
                        let group = info.scatter_group(phase.scatter_idx);
                        group.offsets.push(curr_blob_relative_offset);
                        group.phase_num_cfg_regs.push(cfg_len);
                        group.num_unroll_iter = phase.num_unroll_iter;

                        // This phase continues some earlier scatter index;
                        // the previous phase of that index chains to it.
                        if let Some(prev_idx) = scatter_prev_phase.remove(&phase.scatter_idx) {
                            let chained = &mut blob.phases[prev_idx];
                            chained.header_dw =
                                blob_header_dw(cfg_len, chained.num_msgs, chained.phase_num_inc);
                        }
                    } else {
                        let chained = blob.phases.last_mut().expect("p > 0");
                        chained.header_dw =
                            blob_header_dw(cfg_len, chained.num_msgs, chained.phase_num_inc);
                    }
                } else {
                    phase_num_inc = 0;
                    let info = compiled
                        .stream_info
                        .last_mut()
                        .expect("created at first phase");
                    info.blob_start_relative_offset = curr_blob_relative_offset;
                    info.start_phase_num_cfg_regs = cfg_len;
                    if is_pipe_scatter {
                        let group = info.scatter_group(phase.scatter_idx);
                        group.offsets.push(curr_blob_relative_offset);
                        group.phase_num_cfg_regs.push(cfg_len);
                        group.num_unroll_iter = phase.num_unroll_iter;
                    }
                }

                let mut compiled_phase = PhaseBlob {
                    phase_num: phase.phase_num,
                    num_msgs: phase.num_msgs,
                    phase_num_inc,
                    header_dw: 0,
                    cfg_dws,
                    intermediate: phase.intermediate,
                    buf_addr: phase.buf_addr,
                    msg_size: phase.msg_size(),
                    preload_data: phase.preload_data.clone(),
                };

                if p < last_idx {
                    let next = &phases[p + 1];
                    if is_pipe_scatter && phase.scatter_idx != next.scatter_idx {
                        scatter_prev_phase.insert(phase.scatter_idx, blob.phases.len());
                    }
                } else {
                    // Scatter indices left dangling terminate their chains.
                    for (_, prev_idx) in scatter_prev_phase.drain() {
                        let chained = &mut blob.phases[prev_idx];
                        chained.header_dw =
                            blob_header_dw(0, chained.num_msgs, chained.phase_num_inc);
                    }
                    compiled_phase.header_dw = if !blob.dummy_blobs.is_empty() {
                        blob_header_dw(
                            blob.dummy_blobs[0].len() as u32,
                            compiled_phase.num_msgs,
                            compiled_phase.phase_num_inc,
                        )
                    } else if phase.intermediate {
                        blob_header_dw(cfg_len, compiled_phase.num_msgs, compiled_phase.phase_num_inc)
                    } else {
                        blob_header_dw(0, compiled_phase.num_msgs, compiled_phase.phase_num_inc)
                    };
                }

                blob.phases.push(compiled_phase);

                curr_blob_relative_offset += 4 * (cfg_len + 1);
                for dummy in blob.dummy_blobs.iter().rev().take(appended_dummies) {
                    curr_blob_relative_offset += 4 * (dummy.len() as u32 + 1);
                }
            }

            let info = compiled
                .stream_info
                .last_mut()
                .expect("every stream has phases");
            info.blob_size = curr_blob_relative_offset - curr_blob_start_offset;
            compiled.streams.push(blob);
        }

        compiled.full_blob_size = curr_blob_relative_offset;
        info!(
            "compiled {}: {} stream(s), blob bytes {:#x}",
            core,
            compiled.streams.len(),
            compiled.full_blob_size
        );
        cores.push(compiled);
    }

    Ok(cores)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Phase;
    use crate::regs::layout_for;

    fn sref(y: u32, x: u32, stream_id: u8) -> StreamRef {
        StreamRef::new(CoreId::new(0, y, x), stream_id)
    }

    fn grid() -> GridConfig {
        let mut grid = GridConfig::new();
        grid.add_chip(0, 10, 12);
        grid
    }

    fn phase(num: u64, num_msgs: u32) -> Phase {
        Phase {
            phase_num: num,
            buf_addr: 0x40000,
            buf_size: 0x4000,
            num_msgs,
            msg_size: Some(2048),
            ..Default::default()
        }
    }

    fn link(
        graph: &mut PhaseGraph,
        tx: StreamRef,
        rx: StreamRef,
        phase_nums: &[u64],
        num_msgs: u32,
    ) {
        for &pn in phase_nums {
            let mut send = phase(pn, num_msgs);
            send.source_endpoint = true;
            send.remote_receiver = true;
            send.dest = vec![rx];
            graph.insert_phase(tx, send);

            let mut recv = phase(pn, num_msgs);
            recv.buf_addr = 0x60000;
            recv.remote_source = true;
            recv.receiver_endpoint = true;
            graph.insert_phase(rx, recv);
        }
    }

    fn cfg() -> BlobGenConfig {
        // NOC extent mirrors the 10x12 test grid so plane-1 flips stay in range.
        BlobGenConfig {
            noc_x_size: 12,
            noc_y_size: 10,
            ..Default::default()
        }
    }

    fn compile(graph: &mut PhaseGraph) -> CompiledGraph {
        let layout = layout_for("wormhole").unwrap();
        compile_graph(graph, &grid(), &cfg(), layout).unwrap()
    }

    #[test]
    fn test_multi_phase_link_chains_headers() {
        let mut graph = PhaseGraph::new();
        let tx = sref(1, 1, 8);
        let rx = sref(1, 2, 9);
        let epoch = 2u64 << 32;
        link(&mut graph, tx, rx, &[epoch | 1, epoch | 2, epoch | 3], 4);
        let out = compile(&mut graph);

        assert_eq!(out.cores.len(), 2);
        let tx_core = &out.cores[0];
        assert_eq!(tx_core.core, CoreId::new(0, 1, 1));
        let info = tx_core.summary(8).unwrap();
        assert_eq!(info.epoch_num_msgs, 12);
        assert_eq!(info.num_iter_tiles, 12);
        assert_eq!(info.start_phase, epoch | 1);
        assert_eq!(info.last_phase_in_iter, epoch | 3);
        assert_eq!(info.blob_start_relative_offset, 0);

        let blob = &tx_core.streams[0];
        assert_eq!(blob.phases.len(), 3);
        // Three phases on one destination list: no dummy phase.
        assert!(blob.dummy_blobs.is_empty());
        // Each header carries the next phase's register count; the last
        // chains to nothing.
        let second_len = blob.phases[1].cfg_dws.len() as u32;
        assert_eq!(blob.phases[0].header_dw, blob_header_dw(second_len, 4, 0));
        assert_eq!(blob.phases[1].header_dw >> 24, blob.phases[2].cfg_dws.len() as u32);
        assert_eq!(blob.phases[1].header_dw & 0xFFF, 1);
        assert_eq!(blob.phases[2].header_dw, blob_header_dw(0, 4, 1));

        // Offsets account one header word per phase.
        let total: u32 = blob
            .phases
            .iter()
            .map(|p| 4 * (p.cfg_dws.len() as u32 + 1))
            .sum();
        assert_eq!(info.blob_size, total);
        assert_eq!(tx_core.full_blob_size, total);
    }

    #[test]
    fn test_single_phase_link_gets_dummy_phases() {
        let mut graph = PhaseGraph::new();
        let tx = sref(1, 1, 8);
        let rx = sref(1, 2, 9);
        link(&mut graph, tx, rx, &[(1 << 32) | 1], 2);
        let out = compile(&mut graph);

        let tx_blob = &out.cores[0].streams[0];
        assert_eq!(tx_blob.dummy_blobs.len(), 1);
        let dummy_len = tx_blob.dummy_blobs[0].len() as u32;
        assert_eq!(tx_blob.phases[0].header_dw, blob_header_dw(dummy_len, 2, 0));
        // The dummy blob contributes its own header word to the size.
        let info = out.cores[0].summary(8).unwrap();
        let phase_bytes = 4 * (tx_blob.phases[0].cfg_dws.len() as u32 + 1);
        assert_eq!(info.blob_size, phase_bytes + 4 * (dummy_len + 1));

        // The receiver side retires through its own dummy phase.
        let rx_blob = &out.cores[1].streams[0];
        assert_eq!(rx_blob.dummy_blobs.len(), 1);
    }

    #[test]
    fn test_operand_indices_and_counts() {
        let mut graph = PhaseGraph::new();
        let s = sref(2, 3, 4);
        let mut p = phase((1 << 32) | 5, 1);
        p.source_endpoint = true;
        p.receiver_endpoint = true;
        p.input_index = Some(2);
        graph.insert_phase(s, p);
        let out = compile(&mut graph);

        let core = &out.cores[0];
        assert_eq!(core.num_inputs, 3);
        assert_eq!(core.num_outputs, 0);
        assert_eq!(core.input_streams.get(&2), Some(&4));
    }

    #[test]
    fn test_intermediate_stream_loops_on_itself() {
        let mut graph = PhaseGraph::new();
        let s = sref(2, 3, 24);
        let mut p = phase((1 << 32) | 1, 6);
        p.source_endpoint = true;
        p.receiver_endpoint = true;
        p.intermediate = true;
        graph.insert_phase(s, p);
        let out = compile(&mut graph);

        let blob = &out.cores[0].streams[0];
        // Placeholder for the loop-back word, patched at serialization.
        assert_eq!(*blob.phases[0].cfg_dws.last().unwrap(), 0xaabbccdd);
        let len = blob.phases[0].cfg_dws.len() as u32;
        assert_eq!(blob.phases[0].header_dw, blob_header_dw(len, 6, 0));
        assert!(out.cores[0].summary(24).unwrap().flags & 0x10 != 0);
    }

    #[test]
    fn test_inconsistent_block_dims_rejected() {
        let mut graph = PhaseGraph::new();
        let mut a = phase((1 << 32) | 1, 1);
        a.source_endpoint = true;
        a.receiver_endpoint = true;
        a.mblock_m = 2;
        graph.insert_phase(sref(2, 3, 24), a);
        let mut b = phase((1 << 32) | 1, 1);
        b.source_endpoint = true;
        b.receiver_endpoint = true;
        b.mblock_m = 3;
        graph.insert_phase(sref(2, 3, 25), b);

        let layout = layout_for("wormhole").unwrap();
        let err = compile_graph(&mut graph, &grid(), &cfg(), layout).unwrap_err();
        assert!(matches!(
            err,
            BlobGenError::InconsistentBlockDim { attribute: "mblock_m", .. }
        ));
    }

    #[test]
    fn test_stream_flags_word() {
        let mut p = phase(1, 1);
        p.source_endpoint = true;
        p.park_input = true;
        assert_eq!(stream_flags(7, &p, None), 0x1);
        p.park_input = false;
        // A plain packer source is a brisc-pack stream.
        assert_eq!(stream_flags(7, &p, None), 0x400);
        p.fork_stream_ids = vec![7, 9];
        assert_eq!(stream_flags(7, &p, None), 0x400 | 0x100);

        let bufs = [DramBufferDesc {
            dram_io: true,
            dram_input: true,
            ..Default::default()
        }];
        assert_eq!(stream_flags(7, &p, Some(&bufs)), 0x400 | 0x100 | 0x2 | 0x4);
    }

    #[test]
    fn test_dram_noc_plane_rewrite_in_buf_list() {
        let cfg = BlobGenConfig {
            noc_x_size: 10,
            noc_y_size: 12,
            ..Default::default()
        };
        let mut p = phase(1, 1);
        p.outgoing_data_noc = Some(1);
        p.normalize();
        let bufs = [DramBufferDesc {
            dram_buf_noc_addr: (3u64 << 42) | (2u64 << 36) | 0x100,
            dram_output: true,
            ..Default::default()
        }];
        let out = materialize_dram_bufs(&cfg, &p, &bufs);
        assert_eq!((out[0].dram_buf_noc_addr >> 36) & 0x3F, 10 - 1 - 2);
        assert_eq!((out[0].dram_buf_noc_addr >> 42) & 0x3F, 12 - 1 - 3);
        assert_eq!(out[0].dram_buf_noc_addr & 0xF_FFFF_FFFF, 0x100);
    }
}
