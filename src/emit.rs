// This module serializes compiled cores into the per-core hex files the runtime loads
// into L1. Each file is a set of address-tagged sections: the epoch-info section at the
// overlay base (the fixed epoch struct followed by one summary record per active
// stream, plus variable-length pipe-scatter state and DRAM queue state), the blob
// section holding every phase's header word and register writes with dummy handshake
// blobs trailing their stream, and optional preload sections seeding data buffers.
// Addresses inside the records are resolved here: a stream's blob start becomes
// absolute, intermediate phases get their loop-back pointer patched over the compile
// placeholder, scatter unroll offsets are rebased, and DRAM streaming writers point at
// the header words inside their destination core's epoch section. The finished blob is
// checked against the per-core-class overlay budget before anything is written. Cores
// the graph never touches still get a file carrying an invalid epoch record so stale
// state from an earlier epoch can never look valid.

//! Hex serialization of compiled cores.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write as _;
use std::path::Path;

use hashbrown::HashMap;
use log::{debug, info};

use crate::blob::{blob_header_dw, intermediates_blob_loop_dw, append_mmio_pipe_coordinates};
use crate::compiler::{CompiledCore, CompiledGraph, StreamSummary};
use crate::core::config::{BlobGenConfig, EPOCH_MAX_NUM_TILE_SIZES, EPOCH_MAX_OUTPUT_FORKS};
use crate::core::coords::{CoreId, StreamRef, PHASE_SHIFT};
use crate::core::error::{BlobGenError, BlobGenResult};
use crate::core::grid::GridConfig;
use crate::layout::{
    dram_scatter_offsets_size, epoch_info_struct_size, msg_info_buf_addr, pipe_scatter_state_size,
    TileHeaderLayout, DRAM_STATE_STRUCT_SIZE, DRAM_SCATTER_STATE_STRUCT_SIZE,
    DRAM_STREAM_INFO_STRUCT_SIZE, EPOCH_STREAM_INFO_STRUCT_SIZE,
};
use crate::regs::RegisterLayout;

/// Address-tagged word runs, ordered by section base address.
pub type HexSections = BTreeMap<u32, Vec<u32>>;

fn scatter_state_size(info: &StreamSummary) -> u32 {
    if info.blob_scatter.is_empty() {
        0
    } else {
        pipe_scatter_state_size(&info.scatter_group_offset_counts())
    }
}

/// Lay out the per-stream records that follow the epoch struct: returns the
/// total size of that area and each active stream's record address.
pub fn compute_epoch_info_addrs(
    core: &CompiledCore,
    cfg: &BlobGenConfig,
    space_start: u32,
) -> (u32, HashMap<u8, u32>) {
    let struct_size = epoch_info_struct_size(cfg);
    let mut stream_addrs = HashMap::new();
    let mut total = 0u32;
    for info in &core.stream_info {
        stream_addrs.insert(info.stream_id, space_start + struct_size + total);
        total += EPOCH_STREAM_INFO_STRUCT_SIZE;
        total += scatter_state_size(info);
        if info.dram_stream {
            total += DRAM_STREAM_INFO_STRUCT_SIZE;
            for buf in &info.dram_bufs {
                total += DRAM_STATE_STRUCT_SIZE;
                if !buf.dram_scatter_offsets.is_empty() {
                    total += DRAM_SCATTER_STATE_STRUCT_SIZE;
                    total += dram_scatter_offsets_size(buf.dram_scatter_offsets.len());
                }
            }
        }
    }
    (total, stream_addrs)
}

/// Write every hex file for the compiled graph: one per core with phases
/// and an invalid-epoch file for every other core of every chip.
pub fn write_blobs(
    compiled: &CompiledGraph,
    graph_name: &str,
    out_dir: &Path,
    cfg: &BlobGenConfig,
    grid: &GridConfig,
    layout: &dyn RegisterLayout,
) -> BlobGenResult<()> {
    let io_err = |path: &Path, source: std::io::Error| BlobGenError::Io {
        path: path.display().to_string(),
        source,
    };
    fs::create_dir_all(out_dir).map_err(|e| io_err(out_dir, e))?;

    let mut used = hashbrown::HashSet::new();
    for core in &compiled.cores {
        used.insert(core.core);
        let sections = core_sections(compiled, core, cfg, layout)?;
        let path = out_dir.join(hex_file_name(graph_name, core.core));
        write_hex_file(&path, &sections).map_err(|e| io_err(&path, e))?;
    }

    for chip in grid.chip_ids() {
        let (size_y, size_x) = grid.chip_size(chip);
        for y in 0..=size_y {
            for x in 0..=size_x {
                let core = CoreId::new(chip, y, x);
                if used.contains(&core) {
                    continue;
                }
                if grid.worker_override_enabled()
                    && !grid.is_worker(y, x)
                    && !grid.is_ethernet(y, x)
                {
                    continue;
                }
                let is_eth = grid.is_ethernet(y, x);
                let invalid = CompiledCore::invalid(core, is_eth);
                let dws = populate_epoch_info(&invalid, cfg, None, &HashMap::new(), 0);
                let mut sections = HexSections::new();
                sections.insert(cfg.epoch_info_space_start(is_eth), dws);
                let path = out_dir.join(hex_file_name(graph_name, core));
                write_hex_file(&path, &sections).map_err(|e| io_err(&path, e))?;
            }
        }
    }
    info!("wrote blob hex files to {}", out_dir.display());
    Ok(())
}

pub fn hex_file_name(graph_name: &str, core: CoreId) -> String {
    format!("{}_{}_{}_{}.hex", graph_name, core.chip, core.y, core.x)
}

fn write_hex_file(path: &Path, sections: &HexSections) -> std::io::Result<()> {
    let mut out = String::new();
    for (addr, dws) in sections {
        out.push_str(&format!("@{:08x}\n", addr >> 2));
        for dw in dws {
            out.push_str(&format!("{dw:08x}\n"));
        }
    }
    let mut file = fs::File::create(path)?;
    file.write_all(out.as_bytes())
}

/// Serialize one core: the epoch-info section, the blob section, and any
/// preload sections, with the overlay budget enforced.
pub fn core_sections(
    compiled: &CompiledGraph,
    core: &CompiledCore,
    cfg: &BlobGenConfig,
    layout: &dyn RegisterLayout,
) -> BlobGenResult<HexSections> {
    let space_start = cfg.epoch_info_space_start(core.is_ethernet);
    let (stream_area_size, stream_addrs) = compute_epoch_info_addrs(core, cfg, space_start);
    let section_size = epoch_info_struct_size(cfg) + stream_area_size;
    let blob_space_start = space_start + section_size;

    let mut epoch_id = 0u64;
    let mut stream_info_dws = Vec::new();
    for info in &core.stream_info {
        epoch_id = info.start_phase >> PHASE_SHIFT;
        emit_stream_summary(
            compiled,
            core,
            info,
            cfg,
            &stream_addrs,
            blob_space_start,
            &mut stream_info_dws,
        )?;
    }

    let mut epoch_info_dws = populate_epoch_info(
        core,
        cfg,
        Some(&compiled.tile_headers),
        &stream_addrs,
        epoch_id,
    );
    epoch_info_dws.extend_from_slice(&stream_info_dws);

    let mut sections = HexSections::new();
    sections.insert(space_start, epoch_info_dws);
    debug!("{}: epoch info section at {space_start:#x}, blob at {blob_space_start:#x}", core.core);

    let mut blob_dws: Vec<u32> = Vec::new();
    for stream in &core.streams {
        let info = core
            .summary(stream.sref.stream_id)
            .ok_or_else(|| BlobGenError::GraphInput {
                reason: format!("{}: compiled stream has no summary record", stream.sref),
            })?;
        let blob_start_abs = info.blob_start_relative_offset + blob_space_start;
        for phase in &stream.phases {
            blob_dws.push(phase.header_dw);
            if phase.intermediate {
                // The compile-time placeholder becomes the loop-back pointer
                // now that the blob's absolute address is known.
                blob_dws.extend_from_slice(&phase.cfg_dws[..phase.cfg_dws.len() - 1]);
                blob_dws.push(intermediates_blob_loop_dw(layout, blob_start_abs));
            } else {
                blob_dws.extend_from_slice(&phase.cfg_dws);
            }
            if !phase.preload_data.is_empty() {
                sections.insert(phase.buf_addr, preload_section(phase.msg_size, &phase.preload_data));
            }
        }
        for (idx, dummy) in stream.dummy_blobs.iter().enumerate() {
            let is_last = idx + 1 >= stream.dummy_blobs.len();
            let next_len = if is_last {
                0
            } else {
                stream.dummy_blobs[idx + 1].len() as u32
            };
            blob_dws.push(blob_header_dw(next_len, 1, 0));
            for &dw in dummy {
                blob_dws.push(if is_last { layout.set_auto_cfg(dw, 0) } else { dw });
            }
        }
    }

    let blob_end = blob_space_start + 4 * blob_dws.len() as u32;
    let computed = blob_end - space_start;
    let allowed = if core.is_ethernet {
        cfg.overlay_blob_size_eth
    } else {
        cfg.overlay_blob_size + core.overlay_blob_extra_size
    };
    info!(
        "overlay blob size for (e:{epoch_id},c:{},y:{},x:{}) is {computed}",
        core.core.chip, core.core.y, core.core.x
    );
    if computed > allowed {
        return Err(BlobGenError::BlobBudgetExceeded {
            core: core.core,
            epoch: epoch_id,
            computed,
            allowed,
        });
    }
    sections.insert(blob_space_start, blob_dws);
    Ok(sections)
}

/// Expand a buffer's seed words: each message becomes msg_size/4 words, the
/// first carrying the seed's tag and the tile's word count, the rest zero.
fn preload_section(msg_size: u32, seeds: &[u32]) -> Vec<u32> {
    let mut dws = Vec::with_capacity(seeds.len() * (msg_size / 4) as usize);
    for &seed in seeds {
        dws.push((seed & 0xFFFF_0000) + (msg_size >> 4));
        for _ in 1..(msg_size / 4) {
            dws.push(0);
        }
    }
    dws
}

fn untilize_copy_fields(info: &StreamSummary) -> (u32, u32) {
    if info.moves_raw_data && info.tile_dim_r != 0 {
        let iters = info.tile_dim_r / 2;
        let log2x = f64::from(info.tile_dim_r).log2().round() as u32;
        (log2x, iters)
    } else {
        (0, 0)
    }
}

/// Queue slots this stream drains over the epoch.
fn epoch_q_slots_remaining(
    sref: StreamRef,
    info: &StreamSummary,
) -> BlobGenResult<u32> {
    let buf = &info.dram_bufs[0];
    let whole_slots = |slot_tiles: u32| {
        if slot_tiles == 0 {
            Err(BlobGenError::QSlotUnderflow { stream: sref })
        } else {
            Ok(info.epoch_num_msgs / slot_tiles)
        }
    };
    if info.moves_raw_data {
        return whole_slots(buf.q_slot_size_tiles());
    }
    if !buf.dram_scatter_offsets.is_empty() {
        let slot_tiles = u64::from(buf.dram_scatter_offsets_full_size)
            * u64::from(buf.dram_scatter_chunk_size_tiles)
            * u64::from(info.num_scatter_inner_loop);
        let mut remaining = u64::from(info.epoch_num_msgs);
        let mut slots = 0u32;
        while remaining > 0 {
            if slot_tiles == 0 || remaining < slot_tiles {
                return Err(BlobGenError::QSlotUnderflow { stream: sref });
            }
            remaining -= slot_tiles;
            slots += 1;
        }
        return Ok(slots);
    }
    whole_slots(buf.q_slot_size_tiles())
}

fn fork_index_words(core: &CompiledCore, info: &StreamSummary) -> [u32; 4] {
    let mut words = [0u32; 4];
    for slot in 0..EPOCH_MAX_OUTPUT_FORKS {
        let active_info_idx = if slot < info.fork_stream_ids.len() {
            let fork_id = info.fork_stream_ids[slot];
            core.stream_info
                .iter()
                .filter(|other| other.stream_id < fork_id)
                .count() as u32
        } else {
            0
        };
        words[slot / 4] |= (active_info_idx & 0xFF) << (8 * (slot % 4));
    }
    words
}

#[allow(clippy::too_many_arguments)]
fn emit_stream_summary(
    compiled: &CompiledGraph,
    core: &CompiledCore,
    info: &StreamSummary,
    cfg: &BlobGenConfig,
    stream_addrs: &HashMap<u8, u32>,
    blob_space_start: u32,
    dws: &mut Vec<u32>,
) -> BlobGenResult<()> {
    let sref = StreamRef::new(core.core, info.stream_id);
    let stream_addr = stream_addrs[&info.stream_id];
    let buf_size_tiles = (info.buf_full_size_bytes >> 4) / info.msg_size_words;
    let blob_start_abs = info.blob_start_relative_offset + blob_space_start;
    let scatter_size = scatter_state_size(info);
    let blob_scatter_offsets_base = if info.blob_scatter.is_empty() {
        0
    } else {
        stream_addr + EPOCH_STREAM_INFO_STRUCT_SIZE
    };

    dws.push((info.producer_epoch_id << 16) | u32::from(info.stream_id));
    dws.push((info.start_phase & 0xFFFF) as u32);
    dws.push(info.epoch_num_msgs);
    dws.push(info.msg_size_words);
    dws.push(buf_size_tiles);
    dws.push(info.buf_full_size_bytes);
    dws.push(info.buf_base_addr);
    dws.push((info.start_phase_num_cfg_regs << 16) | info.num_msgs_in_block);
    dws.push(info.msg_info_buf_start_words);
    dws.push(blob_start_abs);
    dws.push(info.blob_size);
    let total_iters = info.num_iters_in_epoch
        * if info.is_scatter_pack {
            info.num_unroll_iter * info.padding_scatter_order_size
        } else {
            1
        };
    dws.push(total_iters);
    dws.push(total_iters);
    dws.push(info.num_scatter_inner_loop);
    dws.push((1 << 16) | (info.eth_remote_fw_stream_id << 8) | u32::from(info.legacy_pack));
    dws.push(info.flags);
    // One full stride, no offset.
    dws.push(1 << 16);
    dws.push(0);
    dws.push(info.pipe_scatter_output_loop_count);
    dws.push(blob_scatter_offsets_base);
    dws.push(0);
    dws.push(0);
    dws.push(info.num_iter_tiles);
    dws.push((info.r_dim_size << 16) | info.c_dim_size);
    dws.push((info.zr_dim_size << 16) | info.zc_dim_size);
    for _ in 0..8 {
        dws.push(0);
    }
    let num_dram_bufs = if info.dram_stream {
        info.dram_bufs.len() as u32
    } else {
        0
    };
    let (log2x_untilize, untilize_iters) = untilize_copy_fields(info);
    dws.push((num_dram_bufs << 16) | (log2x_untilize << 8) | untilize_iters);
    dws.push(stream_addr + EPOCH_STREAM_INFO_STRUCT_SIZE + scatter_size);
    dws.push(info.num_fork_streams | (info.padding_scatter_order_size << 16));
    dws.extend_from_slice(&fork_index_words(core, info));

    if !info.blob_scatter.is_empty() {
        let mut full_slots = 0u32;
        let mut state_array_base =
            blob_scatter_offsets_base + info.blob_scatter.len() as u32 * 16;
        for (_, group) in &info.blob_scatter {
            dws.push(0);
            dws.push(group.num_unroll_iter);
            dws.push(0);
            dws.push(state_array_base);
            state_array_base += group.offsets.len() as u32 * 8;
            full_slots += 16;
        }
        for (_, group) in &info.blob_scatter {
            for (offset, cfg_regs) in group.offsets.iter().zip(&group.phase_num_cfg_regs) {
                dws.push(offset + blob_space_start);
                dws.push(*cfg_regs);
                full_slots += 8;
            }
        }
        for _ in (full_slots / 4)..(scatter_size / 4) {
            dws.push(0);
        }
    }

    if info.dram_stream {
        let first_buf = &info.dram_bufs[0];
        let q_slots_remaining = epoch_q_slots_remaining(sref, info)?;
        let has_multi_readers = info.dram_bufs.iter().any(|buf| buf.total_readers > 1);

        dws.push(first_buf.q_slot_size_bytes());
        dws.push(
            (u32::from(has_multi_readers) << 24)
                | (u32::from(info.dram_output_no_push) << 16)
                | (info.outgoing_data_noc << 8)
                | info.incoming_data_noc,
        );
        dws.push(info.c_dim_loop_num_rows << 16);
        dws.push(0);
        dws.push(0);
        dws.push(q_slots_remaining);
        dws.push(u32::from(info.dram_writes_with_cmd_buf) << 16);
        let start_dram_state_ptr = stream_addr
            + EPOCH_STREAM_INFO_STRUCT_SIZE
            + scatter_size
            + DRAM_STREAM_INFO_STRUCT_SIZE;
        let mut curr_dram_state_ptr = start_dram_state_ptr;
        dws.push(curr_dram_state_ptr);

        for (buf_id, buf) in info.dram_bufs.iter().enumerate() {
            let dram_scatter_struct_ptr = if buf.dram_scatter_offsets.is_empty() {
                0
            } else {
                curr_dram_state_ptr + DRAM_STATE_STRUCT_SIZE
            };
            let dram_scatter_offset_ptr =
                curr_dram_state_ptr + DRAM_STATE_STRUCT_SIZE + DRAM_SCATTER_STATE_STRUCT_SIZE;
            let offsets_size = dram_scatter_offsets_size(buf.dram_scatter_offsets.len());
            if buf_id == info.dram_bufs.len() - 1 {
                curr_dram_state_ptr = start_dram_state_ptr;
            } else {
                curr_dram_state_ptr += DRAM_STATE_STRUCT_SIZE
                    + if buf.dram_scatter_offsets.is_empty() {
                        0
                    } else {
                        offsets_size + DRAM_SCATTER_STATE_STRUCT_SIZE
                    };
            }

            let data_chunk_size_tiles = if buf.dram_output {
                buf.dram_buf_write_chunk_size_tiles
            } else {
                buf.dram_buf_read_chunk_size_tiles
            };
            let data_chunk_size_bytes = data_chunk_size_tiles * buf.msg_size;
            let dram_q_slot_size_tiles = if info.moves_raw_data {
                info.batch_dim_size
            } else if !buf.dram_scatter_offsets.is_empty() {
                buf.dram_scatter_offsets_full_size
                    * buf.dram_scatter_chunk_size_tiles
                    * info.num_scatter_inner_loop
            } else {
                buf.q_slot_size_tiles()
            };

            let mut dram_streaming_header_addr = 0u64;
            if buf.dram_output && buf.dram_streaming {
                let dest = buf.dram_streaming_dest.ok_or(BlobGenError::GraphInput {
                    reason: format!("{sref}: streaming DRAM buffer has no destination stream"),
                })?;
                dram_streaming_header_addr =
                    streaming_dest_header_addr(compiled, cfg, sref, dest, buf.dram_buf_noc_addr)?;
            }

            for _ in 0..6 {
                dws.push(0);
            }
            dws.push(if buf.dram_input && buf.dram_streaming {
                (info.start_phase >> PHASE_SHIFT) as u32
            } else {
                0
            });
            for _ in 0..5 {
                dws.push(0);
            }
            dws.push((dram_streaming_header_addr & 0xFFFF_FFFF) as u32);
            dws.push((dram_streaming_header_addr >> 32) as u32);
            dws.push(data_chunk_size_bytes);
            dws.push((u32::from(buf.dram_padding) << 16) | data_chunk_size_tiles);
            dws.push(buf.dram_buf_size_bytes);
            dws.push(buf.dram_buf_size_q_slots);
            dws.push((buf.dram_buf_noc_addr & 0xFFFF_FFFF) as u32);
            dws.push((buf.dram_buf_noc_addr >> 32) as u32);
            dws.push(dram_q_slot_size_tiles);
            dws.push((buf.total_readers << 8) | buf.reader_index);
            dws.push(dram_scatter_struct_ptr);
            dws.push(curr_dram_state_ptr);

            if !buf.dram_scatter_offsets.is_empty() {
                dws.push(0);
                dws.push(buf.dram_scatter_offsets.len() as u32);
                dws.push(buf.dram_scatter_chunk_size_tiles * buf.msg_size);
                dws.push(buf.q_slot_size_bytes());
                dws.push(buf.dram_scatter_chunk_size_tiles);
                dws.push(0);
                dws.push(0);
                dws.push(dram_scatter_offset_ptr);
                for slot in 0..(offsets_size / 8) as usize {
                    match buf.dram_scatter_offsets.get(slot) {
                        Some(offset) => {
                            dws.push((offset & 0xFFFF_FFFF) as u32);
                            dws.push((offset >> 32) as u32);
                        }
                        None => {
                            dws.push(0);
                            dws.push(0);
                        }
                    }
                }
            }
        }
    }
    Ok(())
}

/// Where a streaming DRAM writer lands its header words: the DRAM state
/// record inside the destination core's epoch section, with the buffer's
/// pipe coordinates folded in.
fn streaming_dest_header_addr(
    compiled: &CompiledGraph,
    cfg: &BlobGenConfig,
    sref: StreamRef,
    dest: StreamRef,
    dram_buf_noc_addr: u64,
) -> BlobGenResult<u64> {
    let missing = || BlobGenError::GraphInput {
        reason: format!("{sref}: streaming destination {dest} was never compiled"),
    };
    let dest_core = compiled
        .cores
        .iter()
        .find(|c| c.core == dest.core)
        .ok_or_else(missing)?;
    let dest_info = dest_core.summary(dest.stream_id).ok_or_else(missing)?;
    let dest_space_start = cfg.epoch_info_space_start(dest_core.is_ethernet);
    let (_, dest_addrs) = compute_epoch_info_addrs(dest_core, cfg, dest_space_start);
    let header_addr = u64::from(
        dest_addrs[&dest.stream_id]
            + EPOCH_STREAM_INFO_STRUCT_SIZE
            + scatter_state_size(dest_info)
            + DRAM_STREAM_INFO_STRUCT_SIZE,
    );
    Ok(append_mmio_pipe_coordinates(cfg, dram_buf_noc_addr, header_addr))
}

/// The fixed-size epoch struct at the head of the epoch-info section.
pub fn populate_epoch_info(
    core: &CompiledCore,
    cfg: &BlobGenConfig,
    tile_headers: Option<&TileHeaderLayout>,
    stream_addrs: &HashMap<u8, u32>,
    epoch_id: u64,
) -> Vec<u32> {
    let mut dws = Vec::with_capacity(264);
    dws.push(core.num_inputs);
    dws.push(core.num_outputs);
    dws.push(core.stream_info.len() as u32);
    dws.push(1); // epoch_valid; all_streams_ready etc. start clear

    let tile_sizes: &[u32] = if core.overlay_valid == 1 {
        tile_headers.map_or(&[], |t| t.sizes_for(core.core, core.is_ethernet))
    } else {
        &[]
    };
    dws.push(tile_sizes.len() as u32);
    for &size in tile_sizes {
        dws.push(size / 16);
    }
    for _ in tile_sizes.len()..EPOCH_MAX_NUM_TILE_SIZES {
        dws.push(0);
    }
    for index in 0..tile_sizes.len() {
        dws.push(msg_info_buf_addr(cfg, core.is_ethernet, index));
    }
    for _ in tile_sizes.len()..EPOCH_MAX_NUM_TILE_SIZES {
        dws.push(0);
    }

    let operand_addr = |streams: &HashMap<u32, u8>, i: u32| {
        streams
            .get(&i)
            .and_then(|id| stream_addrs.get(id))
            .copied()
            .unwrap_or(0)
    };
    for i in 0..cfg.epoch_max_inputs as u32 {
        dws.push(if i < core.num_inputs {
            operand_addr(&core.input_streams, i)
        } else {
            0
        });
    }
    for i in 0..cfg.epoch_max_outputs as u32 {
        dws.push(if i < core.num_outputs {
            operand_addr(&core.output_streams, i)
        } else {
            0
        });
    }
    for info in &core.stream_info {
        dws.push(stream_addrs[&info.stream_id]);
    }
    for _ in core.stream_info.len()..cfg.noc_num_streams {
        dws.push(0);
    }

    let skip_kernels = if core.num_inputs == 0 && core.num_outputs == 0 {
        1
    } else {
        core.skip_kernels
    };

    // Performance trace request/ack counters and buffer addresses, unused.
    for _ in 0..25 {
        dws.push(0);
    }
    dws.push(0); // extra_dram_q_state_addr

    dws.push((core.ublock_ct << 16) | core.ublock_rt);
    dws.push((core.mblock_n << 16) | core.mblock_m);
    dws.push(
        (u32::from(core.has_packer_mcast_opt) << 24)
            | (u32::from(core.has_eth_stream_trans) << 16)
            | core.mblock_k,
    );
    dws.push((skip_kernels << 16) | (core.overlay_valid & 0xFF));
    dws.push(epoch_id as u32);

    // Tile clear blob.
    for _ in 0..96 {
        dws.push(0);
    }

    dws.push(0x1); // dummy_phase_tile_header_and_data[0]
    dws.push(0x0);
    dws.push(0x0);
    dws.push(if core.is_ethernet {
        0
    } else {
        core.overlay_blob_extra_size
    });

    dws
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile_graph;
    use crate::graph::{DramBufferDesc, Phase, PhaseGraph};
    use crate::regs::layout_for;

    fn sref(y: u32, x: u32, stream_id: u8) -> StreamRef {
        StreamRef::new(CoreId::new(0, y, x), stream_id)
    }

    fn grid() -> GridConfig {
        let mut grid = GridConfig::new();
        grid.add_chip(0, 2, 2);
        grid
    }

    fn endpoint_phase(num: u64, num_msgs: u32) -> Phase {
        Phase {
            phase_num: num,
            buf_addr: 0x40000,
            buf_size: 0x4000,
            num_msgs,
            msg_size: Some(2048),
            source_endpoint: true,
            receiver_endpoint: true,
            ..Default::default()
        }
    }

    fn compiled_one_stream() -> CompiledGraph {
        let mut graph = PhaseGraph::new();
        graph.insert_phase(sref(1, 1, 8), endpoint_phase((2 << 32) | 5, 4));
        let layout = layout_for("wormhole").unwrap();
        compile_graph(&mut graph, &grid(), &BlobGenConfig::default(), layout).unwrap()
    }

    #[test]
    fn test_epoch_info_struct_is_exactly_one_struct() {
        let cfg = BlobGenConfig::default();
        let compiled = compiled_one_stream();
        let core = &compiled.cores[0];
        let (_, addrs) =
            compute_epoch_info_addrs(core, &cfg, cfg.epoch_info_space_start(false));
        let dws = populate_epoch_info(core, &cfg, Some(&compiled.tile_headers), &addrs, 2);
        assert_eq!(dws.len() as u32 * 4, epoch_info_struct_size(&cfg));
        // num_inputs, num_outputs, num_active_streams, epoch_valid.
        assert_eq!(&dws[..4], &[0, 0, 1, 1]);
        // One tile size of 2048 bytes, 128 words.
        assert_eq!(dws[4], 1);
        assert_eq!(dws[5], 128);
        assert_eq!(dws[6], 0);
    }

    #[test]
    fn test_stream_record_addresses_and_sizes() {
        let cfg = BlobGenConfig::default();
        let compiled = compiled_one_stream();
        let core = &compiled.cores[0];
        let space_start = cfg.epoch_info_space_start(false);
        let (total, addrs) = compute_epoch_info_addrs(core, &cfg, space_start);
        assert_eq!(total, EPOCH_STREAM_INFO_STRUCT_SIZE);
        assert_eq!(addrs[&8], space_start + epoch_info_struct_size(&cfg));
    }

    #[test]
    fn test_core_sections_layout() {
        let cfg = BlobGenConfig::default();
        let layout = layout_for("wormhole").unwrap();
        let compiled = compiled_one_stream();
        let core = &compiled.cores[0];
        let sections = core_sections(&compiled, core, &cfg, layout).unwrap();

        let space_start = cfg.epoch_info_space_start(false);
        let section_size = epoch_info_struct_size(&cfg) + EPOCH_STREAM_INFO_STRUCT_SIZE;
        let epoch_section = &sections[&space_start];
        // Epoch struct plus exactly one 40-word stream record.
        assert_eq!(epoch_section.len() as u32 * 4, section_size);

        let blob_section = &sections[&(space_start + section_size)];
        let stream = &core.streams[0];
        assert_eq!(
            blob_section.len(),
            stream.phases[0].cfg_dws.len() + 1
        );
        assert_eq!(blob_section[0], stream.phases[0].header_dw);

        // The summary record points at the absolute blob start.
        let info = core.summary(8).unwrap();
        let record = &epoch_section[epoch_info_struct_size(&cfg) as usize / 4..];
        assert_eq!(record[0], u32::from(8u8)); // producer_epoch_id 0, stream id 8
        assert_eq!(record[1], 5); // start phase low bits
        assert_eq!(record[2], 4); // epoch_num_msgs
        assert_eq!(record[9], space_start + section_size);
        assert_eq!(record[10], info.blob_size);
    }

    #[test]
    fn test_dram_header_and_raw_dim_words() {
        let mut graph = PhaseGraph::new();
        let mut p = endpoint_phase((2 << 32) | 5, 4);
        p.r_dim_size = 2;
        p.c_dim_size = 3;
        p.zr_dim_size = 4;
        p.zc_dim_size = 5;
        p.dram_writes_with_cmd_buf = true;
        graph.insert_phase(sref(1, 1, 8), p);
        graph.dram_buffers.insert(
            sref(1, 1, 8),
            vec![DramBufferDesc {
                dram_io: true,
                dram_input: true,
                dram_buf_size_tiles: 8,
                dram_buf_size_q_slots: 4,
                msg_size: 2048,
                ..Default::default()
            }],
        );
        let cfg = BlobGenConfig::default();
        let layout = layout_for("wormhole").unwrap();
        let compiled = compile_graph(&mut graph, &grid(), &cfg, layout).unwrap();
        let core = &compiled.cores[0];
        let sections = core_sections(&compiled, core, &cfg, layout).unwrap();
        let epoch_section = &sections[&cfg.epoch_info_space_start(false)];
        let record = &epoch_section[epoch_info_struct_size(&cfg) as usize / 4..];

        assert_eq!(record[23], (2 << 16) | 3);
        assert_eq!(record[24], (4 << 16) | 5);
        // DRAM header: untouched row-loop count and the cmd-buf write bit.
        assert_eq!(record[42], 32 << 16);
        assert_eq!(record[45], 2); // 4 msgs over 2-tile q slots
        assert_eq!(record[46], 1 << 16);
    }

    #[test]
    fn test_blob_budget_enforced() {
        let cfg = BlobGenConfig {
            overlay_blob_size: 16,
            ..Default::default()
        };
        let layout = layout_for("wormhole").unwrap();
        let compiled = compiled_one_stream();
        let err = core_sections(&compiled, &compiled.cores[0], &cfg, layout).unwrap_err();
        assert!(matches!(err, BlobGenError::BlobBudgetExceeded { .. }));
    }

    #[test]
    fn test_preload_section_expansion() {
        let dws = preload_section(64, &[0xabcd0000, 0x12345678]);
        assert_eq!(dws.len(), 2 * 16);
        assert_eq!(dws[0], 0xabcd0000 + 4);
        assert!(dws[1..16].iter().all(|&dw| dw == 0));
        assert_eq!(dws[16], 0x12340000 + 4);
    }

    #[test]
    fn test_fork_index_words_pack_low_byte_first() {
        let compiled = compiled_one_stream();
        let core = &compiled.cores[0];
        let mut info = core.stream_info[0].clone();
        info.fork_stream_ids = vec![8, 9];
        // Stream 8 is the only active stream: index 0 for id 8, 1 for id 9.
        let words = fork_index_words(core, &info);
        assert_eq!(words, [0x0100, 0, 0, 0]);
    }

    #[test]
    fn test_invalid_epoch_record() {
        let cfg = BlobGenConfig::default();
        let invalid = CompiledCore::invalid(CoreId::new(0, 9, 9), false);
        let dws = populate_epoch_info(&invalid, &cfg, None, &HashMap::new(), 0);
        assert_eq!(dws.len() as u32 * 4, epoch_info_struct_size(&cfg));
        assert_eq!(&dws[..5], &[0, 0, 0, 1, 0]);
        // skip_kernels set, overlay_valid clear.
        assert_eq!(dws[dws.len() - 102], 1 << 16);
    }

    #[test]
    fn test_hex_file_format() {
        let dir = std::env::temp_dir().join("blobgen_emit_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("fmt.hex");
        let mut sections = HexSections::new();
        sections.insert(0x8000, vec![0xdeadbeef, 0x1]);
        sections.insert(0x100, vec![0x2]);
        write_hex_file(&path, &sections).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "@00000040\n00000002\n@00002000\ndeadbeef\n00000001\n");
    }
}
