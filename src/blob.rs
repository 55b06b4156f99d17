// This module produces the per-phase register-write lists. A phase blob is the diff a
// core's firmware applies to a stream's configuration registers to move it from one
// phase to the next, so only registers whose values actually change are written: a
// phase whose source is unchanged skips the local buffer registers, one whose
// destination is unchanged skips the remote-destination block. Each write is packed as
// one double-word, value in the upper 24 bits and register index in the lower 8, via
// blob_cfg_dw. Coordinates are flipped through the NOC-1 mirror when the chosen data
// plane is 1, Ethernet endpoints address their peer with the all-ones NOC id, and a
// handful of registers double as firmware scratch counters on DRAM and endpoint
// phases. Dummy phase blobs are the minimal handshake-only variant appended after a
// stream's real phases so a lone sender/receiver pair can retire its final phase.
// Everything revision-specific is delegated to the RegisterLayout given by the caller.

//! Per-phase register-write list generation.

use crate::core::config::BlobGenConfig;
use crate::core::coords::{dummy_phase_num, wrap_phase_num, StreamRef, WRAPPED_PHASE_MASK};
use crate::core::error::{BlobGenError, BlobGenResult};
use crate::core::grid::{noc1_x_id, noc1_y_id};
use crate::graph::{DramBufferDesc, Phase};
use crate::regs::{
    blob_cfg_dw, eth_noc_id, GatherFields, McastDestFields, PhaseCfgFields, RegisterLayout,
    MEM_WORD_BYTES, NOC_ADDR_LOCAL_WIDTH, NOC_ID_WIDTH, STREAM_REG_CFG_DATA_WIDTH,
};

/// Pack a phase-header double-word: the next phase's register-write count,
/// this phase's message count, and the phase-number increment.
pub fn blob_header_dw(next_phase_num_cfg_writes: u32, curr_phase_num_msgs: u32, phase_num_incr: u32) -> u32 {
    (next_phase_num_cfg_writes << 24) | (curr_phase_num_msgs << 12) | phase_num_incr
}

/// The auto-config pointer write that loops an intermediate stream's blob
/// back to its start.
pub fn intermediates_blob_loop_dw(layout: &dyn RegisterLayout, phase_start_addr: u32) -> u32 {
    blob_cfg_dw(layout.indices().phase_auto_cfg_ptr, phase_start_addr)
}

/// Rewrite the NOC coordinate fields packed inside a 64-bit DRAM address for
/// the mirrored plane.
pub fn modify_dram_noc_addr(cfg: &BlobGenConfig, dram_addr: u64, noc_id: u32) -> u64 {
    let local = dram_addr & ((1 << NOC_ADDR_LOCAL_WIDTH) - 1);
    let mut noc_x = ((dram_addr >> NOC_ADDR_LOCAL_WIDTH) & ((1 << NOC_ID_WIDTH) - 1)) as u32;
    let mut noc_y =
        ((dram_addr >> (NOC_ADDR_LOCAL_WIDTH + NOC_ID_WIDTH)) & ((1 << NOC_ID_WIDTH) - 1)) as u32;
    let rest = dram_addr >> (NOC_ADDR_LOCAL_WIDTH + 2 * NOC_ID_WIDTH);

    if noc_id == 1 {
        noc_x = noc1_x_id(cfg, noc_x);
        noc_y = noc1_y_id(cfg, noc_y);
    }

    (rest << (NOC_ADDR_LOCAL_WIDTH + 2 * NOC_ID_WIDTH))
        | (u64::from(noc_y) << (NOC_ADDR_LOCAL_WIDTH + NOC_ID_WIDTH))
        | (u64::from(noc_x) << NOC_ADDR_LOCAL_WIDTH)
        | local
}

/// Multicast rides the even VCs; the odd ones are reserved for unicast DRAM
/// writes, and the register field cannot express both at once.
fn check_mcast_vc(sref: StreamRef, phase: &Phase) -> BlobGenResult<()> {
    if phase.vc() & 1 == 1 {
        return Err(BlobGenError::GraphInput {
            reason: format!(
                "{}: multicast phase {} requests odd VC {}",
                sref,
                phase.phase_num,
                phase.vc()
            ),
        });
    }
    Ok(())
}

/// Fold the pipe coordinate bits of a DRAM buffer address into a local
/// header address, for streaming destinations reached over MMIO.
pub fn append_mmio_pipe_coordinates(cfg: &BlobGenConfig, dram_buf_addr: u64, dram_header_addr: u64) -> u64 {
    let shift = 64 - u64::from(cfg.tensix_mem_size - 1).leading_zeros();
    let coords = (dram_buf_addr >> shift) << shift;
    coords | dram_header_addr
}

/// One phase's inputs to the register-write recipe, gathered by the compiler.
pub struct PhaseBlobArgs<'a> {
    pub sref: StreamRef,
    pub phase: &'a Phase,
    pub prev_phase: Option<&'a Phase>,
    pub has_next_phase: bool,
    pub next_phase_is_dummy: bool,
    /// Peer phase on the destination stream; required when the destination
    /// registers are (re)written this phase.
    pub dest_phase: Option<&'a Phase>,
    pub dram_bufs: &'a [DramBufferDesc],
}

fn missing_dest(args: &PhaseBlobArgs) -> BlobGenError {
    BlobGenError::MissingPeerPhase {
        stream: args.sref,
        peer: args.phase.dest[0],
        phase: args.phase.phase_num,
    }
}

/// Build the register-write list for one phase.
pub fn phase_blob(
    layout: &dyn RegisterLayout,
    cfg: &BlobGenConfig,
    args: &PhaseBlobArgs,
) -> BlobGenResult<Vec<u32>> {
    let phase = args.phase;
    let regs = layout.indices();
    let chip_id = args.sref.core.chip;

    let first_phase = args.prev_phase.is_none();
    let src_change = args
        .prev_phase
        .is_none_or(|prev| prev.next_phase_src_change());
    let dest_change = args
        .prev_phase
        .is_none_or(|prev| prev.next_phase_dest_change())
        || phase.no_dest_handshake;

    let scatter_to_dram = phase.dram_output && !phase.legacy_pack;
    let dram_read_phase_resets_pointers = phase.dram_input && src_change && phase.ptrs_not_zero;
    let phase_resets_pointers = src_change;

    let mut dws: Vec<u32> = Vec::new();

    // The current-phase register only needs a write when the hardware's
    // automatic increment cannot reach the new number.
    match args.prev_phase {
        Some(prev) if phase.scatter_order_size <= 1 => {
            let phase_num_inc = phase.phase_num - prev.phase_num;
            let wrapped =
                (phase.phase_num & !WRAPPED_PHASE_MASK) != (prev.phase_num & !WRAPPED_PHASE_MASK);
            if phase_num_inc >= 4096 || wrapped {
                dws.push(blob_cfg_dw(regs.curr_phase, wrap_phase_num(phase.phase_num)));
            }
        }
        _ => dws.push(blob_cfg_dw(regs.curr_phase, wrap_phase_num(phase.phase_num))),
    }

    let mut dram_num_msgs = 0u32;
    if phase.uses_dram() {
        let total: u64 = args
            .dram_bufs
            .iter()
            .map(|buf| u64::from(buf.num_msgs))
            .sum::<u64>()
            * u64::from(phase.num_unroll_iter.max(1));
        dram_num_msgs = if total > u64::from(cfg.max_msgs_per_phase)
            || phase.dram_input_no_push
            || scatter_to_dram
            || dram_read_phase_resets_pointers
            || phase.next_phase_src_change()
        {
            phase.num_msgs
        } else {
            total as u32
        };
    }

    if src_change {
        dws.push(blob_cfg_dw(regs.buf_start, phase.buf_addr / MEM_WORD_BYTES));
        dws.push(blob_cfg_dw(regs.buf_size, phase.buf_size / MEM_WORD_BYTES));
        let msg_info_addr = phase.msg_info_buf_addr.expect("layout pass assigns this");
        dws.push(blob_cfg_dw(regs.msg_info_ptr, msg_info_addr / MEM_WORD_BYTES));
        if !phase.resend {
            dws.push(blob_cfg_dw(regs.msg_info_wr_ptr, msg_info_addr / MEM_WORD_BYTES));
        }

        if phase.remote_source || (phase.eth_receiver && phase.source_endpoint) {
            let src = phase.src.first().ok_or(BlobGenError::GraphInput {
                reason: format!("{}: remote-source phase {} has no resolved source", args.sref, phase.phase_num),
            })?;
            if !phase.eth_receiver && src.core.chip != chip_id {
                return Err(BlobGenError::GraphInput {
                    reason: format!("{}: source {} is on another chip", args.sref, src),
                });
            }
            let (src_x, src_y) = if phase.eth_receiver {
                (eth_noc_id(), eth_noc_id())
            } else if phase.remote_src_update_noc() == 1 {
                (noc1_x_id(cfg, src.core.x), noc1_y_id(cfg, src.core.y))
            } else {
                (src.core.x, src.core.y)
            };
            dws.push(blob_cfg_dw(
                regs.remote_src,
                layout.remote_src_word(src_x, src_y, u32::from(src.stream_id), phase.src_dest_index),
            ));
            dws.push(blob_cfg_dw(regs.remote_src_phase, wrap_phase_num(phase.phase_num)));
        }

        if phase.local_sources_connected {
            if first_phase {
                layout.emit_gather(
                    &GatherFields {
                        arb_group_size: phase.arb_group_size(),
                        src_in_order_fwd: phase.src_in_order_fwd,
                        src_in_order_fwd_num_msgs: phase.src_in_order_fwd_num_msgs,
                        local_stream_clear_num: phase.local_stream_clear_num(),
                        msg_group_stream_clear_type: phase.msg_group_stream_clear_type,
                    },
                    &mut dws,
                );
            }

            let mut no_sender_below_stream_40 = true;
            let mut local_src_mask = vec![false; cfg.noc_num_streams];
            for src in &phase.src {
                if src.core.chip != chip_id {
                    return Err(BlobGenError::GraphInput {
                        reason: format!("{}: gather source {} is on another chip", args.sref, src),
                    });
                }
                local_src_mask[usize::from(src.stream_id)] = true;
                if src.stream_id < 40 {
                    no_sender_below_stream_40 = false;
                }
            }
            let width = STREAM_REG_CFG_DATA_WIDTH as usize;
            let num_mask_regs = cfg.noc_num_streams.div_ceil(width);
            for k in 0..num_mask_regs {
                let mut val = 0u32;
                for s in (k * width)..((k + 1) * width).min(cfg.noc_num_streams) {
                    if local_src_mask[s] {
                        val |= 1 << (s - k * width);
                    }
                }
                if first_phase || !no_sender_below_stream_40 || k > 0 {
                    dws.push(blob_cfg_dw(regs.local_src_mask + k as u8, val));
                }
            }
        }
    }

    if (src_change || phase.dram_input_no_push)
        && phase.uses_dram()
        && phase.dram_input
        && phase.source_endpoint
    {
        // Scratch: tiles pushed into the stream on the DRAM read side.
        let resets = u32::from(dram_read_phase_resets_pointers) << 16;
        dws.push(blob_cfg_dw(
            regs.remote_src_phase,
            resets | if phase.resend { 0 } else { dram_num_msgs },
        ));
    }

    if dest_change {
        if phase.remote_receiver || (phase.eth_sender && phase.receiver_endpoint) {
            let dest = phase.dest.first().ok_or(BlobGenError::GraphInput {
                reason: format!("{}: sender phase {} has no destination", args.sref, phase.phase_num),
            })?;
            let dest2 = phase.dest.get(1);
            if !phase.eth_sender && dest.core.chip != chip_id {
                return Err(BlobGenError::GraphInput {
                    reason: format!("{}: destination {} is on another chip", args.sref, dest),
                });
            }

            let (dest_x, dest_y) = if phase.eth_sender {
                (eth_noc_id(), eth_noc_id())
            } else if phase.outgoing_data_noc() == 1 {
                let corner = dest2.unwrap_or(dest);
                (noc1_x_id(cfg, corner.core.x), noc1_y_id(cfg, corner.core.y))
            } else {
                (dest.core.x, dest.core.y)
            };

            let dest_phase = args.dest_phase.ok_or_else(|| missing_dest(args))?;
            dws.push(blob_cfg_dw(
                regs.remote_dest_buf_start,
                dest_phase.buf_addr / MEM_WORD_BYTES,
            ));
            dws.push(blob_cfg_dw(
                regs.remote_dest_buf_size,
                dest_phase.buf_size / MEM_WORD_BYTES,
            ));

            if phase.remote_receiver {
                dws.push(blob_cfg_dw(
                    regs.remote_dest,
                    layout.remote_dest_word(dest_x, dest_y, u32::from(dest.stream_id)),
                ));
                let dest_msg_info = dest_phase.msg_info_buf_addr.expect("layout pass assigns this");
                if phase.no_dest_handshake {
                    let saved_ptr = phase.saved_dest_wr_ptr.expect("resolver saves this");
                    let saved_sent = phase.saved_num_msgs_already_sent.expect("resolver saves this");
                    dws.push(blob_cfg_dw(
                        regs.remote_dest_wr_ptr,
                        ((saved_ptr % u64::from(dest_phase.buf_size)) as u32) / MEM_WORD_BYTES,
                    ));
                    dws.push(blob_cfg_dw(
                        regs.remote_dest_msg_info_wr_ptr,
                        dest_msg_info / MEM_WORD_BYTES + saved_sent,
                    ));
                } else {
                    dws.push(blob_cfg_dw(
                        regs.remote_dest_msg_info_wr_ptr,
                        dest_msg_info / MEM_WORD_BYTES,
                    ));
                }
            }
            dws.push(blob_cfg_dw(regs.traffic, phase.group_priority));

            if first_phase {
                let (en, end_x, end_y, num_dests) = if let Some(corner2) = dest2 {
                    let (noc_x, noc_y) = if phase.eth_sender {
                        (eth_noc_id(), eth_noc_id())
                    } else if phase.outgoing_data_noc() == 1 {
                        (noc1_x_id(cfg, dest.core.x), noc1_y_id(cfg, dest.core.y))
                    } else {
                        (corner2.core.x, corner2.core.y)
                    };
                    let num = phase.num_mcast_dests.ok_or(BlobGenError::GraphInput {
                        reason: format!(
                            "{}: multicast phase {} has no resolved destination count",
                            args.sref, phase.phase_num
                        ),
                    })?;
                    check_mcast_vc(args.sref, phase)?;
                    (1, noc_x, noc_y, num)
                } else {
                    (0, 0, 0, 1)
                };
                dws.push(blob_cfg_dw(
                    regs.mcast_dest,
                    layout.mcast_dest_word(&McastDestFields {
                        mcast_en: en,
                        end_x,
                        end_y,
                        arb_group_size: phase.arb_group_size(),
                        src_in_order_fwd: phase.src_in_order_fwd,
                        linked: phase.linked,
                        vc: phase.vc(),
                        no_path_res: phase.no_path_res,
                        mcast_xy: phase.mcast_xy,
                    }),
                ));
                dws.push(blob_cfg_dw(regs.mcast_dest_num, num_dests));
            }
        } else if phase.local_receiver && !phase.local_receiver_tile_clearing {
            if layout.noc_version() > 1 {
                let dest = phase.dest.first().ok_or(BlobGenError::GraphInput {
                    reason: format!(
                        "{}: local-receiver phase {} has no destination",
                        args.sref, phase.phase_num
                    ),
                })?;
                dws.push(blob_cfg_dw(
                    regs.local_dest,
                    layout.local_dest_word(u32::from(dest.stream_id), phase.local_stream_clear_num()),
                ));
            }
        } else if first_phase && layout.noc_version() == 1 {
            dws.push(blob_cfg_dw(
                regs.mcast_dest,
                layout.mcast_dest_word(&McastDestFields {
                    mcast_en: 0,
                    end_x: 0,
                    end_y: 0,
                    arb_group_size: phase.arb_group_size(),
                    src_in_order_fwd: phase.src_in_order_fwd,
                    linked: phase.linked,
                    vc: phase.vc(),
                    no_path_res: phase.no_path_res,
                    mcast_xy: phase.mcast_xy,
                }),
            ));
        }

        if phase.uses_dram() && phase.dram_output && phase.receiver_endpoint {
            // Scratch: tiles popped from the stream on the DRAM write side.
            let resets = u32::from(phase_resets_pointers) << 16;
            dws.push(blob_cfg_dw(regs.remote_dest, resets | dram_num_msgs));
        }
    } else if phase.remote_receiver {
        let dest_phase = args.dest_phase.ok_or_else(|| missing_dest(args))?;
        let dest_msg_info = dest_phase.msg_info_buf_addr.expect("layout pass assigns this");
        dws.push(blob_cfg_dw(
            regs.remote_dest_msg_info_wr_ptr,
            dest_msg_info / MEM_WORD_BYTES,
        ));
    }

    // Intermediates loop forever under auto-config; a final phase must not
    // chase a next configuration that does not exist.
    let phase_auto_config = if phase.intermediate {
        true
    } else if !args.has_next_phase {
        false
    } else {
        phase.phase_auto_config
    };

    layout.emit_phase_cfg(
        &PhaseCfgFields {
            incoming_data_noc: if phase.eth_receiver { 0 } else { phase.incoming_data_noc() },
            outgoing_data_noc: if phase.eth_sender { 0 } else { phase.outgoing_data_noc() },
            remote_src_update_noc: if phase.eth_receiver { 0 } else { phase.remote_src_update_noc() },
            local_sources_connected: phase.local_sources_connected,
            source_endpoint: phase.source_endpoint,
            remote_source: phase.remote_source,
            receiver_endpoint: phase.receiver_endpoint,
            local_receiver: phase.local_receiver,
            remote_receiver: phase.remote_receiver,
            phase_auto_config: phase_auto_config || args.next_phase_is_dummy,
            phase_auto_advance: phase.phase_auto_advance,
            data_auto_send: phase.data_auto_send,
            next_phase_src_change: phase.next_phase_src_change() || args.next_phase_is_dummy,
            next_phase_dest_change: phase.next_phase_dest_change() || args.next_phase_is_dummy,
            data_buf_no_flow_ctrl: phase.data_buf_no_flow_ctrl,
            dest_data_buf_no_flow_ctrl: phase.dest_data_buf_no_flow_ctrl,
            remote_src_is_mcast: phase.remote_src_is_mcast,
            no_prev_phase_outgoing_data_flush: phase.no_prev_phase_outgoing_data_flush,
            vc: phase.vc(),
            reg_update_vc: phase.reg_update_vc(),
        },
        &mut dws,
    );

    if let Some(thr) = phase.buf_space_available_ack_thr {
        dws.push(blob_cfg_dw(regs.mem_buf_space_available_ack_threshold, thr));
    } else if first_phase {
        dws.push(blob_cfg_dw(regs.mem_buf_space_available_ack_threshold, 0));
    }

    if phase.source_endpoint
        && ((phase.dram_input && !phase.dram_io && !phase.dram_streaming) || phase.legacy_pack)
    {
        // Scratch: tiles pushed into the stream on the packer side.
        dws.push(blob_cfg_dw(
            regs.remote_src_phase,
            if phase.resend { 0 } else { phase.num_msgs },
        ));
        if phase_resets_pointers {
            dws.push(blob_cfg_dw(regs.remote_src, 1));
        }
    }

    if (phase.receiver_endpoint || phase.local_receiver_tile_clearing)
        && (!phase.dram_output || (!phase.dram_io && !phase.dram_streaming))
    {
        // Scratch: tiles popped from the stream on the unpacker side.
        dws.push(blob_cfg_dw(regs.remote_dest, phase.num_msgs));
        if phase_resets_pointers {
            dws.push(blob_cfg_dw(layout.receiver_reset_reg(), 1));
        }
    }

    if phase.resend {
        let all_msg_size = phase.num_msgs * phase.msg_size();
        if phase.buf_size > all_msg_size {
            dws.push(blob_cfg_dw(regs.wr_ptr, all_msg_size / MEM_WORD_BYTES));
        } else {
            dws.push(blob_cfg_dw(regs.wr_ptr, layout.wr_ptr_full_value()));
        }
        let msg_info_addr = phase.msg_info_buf_addr.expect("layout pass assigns this");
        dws.push(blob_cfg_dw(
            regs.msg_info_wr_ptr,
            msg_info_addr / MEM_WORD_BYTES + phase.num_msgs,
        ));
    }

    Ok(dws)
}

/// Build the minimal handshake-only blob for a dummy phase appended after a
/// stream's last real phase.
pub fn dummy_phase_blob(
    layout: &dyn RegisterLayout,
    cfg: &BlobGenConfig,
    sref: StreamRef,
    phase: &Phase,
    dummy_phase_addr: u32,
    dest_dummy_phase_addr: u32,
    is_sender: bool,
    is_receiver: bool,
) -> BlobGenResult<Vec<u32>> {
    let regs = layout.indices();
    let chip_id = sref.core.chip;
    let mut dws: Vec<u32> = Vec::new();

    dws.push(blob_cfg_dw(regs.curr_phase, dummy_phase_num(phase.phase_num)));
    dws.push(blob_cfg_dw(regs.buf_start, dummy_phase_addr / MEM_WORD_BYTES));
    dws.push(blob_cfg_dw(regs.buf_size, 1));
    dws.push(blob_cfg_dw(regs.msg_info_ptr, dummy_phase_addr / MEM_WORD_BYTES));
    dws.push(blob_cfg_dw(regs.msg_info_wr_ptr, dummy_phase_addr / MEM_WORD_BYTES));

    if is_receiver {
        let src = phase.src.first().ok_or(BlobGenError::GraphInput {
            reason: format!("{}: dummy receiver phase {} has no source", sref, phase.phase_num),
        })?;
        if !phase.eth_receiver && src.core.chip != chip_id {
            return Err(BlobGenError::GraphInput {
                reason: format!("{}: source {} is on another chip", sref, src),
            });
        }
        let (src_x, src_y) = if phase.eth_receiver {
            (eth_noc_id(), eth_noc_id())
        } else if phase.remote_src_update_noc() == 1 {
            (noc1_x_id(cfg, src.core.x), noc1_y_id(cfg, src.core.y))
        } else {
            (src.core.x, src.core.y)
        };
        dws.push(blob_cfg_dw(
            regs.remote_src,
            layout.remote_src_word(src_x, src_y, u32::from(src.stream_id), phase.src_dest_index),
        ));
        dws.push(blob_cfg_dw(regs.remote_src_phase, dummy_phase_num(phase.phase_num)));
    }

    if is_sender {
        let dest = phase.dest.first().ok_or(BlobGenError::GraphInput {
            reason: format!("{}: dummy sender phase {} has no destination", sref, phase.phase_num),
        })?;
        let dest2 = phase.dest.get(1);
        if !phase.eth_sender && dest.core.chip != chip_id {
            return Err(BlobGenError::GraphInput {
                reason: format!("{}: destination {} is on another chip", sref, dest),
            });
        }
        let (dest_x, dest_y) = if phase.eth_sender {
            (eth_noc_id(), eth_noc_id())
        } else if phase.outgoing_data_noc() == 1 {
            let corner = dest2.unwrap_or(dest);
            (noc1_x_id(cfg, corner.core.x), noc1_y_id(cfg, corner.core.y))
        } else {
            (dest.core.x, dest.core.y)
        };
        dws.push(blob_cfg_dw(
            regs.remote_dest,
            layout.remote_dest_word(dest_x, dest_y, u32::from(dest.stream_id)),
        ));
        dws.push(blob_cfg_dw(
            regs.remote_dest_buf_start,
            dest_dummy_phase_addr / MEM_WORD_BYTES,
        ));
        dws.push(blob_cfg_dw(regs.remote_dest_buf_size, 1));
        dws.push(blob_cfg_dw(
            regs.remote_dest_msg_info_wr_ptr,
            dest_dummy_phase_addr / MEM_WORD_BYTES,
        ));

        let (en, end_x, end_y, num_dests) = if let Some(corner2) = dest2 {
            let (noc_x, noc_y) = if phase.eth_sender {
                (eth_noc_id(), eth_noc_id())
            } else if phase.outgoing_data_noc() == 1 {
                (noc1_x_id(cfg, dest.core.x), noc1_y_id(cfg, dest.core.y))
            } else {
                (corner2.core.x, corner2.core.y)
            };
            let num = phase.num_mcast_dests.unwrap_or(1);
            check_mcast_vc(sref, phase)?;
            (1, noc_x, noc_y, num)
        } else {
            (0, 0, 0, 1)
        };
        dws.push(blob_cfg_dw(
            regs.mcast_dest,
            layout.mcast_dest_word(&McastDestFields {
                mcast_en: en,
                end_x,
                end_y,
                arb_group_size: phase.arb_group_size(),
                src_in_order_fwd: phase.src_in_order_fwd,
                linked: phase.linked,
                vc: phase.vc(),
                no_path_res: phase.no_path_res,
                mcast_xy: phase.mcast_xy,
            }),
        ));
        dws.push(blob_cfg_dw(regs.mcast_dest_num, num_dests));
    }

    layout.emit_phase_cfg(
        &PhaseCfgFields {
            incoming_data_noc: if phase.eth_receiver { 0 } else { phase.incoming_data_noc() },
            outgoing_data_noc: if phase.eth_sender { 0 } else { phase.outgoing_data_noc() },
            remote_src_update_noc: if phase.eth_receiver { 0 } else { phase.remote_src_update_noc() },
            local_sources_connected: false,
            source_endpoint: is_sender,
            remote_source: is_receiver,
            receiver_endpoint: false,
            local_receiver: false,
            remote_receiver: is_sender,
            phase_auto_config: true,
            phase_auto_advance: phase.phase_auto_advance,
            data_auto_send: phase.data_auto_send,
            next_phase_src_change: true,
            next_phase_dest_change: true,
            data_buf_no_flow_ctrl: phase.data_buf_no_flow_ctrl,
            dest_data_buf_no_flow_ctrl: phase.dest_data_buf_no_flow_ctrl,
            remote_src_is_mcast: phase.remote_src_is_mcast,
            no_prev_phase_outgoing_data_flush: phase.no_prev_phase_outgoing_data_flush,
            vc: phase.vc(),
            reg_update_vc: phase.reg_update_vc(),
        },
        &mut dws,
    );

    Ok(dws)
}
