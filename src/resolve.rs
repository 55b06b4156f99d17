// This module provides the two link-resolution passes that turn the loaded graph into
// a fully connected one. Pass 1 resolves destinations: every sender phase looks up the
// peer phase with the same phase number on its destination stream(s) and pushes a
// back-reference into the peer's src list; multicast senders walk the destination
// rectangle corner to corner with wraparound-and-skip-Ethernet stepping, assigning each
// live peer a 0-based src_dest_index, and stamp num_mcast_dests across the dest-stable
// run. The no-flow-control decision is made here too, because it needs the same-dest
// run and the peer's buffer size in one place. Pass 2 depends on pass 1's src lists
// and picks NOC planes: source endpoints default to incoming NOC 0 and derive the
// update NOC as its complement, while remote-sourced phases inherit the choice from
// their upstream phase and propagate it backward as that phase's outgoing NOC. Both
// passes record their work in place and touch only phases that are part of the link
// being resolved.
//
// Saved write-pointer chains for no_dest_handshake phases are computed first, within
// the owning stream, so pass 1 sees the sender runs already marked dest-stable.

//! Destination, flow-control and NOC resolution over the phase graph.

use log::{debug, trace};

use crate::core::coords::StreamRef;
use crate::core::error::{BlobGenError, BlobGenResult};
use crate::core::grid::GridConfig;
use crate::graph::PhaseGraph;

/// Run both resolution passes in order.
pub fn resolve(graph: &mut PhaseGraph, grid: &GridConfig) -> BlobGenResult<()> {
    resolve_destinations(graph, grid)?;
    resolve_nocs(graph)?;
    Ok(())
}

/// Pass 1: saved write-pointer chains, destination back-references, multicast
/// rectangle walks and the no-flow-control decision.
pub fn resolve_destinations(graph: &mut PhaseGraph, grid: &GridConfig) -> BlobGenResult<()> {
    for sref in graph.sorted_stream_refs() {
        let phase_nums: Vec<u64> = graph.streams[&sref]
            .phases
            .iter()
            .map(|p| p.phase_num)
            .collect();
        for &pn in &phase_nums {
            resolve_saved_wr_ptr(graph, &sref, pn)?;

            let phase = graph.phase(&sref, pn).expect("phase exists");
            let is_multicast = phase.remote_receiver && phase.dest.len() == 2;
            let is_unicast_sender = phase.remote_receiver
                || (phase.local_receiver && !phase.local_receiver_tile_clearing)
                || (phase.eth_sender && phase.receiver_endpoint);

            if is_multicast {
                resolve_multicast(graph, grid, &sref, pn)?;
            } else if is_unicast_sender && !phase.dest.is_empty() {
                let peer = phase.dest[0];
                if graph.phase(&peer, pn).is_some() {
                    if let Some(peer_phase) = graph.phase_mut(&peer, pn) {
                        peer_phase.src.push(sref);
                    }
                    process_dest_no_flow_ctrl(graph, &sref, pn, &peer)?;
                }
            }
        }
    }
    Ok(())
}

/// Accumulate the "already sent" offset for a no_dest_handshake phase by
/// walking backward to the nearest prior phase with the same destination.
fn resolve_saved_wr_ptr(
    graph: &mut PhaseGraph,
    sref: &StreamRef,
    phase_num: u64,
) -> BlobGenResult<()> {
    let stream = graph.stream(sref).expect("stream exists");
    let idx = stream.index_of(phase_num).expect("phase exists");
    if !stream.phases[idx].no_dest_handshake {
        return Ok(());
    }
    let dest = stream.phases[idx].dest.clone();

    let missing = || BlobGenError::MissingChainPhase {
        stream: *sref,
        phase: phase_num,
        direction: "previous",
    };
    let mut prev_idx = idx.checked_sub(1).ok_or_else(missing)?;

    let stream = graph.stream_mut(sref).expect("stream exists");
    // The immediately preceding phase keeps its destination registers live.
    stream.phases[prev_idx].next_phase_dest_change = Some(false);
    while stream.phases[prev_idx].dest != dest {
        prev_idx = prev_idx.checked_sub(1).ok_or_else(missing)?;
    }
    let prev = &stream.phases[prev_idx];
    let mut wr_ptr = u64::from(prev.num_msgs) * u64::from(prev.msg_size());
    let mut already_sent = prev.num_msgs;
    if let (Some(prev_ptr), Some(prev_sent)) =
        (prev.saved_dest_wr_ptr, prev.saved_num_msgs_already_sent)
    {
        wr_ptr += prev_ptr;
        already_sent += prev_sent;
    }
    let phase = &mut stream.phases[idx];
    phase.saved_dest_wr_ptr = Some(wr_ptr);
    phase.saved_num_msgs_already_sent = Some(already_sent);
    trace!("{sref} phase {phase_num}: saved_dest_wr_ptr={wr_ptr}, already_sent={already_sent}");
    Ok(())
}

fn resolve_multicast(
    graph: &mut PhaseGraph,
    grid: &GridConfig,
    sref: &StreamRef,
    phase_num: u64,
) -> BlobGenResult<()> {
    let phase = graph.phase(sref, phase_num).expect("phase exists");
    let (corner1, corner2) = (phase.dest[0], phase.dest[1]);
    if corner1.stream_id != corner2.stream_id {
        return Err(BlobGenError::MulticastStreamMismatch {
            stream: *sref,
            phase: phase_num,
        });
    }
    let dest_chip = corner1.core.chip;
    let dest_stream_id = corner1.stream_id;
    debug!(
        "{sref} multicast phase {phase_num}: corners ({},{}) .. ({},{}), dest stream {dest_stream_id}",
        corner1.core.y, corner1.core.x, corner2.core.y, corner2.core.x
    );

    let mut src_dest_index = 0u32;
    let mut y = corner1.core.y;
    loop {
        let mut x = corner1.core.x;
        loop {
            let peer = StreamRef::new(
                crate::core::coords::CoreId::new(dest_chip, y, x),
                dest_stream_id,
            );
            if graph.phase(&peer, phase_num).is_some() {
                trace!("   multicast dest y={y}, x={x} -> index {src_dest_index}");
                let peer_phase = graph.phase_mut(&peer, phase_num).expect("checked above");
                peer_phase.src.push(*sref);
                peer_phase.src_dest_index = src_dest_index;
                peer_phase.remote_src_is_mcast = true;
                process_dest_no_flow_ctrl(graph, sref, phase_num, &peer)?;
                src_dest_index += 1;
            }
            if x == corner2.core.x {
                break;
            }
            x = grid.next_higher_worker_x(dest_chip, y, x);
        }
        if y == corner2.core.y {
            break;
        }
        y = grid.next_higher_worker_y(dest_chip, y, corner2.core.x);
    }

    // Stamp the discovered destination count across the dest-stable run.
    if graph.phase(sref, phase_num).expect("phase exists").num_mcast_dests.is_none() {
        let stream = graph.stream_mut(sref).expect("stream exists");
        let idx = stream.index_of(phase_num).expect("phase exists");
        stream.phases[idx].num_mcast_dests = Some(src_dest_index);
        if !stream.phases[idx].next_phase_dest_change() {
            let mut i = idx;
            loop {
                i += 1;
                let next = stream.phases.get_mut(i).ok_or(BlobGenError::MissingChainPhase {
                    stream: *sref,
                    phase: phase_num,
                    direction: "next",
                })?;
                next.num_mcast_dests = Some(src_dest_index);
                if next.next_phase_dest_change() {
                    break;
                }
            }
        }
    }
    Ok(())
}

/// Decide whether the destination can skip backpressure for the same-dest run
/// starting at `phase_num`, and stamp both ends of the link. Multicast calls
/// this once per rectangle peer; the per-phase processed marker makes the
/// decision once and replays only the peer-side stamp afterwards.
fn process_dest_no_flow_ctrl(
    graph: &mut PhaseGraph,
    sref: &StreamRef,
    phase_num: u64,
    peer: &StreamRef,
) -> BlobGenResult<()> {
    let already_processed = graph
        .phase(sref, phase_num)
        .expect("phase exists")
        .no_flow_ctrl_processed;
    if already_processed {
        let no_flow_ctrl = graph
            .phase(sref, phase_num)
            .expect("phase exists")
            .dest_data_buf_no_flow_ctrl;
        if let Some(peer_phase) = graph.phase_mut(peer, phase_num) {
            peer_phase.data_buf_no_flow_ctrl = no_flow_ctrl;
        }
        return Ok(());
    }

    let missing_next = || BlobGenError::MissingChainPhase {
        stream: *sref,
        phase: phase_num,
        direction: "next",
    };

    let stream = graph.stream_mut(sref).expect("stream exists");
    let idx = stream.index_of(phase_num).expect("phase exists");
    stream.phases[idx].no_flow_ctrl_processed = true;
    let msg_size = stream.phases[idx].msg_size();
    let mut run_num_msgs = u64::from(stream.phases[idx].num_msgs);
    let mut run_end = idx;
    while !stream.phases[run_end].next_phase_dest_change() {
        run_end += 1;
        let next = stream.phases.get_mut(run_end).ok_or_else(missing_next)?;
        next.no_flow_ctrl_processed = true;
        run_num_msgs += u64::from(next.num_msgs);
    }

    let peer_buf_size = graph
        .phase(peer, phase_num)
        .ok_or(BlobGenError::MissingPeerPhase {
            stream: *sref,
            peer: *peer,
            phase: phase_num,
        })?
        .buf_size;

    if run_num_msgs * u64::from(msg_size) <= u64::from(peer_buf_size) {
        let stream = graph.stream_mut(sref).expect("stream exists");
        for i in idx..=run_end {
            stream.phases[i].dest_data_buf_no_flow_ctrl = true;
        }
        if let Some(peer_phase) = graph.phase_mut(peer, phase_num) {
            peer_phase.data_buf_no_flow_ctrl = true;
        }
    }
    Ok(())
}

/// Pass 2: NOC plane selection and backward propagation onto upstream phases.
pub fn resolve_nocs(graph: &mut PhaseGraph) -> BlobGenResult<()> {
    for sref in graph.sorted_stream_refs() {
        let phase_nums: Vec<u64> = graph.streams[&sref]
            .phases
            .iter()
            .map(|p| p.phase_num)
            .collect();
        for &pn in &phase_nums {
            let phase = graph.phase(&sref, pn).expect("phase exists");
            if phase.source_endpoint && !phase.eth_receiver {
                let phase = graph.phase_mut(&sref, pn).expect("phase exists");
                let incoming = *phase.incoming_data_noc.get_or_insert(0);
                phase.remote_src_update_noc = Some(1 - incoming);
            } else if phase.remote_source
                || phase.local_sources_connected
                || (phase.source_endpoint && phase.eth_receiver)
            {
                inherit_src_noc(graph, &sref, pn)?;

                let phase = graph.phase(&sref, pn).expect("phase exists");
                if phase.remote_source || (phase.source_endpoint && phase.eth_receiver) {
                    reuse_chain_noc(graph, &sref, pn);
                }
            }
        }
    }
    Ok(())
}

/// Inherit the NOC plane from whichever upstream phase is authoritative for
/// this phase's src links, and write it back as each source's outgoing NOC.
fn inherit_src_noc(graph: &mut PhaseGraph, sref: &StreamRef, pn: u64) -> BlobGenResult<()> {
    let srcs = graph.phase(sref, pn).expect("phase exists").src.clone();
    let mut chosen_noc: Option<u32> = None;
    for src in srcs {
        let src_phase = graph
            .phase(&src, pn)
            .ok_or(BlobGenError::MissingPeerPhase {
                stream: *sref,
                peer: src,
                phase: pn,
            })?;
        let noc = *chosen_noc.get_or_insert(src_phase.outgoing_data_noc());
        graph
            .phase_mut(&src, pn)
            .expect("checked above")
            .outgoing_data_noc = Some(noc);
        let phase = graph.phase_mut(sref, pn).expect("phase exists");
        phase.incoming_data_noc = Some(noc);
        phase.remote_src_update_noc = Some(if noc == 0 { 1 } else { 0 });
    }
    Ok(())
}

/// A phase inside a same-source run re-uses the run head's cached NOC choice
/// and src link instead of re-deriving them; each run is walked once.
fn reuse_chain_noc(graph: &mut PhaseGraph, sref: &StreamRef, pn: u64) {
    let stream = graph.stream_mut(sref).expect("stream exists");
    let idx = stream.index_of(pn).expect("phase exists");
    let Some(mut prev_idx) = idx.checked_sub(1) else {
        return;
    };
    if stream.phases[prev_idx].next_phase_src_change() {
        return;
    }
    loop {
        let prev_prev = prev_idx.checked_sub(1);
        let run_head = match prev_prev {
            None => true,
            Some(pp) => {
                stream.phases[pp].next_phase_src_change()
                    || stream.phases[prev_idx].npsc_opt_processed
            }
        };
        if run_head {
            let prev = stream.phases[prev_idx].clone();
            let phase = &mut stream.phases[idx];
            phase.incoming_data_noc = prev.incoming_data_noc;
            phase.remote_src_update_noc = prev.remote_src_update_noc;
            phase.remote_src_is_mcast = prev.remote_src_is_mcast;
            phase.data_buf_no_flow_ctrl = prev.data_buf_no_flow_ctrl;
            phase.src = prev.src;
            phase.src_dest_index = prev.src_dest_index;
            phase.npsc_opt_processed = true;
            return;
        }
        match prev_prev {
            Some(pp) => prev_idx = pp,
            None => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::coords::CoreId;
    use crate::graph::Phase;

    fn sref(chip: u32, y: u32, x: u32, stream_id: u8) -> StreamRef {
        StreamRef::new(CoreId::new(chip, y, x), stream_id)
    }

    fn sender_phase(pn: u64, dest: Vec<StreamRef>) -> Phase {
        Phase {
            phase_num: pn,
            source_endpoint: true,
            remote_receiver: true,
            buf_addr: 0x40000,
            buf_size: 4096,
            msg_size: Some(2048),
            num_msgs: 1,
            dest,
            ..Default::default()
        }
    }

    fn receiver_phase(pn: u64) -> Phase {
        Phase {
            phase_num: pn,
            remote_source: true,
            receiver_endpoint: true,
            buf_addr: 0x50000,
            buf_size: 4096,
            msg_size: Some(2048),
            num_msgs: 1,
            ..Default::default()
        }
    }

    fn grid_1chip(size_y: u32, size_x: u32) -> GridConfig {
        let mut grid = GridConfig::new();
        grid.add_chip(0, size_y, size_x);
        grid
    }

    #[test]
    fn test_unicast_backref_and_noc_inheritance() {
        let mut graph = PhaseGraph::new();
        let tx = sref(0, 0, 0, 8);
        let rx = sref(0, 0, 1, 9);
        let mut tx_phase = sender_phase(1, vec![rx]);
        tx_phase.outgoing_data_noc = Some(1);
        graph.insert_phase(tx, tx_phase);
        graph.insert_phase(rx, receiver_phase(1));
        graph.finalize();

        resolve(&mut graph, &grid_1chip(2, 2)).unwrap();

        let rx_phase = graph.phase(&rx, 1).unwrap();
        assert_eq!(rx_phase.src, vec![tx]);
        assert_eq!(rx_phase.incoming_data_noc, Some(1));
        assert_eq!(rx_phase.remote_src_update_noc, Some(0));
        // Source endpoint defaults its own incoming plane to 0.
        let tx_phase = graph.phase(&tx, 1).unwrap();
        assert_eq!(tx_phase.incoming_data_noc, Some(0));
        assert_eq!(tx_phase.remote_src_update_noc, Some(1));
    }

    #[test]
    fn test_multicast_rectangle_resolves_three_peers() {
        let mut graph = PhaseGraph::new();
        let tx = sref(0, 0, 0, 8);
        let corners = vec![sref(0, 0, 1, 9), sref(0, 0, 3, 9)];
        graph.insert_phase(tx, sender_phase(1, corners));
        for x in 1..=3 {
            graph.insert_phase(sref(0, 0, x, 9), receiver_phase(1));
        }
        graph.finalize();

        resolve(&mut graph, &grid_1chip(1, 4)).unwrap();

        for (i, x) in (1..=3).enumerate() {
            let peer = graph.phase(&sref(0, 0, x, 9), 1).unwrap();
            assert_eq!(peer.src, vec![tx], "x={x}");
            assert_eq!(peer.src_dest_index, i as u32, "x={x}");
            assert!(peer.remote_src_is_mcast);
        }
        assert_eq!(graph.phase(&tx, 1).unwrap().num_mcast_dests, Some(3));
    }

    #[test]
    fn test_multicast_stream_id_mismatch_is_fatal() {
        let mut graph = PhaseGraph::new();
        let tx = sref(0, 0, 0, 8);
        let corners = vec![sref(0, 0, 1, 9), sref(0, 0, 2, 10)];
        graph.insert_phase(tx, sender_phase(1, corners));
        graph.finalize();

        assert!(matches!(
            resolve(&mut graph, &grid_1chip(1, 4)),
            Err(BlobGenError::MulticastStreamMismatch { .. })
        ));
    }

    #[test]
    fn test_no_flow_ctrl_run_within_dest_buffer() {
        let mut graph = PhaseGraph::new();
        let tx = sref(0, 0, 0, 8);
        let rx = sref(0, 0, 1, 9);
        // Two-phase run totalling 2 msgs * 2048 = 4096 <= dest buf 4096.
        let mut p1 = sender_phase(1, vec![rx]);
        p1.next_phase_dest_change = Some(false);
        let p2 = sender_phase(2, vec![rx]);
        graph.insert_phase(tx, p1);
        graph.insert_phase(tx, p2);
        graph.insert_phase(rx, receiver_phase(1));
        graph.insert_phase(rx, receiver_phase(2));
        graph.finalize();

        resolve(&mut graph, &grid_1chip(1, 2)).unwrap();

        assert!(graph.phase(&tx, 1).unwrap().dest_data_buf_no_flow_ctrl);
        assert!(graph.phase(&tx, 2).unwrap().dest_data_buf_no_flow_ctrl);
        assert!(graph.phase(&rx, 1).unwrap().data_buf_no_flow_ctrl);
    }

    #[test]
    fn test_no_flow_ctrl_run_exceeding_dest_buffer() {
        let mut graph = PhaseGraph::new();
        let tx = sref(0, 0, 0, 8);
        let rx = sref(0, 0, 1, 9);
        let mut p1 = sender_phase(1, vec![rx]);
        p1.num_msgs = 2;
        p1.next_phase_dest_change = Some(false);
        let mut p2 = sender_phase(2, vec![rx]);
        p2.num_msgs = 2;
        graph.insert_phase(tx, p1);
        graph.insert_phase(tx, p2);
        graph.insert_phase(rx, receiver_phase(1));
        graph.insert_phase(rx, receiver_phase(2));
        graph.finalize();

        resolve(&mut graph, &grid_1chip(1, 2)).unwrap();

        // 4 msgs * 2048 > 4096, so backpressure stays on.
        assert!(!graph.phase(&tx, 1).unwrap().dest_data_buf_no_flow_ctrl);
        assert!(!graph.phase(&rx, 1).unwrap().data_buf_no_flow_ctrl);
    }

    #[test]
    fn test_saved_wr_ptr_chain() {
        let mut graph = PhaseGraph::new();
        let tx = sref(0, 0, 0, 8);
        let rx = sref(0, 0, 1, 9);
        let mut p1 = sender_phase(1, vec![rx]);
        p1.num_msgs = 2;
        p1.msg_size = Some(64);
        let mut p2 = sender_phase(2, vec![rx]);
        p2.num_msgs = 2;
        p2.msg_size = Some(64);
        p2.no_dest_handshake = true;
        graph.insert_phase(tx, p1);
        graph.insert_phase(tx, p2);
        graph.insert_phase(rx, receiver_phase(1));
        graph.insert_phase(rx, receiver_phase(2));
        graph.finalize();

        resolve(&mut graph, &grid_1chip(1, 2)).unwrap();

        let p2 = graph.phase(&tx, 2).unwrap();
        assert_eq!(p2.saved_dest_wr_ptr, Some(128));
        assert_eq!(p2.saved_num_msgs_already_sent, Some(2));
        // The preceding phase was marked dest-stable.
        assert_eq!(graph.phase(&tx, 1).unwrap().next_phase_dest_change, Some(false));
    }

    #[test]
    fn test_same_source_run_reuses_cached_noc() {
        let mut graph = PhaseGraph::new();
        let tx = sref(0, 0, 0, 8);
        let rx = sref(0, 0, 1, 9);
        let mut tx1 = sender_phase(1, vec![rx]);
        tx1.outgoing_data_noc = Some(1);
        let mut tx2 = sender_phase(2, vec![rx]);
        tx2.outgoing_data_noc = Some(1);
        graph.insert_phase(tx, tx1);
        graph.insert_phase(tx, tx2);
        let mut rx1 = receiver_phase(1);
        rx1.next_phase_src_change = Some(false);
        let rx2 = receiver_phase(2);
        graph.insert_phase(rx, rx1);
        graph.insert_phase(rx, rx2);
        graph.finalize();

        resolve(&mut graph, &grid_1chip(1, 2)).unwrap();

        let second = graph.phase(&rx, 2).unwrap();
        assert_eq!(second.incoming_data_noc, Some(1));
        assert_eq!(second.remote_src_update_noc, Some(0));
        assert!(second.npsc_opt_processed);
        assert_eq!(second.src, vec![tx]);
    }
}
