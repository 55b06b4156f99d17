// This module cross-checks the buffer placement of a resolved graph before anything is
// serialized. Every phase's data buffer must stay clear of every tile-header ring on
// the same core: the rings are placed top-down from the data-buffer base by the layout
// allocator, and a data buffer that reaches into one means the tile-size table for the
// core was miscounted upstream. Streams that move raw (untilized) data bypass the
// tile-header rings entirely and are exempt. Any overlap is fatal.

//! Buffer placement validation.

use hashbrown::{HashMap, HashSet};
use log::debug;

use crate::core::config::BlobGenConfig;
use crate::core::coords::CoreId;
use crate::core::error::{BlobGenError, BlobGenResult};
use crate::graph::PhaseGraph;

fn ranges_overlap(start: u32, end: u32, other_start: u32, other_end: u32) -> bool {
    (start <= other_start && other_start < end) || (start < other_end && other_end < end)
}

/// Check every data buffer against every tile-header ring on its core.
pub fn check_buffer_regions(graph: &PhaseGraph, cfg: &BlobGenConfig) -> BlobGenResult<()> {
    let info_buf_size = cfg.msg_info_buf_size();

    let mut info_regions: HashMap<CoreId, HashSet<(u32, u32)>> = HashMap::new();
    for sref in graph.sorted_stream_refs() {
        let stream = &graph.streams[&sref];
        if stream.phases.iter().any(|p| p.moves_raw_data) {
            continue;
        }
        let regions = info_regions.entry(sref.core).or_default();
        for phase in &stream.phases {
            if let Some(addr) = phase.msg_info_buf_addr {
                regions.insert((addr, addr + info_buf_size));
            }
        }
    }

    for sref in graph.sorted_stream_refs() {
        let stream = &graph.streams[&sref];
        if stream.phases.iter().any(|p| p.moves_raw_data) {
            continue;
        }
        let Some(regions) = info_regions.get(&sref.core) else {
            continue;
        };
        for phase in &stream.phases {
            let data_start = phase.buf_base_addr();
            let data_end = data_start + phase.buf_full_size_bytes();
            for &(info_start, info_end) in regions.iter() {
                if ranges_overlap(info_start, info_end, data_start, data_end) {
                    return Err(BlobGenError::BufferOverlap {
                        stream: sref,
                        phase: phase.phase_num,
                        data_start,
                        data_end,
                        info_start,
                        info_end,
                    });
                }
            }
        }
    }
    debug!("buffer region check passed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::coords::StreamRef;
    use crate::graph::Phase;

    fn sref(stream_id: u8) -> StreamRef {
        StreamRef::new(CoreId::new(0, 1, 1), stream_id)
    }

    fn phase_with_buf(buf_addr: u32, buf_size: u32, info_addr: u32) -> Phase {
        let mut phase = Phase {
            phase_num: 1,
            buf_addr,
            buf_size,
            num_msgs: 1,
            msg_size: Some(1024),
            msg_info_buf_addr: Some(info_addr),
            ..Default::default()
        };
        phase.normalize();
        phase
    }

    #[test]
    fn test_disjoint_regions_pass() {
        let mut graph = PhaseGraph::new();
        graph.insert_phase(sref(8), phase_with_buf(0x40000, 0x1000, 0x30000));
        assert!(check_buffer_regions(&graph, &BlobGenConfig::default()).is_ok());
    }

    #[test]
    fn test_data_buffer_inside_ring_is_fatal() {
        let mut graph = PhaseGraph::new();
        // Ring covers [0x30000, 0x38000); the data buffer starts inside it.
        graph.insert_phase(sref(8), phase_with_buf(0x31000, 0x1000, 0x30000));
        let err = check_buffer_regions(&graph, &BlobGenConfig::default()).unwrap_err();
        assert!(matches!(err, BlobGenError::BufferOverlap { .. }));
    }

    #[test]
    fn test_overlap_across_streams_on_same_core() {
        let mut graph = PhaseGraph::new();
        graph.insert_phase(sref(8), phase_with_buf(0x50000, 0x1000, 0x30000));
        // Stream 9's data buffer lands in stream 8's ring.
        graph.insert_phase(sref(9), phase_with_buf(0x32000, 0x1000, 0x40000));
        let err = check_buffer_regions(&graph, &BlobGenConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            BlobGenError::BufferOverlap { info_start: 0x30000, .. }
        ));
    }

    #[test]
    fn test_raw_data_streams_are_exempt() {
        let mut graph = PhaseGraph::new();
        let mut phase = phase_with_buf(0x31000, 0x1000, 0x30000);
        phase.moves_raw_data = true;
        graph.insert_phase(sref(8), phase);
        assert!(check_buffer_regions(&graph, &BlobGenConfig::default()).is_ok());
    }
}
