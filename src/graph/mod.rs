// This module provides PhaseGraph, the in-memory attributed graph the whole compiler
// operates on: a map from StreamRef to that stream's phases held as a Vec sorted by
// phase number, plus the per-stream DRAM buffer descriptor lists. Previous/next phase
// queries are index moves on the sorted Vec, never scans, and never leave the owning
// stream. The graph is built by the loader (or directly by tests), then finalize()
// sorts every stream and runs normalization over each phase exactly once; every later
// pass receives the graph by reference and records its results back into the phases.

//! The attributed cores-streams-phases graph.

pub mod loader;
pub mod phase;

use hashbrown::HashMap;

use crate::core::coords::StreamRef;
use crate::core::error::{BlobGenError, BlobGenResult};

pub use phase::{DramBufferDesc, Phase};

/// All phases of one stream, sorted by ascending phase number after
/// [`PhaseGraph::finalize`].
#[derive(Debug, Clone, Default)]
pub struct StreamPhases {
    pub phases: Vec<Phase>,
}

impl StreamPhases {
    /// Index of the phase with this exact number.
    pub fn index_of(&self, phase_num: u64) -> Option<usize> {
        self.phases
            .binary_search_by_key(&phase_num, |p| p.phase_num)
            .ok()
    }

    pub fn phase(&self, phase_num: u64) -> Option<&Phase> {
        self.index_of(phase_num).map(|i| &self.phases[i])
    }

    pub fn phase_mut(&mut self, phase_num: u64) -> Option<&mut Phase> {
        self.index_of(phase_num)
            .map(move |i| &mut self.phases[i])
    }

    /// Index of the last phase strictly below `phase_num`.
    pub fn prev_index(&self, phase_num: u64) -> Option<usize> {
        let i = self
            .phases
            .partition_point(|p| p.phase_num < phase_num);
        i.checked_sub(1)
    }

    /// Index of the first phase strictly above `phase_num`.
    pub fn next_index(&self, phase_num: u64) -> Option<usize> {
        let i = self
            .phases
            .partition_point(|p| p.phase_num <= phase_num);
        (i < self.phases.len()).then_some(i)
    }

    pub fn last(&self) -> Option<&Phase> {
        self.phases.last()
    }
}

/// The full graph: every stream's phase sequence plus DRAM linkage.
#[derive(Debug, Clone, Default)]
pub struct PhaseGraph {
    pub streams: HashMap<StreamRef, StreamPhases>,
    pub dram_buffers: HashMap<StreamRef, Vec<DramBufferDesc>>,
}

impl PhaseGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_phase(&mut self, sref: StreamRef, phase: Phase) {
        self.streams.entry(sref).or_default().phases.push(phase);
    }

    pub fn stream(&self, sref: &StreamRef) -> Option<&StreamPhases> {
        self.streams.get(sref)
    }

    pub fn stream_mut(&mut self, sref: &StreamRef) -> Option<&mut StreamPhases> {
        self.streams.get_mut(sref)
    }

    pub fn phase(&self, sref: &StreamRef, phase_num: u64) -> Option<&Phase> {
        self.streams.get(sref)?.phase(phase_num)
    }

    pub fn phase_mut(&mut self, sref: &StreamRef, phase_num: u64) -> Option<&mut Phase> {
        self.streams.get_mut(sref)?.phase_mut(phase_num)
    }

    /// Previous phase of the same stream, or an error naming the missing
    /// chain partner.
    pub fn require_prev_phase(
        &self,
        sref: &StreamRef,
        phase_num: u64,
    ) -> BlobGenResult<&Phase> {
        self.streams
            .get(sref)
            .and_then(|s| s.prev_index(phase_num).map(|i| &s.phases[i]))
            .ok_or(BlobGenError::MissingChainPhase {
                stream: *sref,
                phase: phase_num,
                direction: "previous",
            })
    }

    /// Stream keys in deterministic (core, stream id) order.
    pub fn sorted_stream_refs(&self) -> Vec<StreamRef> {
        let mut refs: Vec<StreamRef> = self.streams.keys().copied().collect();
        refs.sort_unstable();
        refs
    }

    /// Sort every stream's phases and normalize each phase. Run once after
    /// loading, before any resolution pass.
    pub fn finalize(&mut self) {
        for stream in self.streams.values_mut() {
            stream.phases.sort_by_key(|p| p.phase_num);
            for phase in &mut stream.phases {
                phase.normalize();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::coords::{parse_stream_label, CoreId};

    fn sref(stream_id: u8) -> StreamRef {
        StreamRef::new(CoreId::new(0, 0, 0), stream_id)
    }

    fn phase(num: u64) -> Phase {
        Phase {
            phase_num: num,
            buf_size: 1024,
            num_msgs: 1,
            ..Default::default()
        }
    }

    #[test]
    fn test_sorted_lookup_and_neighbors() {
        let mut graph = PhaseGraph::new();
        let s = sref(4);
        graph.insert_phase(s, phase(30));
        graph.insert_phase(s, phase(10));
        graph.insert_phase(s, phase(20));
        graph.finalize();

        let stream = graph.stream(&s).unwrap();
        assert_eq!(stream.phases[0].phase_num, 10);
        assert_eq!(stream.phase(20).unwrap().phase_num, 20);
        assert_eq!(stream.prev_index(20), Some(0));
        assert_eq!(stream.next_index(20), Some(2));
        assert_eq!(stream.prev_index(10), None);
        assert_eq!(stream.next_index(30), None);
    }

    #[test]
    fn test_neighbor_queries_stay_in_stream() {
        let mut graph = PhaseGraph::new();
        graph.insert_phase(sref(1), phase(10));
        graph.insert_phase(sref(2), phase(5));
        graph.finalize();

        // Stream 1 has no phase below 10 even though stream 2 does.
        assert!(graph.require_prev_phase(&sref(1), 10).is_err());
        let other = parse_stream_label("chip_0__y_0__x_0__stream_id_2").unwrap();
        assert_eq!(
            graph.require_prev_phase(&other, 10).unwrap().phase_num,
            5
        );
    }
}
