// This module defines error types for the blobgen compiler using the thiserror crate for
// idiomatic Rust error handling. BlobGenError is the main error enum covering the fatal
// failure classes of the pipeline: malformed graph input records, missing handshake peer
// phases during link resolution, inconsistent block dimensions shared across streams,
// data-buffer/tile-header overlap, overlay blob budget overruns, and DRAM queue-slot
// bookkeeping underflow. Each variant carries the chip/y/x/stream/phase coordinates
// needed to locate the offending record. The module also provides BlobGenResult<T> as
// a convenience type alias for Result<T, BlobGenError>. Every violation is terminal:
// this is an offline, deterministic build step, so nothing is caught or downgraded.

//! Error types for the blobgen compiler.
//!
//! Using thiserror for more idiomatic error handling.

use crate::core::coords::{CoreId, StreamRef};
use thiserror::Error;

/// Main error type for overlay blob compilation.
#[derive(Error, Debug)]
pub enum BlobGenError {
    #[error("Malformed graph attribute at line {line}: {text:?}")]
    MalformedAttribute { line: usize, text: String },

    #[error("Graph input error: {reason}")]
    GraphInput { reason: String },

    #[error(
        "Missing {direction} phase for {stream} at phase {phase} \
         (next_phase_src/dest_change must be set on the last phase of a run)"
    )]
    MissingChainPhase {
        stream: StreamRef,
        phase: u64,
        direction: &'static str,
    },

    #[error("Missing peer phase {phase} on {peer} referenced by {stream}")]
    MissingPeerPhase {
        stream: StreamRef,
        peer: StreamRef,
        phase: u64,
    },

    #[error(
        "Multicast destinations must go to the same stream id, \
         please review {stream} phase {phase}"
    )]
    MulticastStreamMismatch { stream: StreamRef, phase: u64 },

    #[error("Found different {attribute} between output/intermediate streams for {core}")]
    InconsistentBlockDim {
        core: CoreId,
        attribute: &'static str,
    },

    #[error(
        "Data buffer and tile header buffer overlap! {stream}, phase={phase}, \
         data buffer [{data_start:#x}, {data_end:#x}) overlaps tile header buffer \
         [{info_start:#x}, {info_end:#x}). This likely indicates the number of tile \
         sizes for the core was miscounted upstream."
    )]
    BufferOverlap {
        stream: StreamRef,
        phase: u64,
        data_start: u32,
        data_end: u32,
        info_start: u32,
        info_end: u32,
    },

    #[error(
        "The overlay blob for {core} (epoch {epoch}) does not fit, the max size is \
         {allowed}, however we tried to allocate {computed}"
    )]
    BlobBudgetExceeded {
        core: CoreId,
        epoch: u64,
        computed: u32,
        allowed: u32,
    },

    #[error("Could not compute epoch_q_slots_remaining for {stream}")]
    QSlotUnderflow { stream: StreamRef },

    #[error("fork_stream_ids exceeds max fork allowed for {stream}")]
    TooManyForks { stream: StreamRef },

    #[error("I/O error writing {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Result type alias for blob compilation operations.
pub type BlobGenResult<T> = Result<T, BlobGenError>;
