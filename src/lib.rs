// This crate compiles declarative stream-graph descriptions for a network-on-chip
// overlay into the per-core register blobs the firmware loads at epoch start. A graph
// fixture names every stream phase on every core: buffers, message sizes, source and
// destination links, multicast rectangles, DRAM queues and scatter patterns. The
// pipeline loads and normalizes the graph, resolves destination register fields and NOC
// plane selection across linked streams, places tile-header rings per core, compiles
// each stream's phase sequence into auto-config register write lists, validates buffer
// placement, and serializes everything into address-tagged hex files, one per core,
// including invalid-epoch records for cores the graph never touches.

//! Stream-graph to register-blob compiler for a NOC overlay.
//!
//! The top-level flow is [`graph::loader::load_graph_file`], then
//! [`compiler::compile_graph`], then [`validate::check_buffer_regions`] and
//! [`emit::write_blobs`].

pub mod blob;
pub mod compiler;
pub mod core;
pub mod emit;
pub mod graph;
pub mod layout;
pub mod regs;
pub mod resolve;
pub mod validate;

pub use crate::core::{BlobGenConfig, BlobGenError, BlobGenResult, CoreId, GridConfig, StreamRef};
