// This module aggregates the shared infrastructure every compilation stage depends on:
// the BlobGenError/BlobGenResult error types, the CoreId/StreamRef coordinate value
// types with phase-number packing helpers, the GridConfig chip-grid description with
// Ethernet-aware coordinate stepping, and the BlobGenConfig run parameter block. The
// submodules are re-exported here so stage code can use crate::core::{...} without
// caring about the internal file split.

//! Shared infrastructure: errors, coordinates, grid and configuration.

pub mod config;
pub mod coords;
pub mod error;
pub mod grid;

pub use config::BlobGenConfig;
pub use coords::{CoreId, StreamRef};
pub use error::{BlobGenError, BlobGenResult};
pub use grid::GridConfig;
