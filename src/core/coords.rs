// This module provides the value types that identify things on the chip grid: CoreId is
// one (chip, y, x) coordinate, StreamRef is a stream endpoint (core + stream id). Both
// are small Copy structs with structural equality and hashing so they can key the graph
// maps directly; the string label encodings used by the input format
// ("chip_<c>__y_<y>__x_<x>__stream_id_<s>") are parsed exactly once at load time and
// rendered back only for error messages. The module also owns the phase number helpers:
// a phase number packs epoch_id<<32 | wrapped_phase, with a 15-bit wrapped phase and a
// 5-bit epoch-in-wrap range used by the hardware's compact phase register, plus the
// synthetic phase number used for dummy phases.

//! Grid coordinates, stream references and phase-number packing.

use std::fmt;

use crate::core::error::{BlobGenError, BlobGenResult};

/// Number of bits the epoch id is shifted up by inside a phase number.
pub const PHASE_SHIFT: u32 = 32;
/// Mask selecting the hardware-visible wrapped phase bits.
pub const WRAPPED_PHASE_MASK: u64 = 0x7FFF;
/// Bit position of the wrapped epoch inside the compact phase register.
pub const EPOCH_SHIFT: u32 = 15;
/// Wrapped epoch range (the compact register holds epoch mod EPOCH_MAX).
pub const EPOCH_MAX: u64 = 31;

/// One grid coordinate hosting up to 64 independent streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CoreId {
    pub chip: u32,
    pub y: u32,
    pub x: u32,
}

impl CoreId {
    pub fn new(chip: u32, y: u32, x: u32) -> Self {
        Self { chip, y, x }
    }
}

impl fmt::Display for CoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "chip_{}__y_{}__x_{}", self.chip, self.y, self.x)
    }
}

/// A numbered data-movement channel on a core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamRef {
    pub core: CoreId,
    pub stream_id: u8,
}

impl StreamRef {
    pub fn new(core: CoreId, stream_id: u8) -> Self {
        Self { core, stream_id }
    }
}

impl fmt::Display for StreamRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}__stream_id_{}", self.core, self.stream_id)
    }
}

/// Parse a "chip_<c>__y_<y>__x_<x>" core label.
pub fn parse_core_label(label: &str) -> BlobGenResult<CoreId> {
    let fields = parse_label_fields(label, &["chip_", "__y_", "__x_"])?;
    Ok(CoreId::new(fields[0], fields[1], fields[2]))
}

/// Parse a "chip_<c>__y_<y>__x_<x>__stream_id_<s>" stream label.
pub fn parse_stream_label(label: &str) -> BlobGenResult<StreamRef> {
    let fields = parse_label_fields(label, &["chip_", "__y_", "__x_", "__stream_id_"])?;
    Ok(StreamRef::new(
        CoreId::new(fields[0], fields[1], fields[2]),
        fields[3] as u8,
    ))
}

fn parse_label_fields(label: &str, prefixes: &[&str]) -> BlobGenResult<Vec<u32>> {
    let bad = || BlobGenError::GraphInput {
        reason: format!("unparseable label {label:?}"),
    };
    let mut rest = label;
    let mut out = Vec::with_capacity(prefixes.len());
    for (i, prefix) in prefixes.iter().enumerate() {
        rest = rest.strip_prefix(prefix).ok_or_else(bad)?;
        let end = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        if end == 0 || (i + 1 == prefixes.len() && end != rest.len()) {
            return Err(bad());
        }
        let digits;
        (digits, rest) = rest.split_at(end);
        out.push(digits.parse::<u32>().map_err(|_| bad())?);
    }
    Ok(out)
}

/// Epoch id held in the high bits of a phase number.
pub fn epoch_of(phase_num: u64) -> u64 {
    phase_num >> PHASE_SHIFT
}

/// Whether the wrapped-phase window differs between two phase numbers.
pub fn phase_wrapped(a: u64, b: u64) -> bool {
    (a & !WRAPPED_PHASE_MASK) != (b & !WRAPPED_PHASE_MASK)
}

/// Fold a full phase number into the compact value the hardware phase register holds.
pub fn wrap_phase_num(phase_num: u64) -> u32 {
    let epoch_num = phase_num >> PHASE_SHIFT;
    let wrapped = phase_num & WRAPPED_PHASE_MASK;
    (((epoch_num % EPOCH_MAX) << EPOCH_SHIFT) | wrapped) as u32
}

/// Phase register value for a synthetic dummy phase: the reserved all-ones
/// wrapped-phase slot, tagged with the epoch so chained epochs stay distinct.
pub fn dummy_phase_num(phase_num: u64) -> u32 {
    let epoch_num = phase_num >> PHASE_SHIFT;
    ((0x1F << EPOCH_SHIFT) | (epoch_num & WRAPPED_PHASE_MASK)) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_core_label() {
        let core = parse_core_label("chip_0__y_3__x_12").unwrap();
        assert_eq!(core, CoreId::new(0, 3, 12));
        assert!(parse_core_label("chip_0__y_3").is_err());
        assert!(parse_core_label("chip_0__y_3__x_12__stream_id_5").is_err());
    }

    #[test]
    fn test_parse_stream_label() {
        let sref = parse_stream_label("chip_1__y_0__x_7__stream_id_24").unwrap();
        assert_eq!(sref.core, CoreId::new(1, 0, 7));
        assert_eq!(sref.stream_id, 24);
        assert_eq!(sref.to_string(), "chip_1__y_0__x_7__stream_id_24");
    }

    #[test]
    fn test_wrap_phase_num() {
        // Low phases pass through unchanged.
        assert_eq!(wrap_phase_num(5), 5);
        // Epoch 1 lands in the wrapped-epoch field.
        let p = (1u64 << PHASE_SHIFT) | 5;
        assert_eq!(wrap_phase_num(p), (1 << EPOCH_SHIFT) | 5);
        // Epoch EPOCH_MAX wraps back to slot 0.
        let p = (EPOCH_MAX << PHASE_SHIFT) | 5;
        assert_eq!(wrap_phase_num(p), 5);
    }

    #[test]
    fn test_phase_wrapped() {
        assert!(!phase_wrapped(5, 100));
        assert!(phase_wrapped(5, WRAPPED_PHASE_MASK + 1));
        assert!(phase_wrapped(5, (1 << PHASE_SHIFT) | 5));
    }
}
