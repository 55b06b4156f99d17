// This module provides the restricted text loader for graph fixture files. The format
// is a small YAML subset: "key: value" lines with two-space indentation, where a line
// with no value opens a nested mapping and values are inferred as int, bool, hex int,
// bracketed list, or a bare label. A line splitting into more than two colon-separated
// fields is a fatal input error. Parsing happens in two steps: the text is folded into
// a generic Value tree, then the tree is walked to build the typed PhaseGraph --
// "phase_<n>" keys become phase records keyed by stream label, and the "dram_blob" key
// becomes per-stream DRAM buffer descriptor lists. Unknown attributes are skipped with
// a debug log rather than rejected, matching how fixture files accumulate fields.

//! Text loader producing a [`PhaseGraph`] from graph fixture files.

use std::fs;
use std::path::Path;

use hashbrown::HashMap;
use log::debug;

use crate::core::coords::parse_stream_label;
use crate::core::error::{BlobGenError, BlobGenResult};
use crate::graph::phase::{DramBufferDesc, Phase};
use crate::graph::PhaseGraph;

/// One parsed value from the fixture text.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Bool(bool),
    Label(String),
    List(Vec<Value>),
    Map(Vec<(String, Value)>),
}

impl Value {
    fn as_map(&self) -> Option<&[(String, Value)]> {
        match self {
            Value::Map(entries) => Some(entries),
            _ => None,
        }
    }

    fn as_u32(&self) -> Option<u32> {
        match self {
            Value::Int(v) => u32::try_from(*v).ok(),
            _ => None,
        }
    }

    fn as_u64(&self) -> Option<u64> {
        match self {
            Value::Int(v) => u64::try_from(*v).ok(),
            _ => None,
        }
    }

    fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            // Fixture files sometimes spell flags as 0/1.
            Value::Int(v) => Some(*v != 0),
            _ => None,
        }
    }
}

fn infer_scalar(text: &str) -> Value {
    if let Ok(v) = text.parse::<i64>() {
        return Value::Int(v);
    }
    match text {
        "true" | "True" => return Value::Bool(true),
        "false" | "False" => return Value::Bool(false),
        _ => {}
    }
    if let Some(hex) = text.strip_prefix("0x") {
        if let Ok(v) = i64::from_str_radix(hex, 16) {
            return Value::Int(v);
        }
    }
    if let Some(inner) = text.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
        let items = inner
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(infer_scalar)
            .collect();
        return Value::List(items);
    }
    Value::Label(text.to_string())
}

/// Parse fixture text into a generic value tree.
pub fn parse_text(text: &str) -> BlobGenResult<Value> {
    // Stack of (indent, entries) for the currently open mappings.
    let mut stack: Vec<(usize, Vec<(String, Value)>)> = vec![(0, Vec::new())];

    fn close_to(stack: &mut Vec<(usize, Vec<(String, Value)>)>, indent: usize) {
        while stack.len() > 1 && stack.last().map(|(i, _)| *i >= indent + 1).unwrap_or(false) {
            let (_, done) = stack.pop().unwrap();
            // The parent's last entry is the placeholder opened for this map.
            let parent = &mut stack.last_mut().unwrap().1;
            parent.last_mut().unwrap().1 = Value::Map(done);
        }
    }

    for (line_num, raw) in text.lines().enumerate() {
        let line = raw.trim_end();
        if line.trim().is_empty() {
            continue;
        }
        let indent = line.len() - line.trim_start().len();
        let body = &line[indent..];

        let fields: Vec<&str> = body.split(':').collect();
        if fields.len() > 2 {
            return Err(BlobGenError::MalformedAttribute {
                line: line_num + 1,
                text: line.to_string(),
            });
        }
        close_to(&mut stack, indent);

        let key = fields[0].to_string();
        if fields.len() == 1 || fields[1].trim().is_empty() {
            // Opens a nested mapping at the next indent level.
            stack.last_mut().unwrap().1.push((key, Value::Map(Vec::new())));
            stack.push((indent + 2, Vec::new()));
        } else {
            let val = infer_scalar(fields[1].trim());
            stack.last_mut().unwrap().1.push((key, val));
        }
    }
    close_to(&mut stack, 0);
    let (_, root) = stack.pop().unwrap_or((0, Vec::new()));
    Ok(Value::Map(root))
}

/// Load a graph fixture file into a finalized [`PhaseGraph`].
pub fn load_graph_file(path: &Path) -> BlobGenResult<PhaseGraph> {
    let text = fs::read_to_string(path).map_err(|source| BlobGenError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let tree = parse_text(&text)?;
    let mut graph = build_graph(&tree)?;
    graph.finalize();
    Ok(graph)
}

/// Build an (unfinalized) graph from a parsed value tree.
pub fn build_graph(tree: &Value) -> BlobGenResult<PhaseGraph> {
    let entries = tree.as_map().ok_or_else(|| BlobGenError::GraphInput {
        reason: "graph fixture root is not a mapping".to_string(),
    })?;

    let mut graph = PhaseGraph::new();
    for (key, val) in entries {
        if let Some(num_text) = key.strip_prefix("phase_") {
            let phase_num: u64 = num_text.parse().map_err(|_| BlobGenError::GraphInput {
                reason: format!("bad phase key {key:?}"),
            })?;
            let streams = val.as_map().ok_or_else(|| BlobGenError::GraphInput {
                reason: format!("{key} is not a mapping"),
            })?;
            for (stream_label, attrs) in streams {
                let sref = parse_stream_label(stream_label)?;
                let phase = build_phase(phase_num, stream_label, attrs)?;
                graph.insert_phase(sref, phase);
            }
        } else if key == "dram_blob" {
            build_dram_buffers(val, &mut graph.dram_buffers)?;
        } else {
            debug!("skipping top-level graph key {key}");
        }
    }
    Ok(graph)
}

fn attr_err(stream: &str, key: &str) -> BlobGenError {
    BlobGenError::GraphInput {
        reason: format!("attribute {key} of {stream} has the wrong type"),
    }
}

fn stream_list(val: &Value, stream: &str, key: &str) -> BlobGenResult<Vec<crate::core::coords::StreamRef>> {
    let items = match val {
        Value::List(items) => items.as_slice(),
        Value::Label(_) => std::slice::from_ref(val),
        _ => return Err(attr_err(stream, key)),
    };
    items
        .iter()
        .map(|item| match item {
            Value::Label(label) => parse_stream_label(label),
            _ => Err(attr_err(stream, key)),
        })
        .collect()
}

/// NOC plane ids are 0 or 1; anything else would corrupt coordinate flips.
fn noc_id(val: &Value, stream: &str, key: &str) -> BlobGenResult<u32> {
    match val.as_u32() {
        Some(id) if id <= 1 => Ok(id),
        _ => Err(BlobGenError::GraphInput {
            reason: format!("attribute {key} of {stream} must be NOC 0 or 1"),
        }),
    }
}

fn build_phase(phase_num: u64, stream: &str, attrs: &Value) -> BlobGenResult<Phase> {
    let entries = attrs.as_map().ok_or_else(|| BlobGenError::GraphInput {
        reason: format!("phase_{phase_num} entry for {stream} is not a mapping"),
    })?;

    let mut p = Phase {
        phase_num,
        ..Default::default()
    };
    for (key, val) in entries {
        let bad = || attr_err(stream, key);
        match key.as_str() {
            "src" => p.src = stream_list(val, stream, key)?,
            "dest" => p.dest = stream_list(val, stream, key)?,

            "source_endpoint" => p.source_endpoint = val.as_bool().ok_or_else(bad)?,
            "remote_source" => p.remote_source = val.as_bool().ok_or_else(bad)?,
            "receiver_endpoint" => p.receiver_endpoint = val.as_bool().ok_or_else(bad)?,
            "remote_receiver" => p.remote_receiver = val.as_bool().ok_or_else(bad)?,
            "local_receiver" => p.local_receiver = val.as_bool().ok_or_else(bad)?,
            "local_receiver_tile_clearing" => {
                p.local_receiver_tile_clearing = val.as_bool().ok_or_else(bad)?
            }
            "local_sources_connected" => {
                p.local_sources_connected = val.as_bool().ok_or_else(bad)?
            }
            "eth_sender" => p.eth_sender = val.as_bool().ok_or_else(bad)?,
            "eth_receiver" => p.eth_receiver = val.as_bool().ok_or_else(bad)?,

            "buf_addr" => p.buf_addr = val.as_u32().ok_or_else(bad)?,
            "buf_size" => p.buf_size = val.as_u32().ok_or_else(bad)?,
            "buf_base_addr" => p.buf_base_addr = Some(val.as_u32().ok_or_else(bad)?),
            "buf_full_size_bytes" => {
                p.buf_full_size_bytes = Some(val.as_u32().ok_or_else(bad)?)
            }
            "msg_size" => p.msg_size = Some(val.as_u32().ok_or_else(bad)?),
            "num_msgs" => p.num_msgs = val.as_u32().ok_or_else(bad)?,

            "outgoing_data_noc" => p.outgoing_data_noc = Some(noc_id(val, stream, key)?),
            "incoming_data_noc" => p.incoming_data_noc = Some(noc_id(val, stream, key)?),
            "remote_src_update_noc" => {
                p.remote_src_update_noc = Some(noc_id(val, stream, key)?)
            }
            "vc" => p.vc = Some(val.as_u32().ok_or_else(bad)?),
            "reg_update_vc" => p.reg_update_vc = Some(val.as_u32().ok_or_else(bad)?),
            "no_dest_handshake" => p.no_dest_handshake = val.as_bool().ok_or_else(bad)?,
            "group_priority" => p.group_priority = val.as_u32().ok_or_else(bad)?,
            "linked" => p.linked = val.as_bool().ok_or_else(bad)?,
            "no_path_res" => p.no_path_res = val.as_bool().ok_or_else(bad)?,
            "mcast_xy" => p.mcast_xy = val.as_u32().ok_or_else(bad)?,
            "arb_group_size" => p.arb_group_size = Some(val.as_u32().ok_or_else(bad)?),
            "src_in_order_fwd" => p.src_in_order_fwd = val.as_bool().ok_or_else(bad)?,
            "src_in_order_fwd_num_msgs" => {
                p.src_in_order_fwd_num_msgs = val.as_u32().ok_or_else(bad)?
            }
            "local_stream_clear_num" => {
                p.local_stream_clear_num = Some(val.as_u32().ok_or_else(bad)?)
            }
            "msg_group_stream_clear_type" => {
                p.msg_group_stream_clear_type = val.as_u32().ok_or_else(bad)?
            }
            "buf_space_available_ack_thr" => {
                p.buf_space_available_ack_thr = Some(val.as_u32().ok_or_else(bad)?)
            }

            "next_phase_src_change" => {
                p.next_phase_src_change = Some(val.as_bool().ok_or_else(bad)?)
            }
            "next_phase_dest_change" => {
                p.next_phase_dest_change = Some(val.as_bool().ok_or_else(bad)?)
            }
            "phase_auto_config" => p.phase_auto_config = val.as_bool().ok_or_else(bad)?,
            "phase_auto_advance" => p.phase_auto_advance = val.as_bool().ok_or_else(bad)?,
            "data_auto_send" => p.data_auto_send = val.as_bool().ok_or_else(bad)?,
            "auto_run" => p.auto_run = val.as_bool().ok_or_else(bad)?,
            "intermediate" => p.intermediate = val.as_bool().ok_or_else(bad)?,
            "park_input" => p.park_input = val.as_bool().ok_or_else(bad)?,
            "park_output" => p.park_output = val.as_bool().ok_or_else(bad)?,
            "moves_raw_data" => p.moves_raw_data = val.as_bool().ok_or_else(bad)?,
            "legacy_pack" => p.legacy_pack = val.as_bool().ok_or_else(bad)?,
            "ncrisc_clear" => p.ncrisc_clear = val.as_bool().ok_or_else(bad)?,
            "no_prev_phase_outgoing_data_flush" => {
                p.no_prev_phase_outgoing_data_flush = val.as_bool().ok_or_else(bad)?
            }
            "resend" => p.resend = val.as_bool().ok_or_else(bad)?,
            "ptrs_not_zero" => p.ptrs_not_zero = val.as_bool().ok_or_else(bad)?,
            "num_iters_in_epoch" => p.num_iters_in_epoch = Some(val.as_u32().ok_or_else(bad)?),
            "num_msgs_in_block" => p.num_msgs_in_block = val.as_u32().ok_or_else(bad)?,
            "overlay_blob_extra_size" => {
                p.overlay_blob_extra_size = val.as_u32().ok_or_else(bad)?
            }
            "input_index" => p.input_index = Some(val.as_u32().ok_or_else(bad)?),
            "output_index" => p.output_index = Some(val.as_u32().ok_or_else(bad)?),
            "producer_epoch_id" => p.producer_epoch_id = Some(val.as_u32().ok_or_else(bad)?),
            "has_packer_mcast_opt" => p.has_packer_mcast_opt = val.as_bool().ok_or_else(bad)?,
            "tile_dim_r" => p.tile_dim_r = Some(val.as_u32().ok_or_else(bad)?),
            "batch_dim_size" => p.batch_dim_size = val.as_u32().ok_or_else(bad)?,
            "c_dim_loop_num_rows" => {
                p.c_dim_loop_num_rows = Some(val.as_u32().ok_or_else(bad)?)
            }
            "r_dim_size" => p.r_dim_size = val.as_u32().ok_or_else(bad)?,
            "c_dim_size" => p.c_dim_size = val.as_u32().ok_or_else(bad)?,
            "zr_dim_size" => p.zr_dim_size = val.as_u32().ok_or_else(bad)?,
            "zc_dim_size" => p.zc_dim_size = val.as_u32().ok_or_else(bad)?,

            "is_scatter_pack" => p.is_scatter_pack = val.as_bool().ok_or_else(bad)?,
            "scatter_order_size" => p.scatter_order_size = val.as_u32().ok_or_else(bad)?,
            "padding_scatter_order_size" => {
                p.padding_scatter_order_size = val.as_u32().ok_or_else(bad)?
            }
            "scatter_idx" => p.scatter_idx = val.as_u32().ok_or_else(bad)?,
            "num_unroll_iter" => p.num_unroll_iter = val.as_u32().ok_or_else(bad)?,
            "num_scatter_inner_loop" => {
                p.num_scatter_inner_loop = Some(val.as_u32().ok_or_else(bad)?)
            }
            "pipe_scatter_output_loop_count" => {
                p.pipe_scatter_output_loop_count = Some(val.as_u32().ok_or_else(bad)?)
            }

            "fork_stream_ids" => {
                let Value::List(items) = val else { return Err(bad()) };
                p.fork_stream_ids = items
                    .iter()
                    .map(|v| v.as_u32().map(|id| id as u8).ok_or_else(bad))
                    .collect::<BlobGenResult<_>>()?;
            }
            "num_fork_streams" => p.num_fork_streams = val.as_u32().ok_or_else(bad)?,

            "ublock_rt" => p.ublock_rt = val.as_u32().ok_or_else(bad)?,
            "ublock_ct" => p.ublock_ct = val.as_u32().ok_or_else(bad)?,
            "mblock_m" => p.mblock_m = val.as_u32().ok_or_else(bad)?,
            "mblock_n" => p.mblock_n = val.as_u32().ok_or_else(bad)?,
            "mblock_k" => p.mblock_k = val.as_u32().ok_or_else(bad)?,

            "dram_io" => p.dram_io = val.as_bool().ok_or_else(bad)?,
            "dram_input" => p.dram_input = val.as_bool().ok_or_else(bad)?,
            "dram_output" => p.dram_output = val.as_bool().ok_or_else(bad)?,
            "dram_streaming" => p.dram_streaming = val.as_bool().ok_or_else(bad)?,
            "dram_input_no_push" => p.dram_input_no_push = val.as_bool().ok_or_else(bad)?,
            "dram_output_no_push" => p.dram_output_no_push = val.as_bool().ok_or_else(bad)?,
            "dram_writes_with_cmd_buf" => {
                p.dram_writes_with_cmd_buf = val.as_bool().ok_or_else(bad)?
            }

            "preload_data" => {
                let Value::List(items) = val else { return Err(bad()) };
                p.preload_data = items
                    .iter()
                    .map(|v| v.as_u64().map(|dw| dw as u32).ok_or_else(bad))
                    .collect::<BlobGenResult<_>>()?;
            }

            other => debug!("phase_{phase_num} {stream}: skipping attribute {other}"),
        }
    }
    Ok(p)
}

fn build_dram_buffers(
    val: &Value,
    out: &mut HashMap<crate::core::coords::StreamRef, Vec<DramBufferDesc>>,
) -> BlobGenResult<()> {
    let streams = val.as_map().ok_or_else(|| BlobGenError::GraphInput {
        reason: "dram_blob is not a mapping".to_string(),
    })?;
    for (stream_label, bufs) in streams {
        let sref = parse_stream_label(stream_label)?;
        let entries = bufs.as_map().ok_or_else(|| BlobGenError::GraphInput {
            reason: format!("dram_blob entry for {stream_label} is not a mapping"),
        })?;
        let mut list = Vec::with_capacity(entries.len());
        for (_buf_idx, attrs) in entries {
            list.push(build_dram_buffer(stream_label, attrs)?);
        }
        out.insert(sref, list);
    }
    Ok(())
}

fn build_dram_buffer(stream: &str, attrs: &Value) -> BlobGenResult<DramBufferDesc> {
    let entries = attrs.as_map().ok_or_else(|| BlobGenError::GraphInput {
        reason: format!("dram buffer for {stream} is not a mapping"),
    })?;
    let mut buf = DramBufferDesc {
        total_readers: 1,
        ..Default::default()
    };
    for (key, val) in entries {
        let bad = || attr_err(stream, key);
        match key.as_str() {
            "dram_buf_noc_addr" => buf.dram_buf_noc_addr = val.as_u64().ok_or_else(bad)?,
            "dram_buf_size_bytes" => buf.dram_buf_size_bytes = val.as_u32().ok_or_else(bad)?,
            "dram_buf_size_tiles" => buf.dram_buf_size_tiles = val.as_u32().ok_or_else(bad)?,
            "dram_buf_size_q_slots" => {
                buf.dram_buf_size_q_slots = val.as_u32().ok_or_else(bad)?
            }
            "dram_buf_read_chunk_size_tiles" => {
                buf.dram_buf_read_chunk_size_tiles = val.as_u32().ok_or_else(bad)?
            }
            "dram_buf_write_chunk_size_tiles" => {
                buf.dram_buf_write_chunk_size_tiles = val.as_u32().ok_or_else(bad)?
            }
            "dram_scatter_chunk_size_tiles" => {
                buf.dram_scatter_chunk_size_tiles = val.as_u32().ok_or_else(bad)?
            }
            "msg_size" => buf.msg_size = val.as_u32().ok_or_else(bad)?,
            "num_msgs" => buf.num_msgs = val.as_u32().ok_or_else(bad)?,
            "reader_index" => buf.reader_index = val.as_u32().ok_or_else(bad)?,
            "total_readers" => buf.total_readers = val.as_u32().ok_or_else(bad)?,
            "dram_padding" => buf.dram_padding = val.as_bool().ok_or_else(bad)?,
            "dram_io" => buf.dram_io = val.as_bool().ok_or_else(bad)?,
            "dram_input" => buf.dram_input = val.as_bool().ok_or_else(bad)?,
            "dram_output" => buf.dram_output = val.as_bool().ok_or_else(bad)?,
            "dram_streaming" => buf.dram_streaming = val.as_bool().ok_or_else(bad)?,
            "dram_ram" => buf.dram_ram = val.as_bool().ok_or_else(bad)?,
            "dram_streaming_dest" => {
                let Value::Label(label) = val else { return Err(bad()) };
                buf.dram_streaming_dest = Some(parse_stream_label(label)?);
            }
            "dram_scatter_offsets" => {
                let Value::List(items) = val else { return Err(bad()) };
                buf.dram_scatter_offsets = items
                    .iter()
                    .map(|v| v.as_u64().ok_or_else(bad))
                    .collect::<BlobGenResult<_>>()?;
            }
            "dram_scatter_offsets_full_size" => {
                buf.dram_scatter_offsets_full_size = val.as_u32().ok_or_else(bad)?
            }
            other => debug!("dram_blob {stream}: skipping attribute {other}"),
        }
    }
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::coords::{CoreId, StreamRef};

    const FIXTURE: &str = "\
phase_1:
  chip_0__y_0__x_0__stream_id_8:
    source_endpoint: true
    remote_receiver: true
    buf_addr: 0x40000
    buf_size: 4096
    msg_size: 2048
    num_msgs: 2
    dest: [chip_0__y_0__x_1__stream_id_9]
  chip_0__y_0__x_1__stream_id_9:
    remote_source: true
    receiver_endpoint: true
    buf_addr: 0x50000
    buf_size: 4096
    msg_size: 2048
    num_msgs: 2
";

    #[test]
    fn test_parse_fixture() {
        let graph = {
            let tree = parse_text(FIXTURE).unwrap();
            let mut graph = build_graph(&tree).unwrap();
            graph.finalize();
            graph
        };
        let sender = StreamRef::new(CoreId::new(0, 0, 0), 8);
        let phase = graph.phase(&sender, 1).unwrap();
        assert!(phase.source_endpoint);
        assert_eq!(phase.buf_addr, 0x40000);
        assert_eq!(phase.msg_size(), 2048);
        assert_eq!(phase.dest.len(), 1);
        assert_eq!(phase.dest[0], StreamRef::new(CoreId::new(0, 0, 1), 9));
    }

    #[test]
    fn test_malformed_attribute_is_fatal() {
        let text = "phase_1:\n  chip_0__y_0__x_0__stream_id_8:\n    a: b: c\n";
        assert!(matches!(
            parse_text(text),
            Err(BlobGenError::MalformedAttribute { line: 3, .. })
        ));
    }

    #[test]
    fn test_noc_plane_id_out_of_range_is_fatal() {
        let text = "\
phase_1:
  chip_0__y_0__x_0__stream_id_8:
    source_endpoint: true
    receiver_endpoint: true
    incoming_data_noc: 2
";
        let tree = parse_text(text).unwrap();
        let err = build_graph(&tree).unwrap_err();
        assert!(matches!(err, BlobGenError::GraphInput { .. }));
    }

    #[test]
    fn test_value_inference() {
        assert_eq!(infer_scalar("42"), Value::Int(42));
        assert_eq!(infer_scalar("0x1f"), Value::Int(31));
        assert_eq!(infer_scalar("True"), Value::Bool(true));
        assert_eq!(
            infer_scalar("[1, 2, 3]"),
            Value::List(vec![Value::Int(1), Value::Int(2), Value::Int(3)])
        );
    }

    #[test]
    fn test_dram_blob_section() {
        let text = "\
dram_blob:
  chip_0__y_0__x_0__stream_id_8:
    0:
      dram_buf_noc_addr: 0x100030000000
      dram_buf_size_bytes: 8192
      dram_buf_size_tiles: 4
      dram_buf_size_q_slots: 2
      msg_size: 2048
      num_msgs: 4
      dram_input: true
      dram_io: true
";
        let tree = parse_text(text).unwrap();
        let graph = build_graph(&tree).unwrap();
        let sref = StreamRef::new(CoreId::new(0, 0, 0), 8);
        let bufs = &graph.dram_buffers[&sref];
        assert_eq!(bufs.len(), 1);
        assert!(bufs[0].dram_input);
        assert_eq!(bufs[0].q_slot_size_tiles(), 2);
    }
}
