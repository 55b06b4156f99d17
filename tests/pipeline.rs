// End-to-end pipeline tests: graph fixture text in, per-core hex files out. These
// exercise the same path the binary drives: parse, finalize, both resolver passes,
// tile-header placement, per-core compilation, buffer validation and hex emission.

use std::path::PathBuf;

use blobgen::compiler::{compile_graph, CompiledGraph};
use blobgen::core::config::BlobGenConfig;
use blobgen::core::coords::{CoreId, StreamRef};
use blobgen::core::error::BlobGenError;
use blobgen::core::grid::GridConfig;
use blobgen::emit::{core_sections, hex_file_name, write_blobs};
use blobgen::graph::loader::{build_graph, parse_text};
use blobgen::graph::PhaseGraph;
use blobgen::layout::epoch_info_struct_size;
use blobgen::regs::layout_for;
use blobgen::validate::check_buffer_regions;

// Epoch 1, phases 5..7: a two-phase remote link from (0,0) to (0,1).
const LINK_FIXTURE: &str = "\
phase_4294967301:
  chip_0__y_0__x_0__stream_id_8:
    source_endpoint: true
    remote_receiver: true
    next_phase_src_change: false
    next_phase_dest_change: false
    buf_addr: 0x40000
    buf_size: 0x4000
    msg_size: 2048
    num_msgs: 4
    dest: [chip_0__y_0__x_1__stream_id_9]
  chip_0__y_0__x_1__stream_id_9:
    remote_source: true
    receiver_endpoint: true
    next_phase_src_change: false
    next_phase_dest_change: false
    buf_addr: 0x60000
    buf_size: 0x4000
    msg_size: 2048
    num_msgs: 4
    src: [chip_0__y_0__x_0__stream_id_8]
phase_4294967302:
  chip_0__y_0__x_0__stream_id_8:
    source_endpoint: true
    remote_receiver: true
    buf_addr: 0x40000
    buf_size: 0x4000
    msg_size: 2048
    num_msgs: 2
    dest: [chip_0__y_0__x_1__stream_id_9]
  chip_0__y_0__x_1__stream_id_9:
    remote_source: true
    receiver_endpoint: true
    buf_addr: 0x60000
    buf_size: 0x4000
    msg_size: 2048
    num_msgs: 2
    src: [chip_0__y_0__x_0__stream_id_8]
";

fn load_fixture(text: &str) -> PhaseGraph {
    let tree = parse_text(text).unwrap();
    build_graph(&tree).unwrap()
}

fn grid() -> GridConfig {
    let mut grid = GridConfig::new();
    grid.add_chip(0, 1, 1);
    grid
}

fn compile_fixture(text: &str, cfg: &BlobGenConfig) -> (PhaseGraph, CompiledGraph) {
    let mut graph = load_fixture(text);
    let layout = layout_for("wormhole").unwrap();
    let compiled = compile_graph(&mut graph, &grid(), cfg, layout).unwrap();
    (graph, compiled)
}

fn temp_out_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join("blobgen_pipeline").join(name);
    if dir.exists() {
        std::fs::remove_dir_all(&dir).unwrap();
    }
    dir
}

#[test]
fn test_link_fixture_end_to_end() {
    let cfg = BlobGenConfig::default();
    let (graph, compiled) = compile_fixture(LINK_FIXTURE, &cfg);
    check_buffer_regions(&graph, &cfg).unwrap();

    assert_eq!(compiled.cores.len(), 2);
    let sender = compiled
        .cores
        .iter()
        .find(|c| c.core == CoreId::new(0, 0, 0))
        .unwrap();
    assert_eq!(sender.stream_info.len(), 1);
    let info = sender.summary(8).unwrap();
    assert_eq!(info.epoch_num_msgs, 6);
    assert_eq!(sender.streams[0].phases.len(), 2);

    let out_dir = temp_out_dir("link");
    let layout = layout_for("wormhole").unwrap();
    write_blobs(&compiled, "pipeline", &out_dir, &cfg, &grid(), layout).unwrap();

    // Both used cores plus invalid blobs for the rest of the 2x2 grid.
    for core in [
        CoreId::new(0, 0, 0),
        CoreId::new(0, 0, 1),
        CoreId::new(0, 1, 0),
        CoreId::new(0, 1, 1),
    ] {
        let path = out_dir.join(hex_file_name("pipeline", core));
        assert!(path.exists(), "missing {}", path.display());
    }

    let text =
        std::fs::read_to_string(out_dir.join(hex_file_name("pipeline", CoreId::new(0, 0, 0))))
            .unwrap();
    let first = text.lines().next().unwrap();
    assert_eq!(first, format!("@{:08x}", cfg.epoch_info_space_start(false) >> 2));
    assert!(text
        .lines()
        .skip(1)
        .take_while(|l| !l.starts_with('@'))
        .all(|l| l.len() == 8 && l.chars().all(|c| c.is_ascii_hexdigit())));
}

#[test]
fn test_unused_core_gets_invalid_epoch_record() {
    let cfg = BlobGenConfig::default();
    let (_, compiled) = compile_fixture(LINK_FIXTURE, &cfg);
    let out_dir = temp_out_dir("invalid");
    let layout = layout_for("wormhole").unwrap();
    write_blobs(&compiled, "pipeline", &out_dir, &cfg, &grid(), layout).unwrap();

    let text =
        std::fs::read_to_string(out_dir.join(hex_file_name("pipeline", CoreId::new(0, 1, 1))))
            .unwrap();
    let lines: Vec<&str> = text.lines().collect();
    // One section: the epoch struct alone, no stream records and no blob.
    assert_eq!(lines.len() as u32, 1 + epoch_info_struct_size(&cfg) / 4);
    assert_eq!(lines[1], "00000000"); // num_inputs
    assert_eq!(lines[3], "00000000"); // num_active_streams
    assert_eq!(lines[4], "00000001"); // epoch_valid
}

#[test]
fn test_worker_override_limits_invalid_blobs() {
    let cfg = BlobGenConfig::default();
    let (_, compiled) = compile_fixture(LINK_FIXTURE, &cfg);
    let mut grid = grid();
    grid.add_worker_core(1, 0);
    let out_dir = temp_out_dir("override");
    let layout = layout_for("wormhole").unwrap();
    write_blobs(&compiled, "pipeline", &out_dir, &cfg, &grid, layout).unwrap();

    assert!(out_dir
        .join(hex_file_name("pipeline", CoreId::new(0, 1, 0)))
        .exists());
    assert!(!out_dir
        .join(hex_file_name("pipeline", CoreId::new(0, 1, 1)))
        .exists());
}

#[test]
fn test_blob_budget_rejects_oversized_core() {
    let cfg = BlobGenConfig {
        overlay_blob_size: 256,
        ..Default::default()
    };
    let (_, compiled) = compile_fixture(LINK_FIXTURE, &cfg);
    let layout = layout_for("wormhole").unwrap();
    let sender = compiled
        .cores
        .iter()
        .find(|c| c.core == CoreId::new(0, 0, 0))
        .unwrap();
    let err = core_sections(&compiled, sender, &cfg, layout).unwrap_err();
    match err {
        BlobGenError::BlobBudgetExceeded { core, allowed, .. } => {
            assert_eq!(core, CoreId::new(0, 0, 0));
            assert_eq!(allowed, 256);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_data_buffer_colliding_with_tile_ring_is_rejected() {
    // The first tile-header ring for the default worker memory map sits at
    // 0x1b000; place the receiver's data buffer on top of it.
    let fixture = LINK_FIXTURE.replace("0x60000", "0x1b800");
    let cfg = BlobGenConfig::default();
    let (graph, _) = compile_fixture(&fixture, &cfg);
    let err = check_buffer_regions(&graph, &cfg).unwrap_err();
    assert!(matches!(
        err,
        BlobGenError::BufferOverlap {
            stream: StreamRef { stream_id: 9, .. },
            ..
        }
    ));
}
