// Command-line driver for the blob compiler. Maps the flags the build system passes
// onto a BlobGenConfig and GridConfig, runs the pipeline, and writes one hex file per
// core into the output directory. Memory-map flags default to the shipping worker-core
// layout, so a typical invocation only needs the graph file, the output directory, the
// chip revision and the grid extent.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::{error, info};

use blobgen::compiler::compile_graph;
use blobgen::core::config::BlobGenConfig;
use blobgen::core::grid::GridConfig;
use blobgen::emit::write_blobs;
use blobgen::graph::loader::load_graph_file;
use blobgen::regs::layout_for;
use blobgen::validate::check_buffer_regions;
use blobgen::{BlobGenError, BlobGenResult};

/// Overlay stream-graph to register-blob compiler.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Graph fixture file describing every stream phase.
    #[arg(long, value_name = "FILE")]
    graph_yaml: PathBuf,

    /// Directory receiving the per-core hex files.
    #[arg(long, value_name = "DIR", default_value = "out")]
    blob_out_dir: PathBuf,

    /// Name prefixed to every output file.
    #[arg(long, default_value = "overlay_graph")]
    graph_name: String,

    /// Chip revision selecting the stream register layout.
    #[arg(long, default_value = "wormhole")]
    chip: String,

    /// Logical grid extent per chip, as "chip,size_y,size_x". Repeatable.
    #[arg(long = "grid", value_name = "CHIP,Y,X", required = true)]
    grids: Vec<String>,

    /// NOC grid extent used by the NOC-1 coordinate flip.
    #[arg(long, default_value_t = 1)]
    noc_x_size: u32,
    #[arg(long, default_value_t = 1)]
    noc_y_size: u32,

    /// Whether the NOC translation tables remap ids of 16 and up.
    #[arg(long)]
    noc_translation_id_enabled: bool,

    /// Ethernet core coordinate, as "y-x". Repeatable.
    #[arg(long = "eth-core", value_name = "Y-X")]
    eth_cores: Vec<String>,

    /// Restrict invalid-epoch blobs to these worker coordinates, as "y-x".
    /// Repeatable; when absent every unused coordinate gets one.
    #[arg(long = "worker-core", value_name = "Y-X")]
    worker_cores: Vec<String>,

    /// Overlay blob budget per worker core.
    #[arg(long, default_value_t = (64 * 1024) - 128)]
    overlay_blob_size: u32,

    /// Overlay blob budget per Ethernet core.
    #[arg(long, default_value_t = (32 * 1024) - 128)]
    overlay_blob_size_eth: u32,

    /// Worker-core epoch-info section base address.
    #[arg(long, default_value_t = (140 * 1024) + 128)]
    blob_section_start: u32,

    /// Ethernet-core epoch-info section base address.
    #[arg(long, default_value_t = 0)]
    blob_section_start_eth: u32,

    /// First byte above the overlay region usable for data buffers.
    #[arg(long, default_value_t = 204 * 1024)]
    data_buffer_space_base: u32,

    #[arg(long, default_value_t = 0)]
    data_buffer_space_base_eth: u32,

    #[arg(long, default_value_t = 1024 * 1024)]
    tensix_mem_size: u32,

    #[arg(long, default_value_t = 256 * 1024)]
    tensix_mem_size_eth: u32,

    /// Runtime section carved below the data-buffer base; zero elsewhere.
    #[arg(long, default_value_t = 0)]
    ncrisc_runtime_section_size: u32,

    #[arg(long, default_value_t = 2048)]
    max_msgs_per_phase: u32,
}

fn bad_input(reason: String) -> BlobGenError {
    BlobGenError::GraphInput { reason }
}

fn parse_coord(text: &str) -> BlobGenResult<(u32, u32)> {
    let (y, x) = text
        .split_once('-')
        .ok_or_else(|| bad_input(format!("bad core coordinate '{text}', expected y-x")))?;
    let parse = |s: &str| {
        s.trim()
            .parse::<u32>()
            .map_err(|_| bad_input(format!("bad core coordinate '{text}', expected y-x")))
    };
    Ok((parse(y)?, parse(x)?))
}

fn parse_grid(text: &str) -> BlobGenResult<(u32, u32, u32)> {
    let fields: Vec<u32> = text
        .split(',')
        .map(|s| s.trim().parse::<u32>())
        .collect::<Result<_, _>>()
        .map_err(|_| bad_input(format!("bad grid '{text}', expected chip,size_y,size_x")))?;
    match fields[..] {
        [chip, size_y, size_x] => Ok((chip, size_y, size_x)),
        _ => Err(bad_input(format!(
            "bad grid '{text}', expected chip,size_y,size_x"
        ))),
    }
}

fn build_grid(cli: &Cli) -> BlobGenResult<GridConfig> {
    let mut grid = GridConfig::new();
    for spec in &cli.grids {
        let (chip, size_y, size_x) = parse_grid(spec)?;
        grid.add_chip(chip, size_y, size_x);
    }
    for spec in &cli.eth_cores {
        let (y, x) = parse_coord(spec)?;
        grid.add_eth_core(y, x);
    }
    for spec in &cli.worker_cores {
        let (y, x) = parse_coord(spec)?;
        grid.add_worker_core(y, x);
    }
    Ok(grid)
}

fn build_config(cli: &Cli) -> BlobGenConfig {
    BlobGenConfig {
        graph_name: cli.graph_name.clone(),
        blob_out_dir: cli.blob_out_dir.display().to_string(),
        noc_x_size: cli.noc_x_size,
        noc_y_size: cli.noc_y_size,
        noc_translation_id_enabled: cli.noc_translation_id_enabled,
        overlay_blob_size: cli.overlay_blob_size,
        overlay_blob_size_eth: cli.overlay_blob_size_eth,
        blob_section_start: cli.blob_section_start,
        blob_section_start_eth: cli.blob_section_start_eth,
        data_buffer_space_base: cli.data_buffer_space_base,
        data_buffer_space_base_eth: cli.data_buffer_space_base_eth,
        tensix_mem_size: cli.tensix_mem_size,
        tensix_mem_size_eth: cli.tensix_mem_size_eth,
        ncrisc_runtime_section_size: cli.ncrisc_runtime_section_size,
        max_msgs_per_phase: cli.max_msgs_per_phase,
        ..Default::default()
    }
}

fn run(cli: &Cli) -> BlobGenResult<()> {
    let layout = layout_for(&cli.chip)
        .ok_or_else(|| bad_input(format!("unknown chip revision '{}'", cli.chip)))?;
    let cfg = build_config(cli);
    let grid = build_grid(cli)?;

    info!("loading graph from {}", cli.graph_yaml.display());
    let mut graph = load_graph_file(&cli.graph_yaml)?;
    let compiled = compile_graph(&mut graph, &grid, &cfg, layout)?;
    check_buffer_regions(&graph, &cfg)?;
    write_blobs(&compiled, &cli.graph_name, &cli.blob_out_dir, &cfg, &grid, layout)
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}
