//! Dataflow cost model CLI
//!
//! Usage:
//!   dfcost layer.m
//!   dfcost layer.m --num-pes 64 --json
//!   dfcost layer.m --hw accel.toml -v
//!   cat layer.m | dfcost --trace

use clap::Parser as ClapParser;
use colored::Colorize;
use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;

use dataflow_cost_model::report::{LayerReport, LevelReport};
use dataflow_cost_model::{analyze_source_with, config, AnalysisOptions, NetworkReport};

#[derive(ClapParser, Debug)]
#[command(name = "dfcost")]
#[command(author = "FPGA Team")]
#[command(version = "0.1.0")]
#[command(about = "Reuse and iteration analysis of accelerator dataflows")]
struct Args {
    /// Dataflow description file (reads stdin when omitted)
    #[arg(value_name = "FILE")]
    input_file: Option<PathBuf>,

    /// Hardware configuration (TOML)
    #[arg(long = "hw", value_name = "TOML")]
    hardware_file: Option<PathBuf>,

    /// Override the number of processing elements
    #[arg(short = 'p', long = "num-pes")]
    num_pes: Option<i64>,

    /// Output as JSON
    #[arg(short = 'j', long = "json")]
    json_output: bool,

    /// Log every spatial aggregation decision (needs -v or RUST_LOG=debug)
    #[arg(long = "trace")]
    trace: bool,

    /// Print a sample hardware configuration and exit
    #[arg(long = "sample-config")]
    sample_config: bool,

    /// Verbose output: per-case tables and debug logging
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,
}

fn main() {
    let args = Args::parse();

    let default_filter = if args.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter)).init();

    if args.sample_config {
        print!("{}", config::sample_config());
        return;
    }

    let source = if let Some(file) = &args.input_file {
        fs::read_to_string(file).unwrap_or_else(|e| {
            eprintln!("{}: Failed to read file '{}': {}", "Error".red(), file.display(), e);
            std::process::exit(1);
        })
    } else {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer).unwrap_or_else(|e| {
            eprintln!("{}: Failed to read stdin: {}", "Error".red(), e);
            std::process::exit(1);
        });
        buffer
    };

    let mut hardware = match config::load(args.hardware_file.as_deref()) {
        Ok(hw) => hw,
        Err(e) => {
            eprintln!("{}: {}", "Error".red(), e);
            std::process::exit(1);
        }
    };
    if let Some(num_pes) = args.num_pes {
        if num_pes <= 0 {
            eprintln!("{}: --num-pes must be positive, got {}", "Error".red(), num_pes);
            std::process::exit(1);
        }
        hardware.num_pes = num_pes;
    }

    let options = AnalysisOptions { trace: args.trace };
    let report = match analyze_source_with(&source, &hardware, options) {
        Ok(report) => report,
        Err(e) => {
            eprintln!("{}: {}", "Error".red(), e);
            std::process::exit(1);
        }
    };

    if args.json_output {
        match report.to_json() {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("{}: Failed to serialize to JSON: {}", "Error".red(), e);
                std::process::exit(1);
            }
        }
    } else {
        print_report(&report, args.verbose);
    }
}

fn print_report(report: &NetworkReport, verbose: bool) {
    println!("{} {}", "Network".bold().green(), report.name.bold());
    println!("{}", "=".repeat(50));
    println!(
        "{}: {} PEs, NoC {} elements/cycle (latency {}, multicast {})",
        "Hardware".cyan(),
        report.hardware.num_pes,
        report.hardware.noc_bandwidth,
        report.hardware.noc_latency,
        report.hardware.noc_multicast
    );

    for layer in &report.layers {
        println!();
        print_layer(layer, verbose);
    }

    println!();
    println!(
        "{}: {} MACs, {:.3e} nJ",
        "Total".bold(),
        report.total_macs(),
        report.total_energy()
    );
}

fn print_layer(layer: &LayerReport, verbose: bool) {
    println!(
        "{} {} ({}, {:?})",
        "Layer".bold().yellow(),
        layer.name.bold(),
        layer.layer_type,
        layer.quantization
    );
    println!("{}", "-".repeat(50));
    println!("  {}: {}", "MACs".cyan(), layer.num_macs);

    for level in &layer.levels {
        print_level(level, verbose);
    }

    println!(
        "  {}: MAC {:.3e}, L2 {:.3e}, NoC {:.3e} (nJ)",
        "Energy".cyan(),
        layer.energy.mac,
        layer.energy.l2_read + layer.energy.l2_write,
        layer.energy.noc
    );
}

fn print_level(level: &LevelReport, verbose: bool) {
    println!(
        "  {} {}: {} sub-clusters, {} iterations",
        "Level".bold(),
        level.level,
        level.num_clusters,
        level.total_iterations
    );
    println!("    {}: {}", "Dataflow".cyan(), level.dataflow);
    println!(
        "    {}: ingress {}, egress {}, partial sums {}, NoC cycles {}",
        "Traffic".cyan(),
        level.ingress,
        level.egress,
        level.partial_sums,
        level.noc_cycles
    );

    if verbose {
        for case in &level.cases {
            let volumes: Vec<String> = case
                .tensors
                .iter()
                .map(|t| format!("{} {}/{}", t.tensor, t.traffic, t.mapping_size))
                .collect();
            println!(
                "    case {:>3} x{:<6} {}  {}",
                case.case,
                case.occurrence,
                case.states,
                volumes.join(", ")
            );
        }
    } else {
        println!("    ({} cases, use -v for details)", level.cases.len());
    }
}
