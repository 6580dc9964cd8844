//! Mesh Engine Command-Line Interface
//!
//! This CLI provides tools for:
//! - Running multi-node mesh simulations without hardware
//! - Decoding captured frames for inspection

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use hopmesh_core::simulation::{MeshSimulator, SimConfig};
use hopmesh_core::wire::Frame;
use tracing::info;

#[derive(Parser)]
#[command(name = "hopmesh")]
#[command(author, version, about = "Mesh engine simulator and frame tools", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an in-memory multi-node mesh simulation
    Sim {
        /// Number of nodes
        #[arg(short, long, default_value = "10")]
        nodes: usize,

        /// How many of the first nodes run in gateway mode
        #[arg(short, long, default_value = "1")]
        gateways: usize,

        /// Simulation area edge length in meters
        #[arg(short, long, default_value = "500")]
        area: f64,

        /// Number of simulation steps (10 ms each)
        #[arg(short, long, default_value = "6000")]
        steps: u64,

        /// Seed for node placement
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Data messages to inject between random node pairs
        #[arg(short, long, default_value = "20")]
        messages: u64,
    },

    /// Decode a hex-encoded frame and print its fields
    Decode {
        /// Frame bytes as hex, e.g. 02aabbccddeeff...
        hex: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Sim {
            nodes,
            gateways,
            area,
            steps,
            seed,
            messages,
        } => run_sim(nodes, gateways, area, steps, seed, messages),
        Commands::Decode { hex } => decode_frame(&hex),
    }
}

fn run_sim(
    nodes: usize,
    gateways: usize,
    area: f64,
    steps: u64,
    seed: u64,
    messages: u64,
) -> Result<()> {
    if nodes == 0 {
        bail!("simulation needs at least one node");
    }
    if gateways > nodes {
        bail!("gateway count {gateways} exceeds node count {nodes}");
    }

    let config = SimConfig::default()
        .with_node_count(nodes)
        .with_gateway_count(gateways)
        .with_area(area, area)
        .with_seed(seed);
    let mut sim = MeshSimulator::new(config);

    info!(nodes, gateways, area, "simulation starting");

    // Let discovery settle, then inject traffic spread over the run.
    let warmup = steps / 10;
    sim.run(warmup);

    let mut rng = seed;
    let traffic_steps = steps - warmup;
    for i in 0..messages {
        rng = rng.wrapping_mul(6364136223846793005).wrapping_add(1);
        let from = (rng >> 33) as usize % nodes;
        rng = rng.wrapping_mul(6364136223846793005).wrapping_add(1);
        let mut to = (rng >> 33) as usize % nodes;
        if to == from {
            to = (to + 1) % nodes;
        }

        let payload = format!("message {i}");
        sim.send_data(from, to, payload.as_bytes());
        sim.run(traffic_steps / messages.max(1));
    }

    // Let the last frames settle before reporting.
    sim.run(50);
    sim.print_summary();

    if sim.is_connected() {
        println!("\nTopology: connected");
    } else {
        println!("\nTopology: PARTITIONED");
    }
    Ok(())
}

fn decode_frame(hex: &str) -> Result<()> {
    let bytes = parse_hex(hex).context("invalid hex input")?;
    let frame = Frame::decode(&bytes).context("frame did not decode")?;

    println!("type:     {:?}", frame.frame_type);
    println!("src:      {}", frame.src);
    println!("dst:      {}", frame.dst);
    println!("hops:     {}", frame.hop_count);
    println!("sequence: {}", frame.sequence);
    println!("payload:  {} bytes", frame.data.len());
    if !frame.data.is_empty() {
        let hex: String = frame.data.iter().map(|b| format!("{b:02x}")).collect();
        println!("          {hex}");
        if let Ok(text) = std::str::from_utf8(&frame.data) {
            if text.chars().all(|c| !c.is_control()) {
                println!("          \"{text}\"");
            }
        }
    }
    Ok(())
}

fn parse_hex(input: &str) -> Result<Vec<u8>> {
    let cleaned: String = input
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':')
        .collect();
    if cleaned.len() % 2 != 0 {
        bail!("odd number of hex digits");
    }
    (0..cleaned.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&cleaned[i..i + 2], 16)
                .with_context(|| format!("bad hex byte at offset {i}"))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex() {
        assert_eq!(parse_hex("02aaff").unwrap(), vec![0x02, 0xAA, 0xFF]);
        assert_eq!(parse_hex("02:aa:ff").unwrap(), vec![0x02, 0xAA, 0xFF]);
        assert!(parse_hex("abc").is_err());
        assert!(parse_hex("zz").is_err());
    }
}
