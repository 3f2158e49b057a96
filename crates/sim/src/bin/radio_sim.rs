//! 802.15.4 radio medium simulation
//!
//! Without a scenario file every built-in preset is run.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use emu802154_sim::{Simulation, SimulationConfig, SimulationPresets, SimulationReport};
use indicatif::{ProgressBar, ProgressStyle};
use log::warn;

#[derive(Parser, Default)]
#[command(name = "radio_sim")]
#[command(author, version, about = "802.15.4 radio medium simulation", long_about = None)]
struct Args {
    /// Scenario file (TOML); runs the built-in presets when omitted
    scenario: Option<PathBuf>,

    /// Write the air traffic trace to this file
    #[arg(long)]
    trace: Option<PathBuf>,

    /// Sleep between events so simulated time runs this many times faster than real time
    #[arg(long)]
    paced: Option<f64>,
}

async fn run_scenario(name: &str, config: SimulationConfig, args: &Args) -> Result<()> {
    println!("{}", format!("\n>>> Scenario: {}", name).bright_green().bold());
    println!("Motes: {} ({:?})", config.motes, config.chip_kinds);
    println!("Packets per mote: {} x {} bytes", config.packets_per_mote, config.payload_len);
    println!("Packet Loss: {}%", (config.packet_loss * 100.0) as u32);
    println!("RSSI: {} dBm (std dev {})", config.rssi_mean, config.rssi_std_dev);
    println!();

    let duration = config.duration;
    let mut sim = Simulation::new(config)?;

    let report = match args.paced {
        Some(speed) => sim.run_paced(speed).await,
        None => {
            let bar = ProgressBar::new(duration);
            bar.set_style(ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} us")?);
            while sim.step() {
                bar.set_position(sim.now().min(duration));
            }
            bar.finish_and_clear();
            sim.report()
        }
    };

    print_report(&report);

    if let Some(path) = &args.trace {
        sim.trace().save(path)?;
        println!("Trace: {} records written to {}", sim.trace().len(), path.display());
    }
    Ok(())
}

fn print_report(report: &SimulationReport) {
    let medium = &report.medium;
    println!("Simulated time: {} us, {} events", report.end_time, report.events_dispatched);
    println!("Frames queued: {}", report.frames_queued);
    println!("Transmissions: {}", medium.transmissions);
    println!(
        "Receptions: {} started, {} lost, {} interfered",
        medium.receptions_started, medium.receptions_lost, medium.interferences
    );
    println!(
        "Forwarded: {} bytes, {} packets",
        medium.bytes_forwarded, medium.packets_delivered
    );

    let frames = format!("Frames received: {}", report.frames_received);
    if report.fcs_errors == 0 {
        println!("{}", frames.bright_yellow());
    } else {
        println!("{} ({} with bad FCS)", frames.bright_yellow(), report.fcs_errors.to_string().red());
    }
    if report.bytes_skipped > 0 {
        println!("Corrupted octets skipped: {}", report.bytes_skipped);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    println!("{}", "802.15.4 Radio Simulation".bright_blue().bold());
    println!("{}", "=========================".bright_blue());

    match &args.scenario {
        Some(path) => {
            let config = SimulationConfig::load(path)?;
            run_scenario(&path.display().to_string(), config, &args).await?;
        }
        None => {
            if args.trace.is_some() {
                warn!("--trace only applies to a single scenario file, ignoring it");
            }
            let presets_only = Args {
                paced: args.paced,
                ..Default::default()
            };
            for (name, config) in SimulationPresets::all() {
                run_scenario(name, config, &presets_only).await?;
                println!("{}", "-".repeat(50));
            }
        }
    }

    println!("\n{}", "All simulations complete!".bright_green().bold());
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_parse_scenario_and_options() {
        let args = Args::try_parse_from(["radio_sim", "scenario.toml", "--trace", "out.bin", "--paced=10"]).unwrap();
        assert_eq!(args.scenario, Some(PathBuf::from("scenario.toml")));
        assert_eq!(args.trace, Some(PathBuf::from("out.bin")));
        assert_eq!(args.paced, Some(10.0));
    }

    #[test]
    fn test_presets_when_no_scenario() {
        let args = Args::try_parse_from(["radio_sim"]).unwrap();
        assert!(args.scenario.is_none());
        assert!(args.paced.is_none());
    }

    #[test]
    fn test_bad_speed_rejected() {
        assert!(Args::try_parse_from(["radio_sim", "--paced", "fast"]).is_err());
    }
}
