//! # FRUSTRA headless run
//!
//! Runs the instancing scene on the host device and logs the visible count.
//!
//! ```bash
//! frustra_headless --frames 600 --config frustra.toml
//! ```

use frustra::{init_logging, run_headless, DemoConfig, HeadlessOptions, LoggingConfig};
use std::path::PathBuf;
use tracing::{error, info};

fn main() {
    init_logging(LoggingConfig::default());

    let args: Vec<String> = std::env::args().collect();
    let mut config_path: Option<PathBuf> = None;
    let mut options = HeadlessOptions::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--frames" | "-n" => {
                if i + 1 < args.len() {
                    options.frames = args[i + 1].parse().unwrap_or(options.frames);
                    i += 1;
                }
            }
            "--log-every" => {
                if i + 1 < args.len() {
                    options.log_every = args[i + 1].parse().unwrap_or(options.log_every);
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Usage: frustra_headless [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --config <PATH>     TOML config file");
                println!("  -n, --frames <N>        Frames to run (default: 600)");
                println!("      --log-every <N>     Log interval in frames (default: 60, 0 = off)");
                println!("  -h, --help              Show this help");
                return;
            }
            other => error!("ignoring unknown argument {:?}", other),
        }
        i += 1;
    }

    let config = match DemoConfig::load_or_default(config_path.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("config: {}", e);
            std::process::exit(1);
        }
    };

    match run_headless(&config, &options) {
        Ok(report) => {
            info!(
                "submitted {} | dropped {} | dispatches {} | frozen frames {} | max in flight {}",
                report.frames_submitted,
                report.frames_dropped,
                report.stats.dispatches,
                report.stats.frames_frozen,
                report.max_outstanding
            );
            info!(
                "final frame: {} of {} instances visible",
                report.final_visible, report.stats.total_instances
            );
        }
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    }
}
