//! # FRUSTRA window demo
//!
//! ```bash
//! frustra [--config frustra.toml]
//! ```
//!
//! Without `--config` the built-in defaults are used.

use frustra::{app, init_logging, DemoConfig, LoggingConfig};
use std::path::PathBuf;
use tracing::{error, info};

fn main() {
    init_logging(LoggingConfig::default());

    let args: Vec<String> = std::env::args().collect();
    let mut config_path: Option<PathBuf> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Usage: frustra [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --config <PATH>    TOML config file");
                println!("  -h, --help             Show this help");
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

    info!(
        "FRUSTRA: {} instances, workgroup {}, {} frames in flight",
        config.scene.instance_count, config.culling.workgroup_size, config.culling.frames_in_flight
    );

    if let Err(e) = app::run(&config) {
        error!("{}", e);
        std::process::exit(1);
    }
}
