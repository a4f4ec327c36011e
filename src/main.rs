//! DrishtiIO - target-side smart camera daemon
//!
//! ## Protocol Architecture
//!
//! - **TCP command port (49001)**: request/reply configuration and version traffic
//! - **TCP feed port (49000)**: one-way stream of captured frames
//!
//! Each port serves a single client at a time. A dropped client demotes the
//! endpoint back to listening; the control loop re-accepts without re-binding
//! the port.

use drishti_io::camera::create_camera;
use drishti_io::comm::CommServer;
use drishti_io::config::AppConfig;
use drishti_io::context::Context;
use drishti_io::control::ControlLoop;
use drishti_io::error::{Error, Result};
use drishti_io::version;
use std::env;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Parse config path from command line arguments.
///
/// Supports:
/// - `drishti-io <path>` (positional)
/// - `drishti-io --config <path>` (flag-based)
/// - `drishti-io -c <path>` (short flag)
///
/// Defaults to `/etc/drishti.toml` if not specified.
fn parse_config_path() -> String {
    let args: Vec<String> = env::args().collect();

    for i in 1..args.len() {
        if (args[i] == "--config" || args[i] == "-c") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }

    if args.len() > 1 && !args[1].starts_with('-') {
        return args[1].clone();
    }

    "/etc/drishti.toml".to_string()
}

fn main() -> Result<()> {
    let config_path = parse_config_path();
    let config = match AppConfig::from_file(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Cannot load config {}: {}", config_path, e);
            return Err(e);
        }
    };

    // RUST_LOG still overrides the configured level
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.logging.level.clone()),
    )
    .init();

    log::info!("DrishtiIO {} starting...", version::version_string());
    log::info!("Using config: {}", config_path);
    log::info!(
        "Camera: {} ({}x{}, {} us exposure)",
        config.camera.device_type,
        config.camera.width,
        config.camera.height,
        config.camera.exposure_us
    );

    let camera = create_camera(&config)?;

    // Bind failures are fatal; without the host link there is no degraded mode
    let comm = CommServer::bind(&config.network.cmd_address, &config.network.feed_address)?;
    log::info!("Command server listening on {}", config.network.cmd_address);
    log::info!("Feed server listening on {}", config.network.feed_address);

    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal");
        r.store(false, Ordering::Relaxed);
    })
    .map_err(|e| Error::Other(format!("Error setting Ctrl-C handler: {}", e)))?;

    let ctx = Context::new(config, Some(PathBuf::from(&config_path)), comm, camera);
    let mut control = ControlLoop::new(ctx);

    log::info!("DrishtiIO running. Press Ctrl-C to stop.");
    control.run(&running);

    log::info!("DrishtiIO stopped");
    Ok(())
}
