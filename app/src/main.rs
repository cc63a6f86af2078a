//! Pacer auto-start daemon
//!
//! Watches the accelerometer and offers to start a run when the user has
//! clearly started running.

use anyhow::{Context, Result};
use pacer_hal::{DesktopNotifier, I2cAccelerometerPlatform, ScriptedPlatform, TerminalPrompt};
use std::path::Path;
use std::time::Duration;

mod config;
mod runtime;

use config::{AppConfig, PlatformKind};

/// How long an unanswered terminal prompt stays open
const PROMPT_TIMEOUT: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    tracing::info!("Pacer auto-start daemon v{}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::load()?;
    tracing::info!("Configuration loaded from {:?}", config.config_path);
    config.validate()?;

    if !config.auto_start {
        tracing::info!("Auto-start is disabled in the configuration, exiting");
        return Ok(());
    }

    print_system_status(&config);

    let notifier = Box::new(DesktopNotifier::default());
    let prompt = Box::new(TerminalPrompt::new().with_timeout(PROMPT_TIMEOUT));
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        tracing::info!("Shutdown signal received");
    };

    tracing::info!("Watching for movement, press Ctrl+C to stop");

    let started = match config.platform {
        PlatformKind::I2c => {
            let platform = I2cAccelerometerPlatform::new(&config.i2c_bus, config.accelerometer_address);
            runtime::run_service(&config, platform, notifier, prompt, shutdown).await?
        }
        PlatformKind::Scripted => {
            let trace = config.trace_file.as_deref().context("scripted platform needs trace_file")?;
            let platform = ScriptedPlatform::from_trace_file(Path::new(trace))
                .with_context(|| format!("Failed to load trace {}", trace))?;
            tracing::info!("Replaying {} readings from {}", platform.len(), trace);
            runtime::run_service(&config, platform, notifier, prompt, shutdown).await?
        }
    };

    if !started {
        anyhow::bail!("auto-start monitoring could not start");
    }

    tracing::info!("Pacer shutdown complete");
    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,pacer=debug,pacer_hal=debug,pacer_sensors=debug"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false))
        .init();
}

fn print_system_status(config: &AppConfig) {
    use sysinfo::System;

    tracing::info!("Host: {} ({} {})",
        System::host_name().unwrap_or_default(),
        System::name().unwrap_or_default(),
        System::kernel_version().unwrap_or_default());
    tracing::info!("Platform: {:?}, sampling every {} ms, window {}",
        config.platform, config.sampling_interval_ms, config.smoothing_window);
    tracing::info!("Trigger above {:.2} intensity for {} ms, cooldown {} ms",
        config.trigger_threshold, config.debounce_ms, config.cooldown_ms);
    tracing::info!("Notifications: {}", if config.notifications { "on" } else { "off" });
}
