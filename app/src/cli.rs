//! Pacer CLI Tool
//!
//! Command-line interface for inspecting runs, replaying motion traces and
//! checking the accelerometer.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use pacer_hal::{
    ConfirmationPrompt, DesktopNotifier, LoggingNotifier, MotionPlatform, Notifier, PromptResponse, ScriptedPlatform,
    ScriptedPrompt, TerminalPrompt, ADXL345,
};
use pacer_sensors::recording::{RunJournal, RunStatus};
use pacer_sensors::service::{completed_body, COMPLETED_TITLE};
use std::path::{Path, PathBuf};
use std::time::Duration;

mod config;
mod runtime;

use config::AppConfig;

#[derive(Parser)]
#[command(name = "pacer-cli")]
#[command(author = "Pacer Team")]
#[command(version)]
#[command(about = "Pacer run auto-start CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Data directory (overrides the configuration)
    #[arg(short, long, global = true)]
    data_dir: Option<PathBuf>,

    /// Configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log filter, e.g. "debug" or "pacer_sensors=trace"
    #[arg(long, global = true, default_value = "warn,pacer_sensors=info")]
    log: String,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

/// How `simulate` answers the confirmation prompt
#[derive(Clone, Copy, ValueEnum)]
enum Answer {
    Accept,
    Decline,
    Ask,
}

#[derive(Subcommand)]
enum Commands {
    /// List recorded runs, newest first
    Runs {
        /// Show detailed information
        #[arg(short, long)]
        verbose: bool,

        /// Output format
        #[arg(short, long, value_enum, default_value = "table")]
        format: OutputFormat,
    },

    /// Complete the active run
    Stop {
        /// Run ID (defaults to the active run)
        run_id: Option<String>,
    },

    /// Replay a recorded accelerometer trace through the auto-start logic
    Simulate {
        /// JSON-lines trace of {"x","y","z"} readings
        trace: PathBuf,

        /// Replay interval in milliseconds (defaults to the configured sampling interval)
        #[arg(short, long)]
        interval_ms: Option<u64>,

        /// Answer given to the confirmation prompt
        #[arg(short, long, value_enum, default_value = "accept")]
        answer: Answer,
    },

    /// Check the I2C accelerometer and print a few readings
    Probe {
        /// I2C bus device node
        #[arg(short, long)]
        bus: Option<String>,

        /// 7-bit device address
        #[arg(short, long, value_parser = parse_address)]
        address: Option<u8>,

        /// Number of readings to print
        #[arg(short = 'n', long, default_value_t = 5)]
        samples: usize,
    },

    /// Generate sample configuration
    Config {
        /// Output path
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Emit the effective configuration instead of the annotated example
        #[arg(long)]
        current: bool,
    },

    /// System information
    Info,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(&cli.log))
        .with_target(false)
        .init();

    let mut config = match &cli.config {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load()?,
    };
    if let Some(dir) = &cli.data_dir {
        config.data_directory = dir.to_string_lossy().into_owned();
    }

    match cli.command {
        Commands::Runs { verbose, format } => {
            list_runs(&config, verbose, format)?;
        }

        Commands::Stop { run_id } => {
            stop_run(&config, run_id).await?;
        }

        Commands::Simulate { trace, interval_ms, answer } => {
            if let Some(ms) = interval_ms {
                config.sampling_interval_ms = ms;
            }
            config.validate()?;
            simulate(&config, &trace, answer).await?;
        }

        Commands::Probe { bus, address, samples } => {
            let bus = bus.unwrap_or_else(|| config.i2c_bus.clone());
            let address = address.unwrap_or(config.accelerometer_address);
            probe(&bus, address, samples).await?;
        }

        Commands::Config { output, current } => {
            generate_config(&config, output, current)?;
        }

        Commands::Info => {
            show_info(&config)?;
        }
    }

    Ok(())
}

fn parse_address(s: &str) -> std::result::Result<u8, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => s.parse::<u8>(),
    };
    parsed.map_err(|e| format!("invalid I2C address '{}': {}", s, e))
}

fn journal(config: &AppConfig) -> Result<RunJournal> {
    Ok(RunJournal::new(Path::new(&config.data_directory))?)
}

fn list_runs(config: &AppConfig, verbose: bool, format: OutputFormat) -> Result<()> {
    let runs = journal(config)?.list_runs()?;

    if let OutputFormat::Json = format {
        println!("{}", serde_json::to_string_pretty(&runs)?);
        return Ok(());
    }

    if runs.is_empty() {
        println!("No runs found.");
        return Ok(());
    }

    println!("╭────────────────────┬─────────────────────┬───────────┬──────────┬──────────╮");
    println!("│ Run ID             │ Started             │ Status    │ Distance │ Duration │");
    println!("├────────────────────┼─────────────────────┼───────────┼──────────┼──────────┤");

    for run in &runs {
        println!("│ {:18} │ {:19} │ {:9} │ {:>5.2} km │ {:>8} │",
            truncate(&run.id, 18),
            format_time(run.start_time),
            status_label(run.status),
            run.distance,
            format_duration(run.duration));
    }

    println!("╰────────────────────┴─────────────────────┴───────────┴──────────┴──────────╯");

    if verbose {
        for run in &runs {
            println!("\n{}", "─".repeat(60));
            println!("Run: {}", run.id);
            println!("  User: {}", run.user_id);
            println!("  Start: {}", format_time(run.start_time));
            match run.end_time {
                Some(end) => println!("  End: {}", format_time(end)),
                None => println!("  End: (in progress)"),
            }
            println!("  Pace: {:.2} min/km", run.average_pace);
            println!("  Max speed: {:.1} km/h", run.max_speed);
            println!("  Calories: {}", run.calories);
            println!("  Route points: {}", run.route.len());
        }
    }

    Ok(())
}

async fn stop_run(config: &AppConfig, run_id: Option<String>) -> Result<()> {
    let mut journal = journal(config)?;

    let id = match run_id {
        Some(id) => id,
        None => match journal.active_run()? {
            Some(run) => run.id,
            None => {
                println!("No active run.");
                return Ok(());
            }
        },
    };

    let run = journal.complete_run(&id)?;
    println!("Run {} completed ({}).", run.id, format_duration(run.duration));

    if config.notifications {
        if let Err(e) = DesktopNotifier::default().notify(COMPLETED_TITLE, &completed_body(&run)).await {
            tracing::warn!("Completion notification failed: {}", e);
        }
    }

    Ok(())
}

async fn simulate(config: &AppConfig, trace: &Path, answer: Answer) -> Result<()> {
    let platform = ScriptedPlatform::from_trace_file(trace)
        .with_context(|| format!("Failed to load trace {:?}", trace))?;
    println!("Replaying {} readings every {} ms...", platform.len(), config.sampling_interval_ms);

    let before = journal(config)?.list_runs()?.len();

    let notifier: Box<dyn Notifier> = Box::new(LoggingNotifier);
    let prompt: Box<dyn ConfirmationPrompt> = match answer {
        Answer::Accept => Box::new(ScriptedPrompt::always(PromptResponse::Accepted)),
        Answer::Decline => Box::new(ScriptedPrompt::always(PromptResponse::Declined)),
        Answer::Ask => Box::new(TerminalPrompt::new()),
    };

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    if !runtime::run_service(config, platform, notifier, prompt, shutdown).await? {
        anyhow::bail!("scripted sensor refused to start");
    }

    let runs = journal(config)?.list_runs()?;
    let started = runs.len().saturating_sub(before);
    println!("Simulation finished: {} run(s) started.", started);
    for run in runs.iter().take(started) {
        println!("  {} at {}", run.id, format_time(run.start_time));
    }

    Ok(())
}

async fn probe(bus: &str, address: u8, samples: usize) -> Result<()> {
    println!("Probing 0x{:02X} on {}...", address, bus);

    let platform = pacer_hal::I2cAccelerometerPlatform::new(bus, address);
    if !platform.is_available().await {
        println!("  No ADXL345 answered (expected device ID 0x{:02X}).", ADXL345::DEVICE_ID);
        return Ok(());
    }
    println!("  ADXL345 found");

    let mut sensor = ADXL345::new(bus, address)?;
    sensor.init()?;

    for _ in 0..samples {
        let reading = sensor.read_xyz()?;
        println!("  x={:+.3} g  y={:+.3} g  z={:+.3} g  |a|={:.3} g",
            reading.x, reading.y, reading.z, reading.magnitude());
        tokio::time::sleep(Duration::from_millis(200)).await;
    }

    sensor.standby()?;
    Ok(())
}

fn generate_config(config: &AppConfig, output: Option<PathBuf>, current: bool) -> Result<()> {
    match (output, current) {
        (Some(path), true) => {
            config.save(&path)?;
            println!("Configuration written to: {:?}", path);
        }
        (Some(path), false) => {
            std::fs::write(&path, AppConfig::example())?;
            println!("Configuration written to: {:?}", path);
        }
        (None, true) => println!("{}", toml::to_string_pretty(config)?),
        (None, false) => println!("{}", AppConfig::example()),
    }

    Ok(())
}

fn show_info(config: &AppConfig) -> Result<()> {
    use sysinfo::System;

    let mut sys = System::new_all();
    sys.refresh_all();

    println!("╭──────────────────────────────────────────────────────────────╮");
    println!("│                  Pacer System Information                    │");
    println!("╰──────────────────────────────────────────────────────────────╯\n");

    println!("System:");
    println!("  Hostname: {}", System::host_name().unwrap_or_default());
    println!("  OS: {} {}",
        System::name().unwrap_or_default(),
        System::os_version().unwrap_or_default());
    println!("  Kernel: {}", System::kernel_version().unwrap_or_default());
    println!("  CPU: {}", sys.cpus().first().map(|c| c.brand()).unwrap_or("Unknown"));
    println!("  Memory: {} MB total, {} MB used",
        sys.total_memory() / 1024 / 1024,
        sys.used_memory() / 1024 / 1024);

    println!("\nPacer:");
    println!("  Version: {}", env!("CARGO_PKG_VERSION"));
    println!("  Config: {}", if config.config_path.as_os_str().is_empty() {
        "(defaults)".to_string()
    } else {
        config.config_path.display().to_string()
    });
    println!("  Data directory: {}", config.data_directory);
    println!("  Auto-start: {}", if config.auto_start { "enabled" } else { "disabled" });
    println!("  Platform: {:?}", config.platform);

    println!("\nHardware Availability:");
    println!("  I2C bus {}: {}", config.i2c_bus,
        if Path::new(&config.i2c_bus).exists() { "✓" } else { "✗" });

    Ok(())
}

fn status_label(status: RunStatus) -> &'static str {
    match status {
        RunStatus::Active => "active",
        RunStatus::Paused => "paused",
        RunStatus::Completed => "completed",
    }
}

fn format_time(ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(ms)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "?".to_string())
}

fn format_duration(seconds: u64) -> String {
    format!("{}:{:02}:{:02}", seconds / 3600, (seconds / 60) % 60, seconds % 60)
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        format!("{}...", s.chars().take(max - 3).collect::<String>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_address() {
        assert_eq!(parse_address("0x53"), Ok(0x53));
        assert_eq!(parse_address("0X1D"), Ok(0x1D));
        assert_eq!(parse_address("83"), Ok(83));
        assert!(parse_address("0xZZ").is_err());
        assert!(parse_address("300").is_err());
    }

    #[test]
    fn test_formatting_helpers() {
        assert_eq!(format_duration(3725), "1:02:05");
        assert_eq!(truncate("run_1700000000000", 10), "run_170...");
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(format_time(0), "1970-01-01 00:00:00");
    }

    #[test]
    fn test_cli_parses_simulate() {
        let cli = Cli::try_parse_from(["pacer-cli", "simulate", "trace.jsonl", "-i", "10", "--answer", "decline"]).unwrap();
        match cli.command {
            Commands::Simulate { trace, interval_ms, answer } => {
                assert_eq!(trace, PathBuf::from("trace.jsonl"));
                assert_eq!(interval_ms, Some(10));
                assert!(matches!(answer, Answer::Decline));
            }
            _ => panic!("expected simulate"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulated_trace_starts_one_run() {
        let dir = std::env::temp_dir().join("pacer_cli_simulate_test");
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();

        let trace = dir.join("trace.jsonl");
        let lines: Vec<String> = (0..6).map(|_| r#"{"x":0.0,"y":0.0,"z":1.3}"#.to_string()).collect();
        std::fs::write(&trace, lines.join("\n")).unwrap();

        let config = AppConfig {
            data_directory: dir.join("data").to_string_lossy().into_owned(),
            notifications: false,
            ..Default::default()
        };

        simulate(&config, &trace, Answer::Accept).await.unwrap();

        let runs = RunJournal::new(Path::new(&config.data_directory)).unwrap().list_runs().unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, RunStatus::Active);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_status_labels_match_serde() {
        for status in [RunStatus::Active, RunStatus::Paused, RunStatus::Completed] {
            let json = serde_json::to_value(status).unwrap();
            assert_eq!(json, status_label(status));
        }
    }
}
