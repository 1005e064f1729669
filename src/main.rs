use std::path::PathBuf;
use std::process::exit;

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use log::info;

use imu_capture::{
    install_interrupt_handler, logging, AcquisitionMode, AggregatorOptions, CancelToken, Config,
    DatasetWriter, FrameParser, QualityAggregator, RestartPolicy, RunMode, SerialLink,
    Supervisor, SystemClock,
};

#[derive(Parser, Debug)]
#[command(name = "imu-capture", about = "Capture IMU telemetry and validate datasets")]
struct Args {
    /// TOML configuration file; defaults apply when omitted
    #[arg(long, short)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Record samples from the serial device until interrupted
    Collect {
        /// Activity label; without it data is flushed on the configured interval
        #[arg(long)]
        label: Option<String>,
        /// Start a new session after Ctrl+C instead of exiting
        #[arg(long)]
        resume: bool,
        /// Upper bound on resumed sessions (defaults to the config value)
        #[arg(long)]
        max_restarts: Option<u32>,
    },
    /// Check every dataset under a directory and write a quality report
    Validate {
        /// Dataset directory (defaults to the configured data directory)
        dir: Option<PathBuf>,
        /// Where to write the report (defaults to the configured report directory)
        #[arg(long)]
        report_dir: Option<PathBuf>,
    },
}

fn main() {
    logging::init_logging();
    match run() {
        Ok(code) => exit(code),
        Err(e) => {
            eprintln!("Error: {e:#}");
            exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => Config::default(),
    };

    match args.command {
        Command::Collect {
            label,
            resume,
            max_restarts,
        } => {
            let mode = match label.map(|l| l.trim().to_string()) {
                Some(label) if !label.is_empty() => AcquisitionMode::LabeledSession { label },
                _ => AcquisitionMode::IntervalUnlabeled,
            };
            collect(&config, mode, resume, max_restarts)?;
            Ok(0)
        }
        Command::Validate { dir, report_dir } => {
            if let Some(report_dir) = report_dir {
                config.validation.report_dir = report_dir;
            }
            let dir = dir.unwrap_or_else(|| config.acquisition.data_dir.clone());
            validate(&config, dir)
        }
    }
}

fn collect(
    config: &Config,
    mode: AcquisitionMode,
    resume: bool,
    max_restarts: Option<u32>,
) -> Result<()> {
    config.prepare(RunMode::Acquisition)?;

    let schema = config.schema.schema();
    let parser = FrameParser::new(
        schema.clone(),
        config.schema.sentinel.clone(),
        config.schema.delimiter,
    );
    let mut writer = DatasetWriter::new(config.acquisition.data_dir.clone(), schema);

    let cancel = CancelToken::new();
    install_interrupt_handler(cancel.clone())?;

    info!("Starting acquisition: {:?}", mode);
    let supervisor = Supervisor::new(
        parser,
        mode,
        SystemClock,
        cancel,
        config.acquisition.flush_interval(),
        config.acquisition.default_label.clone(),
    )
    .with_restart(RestartPolicy {
        resume,
        max_restarts: max_restarts.unwrap_or(config.acquisition.max_restarts),
        delay: config.acquisition.restart_delay(),
    });

    let report = supervisor.run(|| SerialLink::open_first(&config.serial), &mut writer)?;
    println!(
        "Activity ended: {} sessions, {} rows written",
        report.sessions.len(),
        report.rows_written()
    );
    if report.unpersisted > 0 {
        anyhow::bail!("{} samples could not be written", report.unpersisted);
    }
    Ok(())
}

fn validate(config: &Config, dir: PathBuf) -> Result<i32> {
    config.prepare(RunMode::Validation)?;

    let aggregator = QualityAggregator::new(AggregatorOptions::from(&config.validation));
    let report = aggregator
        .run(&dir)
        .with_context(|| format!("validating {}", dir.display()))?;

    let stem = format!("DATA_check_{}", Local::now().format("%Y-%m-%d_%H-%M-%S"));
    let written = report.write_to(&config.validation.report_dir, &stem)?;
    for path in &written {
        println!("Report written: {}", path.display());
    }
    println!("Summary: {}", report.summary());

    Ok(if report.has_errors() { 2 } else { 0 })
}
