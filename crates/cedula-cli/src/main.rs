use anyhow::{Context, Result};
use cedula_imaging::RawImage;
use cedula_verify::{
    spawn_verifier, ImageMetrics, ServiceError, Side, StageOutcome, StageRecord, VerificationConfig,
    VerificationEngine,
};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "cedula", about = "Chilean ID card verification CLI")]
struct Cli {
    /// TOML config file (defaults apply when omitted; CEDULA_* variables override both)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Verify an ID card (front and back) against a selfie
    Verify {
        #[arg(long)]
        front: PathBuf,
        #[arg(long)]
        back: PathBuf,
        #[arg(long)]
        selfie: PathBuf,
        /// Print the full result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Measure one card image against the raster thresholds (no models needed)
    Inspect {
        image: PathBuf,
        #[arg(long, value_enum, default_value_t = CardSide::Front)]
        side: CardSide,
        /// Print the measurements as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the effective configuration
    Config,
}

#[derive(Clone, Copy, ValueEnum)]
enum CardSide {
    Front,
    Back,
}

impl From<CardSide> for Side {
    fn from(side: CardSide) -> Self {
        match side {
            CardSide::Front => Side::Front,
            CardSide::Back => Side::Back,
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = VerificationConfig::load(cli.config.as_deref())
        .context("failed to load configuration")?;
    tracing::debug!(path = ?cli.config, parallel = config.parallel, "configuration loaded");

    match cli.command {
        Commands::Verify {
            front,
            back,
            selfie,
            json,
        } => verify(config, &front, &back, &selfie, json).await,
        Commands::Inspect { image, side, json } => inspect(&config, &image, side.into(), json),
        Commands::Config => {
            print!("{}", config.to_toml_string()?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn verify(
    config: VerificationConfig,
    front: &Path,
    back: &Path,
    selfie: &Path,
    json: bool,
) -> Result<ExitCode> {
    let locale = config.locale;
    let engine = VerificationEngine::load(&config.models)
        .context("failed to load verification models")?;
    let handle = spawn_verifier(Arc::new(engine), config)?;

    let outcome = handle
        .verify(read_image(front)?, read_image(back)?, read_image(selfie)?)
        .await;

    let result = match outcome {
        Ok(result) => result,
        Err(ServiceError::Verification(err)) => {
            eprintln!("{}", err.user_message(locale));
            return Err(err.into());
        }
        Err(err) => return Err(err.into()),
    };

    let message = result.user_message(locale);
    if json {
        let report = serde_json::json!({
            "verified": result.verified(),
            "message": message,
            "result": result,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for record in result.stages() {
            print_record(record);
        }
        if let Some(distance) = result.match_distance() {
            println!("face distance: {distance:.4}");
        }
        println!("{message}");
    }

    Ok(if result.verified() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}

fn inspect(config: &VerificationConfig, image: &Path, side: Side, json: bool) -> Result<ExitCode> {
    let decoded = config
        .decoder()
        .decode(&read_image(image)?)
        .with_context(|| format!("failed to decode {}", image.display()))?;

    let metrics = ImageMetrics::measure(&decoded, side, config);
    let checks = metrics.checks(config);
    if json {
        let report = serde_json::json!({ "side": side, "metrics": metrics, "checks": checks });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{side} image {}x{}", metrics.width, metrics.height);
        for check in &checks {
            let status = if check.passed { "ok" } else { "FAIL" };
            println!("{:<12} {:<4} {:<24} {}", check.name, status, check.value, check.requirement);
        }
    }

    let passed = checks.iter().all(|c| c.passed);
    Ok(if passed { ExitCode::SUCCESS } else { ExitCode::from(1) })
}

fn print_record(record: &StageRecord) {
    match &record.outcome {
        StageOutcome::Passed => println!("{:<16} passed", record.stage),
        StageOutcome::Failed { reason, message } => {
            println!("{:<16} FAILED  {reason}", record.stage);
            println!("{:<16} {message}", "");
        }
    }
}

/// Read an image file, declaring its content type from the extension.
fn read_image(path: &Path) -> Result<RawImage> {
    let bytes = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    let content_type = match extension.as_deref() {
        Some("jpg" | "jpeg") => Some("image/jpeg"),
        Some("png") => Some("image/png"),
        _ => None,
    };
    Ok(RawImage::new(bytes, content_type))
}
