//! vest-detect - run one detectVest request against the bundled model
//!
//! This tool:
//! 1. Loads configuration (`--config` or `VEST_CONFIG`, then `VEST_*` overrides)
//! 2. Opens the detector (model + labels from the asset directory)
//! 3. Classifies one photo and prints the detectVest JSON payload

use std::io::{IsTerminal, Read};
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use clap::Parser;
use serde_json::json;

use vest_detect::{DetectRequest, LoadStrategy, VestConfig, VestDetector};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Image file (JPEG/PNG). Use `-` to read from stdin.
    #[arg(long, conflicts_with = "base64")]
    image: Option<PathBuf>,
    /// Text file holding a base64 image, optionally with a data-URI header.
    #[arg(long)]
    base64: Option<PathBuf>,
    /// Decision threshold in [0, 1]; anything else falls back to the default.
    #[arg(long)]
    threshold: Option<f64>,
    /// Log the pipeline steps of this request at info level.
    #[arg(long)]
    debug: bool,
    /// JSON config file (overrides VEST_CONFIG).
    #[arg(long, env = "VEST_CONFIG")]
    config: Option<PathBuf>,
    /// Asset directory holding the model and label files.
    #[arg(long)]
    assets_dir: Option<PathBuf>,
    /// Model load strategy (mapped|cached_copy|buffered).
    #[arg(long, value_name = "STRATEGY")]
    strategy: Option<LoadStrategy>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = VestConfig::load_from(args.config.as_deref())?;
    if let Some(dir) = args.assets_dir {
        config.model.assets_dir = dir;
    }
    if let Some(strategy) = args.strategy {
        config.model.strategy = strategy;
    }

    let payload = read_payload(args.image, args.base64)?;
    let mut request = DetectRequest::new(payload).with_debug(args.debug);
    if let Some(threshold) = args.threshold {
        request = request.with_threshold(threshold);
    }

    let detector = VestDetector::new(config);
    if let Err(err) = detector.open() {
        // Requests still go through so the caller sees the contract error.
        log::warn!("continuing with unready detector: {}", err);
    }

    let outcome = detector.detect_vest(request).wait();
    detector.close();

    let pretty = std::io::stdout().is_terminal();
    let body = match &outcome {
        Ok(result) => serde_json::to_value(result)?,
        Err(err) => json!({ "error": err.to_string() }),
    };
    let text = if pretty {
        serde_json::to_string_pretty(&body)?
    } else {
        serde_json::to_string(&body)?
    };
    println!("{}", text);

    outcome.map(|_| ()).map_err(|err| anyhow!(err))
}

fn read_payload(image: Option<PathBuf>, base64: Option<PathBuf>) -> Result<String> {
    match (image, base64) {
        (Some(path), None) => {
            let bytes = if path.as_os_str() == "-" {
                let mut buf = Vec::new();
                std::io::stdin()
                    .read_to_end(&mut buf)
                    .context("failed to read image from stdin")?;
                buf
            } else {
                std::fs::read(&path)
                    .with_context(|| format!("failed to read image {}", path.display()))?
            };
            Ok(STANDARD.encode(bytes))
        }
        (None, Some(path)) => std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read base64 payload {}", path.display())),
        _ => Err(anyhow!("exactly one of --image or --base64 is required")),
    }
}
