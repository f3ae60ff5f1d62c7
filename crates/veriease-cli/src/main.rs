use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing_subscriber::EnvFilter;
use veriease_core::{EngineConfig, MatchPolicy, MatchReport, MatchVerdict};

mod input;
mod replay;

#[derive(Parser)]
#[command(name = "veriease", version, about = "Liveness and landmark face matching")]
struct Cli {
    /// TOML configuration file; `VERIEASE_*` variables override it.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compare a reference (document) observation against a live one.
    Compare {
        /// Reference observation JSON (`null` if no face was detected).
        #[arg(long)]
        reference: PathBuf,
        /// Live observation JSON (`null` if no face was detected).
        #[arg(long)]
        live: PathBuf,
        /// Override the configured match policy.
        #[arg(long, value_enum)]
        policy: Option<PolicyArg>,
    },
    /// Estimate whether an observation shows eyeglasses.
    Glasses {
        observation: PathBuf,
    },
    /// Replay recorded frames through the liveness tracker.
    Liveness {
        /// JSON array of `{"t": seconds, "face": observation | null}`.
        frames: PathBuf,
        /// Keep the clock running to this time after the last frame.
        #[arg(long)]
        until: Option<f64>,
    },
    /// Print the effective configuration as TOML.
    Config,
}

#[derive(Clone, Copy, ValueEnum)]
enum PolicyArg {
    RegionAverage,
    StrictPerAxis,
}

impl From<PolicyArg> for MatchPolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::RegionAverage => MatchPolicy::region_average(),
            PolicyArg::StrictPerAxis => MatchPolicy::strict_per_axis(),
        }
    }
}

#[derive(Serialize)]
struct CompareOutput {
    verdict: MatchVerdict,
    message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    report: Option<MatchReport>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Compare {
            reference,
            live,
            policy,
        } => {
            if let Some(policy) = policy {
                config.matcher.policy = policy.into();
            }
            let reference = input::load_observation(&reference)?;
            let live = input::load_observation(&live)?;

            let matcher = config.face_matcher();
            let verdict = matcher.verify(reference.as_ref(), live.as_ref());
            let report = match (&reference, &live) {
                (Some(r), Some(l)) => Some(matcher.evaluate(r, l)),
                _ => None,
            };
            tracing::info!(?verdict, policy = ?matcher.policy(), "compare complete");

            print_json(&CompareOutput {
                verdict,
                message: verdict.message(),
                report,
            })?;
        }
        Command::Glasses { observation } => {
            let face = input::load_face(&observation)?;
            let result = config.glasses_heuristic().detect(&face);
            print_json(&result)?;
        }
        Command::Liveness { frames, until } => {
            let contents = fs::read_to_string(&frames)
                .with_context(|| format!("failed to read {}", frames.display()))?;
            let recorded: Vec<replay::RecordedFrame> = serde_json::from_str(&contents)
                .with_context(|| format!("invalid frame list in {}", frames.display()))?;
            for (i, frame) in recorded.iter().enumerate() {
                if let Some(face) = &frame.face {
                    face.validate()
                        .with_context(|| format!("invalid observation in frame {i}"))?;
                }
            }

            let summary = replay::replay(config.liveness.clone(), &recorded, until)?;
            for event in &summary.events {
                println!("{}", serde_json::to_string(event)?);
            }
            tracing::info!(
                frames = summary.frames,
                detected_at = ?summary.detected_at,
                "replay complete"
            );
            println!(
                "{}",
                serde_json::to_string(&serde_json::json!({
                    "frames": summary.frames,
                    "detected_at": summary.detected_at,
                    "final": summary.final_status,
                }))?
            );
        }
        Command::Config => {
            print!("{}", config.to_toml_string()?);
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    let mut config = match path {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    config
        .apply_env()
        .context("invalid VERIEASE_* environment override")?;
    tracing::debug!(?config, "configuration loaded");
    Ok(config)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
