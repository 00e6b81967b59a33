use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use likeness_core::{Capture, EnrollmentError};
use likeness_engine::{Config, DescriptorSource, ExtractError, FaceService, Observation};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "likeness", about = "Face descriptor gallery and recognition CLI")]
struct Cli {
    /// Enrollment store document (overrides LIKENESS_STORE_PATH)
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// Maximum distance for a known match (overrides LIKENESS_DISTANCE_THRESHOLD)
    #[arg(long, global = true)]
    threshold: Option<f32>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List enrolled identities
    List,
    /// Show configuration and store status
    Status,
    /// Match one descriptor (JSON array of 128 numbers) against the gallery
    Match {
        /// File holding the probe descriptor
        #[arg(long)]
        probe: PathBuf,
    },
    /// Enroll captures for an identity
    Enroll {
        /// Identity label (e.g., "Ana")
        #[arg(short, long)]
        label: String,
        /// JSON array with one entry per capture: a descriptor, or [] when no face was found
        #[arg(long)]
        captures: PathBuf,
        /// Record the captures as coming from this uploaded photo instead of the camera
        #[arg(long)]
        upload: Option<String>,
    },
    /// Remove an enrolled identity
    Remove {
        /// Label to remove
        label: String,
    },
    /// Write the interchange document
    Export {
        /// Output file (stdout when omitted)
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Run the recognition loop over recorded extraction output
    Replay {
        /// JSON lines; each line is an array of observations for one frame
        #[arg(long)]
        frames: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = Config::from_env().context("invalid configuration")?;
    if let Some(store) = cli.store {
        config.store_path = store;
    }
    if let Some(threshold) = cli.threshold {
        config.distance_threshold = threshold;
    }
    config.validate().context("invalid configuration")?;

    let service = FaceService::open(&config).await;

    match cli.command {
        Commands::List => {
            let labels = service.labels().await;
            if labels.is_empty() {
                println!("No identities enrolled");
            }
            for summary in labels {
                println!("{}\t{} descriptor(s)", summary.label, summary.descriptors);
            }
        }
        Commands::Status => {
            let store = service.store().await;
            let status = serde_json::json!({
                "version": env!("CARGO_PKG_VERSION"),
                "store_path": config.store_path.display().to_string(),
                "identities": store.len(),
                "descriptors": store.descriptor_count(),
                "distance_threshold": config.distance_threshold,
                "poll_interval_ms": config.poll_interval_ms,
                "min_detection_confidence": config.min_detection_confidence,
                "hold_cycles": config.hold_cycles,
            });
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Commands::Match { probe } => {
            let text = tokio::fs::read_to_string(&probe)
                .await
                .with_context(|| format!("reading {}", probe.display()))?;
            let values: Vec<f32> =
                serde_json::from_str(&text).context("probe must be a JSON array of numbers")?;
            let result = service.match_descriptor(&values)?;
            match (&result.label, result.distance) {
                (Some(label), Some(d)) => {
                    println!("{label}\tdistance {d:.4}\treliability {:.1}%", result.reliability())
                }
                (None, Some(d)) => println!("unknown\tdistance {d:.4}"),
                _ => println!("unknown\t(no identities enrolled)"),
            }
        }
        Commands::Enroll {
            label,
            captures,
            upload,
        } => {
            let text = tokio::fs::read_to_string(&captures)
                .await
                .with_context(|| format!("reading {}", captures.display()))?;
            let entries: Vec<Vec<f32>> = serde_json::from_str(&text)
                .context("captures must be a JSON array of descriptor arrays")?;

            let mut session = service.start_enrollment(&label)?;
            for (i, entry) in entries.into_iter().enumerate() {
                let detections = if entry.is_empty() { vec![] } else { vec![entry] };
                let capture = match &upload {
                    Some(name) => Capture::upload(name.clone(), detections),
                    None => Capture::camera(detections),
                };
                match session.add_capture(capture) {
                    Ok(n) => tracing::debug!(capture = i, pending = n, "capture accepted"),
                    Err(EnrollmentError::NoFaceDetected) => {
                        eprintln!("capture {i}: no face detected, skipped")
                    }
                    Err(e) => bail!("capture {i}: {e}"),
                }
            }

            let summary = service.commit_enrollment(&mut session).await?;
            println!(
                "Enrolled {}: {} descriptor(s) stored",
                summary.label, summary.descriptors
            );
        }
        Commands::Remove { label } => {
            if service.remove_label(&label).await? {
                println!("Removed {label}");
            } else {
                bail!("no identity named {label:?}");
            }
        }
        Commands::Export { out } => {
            let text = service.store().await.to_json_pretty()?;
            match out {
                Some(path) => {
                    tokio::fs::write(&path, text)
                        .await
                        .with_context(|| format!("writing {}", path.display()))?;
                    println!("Exported to {}", path.display());
                }
                None => println!("{text}"),
            }
        }
        Commands::Replay { frames } => {
            let source = ReplaySource::open(&frames).await?;
            replay(&service, source).await?;
        }
    }

    Ok(())
}

/// Recorded extraction output, one frame per line.
struct ReplaySource {
    lines: VecDeque<String>,
}

impl ReplaySource {
    async fn open(path: &Path) -> Result<Self> {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        let lines = text
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(str::to_owned)
            .collect();
        Ok(Self { lines })
    }
}

#[async_trait]
impl DescriptorSource for ReplaySource {
    async fn extract(&mut self) -> Result<Vec<Observation>, ExtractError> {
        let line = self.lines.pop_front().ok_or(ExtractError::Exhausted)?;
        serde_json::from_str(&line).map_err(|e| ExtractError::Failed(format!("bad frame: {e}")))
    }
}

async fn replay(service: &FaceService, source: ReplaySource) -> Result<()> {
    let cancel = CancellationToken::new();
    let handle = service.spawn_recognition(source, cancel.clone());
    let mut results = handle.results();

    loop {
        tokio::select! {
            changed = results.changed() => {
                if changed.is_err() {
                    break;
                }
                let recognition = results.borrow_and_update().clone();
                println!("{}", serde_json::to_string(&recognition)?);
            }
            _ = tokio::signal::ctrl_c() => {
                cancel.cancel();
                break;
            }
        }
    }

    let exit = handle.join().await;
    tracing::info!(exit = ?exit, "replay finished");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use likeness_core::DESCRIPTOR_DIM;

    #[tokio::test]
    async fn test_replay_source_reads_frames_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frames.jsonl");
        let face = serde_json::json!([{ "descriptor": vec![0.0; DESCRIPTOR_DIM], "confidence": 0.99 }]);
        std::fs::write(&path, format!("{face}\n\n[]\nnot json\n")).unwrap();

        let mut source = ReplaySource::open(&path).await.unwrap();
        let first = source.extract().await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].confidence, Some(0.99));
        assert!(source.extract().await.unwrap().is_empty());
        assert!(matches!(source.extract().await, Err(ExtractError::Failed(_))));
        assert!(matches!(source.extract().await, Err(ExtractError::Exhausted)));
    }
}
