//! Continuous recognition loop.
//!
//! Polls a [`DescriptorSource`] at a fixed cadence, matches every observed
//! face against the current gallery snapshot and publishes the latest
//! [`Recognition`] on a watch channel. One extraction at a time: a slow
//! extraction delays its cycle and the missed ticks are skipped.

use crate::config::Config;
use crate::extractor::{DescriptorSource, ExtractError, Region};
use likeness_core::{EuclideanMatcher, Gallery, Label, MatchResult, Matcher};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Match for one face seen in a cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FaceMatch {
    pub region: Option<Region>,
    pub result: MatchResult,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", content = "faces", rename_all = "snake_case")]
pub enum Presence {
    /// No cycle has completed yet.
    Pending,
    /// Extraction found no faces.
    NobodyVisible,
    /// At least one face; each may be known or unknown.
    Faces(Vec<FaceMatch>),
}

/// Latest published recognition state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recognition {
    pub cycle: u64,
    pub gallery_generation: u64,
    pub presence: Presence,
}

impl Recognition {
    fn pending() -> Self {
        Self {
            cycle: 0,
            gallery_generation: 0,
            presence: Presence::Pending,
        }
    }

    /// Result for the first (primary) face, if any face is visible.
    pub fn primary(&self) -> Option<&MatchResult> {
        match &self.presence {
            Presence::Faces(faces) => faces.first().map(|f| &f.result),
            _ => None,
        }
    }

    /// The currently recognized identity, if the primary face is known.
    pub fn recognized(&self) -> Option<&Label> {
        self.primary().and_then(|r| r.label.as_ref())
    }
}

#[derive(Debug, Clone)]
pub struct LoopSettings {
    pub poll_interval: Duration,
    pub threshold: f32,
    pub min_detection_confidence: f32,
    pub hold_cycles: u32,
}

impl From<&Config> for LoopSettings {
    fn from(config: &Config) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            threshold: config.distance_threshold,
            min_detection_confidence: config.min_detection_confidence,
            hold_cycles: config.hold_cycles,
        }
    }
}

/// Why the loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    Cancelled,
    Exhausted,
    /// The loop task panicked or was aborted.
    Aborted,
}

pub struct RecognitionHandle {
    results: watch::Receiver<Recognition>,
    cancel: CancellationToken,
    task: JoinHandle<LoopExit>,
}

impl RecognitionHandle {
    pub fn results(&self) -> watch::Receiver<Recognition> {
        self.results.clone()
    }

    pub fn latest(&self) -> Recognition {
        self.results.borrow().clone()
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancel and wait for the loop to wind down.
    pub async fn stop(self) -> LoopExit {
        self.cancel.cancel();
        self.join().await
    }

    /// Wait for the loop to end on its own.
    pub async fn join(self) -> LoopExit {
        self.task.await.unwrap_or(LoopExit::Aborted)
    }
}

/// Spawn the loop on the current tokio runtime.
pub fn spawn_recognition<S>(
    source: S,
    gallery: watch::Receiver<Arc<Gallery>>,
    settings: LoopSettings,
    cancel: CancellationToken,
) -> RecognitionHandle
where
    S: DescriptorSource + 'static,
{
    let (tx, rx) = watch::channel(Recognition::pending());
    let task = tokio::spawn(run_loop(source, gallery, settings, cancel.clone(), tx));
    RecognitionHandle {
        results: rx,
        cancel,
        task,
    }
}

async fn run_loop<S: DescriptorSource>(
    mut source: S,
    gallery: watch::Receiver<Arc<Gallery>>,
    settings: LoopSettings,
    cancel: CancellationToken,
    tx: watch::Sender<Recognition>,
) -> LoopExit {
    info!(
        interval_ms = settings.poll_interval.as_millis() as u64,
        threshold = settings.threshold,
        "recognition loop started"
    );

    let mut interval = time::interval(settings.poll_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let matcher = EuclideanMatcher;
    let mut cycle = 0u64;
    let mut empty_streak = 0u32;
    let mut held: Option<Vec<FaceMatch>> = None;

    let exit = loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break LoopExit::Cancelled,
            _ = interval.tick() => {}
        }
        cycle += 1;

        // One consistent gallery for the whole cycle.
        let snapshot = gallery.borrow().clone();

        let mut extraction = source.extract();
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = &mut extraction => Some(result),
        };
        let Some(result) = outcome else {
            // Let the in-flight call finish; its result is never applied.
            let _ = extraction.await;
            debug!(cycle, "discarded extraction that completed after cancellation");
            break LoopExit::Cancelled;
        };

        let observations = match result {
            Ok(observations) => observations,
            Err(ExtractError::Exhausted) => break LoopExit::Exhausted,
            Err(e) => {
                warn!(cycle, error = %e, "extraction failed; skipping cycle");
                continue;
            }
        };

        let seen = observations.len();
        let mut failed = 0usize;
        let mut faces = Vec::with_capacity(seen);
        for obs in observations {
            if obs
                .confidence
                .is_some_and(|c| c < settings.min_detection_confidence)
            {
                continue;
            }
            match matcher.compare(&snapshot, &obs.descriptor, settings.threshold) {
                Ok(result) => faces.push(FaceMatch {
                    region: obs.region,
                    result,
                }),
                Err(e) => {
                    failed += 1;
                    warn!(cycle, error = %e, "skipping observation");
                }
            }
        }

        if faces.is_empty() && failed > 0 {
            continue;
        }

        let presence = if faces.is_empty() {
            empty_streak = empty_streak.saturating_add(1);
            if empty_streak > settings.hold_cycles {
                held = None;
            }
            match &held {
                Some(last) => Presence::Faces(last.clone()),
                None => Presence::NobodyVisible,
            }
        } else {
            empty_streak = 0;
            if settings.hold_cycles > 0 {
                held = Some(faces.clone());
            }
            Presence::Faces(faces)
        };

        let recognized = match &presence {
            Presence::Faces(f) => f.iter().filter(|m| m.result.matched).count(),
            _ => 0,
        };
        debug!(cycle, seen, recognized, "cycle complete");

        tx.send_replace(Recognition {
            cycle,
            gallery_generation: snapshot.generation(),
            presence,
        });
    };

    info!(cycles = cycle, exit = ?exit, "recognition loop stopped");
    exit
}
