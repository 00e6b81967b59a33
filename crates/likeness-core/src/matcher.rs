//! Nearest-neighbor matching of a probe descriptor against a gallery.

use crate::gallery::Gallery;
use crate::types::{euclidean_distance, Label, DESCRIPTOR_DIM};
use serde::Serialize;
use thiserror::Error;

/// Default maximum Euclidean distance for a known match.
///
/// Typical range: 0.4 (strict) to 0.8 (permissive).
pub const DEFAULT_DISTANCE_THRESHOLD: f32 = 0.6;

/// Distance at which the reliability heuristic reaches 0%.
const RELIABILITY_ZERO_DISTANCE: f32 = 0.8;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MatchError {
    #[error("descriptor dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("probe component {index} is not finite")]
    NonFinite { index: usize },
}

/// Result of matching a probe against a gallery.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    pub matched: bool,
    /// Label of the nearest entry, only when `matched`.
    pub label: Option<Label>,
    /// Euclidean distance to the nearest entry; `None` for an empty gallery.
    pub distance: Option<f32>,
}

impl MatchResult {
    pub fn unknown(distance: Option<f32>) -> Self {
        Self {
            matched: false,
            label: None,
            distance,
        }
    }

    /// Display confidence in percent: 100 at distance 0, 0 at 0.8 and beyond.
    pub fn reliability(&self) -> f32 {
        match self.distance {
            Some(d) => ((RELIABILITY_ZERO_DISTANCE - d) / RELIABILITY_ZERO_DISTANCE * 100.0).max(0.0),
            None => 0.0,
        }
    }
}

/// Strategy for comparing a probe against a gallery.
pub trait Matcher {
    fn compare(
        &self,
        gallery: &Gallery,
        probe: &[f32],
        threshold: f32,
    ) -> Result<MatchResult, MatchError>;
}

/// Euclidean nearest-neighbor matcher.
///
/// Traverses the whole gallery; on equal distances the earliest entry wins.
pub struct EuclideanMatcher;

impl Matcher for EuclideanMatcher {
    fn compare(
        &self,
        gallery: &Gallery,
        probe: &[f32],
        threshold: f32,
    ) -> Result<MatchResult, MatchError> {
        check_dimension(probe.len())?;
        if let Some(index) = probe.iter().position(|v| !v.is_finite()) {
            return Err(MatchError::NonFinite { index });
        }

        let mut best: Option<(usize, f64)> = None;

        for (i, entry) in gallery.entries().iter().enumerate() {
            let values = entry.descriptor.values();
            check_dimension(values.len())?;
            let distance = euclidean_distance(values, probe);
            if best.map_or(true, |(_, d)| distance < d) {
                best = Some((i, distance));
            }
        }

        Ok(match best {
            Some((idx, distance)) if distance <= f64::from(threshold) => MatchResult {
                matched: true,
                label: Some(gallery.entries()[idx].label.clone()),
                distance: Some(distance as f32),
            },
            // May saturate to infinity for extreme but finite inputs.
            Some((_, distance)) => MatchResult::unknown(Some(distance as f32)),
            None => MatchResult::unknown(None),
        })
    }
}

fn check_dimension(actual: usize) -> Result<(), MatchError> {
    if actual != DESCRIPTOR_DIM {
        return Err(MatchError::DimensionMismatch {
            expected: DESCRIPTOR_DIM,
            actual,
        });
    }
    Ok(())
}
