//! Contract with the external face extractor (detection + embedding).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("frame source unavailable: {0}")]
    Unavailable(String),
    #[error("extraction failed: {0}")]
    Failed(String),
    /// The source has no more frames; the recognition loop stops.
    #[error("frame source exhausted")]
    Exhausted,
}

/// Face bounding region in frame pixels. Carried through, never matched on.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// One detected face as reported by the extractor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub descriptor: Vec<f32>,
    #[serde(default)]
    pub region: Option<Region>,
    /// Detector confidence in [0, 1], when the extractor reports one.
    #[serde(default)]
    pub confidence: Option<f32>,
}

impl Observation {
    pub fn new(descriptor: Vec<f32>) -> Self {
        Self {
            descriptor,
            region: None,
            confidence: None,
        }
    }
}

/// Acquires the current frame and extracts zero or more face descriptors.
///
/// May take longer than the polling interval; the recognition loop never
/// calls it concurrently with itself.
#[async_trait]
pub trait DescriptorSource: Send {
    async fn extract(&mut self) -> Result<Vec<Observation>, ExtractError>;
}
