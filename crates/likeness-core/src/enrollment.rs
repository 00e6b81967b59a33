//! Enrollment session — accumulate captures for one label, then commit atomically.
//!
//! ```text
//! Empty ──start──▶ Accumulating ──commit──▶ Committed
//!                       │
//!                       └──────cancel─────▶ Cancelled
//! ```
//!
//! Committed and Cancelled are terminal until the next `start`.

use crate::store::EnrollmentStore;
use crate::types::{Descriptor, DescriptorError, Label};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    Empty,
    Accumulating,
    Committed,
    Cancelled,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Empty => "empty",
            SessionState::Accumulating => "accumulating",
            SessionState::Committed => "committed",
            SessionState::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EnrollmentError {
    #[error("label must not be empty or whitespace-only")]
    InvalidLabel,
    #[error("{operation} is not valid while the session is {state}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },
    #[error("no face detected in capture")]
    NoFaceDetected,
    #[error("nothing captured; add at least one capture before committing")]
    EmptyCapture,
    #[error("invalid descriptor: {0}")]
    Descriptor(#[from] DescriptorError),
}

/// Where a capture came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum CaptureSource {
    Camera,
    Upload { name: String },
}

/// Extraction output for one camera frame or uploaded photo.
#[derive(Debug, Clone)]
pub struct Capture {
    /// One vector per detected face, best detection first.
    pub detections: Vec<Vec<f32>>,
    pub source: CaptureSource,
}

impl Capture {
    pub fn camera(detections: Vec<Vec<f32>>) -> Self {
        Self {
            detections,
            source: CaptureSource::Camera,
        }
    }

    pub fn upload(name: impl Into<String>, detections: Vec<Vec<f32>>) -> Self {
        Self {
            detections,
            source: CaptureSource::Upload { name: name.into() },
        }
    }
}

#[derive(Debug, Clone)]
pub struct EnrollmentSession {
    state: SessionState,
    label: Option<Label>,
    pending: Vec<Descriptor>,
    sources: Vec<CaptureSource>,
}

impl Default for EnrollmentSession {
    fn default() -> Self {
        Self::new()
    }
}

impl EnrollmentSession {
    pub fn new() -> Self {
        Self {
            state: SessionState::Empty,
            label: None,
            pending: Vec::new(),
            sources: Vec::new(),
        }
    }

    /// Begin accumulating captures for `label`.
    pub fn start(&mut self, label: &str) -> Result<(), EnrollmentError> {
        if self.state == SessionState::Accumulating {
            return Err(self.invalid("start"));
        }
        let label = Label::new(label).map_err(|_| EnrollmentError::InvalidLabel)?;

        tracing::debug!(label = %label, "enrollment started");
        self.state = SessionState::Accumulating;
        self.label = Some(label);
        self.pending.clear();
        self.sources.clear();
        Ok(())
    }

    /// Append the primary face of `capture` to the pending set.
    ///
    /// On any error the pending set is unchanged.
    pub fn add_capture(&mut self, capture: Capture) -> Result<usize, EnrollmentError> {
        if self.state != SessionState::Accumulating {
            return Err(self.invalid("add_capture"));
        }

        let Capture { detections, source } = capture;
        let extra = detections.len().saturating_sub(1);
        let primary = detections
            .into_iter()
            .next()
            .ok_or(EnrollmentError::NoFaceDetected)?;
        let descriptor = Descriptor::new(primary)?;

        if extra > 0 {
            tracing::debug!(ignored = extra, "capture has several faces; keeping the first");
        }
        self.pending.push(descriptor);
        self.sources.push(source);
        Ok(self.pending.len())
    }

    /// Merge pending descriptors into `store` and return the new store.
    pub fn commit(&mut self, store: &EnrollmentStore) -> Result<EnrollmentStore, EnrollmentError> {
        if self.state != SessionState::Accumulating || self.pending.is_empty() {
            return Err(EnrollmentError::EmptyCapture);
        }
        let Some(label) = self.label.as_ref() else {
            return Err(EnrollmentError::EmptyCapture);
        };

        let added = self.pending.len();
        let next = store.commit(label, self.pending.drain(..));
        tracing::info!(label = %label, added, "enrollment committed");

        self.sources.clear();
        self.state = SessionState::Committed;
        Ok(next)
    }

    /// Discard pending captures.
    pub fn cancel(&mut self) -> Result<(), EnrollmentError> {
        if self.state != SessionState::Accumulating {
            return Err(self.invalid("cancel"));
        }
        tracing::debug!(discarded = self.pending.len(), "enrollment cancelled");
        self.pending.clear();
        self.sources.clear();
        self.state = SessionState::Cancelled;
        Ok(())
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn label(&self) -> Option<&Label> {
        self.label.as_ref()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn sources(&self) -> &[CaptureSource] {
        &self.sources
    }

    fn invalid(&self, operation: &'static str) -> EnrollmentError {
        EnrollmentError::InvalidState {
            operation,
            state: self.state,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DESCRIPTOR_DIM;

    fn face(v: f32) -> Vec<f32> {
        vec![v; DESCRIPTOR_DIM]
    }

    #[test]
    fn test_full_lifecycle() {
        let mut session = EnrollmentSession::new();
        assert_eq!(session.state(), SessionState::Empty);

        session.start("Ana").unwrap();
        assert_eq!(session.state(), SessionState::Accumulating);
        assert_eq!(session.add_capture(Capture::camera(vec![face(0.1)])).unwrap(), 1);
        assert_eq!(
            session.add_capture(Capture::upload("ana.jpg", vec![face(0.2)])).unwrap(),
            2
        );
        assert_eq!(
            session.sources(),
            &[
                CaptureSource::Camera,
                CaptureSource::Upload { name: "ana.jpg".into() }
            ]
        );

        let store = session.commit(&EnrollmentStore::new()).unwrap();
        assert_eq!(session.state(), SessionState::Committed);
        assert_eq!(session.pending_len(), 0);
        assert_eq!(store.get("Ana").unwrap().descriptors.len(), 2);
    }

    #[test]
    fn test_commit_before_capture_fails() {
        let mut session = EnrollmentSession::new();
        assert_eq!(
            session.commit(&EnrollmentStore::new()),
            Err(EnrollmentError::EmptyCapture)
        );
        session.start("Ana").unwrap();
        assert_eq!(
            session.commit(&EnrollmentStore::new()),
            Err(EnrollmentError::EmptyCapture)
        );
        assert_eq!(session.state(), SessionState::Accumulating);
    }

    #[test]
    fn test_capture_before_start_rejected() {
        let mut session = EnrollmentSession::new();
        let err = session.add_capture(Capture::camera(vec![face(0.1)])).unwrap_err();
        assert_eq!(
            err,
            EnrollmentError::InvalidState {
                operation: "add_capture",
                state: SessionState::Empty
            }
        );
        assert_eq!(session.pending_len(), 0);
    }

    #[test]
    fn test_invalid_label() {
        let mut session = EnrollmentSession::new();
        assert_eq!(session.start("   "), Err(EnrollmentError::InvalidLabel));
        assert_eq!(session.state(), SessionState::Empty);
    }

    #[test]
    fn test_no_face_detected_keeps_pending() {
        let mut session = EnrollmentSession::new();
        session.start("Ana").unwrap();
        session.add_capture(Capture::camera(vec![face(0.1)])).unwrap();
        assert_eq!(
            session.add_capture(Capture::camera(vec![])),
            Err(EnrollmentError::NoFaceDetected)
        );
        assert_eq!(session.pending_len(), 1);
        assert_eq!(session.state(), SessionState::Accumulating);
    }

    #[test]
    fn test_bad_descriptor_rejected() {
        let mut session = EnrollmentSession::new();
        session.start("Ana").unwrap();
        assert_eq!(
            session.add_capture(Capture::camera(vec![vec![0.0; 127]])),
            Err(EnrollmentError::Descriptor(DescriptorError::Dimension(127)))
        );
        assert_eq!(session.pending_len(), 0);
    }

    #[test]
    fn test_first_detection_is_used() {
        let mut session = EnrollmentSession::new();
        session.start("Ana").unwrap();
        session
            .add_capture(Capture::camera(vec![face(0.1), face(0.9)]))
            .unwrap();
        let store = session.commit(&EnrollmentStore::new()).unwrap();
        let set = store.get("Ana").unwrap();
        assert_eq!(set.descriptors.len(), 1);
        assert_eq!(set.descriptors[0].values()[0], 0.1);
    }

    #[test]
    fn test_cancel_discards() {
        let mut session = EnrollmentSession::new();
        assert!(session.cancel().is_err());
        session.start("Ana").unwrap();
        session.add_capture(Capture::camera(vec![face(0.1)])).unwrap();
        session.cancel().unwrap();
        assert_eq!(session.state(), SessionState::Cancelled);
        assert_eq!(session.pending_len(), 0);
        assert_eq!(
            session.commit(&EnrollmentStore::new()),
            Err(EnrollmentError::EmptyCapture)
        );
    }

    #[test]
    fn test_restart_after_commit() {
        let mut session = EnrollmentSession::new();
        session.start("Ana").unwrap();
        assert!(session.start("Ana").is_err());
        session.add_capture(Capture::camera(vec![face(0.1)])).unwrap();
        let store = session.commit(&EnrollmentStore::new()).unwrap();

        assert!(session.add_capture(Capture::camera(vec![face(0.2)])).is_err());
        session.start("Bruno").unwrap();
        session.add_capture(Capture::camera(vec![face(0.2)])).unwrap();
        let store = session.commit(&store).unwrap();
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_merge_three_then_two() {
        let mut session = EnrollmentSession::new();
        session.start("Ana").unwrap();
        for v in [0.1, 0.2, 0.3] {
            session.add_capture(Capture::camera(vec![face(v)])).unwrap();
        }
        let store = session.commit(&EnrollmentStore::new()).unwrap();

        session.start("Ana").unwrap();
        for v in [0.4, 0.5] {
            session.add_capture(Capture::camera(vec![face(v)])).unwrap();
        }
        let store = session.commit(&store).unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.get("Ana").unwrap().descriptors.len(), 5);
    }
}
