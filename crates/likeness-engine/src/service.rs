//! Face service — the operations the UI layer calls.
//!
//! Owns the enrollment store, keeps the published gallery in step with it,
//! and persists every mutation when a store path is configured.

use crate::config::Config;
use crate::extractor::DescriptorSource;
use crate::persist::{self, PersistError};
use crate::recognition::{spawn_recognition, LoopSettings, RecognitionHandle};
use crate::snapshot::SharedGallery;
use likeness_core::{
    EnrollmentError, EnrollmentSession, EnrollmentStore, EuclideanMatcher, Gallery, LabelSummary,
    MatchError, MatchResult, Matcher,
};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    Enrollment(#[from] EnrollmentError),
    #[error(transparent)]
    Persist(#[from] PersistError),
}

/// Clone-safe handle to the shared store and gallery.
#[derive(Clone)]
pub struct FaceService {
    inner: Arc<Inner>,
}

struct Inner {
    /// Held across persistence so commits apply one at a time.
    store: Mutex<EnrollmentStore>,
    gallery: SharedGallery,
    store_path: Option<PathBuf>,
    settings: LoopSettings,
}

impl FaceService {
    /// Load the store at `config.store_path` and persist mutations back to it.
    pub async fn open(config: &Config) -> Self {
        let store = persist::load_or_empty(&config.store_path).await;
        Self::build(store, Some(config.store_path.clone()), config)
    }

    /// Service over `store` with no persistence.
    pub fn in_memory(store: EnrollmentStore, config: &Config) -> Self {
        Self::build(store, None, config)
    }

    fn build(store: EnrollmentStore, store_path: Option<PathBuf>, config: &Config) -> Self {
        let gallery = SharedGallery::new(&store);
        Self {
            inner: Arc::new(Inner {
                store: Mutex::new(store),
                gallery,
                store_path,
                settings: LoopSettings::from(config),
            }),
        }
    }

    pub fn threshold(&self) -> f32 {
        self.inner.settings.threshold
    }

    /// Classify one descriptor against the current gallery.
    pub fn match_descriptor(&self, probe: &[f32]) -> Result<MatchResult, MatchError> {
        let gallery = self.inner.gallery.current();
        EuclideanMatcher.compare(&gallery, probe, self.inner.settings.threshold)
    }

    /// New session already accumulating for `label`.
    pub fn start_enrollment(&self, label: &str) -> Result<EnrollmentSession, EnrollmentError> {
        let mut session = EnrollmentSession::new();
        session.start(label)?;
        Ok(session)
    }

    /// Commit `session` into the store, persist, and publish a new gallery.
    ///
    /// If persisting fails the store is unchanged and `session` is restored
    /// to its pre-commit state so the captures can be retried.
    pub async fn commit_enrollment(
        &self,
        session: &mut EnrollmentSession,
    ) -> Result<LabelSummary, ServiceError> {
        let mut store = self.inner.store.lock().await;
        let before = session.clone();
        let next = session.commit(&store)?;
        let Some(summary) = session
            .label()
            .and_then(|label| next.get(label.as_str()))
            .map(|set| LabelSummary {
                label: set.label.clone(),
                descriptors: set.descriptors.len(),
            })
        else {
            *session = before;
            return Err(EnrollmentError::EmptyCapture.into());
        };

        if let Some(path) = &self.inner.store_path {
            if let Err(e) = persist::save(path, &next).await {
                tracing::warn!(error = %e, "enrollment not persisted; rolling back");
                *session = before;
                return Err(e.into());
            }
        }

        *store = next;
        self.inner.gallery.publish(&store);
        tracing::info!(
            label = %summary.label,
            descriptors = summary.descriptors,
            identities = store.len(),
            "identity enrolled"
        );
        Ok(summary)
    }

    /// Forget an identity. Returns whether it was enrolled.
    pub async fn remove_label(&self, label: &str) -> Result<bool, ServiceError> {
        let mut store = self.inner.store.lock().await;
        let (next, removed) = store.remove(label);
        if !removed {
            return Ok(false);
        }

        if let Some(path) = &self.inner.store_path {
            persist::save(path, &next).await?;
        }
        *store = next;
        self.inner.gallery.publish(&store);
        tracing::info!(label, "identity removed");
        Ok(true)
    }

    pub async fn labels(&self) -> Vec<LabelSummary> {
        self.inner.store.lock().await.summaries()
    }

    pub async fn store(&self) -> EnrollmentStore {
        self.inner.store.lock().await.clone()
    }

    /// Interchange document for user-initiated download.
    pub async fn export_document(&self) -> serde_json::Value {
        self.inner.store.lock().await.to_document()
    }

    pub fn gallery(&self) -> Arc<Gallery> {
        self.inner.gallery.current()
    }

    pub fn subscribe_gallery(&self) -> watch::Receiver<Arc<Gallery>> {
        self.inner.gallery.subscribe()
    }

    /// Run the recognition loop over `source` against this service's gallery.
    pub fn spawn_recognition<S>(&self, source: S, cancel: CancellationToken) -> RecognitionHandle
    where
        S: DescriptorSource + 'static,
    {
        spawn_recognition(
            source,
            self.subscribe_gallery(),
            self.inner.settings.clone(),
            cancel,
        )
    }
}
