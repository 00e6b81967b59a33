//! Copy-on-write gallery publication.
//!
//! Every store mutation builds a fresh immutable [`Gallery`] and swaps it in
//! behind an `Arc`. Readers clone the `Arc` once per use and never observe a
//! partially updated gallery.

use likeness_core::{EnrollmentStore, Gallery};
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Clone)]
pub struct SharedGallery {
    tx: Arc<watch::Sender<Arc<Gallery>>>,
}

impl SharedGallery {
    pub fn new(store: &EnrollmentStore) -> Self {
        let gallery = Gallery::build_lenient(store).with_generation(1);
        let (tx, _rx) = watch::channel(Arc::new(gallery));
        Self { tx: Arc::new(tx) }
    }

    /// Rebuild from `store` and publish under the next generation.
    pub fn publish(&self, store: &EnrollmentStore) -> Arc<Gallery> {
        let generation = self.tx.borrow().generation() + 1;
        let gallery = Arc::new(Gallery::build_lenient(store).with_generation(generation));
        self.tx.send_replace(Arc::clone(&gallery));
        tracing::debug!(generation, entries = gallery.len(), "gallery published");
        gallery
    }

    pub fn current(&self) -> Arc<Gallery> {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<Gallery>> {
        self.tx.subscribe()
    }
}
