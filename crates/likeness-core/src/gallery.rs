//! Gallery — the flattened (label, descriptor) search set derived from a store.

use crate::store::EnrollmentStore;
use crate::types::{Descriptor, Label};
use thiserror::Error;

/// One searchable (label, descriptor) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct GalleryEntry {
    pub label: Label,
    pub descriptor: Descriptor,
}

/// Immutable snapshot of every stored descriptor, in store (label) order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Gallery {
    entries: Vec<GalleryEntry>,
    generation: u64,
}

/// Built from an empty store. Matching still works; everything is unknown.
#[derive(Error, Debug)]
#[error("gallery is empty: no identities enrolled")]
pub struct EmptyGalleryWarning {
    gallery: Gallery,
}

impl EmptyGalleryWarning {
    pub fn into_gallery(self) -> Gallery {
        self.gallery
    }
}

impl Gallery {
    /// Flatten `store` into one entry per stored descriptor.
    pub fn build(store: &EnrollmentStore) -> Result<Gallery, EmptyGalleryWarning> {
        let entries: Vec<GalleryEntry> = store
            .iter()
            .flat_map(|set| {
                set.descriptors.iter().map(|d| GalleryEntry {
                    label: set.label.clone(),
                    descriptor: d.clone(),
                })
            })
            .collect();

        let gallery = Gallery {
            entries,
            generation: 0,
        };
        if gallery.is_empty() {
            return Err(EmptyGalleryWarning { gallery });
        }
        Ok(gallery)
    }

    /// Build, logging the empty-gallery warning instead of returning it.
    pub fn build_lenient(store: &EnrollmentStore) -> Gallery {
        Self::build(store).unwrap_or_else(|warning| {
            tracing::warn!("{warning}; all observations will classify as unknown");
            warning.into_gallery()
        })
    }

    /// Stamp the publication generation of this snapshot.
    pub fn with_generation(mut self, generation: u64) -> Self {
        self.generation = generation;
        self
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn entries(&self) -> &[GalleryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DESCRIPTOR_DIM;

    fn descriptor(v: f32) -> Descriptor {
        Descriptor::new(vec![v; DESCRIPTOR_DIM]).unwrap()
    }

    #[test]
    fn test_build_flattens_every_descriptor() {
        let ana = Label::new("Ana").unwrap();
        let bruno = Label::new("Bruno").unwrap();
        let store = EnrollmentStore::new()
            .commit(&bruno, [descriptor(0.5)])
            .commit(&ana, [descriptor(0.1), descriptor(0.2)]);

        let gallery = Gallery::build(&store).unwrap();
        assert_eq!(gallery.len(), 3);
        let labels: Vec<&str> = gallery.entries().iter().map(|e| e.label.as_str()).collect();
        assert_eq!(labels, vec!["Ana", "Ana", "Bruno"]);
        assert_eq!(gallery.entries()[1].descriptor, descriptor(0.2));
    }

    #[test]
    fn test_build_is_deterministic() {
        let store = EnrollmentStore::new()
            .commit(&Label::new("Ana").unwrap(), [descriptor(0.1)])
            .commit(&Label::new("Bruno").unwrap(), [descriptor(0.2)]);
        assert_eq!(Gallery::build(&store).unwrap(), Gallery::build(&store).unwrap());
    }

    #[test]
    fn test_build_empty_store_warns() {
        let warning = Gallery::build(&EnrollmentStore::new()).unwrap_err();
        let gallery = warning.into_gallery();
        assert!(gallery.is_empty());
        assert!(Gallery::build_lenient(&EnrollmentStore::new()).is_empty());
    }

    #[test]
    fn test_generation_stamp() {
        let gallery = Gallery::default().with_generation(7);
        assert_eq!(gallery.generation(), 7);
    }
}
