//! likeness-core — Face descriptor matching and enrollment store.
//!
//! Consumes 128-dimensional descriptors produced by an external extractor,
//! keeps them per identity, and classifies new observations by Euclidean
//! nearest neighbor with an unknown/known distance threshold.

pub mod enrollment;
pub mod gallery;
pub mod matcher;
pub mod store;
pub mod types;

pub use enrollment::{Capture, CaptureSource, EnrollmentError, EnrollmentSession, SessionState};
pub use gallery::{EmptyGalleryWarning, Gallery, GalleryEntry};
pub use matcher::{EuclideanMatcher, MatchError, MatchResult, Matcher, DEFAULT_DISTANCE_THRESHOLD};
pub use store::{EnrollmentStore, FormatError, LabelSummary, LabeledDescriptorSet};
pub use types::{Descriptor, DescriptorError, Label, LabelError, DESCRIPTOR_DIM};
