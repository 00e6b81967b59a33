//! likeness-engine — Store persistence, live recognition loop and the face
//! service facade used by the UI layer.
//!
//! Descriptor extraction is plugged in through [`DescriptorSource`].

pub mod config;
pub mod extractor;
pub mod persist;
pub mod recognition;
pub mod service;
pub mod snapshot;

pub use config::{Config, ConfigError};
pub use extractor::{DescriptorSource, ExtractError, Observation, Region};
pub use recognition::{
    spawn_recognition, FaceMatch, LoopExit, LoopSettings, Presence, Recognition, RecognitionHandle,
};
pub use service::{FaceService, ServiceError};
pub use snapshot::SharedGallery;
