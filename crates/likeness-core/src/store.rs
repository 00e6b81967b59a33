//! Enrollment store — label → descriptors, and its JSON interchange document.
//!
//! The document shape is `{ "<label>": [[f0, …, f127], …], … }`. Loading
//! validates every vector; mutation is copy-on-write (`commit` and `remove`
//! return a new store).

use crate::types::{Descriptor, DescriptorError, Label, DESCRIPTOR_DIM};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FormatError {
    #[error("document is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("document top level must be an object of label -> descriptors")]
    NotAnObject,
    #[error("legacy parallel-array document (embeddings/labels) is not supported")]
    LegacyShape,
    #[error("document contains an empty or whitespace-only label")]
    InvalidLabel,
    #[error("label {label:?}: value must be an array of descriptor arrays")]
    NotAnArrayOfArrays { label: String },
    #[error("label {label:?}: descriptor set is empty")]
    EmptySet { label: String },
    #[error("label {label:?}, descriptor {index}: component {component} is not a number")]
    NonNumeric {
        label: String,
        index: usize,
        component: usize,
    },
    #[error("label {label:?}, descriptor {index}: expected {DESCRIPTOR_DIM} values, got {actual}")]
    Dimension {
        label: String,
        index: usize,
        actual: usize,
    },
    #[error("label {label:?}, descriptor {index}: component {component} is not finite")]
    NonFinite {
        label: String,
        index: usize,
        component: usize,
    },
}

/// A label with one or more descriptors.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledDescriptorSet {
    pub label: Label,
    pub descriptors: Vec<Descriptor>,
}

/// Per-label descriptor count, for listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LabelSummary {
    pub label: Label,
    pub descriptors: usize,
}

/// Mapping from label to its descriptor set. Empty is valid.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnrollmentStore {
    sets: BTreeMap<Label, LabeledDescriptorSet>,
}

impl EnrollmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON interchange document.
    pub fn from_json(text: &str) -> Result<Self, FormatError> {
        let doc: Value = serde_json::from_str(text)?;
        Self::from_document(&doc)
    }

    /// Validate and load an already-parsed interchange document.
    pub fn from_document(doc: &Value) -> Result<Self, FormatError> {
        let object = doc.as_object().ok_or(FormatError::NotAnObject)?;
        if is_legacy_shape(object) {
            return Err(FormatError::LegacyShape);
        }

        let mut sets = BTreeMap::new();
        for (name, value) in object {
            let label = Label::new(name.as_str()).map_err(|_| FormatError::InvalidLabel)?;
            let descriptors = parse_set(name, value)?;
            sets.insert(label.clone(), LabeledDescriptorSet { label, descriptors });
        }
        Ok(Self { sets })
    }

    /// Emit the interchange document as a JSON value.
    pub fn to_document(&self) -> Value {
        let mut object = Map::new();
        for (label, set) in &self.sets {
            let vectors = set
                .descriptors
                .iter()
                .map(|d| Value::Array(d.values().iter().map(|&v| Value::from(v)).collect()))
                .collect();
            object.insert(label.to_string(), Value::Array(vectors));
        }
        Value::Object(object)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Return a new store with `descriptors` appended to `label`'s set.
    ///
    /// Near-duplicates are kept: several captures of the same person are
    /// what makes matching robust to pose and lighting changes.
    pub fn commit(
        &self,
        label: &Label,
        descriptors: impl IntoIterator<Item = Descriptor>,
    ) -> EnrollmentStore {
        let mut next = self.clone();
        let set = next
            .sets
            .entry(label.clone())
            .or_insert_with(|| LabeledDescriptorSet {
                label: label.clone(),
                descriptors: Vec::new(),
            });
        set.descriptors.extend(descriptors);
        if set.descriptors.is_empty() {
            next.sets.remove(label);
        }
        next
    }

    /// Return a new store without `label`, and whether it was present.
    pub fn remove(&self, label: &str) -> (EnrollmentStore, bool) {
        let mut next = self.clone();
        let removed = next.sets.remove(label).is_some();
        (next, removed)
    }

    pub fn get(&self, label: &str) -> Option<&LabeledDescriptorSet> {
        self.sets.get(label)
    }

    /// Sets in label order.
    pub fn iter(&self) -> impl Iterator<Item = &LabeledDescriptorSet> {
        self.sets.values()
    }

    /// Number of identities.
    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    /// Total descriptors across all identities.
    pub fn descriptor_count(&self) -> usize {
        self.sets.values().map(|s| s.descriptors.len()).sum()
    }

    pub fn summaries(&self) -> Vec<LabelSummary> {
        self.sets
            .values()
            .map(|s| LabelSummary {
                label: s.label.clone(),
                descriptors: s.descriptors.len(),
            })
            .collect()
    }
}

impl Serialize for EnrollmentStore {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.sets.len()))?;
        for (label, set) in &self.sets {
            map.serialize_entry(label, &set.descriptors)?;
        }
        map.end()
    }
}

/// `{"embeddings": [[...]], "labels": ["..."]}` from the older pipeline,
/// whose distances were computed in a different space.
fn is_legacy_shape(object: &Map<String, Value>) -> bool {
    matches!(
        (object.get("embeddings"), object.get("labels")),
        (Some(Value::Array(_)), Some(Value::Array(labels)))
            if labels.iter().all(Value::is_string)
    )
}

fn parse_set(label: &str, value: &Value) -> Result<Vec<Descriptor>, FormatError> {
    let shape_error = || FormatError::NotAnArrayOfArrays {
        label: label.to_string(),
    };

    let vectors = value.as_array().ok_or_else(shape_error)?;
    if vectors.is_empty() {
        return Err(FormatError::EmptySet {
            label: label.to_string(),
        });
    }

    let mut descriptors = Vec::with_capacity(vectors.len());
    for (index, vector) in vectors.iter().enumerate() {
        let components = vector.as_array().ok_or_else(shape_error)?;
        let mut values = Vec::with_capacity(components.len());
        for (component, v) in components.iter().enumerate() {
            let n = v.as_f64().ok_or_else(|| FormatError::NonNumeric {
                label: label.to_string(),
                index,
                component,
            })?;
            values.push(n as f32);
        }

        let descriptor = Descriptor::new(values).map_err(|e| match e {
            DescriptorError::Dimension(actual) => FormatError::Dimension {
                label: label.to_string(),
                index,
                actual,
            },
            DescriptorError::NonFinite { index: component } => FormatError::NonFinite {
                label: label.to_string(),
                index,
                component,
            },
        })?;
        descriptors.push(descriptor);
    }
    Ok(descriptors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn descriptor(seed: f32) -> Descriptor {
        Descriptor::new((0..DESCRIPTOR_DIM).map(|i| seed + i as f32 * 0.001).collect()).unwrap()
    }

    fn label(name: &str) -> Label {
        Label::new(name).unwrap()
    }

    #[test]
    fn test_round_trip() {
        let store = EnrollmentStore::new()
            .commit(&label("Ana"), [descriptor(0.1), descriptor(-0.3)])
            .commit(&label("Bruno"), [descriptor(0.7)]);

        let from_value = EnrollmentStore::from_document(&store.to_document()).unwrap();
        assert_eq!(from_value, store);

        let from_text = EnrollmentStore::from_json(&store.to_json().unwrap()).unwrap();
        assert_eq!(from_text, store);

        let empty = EnrollmentStore::new();
        assert_eq!(EnrollmentStore::from_json(&empty.to_json().unwrap()).unwrap(), empty);
    }

    #[test]
    fn test_commit_merges_without_dropping() {
        let ana = label("Ana");
        let store = EnrollmentStore::new()
            .commit(&ana, [descriptor(0.1), descriptor(0.2), descriptor(0.3)])
            .commit(&ana, [descriptor(0.4), descriptor(0.4)]);

        assert_eq!(store.len(), 1);
        assert_eq!(store.get("Ana").unwrap().descriptors.len(), 5);
        assert_eq!(store.descriptor_count(), 5);
    }

    #[test]
    fn test_commit_leaves_original_untouched() {
        let before = EnrollmentStore::new().commit(&label("Ana"), [descriptor(0.1)]);
        let after = before.commit(&label("Ana"), [descriptor(0.2)]);
        assert_eq!(before.get("Ana").unwrap().descriptors.len(), 1);
        assert_eq!(after.get("Ana").unwrap().descriptors.len(), 2);
    }

    #[test]
    fn test_commit_nothing_creates_no_entry() {
        let store = EnrollmentStore::new().commit(&label("Ana"), Vec::new());
        assert!(store.is_empty());
    }

    #[test]
    fn test_remove() {
        let store = EnrollmentStore::new().commit(&label("Ana"), [descriptor(0.1)]);
        let (store, removed) = store.remove("Ana");
        assert!(removed);
        assert!(store.is_empty());
        let (_, removed) = store.remove("Ana");
        assert!(!removed);
    }

    #[test]
    fn test_load_rejects_string_value() {
        let err = EnrollmentStore::from_json(r#"{"bad": "notanarray"}"#).unwrap_err();
        assert!(matches!(err, FormatError::NotAnArrayOfArrays { ref label } if label == "bad"));
    }

    #[test]
    fn test_load_rejects_non_object() {
        assert!(matches!(
            EnrollmentStore::from_document(&json!([[0.0]])),
            Err(FormatError::NotAnObject)
        ));
        assert!(matches!(
            EnrollmentStore::from_json("not json"),
            Err(FormatError::Json(_))
        ));
    }

    #[test]
    fn test_load_rejects_non_numeric_component() {
        let mut vector: Vec<Value> = vec![json!(0.0); DESCRIPTOR_DIM];
        vector[3] = json!("x");
        let err = EnrollmentStore::from_document(&json!({ "Ana": [vector] })).unwrap_err();
        assert!(matches!(
            err,
            FormatError::NonNumeric { index: 0, component: 3, .. }
        ));
    }

    #[test]
    fn test_load_rejects_wrong_dimension() {
        let err = EnrollmentStore::from_document(&json!({ "Ana": [vec![0.0; 127]] })).unwrap_err();
        assert!(matches!(err, FormatError::Dimension { actual: 127, .. }));
    }

    #[test]
    fn test_load_rejects_empty_set_and_blank_label() {
        assert!(matches!(
            EnrollmentStore::from_document(&json!({ "Ana": [] })),
            Err(FormatError::EmptySet { .. })
        ));
        assert!(matches!(
            EnrollmentStore::from_document(&json!({ " ": [vec![0.0; DESCRIPTOR_DIM]] })),
            Err(FormatError::InvalidLabel)
        ));
    }

    #[test]
    fn test_load_rejects_legacy_shape() {
        let doc = json!({
            "embeddings": [vec![0.0; DESCRIPTOR_DIM]],
            "labels": ["Ana"],
        });
        assert!(matches!(
            EnrollmentStore::from_document(&doc),
            Err(FormatError::LegacyShape)
        ));
    }

    #[test]
    fn test_summaries_in_label_order() {
        let store = EnrollmentStore::new()
            .commit(&label("Zoe"), [descriptor(0.1)])
            .commit(&label("Ana"), [descriptor(0.2), descriptor(0.3)]);
        let summaries = store.summaries();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].label.as_str(), "Ana");
        assert_eq!(summaries[0].descriptors, 2);
        assert_eq!(summaries[1].label.as_str(), "Zoe");
    }
}
