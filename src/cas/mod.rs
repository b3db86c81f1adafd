//! Annotation record access.
//!
//! The extractor only needs three capabilities from an annotation record:
//! enumerate its types, enumerate a type's features and select the
//! instances of a type. `AnnotationRecord` captures exactly that so the
//! statistics code does not depend on a particular serialization.

pub mod json;

pub use json::JsonCas;

use std::collections::BTreeMap;

/// Built-in structural features that carry no semantic information.
pub const FEATURE_BEGIN: &str = "begin";
pub const FEATURE_END: &str = "end";
pub const FEATURE_SOFA: &str = "sofa";
pub const FEATURE_LITERAL: &str = "literal";

/// One annotation instance with its primitive feature values rendered as text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureStructure {
    pub id: String,
    pub type_name: String,
    pub values: BTreeMap<String, String>,
}

impl FeatureStructure {
    /// Value of a feature, `None` when unset or not a primitive.
    pub fn get(&self, feature: &str) -> Option<&str> {
        self.values.get(feature).map(String::as_str)
    }
}

/// Capability interface over a parsed annotation record (one CAS).
pub trait AnnotationRecord {
    /// Fully qualified names of the user-defined types in the record.
    fn list_types(&self) -> Vec<&str>;

    /// All feature names of a type, inherited ones included.
    fn list_features(&self, type_name: &str) -> Vec<String>;

    /// Instances of a type and its subtypes. Unknown types select nothing.
    fn select(&self, type_name: &str) -> Vec<&FeatureStructure>;
}
