//! Data models for annotation statistics.
//!
//! This module contains the core data structures shared by the loader,
//! the aggregation engine and the export layer: per-record statistics,
//! aggregated project counts and the exported report value.

use chrono::NaiveDate;
use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;
use std::ops::Index;

/// Workflow state of a source document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", from = "String")]
pub enum DocumentState {
    New,
    AnnotationInProgress,
    AnnotationFinished,
    CurationInProgress,
    CurationFinished,
    /// Missing or unrecognized state. Never part of the per-state summaries.
    #[default]
    Unknown,
}

impl DocumentState {
    /// The five workflow states, in pipeline order.
    pub const ALL: [DocumentState; 5] = [
        DocumentState::New,
        DocumentState::AnnotationInProgress,
        DocumentState::AnnotationFinished,
        DocumentState::CurationInProgress,
        DocumentState::CurationFinished,
    ];

    /// Wire name of the state (as found in project metadata).
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentState::New => "NEW",
            DocumentState::AnnotationInProgress => "ANNOTATION_IN_PROGRESS",
            DocumentState::AnnotationFinished => "ANNOTATION_FINISHED",
            DocumentState::CurationInProgress => "CURATION_IN_PROGRESS",
            DocumentState::CurationFinished => "CURATION_FINISHED",
            DocumentState::Unknown => "UNKNOWN",
        }
    }

    /// Human readable label for summaries.
    pub fn label(&self) -> &'static str {
        match self {
            DocumentState::New => "New",
            DocumentState::AnnotationInProgress => "Annotation In Progress",
            DocumentState::AnnotationFinished => "Annotation Finished",
            DocumentState::CurationInProgress => "Curation In Progress",
            DocumentState::CurationFinished => "Curation Finished",
            DocumentState::Unknown => "Unknown",
        }
    }
}

impl From<&str> for DocumentState {
    fn from(s: &str) -> Self {
        match s {
            "NEW" => DocumentState::New,
            "ANNOTATION_IN_PROGRESS" => DocumentState::AnnotationInProgress,
            "ANNOTATION_FINISHED" => DocumentState::AnnotationFinished,
            "CURATION_IN_PROGRESS" => DocumentState::CurationInProgress,
            "CURATION_FINISHED" => DocumentState::CurationFinished,
            _ => DocumentState::Unknown,
        }
    }
}

impl From<String> for DocumentState {
    fn from(s: String) -> Self {
        DocumentState::from(s.as_str())
    }
}

impl fmt::Display for DocumentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Policy for combining several annotators' passes over one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AggregationMode {
    /// Element-wise sum over all annotators.
    #[default]
    #[serde(alias = "sum")]
    Sum,
    /// Sum divided by the number of annotators, rounded half up.
    #[serde(alias = "average")]
    Average,
    /// The single annotator pass with the largest combined total.
    #[serde(alias = "max")]
    Max,
}

impl fmt::Display for AggregationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggregationMode::Sum => write!(f, "Sum"),
            AggregationMode::Average => write!(f, "Average"),
            AggregationMode::Max => write!(f, "Max"),
        }
    }
}

/// A source document as listed in the project metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectDocument {
    pub name: String,
    #[serde(default)]
    pub state: DocumentState,
}

#[cfg(test)]
impl ProjectDocument {
    pub fn new(name: impl Into<String>, state: DocumentState) -> Self {
        Self {
            name: name.into(),
            state,
        }
    }
}

/// Statistics for one annotation type in one annotator's pass over one document.
///
/// Counts are unsigned, so a record with a negative total is rejected when
/// it is deserialized instead of leaking into aggregated totals.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CasTypeStats {
    /// Number of annotation instances.
    pub total: u64,
    /// Occurrences per feature value.
    #[serde(default)]
    pub features: BTreeMap<String, u64>,
}

impl CasTypeStats {
    pub fn new(total: u64, features: BTreeMap<String, u64>) -> Self {
        Self { total, features }
    }
}

/// One annotator's summary for one document, keyed by type display name.
pub type CasStats = BTreeMap<String, CasTypeStats>;

/// Per-annotator statistics for one document, keyed by annotator name.
pub type AnnotatorStats = BTreeMap<String, CasStats>;

/// All annotation statistics of a project, keyed by document name.
pub type ProjectAnnotations = BTreeMap<String, AnnotatorStats>;

/// A string-keyed map that keeps its entries in a fixed order.
///
/// Used wherever ordering is part of the output: annotation types ranked by
/// total and feature values ranked by occurrence. Serializes as a JSON
/// object in rank order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ranked<V>(Vec<(String, V)>);

impl<V> Default for Ranked<V> {
    fn default() -> Self {
        Ranked(Vec::new())
    }
}

impl<V> Ranked<V> {
    #[cfg(test)]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    #[cfg(test)]
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    #[cfg(test)]
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Append an entry at the lowest rank.
    #[cfg(test)]
    pub fn push(&mut self, key: impl Into<String>, value: V) {
        self.0.push((key.into(), value));
    }

    /// Stable sort by a key, highest first. Ties keep their current order.
    pub fn rank_by<K: Ord>(&mut self, mut key: impl FnMut(&V) -> K) {
        self.0.sort_by(|a, b| key(&b.1).cmp(&key(&a.1)));
    }
}

impl<V> FromIterator<(String, V)> for Ranked<V> {
    fn from_iter<I: IntoIterator<Item = (String, V)>>(iter: I) -> Self {
        Ranked(iter.into_iter().collect())
    }
}

impl<V> IntoIterator for Ranked<V> {
    type Item = (String, V);
    type IntoIter = std::vec::IntoIter<(String, V)>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<V> Index<&str> for Ranked<V> {
    type Output = V;

    fn index(&self, key: &str) -> &V {
        match self.get(key) {
            Some(value) => value,
            None => panic!("no entry found for key {:?}", key),
        }
    }
}

impl<V: Serialize> Serialize for Ranked<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, value) in &self.0 {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl<'de, V: Deserialize<'de>> Deserialize<'de> for Ranked<V> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RankedVisitor<V>(PhantomData<V>);

        impl<'de, V: Deserialize<'de>> Visitor<'de> for RankedVisitor<V> {
            type Value = Ranked<V>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut entries: Vec<(String, V)> = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((key, value)) = access.next_entry::<String, V>()? {
                    if entries.iter().any(|(existing, _)| *existing == key) {
                        return Err(de::Error::custom(format!("duplicate key `{}`", key)));
                    }
                    entries.push((key, value));
                }
                Ok(Ranked(entries))
            }
        }

        deserializer.deserialize_map(RankedVisitor(PhantomData))
    }
}

/// Project-wide statistics for one annotation type, with per-document attribution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatedTypeStats {
    /// Sum of all per-document totals.
    pub total: u64,
    /// Aggregated total per document.
    pub documents: BTreeMap<String, u64>,
    /// Per feature value, the count per document. Ranked by overall occurrence.
    pub features: Ranked<BTreeMap<String, u64>>,
}

/// Analysis view of a project: types ranked by descending total.
pub type AggregatedTypeCounts = Ranked<AggregatedTypeStats>;

/// Export view of one annotation type, collapsed to workflow states.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportedTypeSummary {
    pub total: u64,
    pub total_by_status: BTreeMap<DocumentState, u64>,
    /// Only present for the types listed in `FEATURE_BREAKDOWN_EXPORT_TYPES`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub features: Option<Ranked<BTreeMap<DocumentState, u64>>>,
}

pub type ExportedTypeCounts = Ranked<ExportedTypeSummary>;

/// A project as produced by the archive loader. Immutable once built.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadedProject {
    /// Archive file name, e.g. `project.zip`.
    pub name: String,
    pub tags: Option<Vec<String>>,
    pub documents: Vec<ProjectDocument>,
    pub annotations: ProjectAnnotations,
    /// Resolved labels for concept identifiers. May be empty.
    #[serde(default)]
    pub snomed_labels: BTreeMap<String, String>,
    pub inception_version: Option<String>,
}

/// The exported report for one project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportedProjectData {
    pub project_name: String,
    pub project_tags: Option<Vec<String>>,
    pub doc_categories: BTreeMap<DocumentState, u64>,
    pub doc_token_categories: BTreeMap<DocumentState, u64>,
    pub type_counts: ExportedTypeCounts,
    pub aggregation_mode: AggregationMode,
    pub created: NaiveDate,
    pub inception_version: Option<String>,
    pub dashboard_version: Option<String>,
}

/// Result of building a report: the exported value plus the display view.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectReport {
    pub data: ExportedProjectData,
    /// Full counts, or the curated-only view when that was effective.
    pub type_counts: AggregatedTypeCounts,
    /// Effective flag: requested and at least one curated document exists.
    pub show_only_curated: bool,
    pub has_curated_documents: bool,
}
