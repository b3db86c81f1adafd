//! Per-record statistics extraction.
//!
//! Turns one annotator's record for one document into `CasStats`: a total
//! per annotation type and a histogram of feature values. Concept
//! identifiers are collected separately so labels can be resolved later.

use crate::cas::{AnnotationRecord, FeatureStructure, FEATURE_BEGIN, FEATURE_END, FEATURE_LITERAL, FEATURE_SOFA};
use crate::models::{CasStats, CasTypeStats};
use std::collections::{BTreeSet, HashSet};

/// Type holding the display names of the project's layers.
pub const LAYER_DEFINITION_TYPE: &str = "de.tudarmstadt.ukp.clarin.webanno.api.type.LayerDefinition";

/// Fully qualified name of the concept layer.
pub const CONCEPT_TYPE: &str = "gemtex.Concept";

/// Feature of the concept layer holding the external identifier.
pub const CONCEPT_ID_FEATURE: &str = "id";

const SKIP_FEATURES: [&str; 4] = [FEATURE_BEGIN, FEATURE_END, FEATURE_SOFA, FEATURE_LITERAL];

/// Display name of a type: the `uiName` of its layer definition, or the
/// last dot-separated segment of the qualified name.
pub fn find_display_name(layer_definitions: &[&FeatureStructure], type_name: &str) -> String {
    layer_definitions
        .iter()
        .find(|definition| definition.get("name") == Some(type_name))
        .and_then(|definition| definition.get("uiName"))
        .map(String::from)
        .unwrap_or_else(|| type_name.rsplit('.').next().unwrap_or(type_name).to_string())
}

/// Compute type and feature statistics for one record.
///
/// Returns the statistics and the set of concept identifiers used in the
/// record. Types without instances or without semantic features are left out.
pub fn compute_cas_stats<R>(record: &R, excluded_types: &HashSet<String>) -> (CasStats, BTreeSet<String>)
where
    R: AnnotationRecord + ?Sized,
{
    let mut counts = CasStats::new();
    let mut concept_ids = BTreeSet::new();

    // An unknown layer-definition type selects nothing; names then fall back.
    let layer_definitions = record.select(LAYER_DEFINITION_TYPE);

    for type_name in record.list_types() {
        if excluded_types.contains(type_name) {
            continue;
        }

        let relevant_features: Vec<String> = record
            .list_features(type_name)
            .into_iter()
            .filter(|feature| !SKIP_FEATURES.contains(&feature.as_str()))
            .collect();
        if relevant_features.is_empty() {
            continue;
        }

        let instances = record.select(type_name);
        if instances.is_empty() {
            continue;
        }

        let is_concept_type = type_name == CONCEPT_TYPE;
        let entry = counts
            .entry(find_display_name(&layer_definitions, type_name))
            .or_insert_with(CasTypeStats::default);

        for instance in instances {
            entry.total += 1;

            for feature in &relevant_features {
                let Some(value) = instance.get(feature) else {
                    continue;
                };
                if is_concept_type && feature == CONCEPT_ID_FEATURE {
                    concept_ids.insert(value.to_string());
                }
                *entry.features.entry(value.to_string()).or_insert(0) += 1;
            }
        }
    }

    (counts, concept_ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cas::JsonCas;

    const RECORD: &str = r#"{
        "%TYPES": {
            "de.tudarmstadt.ukp.clarin.webanno.api.type.LayerDefinition": {
                "%SUPER_TYPE": "uima.cas.TOP",
                "name": {"%RANGE": "uima.cas.String"},
                "uiName": {"%RANGE": "uima.cas.String"}
            },
            "gemtex.Concept": {
                "%SUPER_TYPE": "uima.tcas.Annotation",
                "id": {"%RANGE": "uima.cas.String"},
                "literal": {"%RANGE": "uima.cas.String"}
            },
            "webanno.custom.PHI": {
                "%SUPER_TYPE": "uima.tcas.Annotation",
                "kind": {"%RANGE": "uima.cas.String"}
            },
            "webanno.custom.Marker": {
                "%SUPER_TYPE": "uima.tcas.Annotation"
            },
            "webanno.custom.Hidden": {
                "%SUPER_TYPE": "uima.tcas.Annotation",
                "value": {"%RANGE": "uima.cas.String"}
            }
        },
        "%FEATURE_STRUCTURES": [
            {"%ID": 1, "%TYPE": "de.tudarmstadt.ukp.clarin.webanno.api.type.LayerDefinition",
             "name": "gemtex.Concept", "uiName": "Concept"},
            {"%ID": 2, "%TYPE": "gemtex.Concept", "begin": 0, "end": 3,
             "id": "http://snomed.info/id/123", "literal": "abc"},
            {"%ID": 3, "%TYPE": "gemtex.Concept", "begin": 4, "end": 7,
             "id": "http://snomed.info/id/123"},
            {"%ID": 4, "%TYPE": "gemtex.Concept", "begin": 8, "end": 9,
             "id": "http://snomed.info/id/456"},
            {"%ID": 5, "%TYPE": "webanno.custom.PHI", "begin": 0, "end": 3, "kind": "NAME"},
            {"%ID": 6, "%TYPE": "webanno.custom.PHI", "begin": 4, "end": 7},
            {"%ID": 7, "%TYPE": "webanno.custom.Marker", "begin": 0, "end": 1},
            {"%ID": 8, "%TYPE": "webanno.custom.Hidden", "begin": 0, "end": 1, "value": "x"}
        ]
    }"#;

    fn excluded() -> HashSet<String> {
        ["webanno.custom.Hidden", LAYER_DEFINITION_TYPE]
            .into_iter()
            .map(String::from)
            .collect()
    }

    #[test]
    fn test_concept_counts_and_ids() {
        let cas = JsonCas::from_json_str(RECORD).unwrap();
        let (stats, ids) = compute_cas_stats(&cas, &excluded());

        let concept = &stats["Concept"];
        assert_eq!(concept.total, 3);
        assert_eq!(concept.features.get("http://snomed.info/id/123"), Some(&2));
        assert_eq!(concept.features.get("http://snomed.info/id/456"), Some(&1));
        // literal is structural and never counted
        assert_eq!(concept.features.get("abc"), None);

        assert_eq!(ids.len(), 2);
        assert!(ids.contains("http://snomed.info/id/123"));
    }

    #[test]
    fn test_display_name_fallback_and_null_values() {
        let cas = JsonCas::from_json_str(RECORD).unwrap();
        let (stats, _) = compute_cas_stats(&cas, &excluded());

        let phi = &stats["PHI"];
        assert_eq!(phi.total, 2);
        assert_eq!(phi.features.len(), 1);
        assert_eq!(phi.features.get("NAME"), Some(&1));
    }

    #[test]
    fn test_skipped_types() {
        let cas = JsonCas::from_json_str(RECORD).unwrap();
        let (stats, _) = compute_cas_stats(&cas, &excluded());

        // no semantic features
        assert!(!stats.contains_key("Marker"));
        // excluded by configuration
        assert!(!stats.contains_key("Hidden"));
        assert!(!stats.contains_key("LayerDefinition"));
        assert_eq!(stats.len(), 2);
    }

    #[test]
    fn test_find_display_name() {
        let definition = FeatureStructure {
            id: "1".to_string(),
            type_name: LAYER_DEFINITION_TYPE.to_string(),
            values: [
                ("name".to_string(), "element2".to_string()),
                ("uiName".to_string(), "UI Element 2".to_string()),
            ]
            .into_iter()
            .collect(),
        };

        assert_eq!(find_display_name(&[&definition], "element2"), "UI Element 2");
        assert_eq!(find_display_name(&[&definition], "a.b.element4"), "element4");
        assert_eq!(find_display_name(&[], "element2"), "element2");
    }

    #[test]
    fn test_record_without_layer_definitions() {
        let cas = JsonCas::from_json_str(
            r#"{
                "%TYPES": {"x.y.Entity": {"%SUPER_TYPE": "uima.tcas.Annotation",
                                          "value": {"%RANGE": "uima.cas.String"}}},
                "%FEATURE_STRUCTURES": [{"%ID": 1, "%TYPE": "x.y.Entity", "value": "PER"}]
            }"#,
        )
        .unwrap();

        let (stats, ids) = compute_cas_stats(&cas, &HashSet::new());
        assert_eq!(stats["Entity"].total, 1);
        assert!(ids.is_empty());
    }
}
