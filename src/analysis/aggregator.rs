//! Annotation statistics aggregation.
//!
//! Per document, the annotators' `CasStats` are combined with an
//! `AggregationMode`; the per-document results are then rolled up into
//! project-wide `AggregatedTypeCounts`. Every step returns a new value,
//! inputs are never modified.

use crate::models::{
    AggregatedTypeCounts, AggregatedTypeStats, AggregationMode, CasStats, CasTypeStats,
    ProjectAnnotations, Ranked,
};
use std::collections::BTreeMap;

/// Display name of the concept layer whose feature values are identifiers.
pub const CONCEPT_DISPLAY_NAME: &str = "Concept";

/// Element-wise sum of totals and feature counts.
pub fn merge_counts(counts_list: &[&CasStats]) -> CasStats {
    let mut merged = CasStats::new();

    for counts in counts_list {
        for (type_name, values) in counts.iter() {
            let entry = merged.entry(type_name.clone()).or_default();
            entry.total += values.total;
            for (feature, count) in &values.features {
                *entry.features.entry(feature.clone()).or_insert(0) += count;
            }
        }
    }

    merged
}

/// Integer division rounding half up: 2.5 -> 3, 2.4 -> 2.
fn divide_rounded(value: u64, divisor: u64) -> u64 {
    (2 * value + divisor) / (2 * divisor)
}

/// Sum divided by the number of annotators, rounded half up.
///
/// An empty input yields empty statistics.
pub fn average_counts(counts_list: &[&CasStats]) -> CasStats {
    if counts_list.is_empty() {
        return CasStats::new();
    }

    let divisor = counts_list.len() as u64;
    merge_counts(counts_list)
        .into_iter()
        .map(|(type_name, values)| {
            let features = values
                .features
                .into_iter()
                .map(|(feature, count)| (feature, divide_rounded(count, divisor)))
                .collect();
            (
                type_name,
                CasTypeStats::new(divide_rounded(values.total, divisor), features),
            )
        })
        .collect()
}

/// The annotator pass with the greatest combined total, first one on ties.
///
/// An empty input yields empty statistics.
pub fn max_counts(counts_list: &[&CasStats]) -> CasStats {
    let mut best: Option<(&CasStats, u64)> = None;

    for counts in counts_list {
        let total: u64 = counts.values().map(|values| values.total).sum();
        if best.map_or(true, |(_, best_total)| total > best_total) {
            best = Some((*counts, total));
        }
    }

    best.map(|(counts, _)| counts.clone()).unwrap_or_default()
}

/// Combine one document's annotator passes according to the mode.
pub fn aggregate_document_counts(counts_list: &[&CasStats], mode: AggregationMode) -> CasStats {
    match mode {
        AggregationMode::Sum => merge_counts(counts_list),
        AggregationMode::Average => average_counts(counts_list),
        AggregationMode::Max => max_counts(counts_list),
    }
}

/// Replace concept identifiers with their labels.
///
/// Unresolved identifiers keep their raw value; identifiers sharing a label
/// have their counts added up.
pub fn apply_concept_labels(mut counts: CasStats, labels: &BTreeMap<String, String>) -> CasStats {
    if labels.is_empty() {
        return counts;
    }

    if let Some(concept) = counts.get_mut(CONCEPT_DISPLAY_NAME) {
        let mut relabeled: BTreeMap<String, u64> = BTreeMap::new();
        for (raw_value, count) in std::mem::take(&mut concept.features) {
            let label = labels.get(&raw_value).cloned().unwrap_or(raw_value);
            *relabeled.entry(label).or_insert(0) += count;
        }
        concept.features = relabeled;
    }

    counts
}

/// Roll per-document statistics up into project-wide type counts.
///
/// Types are ranked by descending total and, within a type, feature values
/// by descending overall occurrence. Tied feature values keep the order in
/// which they first appear, walking documents by name and the values of one
/// document alphabetically.
/// Documents without annotator passes contribute nothing.
pub fn get_type_counts(
    annotations: &ProjectAnnotations,
    labels: &BTreeMap<String, String>,
    mode: AggregationMode,
) -> AggregatedTypeCounts {
    let mut type_counts: BTreeMap<String, AggregatedTypeStats> = BTreeMap::new();
    let mut feature_order: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut feature_documents: BTreeMap<(String, String), BTreeMap<String, u64>> = BTreeMap::new();

    for (document_name, annotators) in annotations {
        let counts_list: Vec<&CasStats> = annotators.values().collect();
        if counts_list.is_empty() {
            continue;
        }

        let combined = apply_concept_labels(aggregate_document_counts(&counts_list, mode), labels);

        for (type_name, values) in combined {
            let entry = type_counts.entry(type_name.clone()).or_default();
            entry.total += values.total;
            entry.documents.insert(document_name.clone(), values.total);

            for (feature, count) in values.features {
                let key = (type_name.clone(), feature.clone());
                let documents = feature_documents.entry(key).or_insert_with(|| {
                    feature_order
                        .entry(type_name.clone())
                        .or_default()
                        .push(feature);
                    BTreeMap::new()
                });
                documents.insert(document_name.clone(), count);
            }
        }
    }

    let mut ranked: AggregatedTypeCounts = type_counts
        .into_iter()
        .map(|(type_name, mut stats)| {
            let mut features: Ranked<BTreeMap<String, u64>> = feature_order
                .remove(&type_name)
                .unwrap_or_default()
                .into_iter()
                .filter_map(|feature| {
                    let key = (type_name.clone(), feature.clone());
                    feature_documents
                        .remove(&key)
                        .map(|documents| (feature, documents))
                })
                .collect();
            features.rank_by(|documents| documents.values().sum::<u64>());
            stats.features = features;
            (type_name, stats)
        })
        .collect();

    ranked.rank_by(|stats| stats.total);
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AnnotatorStats;

    fn stats(entries: &[(&str, u64, Vec<(&str, u64)>)]) -> CasStats {
        entries
            .iter()
            .map(|(name, total, features)| {
                let features = features
                    .iter()
                    .map(|(value, count)| (value.to_string(), *count))
                    .collect();
                (name.to_string(), CasTypeStats::new(*total, features))
            })
            .collect()
    }

    fn annotators(entries: Vec<(&str, CasStats)>) -> AnnotatorStats {
        entries
            .into_iter()
            .map(|(name, counts)| (name.to_string(), counts))
            .collect()
    }

    #[test]
    fn test_sum_adds_totals_and_features() {
        let a = stats(&[("NE", 3, vec![("PER", 2), ("LOC", 1)])]);
        let b = stats(&[("NE", 2, vec![("PER", 1)]), ("POS", 4, vec![("NN", 4)])]);

        let merged = aggregate_document_counts(&[&a, &b], AggregationMode::Sum);

        assert_eq!(merged["NE"].total, 5);
        assert_eq!(merged["NE"].features["PER"], 3);
        assert_eq!(merged["NE"].features["LOC"], 1);
        assert_eq!(merged["POS"].total, 4);
    }

    #[test]
    fn test_average_rounds_half_up() {
        let a = stats(&[("NE", 3, vec![("PER", 1)])]);
        let b = stats(&[("NE", 2, vec![("PER", 2)])]);

        let averaged = aggregate_document_counts(&[&a, &b], AggregationMode::Average);

        // 5 / 2 = 2.5 -> 3, 3 / 2 = 1.5 -> 2
        assert_eq!(averaged["NE"].total, 3);
        assert_eq!(averaged["NE"].features["PER"], 2);

        let c = stats(&[("NE", 1, vec![])]);
        let averaged = aggregate_document_counts(&[&a, &b, &c], AggregationMode::Average);
        // 6 / 3 = 2
        assert_eq!(averaged["NE"].total, 2);
    }

    #[test]
    fn test_average_within_bounds() {
        let inputs = [
            stats(&[("T", 1, vec![])]),
            stats(&[("T", 7, vec![])]),
            stats(&[("T", 4, vec![])]),
            stats(&[("T", 2, vec![])]),
        ];
        let refs: Vec<&CasStats> = inputs.iter().collect();

        let averaged = average_counts(&refs);
        let total = averaged["T"].total;
        assert!((1..=7).contains(&total));
        assert_eq!(total, 4); // 14 / 4 = 3.5 -> 4
    }

    #[test]
    fn test_max_selects_single_pass() {
        let a = stats(&[("NE", 3, vec![("PER", 3)])]);
        let b = stats(&[("NE", 2, vec![("LOC", 2)]), ("POS", 2, vec![])]);
        let c = stats(&[("NE", 4, vec![("ORG", 4)])]);

        let best = aggregate_document_counts(&[&a, &b, &c], AggregationMode::Max);
        // b and c tie at 4; the first one wins
        assert_eq!(best, b);
    }

    #[test]
    fn test_empty_inputs() {
        for mode in [AggregationMode::Sum, AggregationMode::Average, AggregationMode::Max] {
            assert!(aggregate_document_counts(&[], mode).is_empty());
        }
    }

    #[test]
    fn test_concept_labels_merge_counts() {
        let counts = stats(&[
            ("Concept", 4, vec![("id:1", 1), ("id:2", 2), ("id:3", 1)]),
            ("Other", 1, vec![("id:1", 1)]),
        ]);
        let labels: BTreeMap<String, String> = [
            ("id:1".to_string(), "disorder".to_string()),
            ("id:2".to_string(), "disorder".to_string()),
        ]
        .into_iter()
        .collect();

        let labeled = apply_concept_labels(counts, &labels);

        assert_eq!(labeled["Concept"].features["disorder"], 3);
        assert_eq!(labeled["Concept"].features["id:3"], 1);
        assert_eq!(labeled["Concept"].total, 4);
        // only the concept layer is relabeled
        assert_eq!(labeled["Other"].features["id:1"], 1);
    }

    #[test]
    fn test_roll_up_and_ordering() {
        let mut annotations = ProjectAnnotations::new();
        annotations.insert(
            "doc1".to_string(),
            annotators(vec![(
                "ann1",
                stats(&[("Token", 10, vec![]), ("NE", 3, vec![("LOC", 1), ("PER", 2)])]),
            )]),
        );
        annotations.insert(
            "doc2".to_string(),
            annotators(vec![(
                "ann1",
                stats(&[("Token", 5, vec![]), ("NE", 4, vec![("LOC", 4)])]),
            )]),
        );
        annotations.insert("doc3".to_string(), AnnotatorStats::new());

        let counts = get_type_counts(&annotations, &BTreeMap::new(), AggregationMode::Sum);

        assert_eq!(counts.keys().collect::<Vec<_>>(), vec!["Token", "NE"]);

        let ne = &counts["NE"];
        assert_eq!(ne.total, 7);
        assert_eq!(ne.documents.get("doc1"), Some(&3));
        assert_eq!(ne.documents.get("doc2"), Some(&4));
        assert!(!ne.documents.contains_key("doc3"));
        assert_eq!(ne.features.keys().collect::<Vec<_>>(), vec!["LOC", "PER"]);
        assert_eq!(ne.features["LOC"].get("doc2"), Some(&4));

        for (_, stats) in counts.iter() {
            assert_eq!(stats.total, stats.documents.values().sum::<u64>());
        }
    }

    #[test]
    fn test_feature_values_ranked_by_occurrence() {
        let mut annotations = ProjectAnnotations::new();
        annotations.insert(
            "doc1".to_string(),
            annotators(vec![("ann1", stats(&[("NE", 3, vec![("AAA", 1), ("ZZZ", 2)])]))]),
        );

        let counts = get_type_counts(&annotations, &BTreeMap::new(), AggregationMode::Sum);

        assert_eq!(counts["NE"].features.keys().collect::<Vec<_>>(), vec!["ZZZ", "AAA"]);
    }

    #[test]
    fn test_feature_ranking_spans_documents() {
        let mut annotations = ProjectAnnotations::new();
        // doc1 alone would rank BBB before CCC
        annotations.insert(
            "doc1".to_string(),
            annotators(vec![("ann1", stats(&[("NE", 5, vec![("BBB", 4), ("CCC", 1)])]))]),
        );
        annotations.insert(
            "doc2".to_string(),
            annotators(vec![("ann1", stats(&[("NE", 8, vec![("AAA", 2), ("CCC", 6)])]))]),
        );

        let counts = get_type_counts(&annotations, &BTreeMap::new(), AggregationMode::Sum);
        let features = &counts["NE"].features;

        assert_eq!(features.keys().collect::<Vec<_>>(), vec!["CCC", "BBB", "AAA"]);
        assert_eq!(features["CCC"].get("doc1"), Some(&1));
        assert_eq!(features["CCC"].get("doc2"), Some(&6));
    }

    #[test]
    fn test_tied_feature_values_keep_first_appearance() {
        let mut annotations = ProjectAnnotations::new();
        annotations.insert(
            "doc1".to_string(),
            annotators(vec![("ann1", stats(&[("NE", 2, vec![("ZZZ", 1), ("MMM", 1)])]))]),
        );
        annotations.insert(
            "doc2".to_string(),
            annotators(vec![("ann1", stats(&[("NE", 1, vec![("AAA", 1)])]))]),
        );

        let counts = get_type_counts(&annotations, &BTreeMap::new(), AggregationMode::Sum);

        // doc1 before doc2, values of doc1 alphabetically
        assert_eq!(
            counts["NE"].features.keys().collect::<Vec<_>>(),
            vec!["MMM", "ZZZ", "AAA"]
        );
    }

    #[test]
    fn test_roll_up_applies_labels_per_document() {
        let mut annotations = ProjectAnnotations::new();
        annotations.insert(
            "doc1".to_string(),
            annotators(vec![("ann1", stats(&[("Concept", 2, vec![("SNOMED:123", 2)])]))]),
        );
        let labels: BTreeMap<String, String> =
            [("SNOMED:123".to_string(), "disorder".to_string())].into_iter().collect();

        let counts = get_type_counts(&annotations, &labels, AggregationMode::Sum);

        assert_eq!(counts["Concept"].features["disorder"].get("doc1"), Some(&2));
        assert!(!counts["Concept"].features.contains_key("SNOMED:123"));
    }
}
