//! Curated-document views.

use crate::models::{AggregatedTypeCounts, AggregatedTypeStats, DocumentState, ProjectDocument};
use std::collections::{BTreeMap, BTreeSet};

/// Names of all documents whose curation is finished.
pub fn get_curated_document_names(documents: &[ProjectDocument]) -> BTreeSet<String> {
    documents
        .iter()
        .filter(|document| document.state == DocumentState::CurationFinished)
        .map(|document| document.name.clone())
        .collect()
}

/// Restrict type counts to a set of documents.
///
/// Types and feature values left without documents are dropped, totals are
/// recomputed from the retained documents. Ranking order is preserved.
pub fn filter_type_counts_to_documents(
    type_counts: &AggregatedTypeCounts,
    allowed_documents: &BTreeSet<String>,
) -> AggregatedTypeCounts {
    let keep = |documents: &BTreeMap<String, u64>| -> BTreeMap<String, u64> {
        documents
            .iter()
            .filter(|(name, _)| allowed_documents.contains(name.as_str()))
            .map(|(name, count)| (name.clone(), *count))
            .collect()
    };

    type_counts
        .iter()
        .filter_map(|(type_name, stats)| {
            let documents = keep(&stats.documents);
            if documents.is_empty() {
                return None;
            }

            let features = stats
                .features
                .iter()
                .filter_map(|(feature, feature_documents)| {
                    let matching = keep(feature_documents);
                    (!matching.is_empty()).then(|| (feature.to_string(), matching))
                })
                .collect();

            Some((
                type_name.to_string(),
                AggregatedTypeStats {
                    total: documents.values().sum(),
                    documents,
                    features,
                },
            ))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Ranked;

    fn doc_counts(entries: &[(&str, u64)]) -> BTreeMap<String, u64> {
        entries
            .iter()
            .map(|(name, count)| (name.to_string(), *count))
            .collect()
    }

    fn sample_counts() -> AggregatedTypeCounts {
        let mut ne_features = Ranked::new();
        ne_features.push("PER", doc_counts(&[("doc1", 2), ("doc2", 5)]));
        ne_features.push("LOC", doc_counts(&[("doc2", 1)]));

        let mut counts = AggregatedTypeCounts::new();
        counts.push(
            "NE",
            AggregatedTypeStats {
                total: 8,
                documents: doc_counts(&[("doc1", 2), ("doc2", 6)]),
                features: ne_features,
            },
        );
        counts.push(
            "Draft",
            AggregatedTypeStats {
                total: 1,
                documents: doc_counts(&[("doc2", 1)]),
                features: Ranked::new(),
            },
        );
        counts
    }

    #[test]
    fn test_curated_document_names() {
        let documents = vec![
            ProjectDocument::new("a", DocumentState::CurationFinished),
            ProjectDocument::new("b", DocumentState::CurationInProgress),
            ProjectDocument::new("c", DocumentState::CurationFinished),
        ];

        let names = get_curated_document_names(&documents);
        assert_eq!(names.into_iter().collect::<Vec<_>>(), vec!["a", "c"]);
    }

    #[test]
    fn test_filter_recomputes_totals_and_drops_empty() {
        let allowed: BTreeSet<String> = ["doc1".to_string()].into_iter().collect();
        let filtered = filter_type_counts_to_documents(&sample_counts(), &allowed);

        assert_eq!(filtered.len(), 1);
        let ne = &filtered["NE"];
        assert_eq!(ne.total, 2);
        assert_eq!(ne.documents, doc_counts(&[("doc1", 2)]));
        assert_eq!(ne.features.keys().collect::<Vec<_>>(), vec!["PER"]);
        assert!(!filtered.contains_key("Draft"));
    }

    #[test]
    fn test_filter_is_idempotent() {
        let allowed: BTreeSet<String> = ["doc2".to_string()].into_iter().collect();
        let once = filter_type_counts_to_documents(&sample_counts(), &allowed);
        let twice = filter_type_counts_to_documents(&once, &allowed);

        assert_eq!(once, twice);
        assert_eq!(once.keys().collect::<Vec<_>>(), vec!["NE", "Draft"]);
    }

    #[test]
    fn test_filter_with_empty_set() {
        let filtered = filter_type_counts_to_documents(&sample_counts(), &BTreeSet::new());
        assert!(filtered.is_empty());
    }
}
