//! Project report construction.
//!
//! Combines document workflow states, token volume and the aggregated type
//! counts into one `ExportedProjectData`, and selects the view (full or
//! curated-only) used for display.

use crate::analysis::{filter_type_counts_to_documents, get_curated_document_names, get_type_counts};
use crate::models::{
    AggregatedTypeCounts, AggregationMode, DocumentState, ExportedProjectData, ExportedTypeCounts,
    ExportedTypeSummary, LoadedProject, ProjectDocument, ProjectReport, Ranked,
};
use crate::report::export::normalize_project_name;
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

/// Types whose feature breakdown is included in exports.
pub const FEATURE_BREAKDOWN_EXPORT_TYPES: [&str; 2] = ["PHI", "Concept"];

/// Type whose per-document totals measure text volume.
pub const TOKEN_TYPE: &str = "Token";

/// Options for building a report.
#[derive(Debug, Clone)]
pub struct ReportOptions {
    pub aggregation_mode: AggregationMode,
    pub dashboard_version: Option<String>,
    pub show_only_curated: bool,
    pub created: NaiveDate,
}

fn empty_state_counts() -> BTreeMap<DocumentState, u64> {
    DocumentState::ALL.iter().map(|state| (*state, 0)).collect()
}

/// Number of documents per workflow state. All five states are present.
pub fn summarize_document_categories(documents: &[ProjectDocument]) -> BTreeMap<DocumentState, u64> {
    let mut categories = empty_state_counts();
    for document in documents {
        if let Some(count) = categories.get_mut(&document.state) {
            *count += 1;
        }
    }
    categories
}

/// Token annotations per workflow state. All five states are present.
pub fn summarize_token_categories(
    documents: &[ProjectDocument],
    type_counts: &AggregatedTypeCounts,
) -> BTreeMap<DocumentState, u64> {
    let mut categories = empty_state_counts();
    let Some(tokens) = type_counts.get(TOKEN_TYPE) else {
        return categories;
    };

    for document in documents {
        if let Some(count) = categories.get_mut(&document.state) {
            *count += tokens.documents.get(&document.name).copied().unwrap_or(0);
        }
    }
    categories
}

/// Collapse per-document counts into per-state counts for export.
///
/// Documents missing from the metadata are counted under `UNKNOWN`.
pub fn build_exported_type_counts(
    type_counts: &AggregatedTypeCounts,
    documents: &[ProjectDocument],
) -> ExportedTypeCounts {
    let states: HashMap<&str, DocumentState> = documents
        .iter()
        .map(|document| (document.name.as_str(), document.state))
        .collect();
    let state_of = |name: &str| states.get(name).copied().unwrap_or(DocumentState::Unknown);

    type_counts
        .iter()
        .map(|(type_name, details)| {
            let mut total_by_status = BTreeMap::new();
            for (document_name, count) in &details.documents {
                *total_by_status.entry(state_of(document_name.as_str())).or_insert(0) += count;
            }

            let features = FEATURE_BREAKDOWN_EXPORT_TYPES
                .contains(&type_name)
                .then(|| {
                    details
                        .features
                        .iter()
                        .map(|(feature, document_counts)| {
                            let mut by_state = BTreeMap::new();
                            for (document_name, count) in document_counts {
                                *by_state.entry(state_of(document_name.as_str())).or_insert(0) += count;
                            }
                            (feature.to_string(), by_state)
                        })
                        .collect::<Ranked<_>>()
                });

            (
                type_name.to_string(),
                ExportedTypeSummary {
                    total: details.total,
                    total_by_status,
                    features,
                },
            )
        })
        .collect()
}

/// Build the report for one project.
///
/// The export always uses the full counts. The display view is restricted
/// to curated documents only when requested and at least one exists;
/// otherwise it falls back to the full counts.
pub fn build_project_report(project: &LoadedProject, options: &ReportOptions) -> ProjectReport {
    let full_type_counts = get_type_counts(
        &project.annotations,
        &project.snomed_labels,
        options.aggregation_mode,
    );

    let curated_documents = get_curated_document_names(&project.documents);
    let has_curated_documents = !curated_documents.is_empty();
    let use_curated_documents = options.show_only_curated && has_curated_documents;

    if options.show_only_curated && !has_curated_documents {
        warn!(
            "No curated documents in {}; showing all documents instead",
            project.name
        );
    }

    let type_counts = if use_curated_documents {
        filter_type_counts_to_documents(&full_type_counts, &curated_documents)
    } else {
        full_type_counts.clone()
    };

    debug!(
        "Built report for {}: {} types, {} curated documents",
        project.name,
        full_type_counts.len(),
        curated_documents.len()
    );

    let data = ExportedProjectData {
        project_name: normalize_project_name(&project.name),
        project_tags: project.tags.clone(),
        doc_categories: summarize_document_categories(&project.documents),
        doc_token_categories: summarize_token_categories(&project.documents, &full_type_counts),
        type_counts: build_exported_type_counts(&full_type_counts, &project.documents),
        aggregation_mode: options.aggregation_mode,
        created: options.created,
        inception_version: project.inception_version.clone(),
        dashboard_version: options.dashboard_version.clone(),
    };

    ProjectReport {
        data,
        type_counts,
        show_only_curated: use_curated_documents,
        has_curated_documents,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AnnotatorStats, CasStats, CasTypeStats, ProjectAnnotations};

    fn cas(entries: &[(&str, u64, &str, u64)]) -> CasStats {
        entries
            .iter()
            .map(|(type_name, total, feature, count)| {
                let features = [(feature.to_string(), *count)].into_iter().collect();
                (type_name.to_string(), CasTypeStats::new(*total, features))
            })
            .collect()
    }

    fn single_annotator(stats: CasStats) -> AnnotatorStats {
        [("ann1".to_string(), stats)].into_iter().collect()
    }

    fn project(doc1_state: DocumentState) -> LoadedProject {
        let mut annotations = ProjectAnnotations::new();
        annotations.insert(
            "doc1.txt".to_string(),
            single_annotator(cas(&[("Token", 10, "token", 10), ("Concept", 2, "SNOMED:123", 2)])),
        );
        annotations.insert(
            "doc2.txt".to_string(),
            single_annotator(cas(&[("Token", 5, "token", 5), ("Concept", 1, "SNOMED:456", 1)])),
        );

        LoadedProject {
            name: "project_one.zip".to_string(),
            tags: Some(vec!["tag1".to_string()]),
            documents: vec![
                ProjectDocument::new("doc1.txt", doc1_state),
                ProjectDocument::new("doc2.txt", DocumentState::AnnotationInProgress),
            ],
            annotations,
            snomed_labels: [
                ("SNOMED:123".to_string(), "disorder".to_string()),
                ("SNOMED:456".to_string(), "finding".to_string()),
            ]
            .into_iter()
            .collect(),
            inception_version: Some("38.4".to_string()),
        }
    }

    fn options(show_only_curated: bool) -> ReportOptions {
        ReportOptions {
            aggregation_mode: AggregationMode::Sum,
            dashboard_version: Some("0.9.7".to_string()),
            show_only_curated,
            created: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
        }
    }

    #[test]
    fn test_report_filters_to_curated_documents() {
        let report = build_project_report(&project(DocumentState::CurationFinished), &options(true));

        assert!(report.show_only_curated);
        assert!(report.has_curated_documents);
        assert_eq!(
            report.type_counts["Token"].documents,
            [("doc1.txt".to_string(), 10)].into_iter().collect::<BTreeMap<_, _>>()
        );
        assert_eq!(report.data.doc_token_categories[&DocumentState::CurationFinished], 10);

        let concept_features = report.data.type_counts["Concept"].features.as_ref().unwrap();
        assert_eq!(
            concept_features["disorder"],
            [(DocumentState::CurationFinished, 2)].into_iter().collect::<BTreeMap<_, _>>()
        );
    }

    #[test]
    fn test_report_falls_back_without_curated_documents() {
        let project = project(DocumentState::AnnotationInProgress);
        let report = build_project_report(&project, &options(true));

        assert!(!report.show_only_curated);
        assert!(!report.has_curated_documents);

        let full = get_type_counts(&project.annotations, &project.snomed_labels, AggregationMode::Sum);
        assert_eq!(report.type_counts, full);
        assert_eq!(report.type_counts["Token"].documents.len(), 2);
    }

    #[test]
    fn test_export_uses_full_counts() {
        let report = build_project_report(&project(DocumentState::CurationFinished), &options(true));

        let token = &report.data.type_counts["Token"];
        assert_eq!(token.total, 15);
        assert_eq!(token.total_by_status[&DocumentState::CurationFinished], 10);
        assert_eq!(token.total_by_status[&DocumentState::AnnotationInProgress], 5);
        // no feature breakdown outside the allow-list
        assert!(token.features.is_none());
    }

    #[test]
    fn test_report_metadata() {
        let report = build_project_report(&project(DocumentState::New), &options(false));

        assert_eq!(report.data.project_name, "project_one");
        assert_eq!(report.data.project_tags, Some(vec!["tag1".to_string()]));
        assert_eq!(report.data.aggregation_mode, AggregationMode::Sum);
        assert_eq!(report.data.created.to_string(), "2024-01-02");
        assert_eq!(report.data.inception_version.as_deref(), Some("38.4"));
        assert_eq!(report.data.dashboard_version.as_deref(), Some("0.9.7"));
        assert!(!report.show_only_curated);
        assert!(!report.has_curated_documents);
    }

    #[test]
    fn test_document_categories_always_have_all_states() {
        let documents = vec![
            ProjectDocument::new("a", DocumentState::New),
            ProjectDocument::new("b", DocumentState::New),
            ProjectDocument::new("c", DocumentState::Unknown),
        ];

        let categories = summarize_document_categories(&documents);
        assert_eq!(categories.len(), 5);
        assert_eq!(categories[&DocumentState::New], 2);
        assert_eq!(categories[&DocumentState::CurationFinished], 0);
        assert!(!categories.contains_key(&DocumentState::Unknown));

        let tokens = summarize_token_categories(&documents, &AggregatedTypeCounts::new());
        assert!(tokens.values().all(|count| *count == 0));
    }

    #[test]
    fn test_unlisted_document_goes_to_unknown() {
        let mut project = project(DocumentState::New);
        project.documents.pop();

        let exported = build_exported_type_counts(
            &get_type_counts(&project.annotations, &BTreeMap::new(), AggregationMode::Sum),
            &project.documents,
        );

        assert_eq!(exported["Token"].total_by_status[&DocumentState::Unknown], 5);
        let concept_features = exported["Concept"].features.as_ref().unwrap();
        assert_eq!(
            concept_features["SNOMED:456"],
            [(DocumentState::Unknown, 1)].into_iter().collect::<BTreeMap<_, _>>()
        );
    }
}
