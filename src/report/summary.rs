//! Markdown batch summary.
//!
//! Renders an overview of every project report of a batch: document
//! workflow states, token volume and the top annotation types with their
//! most frequent feature values.

use crate::models::{AggregatedTypeStats, DocumentState, ProjectReport};
use anyhow::Result;
use chrono::NaiveDate;
use std::path::Path;

/// Number of types and feature values shown per project by default.
pub const DEFAULT_TOP_N: usize = 10;

/// Generate the Markdown summary for a batch of reports.
pub fn generate_markdown_summary(reports: &[ProjectReport], created: NaiveDate, top_n: usize) -> String {
    let mut output = String::new();

    output.push_str("# INCEpTION Project Reports\n\n");
    output.push_str(&generate_metadata_section(reports, created));
    output.push_str(&generate_table_of_contents(reports));

    for report in reports {
        output.push_str(&generate_project_section(report, top_n));
    }

    output.push_str(&generate_footer());
    output
}

fn anchor(project_name: &str) -> String {
    project_name.replace(['/', '.', ' ', '_'], "-").to_lowercase()
}

fn generate_metadata_section(reports: &[ProjectReport], created: NaiveDate) -> String {
    let mut section = String::new();

    let documents: u64 = reports
        .iter()
        .flat_map(|report| report.data.doc_categories.values())
        .sum();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!("- **Created:** {}\n", created));
    section.push_str(&format!("- **Projects:** {}\n", reports.len()));
    section.push_str(&format!("- **Documents:** {}\n", documents));
    if let Some(mode) = reports.first().map(|report| report.data.aggregation_mode) {
        section.push_str(&format!("- **Aggregation Mode:** {}\n", mode));
    }
    section.push('\n');

    section
}

fn generate_table_of_contents(reports: &[ProjectReport]) -> String {
    if reports.is_empty() {
        return String::new();
    }

    let mut toc = String::new();
    toc.push_str("## Projects\n\n");
    for report in reports {
        let name = &report.data.project_name;
        toc.push_str(&format!("- [{}](#{})\n", name, anchor(name)));
    }
    toc.push('\n');

    toc
}

fn generate_project_section(report: &ProjectReport, top_n: usize) -> String {
    let data = &report.data;
    let mut section = String::new();

    section.push_str(&format!("## {} {{#{}}}\n\n", data.project_name, anchor(&data.project_name)));

    let mut details = Vec::new();
    if let Some(tags) = data.project_tags.as_ref().filter(|tags| !tags.is_empty()) {
        details.push(format!("Tags: {}", tags.join(", ")));
    }
    if let Some(version) = &data.inception_version {
        details.push(format!("INCEpTION: {}", version));
    }
    details.push(format!(
        "View: {}",
        if report.show_only_curated {
            "curated documents"
        } else {
            "all documents"
        }
    ));
    section.push_str(&format!("*{}*\n\n", details.join(" | ")));

    section.push_str("### Documents\n\n");
    section.push_str("| State | Documents | Tokens |\n");
    section.push_str("|:---|:---:|:---:|\n");
    for state in DocumentState::ALL {
        section.push_str(&format!(
            "| {} | {} | {} |\n",
            state.label(),
            data.doc_categories.get(&state).copied().unwrap_or(0),
            data.doc_token_categories.get(&state).copied().unwrap_or(0)
        ));
    }
    section.push('\n');

    section.push_str(&generate_types_section(report, top_n));
    section.push_str("---\n\n");

    section
}

fn generate_types_section(report: &ProjectReport, top_n: usize) -> String {
    let mut section = String::new();

    section.push_str("### Annotation Types\n\n");
    if report.type_counts.is_empty() {
        section.push_str("No annotations found.\n\n");
        return section;
    }

    section.push_str("| Type | Total | Documents |\n");
    section.push_str("|:---|:---:|:---:|\n");
    for (type_name, stats) in report.type_counts.iter().take(top_n) {
        section.push_str(&format!(
            "| {} | {} | {} |\n",
            type_name,
            stats.total,
            stats.documents.len()
        ));
    }
    section.push('\n');

    for (type_name, stats) in report.type_counts.iter().take(top_n) {
        section.push_str(&generate_feature_block(type_name, stats, top_n));
    }

    section
}

fn generate_feature_block(type_name: &str, stats: &AggregatedTypeStats, top_n: usize) -> String {
    if stats.features.is_empty() {
        return String::new();
    }

    let mut block = String::new();
    block.push_str(&format!("#### {}\n\n", type_name));
    block.push_str("| Value | Count |\n");
    block.push_str("|:---|:---:|\n");
    for (value, documents) in stats.features.iter().take(top_n) {
        block.push_str(&format!("| {} | {} |\n", value, documents.values().sum::<u64>()));
    }
    if stats.features.len() > top_n {
        block.push_str(&format!("\n*{} more values not shown*\n", stats.features.len() - top_n));
    }
    block.push('\n');

    block
}

fn generate_footer() -> String {
    format!(
        "*Generated by inception-reports v{}*\n",
        env!("CARGO_PKG_VERSION")
    )
}

/// Write the summary to a file.
pub fn write_summary(reports: &[ProjectReport], created: NaiveDate, top_n: usize, path: &Path) -> Result<()> {
    let content = generate_markdown_summary(reports, created, top_n);
    crate::report::export::write_atomically(path, content.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AggregatedTypeCounts, AggregationMode, ExportedProjectData, ExportedTypeCounts, Ranked};
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn type_stats(total: u64, features: &[(&str, u64)]) -> AggregatedTypeStats {
        let mut ranked = Ranked::new();
        for (value, count) in features {
            ranked.push(*value, [("doc1".to_string(), *count)].into_iter().collect());
        }
        AggregatedTypeStats {
            total,
            documents: [("doc1".to_string(), total)].into_iter().collect(),
            features: ranked,
        }
    }

    fn create_test_report() -> ProjectReport {
        let mut type_counts = AggregatedTypeCounts::new();
        type_counts.push("Token", type_stats(120, &[]));
        type_counts.push("NamedEntity", type_stats(7, &[("PER", 4), ("LOC", 2), ("ORG", 1)]));
        type_counts.push("Sentence", type_stats(3, &[]));

        let doc_categories: BTreeMap<DocumentState, u64> = DocumentState::ALL
            .iter()
            .map(|state| (*state, u64::from(*state == DocumentState::CurationFinished)))
            .collect();

        ProjectReport {
            data: ExportedProjectData {
                project_name: "alpha.v2".to_string(),
                project_tags: Some(vec!["clinical".to_string()]),
                doc_token_categories: doc_categories.clone(),
                doc_categories,
                type_counts: ExportedTypeCounts::new(),
                aggregation_mode: AggregationMode::Average,
                created: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                inception_version: Some("38.4".to_string()),
                dashboard_version: None,
            },
            type_counts,
            show_only_curated: true,
            has_curated_documents: true,
        }
    }

    #[test]
    fn test_generate_markdown_summary() {
        let created = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let markdown = generate_markdown_summary(&[create_test_report()], created, DEFAULT_TOP_N);

        assert!(markdown.contains("# INCEpTION Project Reports"));
        assert!(markdown.contains("- **Projects:** 1"));
        assert!(markdown.contains("- **Aggregation Mode:** Average"));
        assert!(markdown.contains("[alpha.v2](#alpha-v2)"));
        assert!(markdown.contains("| Curation Finished | 1 | 1 |"));
        assert!(markdown.contains("View: curated documents"));
        assert!(markdown.contains("| NamedEntity | 7 | 1 |"));
        assert!(markdown.contains("| PER | 4 |"));
    }

    #[test]
    fn test_top_n_limits_types_and_values() {
        let created = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let markdown = generate_markdown_summary(&[create_test_report()], created, 2);

        assert!(markdown.contains("| Token | 120 | 1 |"));
        assert!(!markdown.contains("| Sentence |"));
        assert!(markdown.contains("| LOC | 2 |"));
        assert!(!markdown.contains("| ORG |"));
        assert!(markdown.contains("1 more values not shown"));
    }

    #[test]
    fn test_empty_type_counts() {
        let mut report = create_test_report();
        report.type_counts = AggregatedTypeCounts::new();

        let section = generate_types_section(&report, DEFAULT_TOP_N);
        assert!(section.contains("No annotations found."));
    }

    #[test]
    fn test_write_summary() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("summary.md");
        let created = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();

        write_summary(&[create_test_report()], created, DEFAULT_TOP_N, &path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("# INCEpTION Project Reports"));
    }
}
