//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use crate::models::AggregationMode;
use crate::report::summary::DEFAULT_TOP_N;
use clap::Parser;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// inception-reports - statistics for exported INCEpTION projects
///
/// Reads exported project archives, aggregates annotation statistics per
/// project and writes one JSON report per project.
///
/// Examples:
///   inception-reports ./projects
///   inception-reports ./projects --mode average --curated-only
///   inception-reports ./projects --projects alpha,beta --archive reports.zip
///   inception-reports ./projects --api-url https://inception.example.org --username admin --project-id alpha=7
///   inception-reports --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Directory containing exported project archives (.zip)
    #[arg(value_name = "DIR", required_unless_present = "init_config")]
    pub projects_dir: Option<PathBuf>,

    /// How annotator passes over one document are combined
    #[arg(short, long, value_name = "MODE")]
    pub mode: Option<ModeArg>,

    /// Show statistics for curated documents only
    ///
    /// Falls back to all documents for projects without curated documents.
    /// Exported reports always contain the full counts.
    #[arg(long)]
    pub curated_only: bool,

    /// Only process these projects (archive names up to the first dot)
    ///
    /// Example: --projects alpha,beta
    #[arg(short, long, value_name = "NAMES", value_delimiter = ',')]
    pub projects: Option<Vec<String>>,

    /// Server-side project id used for concept label lookups
    ///
    /// Repeatable. Example: --project-id alpha=7
    #[arg(long = "project-id", value_name = "NAME=ID", value_parser = parse_project_id)]
    pub project_ids: Vec<(String, String)>,

    /// Directory for the exported reports
    #[arg(short, long, value_name = "DIR", env = "INCEPTION_OUTPUT_DIR")]
    pub output: Option<PathBuf>,

    /// Also bundle all reports of this run into a zip archive
    #[arg(long, value_name = "FILE")]
    pub archive: Option<PathBuf>,

    /// Also write a Markdown summary of this run
    #[arg(long, value_name = "FILE")]
    pub summary: Option<PathBuf>,

    /// Number of types and feature values listed per project in the summary
    #[arg(long, default_value_t = DEFAULT_TOP_N, value_name = "N")]
    pub top: usize,

    /// Base URL of the INCEpTION server for concept label lookups
    #[arg(long, value_name = "URL", env = "INCEPTION_API_URL")]
    pub api_url: Option<String>,

    /// User name for the INCEpTION API
    #[arg(long, value_name = "USER", env = "INCEPTION_USERNAME")]
    pub username: Option<String>,

    /// Password for the INCEpTION API
    #[arg(long, value_name = "PASSWORD", env = "INCEPTION_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// CA bundle (PEM) used to verify the server certificate
    #[arg(long, value_name = "FILE")]
    pub ca_bundle: Option<PathBuf>,

    /// Disable TLS certificate verification
    #[arg(long)]
    pub no_verify_ssl: bool,

    /// Number of projects processed concurrently
    #[arg(long, value_name = "NUM")]
    pub concurrency: Option<usize>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .inception_reports.toml in the current
    /// directory, then ~/.inception_reports/config.toml
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// JSON file listing annotation types to ignore
    #[arg(long, value_name = "FILE")]
    pub excluded_types: Option<PathBuf>,

    /// JSON file translating project tags
    #[arg(long, value_name = "FILE")]
    pub translations: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// List the projects that would be processed and exit
    #[arg(long)]
    pub dry_run: bool,

    /// Generate a default .inception_reports.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Aggregation mode as given on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ModeArg {
    Sum,
    Average,
    Max,
}

impl From<ModeArg> for AggregationMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Sum => AggregationMode::Sum,
            ModeArg::Average => AggregationMode::Average,
            ModeArg::Max => AggregationMode::Max,
        }
    }
}

fn parse_project_id(value: &str) -> Result<(String, String), String> {
    match value.split_once('=') {
        Some((name, id)) if !name.trim().is_empty() && !id.trim().is_empty() => {
            Ok((name.trim().to_string(), id.trim().to_string()))
        }
        _ => Err(format!("expected NAME=ID, got '{}'", value)),
    }
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        if let Some(ref projects_dir) = self.projects_dir {
            if !projects_dir.exists() {
                return Err(format!(
                    "Projects directory does not exist: {}",
                    projects_dir.display()
                ));
            }
            if !projects_dir.is_dir() {
                return Err(format!(
                    "Projects path is not a directory: {}",
                    projects_dir.display()
                ));
            }
        }

        if let Some(ref api_url) = self.api_url {
            if api_url.trim().is_empty() {
                return Err("API URL must not be empty".to_string());
            }
        }

        if self.concurrency == Some(0) {
            return Err("Concurrency must be at least 1".to_string());
        }

        if self.top == 0 {
            return Err("--top must be at least 1".to_string());
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if self.no_verify_ssl && self.ca_bundle.is_some() {
            return Err("Cannot use both --ca-bundle and --no-verify-ssl".to_string());
        }

        if let Some(ref ca_bundle) = self.ca_bundle {
            if !ca_bundle.is_file() {
                return Err(format!("CA bundle not found: {}", ca_bundle.display()));
            }
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }

    /// Project ids keyed by project name.
    pub fn project_id_map(&self) -> BTreeMap<String, String> {
        self.project_ids.iter().cloned().collect()
    }
}
