//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.inception_reports.toml` files, and the JSON data files for excluded
//! annotation types and tag translations.

use crate::labels::{LabelSettings, DEFAULT_BATCH_SIZE};
use crate::models::AggregationMode;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const CONFIG_FILE_NAME: &str = ".inception_reports.toml";
pub const HOME_DIRECTORY_NAME: &str = ".inception_reports";
pub const HOME_CONFIG_FILE_NAME: &str = "config.toml";
pub const EXCLUDED_TYPES_FILE_NAME: &str = "excluded_types.json";
pub const DEFAULT_OUTPUT_DIRECTORY: &str = "exported_project_data";

const DEFAULT_EXCLUDED_TYPES: &str = include_str!("../data/excluded_types.json");
const DEFAULT_TAG_TRANSLATIONS: &str = include_str!("../data/tag_translations.json");

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub aggregation: AggregationConfig,

    #[serde(default)]
    pub data: DataConfig,

    #[serde(default)]
    pub labels: LabelsConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Directory for exported reports.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Number of projects processed concurrently.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            concurrency: default_concurrency(),
        }
    }
}

fn default_output_dir() -> String {
    DEFAULT_OUTPUT_DIRECTORY.to_string()
}

fn default_concurrency() -> usize {
    4
}

/// Aggregation settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AggregationConfig {
    #[serde(default)]
    pub mode: AggregationMode,

    /// Show curated documents only (display view).
    #[serde(default)]
    pub show_only_curated: bool,
}

/// Data file locations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DataConfig {
    /// Defaults to `~/.inception_reports/excluded_types.json`.
    #[serde(default)]
    pub excluded_types_file: Option<String>,

    /// Defaults to the packaged translation table.
    #[serde(default)]
    pub translations_file: Option<String>,
}

/// Concept label lookup settings. The password is never read from file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelsConfig {
    #[serde(default)]
    pub api_url: Option<String>,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_true")]
    pub verify_ssl: bool,

    #[serde(default)]
    pub ca_bundle: Option<String>,
}

impl Default for LabelsConfig {
    fn default() -> Self {
        Self {
            api_url: None,
            username: None,
            batch_size: default_batch_size(),
            verify_ssl: true,
            ca_bundle: None,
        }
    }
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct ExcludedTypesFile {
    #[serde(default)]
    excluded_types: Vec<String>,
}

/// `~/.inception_reports`, if a home directory is known.
pub fn home_directory() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(HOME_DIRECTORY_NAME))
}

fn parse_excluded_types(content: &str) -> Result<HashSet<String>> {
    let file: ExcludedTypesFile = serde_json::from_str(content)?;
    Ok(file.excluded_types.into_iter().collect())
}

/// Copy the packaged excluded-types file into `directory` unless present.
pub fn ensure_default_excluded_types(directory: &Path) -> Result<PathBuf> {
    let path = directory.join(EXCLUDED_TYPES_FILE_NAME);
    if path.exists() {
        return Ok(path);
    }

    std::fs::create_dir_all(directory)
        .with_context(|| format!("Failed to create {}", directory.display()))?;
    std::fs::write(&path, DEFAULT_EXCLUDED_TYPES)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    info!("Copied default {} to {}", EXCLUDED_TYPES_FILE_NAME, path.display());

    Ok(path)
}

/// Read an excluded-types file. An unreadable file yields an empty set.
pub fn read_excluded_types(path: &Path) -> HashSet<String> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            warn!("Could not read {}: {}", path.display(), e);
            return HashSet::new();
        }
    };

    parse_excluded_types(&content).unwrap_or_else(|e| {
        warn!("Could not parse {}: {}", path.display(), e);
        HashSet::new()
    })
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try the default locations: the working directory, then the home
    /// directory.
    ///
    /// Returns `Ok(None)` if no file exists, `Err` if one exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let local = Path::new(CONFIG_FILE_NAME);
        if local.exists() {
            return Ok(Some(Self::load(local)?));
        }

        match home_directory().map(|home| home.join(HOME_CONFIG_FILE_NAME)) {
            Some(path) if path.exists() => Ok(Some(Self::load(&path)?)),
            _ => Ok(None),
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings.
    /// This method only overrides config when CLI provides explicit values.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(mode) = args.mode {
            self.aggregation.mode = mode.into();
        }
        if args.curated_only {
            self.aggregation.show_only_curated = true;
        }

        if let Some(ref output) = args.output {
            self.general.output_dir = output.display().to_string();
        }
        if let Some(concurrency) = args.concurrency {
            self.general.concurrency = concurrency;
        }

        if let Some(ref path) = args.excluded_types {
            self.data.excluded_types_file = Some(path.display().to_string());
        }
        if let Some(ref path) = args.translations {
            self.data.translations_file = Some(path.display().to_string());
        }

        if let Some(ref api_url) = args.api_url {
            self.labels.api_url = Some(api_url.clone());
        }
        if let Some(ref username) = args.username {
            self.labels.username = Some(username.clone());
        }
        if let Some(ref ca_bundle) = args.ca_bundle {
            self.labels.ca_bundle = Some(ca_bundle.display().to_string());
        }
        if args.no_verify_ssl {
            self.labels.verify_ssl = false;
        }
    }

    pub fn output_directory(&self) -> PathBuf {
        PathBuf::from(&self.general.output_dir)
    }

    /// Annotation types to ignore.
    ///
    /// Uses the configured file, else the user file in the home directory
    /// (created from the packaged default on first use).
    pub fn load_excluded_types(&self) -> HashSet<String> {
        if let Some(ref path) = self.data.excluded_types_file {
            return read_excluded_types(Path::new(path));
        }

        let user_file = home_directory().map(|home| ensure_default_excluded_types(&home));
        match user_file {
            Some(Ok(path)) => read_excluded_types(&path),
            Some(Err(e)) => {
                warn!("Using packaged excluded types: {:#}", e);
                parse_excluded_types(DEFAULT_EXCLUDED_TYPES).unwrap_or_default()
            }
            None => parse_excluded_types(DEFAULT_EXCLUDED_TYPES).unwrap_or_default(),
        }
    }

    /// Tag translation table from the configured file or the packaged default.
    pub fn load_translations(&self) -> Result<BTreeMap<String, String>> {
        match self.data.translations_file {
            Some(ref path) => {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read translations file: {}", path))?;
                serde_json::from_str(&content)
                    .with_context(|| format!("Failed to parse translations file: {}", path))
            }
            None => serde_json::from_str(DEFAULT_TAG_TRANSLATIONS)
                .context("Failed to parse packaged translations"),
        }
    }

    /// Label lookup settings, when URL and credentials are all available.
    pub fn label_settings(&self, password: Option<&str>) -> Option<LabelSettings> {
        let api_url = self.labels.api_url.clone()?;
        let username = self.labels.username.clone()?;
        let password = password?.to_string();

        Some(LabelSettings {
            api_url,
            username,
            password,
            batch_size: self.labels.batch_size,
            verify_ssl: self.labels.verify_ssl,
            ca_bundle: self.labels.ca_bundle.as_ref().map(PathBuf::from),
        })
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
