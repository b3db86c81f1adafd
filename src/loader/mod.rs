//! Project archive loading.
//!
//! Reads exported annotation-project zip archives: the project metadata
//! (`exportedproject.json`) and one CAS file per annotator and document.
//! Every record is reduced to `CasStats` right away, so a loaded project
//! never holds parsed records in memory.

use crate::analysis::compute_cas_stats;
use crate::cas::JsonCas;
use crate::error::LoadError;
use crate::models::{AnnotatorStats, DocumentState, LoadedProject, ProjectAnnotations, ProjectDocument};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};
use zip::ZipArchive;

pub const METADATA_FILE: &str = "exportedproject.json";
pub const INITIAL_CAS_FILE: &str = "INITIAL_CAS.json";
pub const DEFAULT_INCEPTION_VERSION: &str = "Older than 38.4";

const ANY_KNOWLEDGE_BASE: &str = "<ANY>";
const KNOWLEDGE_BASE_PREFIX: &str = "kb:";

#[derive(Debug, Default, Deserialize)]
struct ProjectMetadata {
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    source_documents: Vec<ProjectDocument>,
    #[serde(default)]
    application_version: Option<String>,
    #[serde(default)]
    layers: Vec<LayerMetadata>,
    #[serde(default)]
    knowledge_bases: Vec<KnowledgeBaseMetadata>,
}

#[derive(Debug, Default, Deserialize)]
struct LayerMetadata {
    #[serde(default)]
    features: Vec<FeatureMetadata>,
}

#[derive(Debug, Default, Deserialize)]
struct FeatureMetadata {
    #[serde(default, rename = "type")]
    feature_type: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct KnowledgeBaseMetadata {
    #[serde(default)]
    id: Option<serde_json::Value>,
    #[serde(default)]
    name: String,
    #[serde(default)]
    enabled: bool,
}

impl KnowledgeBaseMetadata {
    fn id(&self) -> Option<String> {
        match self.id.as_ref()? {
            serde_json::Value::String(id) => Some(id.clone()),
            serde_json::Value::Null => None,
            other => Some(other.to_string()),
        }
    }
}

/// A project archive found in the projects directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectArchive {
    /// File name, e.g. `alpha.v2.zip`.
    pub file_name: String,
    /// Text before the first dot; used for project selection and ids.
    pub stem: String,
    pub path: PathBuf,
}

/// A loaded project together with what label resolution needs.
#[derive(Debug, Clone, Default)]
pub struct LoadedArchive {
    pub project: LoadedProject,
    pub stem: String,
    /// Concept identifiers used in any record of the project.
    pub concept_ids: BTreeSet<String>,
    /// Knowledge base the concept layer links to, if any.
    pub knowledge_base_id: Option<String>,
}

pub fn project_stem(file_name: &str) -> &str {
    file_name.split('.').next().unwrap_or(file_name)
}

fn is_zip_file(path: &Path) -> bool {
    File::open(path)
        .ok()
        .map(|file| ZipArchive::new(file).is_ok())
        .unwrap_or(false)
}

/// List the project archives of a directory, sorted by file name.
///
/// When `selected` is given, only archives whose stem is in it are kept.
pub fn list_project_archives(
    directory: &Path,
    selected: Option<&BTreeSet<String>>,
) -> Result<Vec<ProjectArchive>, LoadError> {
    let mut file_names: Vec<String> = std::fs::read_dir(directory)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|kind| kind.is_file()).unwrap_or(false))
        .map(|entry| entry.file_name().to_string_lossy().to_string())
        .collect();
    file_names.sort();

    Ok(file_names
        .into_iter()
        .filter(|file_name| selected.map_or(true, |names| names.contains(project_stem(file_name))))
        .map(|file_name| ProjectArchive {
            stem: project_stem(&file_name).to_string(),
            path: directory.join(&file_name),
            file_name,
        })
        .filter(|archive| is_zip_file(&archive.path))
        .collect())
}

/// `#word` tokens of a project description, translated.
pub fn project_tags(description: Option<&str>, translations: &BTreeMap<String, String>) -> Option<Vec<String>> {
    let tags: Vec<String> = description
        .unwrap_or_default()
        .split_whitespace()
        .filter(|word| word.starts_with('#'))
        .map(|word| {
            let tag = word.trim_matches('#');
            translations.get(tag).cloned().unwrap_or_else(|| tag.to_string())
        })
        .collect();

    (!tags.is_empty()).then_some(tags)
}

fn detect_knowledge_base(metadata: &ProjectMetadata) -> Option<String> {
    if metadata.knowledge_bases.is_empty() {
        return None;
    }

    let feature_types = metadata
        .layers
        .iter()
        .flat_map(|layer| &layer.features)
        .filter_map(|feature| feature.feature_type.as_deref())
        .filter_map(|feature_type| feature_type.strip_prefix(KNOWLEDGE_BASE_PREFIX));

    for kb_type in feature_types {
        let found = if kb_type == ANY_KNOWLEDGE_BASE {
            metadata.knowledge_bases.iter().find(|kb| kb.enabled)
        } else {
            metadata
                .knowledge_bases
                .iter()
                .find(|kb| kb.name.to_lowercase() == kb_type.to_lowercase())
        };

        if let Some(id) = found.and_then(KnowledgeBaseMetadata::id) {
            return Some(id);
        }
    }

    None
}

fn document_folder(document: &ProjectDocument) -> String {
    if document.state == DocumentState::CurationFinished {
        format!("curation/{}/", document.name)
    } else {
        format!("annotation/{}/", document.name)
    }
}

/// CAS entries of a document. `INITIAL_CAS.json` counts only when alone.
fn matching_cas_files(entry_names: &[String], document: &ProjectDocument) -> Vec<String> {
    let folder = document_folder(document);
    let mut matching: Vec<String> = entry_names
        .iter()
        .filter(|name| name.starts_with(&folder) && name.ends_with(".json"))
        .cloned()
        .collect();
    matching.sort();

    if matching.len() > 1 {
        matching.retain(|name| !name.ends_with(INITIAL_CAS_FILE));
    }
    matching
}

fn annotator_name(entry_name: &str) -> String {
    Path::new(entry_name)
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_else(|| entry_name.to_string())
}

fn open_archive(path: &Path) -> Result<ZipArchive<File>, LoadError> {
    let file = File::open(path).map_err(|e| LoadError::OpenFailed(e.to_string()))?;
    Ok(ZipArchive::new(file)?)
}

fn read_metadata(archive: &mut ZipArchive<File>, file_name: &str) -> Result<ProjectMetadata, LoadError> {
    let mut content = Vec::new();
    match archive.by_name(METADATA_FILE) {
        Ok(mut entry) => {
            entry.read_to_end(&mut content)?;
        }
        Err(zip::result::ZipError::FileNotFound) => {
            return Err(LoadError::MissingMetadata(file_name.to_string()));
        }
        Err(e) => return Err(e.into()),
    }

    let metadata: ProjectMetadata =
        serde_json::from_slice(&content).map_err(|source| LoadError::InvalidMetadata {
            archive: file_name.to_string(),
            source,
        })?;

    if metadata.source_documents.is_empty() {
        return Err(LoadError::NoSourceDocuments(file_name.to_string()));
    }
    Ok(metadata)
}

fn entry_names(archive: &ZipArchive<File>) -> Vec<String> {
    archive.file_names().map(String::from).collect()
}

fn new_progress_bar(total: u64, show_progress: bool) -> ProgressBar {
    if !show_progress {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new(total);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
    {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb
}

/// Loads project archives into `LoadedProject`s.
#[derive(Debug, Clone, Default)]
pub struct ProjectLoader {
    excluded_types: HashSet<String>,
    translations: BTreeMap<String, String>,
    show_progress: bool,
}

impl ProjectLoader {
    pub fn new(
        excluded_types: HashSet<String>,
        translations: BTreeMap<String, String>,
        show_progress: bool,
    ) -> Self {
        Self {
            excluded_types,
            translations,
            show_progress,
        }
    }

    fn count_cas_files(&self, archive: &ProjectArchive) -> Result<u64, LoadError> {
        let mut zip = open_archive(&archive.path)?;
        let metadata = read_metadata(&mut zip, &archive.file_name)?;
        let names = entry_names(&zip);

        Ok(metadata
            .source_documents
            .iter()
            .map(|document| matching_cas_files(&names, document).len() as u64)
            .sum())
    }

    /// Progress bar over the CAS files of all `archives`.
    pub fn progress_bar(&self, archives: &[ProjectArchive]) -> ProgressBar {
        let total: u64 = archives
            .iter()
            .filter_map(|archive| match self.count_cas_files(archive) {
                Ok(count) => Some(count),
                Err(e) => {
                    debug!("Not counting {}: {}", archive.file_name, e);
                    None
                }
            })
            .sum();

        new_progress_bar(total, self.show_progress)
    }

    /// Load one archive, logging and skipping it when unusable.
    pub fn load_or_skip(&self, archive: &ProjectArchive, progress: &ProgressBar) -> Option<LoadedArchive> {
        match self.load_archive(archive, progress) {
            Ok(project) => Some(project),
            Err(
                e @ (LoadError::MissingMetadata(_)
                | LoadError::InvalidMetadata { .. }
                | LoadError::NoSourceDocuments(_)),
            ) => {
                warn!("Skipping {}: {}", archive.file_name, e);
                None
            }
            Err(e) => {
                error!("Error processing {}: {}", archive.file_name, e);
                None
            }
        }
    }

    /// Load one archive.
    pub fn load_archive(
        &self,
        archive: &ProjectArchive,
        progress: &ProgressBar,
    ) -> Result<LoadedArchive, LoadError> {
        let mut zip = open_archive(&archive.path)?;
        let metadata = read_metadata(&mut zip, &archive.file_name)?;
        let names = entry_names(&zip);

        info!("Started processing project {}", archive.file_name);
        progress.set_message(archive.stem.clone());

        let mut annotations = ProjectAnnotations::new();
        let mut concept_ids = BTreeSet::new();

        for document in &metadata.source_documents {
            let matching = matching_cas_files(&names, document);
            if matching.is_empty() {
                warn!(
                    "No CAS found for {} in {} ({})",
                    document.name,
                    archive.file_name,
                    document_folder(document)
                );
            }

            let mut annotators = AnnotatorStats::new();
            for entry_name in matching {
                let parsed = zip
                    .by_name(&entry_name)
                    .map_err(|e| e.to_string())
                    .and_then(|entry| JsonCas::from_reader(entry).map_err(|e| e.to_string()));

                match parsed {
                    Ok(record) => {
                        let (counts, ids) = compute_cas_stats(&record, &self.excluded_types);
                        annotators.insert(annotator_name(&entry_name), counts);
                        concept_ids.extend(ids);
                    }
                    Err(e) => warn!("Failed to load {} from {}: {}", entry_name, archive.file_name, e),
                }
                progress.inc(1);
            }

            annotations.insert(document.name.clone(), annotators);
        }

        let knowledge_base_id = detect_knowledge_base(&metadata);
        match &knowledge_base_id {
            Some(id) => debug!("Detected knowledge base '{}' for {}", id, archive.file_name),
            None => debug!("No knowledge base detected for {}", archive.file_name),
        }

        let project = LoadedProject {
            name: archive.file_name.clone(),
            tags: project_tags(metadata.description.as_deref(), &self.translations),
            documents: metadata.source_documents,
            annotations,
            snomed_labels: BTreeMap::new(),
            inception_version: Some(
                metadata
                    .application_version
                    .unwrap_or_else(|| DEFAULT_INCEPTION_VERSION.to_string()),
            ),
        };

        Ok(LoadedArchive {
            project,
            stem: archive.stem.clone(),
            concept_ids,
            knowledge_base_id,
        })
    }
}
