//! Concept label resolution.
//!
//! Concept annotations carry knowledge-base identifiers. For reporting they
//! are replaced by the semantic tag of their English label, e.g.
//! `"Asthma (disorder)"` becomes `"disorder"`. Labels are looked up through
//! the annotation platform's SPARQL endpoint in batches.

use crate::loader::LoadedArchive;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub const DEFAULT_BATCH_SIZE: usize = 50;
const REQUEST_TIMEOUT_SECONDS: u64 = 120;
const SPARQL_RESULTS_JSON: &str = "application/sparql-results+json";
const SPARQL_QUERY: &str = "application/sparql-query";

/// Connection settings for the SPARQL endpoint.
#[derive(Debug, Clone, Default)]
pub struct LabelSettings {
    pub api_url: String,
    pub username: String,
    pub password: String,
    pub batch_size: usize,
    pub verify_ssl: bool,
    pub ca_bundle: Option<PathBuf>,
}

/// Looks up labels for concept identifiers.
pub trait LabelResolver {
    /// Map each resolvable identifier to its label. Never fails: lookups
    /// that cannot be completed are left out of the result.
    fn resolve(
        &self,
        project_id: &str,
        knowledge_base_id: &str,
        concept_ids: &BTreeSet<String>,
    ) -> impl Future<Output = BTreeMap<String, String>> + Send;
}

/// The last non-empty parenthesized group of a label.
pub fn semantic_tag(label: &str) -> Option<&str> {
    let mut tag = None;
    let mut rest = label;

    while let Some(open) = rest.find('(') {
        let after = &rest[open + 1..];
        match after.find(')') {
            Some(0) => rest = after,
            Some(close) => {
                tag = Some(&after[..close]);
                rest = &after[close + 1..];
            }
            None => break,
        }
    }

    tag
}

fn build_query(concept_ids: &[&String]) -> String {
    let values = concept_ids
        .iter()
        .map(|id| format!("<{}>", id))
        .collect::<Vec<_>>()
        .join("\n    ");

    format!(
        r#"PREFIX rdfs: <http://www.w3.org/2000/01/rdf-schema#>
SELECT ?concept ?label WHERE {{
  VALUES ?concept {{ {} }}
  ?concept rdfs:label ?label .
  FILTER (lang(?label) = "en")
}}"#,
        values
    )
}

#[derive(Debug, Deserialize)]
struct SparqlResponse {
    results: SparqlResults,
}

#[derive(Debug, Deserialize)]
struct SparqlResults {
    #[serde(default)]
    bindings: Vec<SparqlBinding>,
}

#[derive(Debug, Deserialize)]
struct SparqlBinding {
    concept: Option<SparqlValue>,
    label: Option<SparqlValue>,
}

#[derive(Debug, Deserialize)]
struct SparqlValue {
    value: String,
}

fn semantic_tags(response: SparqlResponse) -> BTreeMap<String, String> {
    response
        .results
        .bindings
        .into_iter()
        .filter_map(|binding| {
            let concept = binding.concept?.value;
            let label = binding.label?.value;
            semantic_tag(&label).map(|tag| (concept, tag.to_string()))
        })
        .collect()
}

fn endpoint_base(api_url: &str) -> String {
    let url = api_url.trim_end_matches('/');
    if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!("http://{}", url)
    }
}

/// Resolver backed by the platform's SPARQL API.
pub struct SparqlLabelResolver {
    settings: LabelSettings,
    http_client: reqwest::Client,
}

impl SparqlLabelResolver {
    pub fn new(settings: LabelSettings) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECONDS))
            .danger_accept_invalid_certs(!settings.verify_ssl);

        if settings.verify_ssl {
            if let Some(ca_bundle) = &settings.ca_bundle {
                match std::fs::read(ca_bundle) {
                    Ok(pem) => {
                        let certificate = reqwest::Certificate::from_pem(&pem)
                            .with_context(|| format!("Invalid CA bundle {}", ca_bundle.display()))?;
                        builder = builder.add_root_certificate(certificate);
                    }
                    Err(e) => error!("CA bundle {} not readable: {}", ca_bundle.display(), e),
                }
            }
        }

        let http_client = builder.build().context("Failed to create HTTP client")?;
        Ok(Self {
            settings,
            http_client,
        })
    }

    fn endpoint(&self, project_id: &str, knowledge_base_id: &str) -> String {
        format!(
            "{}/api/aero/v1/projects/{}/kbs/{}/sparql",
            endpoint_base(&self.settings.api_url),
            project_id,
            knowledge_base_id
        )
    }

    async fn query_batch(&self, endpoint: &str, batch: &[&String]) -> Result<BTreeMap<String, String>> {
        let response = self
            .http_client
            .post(endpoint)
            .basic_auth(&self.settings.username, Some(&self.settings.password))
            .header(reqwest::header::CONTENT_TYPE, SPARQL_QUERY)
            .header(reqwest::header::ACCEPT, SPARQL_RESULTS_JSON)
            .body(build_query(batch))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    anyhow::anyhow!("Request timed out after {}s", REQUEST_TIMEOUT_SECONDS)
                } else if e.is_connect() {
                    anyhow::anyhow!("Cannot connect to {}", self.settings.api_url)
                } else {
                    anyhow::anyhow!("Failed to send request: {}", e)
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("SPARQL API error {}: {}", status, body));
        }

        let results: SparqlResponse = response
            .json()
            .await
            .context("Failed to parse SPARQL response")?;
        Ok(semantic_tags(results))
    }
}

impl LabelResolver for SparqlLabelResolver {
    async fn resolve(
        &self,
        project_id: &str,
        knowledge_base_id: &str,
        concept_ids: &BTreeSet<String>,
    ) -> BTreeMap<String, String> {
        let endpoint = self.endpoint(project_id, knowledge_base_id);
        let ids: Vec<&String> = concept_ids.iter().collect();
        let mut labels = BTreeMap::new();

        for batch in ids.chunks(self.settings.batch_size.max(1)) {
            match self.query_batch(&endpoint, batch).await {
                Ok(found) => labels.extend(found),
                Err(e) => warn!("SPARQL batch query failed for {} IDs: {}", batch.len(), e),
            }
        }

        labels
    }
}

/// Resolve the concept labels of one loaded project.
///
/// Returns an empty map unless a resolver, a project id, a detected
/// knowledge base and at least one concept identifier are all available.
pub async fn resolve_project_labels<R: LabelResolver>(
    resolver: Option<&R>,
    loaded: &LoadedArchive,
    project_ids: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let file_name = &loaded.project.name;

    let Some(knowledge_base_id) = loaded.knowledge_base_id.as_deref() else {
        debug!("No knowledge base detected for {}", file_name);
        return BTreeMap::new();
    };
    let Some(resolver) = resolver else {
        return BTreeMap::new();
    };
    if loaded.concept_ids.is_empty() {
        return BTreeMap::new();
    }
    let Some(project_id) = project_ids.get(&loaded.stem) else {
        warn!("No project id given for {}; concept labels not resolved", file_name);
        return BTreeMap::new();
    };

    let labels = resolver
        .resolve(project_id, knowledge_base_id, &loaded.concept_ids)
        .await;
    info!(
        "Fetched labels for {} of {} concepts in {}",
        labels.len(),
        loaded.concept_ids.len(),
        file_name
    );
    labels
}
