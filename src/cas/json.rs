//! Reader for the UIMA CAS JSON serialization.
//!
//! Only the parts needed for statistics are kept: the declared type system
//! (`%TYPES`) and the feature structures (`%FEATURE_STRUCTURES`) with their
//! primitive feature values. References (`@`-prefixed keys) and arrays are
//! dropped.

use super::{AnnotationRecord, FeatureStructure, FEATURE_BEGIN, FEATURE_END, FEATURE_SOFA};
use crate::error::CasError;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::io::Read;

const TYPE_ANNOTATION: &str = "uima.tcas.Annotation";
const TYPE_ANNOTATION_BASE: &str = "uima.cas.AnnotationBase";
const BUILT_IN_PREFIX: &str = "uima.";
const MAX_TYPE_DEPTH: usize = 64;

#[derive(Debug, Clone, Default)]
struct TypeDef {
    supertype: Option<String>,
    features: Vec<String>,
}

/// An annotation record parsed from CAS JSON.
#[derive(Debug, Clone, Default)]
pub struct JsonCas {
    types: BTreeMap<String, TypeDef>,
    structures: Vec<FeatureStructure>,
}

impl JsonCas {
    /// Parse a CAS from a JSON string.
    #[cfg(test)]
    pub fn from_json_str(content: &str) -> Result<Self, CasError> {
        Self::from_value(serde_json::from_str(content)?)
    }

    /// Parse a CAS from a reader (e.g. a zip entry).
    pub fn from_reader<R: Read>(mut reader: R) -> Result<Self, CasError> {
        let mut buffer = Vec::new();
        reader.read_to_end(&mut buffer)?;
        Self::from_value(serde_json::from_slice(&buffer)?)
    }

    fn from_value(value: Value) -> Result<Self, CasError> {
        let root = value
            .as_object()
            .ok_or(CasError::InvalidSection("root object"))?;

        let types = match root.get("%TYPES") {
            None => BTreeMap::new(),
            Some(Value::Object(types)) => parse_types(types),
            Some(_) => return Err(CasError::InvalidSection("%TYPES")),
        };

        let structures = match root.get("%FEATURE_STRUCTURES") {
            None => Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .map(parse_feature_structure)
                .collect::<Result<Vec<_>, _>>()?,
            Some(_) => return Err(CasError::InvalidSection("%FEATURE_STRUCTURES")),
        };

        Ok(Self { types, structures })
    }

    /// Whether `type_name` equals `ancestor` or derives from it.
    fn is_subtype(&self, type_name: &str, ancestor: &str) -> bool {
        let mut current = Some(type_name);
        for _ in 0..MAX_TYPE_DEPTH {
            match current {
                Some(name) if name == ancestor => return true,
                Some(name) => {
                    current = self
                        .types
                        .get(name)
                        .and_then(|def| def.supertype.as_deref());
                }
                None => return false,
            }
        }
        false
    }
}

fn parse_types(types: &Map<String, Value>) -> BTreeMap<String, TypeDef> {
    types
        .iter()
        .filter_map(|(name, definition)| {
            let definition = definition.as_object()?;
            let supertype = definition
                .get("%SUPER_TYPE")
                .and_then(Value::as_str)
                .map(String::from);
            let features = definition
                .keys()
                .filter(|key| !key.starts_with('%'))
                .cloned()
                .collect();
            Some((
                name.clone(),
                TypeDef {
                    supertype,
                    features,
                },
            ))
        })
        .collect()
}

fn parse_feature_structure(item: &Value) -> Result<FeatureStructure, CasError> {
    let object = item
        .as_object()
        .ok_or(CasError::InvalidSection("%FEATURE_STRUCTURES"))?;

    let id = match object.get("%ID") {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    };

    let type_name = object
        .get("%TYPE")
        .and_then(Value::as_str)
        .ok_or_else(|| CasError::UntypedFeatureStructure(id.clone()))?
        .to_string();

    let values = object
        .iter()
        .filter(|(key, _)| !key.starts_with('%') && !key.starts_with('@'))
        .filter_map(|(key, value)| primitive_text(value).map(|text| (key.clone(), text)))
        .collect();

    Ok(FeatureStructure {
        id,
        type_name,
        values,
    })
}

fn primitive_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

impl AnnotationRecord for JsonCas {
    fn list_types(&self) -> Vec<&str> {
        self.types
            .keys()
            .map(String::as_str)
            .filter(|name| !name.starts_with(BUILT_IN_PREFIX))
            .collect()
    }

    fn list_features(&self, type_name: &str) -> Vec<String> {
        let mut features = Vec::new();
        let mut current = Some(type_name.to_string());

        for _ in 0..MAX_TYPE_DEPTH {
            let Some(name) = current.take() else { break };

            match name.as_str() {
                TYPE_ANNOTATION => {
                    features.extend([FEATURE_SOFA, FEATURE_BEGIN, FEATURE_END].map(String::from));
                    break;
                }
                TYPE_ANNOTATION_BASE => {
                    features.push(FEATURE_SOFA.to_string());
                    break;
                }
                _ => {}
            }

            if let Some(def) = self.types.get(&name) {
                for feature in &def.features {
                    if !features.contains(feature) {
                        features.push(feature.clone());
                    }
                }
                current = def.supertype.clone();
            }
        }

        features
    }

    fn select(&self, type_name: &str) -> Vec<&FeatureStructure> {
        self.structures
            .iter()
            .filter(|fs| self.is_subtype(&fs.type_name, type_name))
            .collect()
    }
}
