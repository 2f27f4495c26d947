//! Typed views of the three phase payloads and their boundary validation.

use crate::ccg::Ccg;
use crate::types::Phase;
use genius_core::{GeniusError, GeniusResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Repository metadata reported by the map phase.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RepositoryInfo {
    #[serde(default)]
    pub url: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_files: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clone_path: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReadmeSummary {
    pub quality_score: Option<f64>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub sections: Vec<String>,
}

/// Output of the map phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositoryMap {
    pub repository_info: RepositoryInfo,
    #[serde(default)]
    pub file_tree: Option<Value>,
    #[serde(default)]
    pub readme_summary: Option<ReadmeSummary>,
}

/// Output of the analyze phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisOutput {
    pub ccg_data: Ccg,
    #[serde(default)]
    pub quality_score: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentationQuality {
    pub quality_score: Option<f64>,
    #[serde(default)]
    pub total_sections: Option<u32>,
    #[serde(default)]
    pub diagram_count: Option<u32>,
}

/// Output of the document phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentationOutput {
    pub output_files: Vec<String>,
    #[serde(default)]
    pub quality_metrics: DocumentationQuality,
    #[serde(default)]
    pub sections_generated: Vec<Value>,
}

fn parse<T: DeserializeOwned>(phase: Phase, value: &Value) -> GeniusResult<T> {
    T::deserialize(value).map_err(|e| {
        GeniusError::Validation(format!("malformed {phase} payload: {e}"))
    })
}

impl RepositoryMap {
    pub fn from_value(value: &Value) -> GeniusResult<Self> {
        parse(Phase::Map, value)
    }
}

impl AnalysisOutput {
    pub fn from_value(value: &Value) -> GeniusResult<Self> {
        parse(Phase::Analyze, value)
    }
}

impl DocumentationOutput {
    pub fn from_value(value: &Value) -> GeniusResult<Self> {
        parse(Phase::Document, value)
    }
}

/// Shape-check a phase result before it is accepted as the next phase's input.
///
/// Only what downstream consumers rely on is checked; unknown fields pass
/// through untouched.
pub fn validate_phase_output(phase: Phase, value: &Value) -> GeniusResult<()> {
    match phase {
        Phase::Map => {
            let map = RepositoryMap::from_value(value)?;
            if map.repository_info.name.trim().is_empty() {
                return Err(GeniusError::Validation(
                    "map payload has an empty repository name".into(),
                ));
            }
        }
        Phase::Analyze => {
            let analysis = AnalysisOutput::from_value(value)?;
            analysis.ccg_data.validate()?;
        }
        Phase::Document => {
            DocumentationOutput::from_value(value)?;
        }
    }
    Ok(())
}
