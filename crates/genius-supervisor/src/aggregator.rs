use crate::ccg::Ccg;
use crate::config::QualityWeights;
use crate::payload::{AnalysisOutput, DocumentationOutput, RepositoryInfo, RepositoryMap};
use crate::types::{Phase, PhaseState, Workflow};
use chrono::{DateTime, Utc};
use genius_core::{GeniusError, GeniusResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Named component scores plus the overall score, all in [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityMetrics {
    pub repository_quality: f64,
    pub analysis_quality: f64,
    pub documentation_quality: f64,
    pub overall_score: f64,
    /// `min(1, 60 / total_processing_secs)`. Informational, not part of the overall score.
    pub processing_efficiency: f64,
}

/// Unified output of a completed workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedResult {
    pub workflow_id: Uuid,
    pub repository_info: RepositoryInfo,
    pub ccg: Ccg,
    /// Documentation artifacts produced by the document phase.
    pub artifacts: Vec<String>,
    pub quality: QualityMetrics,
    /// Sum of the phases' delegation durations.
    pub total_processing_secs: f64,
    pub summary: String,
    /// Raw phase output keyed by agent type.
    pub agent_results: BTreeMap<String, Value>,
    pub created_at: DateTime<Utc>,
}

/// Builds an [`AggregatedResult`] from a workflow whose phases all completed.
#[derive(Debug, Clone, Default)]
pub struct ResultAggregator {
    weights: QualityWeights,
}

fn component(name: &str, value: Option<f64>) -> GeniusResult<f64> {
    let value = value.ok_or_else(|| GeniusError::Aggregation(format!("missing {name}")))?;
    if !value.is_finite() || !(0.0..=1.0).contains(&value) {
        return Err(GeniusError::Aggregation(format!(
            "{name} {value} is outside [0, 1]"
        )));
    }
    Ok(value)
}

impl ResultAggregator {
    pub fn new(weights: QualityWeights) -> Self {
        Self { weights }
    }

    /// Weighted mean of the three components. Equal weights give the plain mean.
    pub fn overall_score(&self, repository: f64, analysis: f64, documentation: f64) -> f64 {
        let w = &self.weights;
        let total = w.repository + w.analysis + w.documentation;
        if total <= 0.0 {
            return (repository + analysis + documentation) / 3.0;
        }
        (repository * w.repository + analysis * w.analysis + documentation * w.documentation)
            / total
    }

    pub fn aggregate(&self, workflow: &Workflow) -> GeniusResult<AggregatedResult> {
        let mut outputs = Vec::with_capacity(Phase::ALL.len());
        for phase in Phase::ALL {
            let status = workflow.phase(phase);
            match (&status.state, &status.result) {
                (PhaseState::Completed, Some(result)) => outputs.push(result),
                _ => {
                    return Err(GeniusError::Aggregation(format!(
                        "phase {phase} has no completed result"
                    )))
                }
            }
        }
        let reparse = |e: GeniusError| GeniusError::Aggregation(e.to_string());
        let map = RepositoryMap::from_value(outputs[Phase::Map.index()]).map_err(reparse)?;
        let analysis =
            AnalysisOutput::from_value(outputs[Phase::Analyze.index()]).map_err(reparse)?;
        let docs =
            DocumentationOutput::from_value(outputs[Phase::Document.index()]).map_err(reparse)?;

        let repository_quality = component(
            "readme_summary.quality_score",
            map.readme_summary.as_ref().and_then(|r| r.quality_score),
        )?;
        let analysis_quality = component(
            "analysis quality_score",
            analysis
                .quality_score
                .or_else(|| analysis.ccg_data.avg_complexity().map(|c| (c / 10.0).min(1.0))),
        )?;
        let documentation_quality = component(
            "quality_metrics.quality_score",
            docs.quality_metrics.quality_score,
        )?;

        let total_processing_secs: f64 = workflow
            .phases
            .iter()
            .filter_map(|p| p.duration_secs)
            .sum();
        let processing_efficiency = if total_processing_secs <= 0.0 {
            1.0
        } else {
            (60.0 / total_processing_secs).min(1.0)
        };

        let mut repository_info = map.repository_info;
        if repository_info.url.is_empty() {
            repository_info.url = workflow.repository_url.clone();
        }
        let summary = format!(
            "Processed '{}': {} entities, {} relationships",
            repository_info.name,
            analysis.ccg_data.entities.len(),
            analysis.ccg_data.relationships.len()
        );
        let agent_results = Phase::ALL
            .iter()
            .map(|p| (p.agent_type().to_string(), outputs[p.index()].clone()))
            .collect();

        Ok(AggregatedResult {
            workflow_id: workflow.id,
            repository_info,
            ccg: analysis.ccg_data,
            artifacts: docs.output_files,
            quality: QualityMetrics {
                repository_quality,
                analysis_quality,
                documentation_quality,
                overall_score: self.overall_score(
                    repository_quality,
                    analysis_quality,
                    documentation_quality,
                ),
                processing_efficiency,
            },
            total_processing_secs,
            summary,
            agent_results,
            created_at: Utc::now(),
        })
    }
}
