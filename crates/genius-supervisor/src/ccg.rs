//! Code Consistency Graph produced by the analyze phase.
//!
//! The supervisor treats the graph as opaque except for the structural
//! invariants checked by [`Ccg::validate`].

use genius_core::{GeniusError, GeniusResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Prefix marking a relationship target outside the analyzed repository.
pub const EXTERNAL_PREFIX: &str = "external:";
/// Relationship target the analyzer could not resolve.
pub const UNRESOLVED: &str = "unresolved";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Class,
    Function,
    Module,
    Method,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationshipKind {
    Calls,
    Imports,
    Inherits,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub file_path: String,
    pub start_line: u32,
    pub end_line: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    pub name: String,
    #[serde(rename = "type", alias = "kind")]
    pub kind: EntityKind,
    #[serde(flatten)]
    pub location: SourceLocation,
    #[serde(default)]
    pub complexity: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documentation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub from: String,
    pub to: String,
    #[serde(rename = "type", alias = "kind")]
    pub kind: RelationshipKind,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComplexityStats {
    pub avg_complexity: f64,
    #[serde(default)]
    pub max_complexity: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CcgMetadata {
    #[serde(default)]
    pub repository_name: Option<String>,
    #[serde(default)]
    pub languages_detected: Vec<String>,
    #[serde(default)]
    pub complexity_stats: Option<ComplexityStats>,
}

/// Entities plus the relationships between them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ccg {
    pub entities: Vec<Entity>,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<CcgMetadata>,
}

impl Ccg {
    /// Check the structural invariants of the graph.
    ///
    /// Entity ids are unique, every relationship originates at a known
    /// entity and targets a known entity, an `external:` reference or the
    /// `unresolved` sentinel, and all scores are in range.
    pub fn validate(&self) -> GeniusResult<()> {
        let mut ids = HashSet::with_capacity(self.entities.len());
        for entity in &self.entities {
            if entity.id.is_empty() {
                return Err(GeniusError::Validation("CCG entity with empty id".into()));
            }
            if !ids.insert(entity.id.as_str()) {
                return Err(GeniusError::Validation(format!(
                    "duplicate CCG entity id '{}'",
                    entity.id
                )));
            }
            if !entity.complexity.is_finite() || entity.complexity < 0.0 {
                return Err(GeniusError::Validation(format!(
                    "entity '{}' has invalid complexity {}",
                    entity.id, entity.complexity
                )));
            }
            if entity.location.start_line > entity.location.end_line {
                return Err(GeniusError::Validation(format!(
                    "entity '{}' ends (line {}) before it starts (line {})",
                    entity.id, entity.location.end_line, entity.location.start_line
                )));
            }
        }

        for rel in &self.relationships {
            if !ids.contains(rel.from.as_str()) {
                return Err(GeniusError::Validation(format!(
                    "relationship source '{}' is not a known entity",
                    rel.from
                )));
            }
            let target_ok = ids.contains(rel.to.as_str())
                || rel.to.starts_with(EXTERNAL_PREFIX)
                || rel.to == UNRESOLVED;
            if !target_ok {
                return Err(GeniusError::Validation(format!(
                    "relationship target '{}' is neither a known entity nor an external reference",
                    rel.to
                )));
            }
            if !(0.0..=1.0).contains(&rel.confidence) {
                return Err(GeniusError::Validation(format!(
                    "relationship {} -> {} has confidence {} outside [0, 1]",
                    rel.from, rel.to, rel.confidence
                )));
            }
        }
        Ok(())
    }

    /// Mean entity complexity, preferring the analyzer's own statistics.
    pub fn avg_complexity(&self) -> Option<f64> {
        if let Some(stats) = self
            .metadata
            .as_ref()
            .and_then(|m| m.complexity_stats.as_ref())
        {
            return Some(stats.avg_complexity);
        }
        if self.entities.is_empty() {
            return None;
        }
        let total: f64 = self.entities.iter().map(|e| e.complexity).sum();
        Some(total / self.entities.len() as f64)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn sample() -> serde_json::Value {
        serde_json::json!({
            "entities": [
                {
                    "id": "entity_1",
                    "name": "Calculator",
                    "type": "class",
                    "file_path": "src/calculator.py",
                    "start_line": 1,
                    "end_line": 50,
                    "complexity": 8.5,
                    "documentation": "A calculator class"
                },
                {
                    "id": "entity_2",
                    "name": "add_numbers",
                    "type": "function",
                    "file_path": "src/utils.py",
                    "start_line": 10,
                    "end_line": 25,
                    "complexity": 3.2
                }
            ],
            "relationships": [
                {"from": "entity_1", "to": "entity_2", "type": "calls", "confidence": 0.95},
                {"from": "entity_2", "to": "external:math", "type": "imports", "confidence": 1.0}
            ]
        })
    }

    #[test]
    fn test_parse_and_validate_sample() {
        let ccg: Ccg = serde_json::from_value(sample()).unwrap();
        assert_eq!(ccg.entities.len(), 2);
        assert_eq!(ccg.entities[0].kind, EntityKind::Class);
        assert_eq!(ccg.entities[1].location.file_path, "src/utils.py");
        assert_eq!(ccg.relationships[0].kind, RelationshipKind::Calls);
        ccg.validate().unwrap();
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let mut ccg: Ccg = serde_json::from_value(sample()).unwrap();
        ccg.entities[1].id = "entity_1".into();
        let err = ccg.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_dangling_source_rejected() {
        let mut ccg: Ccg = serde_json::from_value(sample()).unwrap();
        ccg.relationships[0].from = "ghost".into();
        assert!(matches!(ccg.validate(), Err(GeniusError::Validation(_))));
    }

    #[test]
    fn test_unresolved_target_allowed() {
        let mut ccg: Ccg = serde_json::from_value(sample()).unwrap();
        ccg.relationships[0].to = UNRESOLVED.into();
        ccg.validate().unwrap();

        ccg.relationships[0].to = "somewhere_else".into();
        assert!(ccg.validate().is_err());
    }

    #[test]
    fn test_confidence_out_of_range_rejected() {
        let mut ccg: Ccg = serde_json::from_value(sample()).unwrap();
        ccg.relationships[1].confidence = 1.2;
        assert!(ccg.validate().is_err());
    }

    #[test]
    fn test_negative_complexity_rejected() {
        let mut ccg: Ccg = serde_json::from_value(sample()).unwrap();
        ccg.entities[0].complexity = -1.0;
        assert!(ccg.validate().is_err());
    }

    #[test]
    fn test_unknown_entity_kind_fails_to_parse() {
        let mut value = sample();
        value["entities"][0]["type"] = serde_json::json!("interface");
        assert!(serde_json::from_value::<Ccg>(value).is_err());
    }

    #[test]
    fn test_avg_complexity_prefers_metadata() {
        let mut ccg: Ccg = serde_json::from_value(sample()).unwrap();
        assert!((ccg.avg_complexity().unwrap() - 5.85).abs() < 1e-9);

        ccg.metadata = Some(CcgMetadata {
            complexity_stats: Some(ComplexityStats {
                avg_complexity: 4.0,
                max_complexity: 9.0,
            }),
            ..Default::default()
        });
        assert_eq!(ccg.avg_complexity(), Some(4.0));
        assert_eq!(Ccg::default().avg_complexity(), None);
    }
}
