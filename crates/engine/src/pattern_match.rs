use crate::definition::PatternMetadata;
use kubepattern_graph::Resource;
use kubepattern_protocol::{
    PatternRecord, PatternRecordSpec, RecordMetadata, ResourceRecord, ScoreRecord,
    RECORD_API_VERSION, RECORD_KIND,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Ceiling every match currently reports as its total score
pub const TOTAL_SCORE_CEILING: f64 = 100.0;

pub const COMMON_RELATIONSHIPS_CATEGORY: &str = "CommonRelationships";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    pub fn from_score(total: f64) -> Self {
        if total <= 40.0 {
            Confidence::Low
        } else if total <= 70.0 {
            Confidence::Medium
        } else {
            Confidence::High
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::Low => "LOW",
            Confidence::Medium => "MEDIUM",
            Confidence::High => "HIGH",
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Score {
    pub category: String,
    pub motivation: String,
    pub value: f64,
}

impl Score {
    pub fn common_relationships(points: u32) -> Self {
        Self {
            category: COMMON_RELATIONSHIPS_CATEGORY.to_string(),
            motivation: "Relationship Score".to_string(),
            value: f64::from(points),
        }
    }
}

/// A resource bound to a role of the pattern
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundResource {
    pub role: String,
    pub resource: Resource,
}

/// One detected occurrence of a pattern
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternMatch {
    pub metadata: PatternMetadata,
    pub message: String,
    pub resources: Vec<BoundResource>,
    pub scores: Vec<Score>,
}

impl PatternMatch {
    /// Build a match, rendering `template` against the bound resources.
    pub fn new(
        metadata: PatternMetadata,
        template: &str,
        resources: Vec<BoundResource>,
        scores: Vec<Score>,
    ) -> Self {
        let message = render_message(template, &resources);
        Self {
            metadata,
            message,
            resources,
            scores,
        }
    }

    pub fn total_score(&self) -> f64 {
        TOTAL_SCORE_CEILING
    }

    pub fn confidence(&self) -> Confidence {
        Confidence::from_score(self.total_score())
    }

    /// Stable identity: first 8 hex chars of SHA-256 over the pattern name
    /// and the sorted `name:namespace` of every bound resource.
    pub fn dedup_id(&self) -> String {
        let mut keys: Vec<String> = self
            .resources
            .iter()
            .map(|b| format!("{}:{}", b.resource.name, b.resource.namespace_or_empty()))
            .collect();
        keys.sort();

        let input = format!("{}|{}", self.metadata.name, keys.join("|"));
        let digest = Sha256::digest(input.as_bytes());
        digest[..4].iter().map(|b| format!("{b:02x}")).collect()
    }

    pub fn record_name(&self) -> String {
        format!(
            "{}-{}",
            self.metadata.name.to_lowercase().replace(' ', "-"),
            self.dedup_id()
        )
    }

    /// Namespace the persisted record belongs in
    pub fn record_namespace(&self, target_namespace: &str, save_in_namespace: bool) -> String {
        if save_in_namespace {
            if let Some(ns) = self
                .resources
                .first()
                .and_then(|b| b.resource.namespace.as_deref())
                .filter(|ns| !ns.is_empty())
            {
                return ns.to_string();
            }
        }
        target_namespace.to_string()
    }

    pub fn render_for_persistence(
        &self,
        target_namespace: &str,
        save_in_namespace: bool,
    ) -> PatternRecord {
        let metadata = &self.metadata;
        let reference_link = if metadata.doc_url.is_empty() {
            metadata.git_url.clone()
        } else {
            metadata.doc_url.clone()
        };

        PatternRecord {
            api_version: RECORD_API_VERSION.to_string(),
            kind: RECORD_KIND.to_string(),
            metadata: RecordMetadata {
                name: self.record_name(),
                namespace: self.record_namespace(target_namespace, save_in_namespace),
            },
            spec: PatternRecordSpec {
                api_version: metadata.version.clone(),
                pattern_type: metadata.pattern_type.to_string(),
                name: metadata.name.clone(),
                description: metadata.description.clone(),
                reference_link,
                message: self.message.clone(),
                severity: metadata.severity.to_string(),
                category: metadata.category.clone(),
                confidence: self.confidence().to_string(),
                total_score: self.total_score(),
                scores: self
                    .scores
                    .iter()
                    .map(|s| ScoreRecord {
                        category: s.category.clone(),
                        score: s.value,
                    })
                    .collect(),
                resources: self
                    .resources
                    .iter()
                    .map(|b| ResourceRecord {
                        role: b.role.clone(),
                        kind: b.resource.kind.clone(),
                        name: b.resource.name.clone(),
                        namespace: b.resource.namespace.clone(),
                        uid: b.resource.uid.clone(),
                    })
                    .collect(),
            },
        }
    }
}

/// Substitute `{{role.name}}` and `{{role.namespace}}`.
///
/// Namespace placeholders of cluster-scoped resources are left as written.
pub fn render_message(template: &str, resources: &[BoundResource]) -> String {
    let mut message = template.to_string();
    for bound in resources {
        message = message.replace(&format!("{{{{{}.name}}}}", bound.role), &bound.resource.name);
        if let Some(ns) = bound.resource.namespace.as_deref().filter(|ns| !ns.is_empty()) {
            message = message.replace(&format!("{{{{{}.namespace}}}}", bound.role), ns);
        }
    }
    message
}
