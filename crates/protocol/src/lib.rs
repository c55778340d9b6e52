use anyhow::Result;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const RECORD_API_VERSION: &str = "kubepattern.it/v1";
pub const RECORD_KIND: &str = "K8sPattern";
pub const PATTERN_KIND: &str = "Pattern";

/// A pattern definition as published in a registry.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PatternDocument {
    /// `<domain>/v<N>`, e.g. `kubepattern.it/v1`
    pub version: String,
    pub kind: String,
    pub metadata: PatternMetadataDoc,
    pub spec: PatternSpecDoc,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PatternMetadataDoc {
    pub name: String,
    pub display_name: String,
    /// FOUNDATIONAL, BEHAVIORAL, STRUCTURAL, CONFIGURATION, SECURITY, ADVANCED or CUSTOM
    pub pattern_type: String,
    /// INFO, WARNING or CRITICAL
    pub severity: String,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PatternSpecDoc {
    /// Template with `{{role.name}}` / `{{role.namespace}}` placeholders
    pub message: String,
    /// SINGLE or LEADER_FOLLOWER
    pub topology: String,
    pub actors: Vec<String>,
    pub resources: Vec<ResourceRoleDoc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub relationships: Vec<RelationshipDoc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub common_relationships: Vec<RelationshipDoc>,
    #[serde(default)]
    pub min_relationship_points: u32,
    #[serde(default)]
    pub min_common_relationship_points: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRoleDoc {
    pub id: String,
    /// Kubernetes kind bound to this role
    pub resource: String,
    #[serde(default)]
    pub leader: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<FiltersDoc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FiltersDoc {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub match_all: Vec<FilterRuleDoc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub match_any: Vec<FilterRuleDoc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub match_none: Vec<FilterRuleDoc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, JsonSchema)]
pub struct FilterRuleDoc {
    /// JSONPath query evaluated against the resource object
    pub key: String,
    pub operator: String,
    #[serde(default)]
    pub values: Vec<serde_json::Value>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipDoc {
    pub id: String,
    #[serde(rename = "type")]
    pub relationship_type: String,
    pub resource_ids: Vec<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub shared: bool,
    #[serde(default)]
    pub weight: u32,
}

/// Outcome of linting a definition text
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, JsonSchema)]
pub struct LintResult {
    pub valid: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LintResult {
    pub fn ok() -> Self {
        Self {
            valid: true,
            message: "Pattern is valid".to_string(),
            error: None,
        }
    }

    pub fn invalid(error: impl Into<String>) -> Self {
        Self {
            valid: false,
            message: "Pattern is invalid".to_string(),
            error: Some(error.into()),
        }
    }
}

/// A pattern match as written to the results store
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PatternRecord {
    pub api_version: String,
    pub kind: String,
    pub metadata: RecordMetadata,
    pub spec: PatternRecordSpec,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, JsonSchema)]
pub struct RecordMetadata {
    pub name: String,
    pub namespace: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PatternRecordSpec {
    pub api_version: String,
    #[serde(rename = "type")]
    pub pattern_type: String,
    pub name: String,
    pub description: String,
    pub reference_link: String,
    pub message: String,
    pub severity: String,
    pub category: String,
    pub confidence: String,
    pub total_score: f64,
    pub scores: Vec<ScoreRecord>,
    pub resources: Vec<ResourceRecord>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, JsonSchema)]
pub struct ScoreRecord {
    pub category: String,
    pub score: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, JsonSchema)]
pub struct ResourceRecord {
    pub role: String,
    pub kind: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, JsonSchema)]
pub struct ErrorEnvelope {
    pub code: String,
    pub message: String,
    pub details: Option<serde_json::Value>,
    pub hint: Option<String>,
}

impl ErrorEnvelope {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
            hint: None,
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

pub fn serialize_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(Into::into)
}

/// JSON schema of [`PatternDocument`]
pub fn pattern_document_schema() -> Result<serde_json::Value> {
    let schema = schemars::schema_for!(PatternDocument);
    serde_json::to_value(schema).map_err(Into::into)
}
