use crate::filter::ResourceFilter;
use kubepattern_graph::RelationshipType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Shape of a pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Topology {
    Single,
    LeaderFollower,
    /// Topology this version does not know; matches nothing
    Unsupported(String),
}

impl Topology {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "SINGLE" => Topology::Single,
            "LEADER_FOLLOWER" => Topology::LeaderFollower,
            _ => Topology::Unsupported(raw.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Topology::Single => "SINGLE",
            Topology::LeaderFollower => "LEADER_FOLLOWER",
            Topology::Unsupported(raw) => raw,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    #[default]
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub const ALL: [Severity; 3] = [Severity::Info, Severity::Warning, Severity::Critical];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Critical => "CRITICAL",
        }
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Severity::ALL
            .into_iter()
            .find(|v| v.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown severity '{s}'"))
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PatternType {
    Foundational,
    Behavioral,
    Structural,
    Configuration,
    Security,
    Advanced,
    #[default]
    Custom,
}

impl PatternType {
    pub const ALL: [PatternType; 7] = [
        PatternType::Foundational,
        PatternType::Behavioral,
        PatternType::Structural,
        PatternType::Configuration,
        PatternType::Security,
        PatternType::Advanced,
        PatternType::Custom,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PatternType::Foundational => "FOUNDATIONAL",
            PatternType::Behavioral => "BEHAVIORAL",
            PatternType::Structural => "STRUCTURAL",
            PatternType::Configuration => "CONFIGURATION",
            PatternType::Security => "SECURITY",
            PatternType::Advanced => "ADVANCED",
            PatternType::Custom => "CUSTOM",
        }
    }
}

impl FromStr for PatternType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PatternType::ALL
            .into_iter()
            .find(|v| v.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown pattern type '{s}'"))
    }
}

impl fmt::Display for PatternType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Descriptive fields copied onto every match
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternMetadata {
    pub version: String,
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub doc_url: String,
    pub git_url: String,
    pub category: String,
    pub severity: Severity,
    pub pattern_type: PatternType,
}

/// A role-pair relationship constraint.
///
/// `required` turns the constraint into a veto, otherwise it scores
/// `weight` points. `shared` says whether the relationship should be
/// present (`true`) or absent (`false`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipDefinition {
    pub id: String,
    pub relationship_type: RelationshipType,
    pub required: bool,
    pub shared: bool,
    pub weight: u32,
    pub resources: Vec<String>,
}

/// What a constraint contributes once the relationship has been checked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Veto,
    Points(u32),
    Neutral,
}

impl RelationshipDefinition {
    pub fn new(
        id: impl Into<String>,
        relationship_type: RelationshipType,
        required: bool,
        shared: bool,
        weight: u32,
    ) -> Self {
        Self {
            id: id.into(),
            relationship_type,
            required,
            shared,
            weight,
            resources: Vec::new(),
        }
    }

    pub fn between(mut self, first: impl Into<String>, second: impl Into<String>) -> Self {
        self.resources = vec![first.into(), second.into()];
        self
    }

    pub fn first_role(&self) -> Option<&str> {
        self.resources.first().map(String::as_str)
    }

    pub fn second_role(&self) -> Option<&str> {
        self.resources.get(1).map(String::as_str)
    }

    /// Apply the veto-or-score rule to an observed presence
    pub fn judge(&self, present: bool) -> Verdict {
        match (self.required, self.shared, present) {
            (true, true, false) | (true, false, true) => Verdict::Veto,
            (true, _, _) => Verdict::Neutral,
            (false, true, true) | (false, false, false) => Verdict::Points(self.weight),
            (false, _, _) => Verdict::Neutral,
        }
    }
}

/// A parsed, ready-to-evaluate pattern definition
#[derive(Debug, Clone)]
pub struct PatternDefinition {
    pub metadata: PatternMetadata,
    pub leader_id: String,
    pub topology: Topology,
    pub message: String,
    pub actors: Vec<String>,
    /// role id -> kind
    pub resources: BTreeMap<String, String>,
    /// role id -> filter; a missing entry always passes
    pub resource_filters: BTreeMap<String, ResourceFilter>,
    pub relationships: Vec<RelationshipDefinition>,
    pub common_relationships: Vec<RelationshipDefinition>,
    pub min_rel_points: u32,
    pub min_common_rel_points: u32,
}

impl PatternDefinition {
    pub fn new(name: impl Into<String>, topology: Topology, leader_id: impl Into<String>) -> Self {
        let leader_id = leader_id.into();
        let name = name.into();
        Self {
            metadata: PatternMetadata {
                display_name: name.clone(),
                name,
                ..Default::default()
            },
            actors: vec![leader_id.clone()],
            leader_id,
            topology,
            message: String::new(),
            resources: BTreeMap::new(),
            resource_filters: BTreeMap::new(),
            relationships: Vec::new(),
            common_relationships: Vec::new(),
            min_rel_points: 0,
            min_common_rel_points: 0,
        }
    }

    /// Bind a role to a kind, adding it to the actors
    pub fn with_role(mut self, role: impl Into<String>, kind: impl Into<String>) -> Self {
        let role = role.into();
        if !self.actors.contains(&role) {
            self.actors.push(role.clone());
        }
        self.resources.insert(role, kind.into());
        self
    }

    pub fn with_filter(mut self, role: impl Into<String>, filter: ResourceFilter) -> Self {
        self.resource_filters.insert(role.into(), filter);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_relationship(mut self, relationship: RelationshipDefinition) -> Self {
        self.relationships.push(relationship);
        self
    }

    pub fn with_common_relationship(mut self, relationship: RelationshipDefinition) -> Self {
        self.common_relationships.push(relationship);
        self
    }

    pub fn with_min_points(mut self, relationships: u32, common: u32) -> Self {
        self.min_rel_points = relationships;
        self.min_common_rel_points = common;
        self
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn kind_of(&self, role: &str) -> Option<&str> {
        self.resources.get(role).map(String::as_str)
    }

    pub fn filter_of(&self, role: &str) -> Option<&ResourceFilter> {
        self.resource_filters.get(role)
    }

    /// The non-leader actor; with several, the last one listed
    pub fn follower_id(&self) -> Option<&str> {
        self.actors
            .iter()
            .rev()
            .find(|actor| **actor != self.leader_id)
            .map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn judge_follows_required_shared_table() {
        let rel = |required, shared| {
            RelationshipDefinition::new("r", RelationshipType::Exposes, required, shared, 5)
        };
        assert_eq!(rel(true, true).judge(false), Verdict::Veto);
        assert_eq!(rel(true, true).judge(true), Verdict::Neutral);
        assert_eq!(rel(true, false).judge(true), Verdict::Veto);
        assert_eq!(rel(true, false).judge(false), Verdict::Neutral);
        assert_eq!(rel(false, true).judge(true), Verdict::Points(5));
        assert_eq!(rel(false, true).judge(false), Verdict::Neutral);
        assert_eq!(rel(false, false).judge(false), Verdict::Points(5));
        assert_eq!(rel(false, false).judge(true), Verdict::Neutral);
    }

    #[test]
    fn follower_is_last_non_leader_actor() {
        let def = PatternDefinition::new("p", Topology::LeaderFollower, "leader")
            .with_role("leader", "Pod")
            .with_role("a", "Service")
            .with_role("b", "ConfigMap");
        assert_eq!(def.follower_id(), Some("b"));

        let single =
            PatternDefinition::new("p", Topology::Single, "leader").with_role("leader", "Pod");
        assert_eq!(single.follower_id(), None);
    }

    #[test]
    fn unknown_topology_is_kept_verbatim() {
        assert_eq!(Topology::parse("leader_follower"), Topology::LeaderFollower);
        assert_eq!(Topology::parse("MESH"), Topology::Unsupported("MESH".to_string()));
    }
}
