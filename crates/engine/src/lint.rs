//! Structural validation of pattern definition text, run before parsing.

use crate::definition::{PatternType, Severity};
use crate::error::{EngineError, Result};
use crate::filter::{compile_query, FilterOperator};
use kubepattern_graph::RelationshipType;
use kubepattern_protocol::{LintResult, PATTERN_KIND};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::collections::HashSet;

static VERSION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9.-]+/v[a-zA-Z0-9]+$").expect("static regex"));
static NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9.-]+$").expect("static regex"));
static CATEGORY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9-]+$").expect("static regex"));
static URL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^https?://").expect("static regex"));

const TOPOLOGIES: [&str; 2] = ["SINGLE", "LEADER_FOLLOWER"];
const FILTER_LISTS: [&str; 3] = ["matchAll", "matchAny", "matchNone"];

fn malformed(msg: impl Into<String>) -> EngineError {
    EngineError::malformed(msg)
}

/// Non-empty string at `key`, or `None`
fn text<'a>(node: &'a Value, key: &str) -> Option<&'a str> {
    node.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
}

fn required_text<'a>(node: &'a Value, key: &str, path: &str) -> Result<&'a str> {
    text(node, key).ok_or_else(|| malformed(format!("{path} is null or empty")))
}

fn non_empty_array<'a>(node: &'a Value, key: &str, path: &str) -> Result<&'a Vec<Value>> {
    node.get(key)
        .and_then(Value::as_array)
        .filter(|items| !items.is_empty())
        .ok_or_else(|| malformed(format!("{path} must be a non-empty array")))
}

/// Validate definition text; the error names the offending JSON path.
pub fn lint(text: &str) -> Result<()> {
    let root: Value = serde_json::from_str(text)
        .map_err(|_| malformed("pattern definition is not a valid json"))?;

    let version = required_text(&root, "version", "version")?;
    if !VERSION_RE.is_match(version) {
        return Err(malformed(format!(
            "'{version}' is not a valid version. Expected format: '<domain>/v<version>' (e.g. kubepattern.it/v1)"
        )));
    }

    let kind = required_text(&root, "kind", "kind")?;
    if kind != PATTERN_KIND {
        return Err(malformed(format!("kind must be '{PATTERN_KIND}', found: {kind}")));
    }

    lint_metadata(&root)?;
    lint_spec(&root)
}

/// [`lint`] rendered as an interactive result
pub fn lint_result(text: &str) -> LintResult {
    match lint(text) {
        Ok(()) => LintResult::ok(),
        Err(e) => LintResult::invalid(e.to_string()),
    }
}

fn lint_metadata(root: &Value) -> Result<()> {
    let metadata = root
        .get("metadata")
        .filter(|m| m.as_object().is_some_and(|m| !m.is_empty()))
        .ok_or_else(|| malformed("metadata is null or empty"))?;

    let name = required_text(metadata, "name", "metadata.name")?;
    if !NAME_RE.is_match(name) {
        return Err(malformed(
            "metadata.name contains invalid characters. Correct format: [a-zA-Z0-9.-]+",
        ));
    }

    required_text(metadata, "displayName", "metadata.displayName")?;

    let pattern_type = required_text(metadata, "patternType", "metadata.patternType")?;
    if !PatternType::ALL.iter().any(|t| t.as_str() == pattern_type) {
        let valid: Vec<_> = PatternType::ALL.iter().map(PatternType::as_str).collect();
        return Err(malformed(format!(
            "metadata.patternType must be one of {valid:?}, found: {pattern_type}"
        )));
    }

    let severity = required_text(metadata, "severity", "metadata.severity")?;
    if !Severity::ALL.iter().any(|s| s.as_str() == severity) {
        let valid: Vec<_> = Severity::ALL.iter().map(Severity::as_str).collect();
        return Err(malformed(format!(
            "metadata.severity must be one of {valid:?}, found: {severity}"
        )));
    }

    let category = required_text(metadata, "category", "metadata.category")?;
    if !CATEGORY_RE.is_match(category) {
        return Err(malformed(
            "metadata.category contains invalid characters. Correct format: [a-zA-Z0-9-]+",
        ));
    }

    for key in ["gitUrl", "docUrl"] {
        if let Some(url) = text(metadata, key) {
            if !URL_RE.is_match(url) {
                return Err(malformed(format!(
                    "metadata.{key} must be a valid URL starting with http:// or https://"
                )));
            }
        }
    }

    if let Some(description) = text(metadata, "description") {
        if description.chars().count() < 10 {
            return Err(malformed("metadata.description must be at least 10 characters long"));
        }
    }
    Ok(())
}

fn lint_spec(root: &Value) -> Result<()> {
    let spec = root
        .get("spec")
        .filter(|s| s.as_object().is_some_and(|s| !s.is_empty()))
        .ok_or_else(|| malformed("spec is null or empty"))?;

    required_text(spec, "message", "spec.message")?;

    let topology = required_text(spec, "topology", "spec.topology")?;
    if !TOPOLOGIES.contains(&topology) {
        return Err(malformed(format!(
            "spec.topology must be one of {TOPOLOGIES:?}, found: {topology}"
        )));
    }

    let resource_ids = lint_resources(spec, topology)?;
    lint_actors(spec, &resource_ids)?;
    lint_relationships(spec, &resource_ids)
}

fn lint_resources<'a>(spec: &'a Value, topology: &str) -> Result<HashSet<&'a str>> {
    let resources = non_empty_array(spec, "resources", "spec.resources")?;
    let mut ids = HashSet::new();
    let mut leaders = 0;

    for (i, resource) in resources.iter().enumerate() {
        required_text(resource, "resource", &format!("spec.resources[{i}].resource"))?;
        let id = required_text(resource, "id", &format!("spec.resources[{i}].id"))?;
        if !ids.insert(id) {
            return Err(malformed(format!("Duplicate resource id found: {id}")));
        }

        if resource.get("leader").and_then(Value::as_bool).unwrap_or(false) {
            leaders += 1;
            if leaders > 1 {
                return Err(malformed(format!(
                    "multiple leaders found. In topology {topology} the leader must be unique"
                )));
            }
        }

        if let Some(filters) = resource.get("filters") {
            lint_filters(filters, i)?;
        }
    }

    if leaders == 0 {
        return Err(malformed("leader not found"));
    }
    Ok(ids)
}

fn lint_filters(filters: &Value, resource_index: usize) -> Result<()> {
    for list in FILTER_LISTS {
        let Some(rules) = filters.get(list) else {
            continue;
        };
        let prefix = format!("spec.resources[{resource_index}].filters.{list}");
        let rules = rules
            .as_array()
            .ok_or_else(|| malformed(format!("{prefix} must be an array")))?;

        for (i, rule) in rules.iter().enumerate() {
            let path = format!("{prefix}[{i}]");
            let key = required_text(rule, "key", &format!("{path}.key"))?;
            compile_query(key).map_err(|e| malformed(format!("{path}.key: {e}")))?;

            let operator = required_text(rule, "operator", &format!("{path}.operator"))?;
            if !FilterOperator::ALL.iter().any(|op| op.as_str() == operator) {
                let valid: Vec<_> =
                    FilterOperator::ALL.iter().map(FilterOperator::as_str).collect();
                return Err(malformed(format!(
                    "{path}.operator must be one of {valid:?}, found: {operator}"
                )));
            }

            if !rule.get("values").is_some_and(Value::is_array) {
                return Err(malformed(format!("{path}.values must be an array")));
            }
        }
    }
    Ok(())
}

fn lint_actors(spec: &Value, resource_ids: &HashSet<&str>) -> Result<()> {
    let actors = non_empty_array(spec, "actors", "spec.actors")?;
    for (i, actor) in actors.iter().enumerate() {
        let id = actor.as_str().unwrap_or_default();
        if !resource_ids.contains(id) {
            return Err(malformed(format!(
                "spec.actors[{i}] references unknown resource: {id}"
            )));
        }
    }
    Ok(())
}

fn lint_relationships(spec: &Value, resource_ids: &HashSet<&str>) -> Result<()> {
    let mut relationship_ids = HashSet::new();

    for list in ["commonRelationships", "relationships"] {
        let Some(items) = spec.get(list).and_then(Value::as_array) else {
            continue;
        };

        for (i, relationship) in items.iter().enumerate() {
            let path = format!("spec.{list}[{i}]");
            let id = required_text(relationship, "id", &format!("{path}.id"))?;
            if !relationship_ids.insert(id) {
                return Err(malformed(format!("Duplicate relationship id found: {id}")));
            }

            let ty = required_text(relationship, "type", &format!("{path}.type"))?;
            if ty.parse::<RelationshipType>().is_err() {
                let valid: Vec<_> =
                    RelationshipType::ALL.iter().map(RelationshipType::as_str).collect();
                return Err(malformed(format!(
                    "{path}.type must be one of {valid:?}, found: {ty}"
                )));
            }

            if let Some(weight) = relationship.get("weight") {
                if weight.as_u64().and_then(|w| u32::try_from(w).ok()).is_none() {
                    return Err(malformed(format!(
                        "{path}.weight must be a non-negative integer, found: {weight}"
                    )));
                }
            }

            let roles = relationship
                .get("resourceIds")
                .and_then(Value::as_array)
                .filter(|ids| ids.len() >= 2)
                .ok_or_else(|| {
                    malformed(format!("{path}.resourceIds must list at least two resource ids"))
                })?;
            for (j, role) in roles.iter().enumerate() {
                let role = role.as_str().unwrap_or_default();
                if !resource_ids.contains(role) {
                    return Err(malformed(format!(
                        "{path}.resourceIds[{j}] references unknown resource: {role}"
                    )));
                }
            }
        }
    }
    Ok(())
}
