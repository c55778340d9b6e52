use crate::definition::{
    PatternDefinition, PatternMetadata, PatternType, RelationshipDefinition, Severity, Topology,
};
use crate::error::{EngineError, Result};
use crate::filter::{stringify, FilterOperator, FilterRule, ResourceFilter};
use kubepattern_graph::RelationshipType;
use kubepattern_protocol::{FilterRuleDoc, FiltersDoc, PatternDocument, RelationshipDoc};
use std::collections::BTreeMap;

/// Parse definition text into an evaluable definition.
///
/// Expects text that already passed [`crate::lint`]; remaining problems
/// still surface as [`EngineError::MalformedPattern`].
pub fn parse(text: &str) -> Result<PatternDefinition> {
    let document: PatternDocument =
        serde_json::from_str(text).map_err(|e| EngineError::malformed(e.to_string()))?;
    from_document(document)
}

pub fn from_document(document: PatternDocument) -> Result<PatternDefinition> {
    let PatternDocument {
        version,
        metadata,
        spec,
        ..
    } = document;

    let metadata = PatternMetadata {
        version,
        severity: metadata
            .severity
            .parse::<Severity>()
            .map_err(EngineError::malformed)?,
        pattern_type: metadata
            .pattern_type
            .parse::<PatternType>()
            .map_err(EngineError::malformed)?,
        name: metadata.name,
        display_name: metadata.display_name,
        description: metadata.description.unwrap_or_default(),
        doc_url: metadata.doc_url.unwrap_or_default(),
        git_url: metadata.git_url.unwrap_or_default(),
        category: metadata.category,
    };

    let leader_id = spec
        .resources
        .iter()
        .find(|r| r.leader)
        .map(|r| r.id.clone())
        .ok_or_else(|| EngineError::malformed("leader not found"))?;

    let mut resources = BTreeMap::new();
    let mut resource_filters = BTreeMap::new();
    for role in spec.resources {
        if let Some(filters) = role.filters {
            resource_filters.insert(role.id.clone(), convert_filters(filters)?);
        }
        resources.insert(role.id, role.resource);
    }

    let definition = PatternDefinition {
        leader_id,
        topology: Topology::parse(&spec.topology),
        message: spec.message,
        actors: spec.actors,
        resources,
        resource_filters,
        relationships: convert_relationships(spec.relationships)?,
        common_relationships: convert_relationships(spec.common_relationships)?,
        min_rel_points: spec.min_relationship_points,
        min_common_rel_points: spec.min_common_relationship_points,
        metadata,
    };

    log::debug!(
        "Parsed pattern '{}' ({} roles, {} relationships, {} common)",
        definition.name(),
        definition.resources.len(),
        definition.relationships.len(),
        definition.common_relationships.len()
    );
    Ok(definition)
}

fn convert_filters(filters: FiltersDoc) -> Result<ResourceFilter> {
    Ok(ResourceFilter {
        match_all: convert_rules(filters.match_all)?,
        match_any: convert_rules(filters.match_any)?,
        match_none: convert_rules(filters.match_none)?,
    })
}

fn convert_rules(rules: Vec<FilterRuleDoc>) -> Result<Vec<FilterRule>> {
    rules
        .into_iter()
        .map(|rule| {
            let operator = rule
                .operator
                .parse::<FilterOperator>()
                .map_err(EngineError::malformed)?;
            let values = rule.values.iter().map(stringify).collect();
            Ok(FilterRule::new(rule.key, operator, values))
        })
        .collect()
}

fn convert_relationships(
    relationships: Vec<RelationshipDoc>,
) -> Result<Vec<RelationshipDefinition>> {
    relationships
        .into_iter()
        .map(|doc| {
            let relationship_type = doc
                .relationship_type
                .parse::<RelationshipType>()
                .map_err(|e| EngineError::malformed(e.to_string()))?;
            Ok(RelationshipDefinition {
                id: doc.id,
                relationship_type,
                required: doc.required,
                shared: doc.shared,
                weight: doc.weight,
                resources: doc.resource_ids,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn document() -> serde_json::Value {
        json!({
            "version": "kubepattern.it/v1",
            "kind": "Pattern",
            "metadata": {
                "name": "network-pair",
                "displayName": "Network Pair",
                "patternType": "STRUCTURAL",
                "severity": "WARNING",
                "category": "networking",
                "docUrl": "https://kubepattern.it/docs/network-pair"
            },
            "spec": {
                "message": "{{leader.name}} and {{follower.name}} share a network",
                "topology": "LEADER_FOLLOWER",
                "actors": ["leader", "follower"],
                "resources": [
                    {"id": "leader", "resource": "Pod", "leader": true,
                     "filters": {"matchNone": [{"key": "$.spec.hostNetwork", "operator": "EQUALS", "values": [true]}]}},
                    {"id": "follower", "resource": "Pod"}
                ],
                "commonRelationships": [
                    {"id": "net", "type": "SAME_NETWORK", "resourceIds": ["leader", "follower"],
                     "required": false, "shared": true, "weight": 10}
                ],
                "minRelationshipPoints": 3,
                "minCommonRelationshipPoints": 10
            }
        })
    }

    #[test]
    fn parses_full_document() {
        let def = parse(&document().to_string()).unwrap();

        assert_eq!(def.name(), "network-pair");
        assert_eq!(def.metadata.display_name, "Network Pair");
        assert_eq!(def.metadata.severity, Severity::Warning);
        assert_eq!(def.metadata.pattern_type, PatternType::Structural);
        assert_eq!(def.leader_id, "leader");
        assert_eq!(def.follower_id(), Some("follower"));
        assert_eq!(def.topology, Topology::LeaderFollower);
        assert_eq!(def.kind_of("follower"), Some("Pod"));
        assert!(def.filter_of("follower").is_none());

        let filter = def.filter_of("leader").unwrap();
        assert_eq!(filter.match_none.len(), 1);
        assert_eq!(filter.match_none[0].values(), ["true".to_string()]);

        assert_eq!(def.common_relationships.len(), 1);
        assert_eq!(def.common_relationships[0].relationship_type, RelationshipType::SameNetwork);
        assert_eq!(def.common_relationships[0].weight, 10);
        assert_eq!(def.min_rel_points, 3);
        assert_eq!(def.min_common_rel_points, 10);
    }

    #[test]
    fn min_points_default_to_zero() {
        let mut doc = document();
        let spec = doc["spec"].as_object_mut().unwrap();
        spec.remove("minRelationshipPoints");
        spec.remove("minCommonRelationshipPoints");
        let def = parse(&doc.to_string()).unwrap();
        assert_eq!((def.min_rel_points, def.min_common_rel_points), (0, 0));
    }

    #[test]
    fn unknown_topology_parses_as_unsupported() {
        let mut doc = document();
        doc["spec"]["topology"] = json!("MESH");
        let def = parse(&doc.to_string()).unwrap();
        assert_eq!(def.topology, Topology::Unsupported("MESH".to_string()));
    }

    #[test]
    fn unknown_operator_or_type_is_malformed() {
        let mut doc = document();
        doc["spec"]["resources"][0]["filters"]["matchNone"][0]["operator"] = json!("LIKE");
        let err = parse(&doc.to_string()).unwrap_err();
        assert!(matches!(err, EngineError::MalformedPattern(_)));

        let mut doc = document();
        doc["spec"]["commonRelationships"][0]["type"] = json!("FRIENDS_WITH");
        let err = parse(&doc.to_string()).unwrap_err();
        assert!(err.to_string().starts_with("Error Parsing Pattern:"));
    }

    #[test]
    fn aliases_are_accepted() {
        let mut doc = document();
        doc["spec"]["commonRelationships"][0]["type"] = json!("USES_SA");
        let def = parse(&doc.to_string()).unwrap();
        assert_eq!(
            def.common_relationships[0].relationship_type,
            RelationshipType::UsesServiceAccount
        );
    }
}
