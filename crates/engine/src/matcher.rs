//! Pattern matching: definition + graph -> scored matches.

use crate::definition::{PatternDefinition, RelationshipDefinition, Topology, Verdict};
use crate::error::{EngineError, Result};
use crate::pattern_match::{BoundResource, PatternMatch, Score};
use kubepattern_graph::{Resource, ResourceGraph};
use std::collections::BTreeMap;

/// Candidate resources per role, after per-resource filtering
type Candidates<'g> = BTreeMap<&'g str, Vec<&'g Resource>>;

/// Evaluate one definition against a populated graph.
///
/// Pure function of its inputs; the graph is only read.
pub fn analyze(
    definition: &PatternDefinition,
    graph: &ResourceGraph,
) -> Result<Vec<PatternMatch>> {
    if definition.kind_of(&definition.leader_id).is_none() {
        return Err(EngineError::malformed(format!(
            "leader role '{}' is not bound to a resource kind",
            definition.leader_id
        )));
    }

    // leaders stay in the pool; a relationship may pair the leader role with itself
    let candidates = expand_roles(definition, graph);
    let leaders = candidates
        .get(definition.leader_id.as_str())
        .cloned()
        .unwrap_or_default();
    let leaders = scope_leaders(definition, graph, leaders, &candidates);

    let matches = match &definition.topology {
        Topology::Single => single_matches(definition, &leaders),
        Topology::LeaderFollower => {
            leader_follower_matches(definition, graph, &leaders, &candidates)
        }
        Topology::Unsupported(raw) => {
            log::warn!(
                "Pattern '{}' has unsupported topology '{}', no matches",
                definition.name(),
                raw
            );
            Vec::new()
        }
    };

    log::info!(
        "Pattern '{}': {} match(es) from {} leader candidate(s)",
        definition.name(),
        matches.len(),
        leaders.len()
    );
    Ok(matches)
}

fn expand_roles<'g>(
    definition: &'g PatternDefinition,
    graph: &'g ResourceGraph,
) -> Candidates<'g> {
    definition
        .resources
        .iter()
        .map(|(role, kind)| {
            let resources = graph.resources_by_kind(kind);
            let before = resources.len();
            let kept: Vec<&Resource> = match definition.filter_of(role) {
                Some(filter) => resources.into_iter().filter(|r| filter.apply(r)).collect(),
                None => resources,
            };
            log::debug!(
                "Role '{}' ({}): {}/{} candidates pass filters",
                role,
                kind,
                kept.len(),
                before
            );
            (role.as_str(), kept)
        })
        .collect()
}

enum Tally {
    Vetoed(String),
    Points(u32),
}

/// Fold a list of constraints through the veto-or-score rule.
fn tally<'d>(
    relationships: impl IntoIterator<Item = &'d RelationshipDefinition>,
    mut present: impl FnMut(&RelationshipDefinition) -> bool,
) -> Tally {
    let mut points = 0u32;
    for relationship in relationships {
        match relationship.judge(present(relationship)) {
            Verdict::Veto => return Tally::Vetoed(relationship.id.clone()),
            Verdict::Points(weight) => points = points.saturating_add(weight),
            Verdict::Neutral => {}
        }
    }
    Tally::Points(points)
}

/// Drop leader candidates vetoed by, or scoring too low on, the role-pair relationships.
fn scope_leaders<'g>(
    definition: &PatternDefinition,
    graph: &ResourceGraph,
    leaders: Vec<&'g Resource>,
    candidates: &Candidates<'g>,
) -> Vec<&'g Resource> {
    let scoped: Vec<&RelationshipDefinition> = definition
        .relationships
        .iter()
        .filter(|r| r.first_role() == Some(definition.leader_id.as_str()))
        .collect();
    if scoped.len() < definition.relationships.len() {
        log::debug!(
            "Pattern '{}': {} relationship(s) not led by '{}' ignored",
            definition.name(),
            definition.relationships.len() - scoped.len(),
            definition.leader_id
        );
    }

    leaders
        .into_iter()
        .filter(|leader| {
            let verdict = tally(scoped.iter().copied(), |relationship| {
                let followers = relationship
                    .second_role()
                    .and_then(|role| candidates.get(role))
                    .map(Vec::as_slice)
                    .unwrap_or_default();
                followers.iter().any(|follower| {
                    graph.is_neighbour(leader, follower, relationship.relationship_type)
                })
            });

            match verdict {
                Tally::Vetoed(id) => {
                    log::debug!("Leader {leader} vetoed by relationship '{id}'");
                    false
                }
                Tally::Points(points) if points < definition.min_rel_points => {
                    log::debug!(
                        "Leader {leader} scored {points} < {} relationship points",
                        definition.min_rel_points
                    );
                    false
                }
                Tally::Points(_) => true,
            }
        })
        .collect()
}

fn single_matches(definition: &PatternDefinition, leaders: &[&Resource]) -> Vec<PatternMatch> {
    leaders
        .iter()
        .map(|leader| {
            PatternMatch::new(
                definition.metadata.clone(),
                &definition.message,
                vec![BoundResource {
                    role: definition.leader_id.clone(),
                    resource: (*leader).clone(),
                }],
                Vec::new(),
            )
        })
        .collect()
}

fn leader_follower_matches(
    definition: &PatternDefinition,
    graph: &ResourceGraph,
    leaders: &[&Resource],
    candidates: &Candidates<'_>,
) -> Vec<PatternMatch> {
    let Some(follower_id) = definition.follower_id() else {
        log::warn!("Pattern '{}' has no follower actor", definition.name());
        return Vec::new();
    };
    let followers = candidates.get(follower_id).map(Vec::as_slice).unwrap_or_default();
    if leaders.is_empty() || followers.is_empty() {
        log::debug!(
            "Pattern '{}': {} leader(s), {} follower(s), nothing to pair",
            definition.name(),
            leaders.len(),
            followers.len()
        );
        return Vec::new();
    }

    let mut matches = Vec::new();
    for leader in leaders {
        for follower in followers {
            if leader == follower {
                continue;
            }

            let verdict = tally(&definition.common_relationships, |relationship| {
                graph.same_neighbour(leader, follower, relationship.relationship_type)
            });
            let points = match verdict {
                Tally::Vetoed(id) => {
                    log::debug!("Pair {leader} / {follower} vetoed by '{id}'");
                    continue;
                }
                Tally::Points(points) => points,
            };
            if points < definition.min_common_rel_points {
                log::debug!(
                    "Pair {leader} / {follower} scored {points} < {} common points",
                    definition.min_common_rel_points
                );
                continue;
            }

            matches.push(PatternMatch::new(
                definition.metadata.clone(),
                &definition.message,
                vec![
                    BoundResource {
                        role: definition.leader_id.clone(),
                        resource: (*leader).clone(),
                    },
                    BoundResource {
                        role: follower_id.to_string(),
                        resource: (*follower).clone(),
                    },
                ],
                vec![Score::common_relationships(points)],
            ));
        }
    }
    matches
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{FilterOperator, FilterRule, ResourceFilter};
    use kubepattern_graph::RelationshipType;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn pod(name: &str, containers: usize) -> Resource {
        let containers: Vec<_> = (0..containers)
            .map(|i| json!({"name": format!("c{i}")}))
            .collect();
        Resource::from_object(json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {"name": name, "namespace": "shop"},
            "spec": {"containers": containers}
        }))
        .unwrap()
    }

    fn service(name: &str) -> Resource {
        Resource::new("v1", "Service", name, Some("shop"))
    }

    #[test]
    fn single_topology_emits_one_match_per_filtered_leader() {
        let mut graph = ResourceGraph::new();
        for (name, count) in [("one", 1), ("two", 2), ("three", 3)] {
            graph.add_resource(pod(name, count));
        }

        let filter = ResourceFilter::new().with_all(FilterRule::new(
            "$.spec.containers",
            FilterOperator::ArraySizeGreaterThan,
            vec!["1".to_string()],
        ));
        let definition = PatternDefinition::new("sidecar", Topology::Single, "pod")
            .with_role("pod", "Pod")
            .with_filter("pod", filter)
            .with_message("{{pod.name}} runs a sidecar");

        let matches = analyze(&definition, &graph).unwrap();
        assert_eq!(matches.len(), 2);
        for m in &matches {
            assert_eq!(m.resources.len(), 1);
            assert!(m.scores.is_empty());
        }
        let mut messages: Vec<_> = matches.iter().map(|m| m.message.as_str()).collect();
        messages.sort();
        assert_eq!(messages, vec!["three runs a sidecar", "two runs a sidecar"]);
    }

    #[test]
    fn leader_follower_pairs_need_shared_network() {
        let policy = Resource::new("networking.k8s.io/v1", "NetworkPolicy", "np", Some("shop"));
        let a = pod("a", 1);
        let b = pod("b", 1);
        let loner = pod("loner", 1);

        let mut graph = ResourceGraph::new();
        for r in [&policy, &a, &b, &loner] {
            graph.add_resource(r.clone());
        }
        graph.add_relationship(&policy, &a, RelationshipType::SameNetwork).unwrap();
        graph.add_relationship(&policy, &b, RelationshipType::SameNetwork).unwrap();

        let definition = PatternDefinition::new("network-pair", Topology::LeaderFollower, "leader")
            .with_role("leader", "Pod")
            .with_role("follower", "Pod")
            .with_common_relationship(
                RelationshipDefinition::new("net", RelationshipType::SameNetwork, false, true, 10)
                    .between("leader", "follower"),
            )
            .with_min_points(0, 10);

        let matches = analyze(&definition, &graph).unwrap();
        let pairs: Vec<(String, String)> = matches
            .iter()
            .map(|m| (m.resources[0].resource.name.clone(), m.resources[1].resource.name.clone()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("a".to_string(), "b".to_string()),
                ("b".to_string(), "a".to_string())
            ]
        );
        for m in &matches {
            assert_eq!(m.scores, vec![Score::common_relationships(10)]);
        }
        assert_eq!(matches[0].dedup_id(), matches[1].dedup_id());
    }

    #[test]
    fn required_common_relationship_vetoes_pairs() {
        let a = pod("a", 1);
        let b = pod("b", 1);
        let mut graph = ResourceGraph::new();
        graph.add_resource(a);
        graph.add_resource(b);

        let definition = PatternDefinition::new("p", Topology::LeaderFollower, "leader")
            .with_role("leader", "Pod")
            .with_role("follower", "Pod")
            .with_common_relationship(RelationshipDefinition::new(
                "net",
                RelationshipType::SameNetwork,
                true,
                true,
                0,
            ));
        assert!(analyze(&definition, &graph).unwrap().is_empty());

        let forbidden = PatternDefinition::new("p", Topology::LeaderFollower, "leader")
            .with_role("leader", "Pod")
            .with_role("follower", "Pod")
            .with_common_relationship(RelationshipDefinition::new(
                "net",
                RelationshipType::SameNetwork,
                true,
                false,
                0,
            ));
        assert_eq!(analyze(&forbidden, &graph).unwrap().len(), 2);
    }

    #[test]
    fn relationship_scoping_vetoes_and_scores_leaders() {
        let exposed = pod("exposed", 1);
        let hidden = pod("hidden", 1);
        let svc = service("web");

        let mut graph = ResourceGraph::new();
        for r in [&exposed, &hidden, &svc] {
            graph.add_resource(r.clone());
        }
        graph.add_relationship(&svc, &exposed, RelationshipType::Exposes).unwrap();

        let required = PatternDefinition::new("exposed-pod", Topology::Single, "pod")
            .with_role("pod", "Pod")
            .with_role("svc", "Service")
            .with_relationship(
                RelationshipDefinition::new("exp", RelationshipType::Exposes, true, true, 0)
                    .between("pod", "svc"),
            );
        let names: Vec<_> = analyze(&required, &graph)
            .unwrap()
            .into_iter()
            .map(|m| m.resources[0].resource.name.clone())
            .collect();
        assert_eq!(names, vec!["exposed"]);

        let scored = PatternDefinition::new("hidden-pod", Topology::Single, "pod")
            .with_role("pod", "Pod")
            .with_role("svc", "Service")
            .with_relationship(
                RelationshipDefinition::new("exp", RelationshipType::Exposes, false, false, 5)
                    .between("pod", "svc"),
            )
            .with_min_points(5, 0);
        let names: Vec<_> = analyze(&scored, &graph)
            .unwrap()
            .into_iter()
            .map(|m| m.resources[0].resource.name.clone())
            .collect();
        assert_eq!(names, vec!["hidden"]);
    }

    #[test]
    fn relationships_may_pair_the_leader_role_with_itself() {
        let a = pod("a", 1);
        let b = pod("b", 1);
        let loner = pod("loner", 1);
        let mut graph = ResourceGraph::new();
        for r in [&a, &b, &loner] {
            graph.add_resource(r.clone());
        }
        graph.add_relationship(&a, &b, RelationshipType::SameNetwork).unwrap();

        let definition = PatternDefinition::new("peered", Topology::Single, "pod")
            .with_role("pod", "Pod")
            .with_relationship(
                RelationshipDefinition::new("peer", RelationshipType::SameNetwork, true, true, 0)
                    .between("pod", "pod"),
            );
        let mut names: Vec<_> = analyze(&definition, &graph)
            .unwrap()
            .into_iter()
            .map(|m| m.resources[0].resource.name.clone())
            .collect();
        names.sort();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn unsupported_topology_yields_nothing() {
        let mut graph = ResourceGraph::new();
        graph.add_resource(pod("a", 1));
        let definition = PatternDefinition::new("mesh", Topology::Unsupported("MESH".into()), "pod")
            .with_role("pod", "Pod");
        assert!(analyze(&definition, &graph).unwrap().is_empty());
    }

    #[test]
    fn unbound_leader_is_malformed() {
        let definition = PatternDefinition::new("broken", Topology::Single, "pod");
        let err = analyze(&definition, &ResourceGraph::new()).unwrap_err();
        assert!(err.to_string().starts_with("Error Parsing Pattern:"));
    }
}
