use kubepattern_engine::{analyze, lint, parse, Confidence, Score};
use kubepattern_graph::{RelationshipDiscovery, RelationshipType, Resource, ResourceGraph};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

fn object(value: Value) -> Resource {
    Resource::from_object(value).expect("fixture object")
}

fn pod(name: &str, labels: Value, containers: usize) -> Resource {
    let containers: Vec<Value> = (0..containers)
        .map(|i| json!({"name": format!("c{i}"), "image": "busybox"}))
        .collect();
    object(json!({
        "apiVersion": "v1",
        "kind": "Pod",
        "metadata": {"name": name, "namespace": "shop", "uid": format!("uid-{name}"), "labels": labels},
        "spec": {"containers": containers}
    }))
}

fn discovered(resources: Vec<Resource>) -> ResourceGraph {
    let mut graph = ResourceGraph::with_name("test-cluster");
    for r in resources {
        graph.add_resource(r);
    }
    let report = RelationshipDiscovery::default().discover(&mut graph);
    assert_eq!(report.failed().count(), 0);
    graph
}

fn definition(topology: &str, spec: Value) -> String {
    let mut doc = json!({
        "version": "kubepattern.it/v1",
        "kind": "Pattern",
        "metadata": {
            "name": "scenario",
            "displayName": "Scenario",
            "patternType": "STRUCTURAL",
            "severity": "INFO",
            "category": "testing"
        },
        "spec": spec
    });
    doc["spec"]["topology"] = json!(topology);
    doc.to_string()
}

#[test]
fn deployment_and_replica_set_are_mutual_owners() {
    let deployment = object(json!({
        "apiVersion": "apps/v1", "kind": "Deployment",
        "metadata": {"name": "d", "namespace": "shop", "labels": {"app": "foo"}}
    }));
    let replica_set = object(json!({
        "apiVersion": "apps/v1", "kind": "ReplicaSet",
        "metadata": {"name": "r", "namespace": "shop", "labels": {"app": "foo"}}
    }));
    let graph = discovered(vec![deployment.clone(), replica_set.clone()]);

    assert_eq!(graph.neighbours(&deployment, RelationshipType::Owns), vec![&replica_set]);
    assert_eq!(graph.neighbours(&replica_set, RelationshipType::Owns), vec![&deployment]);
}

#[test]
fn namespace_contains_its_pods() {
    let ns = object(json!({"apiVersion": "v1", "kind": "Namespace", "metadata": {"name": "ns1"}}));
    let p = object(json!({
        "apiVersion": "v1", "kind": "Pod",
        "metadata": {"name": "p", "namespace": "ns1"}
    }));
    let graph = discovered(vec![ns.clone(), p.clone()]);

    assert!(graph.is_neighbour(&ns, &p, RelationshipType::IsNamespaceOf));
    assert!(graph.has_namespace("ns1"));
}

#[test]
fn sidecar_single_topology_from_definition_text() {
    let text = definition(
        "SINGLE",
        json!({
            "message": "Pod {{pod.name}} in {{pod.namespace}} runs a sidecar",
            "actors": ["pod"],
            "resources": [{
                "id": "pod", "resource": "Pod", "leader": true,
                "filters": {"matchAll": [
                    {"key": "$.spec.containers", "operator": "ARRAY_SIZE_GREATER_THAN", "values": ["1"]}
                ]}
            }]
        }),
    );
    lint(&text).unwrap();
    let def = parse(&text).unwrap();

    let graph = discovered(vec![
        pod("one", json!({}), 1),
        pod("two", json!({}), 2),
        pod("three", json!({}), 3),
    ]);
    let matches = analyze(&def, &graph).unwrap();

    assert_eq!(matches.len(), 2);
    assert!(matches.iter().all(|m| m.resources.len() == 1 && m.scores.is_empty()));
    assert!(matches.iter().any(|m| m.message == "Pod two in shop runs a sidecar"));
    assert!(matches.iter().all(|m| m.confidence() == Confidence::High));
}

#[test]
fn network_pair_leader_follower_from_definition_text() {
    let text = definition(
        "LEADER_FOLLOWER",
        json!({
            "message": "{{leader.name}} talks to {{follower.name}}",
            "actors": ["leader", "follower"],
            "resources": [
                {"id": "leader", "resource": "Pod", "leader": true},
                {"id": "follower", "resource": "Pod"}
            ],
            "commonRelationships": [
                {"id": "net", "type": "SAME_NETWORK", "resourceIds": ["leader", "follower"],
                 "required": false, "shared": true, "weight": 10}
            ],
            "minCommonRelationshipPoints": 10
        }),
    );
    lint(&text).unwrap();
    let def = parse(&text).unwrap();

    let policy = object(json!({
        "apiVersion": "networking.k8s.io/v1", "kind": "NetworkPolicy",
        "metadata": {"name": "backend", "namespace": "shop"},
        "spec": {"podSelector": {"matchLabels": {"tier": "backend"}}}
    }));
    let graph = discovered(vec![
        policy,
        pod("api", json!({"tier": "backend"}), 1),
        pod("db", json!({"tier": "backend"}), 1),
        pod("web", json!({"tier": "frontend"}), 1),
    ]);

    let matches = analyze(&def, &graph).unwrap();
    let mut pairs: Vec<String> = matches.iter().map(|m| m.message.clone()).collect();
    pairs.sort();
    assert_eq!(pairs, vec!["api talks to db", "db talks to api"]);
    for m in &matches {
        assert_eq!(m.scores, vec![Score::common_relationships(10)]);
    }
}

#[test]
fn exposed_pods_need_a_service() {
    let text = definition(
        "SINGLE",
        json!({
            "message": "{{pod.name}} is not exposed",
            "actors": ["pod", "svc"],
            "resources": [
                {"id": "pod", "resource": "Pod", "leader": true},
                {"id": "svc", "resource": "Service"}
            ],
            "relationships": [
                {"id": "exposed", "type": "EXPOSES", "resourceIds": ["pod", "svc"],
                 "required": true, "shared": false, "weight": 0}
            ]
        }),
    );
    lint(&text).unwrap();
    let def = parse(&text).unwrap();

    let service = object(json!({
        "apiVersion": "v1", "kind": "Service",
        "metadata": {"name": "web", "namespace": "shop"},
        "spec": {"selector": {"app": "web"}}
    }));
    let graph = discovered(vec![
        service,
        pod("web-1", json!({"app": "web"}), 1),
        pod("batch-1", json!({"app": "batch"}), 1),
    ]);

    let matches = analyze(&def, &graph).unwrap();
    let messages: Vec<&str> = matches.iter().map(|m| m.message.as_str()).collect();
    assert_eq!(messages, vec!["batch-1 is not exposed"]);
}
