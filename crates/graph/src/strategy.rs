use crate::error::{GraphError, Result};
use crate::graph::ResourceGraph;
use crate::types::{RelationshipType, Resource, ResourceId};
use serde_json::Value;
use std::collections::BTreeMap;

/// Labels a portal Markdown widget may use to name its manager
const MANAGED_BY_LABELS: [&str; 3] = ["managed-by", "krateo.io/managed-by", "krateo.io/portal"];

/// (from kind, to kind, plural used in `spec.resourcesRefs.items[].resource`)
const WIDGET_REFERENCES: &[(&str, &str, &str)] = &[
    ("Panel", "Table", "tables"),
    ("Column", "Table", "tables"),
    ("Row", "Table", "tables"),
    ("Page", "Table", "tables"),
    ("Panel", "Markdown", "markdowns"),
    ("Column", "Markdown", "markdowns"),
    ("Row", "Markdown", "markdowns"),
    ("Page", "Markdown", "markdowns"),
    ("Panel", "Row", "rows"),
    ("Column", "Row", "rows"),
    ("Row", "Row", "rows"),
    ("Page", "Row", "rows"),
    ("Panel", "Column", "columns"),
    ("Column", "Column", "columns"),
    ("Row", "Column", "columns"),
    ("Page", "Column", "columns"),
    ("Panel", "Panel", "panels"),
    ("Column", "Panel", "panels"),
    ("Row", "Panel", "panels"),
    ("Page", "Panel", "panels"),
    ("NavMenuItem", "Page", "pages"),
    ("Panel", "Filter", "filters"),
    ("Row", "Filter", "filters"),
    ("Column", "Filter", "filters"),
    ("Page", "Filter", "filters"),
    ("Panel", "PieChart", "piecharts"),
    ("Row", "PieChart", "piecharts"),
    ("Column", "PieChart", "piecharts"),
    ("Panel", "LineChart", "linecharts"),
    ("Row", "LineChart", "linecharts"),
    ("Column", "LineChart", "linecharts"),
    ("Panel", "BarChart", "barcharts"),
    ("Row", "BarChart", "barcharts"),
    ("Column", "BarChart", "barcharts"),
];

/// One category of relationship discovery.
///
/// Strategies only read the current vertex set and never depend on edges
/// added by other strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    DeploymentToReplicaSet,
    ReplicaSetToPod,
    IsNamespaceOf,
    PodToVolume,
    ServiceToPod,
    UsesConfig,
    UsesServiceAccount,
    NetworkPolicyToPod,
    ReferencesWidget,
    ManagesWidget,
}

type Link = (ResourceId, ResourceId);

impl Strategy {
    /// Every built-in strategy, in registration order
    pub const ALL: [Strategy; 10] = [
        Strategy::DeploymentToReplicaSet,
        Strategy::ReplicaSetToPod,
        Strategy::IsNamespaceOf,
        Strategy::PodToVolume,
        Strategy::ServiceToPod,
        Strategy::UsesConfig,
        Strategy::UsesServiceAccount,
        Strategy::NetworkPolicyToPod,
        Strategy::ReferencesWidget,
        Strategy::ManagesWidget,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Strategy::DeploymentToReplicaSet => "DeploymentToReplicaSet",
            Strategy::ReplicaSetToPod => "ReplicaSetToPod",
            Strategy::IsNamespaceOf => "IsNamespaceOf",
            Strategy::PodToVolume => "PodToVolume",
            Strategy::ServiceToPod => "ServiceToPod",
            Strategy::UsesConfig => "UsesConfig",
            Strategy::UsesServiceAccount => "UsesServiceAccount",
            Strategy::NetworkPolicyToPod => "NetworkPolicyToPod",
            Strategy::ReferencesWidget => "ReferencesWidget",
            Strategy::ManagesWidget => "ManagesWidget",
        }
    }

    pub fn relationship_type(&self) -> RelationshipType {
        match self {
            Strategy::DeploymentToReplicaSet => RelationshipType::Owns,
            Strategy::ReplicaSetToPod => RelationshipType::Manages,
            Strategy::IsNamespaceOf => RelationshipType::IsNamespaceOf,
            Strategy::PodToVolume => RelationshipType::Mounts,
            Strategy::ServiceToPod => RelationshipType::Exposes,
            Strategy::UsesConfig => RelationshipType::UsesConfig,
            Strategy::UsesServiceAccount => RelationshipType::UsesServiceAccount,
            Strategy::NetworkPolicyToPod => RelationshipType::SameNetwork,
            Strategy::ReferencesWidget => RelationshipType::ReferencesWidget,
            Strategy::ManagesWidget => RelationshipType::ManagesWidget,
        }
    }

    /// Inspect the graph and add this strategy's edges; returns the number added.
    ///
    /// Links are collected before any edge is written, so a failing strategy
    /// leaves the graph untouched.
    pub fn analyze(&self, graph: &mut ResourceGraph) -> Result<usize> {
        let links = match self {
            Strategy::DeploymentToReplicaSet => {
                same_label_links(graph, "Deployment", "ReplicaSet", false)
            }
            Strategy::ReplicaSetToPod => same_label_links(graph, "ReplicaSet", "Pod", true),
            Strategy::IsNamespaceOf => namespace_links(graph),
            Strategy::PodToVolume => volume_links(graph),
            Strategy::ServiceToPod => service_links(graph)?,
            Strategy::UsesConfig => config_links(graph),
            Strategy::UsesServiceAccount => service_account_links(graph),
            Strategy::NetworkPolicyToPod => network_policy_links(graph)?,
            Strategy::ReferencesWidget => widget_reference_links(graph),
            Strategy::ManagesWidget => widget_manager_links(graph),
        };

        let relationship_type = self.relationship_type();
        let mut added = 0;
        for (from, to) in links {
            if graph.add_relationship_with(&from, &to, relationship_type, None)? {
                added += 1;
            }
        }
        Ok(added)
    }

    /// Whether this strategy cares about `resource`
    pub fn involve(&self, resource: &Resource) -> bool {
        let kind = resource.kind.as_str();
        match self {
            Strategy::DeploymentToReplicaSet => matches!(kind, "Deployment" | "ReplicaSet"),
            Strategy::ReplicaSetToPod => matches!(kind, "ReplicaSet" | "Pod"),
            Strategy::IsNamespaceOf => kind == "Namespace" || !resource.is_cluster_scoped(),
            Strategy::PodToVolume => match kind {
                "PersistentVolumeClaim" => true,
                "Pod" => array_at(resource.object(), "/spec/volumes").next().is_some(),
                _ => false,
            },
            Strategy::ServiceToPod => matches!(kind, "Service" | "Pod"),
            Strategy::UsesConfig => matches!(kind, "Pod" | "ConfigMap" | "Secret"),
            Strategy::UsesServiceAccount => matches!(kind, "Pod" | "ServiceAccount"),
            Strategy::NetworkPolicyToPod => matches!(kind, "NetworkPolicy" | "Pod"),
            Strategy::ReferencesWidget => WIDGET_REFERENCES
                .iter()
                .any(|(from, to, _)| *from == kind || *to == kind),
            Strategy::ManagesWidget => matches!(kind, "Markdown" | "Table" | "Paragraph"),
        }
    }
}

fn array_at<'a>(value: &'a Value, pointer: &str) -> impl Iterator<Item = &'a Value> {
    value
        .pointer(pointer)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
}

fn str_at<'a>(value: &'a Value, pointer: &str) -> Option<&'a str> {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

fn same_label_links(
    graph: &ResourceGraph,
    from_kind: &str,
    to_kind: &str,
    same_namespace: bool,
) -> Vec<Link> {
    let mut links = Vec::new();
    for from in graph.resources_by_kind(from_kind) {
        for to in graph.resources_by_kind(to_kind) {
            if same_namespace && !from.same_namespace(to) {
                continue;
            }
            if from.has_same_label_value(to, "app") {
                links.push((from.id(), to.id()));
            }
        }
    }
    links
}

fn namespace_links(graph: &ResourceGraph) -> Vec<Link> {
    graph
        .resources_by_kind("Namespace")
        .into_iter()
        .flat_map(|ns| {
            graph
                .resources_by_namespace(&ns.name)
                .into_iter()
                .map(move |r| (ns.id(), r.id()))
        })
        .collect()
}

/// First resource of `kind` named `name` in `namespace`
fn find_named<'g>(
    graph: &'g ResourceGraph,
    kind: &str,
    name: &str,
    namespace: &str,
) -> Option<&'g Resource> {
    graph
        .resources_by_kind(kind)
        .into_iter()
        .find(|r| r.name == name && r.namespace_or_empty() == namespace)
}

fn volume_links(graph: &ResourceGraph) -> Vec<Link> {
    let mut links = Vec::new();
    for pod in graph.resources_by_kind("Pod") {
        for volume in array_at(pod.object(), "/spec/volumes") {
            let Some(claim) = str_at(volume, "/persistentVolumeClaim/claimName") else {
                continue;
            };
            match find_named(graph, "PersistentVolumeClaim", claim, pod.namespace_or_empty()) {
                Some(pvc) => links.push((pod.id(), pvc.id())),
                None => log::debug!("Pod {pod} mounts unknown claim {claim}"),
            }
        }
    }
    links
}

fn service_links(graph: &ResourceGraph) -> Result<Vec<Link>> {
    let mut links = Vec::new();
    let pods = graph.resources_by_kind("Pod");

    for service in graph.resources_by_kind("Service") {
        let selector = match service.object().pointer("/spec/selector") {
            None | Some(Value::Null) => continue,
            Some(Value::Object(map)) => map,
            Some(other) => {
                return Err(GraphError::strategy(
                    Strategy::ServiceToPod.name(),
                    format!("service {service} has a non-object selector: {other}"),
                ))
            }
        };
        if selector.is_empty() {
            continue;
        }

        for pod in &pods {
            if !service.same_namespace(pod) {
                continue;
            }
            let matches = selector
                .iter()
                .all(|(key, value)| value.as_str().is_some_and(|v| pod.label(key) == Some(v)));
            if matches {
                links.push((service.id(), pod.id()));
            }
        }
    }
    Ok(links)
}

/// ConfigMap and Secret names referenced by a pod spec
fn config_references(pod: &Resource) -> (Vec<&str>, Vec<&str>) {
    let spec = pod.object();
    let mut config_maps = Vec::new();
    let mut secrets = Vec::new();

    for volume in array_at(spec, "/spec/volumes") {
        config_maps.extend(str_at(volume, "/configMap/name"));
        secrets.extend(str_at(volume, "/secret/secretName"));
        for source in array_at(volume, "/projected/sources") {
            config_maps.extend(str_at(source, "/configMap/name"));
            secrets.extend(str_at(source, "/secret/name"));
        }
    }

    let containers =
        array_at(spec, "/spec/containers").chain(array_at(spec, "/spec/initContainers"));
    for container in containers {
        for env_from in array_at(container, "/envFrom") {
            config_maps.extend(str_at(env_from, "/configMapRef/name"));
            secrets.extend(str_at(env_from, "/secretRef/name"));
        }
        for env in array_at(container, "/env") {
            config_maps.extend(str_at(env, "/valueFrom/configMapKeyRef/name"));
            secrets.extend(str_at(env, "/valueFrom/secretKeyRef/name"));
        }
    }

    (config_maps, secrets)
}

fn config_links(graph: &ResourceGraph) -> Vec<Link> {
    let mut links = Vec::new();
    for pod in graph.resources_by_kind("Pod") {
        let (config_maps, secrets) = config_references(pod);
        let namespace = pod.namespace_or_empty();
        let targets = config_maps
            .into_iter()
            .filter_map(|name| find_named(graph, "ConfigMap", name, namespace))
            .chain(
                secrets
                    .into_iter()
                    .filter_map(|name| find_named(graph, "Secret", name, namespace)),
            );
        for target in targets {
            links.push((pod.id(), target.id()));
        }
    }
    links
}

fn service_account_links(graph: &ResourceGraph) -> Vec<Link> {
    graph
        .resources_by_kind("Pod")
        .into_iter()
        .filter_map(|pod| {
            let account = str_at(pod.object(), "/spec/serviceAccountName").unwrap_or("default");
            find_named(graph, "ServiceAccount", account, pod.namespace_or_empty())
                .map(|sa| (pod.id(), sa.id()))
        })
        .collect()
}

/// Evaluate a Kubernetes label selector (`matchLabels` + `matchExpressions`).
///
/// An empty selector selects everything.
fn selector_matches(selector: &Value, labels: &BTreeMap<String, String>) -> Result<bool> {
    if let Some(match_labels) = selector.get("matchLabels").and_then(Value::as_object) {
        let all = match_labels.iter().all(|(key, value)| {
            value
                .as_str()
                .is_some_and(|v| labels.get(key).map(String::as_str) == Some(v))
        });
        if !all {
            return Ok(false);
        }
    }

    for expression in array_at(selector, "/matchExpressions") {
        let key = str_at(expression, "/key").unwrap_or_default();
        let values: Vec<&str> = array_at(expression, "/values").filter_map(Value::as_str).collect();
        let current = labels.get(key).map(String::as_str);
        let ok = match str_at(expression, "/operator").unwrap_or_default() {
            "In" => current.is_some_and(|v| values.contains(&v)),
            "NotIn" => current.map_or(true, |v| !values.contains(&v)),
            "Exists" => current.is_some(),
            "DoesNotExist" => current.is_none(),
            other => {
                return Err(GraphError::strategy(
                    Strategy::NetworkPolicyToPod.name(),
                    format!("unsupported selector operator '{other}'"),
                ))
            }
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn network_policy_links(graph: &ResourceGraph) -> Result<Vec<Link>> {
    let mut links = Vec::new();
    let pods = graph.resources_by_kind("Pod");
    for policy in graph.resources_by_kind("NetworkPolicy") {
        let empty = Value::Object(Default::default());
        let selector = policy.object().pointer("/spec/podSelector").unwrap_or(&empty);
        for pod in &pods {
            if policy.same_namespace(pod) && selector_matches(selector, &pod.labels)? {
                links.push((policy.id(), pod.id()));
            }
        }
    }
    Ok(links)
}

fn widget_reference_links(graph: &ResourceGraph) -> Vec<Link> {
    let mut links = Vec::new();
    for (from_kind, to_kind, plural) in WIDGET_REFERENCES {
        for widget in graph.resources_by_kind(from_kind) {
            for item in array_at(widget.object(), "/spec/resourcesRefs/items") {
                let (Some(name), Some(namespace), Some(resource)) = (
                    str_at(item, "/name"),
                    str_at(item, "/namespace"),
                    str_at(item, "/resource"),
                ) else {
                    continue;
                };
                if resource != *plural {
                    continue;
                }
                for target in graph.resources_by_kind(to_kind) {
                    if target.name == name && target.namespace_or_empty() == namespace {
                        links.push((widget.id(), target.id()));
                    }
                }
            }
        }
    }
    links
}

fn widget_manager_links(graph: &ResourceGraph) -> Vec<Link> {
    let mut links = Vec::new();
    for markdown in graph.resources_by_kind("Markdown") {
        let labels = markdown.object().pointer("/metadata/labels");
        let manager = MANAGED_BY_LABELS.iter().find_map(|key| {
            labels
                .and_then(|l| l.get(*key))
                .and_then(Value::as_str)
                .filter(|v| !v.is_empty())
        });
        let Some(manager) = manager else {
            continue;
        };

        let owner = ["Table", "Paragraph"].into_iter().find_map(|kind| {
            graph
                .resources_by_kind(kind)
                .into_iter()
                .find(|r| r.name == manager)
        });
        if let Some(owner) = owner {
            links.push((owner.id(), markdown.id()));
        }
    }
    links
}
