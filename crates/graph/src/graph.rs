use crate::error::{GraphError, Result};
use crate::types::{Relationship, RelationshipType, Resource, ResourceId};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

pub const DEFAULT_CLUSTER_NAME: &str = "default-cluster";

/// Typed resource graph for one analysis run.
///
/// Vertices are deduplicated by [`ResourceId`]. Edges are directed in storage
/// but queried symmetrically, and the same pair may carry several
/// relationship types at once.
pub struct ResourceGraph {
    name: String,

    graph: DiGraph<Resource, Relationship>,

    /// Identity -> NodeIndex mapping
    index: HashMap<ResourceId, NodeIndex>,

    /// Kind -> NodeIndex mapping, insertion ordered
    kind_index: HashMap<String, Vec<NodeIndex>>,

    /// (from, to, type) keys of stored edges
    edge_index: HashSet<(NodeIndex, NodeIndex, RelationshipType)>,
}

impl ResourceGraph {
    pub fn new() -> Self {
        Self::with_name(DEFAULT_CLUSTER_NAME)
    }

    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            graph: DiGraph::new(),
            index: HashMap::new(),
            kind_index: HashMap::new(),
            edge_index: HashSet::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add a resource; returns `false` when an equal resource is already present.
    pub fn add_resource(&mut self, resource: Resource) -> bool {
        let id = resource.id();
        if self.index.contains_key(&id) {
            log::debug!("Resource {resource} already in graph, skipping");
            return false;
        }

        let kind = resource.kind.clone();
        let idx = self.graph.add_node(resource);
        self.index.insert(id, idx);
        self.kind_index.entry(kind).or_default().push(idx);
        true
    }

    pub fn add_relationship(
        &mut self,
        from: &Resource,
        to: &Resource,
        relationship_type: RelationshipType,
    ) -> Result<bool> {
        self.add_relationship_with(&from.id(), &to.id(), relationship_type, None)
    }

    /// Add an edge between two existing vertices.
    ///
    /// Returns `Ok(false)` for an exact `(from, to, type)` duplicate and for
    /// self-loops.
    pub fn add_relationship_with(
        &mut self,
        from: &ResourceId,
        to: &ResourceId,
        relationship_type: RelationshipType,
        metadata: Option<Value>,
    ) -> Result<bool> {
        let from_idx = self.node(from)?;
        let to_idx = self.node(to)?;

        if from_idx == to_idx {
            log::debug!("Ignoring {relationship_type} self-loop on {from}");
            return Ok(false);
        }

        if !self
            .edge_index
            .insert((from_idx, to_idx, relationship_type))
        {
            return Ok(false);
        }

        self.graph.add_edge(
            from_idx,
            to_idx,
            Relationship {
                from: from.clone(),
                to: to.clone(),
                relationship_type,
                metadata,
            },
        );
        Ok(true)
    }

    fn node(&self, id: &ResourceId) -> Result<NodeIndex> {
        self.index
            .get(id)
            .copied()
            .ok_or_else(|| GraphError::ResourceNotFound(id.to_string()))
    }

    pub fn get(&self, id: &ResourceId) -> Option<&Resource> {
        self.index
            .get(id)
            .and_then(|&idx| self.graph.node_weight(idx))
    }

    pub fn contains(&self, resource: &Resource) -> bool {
        self.index.contains_key(&resource.id())
    }

    pub fn resource_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn relationship_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn relationships(&self) -> impl Iterator<Item = &Relationship> {
        self.graph.edge_weights()
    }
}

impl Default for ResourceGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceGraph {
    /// All resources of `kind`, in insertion order
    pub fn resources_by_kind(&self, kind: &str) -> Vec<&Resource> {
        self.kind_index
            .get(kind)
            .map(|nodes| {
                nodes
                    .iter()
                    .filter_map(|&idx| self.graph.node_weight(idx))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Namespaced resources living in `namespace`; cluster-scoped ones never match
    pub fn resources_by_namespace(&self, namespace: &str) -> Vec<&Resource> {
        self.graph
            .node_weights()
            .filter(|r| r.namespace.as_deref() == Some(namespace) && !namespace.is_empty())
            .collect()
    }

    pub fn all_resources(&self) -> Vec<&Resource> {
        self.graph.node_weights().collect()
    }

    /// Resources one `relationship_type` edge away, in either direction
    pub fn neighbours(
        &self,
        resource: &Resource,
        relationship_type: RelationshipType,
    ) -> Vec<&Resource> {
        let Some(&idx) = self.index.get(&resource.id()) else {
            return Vec::new();
        };

        let mut seen = HashSet::new();
        self.neighbour_indices(idx, relationship_type)
            .filter(|other| seen.insert(*other))
            .filter_map(|other| self.graph.node_weight(other))
            .collect()
    }

    fn neighbour_indices(
        &self,
        idx: NodeIndex,
        relationship_type: RelationshipType,
    ) -> impl Iterator<Item = NodeIndex> + '_ {
        let outgoing = self
            .graph
            .edges_directed(idx, Direction::Outgoing)
            .filter(move |e| e.weight().relationship_type == relationship_type)
            .map(|e| e.target());
        let incoming = self
            .graph
            .edges_directed(idx, Direction::Incoming)
            .filter(move |e| e.weight().relationship_type == relationship_type)
            .map(|e| e.source());
        outgoing.chain(incoming)
    }

    pub fn is_neighbour(
        &self,
        resource: &Resource,
        other: &Resource,
        relationship_type: RelationshipType,
    ) -> bool {
        let (Some(&a), Some(&b)) = (self.index.get(&resource.id()), self.index.get(&other.id()))
        else {
            return false;
        };
        self.neighbour_indices(a, relationship_type).any(|n| n == b)
    }

    /// True when `a != b` and both share at least one `relationship_type` neighbour
    pub fn same_neighbour(
        &self,
        a: &Resource,
        b: &Resource,
        relationship_type: RelationshipType,
    ) -> bool {
        if a == b {
            return false;
        }
        let (Some(&a_idx), Some(&b_idx)) = (self.index.get(&a.id()), self.index.get(&b.id()))
        else {
            return false;
        };

        let a_neighbours: HashSet<NodeIndex> =
            self.neighbour_indices(a_idx, relationship_type).collect();
        let shared = self
            .neighbour_indices(b_idx, relationship_type)
            .any(|n| a_neighbours.contains(&n));
        if shared {
            log::debug!("{a} and {b} share a {relationship_type} neighbour");
        }
        shared
    }

    pub fn has_namespace(&self, name: &str) -> bool {
        self.resources_by_kind("Namespace")
            .iter()
            .any(|ns| ns.name == name)
    }

    /// Structured view of the whole graph for external inspection
    pub fn export(&self) -> GraphExport {
        let vertices = self
            .graph
            .node_weights()
            .map(|r| VertexExport {
                id: r.id().to_string(),
                uid: r.uid.clone(),
                api_version: r.api_version.clone(),
                kind: r.kind.clone(),
                name: r.name.clone(),
                namespace: r.namespace.clone(),
            })
            .collect();

        let edges = self
            .graph
            .edge_references()
            .map(|e| EdgeExport {
                source: self.graph[e.source()].id().to_string(),
                target: self.graph[e.target()].id().to_string(),
                relationship_type: e.weight().relationship_type,
                metadata: e.weight().metadata.clone(),
            })
            .collect();

        GraphExport {
            cluster_name: self.name.clone(),
            vertices,
            edges,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.export())?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphExport {
    pub cluster_name: String,
    pub vertices: Vec<VertexExport>,
    pub edges: Vec<EdgeExport>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VertexExport {
    /// Identity that edge endpoints refer to
    pub id: String,
    pub uid: Option<String>,
    pub api_version: String,
    pub kind: String,
    pub name: String,
    pub namespace: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeExport {
    pub source: String,
    pub target: String,
    #[serde(rename = "type")]
    pub relationship_type: RelationshipType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}
