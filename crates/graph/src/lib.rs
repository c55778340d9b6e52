//! # Resource Graph
//!
//! In-memory model of a Kubernetes cluster as a directed multigraph of
//! resources and the relationships discovered between them.
//!
//! ## Architecture
//!
//! ```text
//! Kubernetes objects (JSON)
//!     │
//!     ├──> Resource::from_object
//!     │      └─ identity: uid, or (kind, apiVersion, name, namespace)
//!     │
//!     ├──> ResourceGraph (petgraph)
//!     │      ├─ Nodes: resources
//!     │      └─ Edges: typed relationships (OWNS, EXPOSES, ...)
//!     │
//!     └──> RelationshipDiscovery
//!            ├─ Run each Strategy over the vertex set
//!            ├─ Isolate and log strategy failures
//!            └─ Report edges added per strategy
//! ```

mod discovery;
mod error;
mod graph;
mod strategy;
mod types;

pub use discovery::{DiscoveryReport, RelationshipDiscovery, StrategyOutcome};
pub use error::{GraphError, Result};
pub use graph::{EdgeExport, GraphExport, ResourceGraph, VertexExport, DEFAULT_CLUSTER_NAME};
pub use strategy::Strategy;
pub use types::{Relationship, RelationshipType, Resource, ResourceId};
