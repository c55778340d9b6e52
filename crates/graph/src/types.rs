use crate::error::{GraphError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// Identity of a resource inside the graph.
///
/// A non-empty `uid` always wins. Resources without one fall back to the
/// natural key, where `namespace` only participates for namespaced objects.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "by")]
pub enum ResourceId {
    Uid {
        uid: String,
    },
    Natural {
        kind: String,
        api_version: String,
        name: String,
        namespace: Option<String>,
    },
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceId::Uid { uid } => write!(f, "uid:{uid}"),
            ResourceId::Natural {
                kind,
                api_version,
                name,
                namespace,
            } => write!(
                f,
                "{}.{}.{}.{}",
                namespace.as_deref().unwrap_or(""),
                api_version,
                kind,
                name
            ),
        }
    }
}

/// A Kubernetes (or custom) object represented as a graph vertex.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    /// Server-assigned uid, absent for objects that were never persisted
    pub uid: Option<String>,

    pub api_version: String,

    pub kind: String,

    pub name: String,

    /// `None` for cluster-scoped resources
    pub namespace: Option<String>,

    #[serde(default)]
    pub labels: BTreeMap<String, String>,

    #[serde(default)]
    pub annotations: BTreeMap<String, String>,

    /// The original object, used by filters and strategies
    #[serde(default)]
    pub payload: Value,
}

impl Resource {
    pub fn new(
        api_version: impl Into<String>,
        kind: impl Into<String>,
        name: impl Into<String>,
        namespace: Option<&str>,
    ) -> Self {
        Self {
            uid: None,
            api_version: api_version.into(),
            kind: kind.into(),
            name: name.into(),
            namespace: namespace.filter(|ns| !ns.is_empty()).map(str::to_string),
            labels: BTreeMap::new(),
            annotations: BTreeMap::new(),
            payload: Value::Null,
        }
    }

    pub fn with_uid(mut self, uid: impl Into<String>) -> Self {
        let uid = uid.into();
        self.uid = (!uid.is_empty()).then_some(uid);
        self
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    /// Build a resource from a raw Kubernetes object (`kubectl get -o json` item).
    pub fn from_object(object: Value) -> Result<Self> {
        let kind = object
            .get("kind")
            .and_then(Value::as_str)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| GraphError::InvalidResource("object has no kind".to_string()))?
            .to_string();

        let metadata = object.get("metadata").cloned().unwrap_or(Value::Null);
        let name = metadata
            .get("name")
            .and_then(Value::as_str)
            .filter(|n| !n.is_empty())
            .ok_or_else(|| {
                GraphError::InvalidResource(format!("{kind} object has no metadata.name"))
            })?
            .to_string();

        let api_version = object
            .get("apiVersion")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let mut resource = Resource::new(
            api_version,
            kind,
            name,
            metadata.get("namespace").and_then(Value::as_str),
        );
        if let Some(uid) = metadata.get("uid").and_then(Value::as_str) {
            resource = resource.with_uid(uid);
        }
        resource.labels = string_map(metadata.get("labels"));
        resource.annotations = string_map(metadata.get("annotations"));
        resource.payload = object;

        Ok(resource)
    }

    pub fn id(&self) -> ResourceId {
        match self.uid.as_deref().filter(|uid| !uid.is_empty()) {
            Some(uid) => ResourceId::Uid {
                uid: uid.to_string(),
            },
            None => ResourceId::Natural {
                kind: self.kind.clone(),
                api_version: self.api_version.clone(),
                name: self.name.clone(),
                namespace: self.namespace.clone().filter(|ns| !ns.is_empty()),
            },
        }
    }

    pub fn is_cluster_scoped(&self) -> bool {
        self.namespace.as_deref().map_or(true, str::is_empty)
    }

    pub fn namespace_or_empty(&self) -> &str {
        self.namespace.as_deref().unwrap_or("")
    }

    pub fn same_namespace(&self, other: &Resource) -> bool {
        self.namespace_or_empty() == other.namespace_or_empty()
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }

    pub fn has_same_label_value(&self, other: &Resource, key: &str) -> bool {
        match (self.labels.get(key), other.labels.get(key)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    pub fn has_same_annotation_value(&self, other: &Resource, key: &str) -> bool {
        match (self.annotations.get(key), other.annotations.get(key)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    /// Payload with a portal `raw` envelope unwrapped, if present.
    pub fn object(&self) -> &Value {
        match self.payload.get("raw") {
            Some(raw) if raw.is_object() => raw,
            _ => &self.payload,
        }
    }
}

fn string_map(value: Option<&Value>) -> BTreeMap<String, String> {
    value
        .and_then(Value::as_object)
        .map(|map| {
            map.iter()
                .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

impl PartialEq for Resource {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for Resource {}

impl Hash for Resource {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.namespace_or_empty(),
            self.api_version,
            self.kind,
            self.name
        )
    }
}

/// Type of relationship between resources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationshipType {
    /// Deployment owns ReplicaSet
    Owns,

    /// ReplicaSet manages Pod
    Manages,

    /// Pod mounts PersistentVolumeClaim
    Mounts,

    /// Service exposes Pod
    Exposes,

    /// Pod reads a ConfigMap or Secret
    UsesConfig,

    #[serde(alias = "USES_SA")]
    UsesServiceAccount,

    IsNamespaceOf,

    /// Resources governed by the same network policy
    SameNetwork,

    HasAffinityTo,

    /// Portal widget references another widget
    #[serde(alias = "REFERENCES_KRATEO")]
    ReferencesWidget,

    #[serde(alias = "MANAGES_KRATEO")]
    ManagesWidget,
}

impl RelationshipType {
    pub const ALL: [RelationshipType; 11] = [
        RelationshipType::Owns,
        RelationshipType::Manages,
        RelationshipType::Mounts,
        RelationshipType::Exposes,
        RelationshipType::UsesConfig,
        RelationshipType::UsesServiceAccount,
        RelationshipType::IsNamespaceOf,
        RelationshipType::SameNetwork,
        RelationshipType::HasAffinityTo,
        RelationshipType::ReferencesWidget,
        RelationshipType::ManagesWidget,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipType::Owns => "OWNS",
            RelationshipType::Manages => "MANAGES",
            RelationshipType::Mounts => "MOUNTS",
            RelationshipType::Exposes => "EXPOSES",
            RelationshipType::UsesConfig => "USES_CONFIG",
            RelationshipType::UsesServiceAccount => "USES_SERVICE_ACCOUNT",
            RelationshipType::IsNamespaceOf => "IS_NAMESPACE_OF",
            RelationshipType::SameNetwork => "SAME_NETWORK",
            RelationshipType::HasAffinityTo => "HAS_AFFINITY_TO",
            RelationshipType::ReferencesWidget => "REFERENCES_WIDGET",
            RelationshipType::ManagesWidget => "MANAGES_WIDGET",
        }
    }
}

impl fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RelationshipType {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_uppercase();
        let found = match normalized.as_str() {
            "USES_SA" => Some(RelationshipType::UsesServiceAccount),
            "REFERENCES_KRATEO" => Some(RelationshipType::ReferencesWidget),
            "MANAGES_KRATEO" => Some(RelationshipType::ManagesWidget),
            other => RelationshipType::ALL
                .into_iter()
                .find(|ty| ty.as_str() == other),
        };
        found.ok_or_else(|| GraphError::Other(format!("unknown relationship type: {s}")))
    }
}

/// Edge in the resource graph.
///
/// Equality is `(from, to, type)`; metadata is informational only.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relationship {
    pub from: ResourceId,
    pub to: ResourceId,
    #[serde(rename = "type")]
    pub relationship_type: RelationshipType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl PartialEq for Relationship {
    fn eq(&self, other: &Self) -> bool {
        self.from == other.from
            && self.to == other.to
            && self.relationship_type == other.relationship_type
    }
}

impl Eq for Relationship {}

impl Hash for Relationship {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.from.hash(state);
        self.to.hash(state);
        self.relationship_type.hash(state);
    }
}
