use crate::config::KindSpec;
use crate::error::{AnalysisError, Result};
use crate::source::{ResourceSource, SourceError};
use async_trait::async_trait;
use kubepattern_graph::Resource;
use serde_json::Value;
use std::path::Path;

/// Resource source backed by a captured cluster snapshot.
///
/// Accepts either a Kubernetes `List` object (`kubectl get ... -o json`)
/// or a bare JSON array of objects. Items without a kind or name are skipped.
#[derive(Debug, Clone, Default)]
pub struct SnapshotSource {
    resources: Vec<Resource>,
}

impl SnapshotSource {
    pub fn from_resources(resources: Vec<Resource>) -> Self {
        Self { resources }
    }

    pub fn from_value(value: Value) -> Result<Self> {
        let items = match value {
            Value::Array(items) => items,
            Value::Object(mut object) => match object.remove("items") {
                Some(Value::Array(items)) => items,
                _ => {
                    return Err(AnalysisError::Other(
                        "snapshot object has no items array".to_string(),
                    ))
                }
            },
            _ => {
                return Err(AnalysisError::Other(
                    "snapshot must be a List object or an array".to_string(),
                ))
            }
        };

        let mut resources = Vec::with_capacity(items.len());
        for (i, item) in items.into_iter().enumerate() {
            match Resource::from_object(item) {
                Ok(resource) => resources.push(resource),
                Err(e) => log::warn!("Skipping snapshot item {i}: {e}"),
            }
        }
        log::debug!("Loaded snapshot with {} resources", resources.len());
        Ok(Self { resources })
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let value: Value = serde_json::from_str(&text)?;
        Self::from_value(value)
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

#[async_trait]
impl ResourceSource for SnapshotSource {
    async fn list_resources(
        &self,
        kind: &KindSpec,
        namespace: Option<&str>,
    ) -> std::result::Result<Vec<Resource>, SourceError> {
        Ok(self
            .resources
            .iter()
            .filter(|r| r.kind == kind.kind)
            .filter(|r| namespace.is_none() || r.namespace.as_deref() == namespace)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn list() -> Value {
        json!({
            "apiVersion": "v1",
            "kind": "List",
            "items": [
                {"apiVersion": "v1", "kind": "Namespace", "metadata": {"name": "shop"}},
                {"apiVersion": "v1", "kind": "Pod", "metadata": {"name": "a", "namespace": "shop"}},
                {"apiVersion": "v1", "kind": "Pod", "metadata": {"name": "b", "namespace": "ops"}},
                {"apiVersion": "v1", "kind": "Pod", "metadata": {}}
            ]
        })
    }

    #[tokio::test]
    async fn lists_by_kind_and_namespace() {
        let source = SnapshotSource::from_value(list()).unwrap();
        assert_eq!(source.len(), 3);

        let pods = KindSpec::namespaced("Pod");
        let all = source.list_resources(&pods, None).await.unwrap();
        assert_eq!(all.len(), 2);

        let shop = source.list_resources(&pods, Some("shop")).await.unwrap();
        let names: Vec<&str> = shop.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["a"]);

        let secrets = source
            .list_resources(&KindSpec::namespaced("Secret"), None)
            .await
            .unwrap();
        assert!(secrets.is_empty());
    }

    #[test]
    fn accepts_bare_arrays() {
        let items = list()["items"].clone();
        let source = SnapshotSource::from_value(items).unwrap();
        assert_eq!(source.len(), 3);
    }

    #[test]
    fn rejects_scalars_and_objects_without_items() {
        assert!(SnapshotSource::from_value(json!("pods")).is_err());
        assert!(SnapshotSource::from_value(json!({"kind": "List"})).is_err());
    }
}
