use crate::config::{AnalysisConfig, KindSpec};
use crate::error::{AnalysisError, Result};
use crate::source::{DefinitionSource, MatchSink, ResourceSource, SourceError};
use kubepattern_engine::{analyze, lint, parse, EngineError, PatternDefinition};
use kubepattern_graph::{
    DiscoveryReport, GraphExport, RelationshipDiscovery, Resource, ResourceGraph,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Scope of one analysis run
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "scope", content = "namespace", rename_all = "lowercase")]
pub enum RunTarget {
    Cluster,
    Namespace(String),
}

impl RunTarget {
    pub fn namespace(&self) -> Option<&str> {
        match self {
            RunTarget::Cluster => None,
            RunTarget::Namespace(ns) => Some(ns),
        }
    }

    /// Key used to serialize runs over the same target
    pub fn lock_key(&self) -> String {
        match self {
            RunTarget::Cluster => "cluster".to_string(),
            RunTarget::Namespace(ns) => format!("namespace-{ns}"),
        }
    }
}

impl fmt::Display for RunTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunTarget::Cluster => f.write_str("cluster"),
            RunTarget::Namespace(ns) => write!(f, "namespace {ns}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRequest {
    pub target: RunTarget,
    /// Evaluate only this definition instead of the whole registry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
}

impl RunRequest {
    pub fn cluster() -> Self {
        Self {
            target: RunTarget::Cluster,
            pattern: None,
        }
    }

    pub fn namespace(ns: impl Into<String>) -> Self {
        Self {
            target: RunTarget::Namespace(ns.into()),
            pattern: None,
        }
    }

    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedDefinition {
    pub name: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub target: RunTarget,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    pub cluster_name: String,
    pub resources: usize,
    pub relationships: usize,
    /// Kinds whose listing was degraded to empty
    pub degraded_kinds: Vec<String>,
    pub failed_strategies: Vec<String>,
    pub records_replaced: usize,
    pub definitions_evaluated: usize,
    pub matches_saved: usize,
    pub duplicates_dropped: usize,
    pub skipped: Vec<SkippedDefinition>,
    pub duration_ms: u64,
}

/// Graph of one run after population and discovery
pub struct ClusterSnapshot {
    pub graph: ResourceGraph,
    pub degraded_kinds: Vec<String>,
    pub discovery: DiscoveryReport,
}

/// Executes analysis runs against its collaborators.
///
/// Each run builds its own graph; nothing is shared between runs.
pub struct AnalysisRunner {
    config: AnalysisConfig,
    cluster_name: String,
    resources: Arc<dyn ResourceSource>,
    definitions: Arc<dyn DefinitionSource>,
    sink: Arc<dyn MatchSink>,
    discovery: RelationshipDiscovery,
}

impl AnalysisRunner {
    pub fn new(
        config: AnalysisConfig,
        resources: Arc<dyn ResourceSource>,
        definitions: Arc<dyn DefinitionSource>,
        sink: Arc<dyn MatchSink>,
    ) -> Self {
        Self {
            config,
            cluster_name: kubepattern_graph::DEFAULT_CLUSTER_NAME.to_string(),
            resources,
            definitions,
            sink,
            discovery: RelationshipDiscovery::default(),
        }
    }

    pub fn with_cluster_name(mut self, name: impl Into<String>) -> Self {
        self.cluster_name = name.into();
        self
    }

    pub fn with_discovery(mut self, discovery: RelationshipDiscovery) -> Self {
        self.discovery = discovery;
        self
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Populate a fresh graph for `target` and discover its relationships.
    pub async fn snapshot(&self, target: &RunTarget) -> Result<ClusterSnapshot> {
        build_snapshot(
            &self.config,
            self.resources.as_ref(),
            &self.discovery,
            &self.cluster_name,
            target,
        )
        .await
    }

    async fn definition_texts(&self, pattern: Option<&str>) -> Result<Vec<String>> {
        let timeout = self.config.fetch_timeout();
        let texts = match pattern {
            Some(name) => with_timeout(timeout, name, self.definitions.fetch(name))
                .await
                .map(|text| vec![text]),
            None => with_timeout(timeout, "definition listing", self.definitions.list_all()).await,
        };
        texts.map_err(AnalysisError::Definitions)
    }

    /// Discovered graph of the whole cluster
    pub async fn graph_export(&self) -> Result<GraphExport> {
        Ok(self.snapshot(&RunTarget::Cluster).await?.graph.export())
    }

    pub async fn run(&self, request: &RunRequest) -> Result<RunReport> {
        let started = Instant::now();
        log::info!("Starting analysis of {}", request.target);

        let snapshot = self.snapshot(&request.target).await?;
        let texts = self.definition_texts(request.pattern.as_deref()).await?;
        let pattern_scope = request.pattern.as_deref().map(|requested| {
            texts
                .first()
                .and_then(|text| definition_name(text))
                .unwrap_or_else(|| requested.to_string())
        });
        let records_replaced = self
            .sink
            .replace_all(&request.target, pattern_scope.as_deref())
            .await?;

        let report = &self.config.report;
        let mut seen = HashSet::new();
        let mut skipped = Vec::new();
        let mut saved: Vec<String> = Vec::new();
        let mut duplicates_dropped = 0;

        for (i, text) in texts.iter().enumerate() {
            let label = definition_label(text, i);
            let definition = match load_definition(text) {
                Ok(definition) => definition,
                Err(e) => {
                    log::warn!("Skipping pattern '{label}': {e}");
                    skipped.push(SkippedDefinition {
                        name: label,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            let matches = match analyze(&definition, &snapshot.graph) {
                Ok(matches) => matches,
                Err(e @ EngineError::MalformedPattern(_)) => {
                    log::warn!("Skipping pattern '{label}': {e}");
                    skipped.push(SkippedDefinition {
                        name: label,
                        reason: e.to_string(),
                    });
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            for found in matches {
                if !seen.insert(found.dedup_id()) {
                    duplicates_dropped += 1;
                    continue;
                }
                let record = found
                    .render_for_persistence(&report.target_namespace, report.save_in_namespace);
                if let Err(e) = self.sink.save(&record).await {
                    log::error!(
                        "Saving {} failed; {} keeps only {} record(s) from this run: [{}]",
                        record.metadata.name,
                        request.target,
                        saved.len(),
                        saved.join(", ")
                    );
                    return Err(AnalysisError::PartialResults {
                        saved: saved.len(),
                        source: Box::new(e),
                    });
                }
                saved.push(record.metadata.name);
            }
        }

        let result = RunReport {
            target: request.target.clone(),
            pattern: request.pattern.clone(),
            cluster_name: snapshot.graph.name().to_string(),
            resources: snapshot.graph.resource_count(),
            relationships: snapshot.graph.relationship_count(),
            degraded_kinds: snapshot.degraded_kinds,
            failed_strategies: snapshot
                .discovery
                .failed()
                .map(|o| o.strategy.to_string())
                .collect(),
            records_replaced,
            definitions_evaluated: texts.len() - skipped.len(),
            matches_saved: saved.len(),
            duplicates_dropped,
            skipped,
            duration_ms: started.elapsed().as_millis() as u64,
        };
        log::info!(
            "Finished analysis of {}: {} matches saved, {} definitions skipped in {}ms",
            result.target,
            result.matches_saved,
            result.skipped.len(),
            result.duration_ms
        );
        Ok(result)
    }
}

/// Populate a graph named `cluster_name` from `resources` and run discovery.
///
/// Kinds that are not found or forbidden come back empty; any other
/// listing failure, including a timeout, aborts. A namespace target fails
/// with [`AnalysisError::NamespaceNotFound`] when its Namespace is absent.
pub async fn build_snapshot(
    config: &AnalysisConfig,
    resources: &dyn ResourceSource,
    discovery: &RelationshipDiscovery,
    cluster_name: &str,
    target: &RunTarget,
) -> Result<ClusterSnapshot> {
    let mut graph = ResourceGraph::with_name(cluster_name);
    let mut degraded_kinds = Vec::new();

    for kind in &config.kinds {
        let Some(listing) = list_kind(config, resources, kind, target).await? else {
            degraded_kinds.push(kind.kind.clone());
            continue;
        };
        let mut added = 0;
        for resource in listing {
            if graph.add_resource(resource) {
                added += 1;
            }
        }
        log::debug!("Fetched {added} {} resources", kind.kind);
    }

    if let RunTarget::Namespace(ns) = target {
        if !graph.has_namespace(ns) {
            return Err(AnalysisError::NamespaceNotFound(ns.clone()));
        }
    }

    let discovery = discovery.discover(&mut graph);
    log::info!(
        "Graph for {target}: {} resources, {} relationships",
        graph.resource_count(),
        graph.relationship_count()
    );
    Ok(ClusterSnapshot {
        graph,
        degraded_kinds,
        discovery,
    })
}

/// `Ok(None)` means the kind was degraded to empty.
async fn list_kind(
    config: &AnalysisConfig,
    resources: &dyn ResourceSource,
    kind: &KindSpec,
    target: &RunTarget,
) -> Result<Option<Vec<Resource>>> {
    let (namespace, keep_only) = match target.namespace() {
        None => (None, None),
        Some(ns) if kind.namespaced => (Some(ns), None),
        Some(ns) if kind.kind == "Namespace" => (None, Some(ns)),
        Some(_) => {
            log::debug!("Skipping cluster-scoped {} for {target}", kind.kind);
            return Ok(Some(Vec::new()));
        }
    };

    let listed = with_timeout(
        config.fetch_timeout(),
        &kind.kind,
        resources.list_resources(kind, namespace),
    )
    .await;

    match listed {
        Ok(mut listing) => {
            if let Some(ns) = keep_only {
                listing.retain(|r| r.name == ns);
            }
            Ok(Some(listing))
        }
        Err(e) if e.is_degradable() => {
            log::warn!("Treating {} as empty: {e}", kind.kind);
            Ok(None)
        }
        Err(source) => Err(AnalysisError::Fetch {
            kind: kind.kind.clone(),
            source,
        }),
    }
}

fn load_definition(text: &str) -> kubepattern_engine::Result<PatternDefinition> {
    lint(text)?;
    parse(text)
}

/// `metadata.name` of a definition, if its text gets that far
fn definition_name(text: &str) -> Option<String> {
    serde_json::from_str::<serde_json::Value>(text)
        .ok()?
        .pointer("/metadata/name")?
        .as_str()
        .map(str::to_string)
}

/// Best-effort name of a definition for reporting
fn definition_label(text: &str, index: usize) -> String {
    definition_name(text).unwrap_or_else(|| format!("definition #{index}"))
}

async fn with_timeout<T>(
    timeout: Duration,
    what: &str,
    call: impl Future<Output = std::result::Result<T, SourceError>>,
) -> std::result::Result<T, SourceError> {
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(SourceError::Timeout(format!("{what} after {}s", timeout.as_secs()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn targets_serialize_with_scope_tag() {
        let cluster = serde_json::to_value(RunTarget::Cluster).unwrap();
        assert_eq!(cluster, serde_json::json!({"scope": "cluster"}));

        let ns = serde_json::to_value(RunTarget::Namespace("shop".to_string())).unwrap();
        assert_eq!(ns, serde_json::json!({"scope": "namespace", "namespace": "shop"}));
    }

    #[test]
    fn lock_keys_differ_per_target() {
        assert_eq!(RunTarget::Cluster.lock_key(), "cluster");
        assert_eq!(RunTarget::Namespace("shop".to_string()).lock_key(), "namespace-shop");
    }

    #[test]
    fn labels_fall_back_to_position() {
        assert_eq!(definition_label(r#"{"metadata":{"name":"sidecar"}}"#, 0), "sidecar");
        assert_eq!(definition_label("not json", 3), "definition #3");
    }

    #[tokio::test]
    async fn slow_calls_time_out() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, SourceError>(())
        };
        let err = with_timeout(Duration::from_millis(10), "Pod", slow).await.unwrap_err();
        assert!(matches!(err, SourceError::Timeout(_)));
        assert!(!err.is_degradable());
    }
}
