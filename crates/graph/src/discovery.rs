use crate::graph::ResourceGraph;
use crate::strategy::Strategy;
use crate::types::Resource;

/// Result of a single strategy run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyOutcome {
    pub strategy: &'static str,
    pub edges_added: usize,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryReport {
    pub outcomes: Vec<StrategyOutcome>,
}

impl DiscoveryReport {
    pub fn total_edges(&self) -> usize {
        self.outcomes.iter().map(|o| o.edges_added).sum()
    }

    pub fn failed(&self) -> impl Iterator<Item = &StrategyOutcome> {
        self.outcomes.iter().filter(|o| o.error.is_some())
    }
}

/// Runs the registered strategies over a graph, one after another.
///
/// A failing strategy is logged and skipped; the rest still run.
#[derive(Debug, Clone)]
pub struct RelationshipDiscovery {
    strategies: Vec<Strategy>,
}

impl RelationshipDiscovery {
    pub fn new(strategies: Vec<Strategy>) -> Self {
        Self { strategies }
    }

    pub fn strategies(&self) -> &[Strategy] {
        &self.strategies
    }

    /// Strategies that would look at `resource`
    pub fn strategies_involving(&self, resource: &Resource) -> Vec<Strategy> {
        self.strategies
            .iter()
            .copied()
            .filter(|s| s.involve(resource))
            .collect()
    }

    pub fn discover(&self, graph: &mut ResourceGraph) -> DiscoveryReport {
        log::debug!(
            "Discovering relationships in '{}' with {} strategies",
            graph.name(),
            self.strategies.len()
        );

        let mut report = DiscoveryReport::default();
        for strategy in &self.strategies {
            let outcome = match strategy.analyze(graph) {
                Ok(edges_added) => {
                    log::debug!("{}: {} edges", strategy.name(), edges_added);
                    StrategyOutcome {
                        strategy: strategy.name(),
                        edges_added,
                        error: None,
                    }
                }
                Err(e) => {
                    log::error!("Strategy {} failed: {}", strategy.name(), e);
                    StrategyOutcome {
                        strategy: strategy.name(),
                        edges_added: 0,
                        error: Some(e.to_string()),
                    }
                }
            };
            report.outcomes.push(outcome);
        }

        log::info!(
            "Relationship discovery added {} edges ({} resources, {} failed strategies)",
            report.total_edges(),
            graph.resource_count(),
            report.failed().count()
        );
        report
    }
}

impl Default for RelationshipDiscovery {
    fn default() -> Self {
        let strategies = Strategy::ALL.to_vec();
        log::debug!(
            "Registered strategies: {}",
            strategies.iter().map(Strategy::name).collect::<Vec<_>>().join(", ")
        );
        Self::new(strategies)
    }
}
