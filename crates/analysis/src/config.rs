use crate::error::{AnalysisError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_ENV: &str = "KUBEPATTERN_CONFIG";
pub const OUTPUT_DIR_ENV: &str = "KUBEPATTERN_OUTPUT_DIR";
pub const REGISTRY_TOKEN_ENV: &str = "KUBEPATTERN_REGISTRY_TOKEN";

/// A resource kind fetched while populating the graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindSpec {
    pub kind: String,
    #[serde(default = "default_true")]
    pub namespaced: bool,
}

impl KindSpec {
    pub fn namespaced(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            namespaced: true,
        }
    }

    pub fn cluster_scoped(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            namespaced: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Namespace match records are written to
    #[serde(default = "default_target_namespace")]
    pub target_namespace: String,

    /// Write each record next to its first resource instead
    #[serde(default)]
    pub save_in_namespace: bool,

    /// Root directory of the file sink and run lock files
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            target_namespace: default_target_namespace(),
            save_in_namespace: false,
            output_dir: default_output_dir(),
        }
    }
}

/// Location of the shared pattern definition registry (a GitHub repository)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default = "default_organization")]
    pub organization: String,
    #[serde(default = "default_repository")]
    pub repository: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    /// Bearer token; empty means anonymous
    #[serde(default)]
    pub token: String,
    #[serde(default = "default_definitions_path")]
    pub definitions_path: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            organization: default_organization(),
            repository: default_repository(),
            branch: default_branch(),
            token: String::new(),
            definitions_path: default_definitions_path(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Upper bound for each collaborator call
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    #[serde(default = "default_kinds")]
    pub kinds: Vec<KindSpec>,

    #[serde(default)]
    pub report: ReportConfig,

    #[serde(default)]
    pub registry: RegistryConfig,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            fetch_timeout_secs: default_fetch_timeout_secs(),
            kinds: default_kinds(),
            report: ReportConfig::default(),
            registry: RegistryConfig::default(),
        }
    }
}

impl AnalysisConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.fetch_timeout_secs == 0 {
            return Err("fetch_timeout_secs must be greater than 0".to_string());
        }
        if self.kinds.is_empty() {
            return Err("kinds must not be empty".to_string());
        }
        if let Some(blank) = self.kinds.iter().position(|k| k.kind.trim().is_empty()) {
            return Err(format!("kinds[{blank}].kind must not be empty"));
        }
        if self.report.target_namespace.trim().is_empty() {
            return Err("report.target_namespace must not be empty".to_string());
        }
        Ok(())
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| AnalysisError::InvalidConfig(e.to_string()))?;
        config.validate().map_err(AnalysisError::InvalidConfig)?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    /// Load with priority: explicit path, then `KUBEPATTERN_CONFIG`, then
    /// defaults. Environment overrides are applied last.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let from_env = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
        let mut config = match path.map(Path::to_path_buf).or(from_env) {
            Some(path) => {
                log::info!("Loading configuration from {}", path.display());
                Self::from_file(&path)?
            }
            None => Self::default(),
        };
        config.apply_env();
        config.validate().map_err(AnalysisError::InvalidConfig)?;
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(dir) = std::env::var(OUTPUT_DIR_ENV) {
            if !dir.trim().is_empty() {
                self.report.output_dir = PathBuf::from(dir);
            }
        }
        if let Ok(token) = std::env::var(REGISTRY_TOKEN_ENV) {
            self.registry.token = token;
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_fetch_timeout_secs() -> u64 {
    10
}

fn default_target_namespace() -> String {
    "pattern-analysis-ns".to_string()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./kubepattern-out")
}

fn default_organization() -> String {
    "kubepattern".to_string()
}

fn default_repository() -> String {
    "registry".to_string()
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_definitions_path() -> String {
    "definitions".to_string()
}

fn default_kinds() -> Vec<KindSpec> {
    let mut kinds = vec![KindSpec::cluster_scoped("Namespace")];
    kinds.extend(
        [
            "Pod",
            "Deployment",
            "ReplicaSet",
            "Service",
            "ConfigMap",
            "Secret",
            "ServiceAccount",
            "PersistentVolumeClaim",
            "Job",
            "CronJob",
            "NetworkPolicy",
            "LimitRange",
            "ResourceQuota",
        ]
        .into_iter()
        .map(KindSpec::namespaced),
    );
    kinds
}
