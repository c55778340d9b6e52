//! Pattern definition sources: a local directory or a GitHub-hosted registry.

use crate::config::RegistryConfig;
use crate::error::{AnalysisError, Result};
use crate::source::{DefinitionSource, SourceError};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use walkdir::WalkDir;

const RAW_BASE: &str = "https://raw.githubusercontent.com";
const API_BASE: &str = "https://api.github.com";
const USER_AGENT: &str = concat!("kubepattern/", env!("CARGO_PKG_VERSION"));

/// Definitions stored as `<name>.json` files under a directory tree
#[derive(Debug, Clone)]
pub struct DirectoryDefinitionSource {
    root: PathBuf,
}

impl DirectoryDefinitionSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn definition_files(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = WalkDir::new(&self.root)
            .follow_links(false)
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    log::warn!("Skipping unreadable entry under {}: {e}", self.root.display());
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .collect();
        files.sort();
        files
    }
}

#[async_trait]
impl DefinitionSource for DirectoryDefinitionSource {
    async fn fetch(&self, name: &str) -> std::result::Result<String, SourceError> {
        if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
            return Err(SourceError::NotFound(format!("invalid definition name '{name}'")));
        }
        let direct = self.root.join(format!("{name}.json"));
        let path = if direct.is_file() {
            direct
        } else {
            let file_name = format!("{name}.json");
            self.definition_files()
                .into_iter()
                .find(|p| p.file_name().is_some_and(|f| f == file_name.as_str()))
                .ok_or_else(|| {
                    SourceError::NotFound(format!("{name} under {}", self.root.display()))
                })?
        };
        tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| io_error(&path, e))
    }

    async fn list_all(&self) -> std::result::Result<Vec<String>, SourceError> {
        if !self.root.is_dir() {
            return Err(SourceError::NotFound(format!(
                "definition directory {}",
                self.root.display()
            )));
        }
        let mut texts = Vec::new();
        for path in self.definition_files() {
            texts.push(
                tokio::fs::read_to_string(&path)
                    .await
                    .map_err(|e| io_error(&path, e))?,
            );
        }
        log::info!("Loaded {} pattern definitions from {}", texts.len(), self.root.display());
        Ok(texts)
    }
}

fn io_error(path: &Path, e: std::io::Error) -> SourceError {
    match e.kind() {
        std::io::ErrorKind::NotFound => SourceError::NotFound(path.display().to_string()),
        std::io::ErrorKind::PermissionDenied => SourceError::Forbidden(path.display().to_string()),
        _ => SourceError::Other(format!("{}: {e}", path.display())),
    }
}

#[derive(Debug, Deserialize)]
struct ContentEntry {
    name: String,
    #[serde(rename = "type")]
    entry_type: String,
    download_url: Option<String>,
}

/// Definitions published in a GitHub repository.
///
/// Single definitions are read from the raw-file host; listing goes through
/// the contents API and then downloads every `.json` entry.
#[derive(Debug, Clone)]
pub struct GitHubRegistrySource {
    client: Client,
    config: RegistryConfig,
}

impl GitHubRegistrySource {
    pub fn new(config: RegistryConfig, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()
            .map_err(|e| AnalysisError::Other(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    pub fn raw_url(&self, name: &str) -> String {
        let c = &self.config;
        format!(
            "{RAW_BASE}/{}/{}/{}/{}/{name}.json",
            c.organization,
            c.repository,
            c.branch,
            c.definitions_path.trim_matches('/')
        )
    }

    pub fn contents_url(&self) -> String {
        let c = &self.config;
        format!(
            "{API_BASE}/repos/{}/{}/contents/{}?ref={}",
            c.organization,
            c.repository,
            c.definitions_path.trim_matches('/'),
            c.branch
        )
    }

    async fn download(&self, url: &str) -> std::result::Result<String, SourceError> {
        log::debug!("GET {url}");
        let mut request = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "application/vnd.github.v3+json");
        if !self.config.token.is_empty() {
            request = request.bearer_auth(&self.config.token);
        }

        let response = request.send().await.map_err(|e| transport_error(url, e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(status_error(url, status));
        }
        response.text().await.map_err(|e| transport_error(url, e))
    }
}

fn transport_error(url: &str, e: reqwest::Error) -> SourceError {
    if e.is_timeout() {
        SourceError::Timeout(format!("GET {url}"))
    } else {
        SourceError::Other(format!("GET {url}: {e}"))
    }
}

fn status_error(url: &str, status: StatusCode) -> SourceError {
    match status {
        StatusCode::NOT_FOUND => SourceError::NotFound(format!("GET {url}")),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            SourceError::Forbidden(format!("GET {url}: {status}"))
        }
        _ => SourceError::Other(format!("GET {url}: HTTP {status}")),
    }
}

#[async_trait]
impl DefinitionSource for GitHubRegistrySource {
    async fn fetch(&self, name: &str) -> std::result::Result<String, SourceError> {
        self.download(&self.raw_url(name)).await
    }

    async fn list_all(&self) -> std::result::Result<Vec<String>, SourceError> {
        let listing = self.download(&self.contents_url()).await?;
        let entries: Vec<ContentEntry> = serde_json::from_str(&listing)
            .map_err(|e| SourceError::Other(format!("unexpected contents listing: {e}")))?;

        let mut texts = Vec::new();
        for entry in entries {
            if entry.entry_type != "file" || !entry.name.ends_with(".json") {
                continue;
            }
            let Some(url) = entry.download_url else {
                log::warn!("Registry entry {} has no download URL", entry.name);
                continue;
            };
            texts.push(self.download(&url).await?);
        }
        log::info!(
            "Loaded {} pattern definitions from {}/{}",
            texts.len(),
            self.config.organization,
            self.config.repository
        );
        Ok(texts)
    }
}
