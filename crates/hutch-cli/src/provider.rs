//! Registry-backed metadata provider.
//!
//! Thin JSON client for the distribution registry; the engine itself only
//! ever sees the `MetadataProvider` trait.

use async_trait::async_trait;
use serde::Deserialize;

use hutch_core::InstallError;
use hutch_core::metadata::MetadataProvider;

#[derive(Debug, Deserialize)]
struct PackageFacts {
    versions: Vec<String>,
    #[serde(default)]
    dependencies: Vec<String>,
}

/// Fetches package facts from `{base}/{domain}/metadata.json` and the alias
/// table from `{base}/aliases.json` once per process.
#[derive(Debug)]
pub struct RegistryProvider {
    base: String,
    client: reqwest::Client,
    aliases: tokio::sync::OnceCell<std::collections::HashMap<String, String>>,
}

impl RegistryProvider {
    pub fn new(base: impl Into<String>) -> Result<Self, InstallError> {
        let client = reqwest::Client::builder()
            .user_agent(hutch_core::USER_AGENT)
            .build()
            .map_err(|e| InstallError::Other(e.to_string()))?;
        Ok(Self {
            base: base.into(),
            client,
            aliases: tokio::sync::OnceCell::new(),
        })
    }

    async fn facts(&self, domain: &str) -> Result<PackageFacts, InstallError> {
        let url = format!("{}/{domain}/metadata.json", self.base.trim_end_matches('/'));
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| InstallError::Other(e.to_string()))?;
        if !response.status().is_success() {
            return Err(InstallError::MetadataNotFound(domain.to_string()));
        }
        response
            .json()
            .await
            .map_err(|_| InstallError::MetadataNotFound(domain.to_string()))
    }
}

#[async_trait]
impl MetadataProvider for RegistryProvider {
    async fn versions(&self, domain: &str) -> Result<Vec<String>, InstallError> {
        Ok(self.facts(domain).await?.versions)
    }

    async fn dependencies(&self, domain: &str) -> Result<Vec<String>, InstallError> {
        Ok(self.facts(domain).await?.dependencies)
    }

    async fn resolve_alias(&self, name: &str) -> Option<String> {
        let aliases = self
            .aliases
            .get_or_init(|| async {
                let url = format!("{}/aliases.json", self.base.trim_end_matches('/'));
                match self.client.get(&url).send().await {
                    Ok(resp) => resp.json().await.unwrap_or_default(),
                    Err(_) => Default::default(),
                }
            })
            .await;
        aliases.get(name).cloned()
    }
}
