//! Consumed build/installer collaborators, registered per domain.
//!
//! The engine never compiles anything itself: a `SourceBuilder` knows how to
//! produce a package from its source distribution, and a
//! `SpecializedInstaller` owns the whole acquisition flow for runtimes that
//! ship their own release channel.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::InstallError;

/// Builds a package from source into the install root. Implementations
/// return the paths they installed.
#[async_trait]
pub trait SourceBuilder: Send + Sync {
    async fn build(&self, install_root: &Path, version: &str)
    -> Result<Vec<PathBuf>, InstallError>;
}

/// Installs a runtime through its own release channel, bypassing the
/// archive pipeline entirely.
#[async_trait]
pub trait SpecializedInstaller: Send + Sync {
    async fn install(
        &self,
        install_root: &Path,
        version: Option<&str>,
    ) -> Result<Vec<PathBuf>, InstallError>;
}

/// Domain-keyed registry of the pluggable collaborators.
#[derive(Default)]
pub struct BuilderRegistry {
    builders: HashMap<String, Arc<dyn SourceBuilder>>,
    specialized: HashMap<String, Arc<dyn SpecializedInstaller>>,
}

impl BuilderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_builder(&mut self, domain: impl Into<String>, builder: Arc<dyn SourceBuilder>) {
        self.builders.insert(domain.into(), builder);
    }

    pub fn register_specialized(
        &mut self,
        domain: impl Into<String>,
        installer: Arc<dyn SpecializedInstaller>,
    ) {
        self.specialized.insert(domain.into(), installer);
    }

    pub fn builder_for(&self, domain: &str) -> Option<Arc<dyn SourceBuilder>> {
        self.builders.get(domain).cloned()
    }

    pub fn specialized_for(&self, domain: &str) -> Option<Arc<dyn SpecializedInstaller>> {
        self.specialized.get(domain).cloned()
    }
}

impl fmt::Debug for BuilderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuilderRegistry")
            .field("builders", &self.builders.keys().collect::<Vec<_>>())
            .field("specialized", &self.specialized.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopBuilder;

    #[async_trait]
    impl SourceBuilder for NoopBuilder {
        async fn build(
            &self,
            _install_root: &Path,
            _version: &str,
        ) -> Result<Vec<PathBuf>, InstallError> {
            Ok(vec![])
        }
    }

    #[test]
    fn registry_is_domain_keyed() {
        let mut registry = BuilderRegistry::new();
        registry.register_builder("openssl.org", Arc::new(NoopBuilder));

        assert!(registry.builder_for("openssl.org").is_some());
        assert!(registry.builder_for("zlib.net").is_none());
        assert!(registry.specialized_for("openssl.org").is_none());
    }
}
