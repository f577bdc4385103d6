//! Consumed collaborator seams: package metadata and whole-graph resolution.
//!
//! The engine never implements these; it is handed concrete implementations
//! (a registry-backed provider, an external graph solver) and only depends on
//! the traits.

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::error::InstallError;
use crate::extract::ArchiveFormat;
use crate::spec::Platform;

/// A package pinned to a concrete version and preferred archive format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPackage {
    pub domain: String,
    pub version: String,
    pub format: ArchiveFormat,
}

impl ResolvedPackage {
    pub fn new(domain: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            version: version.into(),
            format: ArchiveFormat::TarGz,
        }
    }
}

/// Source of package facts: versions, declared dependencies, alias mapping.
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    /// Available versions for a domain, ordered latest-first.
    async fn versions(&self, domain: &str) -> Result<Vec<String>, InstallError>;

    /// Declared runtime dependencies as raw spec strings
    /// (e.g. `zlib.net^1.2`, `linux:gnu.org/gcc/libstdcxx`).
    async fn dependencies(&self, domain: &str) -> Result<Vec<String>, InstallError>;

    /// Canonical domain for a user-facing alias, if the alias is known.
    async fn resolve_alias(&self, name: &str) -> Option<String>;
}

/// External whole-graph dependency solver. When present its output is trusted
/// as complete: no further dependency expansion happens downstream.
#[async_trait]
pub trait GraphResolver: Send + Sync {
    async fn resolve(
        &self,
        constraints: &BTreeMap<String, Option<String>>,
        platform: Platform,
    ) -> Result<Vec<ResolvedPackage>, InstallError>;
}
