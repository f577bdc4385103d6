//! Dependency resolution: whole-graph primary, local recursive fallback.
//!
//! The external `GraphResolver` is preferred and its output trusted as
//! complete. When it is absent or fails, requested specs are deduplicated
//! by domain locally and dependency expansion happens during installation
//! through `dependencies_of`.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::error::InstallError;
use crate::metadata::{GraphResolver, MetadataProvider, ResolvedPackage};
use crate::spec::{DependencySpec, PackageSpec, Platform};
use crate::version::{resolve_version, try_compare};

/// Domains skipped during dependency walks: their standalone archives are
/// chronically broken and the host toolchain provides them anyway.
const SKIP_DOMAINS: &[&str] = &["gnu.org/gcc/libstdcxx", "llvm.org/compiler-rt"];

/// Hand-authored substitutions for constraints pinned to majors that no
/// longer ship archives; the cross-major compat links make the upgrade
/// resolvable for old consumers.
const MAJOR_COMPAT: &[(&str, u64, &str)] = &[("openssl.org", 1, "^3"), ("unicode.org", 71, "^73")];

/// Outcome of resolving a batch of requested specs.
#[derive(Debug)]
pub struct Resolution {
    pub packages: Vec<ResolvedPackage>,
    /// Per-spec failures; the rest of the batch continues without them.
    pub failures: Vec<(String, InstallError)>,
    /// True when the whole-graph resolver produced the set: it is complete
    /// and needs no further dependency expansion.
    pub complete: bool,
}

pub struct DependencyResolver {
    provider: Arc<dyn MetadataProvider>,
    graph: Option<Arc<dyn GraphResolver>>,
    platform: Platform,
}

impl std::fmt::Debug for DependencyResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DependencyResolver")
            .field("platform", &self.platform)
            .field("graph", &self.graph.is_some())
            .finish()
    }
}

impl DependencyResolver {
    pub fn new(
        provider: Arc<dyn MetadataProvider>,
        graph: Option<Arc<dyn GraphResolver>>,
        platform: Platform,
    ) -> Self {
        Self {
            provider,
            graph,
            platform,
        }
    }

    /// Resolve requested specs into a deduplicated install set.
    pub async fn resolve_all(&self, specs: &[PackageSpec]) -> Resolution {
        let mut normalized = Vec::with_capacity(specs.len());
        for spec in specs {
            let domain = self
                .provider
                .resolve_alias(&spec.name)
                .await
                .unwrap_or_else(|| spec.name.clone());
            normalized.push(PackageSpec {
                name: domain,
                constraint: spec.constraint.clone(),
            });
        }

        if let Some(graph) = &self.graph {
            let mut constraints: BTreeMap<String, Option<String>> = BTreeMap::new();
            for spec in &normalized {
                let slot = constraints.entry(spec.name.clone()).or_default();
                if slot.is_none() {
                    slot.clone_from(&spec.constraint);
                }
            }
            match graph.resolve(&constraints, self.platform).await {
                Ok(packages) => {
                    return Resolution {
                        packages: dedupe_by_domain(packages),
                        failures: Vec::new(),
                        complete: true,
                    };
                }
                Err(err) => {
                    tracing::warn!(%err, "graph resolver failed, using local resolution");
                }
            }
        }

        self.resolve_local(&normalized).await
    }

    async fn resolve_local(&self, specs: &[PackageSpec]) -> Resolution {
        let mut order: Vec<String> = Vec::new();
        let mut by_domain: HashMap<String, ResolvedPackage> = HashMap::new();
        let mut failures = Vec::new();

        for spec in specs {
            match self.resolve_spec(spec).await {
                Ok(pkg) => match by_domain.get_mut(&pkg.domain) {
                    Some(existing) => {
                        // Higher requested version per domain wins.
                        if try_compare(&pkg.version, &existing.version) == Some(Ordering::Greater) {
                            existing.version = pkg.version;
                        }
                    }
                    None => {
                        order.push(pkg.domain.clone());
                        by_domain.insert(pkg.domain.clone(), pkg);
                    }
                },
                Err(err) => failures.push((spec.name.clone(), err)),
            }
        }

        Resolution {
            packages: order
                .into_iter()
                .filter_map(|domain| by_domain.remove(&domain))
                .collect(),
            failures,
            complete: false,
        }
    }

    async fn resolve_spec(&self, spec: &PackageSpec) -> Result<ResolvedPackage, InstallError> {
        let versions = self.provider.versions(&spec.name).await?;
        if versions.is_empty() {
            return Err(InstallError::MetadataNotFound(spec.name.clone()));
        }
        let version = resolve_version(&versions, spec.constraint.as_deref()).ok_or_else(|| {
            InstallError::VersionUnresolvable {
                domain: spec.name.clone(),
                constraint: spec.constraint.clone().unwrap_or_else(|| "latest".into()),
            }
        })?;
        Ok(ResolvedPackage::new(spec.name.clone(), version))
    }

    /// Declared dependencies of `domain` that apply on this platform,
    /// resolved to concrete versions with staged fallbacks.
    pub async fn dependencies_of(
        &self,
        domain: &str,
    ) -> Result<Vec<ResolvedPackage>, InstallError> {
        let raw = self.provider.dependencies(domain).await?;
        let mut out = Vec::new();

        for item in raw {
            let dep = DependencySpec::parse(&item)?;
            if !dep.matches_platform(self.platform) {
                tracing::debug!(dep = %dep.name, "skipping dependency for other platform");
                continue;
            }
            if SKIP_DOMAINS.contains(&dep.name.as_str()) {
                tracing::debug!(dep = %dep.name, "skipping known-unreliable dependency");
                continue;
            }

            let canonical = self
                .provider
                .resolve_alias(&dep.name)
                .await
                .unwrap_or_else(|| dep.name.clone());
            let versions = self.provider.versions(&canonical).await?;
            if versions.is_empty() {
                return Err(InstallError::MetadataNotFound(canonical));
            }
            let version =
                self.resolve_dep_version(&canonical, &versions, dep.constraint.as_deref());
            out.push(ResolvedPackage::new(canonical, version));
        }

        Ok(out)
    }

    /// Staged resolution for dependency constraints: the declared constraint,
    /// then any same-major version, then the cross-major compatibility
    /// table, then latest as the last resort.
    fn resolve_dep_version(
        &self,
        domain: &str,
        versions: &[String],
        constraint: Option<&str>,
    ) -> String {
        if let Some(version) = resolve_version(versions, constraint) {
            return version;
        }

        if let Some(major) = constraint.and_then(constraint_major) {
            if let Some(version) = resolve_version(versions, Some(&format!("^{major}"))) {
                tracing::debug!(domain, major, "constraint relaxed to same-major version");
                return version;
            }
            if let Some((_, _, substitute)) = MAJOR_COMPAT
                .iter()
                .find(|(d, m, _)| *d == domain && *m == major)
            {
                if let Some(version) = resolve_version(versions, Some(substitute)) {
                    tracing::warn!(
                        domain,
                        major,
                        substitute,
                        "constraint crosses an ABI-incompatible major, substituting"
                    );
                    return version;
                }
            }
        }

        // Last resort: the provider's newest.
        tracing::warn!(domain, ?constraint, "unresolvable constraint, using latest");
        versions[0].clone()
    }
}

/// Collapse duplicate domains, keeping the highest version of each.
fn dedupe_by_domain(packages: Vec<ResolvedPackage>) -> Vec<ResolvedPackage> {
    let mut order: Vec<String> = Vec::new();
    let mut by_domain: HashMap<String, ResolvedPackage> = HashMap::new();
    for pkg in packages {
        match by_domain.get_mut(&pkg.domain) {
            Some(existing) => {
                if try_compare(&pkg.version, &existing.version) == Some(Ordering::Greater) {
                    *existing = pkg;
                }
            }
            None => {
                order.push(pkg.domain.clone());
                by_domain.insert(pkg.domain.clone(), pkg);
            }
        }
    }
    order
        .into_iter()
        .filter_map(|domain| by_domain.remove(&domain))
        .collect()
}

/// Leading numeric major of a constraint (`^1.1` -> 1, `>=2.0` -> 2).
fn constraint_major(constraint: &str) -> Option<u64> {
    let trimmed = constraint.trim_start_matches(['^', '~', '>', '<', '=', ' ']);
    let digits: String = trimmed.chars().take_while(char::is_ascii_digit).collect();
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;

    #[derive(Default)]
    struct FakeProvider {
        versions: HashMap<String, Vec<String>>,
        deps: HashMap<String, Vec<String>>,
        aliases: HashMap<String, String>,
    }

    impl FakeProvider {
        fn with_versions(mut self, domain: &str, versions: &[&str]) -> Self {
            self.versions.insert(
                domain.to_string(),
                versions.iter().map(|v| (*v).to_string()).collect(),
            );
            self
        }

        fn with_deps(mut self, domain: &str, deps: &[&str]) -> Self {
            self.deps.insert(
                domain.to_string(),
                deps.iter().map(|d| (*d).to_string()).collect(),
            );
            self
        }

        fn with_alias(mut self, alias: &str, domain: &str) -> Self {
            self.aliases.insert(alias.to_string(), domain.to_string());
            self
        }
    }

    #[async_trait]
    impl MetadataProvider for FakeProvider {
        async fn versions(&self, domain: &str) -> Result<Vec<String>, InstallError> {
            self.versions
                .get(domain)
                .cloned()
                .ok_or_else(|| InstallError::MetadataNotFound(domain.to_string()))
        }

        async fn dependencies(&self, domain: &str) -> Result<Vec<String>, InstallError> {
            Ok(self.deps.get(domain).cloned().unwrap_or_default())
        }

        async fn resolve_alias(&self, name: &str) -> Option<String> {
            self.aliases.get(name).cloned()
        }
    }

    struct FixedGraph(Vec<ResolvedPackage>);

    #[async_trait]
    impl GraphResolver for FixedGraph {
        async fn resolve(
            &self,
            _constraints: &BTreeMap<String, Option<String>>,
            _platform: Platform,
        ) -> Result<Vec<ResolvedPackage>, InstallError> {
            Ok(self.0.clone())
        }
    }

    struct BrokenGraph;

    #[async_trait]
    impl GraphResolver for BrokenGraph {
        async fn resolve(
            &self,
            _constraints: &BTreeMap<String, Option<String>>,
            _platform: Platform,
        ) -> Result<Vec<ResolvedPackage>, InstallError> {
            Err(InstallError::Other("graph service unavailable".into()))
        }
    }

    fn spec(raw: &str) -> PackageSpec {
        PackageSpec::parse(raw).unwrap()
    }

    #[tokio::test]
    async fn duplicate_domains_keep_highest_version() {
        let provider = FakeProvider::default().with_versions("pkga.dev", &["2.0", "1.0"]);
        let resolver = DependencyResolver::new(Arc::new(provider), None, Platform::Linux);

        let res = resolver
            .resolve_all(&[spec("pkga.dev@1.0"), spec("pkga.dev@2.0")])
            .await;

        assert_eq!(res.packages.len(), 1);
        assert_eq!(res.packages[0].version, "2.0");
        assert!(!res.complete);
    }

    #[tokio::test]
    async fn graph_result_is_trusted_and_deduped() {
        let provider = FakeProvider::default();
        let graph = FixedGraph(vec![
            ResolvedPackage::new("curl.se", "8.9.0"),
            ResolvedPackage::new("zlib.net", "1.3.1"),
            ResolvedPackage::new("zlib.net", "1.2.13"),
        ]);
        let resolver =
            DependencyResolver::new(Arc::new(provider), Some(Arc::new(graph)), Platform::Linux);

        let res = resolver.resolve_all(&[spec("curl.se")]).await;
        assert!(res.complete);
        assert_eq!(res.packages.len(), 2);
        let zlib = res.packages.iter().find(|p| p.domain == "zlib.net").unwrap();
        assert_eq!(zlib.version, "1.3.1");
    }

    #[tokio::test]
    async fn graph_failure_falls_back_to_local() {
        let provider = FakeProvider::default().with_versions("curl.se", &["8.9.0"]);
        let resolver = DependencyResolver::new(
            Arc::new(provider),
            Some(Arc::new(BrokenGraph)),
            Platform::Linux,
        );

        let res = resolver.resolve_all(&[spec("curl.se")]).await;
        assert!(!res.complete);
        assert_eq!(res.packages.len(), 1);
        assert_eq!(res.packages[0].version, "8.9.0");
    }

    #[tokio::test]
    async fn unknown_domains_fail_without_sinking_the_batch() {
        let provider = FakeProvider::default().with_versions("curl.se", &["8.9.0"]);
        let resolver = DependencyResolver::new(Arc::new(provider), None, Platform::Linux);

        let res = resolver
            .resolve_all(&[spec("curl.se"), spec("nonexistent.dev")])
            .await;
        assert_eq!(res.packages.len(), 1);
        assert_eq!(res.failures.len(), 1);
        assert_eq!(res.failures[0].0, "nonexistent.dev");
    }

    #[tokio::test]
    async fn aliases_normalize_to_domains() {
        let provider = FakeProvider::default()
            .with_versions("gnu.org/wget", &["1.24.5"])
            .with_alias("wget", "gnu.org/wget");
        let resolver = DependencyResolver::new(Arc::new(provider), None, Platform::Linux);

        let res = resolver.resolve_all(&[spec("wget")]).await;
        assert_eq!(res.packages[0].domain, "gnu.org/wget");
    }

    #[tokio::test]
    async fn dependencies_filter_platform_and_skip_list() {
        let provider = FakeProvider::default()
            .with_versions("curl.se", &["8.9.0"])
            .with_versions("openssl.org", &["3.3.0"])
            .with_versions("zlib.net", &["1.3.1"])
            .with_deps(
                "curl.se",
                &[
                    "openssl.org^3",
                    "zlib.net^1.2",
                    "darwin:apple.com/frameworks",
                    "gnu.org/gcc/libstdcxx",
                ],
            );
        let resolver = DependencyResolver::new(Arc::new(provider), None, Platform::Linux);

        let deps = resolver.dependencies_of("curl.se").await.unwrap();
        let domains: Vec<&str> = deps.iter().map(|d| d.domain.as_str()).collect();
        assert_eq!(domains, vec!["openssl.org", "zlib.net"]);
    }

    #[tokio::test]
    async fn staged_fallback_same_major() {
        // ^1.5 matches nothing, but a same-major 1.3.1 exists
        let provider = FakeProvider::default()
            .with_versions("a.dev", &["1.0.0"])
            .with_versions("zlib.net", &["1.3.1"])
            .with_deps("a.dev", &["zlib.net@^1.5"]);
        let resolver = DependencyResolver::new(Arc::new(provider), None, Platform::Linux);

        let deps = resolver.dependencies_of("a.dev").await.unwrap();
        assert_eq!(deps[0].version, "1.3.1");
    }

    #[tokio::test]
    async fn staged_fallback_crosses_compat_majors() {
        // Only 3.x ships; the compat table maps the pinned major 1 to ^3
        let provider = FakeProvider::default()
            .with_versions("a.dev", &["1.0.0"])
            .with_versions("openssl.org", &["3.3.0", "3.1.0"])
            .with_deps("a.dev", &["openssl.org^1.1"]);
        let resolver = DependencyResolver::new(Arc::new(provider), None, Platform::Linux);

        let deps = resolver.dependencies_of("a.dev").await.unwrap();
        assert_eq!(deps[0].version, "3.3.0");
    }

    #[tokio::test]
    async fn staged_fallback_latest_as_last_resort() {
        let provider = FakeProvider::default()
            .with_versions("a.dev", &["1.0.0"])
            .with_versions("b.dev", &["9.0.0", "8.0.0"])
            .with_deps("a.dev", &["b.dev@^4"]);
        let resolver = DependencyResolver::new(Arc::new(provider), None, Platform::Linux);

        let deps = resolver.dependencies_of("a.dev").await.unwrap();
        assert_eq!(deps[0].version, "9.0.0");
    }
}
