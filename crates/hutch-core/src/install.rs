//! The install engine.
//!
//! Orchestrates resolution, cache, download, layout, linking, validation,
//! and shim generation for a batch of requested packages. Ordering
//! guarantees within one package: cache lookup before network fetch,
//! extraction before symlinks and shims, validation before the source-build
//! fallback, manifest written last.

use std::path::PathBuf;
use std::sync::Arc;

use crate::builder::BuilderRegistry;
use crate::cache::PackageCache;
use crate::command::{CommandRunner, TokioRunner};
use crate::download::{DownloadCandidate, Downloader};
use crate::error::InstallError;
use crate::extract::{ArchiveFormat, Extractor};
use crate::manifest::InstalledManifest;
use crate::metadata::{GraphResolver, MetadataProvider, ResolvedPackage};
use crate::reporter::{NullReporter, Reporter};
use crate::resolver::DependencyResolver;
use crate::session::{InstallSession, TrackDecision};
use crate::spec::{PackageSpec, Platform};
use crate::{links, shim, validate};

/// Default archive mirrors, preferred first.
const DEFAULT_MIRRORS: &[&str] = &["https://dist.hutch.sh", "https://mirror.hutch.sh"];

/// Archive formats tried per mirror, preferred first.
const FORMAT_PREFERENCE: &[ArchiveFormat] = &[ArchiveFormat::TarGz, ArchiveFormat::TarXz];

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub install_root: PathBuf,
    pub cache_root: PathBuf,
    /// Mirror base URLs, preferred first.
    pub dist_urls: Vec<String>,
    pub platform: Platform,
}

impl EngineConfig {
    pub fn new(install_root: PathBuf, cache_root: PathBuf) -> Result<Self, InstallError> {
        Ok(Self {
            install_root,
            cache_root,
            dist_urls: DEFAULT_MIRRORS.iter().map(|m| (*m).to_string()).collect(),
            platform: Platform::current()?,
        })
    }
}

/// Outcome of one batch of install requests.
#[derive(Debug, Default)]
pub struct InstallReport {
    pub requested: usize,
    pub installed: Vec<InstalledManifest>,
    pub failed: Vec<(String, InstallError)>,
}

impl InstallReport {
    /// Every path this batch materialized: payload dirs plus shims.
    pub fn installed_paths(&self, install_root: &std::path::Path) -> Vec<PathBuf> {
        let mut paths = Vec::new();
        for manifest in &self.installed {
            paths.push(manifest.install_path.clone());
            for name in &manifest.binaries {
                paths.push(crate::paths::shim_dir(install_root, "bin").join(name));
            }
        }
        paths
    }
}

pub struct Engine {
    config: EngineConfig,
    provider: Arc<dyn MetadataProvider>,
    graph: Option<Arc<dyn GraphResolver>>,
    registry: BuilderRegistry,
    runner: Arc<dyn CommandRunner>,
    reporter: Arc<dyn Reporter>,
    downloader: Downloader,
    cache: PackageCache,
    session: InstallSession,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

impl Engine {
    pub fn new(
        config: EngineConfig,
        provider: Arc<dyn MetadataProvider>,
    ) -> Result<Self, InstallError> {
        let cache = PackageCache::open(&config.cache_root)?;
        Ok(Self {
            config,
            provider,
            graph: None,
            registry: BuilderRegistry::new(),
            runner: Arc::new(TokioRunner),
            reporter: Arc::new(NullReporter),
            downloader: Downloader::new()?,
            cache,
            session: InstallSession::new(),
        })
    }

    pub fn with_graph_resolver(mut self, graph: Arc<dyn GraphResolver>) -> Self {
        self.graph = Some(graph);
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn with_runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.runner = runner;
        self
    }

    pub fn registry_mut(&mut self) -> &mut BuilderRegistry {
        &mut self.registry
    }

    /// Prune the download cache.
    pub fn evict_cache(
        &mut self,
        max_age_days: i64,
        max_size_bytes: u64,
    ) -> Result<Vec<String>, InstallError> {
        Ok(self.cache.evict(max_age_days, max_size_bytes)?)
    }

    /// Install a batch of requested specs. One package failing never aborts
    /// the others; each outcome is reported individually.
    pub async fn install(&mut self, specs: &[String]) -> Result<InstallReport, InstallError> {
        let parsed = specs
            .iter()
            .map(|s| PackageSpec::parse(s))
            .collect::<Result<Vec<_>, _>>()?;

        let resolution = self.resolver().resolve_all(&parsed).await;
        let expand_deps = !resolution.complete;

        let mut report = InstallReport {
            requested: parsed.len(),
            ..InstallReport::default()
        };
        for (name, err) in resolution.failures {
            self.reporter.failed(&name, "", &err.to_string());
            report.failed.push((name, err));
        }

        for pkg in &resolution.packages {
            let mut installed = Vec::new();
            let outcome = self.install_tracked(pkg, expand_deps, &mut installed).await;
            // Dependencies that made it in before a failure are real installs.
            report.installed.append(&mut installed);
            if let Err(err) = outcome {
                if let Some(hint) = err.hint() {
                    self.reporter.warning(hint);
                }
                self.reporter.failed(&pkg.domain, &pkg.version, &err.to_string());
                report.failed.push((pkg.domain.clone(), err));
            }
        }

        self.reporter
            .summary(report.installed.len(), report.requested);
        self.path_hints(&report);
        Ok(report)
    }

    fn resolver(&self) -> DependencyResolver {
        DependencyResolver::new(
            self.provider.clone(),
            self.graph.clone(),
            self.config.platform,
        )
    }

    /// Session-aware install of one package, optionally expanding its
    /// dependency tree first (depth-first, serial). Every manifest this call
    /// materializes (dependencies included) lands in `installed`.
    async fn install_tracked(
        &mut self,
        pkg: &ResolvedPackage,
        expand_deps: bool,
        installed: &mut Vec<InstalledManifest>,
    ) -> Result<(), InstallError> {
        match self.session.arbitrate(&pkg.domain, &pkg.version) {
            TrackDecision::AlreadySatisfied => {
                tracing::debug!(domain = %pkg.domain, version = %pkg.version, "already satisfied");
                return Ok(());
            }
            TrackDecision::SkipOlder { kept } => {
                tracing::debug!(
                    domain = %pkg.domain,
                    requested = %pkg.version,
                    %kept,
                    "keeping newer tracked version"
                );
                return Ok(());
            }
            TrackDecision::Upgrade { from } => {
                tracing::debug!(domain = %pkg.domain, %from, to = %pkg.version, "upgrading in place");
            }
            TrackDecision::Install => {}
        }

        // Cycle guard: mark before recursing into dependencies.
        self.session.track(&pkg.domain, &pkg.version);

        // A manifest from an earlier session means the payload is already on
        // disk; trust it when it still validates.
        if let Some(manifest) =
            InstalledManifest::load(&self.config.install_root, &pkg.domain, &pkg.version)
        {
            let payload =
                crate::paths::package_dir(&self.config.install_root, &pkg.domain, &pkg.version);
            if payload.is_dir() && validate::is_complete(&payload, &pkg.domain) {
                self.reporter
                    .done(&pkg.domain, &pkg.version, "already installed");
                installed.push(manifest);
                return Ok(());
            }
        }

        if expand_deps {
            let deps = self.resolver().dependencies_of(&pkg.domain).await?;
            for dep in deps {
                // Depth-first: a dependency's own tree installs before it does.
                Box::pin(self.install_tracked(&dep, true, installed)).await?;
            }
        }

        let manifest = self.install_package(pkg).await?;
        installed.push(manifest);
        Ok(())
    }

    /// The per-package pipeline: specialized installer or cache → download →
    /// extract → links → validate (→ source build) → shims → manifest.
    async fn install_package(
        &mut self,
        pkg: &ResolvedPackage,
    ) -> Result<InstalledManifest, InstallError> {
        let install_root = self.config.install_root.clone();

        if let Some(installer) = self.registry.specialized_for(&pkg.domain) {
            self.reporter.installing(&pkg.domain, &pkg.version);
            let files = installer.install(&install_root, Some(&pkg.version)).await?;
            let binaries = files
                .iter()
                .filter_map(|p| p.file_name().and_then(|n| n.to_str()))
                .map(str::to_string)
                .collect();
            let manifest = InstalledManifest::new(
                pkg.domain.clone(),
                pkg.version.clone(),
                binaries,
                crate::paths::package_dir(&install_root, &pkg.domain, &pkg.version),
            );
            manifest.save(&install_root)?;
            self.reporter.done(&pkg.domain, &pkg.version, "installed");
            return Ok(manifest);
        }

        let (archive, format) = self.obtain_archive(pkg).await?;

        self.reporter.installing(&pkg.domain, &pkg.version);
        let extractor = Extractor::new(&*self.runner);
        let package_dir = extractor
            .install(&archive, format, &pkg.domain, &pkg.version, &install_root)
            .await?;

        links::create_version_links(&install_root, &pkg.domain, &pkg.version)?;
        links::create_library_links(&package_dir, &pkg.domain)?;
        links::create_compat_links(&install_root, &pkg.domain, &pkg.version)?;

        if !validate::is_complete(&package_dir, &pkg.domain) {
            self.run_source_fallback(pkg).await;
        }

        let binaries = shim::create_shims(&package_dir, &install_root, &pkg.domain, &pkg.version)?;

        // Manifest last: its presence is the durable "installed" signal.
        let manifest = InstalledManifest::new(
            pkg.domain.clone(),
            pkg.version.clone(),
            binaries,
            package_dir,
        );
        manifest.save(&install_root)?;

        self.reporter.done(&pkg.domain, &pkg.version, "installed");
        Ok(manifest)
    }

    /// Cache lookup first; a miss (or an invalid cached blob) downloads from
    /// the mirrors and stores the result.
    async fn obtain_archive(
        &mut self,
        pkg: &ResolvedPackage,
    ) -> Result<(PathBuf, ArchiveFormat), InstallError> {
        for format in FORMAT_PREFERENCE.iter().copied() {
            if let Some(path) = self.cache.lookup(&pkg.domain, &pkg.version, format)? {
                match crate::download::validate_archive(&path).await {
                    Ok(()) => {
                        tracing::debug!(domain = %pkg.domain, %format, "cache hit");
                        return Ok((path, format));
                    }
                    Err(err) => {
                        tracing::warn!(domain = %pkg.domain, %err, "purging corrupt cached archive");
                        self.cache.remove(&pkg.domain, &pkg.version, format)?;
                    }
                }
            }
        }

        let candidates = self.candidates(pkg);
        let staging = tempfile::Builder::new().prefix("hutch-dl-").tempdir()?;
        let partial = staging.path().join("package.partial");

        let won = self
            .downloader
            .fetch(
                &pkg.domain,
                &pkg.version,
                &candidates,
                &partial,
                &*self.reporter,
            )
            .await?;

        let stored = self
            .cache
            .store(&pkg.domain, &pkg.version, won.format, &partial)?;
        Ok((stored, won.format))
    }

    /// Candidate URLs: every mirror × every archive format, mirrors first.
    fn candidates(&self, pkg: &ResolvedPackage) -> Vec<DownloadCandidate> {
        let platform = self.config.platform;
        let mut candidates = Vec::new();
        for base in &self.config.dist_urls {
            for format in FORMAT_PREFERENCE.iter().copied() {
                candidates.push(DownloadCandidate {
                    url: format!(
                        "{}/{}/{platform}/v{}.{}",
                        base.trim_end_matches('/'),
                        pkg.domain,
                        pkg.version,
                        format.extension()
                    ),
                    format,
                });
            }
        }
        candidates
    }

    /// Incomplete installation: try a registered source builder; failure or
    /// absence downgrades to a warning and keeps what was extracted.
    async fn run_source_fallback(&self, pkg: &ResolvedPackage) {
        let incomplete = InstallError::Incomplete {
            domain: pkg.domain.clone(),
        };
        let Some(builder) = self.registry.builder_for(&pkg.domain) else {
            self.reporter.warning(&format!(
                "{incomplete}; keeping it (no source builder registered)"
            ));
            return;
        };

        self.reporter.building(&pkg.domain, &pkg.version);
        match builder.build(&self.config.install_root, &pkg.version).await {
            Ok(files) => {
                tracing::debug!(
                    domain = %pkg.domain,
                    installed = files.len(),
                    "source build replaced incomplete payload"
                );
            }
            Err(err) => {
                let err = InstallError::SourceBuild {
                    domain: pkg.domain.clone(),
                    reason: err.to_string(),
                };
                self.reporter
                    .warning(&format!("{err}; keeping incomplete installation"));
            }
        }
    }

    /// Post-install UX checks: shim dir on PATH, shadowed binaries.
    fn path_hints(&self, report: &InstallReport) {
        if report.installed.is_empty() {
            return;
        }
        let bin_dir = crate::paths::shim_dir(&self.config.install_root, "bin");
        let path_env = std::env::var_os("PATH").unwrap_or_default();
        if !std::env::split_paths(&path_env).any(|p| p == bin_dir) {
            self.reporter
                .warning(&format!("{} is not in your PATH", bin_dir.display()));
            self.reporter.info(&format!(
                "add this to your shell profile: export PATH=\"{}:$PATH\"",
                bin_dir.display()
            ));
            return;
        }
        for manifest in &report.installed {
            for name in &manifest.binaries {
                if let Ok(found) = which::which(name) {
                    if !found.starts_with(&bin_dir) {
                        self.reporter.warning(&format!(
                            "'{name}' is shadowed by {}",
                            found.display()
                        ));
                    }
                }
            }
        }
    }
}
