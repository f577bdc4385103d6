use std::path::{Path, PathBuf};

use dirs::home_dir;

/// Returns the primary hutch directory, or None if the user's home cannot be resolved.
pub fn try_hutch_home() -> Option<PathBuf> {
    if let Ok(val) = std::env::var("HUTCH_HOME") {
        return Some(PathBuf::from(val));
    }
    home_dir().map(|h| h.join(".hutch"))
}

/// Returns the canonical hutch home directory (`~/.hutch`).
///
/// # Panics
///
/// Panics if neither `HUTCH_HOME` is set nor the user's home directory can be
/// resolved.
pub fn hutch_home() -> PathBuf {
    try_hutch_home().expect("Could not determine home directory. Set HUTCH_HOME to override.")
}

/// Default install root: packages, shims, and manifests all live under it.
pub fn default_install_root() -> PathBuf {
    hutch_home()
}

/// Default download cache root: ~/.hutch/cache
pub fn default_cache_root() -> PathBuf {
    hutch_home().join("cache")
}

/// Versioned payload directory: `{root}/{domain}/v{version}`
pub fn package_dir(install_root: &Path, domain: &str, version: &str) -> PathBuf {
    domain_dir(install_root, domain).join(format!("v{version}"))
}

/// Directory holding a domain's versioned payloads and version symlinks.
pub fn domain_dir(install_root: &Path, domain: &str) -> PathBuf {
    install_root.join(domain)
}

/// Install manifest: `{root}/pkgs/{domain}/v{version}/metadata.json`
pub fn manifest_path(install_root: &Path, domain: &str, version: &str) -> PathBuf {
    install_root
        .join("pkgs")
        .join(domain)
        .join(format!("v{version}"))
        .join("metadata.json")
}

/// Shim directory for a binary kind (`bin` or `sbin`).
pub fn shim_dir(install_root: &Path, kind: &str) -> PathBuf {
    install_root.join(kind)
}
