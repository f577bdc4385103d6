//! Per-package install manifest, the durable "installed" marker.
//!
//! Written last in the install pipeline; its presence at
//! `{root}/pkgs/{domain}/v{version}/metadata.json` is what later sessions
//! read as "this domain+version is installed".

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstalledManifest {
    pub domain: String,
    pub version: String,
    pub installed_at: DateTime<Utc>,
    pub binaries: Vec<String>,
    pub install_path: PathBuf,
}

impl InstalledManifest {
    pub fn new(
        domain: impl Into<String>,
        version: impl Into<String>,
        binaries: Vec<String>,
        install_path: PathBuf,
    ) -> Self {
        Self {
            domain: domain.into(),
            version: version.into(),
            installed_at: Utc::now(),
            binaries,
            install_path,
        }
    }

    /// Write the manifest, replacing any previous one wholesale.
    pub fn save(&self, install_root: &Path) -> io::Result<()> {
        let path = crate::paths::manifest_path(install_root, &self.domain, &self.version);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let raw = serde_json::to_string_pretty(self).map_err(io::Error::other)?;
        fs::write(path, raw)
    }

    /// Read a manifest back, if one exists. A corrupt manifest reads as
    /// absent so the package is simply reinstalled.
    pub fn load(install_root: &Path, domain: &str, version: &str) -> Option<Self> {
        let path = crate::paths::manifest_path(install_root, domain, version);
        let raw = fs::read_to_string(path).ok()?;
        serde_json::from_str(&raw).ok()
    }
}
