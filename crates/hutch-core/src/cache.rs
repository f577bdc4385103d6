//! Content-addressed archive cache with a JSON metadata index.
//!
//! Blobs live at `{root}/binaries/packages/{domain}-{version}/package.{fmt}`;
//! the single index file `{root}/cache-metadata.json` records size and access
//! times. An entry is valid iff the on-disk size matches the recorded size;
//! anything else is purged on the next lookup.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::extract::ArchiveFormat;

const INDEX_VERSION: u32 = 1;
const INDEX_FILE: &str = "cache-metadata.json";

/// Files below this size are never trusted as cached archives.
const ORPHAN_MIN_BYTES: u64 = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub domain: String,
    pub version: String,
    pub format: ArchiveFormat,
    pub downloaded_at: DateTime<Utc>,
    pub size_bytes: u64,
    pub last_accessed: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheIndex {
    version: u32,
    packages: HashMap<String, CacheEntry>,
}

impl Default for CacheIndex {
    fn default() -> Self {
        Self {
            version: INDEX_VERSION,
            packages: HashMap::new(),
        }
    }
}

#[derive(Debug)]
pub struct PackageCache {
    root: PathBuf,
    index: CacheIndex,
}

impl PackageCache {
    /// Open (or initialize) the cache at `root`. A corrupt or missing index
    /// starts fresh; orphaned blobs are re-adopted lazily by `lookup`.
    pub fn open(root: &Path) -> io::Result<Self> {
        fs::create_dir_all(root)?;
        let index_path = root.join(INDEX_FILE);
        let index = match fs::read_to_string(&index_path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_default(),
            Err(_) => CacheIndex::default(),
        };
        Ok(Self {
            root: root.to_path_buf(),
            index,
        })
    }

    fn key(domain: &str, version: &str, format: ArchiveFormat) -> String {
        format!("{domain}-{version}-{}", format.extension())
    }

    /// On-disk path for an archive blob, whether or not it exists yet.
    pub fn blob_path(&self, domain: &str, version: &str, format: ArchiveFormat) -> PathBuf {
        self.root
            .join("binaries")
            .join("packages")
            .join(format!("{}-{version}", domain.replace('/', "_")))
            .join(format!("package.{}", format.extension()))
    }

    /// Look up a cached archive. A size mismatch purges both blob and entry.
    /// A plausibly sized blob without an index entry is adopted as valid.
    pub fn lookup(
        &mut self,
        domain: &str,
        version: &str,
        format: ArchiveFormat,
    ) -> io::Result<Option<PathBuf>> {
        let key = Self::key(domain, version, format);
        let path = self.blob_path(domain, version, format);
        let actual = fs::metadata(&path).map(|m| m.len()).ok();

        if let Some(entry) = self.index.packages.get_mut(&key) {
            match actual {
                Some(len) if len == entry.size_bytes => {
                    entry.last_accessed = Utc::now();
                    self.save()?;
                    return Ok(Some(path));
                }
                _ => {
                    let _ = fs::remove_file(&path);
                    self.index.packages.remove(&key);
                    self.save()?;
                    return Ok(None);
                }
            }
        }

        // Self-healing after index loss: trust the blob if it looks real.
        match actual {
            Some(len) if len > ORPHAN_MIN_BYTES => {
                let now = Utc::now();
                self.index.packages.insert(
                    key,
                    CacheEntry {
                        domain: domain.to_string(),
                        version: version.to_string(),
                        format,
                        downloaded_at: now,
                        size_bytes: len,
                        last_accessed: now,
                    },
                );
                self.save()?;
                Ok(Some(path))
            }
            _ => Ok(None),
        }
    }

    /// Copy `source` into the cache and (re)record its entry.
    pub fn store(
        &mut self,
        domain: &str,
        version: &str,
        format: ArchiveFormat,
        source: &Path,
    ) -> io::Result<PathBuf> {
        let path = self.blob_path(domain, version, format);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(source, &path)?;
        let size_bytes = fs::metadata(&path)?.len();

        let now = Utc::now();
        self.index.packages.insert(
            Self::key(domain, version, format),
            CacheEntry {
                domain: domain.to_string(),
                version: version.to_string(),
                format,
                downloaded_at: now,
                size_bytes,
                last_accessed: now,
            },
        );
        self.save()?;
        Ok(path)
    }

    /// Drop a cached archive (e.g. after it failed signature validation).
    pub fn remove(&mut self, domain: &str, version: &str, format: ArchiveFormat) -> io::Result<()> {
        let path = self.blob_path(domain, version, format);
        let _ = fs::remove_file(&path);
        self.index
            .packages
            .remove(&Self::key(domain, version, format));
        self.save()
    }

    /// Evict stale entries: anything idle past `max_age_days` goes
    /// unconditionally, then oldest-accessed entries go until the total size
    /// fits under `max_size_bytes`. Returns the evicted keys.
    pub fn evict(&mut self, max_age_days: i64, max_size_bytes: u64) -> io::Result<Vec<String>> {
        let now = Utc::now();
        let mut evicted = Vec::new();

        let expired: Vec<String> = self
            .index
            .packages
            .iter()
            .filter(|(_, e)| (now - e.last_accessed).num_days() > max_age_days)
            .map(|(k, _)| k.clone())
            .collect();
        for key in expired {
            self.remove_by_key(&key);
            evicted.push(key);
        }

        let mut by_age: Vec<(String, DateTime<Utc>, u64)> = self
            .index
            .packages
            .iter()
            .map(|(k, e)| (k.clone(), e.last_accessed, e.size_bytes))
            .collect();
        by_age.sort_by_key(|(_, accessed, _)| *accessed);

        let mut total: u64 = by_age.iter().map(|(_, _, size)| size).sum();
        for (key, _, size) in by_age {
            if total <= max_size_bytes {
                break;
            }
            self.remove_by_key(&key);
            total -= size;
            evicted.push(key);
        }

        self.save()?;
        Ok(evicted)
    }

    /// Sum of recorded entry sizes.
    pub fn total_size(&self) -> u64 {
        self.index.packages.values().map(|e| e.size_bytes).sum()
    }

    fn remove_by_key(&mut self, key: &str) {
        if let Some(entry) = self.index.packages.remove(key) {
            let path = self.blob_path(&entry.domain, &entry.version, entry.format);
            let _ = fs::remove_file(&path);
        }
    }

    fn save(&self) -> io::Result<()> {
        let raw = serde_json::to_string_pretty(&self.index).map_err(io::Error::other)?;
        fs::write(self.root.join(INDEX_FILE), raw)
    }

    #[cfg(test)]
    fn backdate(&mut self, domain: &str, version: &str, format: ArchiveFormat, days: i64) {
        let key = Self::key(domain, version, format);
        if let Some(entry) = self.index.packages.get_mut(&key) {
            entry.last_accessed = Utc::now() - chrono::Duration::days(days);
        }
    }
}
