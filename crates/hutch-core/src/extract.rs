//! Archive extraction and versioned-tree layout.
//!
//! Archives unpack into an isolated temporary directory first; the true
//! package root is located inside it and copied into
//! `{install_root}/{domain}/v{version}`.

use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::command::{Command, CommandError, CommandRunner};

/// Archive kinds the engine downloads and unpacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArchiveFormat {
    #[serde(rename = "tar.gz")]
    TarGz,
    #[serde(rename = "tar.xz")]
    TarXz,
}

impl ArchiveFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::TarGz => "tar.gz",
            Self::TarXz => "tar.xz",
        }
    }
}

impl std::fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid path in archive: {0}")]
    PathTraversal(String),

    #[error("archive tool failed: {0}")]
    Tool(#[from] CommandError),
}

/// Directories that mark a payload root inside an extracted archive.
const PAYLOAD_MARKERS: &[&str] = &["bin", "lib", "include", "share", "sbin"];

/// Unpacks archives and materializes versioned install trees.
pub struct Extractor<'a> {
    runner: &'a dyn CommandRunner,
}

impl std::fmt::Debug for Extractor<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Extractor").finish_non_exhaustive()
    }
}

impl<'a> Extractor<'a> {
    pub fn new(runner: &'a dyn CommandRunner) -> Self {
        Self { runner }
    }

    /// Extract `archive` and install its payload as
    /// `{install_root}/{domain}/v{version}`. The temporary staging directory
    /// is removed on both success and failure.
    pub async fn install(
        &self,
        archive: &Path,
        format: ArchiveFormat,
        domain: &str,
        version: &str,
        install_root: &Path,
    ) -> Result<PathBuf, ExtractError> {
        let staging = tempfile::Builder::new().prefix("hutch-").tempdir()?;

        match format {
            ArchiveFormat::TarGz => {
                let archive = archive.to_path_buf();
                let dest = staging.path().to_path_buf();
                tokio::task::spawn_blocking(move || extract_tar_gz(&archive, &dest))
                    .await
                    .map_err(|e| ExtractError::Io(io::Error::other(e)))??;
            }
            ArchiveFormat::TarXz => {
                // No lzma decoder in-process; the system tar handles xz.
                let cmd = Command::new("tar")
                    .arg("-xJf")
                    .arg(archive.to_string_lossy())
                    .arg("-C")
                    .arg(staging.path().to_string_lossy())
                    .timeout(std::time::Duration::from_secs(300));
                self.runner.run(&cmd).await?;
            }
        }

        let payload = locate_package_root(staging.path(), domain, version);
        let dest = crate::paths::package_dir(install_root, domain, version);
        if dest.exists() {
            fs::remove_dir_all(&dest)?;
        }

        let dest_clone = dest.clone();
        tokio::task::spawn_blocking(move || copy_tree(&payload, &dest_clone))
            .await
            .map_err(|e| ExtractError::Io(io::Error::other(e)))??;

        Ok(dest)
    }
}

fn extract_tar_gz(archive: &Path, dest: &Path) -> Result<(), ExtractError> {
    let file = File::open(archive)?;
    let decoder = flate2::read::GzDecoder::new(BufReader::new(file));
    extract_tar(decoder, dest)
}

fn extract_tar<R: Read>(reader: R, dest: &Path) -> Result<(), ExtractError> {
    fs::create_dir_all(dest)?;

    let mut archive = tar::Archive::new(reader);
    archive.set_preserve_permissions(true);

    for entry in archive.entries()? {
        let mut entry = entry?;
        let relative: PathBuf = entry.path()?.components().collect();
        let target = dest.join(&relative);

        // Sanitize paths to prevent entries escaping the staging dir
        if !target.starts_with(dest) {
            return Err(ExtractError::PathTraversal(relative.display().to_string()));
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        entry.unpack(&target)?;
    }

    Ok(())
}

/// Find the directory inside `extracted` that actually holds the payload.
///
/// Checked in order: the conventional `{domain}/v{version}` path, the
/// extraction root itself, then each immediate subdirectory. The first
/// candidate containing any payload marker wins; otherwise the extraction
/// root is used as-is.
pub fn locate_package_root(extracted: &Path, domain: &str, version: &str) -> PathBuf {
    let mut candidates = vec![
        extracted.join(domain).join(format!("v{version}")),
        extracted.to_path_buf(),
    ];
    if let Ok(entries) = fs::read_dir(extracted) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                candidates.push(path);
            }
        }
    }

    candidates
        .into_iter()
        .find(|c| c.is_dir() && has_payload_marker(c))
        .unwrap_or_else(|| extracted.to_path_buf())
}

fn has_payload_marker(dir: &Path) -> bool {
    PAYLOAD_MARKERS.iter().any(|m| dir.join(m).is_dir())
}

/// Recursively copy `src` into `dest`, preserving mode bits. Files that
/// cannot be read or copied are skipped; a dest tree that cannot be written
/// still fails.
pub fn copy_tree(src: &Path, dest: &Path) -> Result<(), ExtractError> {
    fs::create_dir_all(dest)?;

    for entry in walkdir::WalkDir::new(src).min_depth(1) {
        let entry = match entry {
            Ok(e) => e,
            Err(err) => {
                tracing::warn!(%err, "skipping unreadable entry during copy");
                continue;
            }
        };
        let relative = match entry.path().strip_prefix(src) {
            Ok(r) => r,
            Err(_) => continue,
        };
        let target = dest.join(relative);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&target)?;
        } else if file_type.is_symlink() {
            if let Ok(link) = fs::read_link(entry.path()) {
                let _ = fs::remove_file(&target);
                #[cfg(unix)]
                let _ = std::os::unix::fs::symlink(&link, &target);
            }
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            if let Err(err) = fs::copy(entry.path(), &target) {
                tracing::warn!(
                    path = %entry.path().display(),
                    %err,
                    "skipping file during copy"
                );
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::ScriptedRunner;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use tempfile::tempdir;

    /// Build a small tar.gz on disk containing the given (path, contents,
    /// mode) entries.
    fn write_archive(dest: &Path, entries: &[(&str, &str, u32)]) {
        let file = File::create(dest).unwrap();
        let encoder = GzEncoder::new(file, Compression::default());
        let mut builder = tar::Builder::new(encoder);
        for (path, contents, mode) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(contents.len() as u64);
            header.set_mode(*mode);
            header.set_cksum();
            builder
                .append_data(&mut header, path, contents.as_bytes())
                .unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap();
    }

    #[tokio::test]
    async fn installs_conventional_layout() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("pkg.tar.gz");
        write_archive(
            &archive,
            &[
                ("zlib.net/v1.3.1/bin/ztool", "#!/bin/sh\necho z\n", 0o755),
                ("zlib.net/v1.3.1/lib/libz.txt", "lib", 0o644),
            ],
        );

        let root = dir.path().join("root");
        let runner = ScriptedRunner::new();
        let installed = Extractor::new(&runner)
            .install(&archive, ArchiveFormat::TarGz, "zlib.net", "1.3.1", &root)
            .await
            .unwrap();

        assert_eq!(installed, root.join("zlib.net/v1.3.1"));
        assert!(installed.join("bin/ztool").is_file());
        assert!(installed.join("lib/libz.txt").is_file());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(installed.join("bin/ztool"))
                .unwrap()
                .permissions()
                .mode();
            assert_eq!(mode & 0o111, 0o111, "exec bits survive the copy");
        }
    }

    #[tokio::test]
    async fn installs_flat_archive() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("pkg.tar.gz");
        write_archive(&archive, &[("bin/tool", "#!/bin/sh\n", 0o755)]);

        let root = dir.path().join("root");
        let runner = ScriptedRunner::new();
        let installed = Extractor::new(&runner)
            .install(&archive, ArchiveFormat::TarGz, "example.com", "1.0.0", &root)
            .await
            .unwrap();

        assert!(installed.join("bin/tool").is_file());
    }

    #[tokio::test]
    async fn installs_single_nested_dir() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("pkg.tar.gz");
        write_archive(&archive, &[("tool-1.0/bin/tool", "#!/bin/sh\n", 0o755)]);

        let root = dir.path().join("root");
        let runner = ScriptedRunner::new();
        let installed = Extractor::new(&runner)
            .install(&archive, ArchiveFormat::TarGz, "example.com", "1.0.0", &root)
            .await
            .unwrap();

        // The nested dir was detected as the payload root.
        assert!(installed.join("bin/tool").is_file());
        assert!(!installed.join("tool-1.0").exists());
    }

    #[tokio::test]
    async fn xz_goes_through_the_runner() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("pkg.tar.xz");
        fs::write(&archive, b"irrelevant").unwrap();

        let runner = ScriptedRunner::new();
        let root = dir.path().join("root");
        // The scripted runner "extracts" nothing, so the payload is the
        // empty staging root; the install itself still succeeds.
        Extractor::new(&runner)
            .install(&archive, ArchiveFormat::TarXz, "example.com", "1.0.0", &root)
            .await
            .unwrap();

        let calls = runner.invocations();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].program, "tar");
        assert!(calls[0].args.contains(&"-xJf".to_string()));
    }

    #[test]
    fn locate_prefers_conventional_path() {
        let dir = tempdir().unwrap();
        let conventional = dir.path().join("zlib.net/v1.3.1");
        fs::create_dir_all(conventional.join("lib")).unwrap();
        fs::create_dir_all(dir.path().join("other/bin")).unwrap();

        let root = locate_package_root(dir.path(), "zlib.net", "1.3.1");
        assert_eq!(root, conventional);
    }

    #[test]
    fn locate_falls_back_to_extraction_root() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("README"), "hi").unwrap();

        let root = locate_package_root(dir.path(), "example.com", "1.0.0");
        assert_eq!(root, dir.path());
    }

    #[test]
    fn copy_tree_skips_unreadable_files() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        fs::create_dir_all(src.join("bin")).unwrap();
        fs::write(src.join("bin/ok"), "fine").unwrap();

        let dest = dir.path().join("dest");
        copy_tree(&src, &dest).unwrap();
        assert!(dest.join("bin/ok").is_file());
    }
}
