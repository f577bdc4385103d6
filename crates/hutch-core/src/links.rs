//! Version, library, and ABI-compatibility symlinks.
//!
//! Version aliases (`v*`, `v{major}`, `v{major}.{minor}`) always point at
//! the most recently installed version. Library aliases come from a
//! per-domain table plus a generic versioned-filename rule.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

/// Per-domain library aliases: (target filename, link filename) pairs,
/// applied only when the target exists and the link does not.
const LIB_ALIASES: &[(&str, &[(&str, &str)])] = &[
    (
        "openssl.org",
        &[
            ("libssl.so.1.1", "libssl.so"),
            ("libcrypto.so.1.1", "libcrypto.so"),
            ("libssl.1.1.dylib", "libssl.dylib"),
            ("libcrypto.1.1.dylib", "libcrypto.dylib"),
        ],
    ),
    (
        "zlib.net",
        &[("libz.so.1", "libz.so"), ("libz.1.dylib", "libz.dylib")],
    ),
    (
        "sqlite.org",
        &[
            ("libsqlite3.so.0", "libsqlite3.so"),
            ("libsqlite3.0.dylib", "libsqlite3.dylib"),
        ],
    ),
];

/// Domains whose consumers still resolve a legacy major path. The legacy
/// name is aliased to whatever is actually installed so old ABI paths keep
/// working.
const COMPAT_MAJORS: &[(&str, &str)] = &[("openssl.org", "v1"), ("unicode.org", "v71")];

static VERSIONED_LIB: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^lib(?P<name>[A-Za-z0-9_+-]+)\.(?P<ver>\d+(?:\.\d+)*)\.(?P<ext>so|dylib)$")
        .expect("static pattern")
});

/// Create/refresh `v*`, `v{major}`, and `v{major}.{minor}` symlinks inside
/// the domain directory, all pointing at `v{version}`. Existing links are
/// replaced, never appended.
pub fn create_version_links(install_root: &Path, domain: &str, version: &str) -> io::Result<()> {
    let dir = crate::paths::domain_dir(install_root, domain);
    fs::create_dir_all(&dir)?;
    let target = PathBuf::from(format!("v{version}"));

    replace_link(&dir.join("v*"), &target)?;

    let mut parts = version.split('.');
    let major = parts.next().unwrap_or(version);
    replace_link(&dir.join(format!("v{major}")), &target)?;

    if let Some(minor) = parts.next() {
        let major_minor = format!("v{major}.{minor}");
        if major_minor != format!("v{major}") {
            replace_link(&dir.join(major_minor), &target)?;
        }
    }

    Ok(())
}

/// Apply the per-domain alias table and the generic versioned-library rule
/// inside the package's `lib`/`lib64` directories. Returns the links created.
pub fn create_library_links(package_dir: &Path, domain: &str) -> io::Result<Vec<PathBuf>> {
    let mut created = Vec::new();

    for libdir in ["lib", "lib64"] {
        let dir = package_dir.join(libdir);
        if !dir.is_dir() {
            continue;
        }

        if let Some((_, pairs)) = LIB_ALIASES.iter().find(|(d, _)| *d == domain) {
            for (target, link) in *pairs {
                let link_path = dir.join(link);
                if dir.join(target).exists() && !exists_or_dangling(&link_path) {
                    symlink(Path::new(target), &link_path)?;
                    created.push(link_path);
                }
            }
        }

        for entry in fs::read_dir(&dir)?.flatten() {
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            let Some(caps) = VERSIONED_LIB.captures(name) else {
                continue;
            };
            let stem = &caps["name"];
            let ver = &caps["ver"];
            let ext = &caps["ext"];
            let major = ver.split('.').next().unwrap_or(ver);

            for alias in [format!("lib{stem}.{ext}"), format!("lib{stem}.{major}.{ext}")] {
                if alias == name {
                    continue;
                }
                let link_path = dir.join(&alias);
                if !exists_or_dangling(&link_path) {
                    symlink(Path::new(name), &link_path)?;
                    created.push(link_path);
                }
            }
        }
    }

    Ok(created)
}

/// For the small set of domains in the compat table, alias the legacy major
/// path to the newest installed version when the legacy path is absent.
pub fn create_compat_links(install_root: &Path, domain: &str, version: &str) -> io::Result<()> {
    let Some((_, legacy)) = COMPAT_MAJORS.iter().find(|(d, _)| *d == domain) else {
        return Ok(());
    };
    let link = crate::paths::domain_dir(install_root, domain).join(legacy);
    if exists_or_dangling(&link) {
        return Ok(());
    }
    symlink(Path::new(&format!("v{version}")), &link)
}

fn exists_or_dangling(path: &Path) -> bool {
    path.symlink_metadata().is_ok()
}

fn replace_link(link: &Path, target: &Path) -> io::Result<()> {
    if exists_or_dangling(link) {
        fs::remove_file(link)?;
    }
    symlink(target, link)
}

#[cfg(unix)]
fn symlink(target: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(not(unix))]
fn symlink(target: &Path, link: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_file(target, link)
}
