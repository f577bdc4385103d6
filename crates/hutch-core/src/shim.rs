//! Executable shim generation.
//!
//! Every executable under a package's `bin/` and `sbin/` gets a thin shell
//! wrapper at `{install_root}/bin|sbin/{name}` that prepends the union of
//! installed library directories to the platform's dynamic-library search
//! path and execs the real binary.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Generate (or regenerate) shims for `package_dir`. Returns the binary
/// names shimmed, for the install manifest.
pub fn create_shims(
    package_dir: &Path,
    install_root: &Path,
    _domain: &str,
    _version: &str,
) -> io::Result<Vec<String>> {
    let lib_dirs = library_dirs(package_dir, install_root);
    let mut names = Vec::new();

    for kind in ["bin", "sbin"] {
        let src_dir = package_dir.join(kind);
        if !src_dir.is_dir() {
            continue;
        }
        let shim_dir = crate::paths::shim_dir(install_root, kind);
        fs::create_dir_all(&shim_dir)?;

        for entry in fs::read_dir(&src_dir)?.flatten() {
            let Ok(meta) = entry.metadata() else {
                continue;
            };
            if !meta.is_file() || !is_executable(&meta) {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };

            let shim_path = shim_dir.join(&name);
            fs::write(&shim_path, render_shim(&entry.path(), &lib_dirs))?;
            make_executable(&shim_path)?;
            names.push(name);
        }
    }

    Ok(names)
}

/// The union of library directories a shim should expose: this package's
/// `lib`/`lib64` first, then every sibling package's under the install root.
fn library_dirs(package_dir: &Path, install_root: &Path) -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    for name in ["lib", "lib64"] {
        let dir = package_dir.join(name);
        if dir.is_dir() {
            dirs.push(dir);
        }
    }

    let mut siblings = Vec::new();
    for entry in walkdir::WalkDir::new(install_root)
        .min_depth(2)
        .max_depth(6)
        .into_iter()
        .flatten()
    {
        if !entry.file_type().is_dir() {
            continue;
        }
        let name = entry.file_name();
        if name != "lib" && name != "lib64" {
            continue;
        }
        // Only payload directories count: {domain...}/vX.Y.Z/lib[64]
        let Some(parent) = entry.path().parent() else {
            continue;
        };
        if !parent
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with('v'))
        {
            continue;
        }
        let path = entry.path().to_path_buf();
        if !path.starts_with(package_dir) {
            siblings.push(path);
        }
    }
    siblings.sort();
    dirs.extend(siblings);
    dirs
}

fn render_shim(target: &Path, lib_dirs: &[PathBuf]) -> String {
    let mut script = String::from("#!/bin/sh\n");
    if !lib_dirs.is_empty() {
        let joined = lib_dirs
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(":");
        for var in search_path_vars() {
            // Prepend: package paths win over inherited and system defaults
            script.push_str(&format!(
                "export {var}=\"{joined}${{{var}:+:${var}}}\"\n"
            ));
        }
    }
    script.push_str(&format!("exec \"{}\" \"$@\"\n", target.display()));
    script
}

fn search_path_vars() -> &'static [&'static str] {
    if cfg!(target_os = "macos") {
        &["DYLD_LIBRARY_PATH", "DYLD_FALLBACK_LIBRARY_PATH"]
    } else {
        &["LD_LIBRARY_PATH"]
    }
}

fn is_executable(meta: &fs::Metadata) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        meta.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        let _ = meta;
        true
    }
}

fn make_executable(path: &Path) -> io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = fs::metadata(path)?.permissions();
        perms.set_mode(0o755);
        fs::set_permissions(path, perms)?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}
