//! Installation completeness rules per package archetype.
//!
//! What "complete" means depends on the package's shape: tools want
//! binaries, libraries want `lib/`, certificate bundles want certificate
//! files, header-only packages want `include/` or pkg-config/aclocal data.
//! The per-domain overrides live in one rule table.

use std::path::Path;

/// Package shapes recognized by the validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Archetype {
    /// bin/ or sbin/, or failing that a pure-library layout.
    Default,
    /// Pure command-line tool: only bin/ counts.
    Tool,
    /// Strict library: lib/ (or lib64/) required even when binaries exist.
    Library,
    /// Certificate bundle: certificate-like files anywhere near the top.
    CertBundle,
    /// Headers/macros only: include/, share/pkgconfig, or share/aclocal.
    HeaderOnly,
}

/// Domain-pattern to archetype rules; first match wins. A pattern matches
/// the domain exactly or as a path prefix.
const ARCHETYPES: &[(&str, Archetype)] = &[
    ("curl.se/ca-certs", Archetype::CertBundle),
    ("gnu.org/autoconf-archive", Archetype::HeaderOnly),
    ("openssl.org", Archetype::Library),
    ("zlib.net", Archetype::Library),
    ("sqlite.org", Archetype::Library),
    ("gnu.org/coreutils", Archetype::Tool),
    ("cli.github.com", Archetype::Tool),
];

const CERT_SCAN_DEPTH: usize = 4;

pub fn archetype_for(domain: &str) -> Archetype {
    ARCHETYPES
        .iter()
        .find(|(pattern, _)| domain == *pattern || domain.starts_with(&format!("{pattern}/")))
        .map_or(Archetype::Default, |(_, archetype)| *archetype)
}

/// Judge whether the installed payload at `package_dir` is complete for its
/// domain's archetype.
pub fn is_complete(package_dir: &Path, domain: &str) -> bool {
    let has = |rel: &str| package_dir.join(rel).is_dir();

    match archetype_for(domain) {
        Archetype::Tool => has("bin"),
        Archetype::Library => has("lib") || has("lib64"),
        Archetype::HeaderOnly => has("include") || has("share/pkgconfig") || has("share/aclocal"),
        Archetype::CertBundle => contains_cert_files(package_dir),
        Archetype::Default => has("bin") || has("sbin") || has("lib") || has("lib64"),
    }
}

fn contains_cert_files(dir: &Path) -> bool {
    walkdir::WalkDir::new(dir)
        .max_depth(CERT_SCAN_DEPTH)
        .into_iter()
        .flatten()
        .any(|entry| {
            if !entry.file_type().is_file() {
                return false;
            }
            let name = entry.file_name().to_string_lossy().to_ascii_lowercase();
            name.ends_with(".pem") || name.ends_with(".crt") || name.ends_with(".cert")
        })
}
