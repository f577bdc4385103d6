//! Package spec parsing
//!
//! Supports:
//! - Bare: `zlib.net`
//! - Separator: `node@20.1.0`, `node@^20`, `node@latest`
//! - Inline constraint: `openssl.org^1.1`, `go.dev>=1.21`

use std::fmt;

use crate::error::InstallError;

/// Target platform for dependency filtering and archive selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    Linux,
    Darwin,
    Windows,
}

impl Platform {
    /// The platform this process is running on.
    pub fn current() -> Result<Self, InstallError> {
        if cfg!(target_os = "linux") {
            Ok(Self::Linux)
        } else if cfg!(target_os = "macos") {
            Ok(Self::Darwin)
        } else if cfg!(target_os = "windows") {
            Ok(Self::Windows)
        } else {
            Err(InstallError::UnsupportedPlatform(
                std::env::consts::OS.to_string(),
            ))
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Linux => "linux",
            Self::Darwin => "darwin",
            Self::Windows => "windows",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parsed package specifier with optional version constraint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageSpec {
    pub name: String,
    pub constraint: Option<String>,
}

impl PackageSpec {
    /// Parse a package specifier.
    ///
    /// The first recognized operator scanning left to right wins. `@` is a
    /// separator (the constraint is whatever follows it); the comparison
    /// operators stay part of the constraint.
    pub fn parse(raw: &str) -> Result<Self, InstallError> {
        let raw = raw.trim();
        for (i, ch) in raw.char_indices() {
            match ch {
                '@' => {
                    let name = &raw[..i];
                    let rest = &raw[i + 1..];
                    if name.is_empty() {
                        return Err(InstallError::Spec(raw.to_string()));
                    }
                    if rest.is_empty() {
                        return Err(InstallError::Spec(raw.to_string()));
                    }
                    // "latest" means the same as no constraint
                    let constraint = if rest == "latest" {
                        None
                    } else {
                        Some(rest.to_string())
                    };
                    return Ok(Self {
                        name: name.to_string(),
                        constraint,
                    });
                }
                '^' | '~' | '=' | '>' | '<' => {
                    let name = &raw[..i];
                    if name.is_empty() || raw[i..].len() <= operator_len(ch, &raw[i..]) {
                        return Err(InstallError::Spec(raw.to_string()));
                    }
                    return Ok(Self {
                        name: name.to_string(),
                        constraint: Some(raw[i..].to_string()),
                    });
                }
                _ => {}
            }
        }
        if raw.is_empty() {
            return Err(InstallError::Spec(raw.to_string()));
        }
        Ok(Self {
            name: raw.to_string(),
            constraint: None,
        })
    }

    /// Check if this specifier requests a specific version or range.
    pub fn is_constrained(&self) -> bool {
        self.constraint.is_some()
    }
}

fn operator_len(first: char, rest: &str) -> usize {
    match first {
        '>' | '<' if rest.len() > 1 && rest.as_bytes()[1] == b'=' => 2,
        _ => 1,
    }
}

impl fmt::Display for PackageSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.constraint {
            Some(c) if c.starts_with(['^', '~', '=', '>', '<']) => {
                write!(f, "{}{}", self.name, c)
            }
            Some(c) => write!(f, "{}@{}", self.name, c),
            None => f.write_str(&self.name),
        }
    }
}

/// A declared dependency: name, optional constraint, optional platform gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencySpec {
    pub name: String,
    pub constraint: Option<String>,
    pub platform: Option<Platform>,
}

impl DependencySpec {
    /// Parse a dependency string such as `zlib.net^1.2` or `linux:gnu.org/gcc`.
    pub fn parse(raw: &str) -> Result<Self, InstallError> {
        let (platform, rest) = match raw.split_once(':') {
            Some(("linux", r)) => (Some(Platform::Linux), r),
            Some(("darwin", r)) => (Some(Platform::Darwin), r),
            Some(("windows", r)) => (Some(Platform::Windows), r),
            _ => (None, raw),
        };
        let spec = PackageSpec::parse(rest)?;
        Ok(Self {
            name: spec.name,
            constraint: spec.constraint,
            platform,
        })
    }

    /// Whether this dependency applies on `platform`.
    pub fn matches_platform(&self, platform: Platform) -> bool {
        self.platform.is_none_or(|p| p == platform)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple() {
        let spec = PackageSpec::parse("zlib.net").unwrap();
        assert_eq!(spec.name, "zlib.net");
        assert_eq!(spec.constraint, None);
    }

    #[test]
    fn test_parse_at_version() {
        let spec = PackageSpec::parse("node@20.1.0").unwrap();
        assert_eq!(spec.name, "node");
        assert_eq!(spec.constraint.as_deref(), Some("20.1.0"));
    }

    #[test]
    fn test_parse_inline_caret() {
        let spec = PackageSpec::parse("openssl.org^1.1").unwrap();
        assert_eq!(spec.name, "openssl.org");
        assert_eq!(spec.constraint.as_deref(), Some("^1.1"));
    }

    #[test]
    fn test_parse_at_caret() {
        let spec = PackageSpec::parse("node@^20.1").unwrap();
        assert_eq!(spec.name, "node");
        assert_eq!(spec.constraint.as_deref(), Some("^20.1"));
    }

    #[test]
    fn test_parse_two_char_operator() {
        let spec = PackageSpec::parse("go.dev>=1.21").unwrap();
        assert_eq!(spec.name, "go.dev");
        assert_eq!(spec.constraint.as_deref(), Some(">=1.21"));

        let spec = PackageSpec::parse("go.dev<2").unwrap();
        assert_eq!(spec.constraint.as_deref(), Some("<2"));
    }

    #[test]
    fn test_first_operator_wins() {
        // `@` comes first, so the caret stays inside the constraint
        let spec = PackageSpec::parse("node@^1.2").unwrap();
        assert_eq!(spec.name, "node");
        assert_eq!(spec.constraint.as_deref(), Some("^1.2"));
    }

    #[test]
    fn test_parse_latest() {
        let spec = PackageSpec::parse("jq@latest").unwrap();
        assert_eq!(spec.constraint, None);
    }

    #[test]
    fn test_parse_invalid() {
        assert!(PackageSpec::parse("@1.0").is_err());
        assert!(PackageSpec::parse("jq@").is_err());
        assert!(PackageSpec::parse("").is_err());
        assert!(PackageSpec::parse("jq>=").is_err());
    }

    #[test]
    fn test_display_round_trip() {
        for raw in ["zlib.net", "node@20.1.0", "openssl.org^1.1", "go.dev>=1.21"] {
            let spec = PackageSpec::parse(raw).unwrap();
            assert_eq!(spec.to_string(), raw);
        }
    }

    #[test]
    fn test_dependency_platform_prefix() {
        let dep = DependencySpec::parse("linux:gnu.org/gcc/libstdcxx@^12").unwrap();
        assert_eq!(dep.name, "gnu.org/gcc/libstdcxx");
        assert_eq!(dep.constraint.as_deref(), Some("^12"));
        assert_eq!(dep.platform, Some(Platform::Linux));
        assert!(dep.matches_platform(Platform::Linux));
        assert!(!dep.matches_platform(Platform::Darwin));
    }

    #[test]
    fn test_dependency_without_prefix_matches_everywhere() {
        let dep = DependencySpec::parse("zlib.net^1.2").unwrap();
        assert_eq!(dep.platform, None);
        assert!(dep.matches_platform(Platform::Linux));
        assert!(dep.matches_platform(Platform::Darwin));
    }
}
