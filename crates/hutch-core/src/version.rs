//! Version constraint resolution.
//!
//! The `semver` crate is the general-purpose comparator and is consulted
//! first; each manual strategy below is the guaranteed fallback for the
//! version strings it cannot parse (suffixed releases like `1.1.1w`, or
//! constraints outside its grammar). When both paths produce a match, the
//! semver result wins.

use std::cmp::Ordering;

use regex::Regex;
use semver::{Version as SemVersion, VersionReq};

/// Resolve a constraint against `available`, which the metadata provider
/// guarantees to be ordered latest-first.
///
/// No constraint, `latest`, and `*` all mean "newest". An exact hit in the
/// list returns itself. Operator constraints (`^`, `~`, `>=`, ranges,
/// wildcards) resolve to the highest satisfying version. A bare version that
/// matches nothing exactly falls back to literal-prefix matching.
pub fn resolve_version(available: &[String], constraint: Option<&str>) -> Option<String> {
    let constraint = match constraint.map(str::trim) {
        None => return available.first().cloned(),
        Some("" | "latest" | "*") => return available.first().cloned(),
        Some(c) => c,
    };

    let has_operator = constraint.starts_with(['^', '~', '=', '>', '<']);
    let is_range = constraint.contains(" - ");
    let has_wildcard = constraint
        .split('.')
        .any(|c| c.eq_ignore_ascii_case("x") || c == "*");

    if !has_operator && !is_range && !has_wildcard {
        if available.iter().any(|v| v == constraint) {
            return Some(constraint.to_string());
        }
        // Literal prefix of a list entry, newest first.
        return available
            .iter()
            .find(|v| v.starts_with(constraint))
            .cloned();
    }

    // `=1.2.3` is exactness spelled with an operator.
    if let Some(exact) = constraint.strip_prefix('=') {
        let exact = exact.trim();
        if available.iter().any(|v| v == exact) {
            return Some(exact.to_string());
        }
        return available.iter().find(|v| v.starts_with(exact)).cloned();
    }

    resolve_with_semver(available, constraint).or_else(|| resolve_manual(available, constraint))
}

/// Compare two versions through the general-purpose comparator. `None` when
/// either side does not parse; callers treat that as "cannot be compared".
pub fn try_compare(a: &str, b: &str) -> Option<Ordering> {
    Some(parse_semver(a)?.cmp(&parse_semver(b)?))
}

/// Numeric, suffix-tolerant comparison: leading digits of each dot component,
/// missing trailing components are zero (`1.1.1w` sorts as `1.1.1`).
pub fn compare_numeric(a: &str, b: &str) -> Ordering {
    cmp_components(&numeric_components(a), &numeric_components(b))
}

fn parse_semver(v: &str) -> Option<SemVersion> {
    if let Ok(parsed) = SemVersion::parse(v) {
        return Some(parsed);
    }
    // Pad short-but-numeric versions: "1.2" -> "1.2.0", "8" -> "8.0.0".
    let padded = match v.split('.').count() {
        1 => format!("{v}.0.0"),
        2 => format!("{v}.0"),
        _ => return None,
    };
    SemVersion::parse(&padded).ok()
}

fn resolve_with_semver(available: &[String], constraint: &str) -> Option<String> {
    let req = normalize_req(constraint)?;
    available
        .iter()
        .find(|v| parse_semver(v).is_some_and(|sv| req.matches(&sv)))
        .cloned()
}

fn normalize_req(constraint: &str) -> Option<VersionReq> {
    if let Some((lo, hi)) = constraint.split_once(" - ") {
        return VersionReq::parse(&format!(">={}, <={}", lo.trim(), hi.trim())).ok();
    }
    VersionReq::parse(constraint).ok()
}

fn resolve_manual(available: &[String], constraint: &str) -> Option<String> {
    if let Some((lo, hi)) = constraint.split_once(" - ") {
        return resolve_bounds(available, lo.trim(), hi.trim());
    }
    if let Some(rest) = constraint.strip_prefix('^') {
        return resolve_caret(available, rest.trim());
    }
    if let Some(rest) = constraint.strip_prefix('~') {
        return resolve_tilde(available, rest.trim());
    }
    for (op, keep) in [
        (">=", [Ordering::Greater, Ordering::Equal]),
        ("<=", [Ordering::Less, Ordering::Equal]),
        (">", [Ordering::Greater, Ordering::Greater]),
        ("<", [Ordering::Less, Ordering::Less]),
    ] {
        if let Some(operand) = constraint.strip_prefix(op) {
            let operand = numeric_components(operand.trim());
            return available
                .iter()
                .find(|v| keep.contains(&cmp_components(&numeric_components(v), &operand)))
                .cloned();
        }
    }
    if constraint
        .split('.')
        .any(|c| c.eq_ignore_ascii_case("x") || c == "*")
    {
        return resolve_wildcard(available, constraint);
    }
    None
}

fn resolve_caret(available: &[String], base: &str) -> Option<String> {
    let want = numeric_components(base);
    let major = *want.first()?;
    available
        .iter()
        .find(|v| {
            let have = numeric_components(v);
            if have.first() != Some(&major) {
                return false;
            }
            // Only a major given: anything sharing it qualifies.
            if want.len() < 2 {
                return true;
            }
            cmp_components(&have[1..], &want[1..]) != Ordering::Less
        })
        .cloned()
}

fn resolve_tilde(available: &[String], base: &str) -> Option<String> {
    let want = numeric_components(base);
    let major = *want.first()?;
    let minor = want.get(1).copied();
    let patch = want.get(2).copied().unwrap_or(0);
    available
        .iter()
        .find(|v| {
            let have = numeric_components(v);
            if have.first() != Some(&major) {
                return false;
            }
            match minor {
                None => true,
                Some(minor) => {
                    have.get(1).copied().unwrap_or(0) == minor
                        && have.get(2).copied().unwrap_or(0) >= patch
                }
            }
        })
        .cloned()
}

fn resolve_bounds(available: &[String], lo: &str, hi: &str) -> Option<String> {
    let lo = numeric_components(lo);
    let hi = numeric_components(hi);
    available
        .iter()
        .find(|v| {
            let have = numeric_components(v);
            cmp_components(&have, &lo) != Ordering::Less
                && cmp_components(&have, &hi) != Ordering::Greater
        })
        .cloned()
}

fn resolve_wildcard(available: &[String], constraint: &str) -> Option<String> {
    let pattern = constraint
        .split('.')
        .map(|c| {
            if c.eq_ignore_ascii_case("x") || c == "*" {
                r"\d+".to_string()
            } else {
                regex::escape(c)
            }
        })
        .collect::<Vec<_>>()
        .join(r"\.");
    let re = Regex::new(&format!(r"^{pattern}(\..*)?$")).ok()?;
    available.iter().find(|v| re.is_match(v)).cloned()
}

fn numeric_components(v: &str) -> Vec<u64> {
    v.split('.')
        .map(|part| {
            let digits: String = part.chars().take_while(char::is_ascii_digit).collect();
            digits.parse::<u64>().unwrap_or(0)
        })
        .collect()
}

fn cmp_components(a: &[u64], b: &[u64]) -> Ordering {
    let len = a.len().max(b.len());
    for i in 0..len {
        let x = a.get(i).copied().unwrap_or(0);
        let y = b.get(i).copied().unwrap_or(0);
        match x.cmp(&y) {
            Ordering::Equal => {}
            ord => return ord,
        }
    }
    Ordering::Equal
}

#[cfg(test)]
mod tests {
    use super::*;

    fn versions(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_no_constraint_returns_newest() {
        let avail = versions(&["8.4.0", "8.1.5", "7.88.0"]);
        assert_eq!(resolve_version(&avail, None).as_deref(), Some("8.4.0"));
        assert_eq!(
            resolve_version(&avail, Some("latest")).as_deref(),
            Some("8.4.0")
        );
        assert_eq!(resolve_version(&avail, Some("*")).as_deref(), Some("8.4.0"));
    }

    #[test]
    fn test_exact_match() {
        let avail = versions(&["8.4.0", "8.1.5", "8.1.0"]);
        assert_eq!(
            resolve_version(&avail, Some("8.1.0")).as_deref(),
            Some("8.1.0")
        );
        assert_eq!(
            resolve_version(&avail, Some("=8.1.5")).as_deref(),
            Some("8.1.5")
        );
    }

    #[test]
    fn test_caret_picks_highest_in_major() {
        let avail = versions(&["8.4.0", "8.1.5", "8.1.0", "7.88.0"]);
        assert_eq!(
            resolve_version(&avail, Some("^8.1.0")).as_deref(),
            Some("8.4.0")
        );
        assert_eq!(resolve_version(&avail, Some("^8")).as_deref(), Some("8.4.0"));
        assert_eq!(
            resolve_version(&avail, Some("^7")).as_deref(),
            Some("7.88.0")
        );
        assert_eq!(resolve_version(&avail, Some("^9")), None);
    }

    #[test]
    fn test_caret_floor_within_major() {
        let avail = versions(&["8.1.5", "8.1.0", "8.0.2"]);
        // 8.0.2 shares the major but sits below the (minor, patch) floor
        assert_eq!(
            resolve_version(&avail, Some("^8.1.0")).as_deref(),
            Some("8.1.5")
        );
    }

    #[test]
    fn test_tilde_pins_major_minor() {
        let avail = versions(&["8.2.0", "8.1.5", "8.1.0"]);
        assert_eq!(
            resolve_version(&avail, Some("~8.1.0")).as_deref(),
            Some("8.1.5")
        );
        assert_eq!(
            resolve_version(&avail, Some("~8.2")).as_deref(),
            Some("8.2.0")
        );
        assert_eq!(resolve_version(&avail, Some("~8.3")), None);
    }

    #[test]
    fn test_hyphen_range() {
        let avail = versions(&["1.22.0", "1.21.3", "1.20.1", "1.19.0"]);
        assert_eq!(
            resolve_version(&avail, Some("1.19 - 1.21")).as_deref(),
            Some("1.21.3")
        );
    }

    #[test]
    fn test_comparison_operators() {
        let avail = versions(&["3.0.0", "2.5.1", "2.0.0", "1.9.0"]);
        assert_eq!(
            resolve_version(&avail, Some(">=2.0")).as_deref(),
            Some("3.0.0")
        );
        assert_eq!(
            resolve_version(&avail, Some("<3")).as_deref(),
            Some("2.5.1")
        );
        assert_eq!(
            resolve_version(&avail, Some("<=2.0.0")).as_deref(),
            Some("2.0.0")
        );
        assert_eq!(resolve_version(&avail, Some(">3.0.0")), None);
    }

    #[test]
    fn test_wildcard_components() {
        let avail = versions(&["2.1.0", "1.2.9", "1.1.4", "1.0.0"]);
        assert_eq!(
            resolve_version(&avail, Some("1.x")).as_deref(),
            Some("1.2.9")
        );
        assert_eq!(
            resolve_version(&avail, Some("1.1.X")).as_deref(),
            Some("1.1.4")
        );
    }

    #[test]
    fn test_prefix_fallback() {
        let avail = versions(&["20.1.5", "20.0.0", "18.19.0"]);
        assert_eq!(
            resolve_version(&avail, Some("18")).as_deref(),
            Some("18.19.0")
        );
        assert_eq!(resolve_version(&avail, Some("19")), None);
    }

    #[test]
    fn test_suffixed_versions_use_manual_path() {
        // The semver path cannot parse these; the manual caret strategy can.
        let avail = versions(&["3.3.0", "1.1.1w", "1.1.1q"]);
        assert_eq!(
            resolve_version(&avail, Some("^1.1")).as_deref(),
            Some("1.1.1w")
        );
        assert_eq!(
            resolve_version(&avail, Some("1.1")).as_deref(),
            Some("1.1.1w")
        );
    }

    #[test]
    fn test_try_compare() {
        assert_eq!(try_compare("1.2.3", "1.2.4"), Some(Ordering::Less));
        assert_eq!(try_compare("2.0", "1.9.9"), Some(Ordering::Greater));
        assert_eq!(try_compare("1.2.3", "1.2.3"), Some(Ordering::Equal));
        // Suffixed versions cannot be compared by the general comparator
        assert_eq!(try_compare("1.1.1w", "1.1.1q"), None);
    }

    #[test]
    fn test_compare_numeric_ignores_suffixes() {
        assert_eq!(compare_numeric("1.1.1w", "1.1.1"), Ordering::Equal);
        assert_eq!(compare_numeric("1.10.0", "1.9.9"), Ordering::Greater);
        assert_eq!(compare_numeric("1.2", "1.2.0"), Ordering::Equal);
    }
}
