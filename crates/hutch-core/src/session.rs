//! Install-session bookkeeping, threaded explicitly through the engine.
//!
//! The tracked set lives for one top-level session and serves three duties:
//! cycle prevention during recursive dependency installation, "already
//! satisfied, skip" decisions, and upgrade-in-place arbitration when a newer
//! version of a tracked domain is requested mid-session.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::version;

/// Outcome of asking the session what to do with `domain@version`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackDecision {
    /// Not seen this session: install it.
    Install,
    /// The exact pair is already tracked.
    AlreadySatisfied,
    /// A strictly older version is tracked: replace it.
    Upgrade { from: String },
    /// A newer (or incomparable) version is tracked: keep it.
    SkipOlder { kept: String },
}

#[derive(Debug, Default)]
pub struct InstallSession {
    tracked: HashMap<String, String>,
}

impl InstallSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// The version currently tracked for `domain`, if any.
    pub fn tracked_version(&self, domain: &str) -> Option<&str> {
        self.tracked.get(domain).map(String::as_str)
    }

    pub fn is_tracked(&self, domain: &str, version: &str) -> bool {
        self.tracked_version(domain) == Some(version)
    }

    /// Decide how a request for `domain@version` relates to the tracked set.
    /// Incomparable versions conservatively keep the existing entry.
    pub fn arbitrate(&self, domain: &str, version: &str) -> TrackDecision {
        match self.tracked.get(domain) {
            None => TrackDecision::Install,
            Some(current) if current == version => TrackDecision::AlreadySatisfied,
            Some(current) => match version::try_compare(version, current) {
                Some(Ordering::Greater) => TrackDecision::Upgrade {
                    from: current.clone(),
                },
                _ => TrackDecision::SkipOlder {
                    kept: current.clone(),
                },
            },
        }
    }

    /// Track `domain@version`, replacing any previously tracked version of
    /// the same domain. At most one version per domain is ever tracked.
    pub fn track(&mut self, domain: &str, version: &str) {
        self.tracked.insert(domain.to_string(), version.to_string());
    }

    pub fn len(&self) -> usize {
        self.tracked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracked.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_domain_installs() {
        let session = InstallSession::new();
        assert_eq!(session.arbitrate("zlib.net", "1.3.1"), TrackDecision::Install);
    }

    #[test]
    fn same_pair_is_satisfied() {
        let mut session = InstallSession::new();
        session.track("zlib.net", "1.3.1");
        assert_eq!(
            session.arbitrate("zlib.net", "1.3.1"),
            TrackDecision::AlreadySatisfied
        );
    }

    #[test]
    fn newer_version_upgrades() {
        let mut session = InstallSession::new();
        session.track("zlib.net", "1.3.0");
        assert_eq!(
            session.arbitrate("zlib.net", "1.3.1"),
            TrackDecision::Upgrade {
                from: "1.3.0".into()
            }
        );
        // Replacing drops the older entry: one version per domain.
        session.track("zlib.net", "1.3.1");
        assert_eq!(session.len(), 1);
        assert!(session.is_tracked("zlib.net", "1.3.1"));
    }

    #[test]
    fn older_version_is_skipped() {
        let mut session = InstallSession::new();
        session.track("zlib.net", "1.3.1");
        assert_eq!(
            session.arbitrate("zlib.net", "1.2.13"),
            TrackDecision::SkipOlder {
                kept: "1.3.1".into()
            }
        );
    }

    #[test]
    fn incomparable_versions_keep_existing() {
        let mut session = InstallSession::new();
        session.track("openssl.org", "1.1.1w");
        assert_eq!(
            session.arbitrate("openssl.org", "1.1.1q"),
            TrackDecision::SkipOlder {
                kept: "1.1.1w".into()
            }
        );
    }
}
