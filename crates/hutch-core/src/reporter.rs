//! Reporter trait for dependency injection
//!
//! This trait allows the engine to report progress and status without
//! being coupled to a specific front-end implementation.

pub trait Reporter: Send + Sync {
    /// Updates the progress of a download.
    fn downloading(&self, domain: &str, version: &str, current: u64, total: Option<u64>);

    /// Updates the state of a package to 'installing'.
    fn installing(&self, domain: &str, version: &str);

    /// Indicates a source build has started for a package.
    fn building(&self, domain: &str, version: &str);

    /// Marks a package operation as successfully completed.
    fn done(&self, domain: &str, version: &str, detail: &str);

    /// Marks a package operation as failed with a specific reason.
    fn failed(&self, domain: &str, version: &str, reason: &str);

    /// Log an informational message.
    fn info(&self, msg: &str);

    /// Log a warning message.
    fn warning(&self, msg: &str);

    /// Display a final summary of the batch.
    fn summary(&self, installed: usize, requested: usize);
}

/// Discards all progress. Used by tests and embedding callers.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn downloading(&self, _: &str, _: &str, _: u64, _: Option<u64>) {}
    fn installing(&self, _: &str, _: &str) {}
    fn building(&self, _: &str, _: &str) {}
    fn done(&self, _: &str, _: &str, _: &str) {}
    fn failed(&self, _: &str, _: &str, _: &str) {}
    fn info(&self, _: &str) {}
    fn warning(&self, _: &str) {}
    fn summary(&self, _: usize, _: usize) {}
}

/// Routes progress through `tracing` events.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl Reporter for LogReporter {
    fn downloading(&self, domain: &str, version: &str, current: u64, total: Option<u64>) {
        tracing::debug!(%domain, %version, current, ?total, "downloading");
    }

    fn installing(&self, domain: &str, version: &str) {
        tracing::info!(%domain, %version, "installing");
    }

    fn building(&self, domain: &str, version: &str) {
        tracing::info!(%domain, %version, "building from source");
    }

    fn done(&self, domain: &str, version: &str, detail: &str) {
        tracing::info!(%domain, %version, detail, "done");
    }

    fn failed(&self, domain: &str, version: &str, reason: &str) {
        tracing::error!(%domain, %version, reason, "failed");
    }

    fn info(&self, msg: &str) {
        tracing::info!("{msg}");
    }

    fn warning(&self, msg: &str) {
        tracing::warn!("{msg}");
    }

    fn summary(&self, installed: usize, requested: usize) {
        tracing::info!(installed, requested, "install batch finished");
    }
}
