//! Domain-specific errors for the installation engine

use std::io;

use thiserror::Error;

use crate::command::CommandError;
use crate::download::DownloadError;
use crate::extract::ExtractError;

#[derive(Error, Debug)]
pub enum InstallError {
    #[error("platform '{0}' is not supported")]
    UnsupportedPlatform(String),

    #[error("invalid package spec '{0}'")]
    Spec(String),

    #[error("no metadata found for '{0}'")]
    MetadataNotFound(String),

    #[error("no version of '{domain}' satisfies '{constraint}'")]
    VersionUnresolvable { domain: String, constraint: String },

    #[error("download failed: {0}")]
    Download(#[from] DownloadError),

    #[error("extraction failed: {0}")]
    Extraction(#[from] ExtractError),

    #[error("subprocess failed: {0}")]
    Command(#[from] CommandError),

    #[error("permission denied: {0}")]
    PermissionDenied(io::Error),

    #[error("installation of '{domain}' is incomplete")]
    Incomplete { domain: String },

    #[error("source build of '{domain}' failed: {reason}")]
    SourceBuild { domain: String, reason: String },

    #[error("IO error: {0}")]
    Io(io::Error),

    #[error("{0}")]
    Other(String),
}

impl From<io::Error> for InstallError {
    fn from(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::PermissionDenied {
            Self::PermissionDenied(err)
        } else {
            Self::Io(err)
        }
    }
}

impl InstallError {
    /// Remediation hint shown alongside the error, where one exists.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::PermissionDenied(_) => Some(
                "pick an install root you own (--install-root) or rerun with elevated privileges",
            ),
            _ => None,
        }
    }
}
