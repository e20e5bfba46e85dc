//! Error taxonomy for extension installation and loading

use crate::archive::ExtractionFailure;
use hearth_core::retry::{RetryError, Retryable};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type alias using the extension error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while installing, probing or loading extensions
#[derive(Error, Debug)]
pub enum Error {
    /// The user aborted the operation; never retried and never reported
    #[error("installation canceled by user")]
    UserCanceled,

    /// An internal step decided to stop without user involvement
    #[error("{0}")]
    ProcessCanceled(String),

    /// A package, manifest, state file or catalog index is malformed
    #[error("invalid extension data: {0}")]
    DataInvalid(String),

    /// A condition that may clear up on its own
    #[error("temporary failure: {0}")]
    Temporary(String),

    /// Filesystem failure at a known path
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Every extraction strategy failed
    #[error(transparent)]
    Extraction(#[from] ExtractionFailure),

    /// The dependency probe could not load the entry script at all
    #[error("dependency probe failed: {0}")]
    Probe(String),

    /// Configuration could not be loaded
    #[error(transparent)]
    Config(#[from] hearth_core::Error),
}

impl Error {
    pub fn data_invalid(message: impl Into<String>) -> Self {
        Self::DataInvalid(message.into())
    }

    /// A JSON document at `path` that does not match its schema
    pub fn invalid_json(path: &Path, source: serde_json::Error) -> Self {
        Self::DataInvalid(format!("{} is not valid: {}", path.display(), source))
    }

    pub fn process_canceled(message: impl Into<String>) -> Self {
        Self::ProcessCanceled(message.into())
    }

    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Cancellations are expected outcomes and are not shown as failures
    pub fn is_silent(&self) -> bool {
        matches!(self, Error::UserCanceled | Error::ProcessCanceled(_))
    }

    /// Underlying io error kind, if this is a filesystem failure
    pub fn io_kind(&self) -> Option<io::ErrorKind> {
        match self {
            Error::Io { source, .. } => Some(source.kind()),
            _ => None,
        }
    }
}

impl Retryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            Error::Temporary(_) => true,
            Error::Io { source, .. } => source.is_retryable(),
            _ => false,
        }
    }
}

impl From<RetryError<Error>> for Error {
    /// Unwrap to the last underlying error; the attempt count has already
    /// been logged by the retry observer
    fn from(err: RetryError<Error>) -> Self {
        let attempts = err.attempts();
        err.into_source().unwrap_or_else(|| {
            Error::process_canceled(format!("retry stopped after {} attempts", attempts))
        })
    }
}

/// Attach a path to io results
pub trait IoResultExt<T> {
    fn at(self, path: impl AsRef<Path>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::result::Result<T, io::Error> {
    fn at(self, path: impl AsRef<Path>) -> Result<T> {
        self.map_err(|source| Error::io(path.as_ref(), source))
    }
}
