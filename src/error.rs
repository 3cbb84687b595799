//! Error types for the supervisor
//!
//! Low-level components return these typed errors; the controller tags them
//! with the step that produced them so an operator can resume from there.

use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SupervisorError {
    /// Binary missing or not executable. Fatal until the user fixes the
    /// environment.
    #[error("configuration error: {0}")]
    Config(String),

    /// Wrong wallet password, detected from CLI/log output.
    #[error("invalid password")]
    InvalidCredential,

    /// A required resource (port, local node) is unavailable.
    #[error("{0}")]
    ResourceBusy(String),

    /// A bounded wait elapsed without the condition becoming true.
    #[error("timed out waiting for {0}")]
    Timeout(&'static str),

    /// A managed process exited before its health check passed.
    #[error("{0}")]
    ProcessCrashed(String),

    #[error("wallet '{0}' not found")]
    WalletNotFound(String),

    #[error("wallet '{0}' already exists")]
    WalletExists(String),

    /// A wallet CLI invocation ran but did not produce the expected result.
    #[error("{0}")]
    WalletOperation(String),

    /// The owner key could not be extracted from the CLI output.
    #[error("could not extract owner key: {0}")]
    Extraction(String),

    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// An error tagged with the transition step that produced it.
    #[error("{step} failed: {source}")]
    Step {
        step: &'static str,
        #[source]
        source: Box<SupervisorError>,
    },
}

impl SupervisorError {
    /// Tag this error with the step it occurred in. The innermost tag wins;
    /// an already-tagged error passes through unchanged.
    pub fn during(self, step: &'static str) -> Self {
        match self {
            SupervisorError::Step { .. } => self,
            other => SupervisorError::Step {
                step,
                source: Box::new(other),
            },
        }
    }

    /// The step this error was tagged with, if any.
    pub fn step(&self) -> Option<&'static str> {
        match self {
            SupervisorError::Step { step, .. } => Some(step),
            _ => None,
        }
    }

    /// The underlying error, unwrapping a step tag.
    pub fn root(&self) -> &SupervisorError {
        match self {
            SupervisorError::Step { source, .. } => source.root(),
            other => other,
        }
    }
}

pub type SupervisorResult<T> = Result<T, SupervisorError>;
