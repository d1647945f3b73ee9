//! Error taxonomy for guard evaluation.

use thiserror::Error;

use crate::core::types::{AttrKind, ErrorKind};

/// Errors raised while reading or writing a resource attribute.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AttributeError {
    #[error("{resource_type} does not support attribute `{attribute}`")]
    Unsupported {
        resource_type: String,
        attribute: String,
    },

    #[error("{resource_type}.{attribute} expects one of {expected:?}, got {found:?}")]
    WrongKind {
        resource_type: String,
        attribute: String,
        expected: Vec<AttrKind>,
        found: AttrKind,
    },

    #[error("{resource_type} has no capability `{capability}` taking {arity} argument(s)")]
    UnknownCapability {
        resource_type: String,
        capability: String,
        arity: usize,
    },
}

/// Failure raised by a resource action, tagged with a classifiable kind.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct ActionError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ActionError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Errors that escape a guard evaluation.
///
/// Only action failures whose kind is in the caller's handled set are
/// absorbed; every variant here is fatal to the caller.
#[derive(Debug, Error)]
pub enum GuardError {
    #[error("node for anonymous resource must not be nil")]
    InvalidNode,

    #[error("specified resource {resource_type} unknown for platform {platform}")]
    UnknownResourceType {
        resource_type: String,
        platform: String,
    },

    #[error("malformed guard: {0}")]
    MalformedGuard(String),

    #[error("guard statement {index} failed: {source}")]
    Statement {
        index: usize,
        #[source]
        source: AttributeError,
    },

    #[error(transparent)]
    Attribute(#[from] AttributeError),

    #[error("guard action failed: {0}")]
    UnhandledActionFailure(#[source] ActionError),

    #[error("guard command `{command}` could not run: {message}")]
    CommandFailed { command: String, message: String },
}
