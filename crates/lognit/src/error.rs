//! Error types for requests against a Lognit backend.

use std::fmt;

/// Classified outcome of a failed request.
///
/// Callers usually only need to tell "the session is gone, log in again"
/// ([`ServerError::is_unauthorized`]) from "this operation failed"
/// ([`ServerError::is_operation_failure`]).
#[derive(Debug, Clone, PartialEq)]
pub enum ServerError {
    /// 401 or any 3xx: session or credentials are no longer valid.
    Unauthorized {
        status_line: String,
    },
    /// Any other non-success status.
    RequestFailed {
        status_line: String,
    },
    /// The request could not be executed at all (no status available).
    Transport {
        context: String,
        reason: String,
    },
    /// Push handshake or subscription could not be established.
    Push {
        context: String,
        reason: String,
    },
    /// The body was present but did not decode into the requested type.
    Decode {
        context: String,
        reason: String,
    },
    /// Client configuration could not be read or parsed.
    Config {
        context: String,
        reason: String,
    },
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerError::Unauthorized { status_line } => write!(f, "{status_line}"),
            ServerError::RequestFailed { status_line } => write!(f, "{status_line}"),
            ServerError::Transport { context, reason } => {
                write!(f, "Transport error in {context}: {reason}")
            }
            ServerError::Push { context, reason } => {
                write!(f, "Push channel error in {context}: {reason}")
            }
            ServerError::Decode { context, reason } => {
                write!(f, "Failed to decode {context}: {reason}")
            }
            ServerError::Config { context, reason } => {
                write!(f, "Invalid configuration in {context}: {reason}")
            }
        }
    }
}

impl std::error::Error for ServerError {}

impl ServerError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ServerError::Unauthorized { .. })
    }

    pub fn is_operation_failure(&self) -> bool {
        !self.is_unauthorized()
    }

    pub fn from_transport_error(e: impl fmt::Display, context: &str) -> Self {
        ServerError::Transport {
            context: context.to_string(),
            reason: e.to_string(),
        }
    }

    pub fn from_push_error(e: impl fmt::Display, context: &str) -> Self {
        ServerError::Push {
            context: context.to_string(),
            reason: e.to_string(),
        }
    }

    pub fn from_decode_error(e: impl fmt::Display, context: &str) -> Self {
        ServerError::Decode {
            context: context.to_string(),
            reason: e.to_string(),
        }
    }

    pub fn from_config_error(e: impl fmt::Display, context: &str) -> Self {
        ServerError::Config {
            context: context.to_string(),
            reason: e.to_string(),
        }
    }
}
