//! Centralized error types for clickguard.

use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the clickguard library.
#[derive(Error, Debug)]
pub enum GuardError {
    /// I/O error with the associated file path.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The specified file does not exist.
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// An invalid path or storage key was provided.
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// The raw bytes could not be turned into a MIME tree.
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    /// The declared charset has no known decoder.
    #[error("Unsupported charset: {0}")]
    UnknownCharset(String),

    /// Body bytes are not valid for the declared transfer-encoding or charset.
    #[error("Cannot decode {what}: {reason}")]
    Decode { what: String, reason: String },

    /// Rewritten text cannot be represented in the part's charset.
    #[error("Content not representable in charset {0}")]
    Unrepresentable(String),

    /// The HTML rewriter failed on a body.
    #[error("HTML rewriting error: {0}")]
    Html(String),

    /// A skip pattern from the table or config did not compile.
    #[error("Invalid skip pattern for provider '{provider}': {source}")]
    InvalidPattern {
        provider: String,
        source: regex::Error,
    },

    /// No content store location was configured.
    #[error("Content store root not configured (set [store] root or pass --store)")]
    StoreNotConfigured,

    /// The mail-flow system refused the updated content.
    #[error("Message {0} rejected by mail flow")]
    MessageRejected(String),

    /// The message can no longer be updated (e.g. redirected mail).
    #[error("Message {0} is frozen and cannot be updated")]
    MessageFrozen(String),

    /// The mail-flow system has no message with this identifier.
    #[error("Message {0} does not exist")]
    MessageNotFound(String),

    /// The mail-flow system could not read the stored content.
    #[error("Content location '{0}' is not accessible")]
    InvalidContentLocation(String),
}

/// Convenience alias for `Result<T, GuardError>`.
pub type Result<T> = std::result::Result<T, GuardError>;

impl GuardError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Shorthand for a [`GuardError::Decode`] error.
    pub fn decode(what: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Decode {
            what: what.into(),
            reason: reason.to_string(),
        }
    }
}

/// Allow `?` on `std::io::Error` when no path context is available
/// (rare, prefer `GuardError::io`).
impl From<std::io::Error> for GuardError {
    fn from(source: std::io::Error) -> Self {
        Self::Io {
            path: PathBuf::from("<unknown>"),
            source,
        }
    }
}
