//! Storage for rewritten message content.
//!
//! The gateway writes each rewritten message under `mail/<message id>` and
//! hands the key to the mail-flow system. Content the flow rejects is kept
//! under `mail/<message id>.error` for inspection instead of being deleted.

pub mod fs;

use crate::error::{GuardError, Result};

pub use fs::FsContentStore;

/// Prefix shared by every stored message.
pub const KEY_PREFIX: &str = "mail/";

/// Suffix appended to the key of rejected content.
pub const ERROR_SUFFIX: &str = ".error";

/// Object storage for message bytes.
pub trait ContentStore {
    /// Store `bytes` under `key`, replacing any previous object.
    fn put(&self, key: &str, bytes: &[u8]) -> Result<()>;

    /// Read the object stored under `key`.
    fn get(&self, key: &str) -> Result<Vec<u8>>;

    /// Move the object under `key` to [`error_key`]`(key)`.
    fn preserve_error(&self, key: &str) -> Result<()>;
}

/// Storage key for a message id.
///
/// Ids become a single path component, so separators, `.`/`..` and control
/// characters are refused.
pub fn message_key(message_id: &str) -> Result<String> {
    let valid = !message_id.is_empty()
        && message_id != "."
        && message_id != ".."
        && !message_id
            .chars()
            .any(|c| c == '/' || c == '\\' || c.is_control());
    if !valid {
        return Err(GuardError::InvalidPath(format!(
            "message id {message_id:?} cannot be used as a storage key"
        )));
    }
    Ok(format!("{KEY_PREFIX}{message_id}"))
}

/// Key under which rejected content is preserved.
pub fn error_key(key: &str) -> String {
    format!("{key}{ERROR_SUFFIX}")
}
