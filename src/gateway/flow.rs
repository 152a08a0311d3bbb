//! Access to messages held by the mail-flow system.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{GuardError, Result};
use crate::model::tree::MimeTree;
use crate::store::{message_key, ContentStore};

/// Fetches in-flight messages and submits replacement content.
///
/// Implementations map their failures onto [`GuardError::MessageRejected`],
/// [`GuardError::MessageFrozen`], [`GuardError::MessageNotFound`] and
/// [`GuardError::InvalidContentLocation`].
pub trait MessageFlow {
    /// Raw RFC 5322 bytes of the message.
    fn get_raw_message(&self, message_id: &str) -> Result<Vec<u8>>;

    /// Replace the message's content with the object stored under `key`.
    fn put_raw_message(&self, message_id: &str, key: &str) -> Result<()>;
}

/// A spool directory standing in for the mail-flow system.
///
/// ```text
/// <root>/incoming/<id>.eml     message as received
/// <root>/incoming/<id>.frozen  marker: the message may not be updated
/// <root>/outgoing/<id>.eml     replacement content, once accepted
/// ```
#[derive(Debug, Clone)]
pub struct SpoolFlow<S> {
    root: PathBuf,
    store: S,
}

impl<S: ContentStore> SpoolFlow<S> {
    /// Open a spool; replacement content is read back from `store`.
    pub fn new(root: impl AsRef<Path>, store: S) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            store,
        }
    }

    /// Ids must be a single safe file name component.
    fn incoming(&self, message_id: &str, extension: &str) -> Result<PathBuf> {
        message_key(message_id)?;
        Ok(self
            .root
            .join("incoming")
            .join(format!("{message_id}.{extension}")))
    }

    /// Path an accepted replacement is written to.
    pub fn outgoing_path(&self, message_id: &str) -> Result<PathBuf> {
        message_key(message_id)?;
        Ok(self.root.join("outgoing").join(format!("{message_id}.eml")))
    }
}

impl<S: ContentStore> MessageFlow for SpoolFlow<S> {
    fn get_raw_message(&self, message_id: &str) -> Result<Vec<u8>> {
        let path = self.incoming(message_id, "eml")?;
        if !path.is_file() {
            return Err(GuardError::MessageNotFound(message_id.to_string()));
        }
        std::fs::read(&path).map_err(|e| GuardError::io(&path, e))
    }

    fn put_raw_message(&self, message_id: &str, key: &str) -> Result<()> {
        if !self.incoming(message_id, "eml")?.is_file() {
            return Err(GuardError::MessageNotFound(message_id.to_string()));
        }
        if self.incoming(message_id, "frozen")?.exists() {
            return Err(GuardError::MessageFrozen(message_id.to_string()));
        }

        let content = self
            .store
            .get(key)
            .map_err(|_| GuardError::InvalidContentLocation(key.to_string()))?;
        if let Err(e) = MimeTree::parse(&content) {
            return Err(GuardError::MessageRejected(format!("{message_id}: {e}")));
        }

        let out = self.outgoing_path(message_id)?;
        if let Some(parent) = out.parent() {
            std::fs::create_dir_all(parent).map_err(|e| GuardError::io(parent, e))?;
        }
        std::fs::write(&out, &content).map_err(|e| GuardError::io(&out, e))?;
        debug!(message_id, key, path = %out.display(), "Replacement accepted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::FsContentStore;

    const MESSAGE: &[u8] = b"Subject: hi\r\n\r\nbody\r\n";

    fn spool() -> (tempfile::TempDir, SpoolFlow<FsContentStore>, FsContentStore) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("spool/incoming")).unwrap();
        std::fs::write(dir.path().join("spool/incoming/m1.eml"), MESSAGE).unwrap();
        let store = FsContentStore::open(dir.path().join("store")).unwrap();
        let flow = SpoolFlow::new(dir.path().join("spool"), store.clone());
        (dir, flow, store)
    }

    #[test]
    fn test_get_and_put() {
        let (_dir, flow, store) = spool();
        assert_eq!(flow.get_raw_message("m1").unwrap(), MESSAGE);
        assert!(matches!(
            flow.get_raw_message("nope"),
            Err(GuardError::MessageNotFound(_))
        ));

        store.put("mail/m1", b"Subject: new\r\n\r\nx\r\n").unwrap();
        flow.put_raw_message("m1", "mail/m1").unwrap();
        assert_eq!(
            std::fs::read(flow.outgoing_path("m1").unwrap()).unwrap(),
            b"Subject: new\r\n\r\nx\r\n"
        );
    }

    #[test]
    fn test_put_errors() {
        let (dir, flow, _store) = spool();
        assert!(matches!(
            flow.put_raw_message("m1", "mail/missing"),
            Err(GuardError::InvalidContentLocation(_))
        ));

        std::fs::write(dir.path().join("spool/incoming/m1.frozen"), b"").unwrap();
        assert!(matches!(
            flow.put_raw_message("m1", "mail/m1"),
            Err(GuardError::MessageFrozen(_))
        ));
    }

    #[test]
    fn test_ids_cannot_leave_the_spool() {
        let (dir, flow, store) = spool();
        std::fs::write(dir.path().join("x.eml"), MESSAGE).unwrap();
        store.put("mail/m1", MESSAGE).unwrap();

        for id in ["../../x", "../x", "a/b", ".."] {
            assert!(
                matches!(flow.get_raw_message(id), Err(GuardError::InvalidPath(_))),
                "read {id:?}"
            );
            assert!(
                matches!(flow.put_raw_message(id, "mail/m1"), Err(GuardError::InvalidPath(_))),
                "wrote {id:?}"
            );
        }
        assert!(!dir.path().join("outgoing").exists());
    }
}
