//! Directory-backed [`ContentStore`].

use std::path::{Component, Path, PathBuf};

use tracing::{debug, warn};

use super::{error_key, ContentStore};
use crate::error::{GuardError, Result};

/// Stores each key as a file below a root directory.
#[derive(Debug, Clone)]
pub struct FsContentStore {
    root: PathBuf,
}

impl FsContentStore {
    /// Use `root` as the store directory, creating it if needed.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root).map_err(|e| GuardError::io(&root, e))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a key to a file below the root.
    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        let plain = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if key.is_empty() || !plain {
            return Err(GuardError::InvalidPath(key.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

/// `<file>.tmp` next to `path`, unique per target file name.
fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

impl ContentStore for FsContentStore {
    fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| GuardError::io(parent, e))?;
        }
        // Write next to the target, then rename so readers never see a
        // partial object.
        let tmp = temp_path(&path);
        std::fs::write(&tmp, bytes).map_err(|e| GuardError::io(&tmp, e))?;
        std::fs::rename(&tmp, &path).map_err(|e| GuardError::io(&path, e))?;
        debug!(key, bytes = bytes.len(), "Stored object");
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.path_for(key)?;
        if !path.exists() {
            return Err(GuardError::FileNotFound(path));
        }
        std::fs::read(&path).map_err(|e| GuardError::io(&path, e))
    }

    fn preserve_error(&self, key: &str) -> Result<()> {
        let from = self.path_for(key)?;
        let to = self.path_for(&error_key(key))?;
        std::fs::rename(&from, &to).map_err(|e| GuardError::io(&from, e))?;
        warn!(key, preserved = %to.display(), "Preserved rejected content");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_get_and_preserve() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsContentStore::open(dir.path().join("store")).unwrap();

        store.put("mail/m1", b"hello").unwrap();
        assert_eq!(store.get("mail/m1").unwrap(), b"hello");
        assert!(dir.path().join("store/mail/m1").exists());

        store.put("mail/m1", b"replaced").unwrap();
        assert_eq!(store.get("mail/m1").unwrap(), b"replaced");

        store.preserve_error("mail/m1").unwrap();
        assert!(matches!(store.get("mail/m1"), Err(GuardError::FileNotFound(_))));
        assert_eq!(store.get("mail/m1.error").unwrap(), b"replaced");
    }

    #[test]
    fn test_temp_path_keeps_full_name() {
        let root = Path::new("/spool/store/mail");
        assert_eq!(temp_path(&root.join("a.b")), root.join("a.b.tmp"));
        assert_ne!(temp_path(&root.join("a.b")), temp_path(&root.join("a.c")));
        assert_eq!(temp_path(&root.join("m1")), root.join("m1.tmp"));
    }

    #[test]
    fn test_dotted_keys_do_not_share_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsContentStore::open(dir.path()).unwrap();
        std::fs::create_dir_all(dir.path().join("mail/a.tmp")).unwrap();

        store.put("mail/a.b", b"first").unwrap();
        store.put("mail/a.c", b"second").unwrap();
        assert_eq!(store.get("mail/a.b").unwrap(), b"first");
        assert_eq!(store.get("mail/a.c").unwrap(), b"second");
        assert!(!dir.path().join("mail/a.b.tmp").exists());
    }

    #[test]
    fn test_rejects_escaping_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsContentStore::open(dir.path()).unwrap();
        for key in ["", "../x", "/etc/passwd", "mail/../../x"] {
            assert!(
                matches!(store.put(key, b"x"), Err(GuardError::InvalidPath(_))),
                "accepted {key:?}"
            );
        }
    }
}
