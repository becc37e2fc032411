use super::LocalStore;
use crate::core::{Result, SyncError};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// One JSON file per key under a data directory.
///
/// Writes go to a temporary file in the same directory that is then renamed
/// over the target, so readers never observe a half-written value.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).map_err(|e| {
            SyncError::storage(format!("Failed to create data directory {}: {}", root.display(), e))
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.json", encode_key(key)))
    }
}

impl LocalStore for FileStore {
    fn read_raw(&self, key: &str) -> Result<Option<String>> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SyncError::storage(format!("Failed to read '{}': {}", key, e))),
        }
    }

    fn write_raw(&self, key: &str, value: &str) -> Result<()> {
        let target = self.path_for(key);
        let mut temp = NamedTempFile::new_in(&self.root)
            .map_err(|e| SyncError::storage(format!("Failed to create temp file: {}", e)))?;
        temp.write_all(value.as_bytes())
            .map_err(|e| SyncError::storage(format!("Failed to write '{}': {}", key, e)))?;
        temp.as_file()
            .sync_all()
            .map_err(|e| SyncError::storage(format!("Failed to sync '{}': {}", key, e)))?;
        temp.persist(&target)
            .map_err(|e| SyncError::storage(format!("Failed to replace '{}': {}", key, e.error)))?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SyncError::storage(format!("Failed to remove '{}': {}", key, e))),
        }
    }
}

/// Keeps `[A-Za-z0-9_-]` and percent-encodes every other byte.
fn encode_key(key: &str) -> String {
    let mut encoded = String::with_capacity(key.len());
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            encoded.push(byte as char);
        } else {
            encoded.push_str(&format!("%{:02X}", byte));
        }
    }
    encoded
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_values_survive_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::open(temp_dir.path()).unwrap();
        store.write_raw("prospects:device", "[1,2,3]").unwrap();

        let reopened = FileStore::open(temp_dir.path()).unwrap();
        assert_eq!(
            reopened.read_raw("prospects:device").unwrap(),
            Some("[1,2,3]".to_string())
        );
    }

    #[test]
    fn test_overwrite_and_remove() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::open(temp_dir.path()).unwrap();
        store.write_raw("k", "one").unwrap();
        store.write_raw("k", "two").unwrap();
        assert_eq!(store.read_raw("k").unwrap(), Some("two".to_string()));

        store.remove("k").unwrap();
        store.remove("k").unwrap();
        assert_eq!(store.read_raw("k").unwrap(), None);
    }

    #[test]
    fn test_key_encoding_is_distinct() {
        assert_eq!(encode_key("prospects:u1"), "prospects%3Au1");
        assert_ne!(encode_key("a:b"), encode_key("a_b"));
        assert_ne!(encode_key("a/b"), encode_key("a%2Fb"));
    }
}
