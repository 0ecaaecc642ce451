use async_trait::async_trait;
use st_core::traits::StorageBackend;
use std::path::PathBuf;
use tokio::fs;

/// File-backed blob store: one file per key under a root directory.
///
/// Writes go through a temp file and rename so a crash mid-write leaves the
/// previous blob intact.
pub struct FileStore {
    root: PathBuf
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Keys are free text; anything outside [A-Za-z0-9._-] maps to '_' so a
    /// key never escapes the root directory.
    fn path_for(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.root.join(format!("{name}.blob"))
    }

    async fn ensure_root(&self) -> std::io::Result<()> {
        if !self.root.exists() {
            fs::create_dir_all(&self.root).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for FileStore {
    type Error = std::io::Error;

    async fn store(&self, key: &str, value: &[u8]) -> Result<(), Self::Error> {
        self.ensure_root().await?;
        let target = self.path_for(key);
        let tmp = target.with_extension("blob.tmp");
        fs::write(&tmp, value).await?;
        fs::rename(&tmp, &target).await?;
        Ok(())
    }

    async fn retrieve(&self, key: &str) -> Result<Option<Vec<u8>>, Self::Error> {
        let target = self.path_for(key);
        match fs::read(&target).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e)
        }
    }

    async fn delete(&self, key: &str) -> Result<(), Self::Error> {
        let target = self.path_for(key);
        match fs::remove_file(&target).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e)
        }
    }

    async fn exists(&self, key: &str) -> Result<bool, Self::Error> {
        Ok(self.path_for(key).exists())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        store.store("stagetrack/records", b"[]").await.unwrap();
        assert_eq!(
            store.retrieve("stagetrack/records").await.unwrap(),
            Some(b"[]".to_vec())
        );
        assert!(store.exists("stagetrack/records").await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_key_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        assert_eq!(store.retrieve("nothing").await.unwrap(), None);
        store.delete("nothing").await.unwrap();
    }

    #[tokio::test]
    async fn test_key_sanitization_stays_in_root() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        store.store("../escape/attempt", b"x").await.unwrap();
        let mut entries = fs::read_dir(dir.path()).await.unwrap();
        let entry = entries.next_entry().await.unwrap().unwrap();
        assert!(entry.path().starts_with(dir.path()));
    }

    #[tokio::test]
    async fn test_overwrite_replaces_content() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        store.store("k", b"one").await.unwrap();
        store.store("k", b"two").await.unwrap();
        assert_eq!(store.retrieve("k").await.unwrap(), Some(b"two".to_vec()));
    }
}
