use super::ObjectBackend;
use crate::{GateError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tokio::fs;

/// Stores every object as a file below `root`; `/` in keys maps to
/// subdirectories.
#[derive(Debug, Clone)]
pub struct FilesystemBackend {
    root: PathBuf,
}

impl FilesystemBackend {
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = std::path::absolute(root.as_ref())?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, key: &str) -> Result<PathBuf> {
        let mut path = self.root.clone();
        let mut depth = 0usize;

        for component in Path::new(key).components() {
            match component {
                Component::Normal(part) => {
                    path.push(part);
                    depth += 1;
                }
                Component::CurDir => {}
                _ => {
                    return Err(GateError::InvalidRequest(format!(
                        "invalid path {} to {}",
                        key,
                        self.root.display()
                    )));
                }
            }
        }

        if depth == 0 {
            return Err(GateError::InvalidRequest(
                "object key cannot be empty".to_string(),
            ));
        }

        Ok(path)
    }

    async fn ensure_parent(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            if let Err(error) = fs::create_dir_all(dir).await {
                tracing::error!(path = %dir.display(), %error, "make directory");
                return Err(error.into());
            }
            tracing::debug!(path = %dir.display(), "make directory");
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectBackend for FilesystemBackend {
    async fn put_object(&self, key: &str, payload: Bytes) -> Result<()> {
        let path = self.object_path(key)?;

        match fs::write(&path, &payload).await {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == ErrorKind::NotFound => {
                self.ensure_parent(&path).await?;
                fs::write(&path, &payload).await?;
                Ok(())
            }
            Err(error) => Err(error.into()),
        }
    }

    async fn get_object(&self, key: &str) -> Result<Bytes> {
        let path = self.object_path(key)?;

        match fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(error) if error.kind() == ErrorKind::NotFound => {
                Err(GateError::ChunkNotFound(key.to_string()))
            }
            Err(error) => Err(error.into()),
        }
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        let path = self.object_path(key)?;

        let metadata = match fs::metadata(&path).await {
            Ok(metadata) => metadata,
            Err(error) if error.kind() == ErrorKind::NotFound => {
                return Err(GateError::ChunkNotFound(key.to_string()));
            }
            Err(error) => return Err(error.into()),
        };

        if metadata.is_dir() {
            fs::remove_dir_all(&path).await?;
        } else {
            fs::remove_file(&path).await?;
        }

        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        match fs::metadata(&self.root).await {
            Ok(metadata) if metadata.is_dir() => Ok(()),
            Ok(_) => Err(GateError::Config(format!(
                "the path must be a directory '{}'",
                self.root.display()
            ))),
            Err(error) if error.kind() == ErrorKind::NotFound => {
                fs::create_dir_all(&self.root).await?;
                Ok(())
            }
            Err(error) => Err(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_filesystem_backend() {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::new(temp_dir.path().join("objects")).unwrap();

        // ping creates the missing root
        backend.ping().await.unwrap();
        assert!(backend.root().is_dir());

        let key = "fake/a70ecbaeaa65a26a_17ab9b3875f_17ab9b3889b_d8c9fe60";
        backend
            .put_object(key, Bytes::from("chunk body"))
            .await
            .unwrap();
        assert!(backend.root().join("fake").is_dir());
        assert_eq!(
            backend.get_object(key).await.unwrap(),
            Bytes::from("chunk body")
        );

        backend.delete_object(key).await.unwrap();
        assert!(matches!(
            backend.get_object(key).await,
            Err(GateError::ChunkNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_missing_object_is_not_found() {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::new(temp_dir.path()).unwrap();

        let result = backend.delete_object("missing/key").await;
        assert!(matches!(result, Err(GateError::ChunkNotFound(key)) if key == "missing/key"));
    }

    #[tokio::test]
    async fn test_delete_directory_removes_tree() {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::new(temp_dir.path()).unwrap();

        backend.put_object("user/a", Bytes::from("1")).await.unwrap();
        backend.put_object("user/b", Bytes::from("2")).await.unwrap();

        backend.delete_object("user").await.unwrap();
        assert!(!temp_dir.path().join("user").exists());
    }

    #[tokio::test]
    async fn test_rejects_keys_escaping_root() {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::new(temp_dir.path().join("root")).unwrap();

        for key in ["../outside", "/etc/passwd", "a/../../b", ""] {
            let result = backend.put_object(key, Bytes::from("x")).await;
            assert!(
                matches!(result, Err(GateError::InvalidRequest(_))),
                "{key:?} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn test_ping_rejects_file_root() {
        let temp_dir = tempfile::tempdir().unwrap();
        let file_path = temp_dir.path().join("plain-file");
        std::fs::write(&file_path, b"x").unwrap();

        let backend = FilesystemBackend::new(&file_path).unwrap();
        assert!(matches!(backend.ping().await, Err(GateError::Config(_))));
    }
}
