use super::Storage;
use crate::{config::Config, error::StorageError};
use std::io;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info};

/// Blob store backed by a directory tree: `<root>/<bucket>/<key>`.
pub struct LocalStorage {
    root: PathBuf,
    reject_traversal: bool,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            reject_traversal: true,
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self {
            root: PathBuf::from(&cfg.storage.local_root),
            reject_traversal: cfg.security.reject_path_traversal,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn bucket_dir(&self, bucket: &str) -> Result<PathBuf, StorageError> {
        self.check_relative(bucket)?;
        Ok(self.root.join(bucket))
    }

    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf, StorageError> {
        self.check_relative(key)?;
        Ok(self.bucket_dir(bucket)?.join(key))
    }

    fn check_relative(&self, s: &str) -> Result<(), StorageError> {
        if !self.reject_traversal {
            return Ok(());
        }
        let escapes = Path::new(s)
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if s.is_empty() || escapes {
            return Err(StorageError::AccessDenied(format!(
                "path escapes storage root: {s:?}"
            )));
        }
        Ok(())
    }
}

impl Storage for LocalStorage {
    fn list_keys(&self, bucket: &str) -> Result<Vec<String>, StorageError> {
        let dir = self.bucket_dir(bucket)?;
        let mut keys = Vec::new();
        walk(&dir, &dir, &mut keys).map_err(|e| map_io(e, bucket, ""))?;
        keys.sort();
        debug!("local list bucket={bucket} keys={}", keys.len());
        Ok(keys)
    }

    fn get_bytes(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.object_path(bucket, key)?;
        std::fs::read(&path).map_err(|e| map_io(e, bucket, key))
    }

    fn put_bytes(
        &self,
        bucket: &str,
        key: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<(), StorageError> {
        let path = self.object_path(bucket, key)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| map_io(e, bucket, key))?;
        }
        std::fs::write(&path, bytes).map_err(|e| map_io(e, bucket, key))?;
        info!(
            "stored {bucket}/{key} bytes={} content_type={content_type}",
            bytes.len()
        );
        Ok(())
    }
}

fn walk(base: &Path, dir: &Path, out: &mut Vec<String>) -> io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            walk(base, &path, out)?;
            continue;
        }
        let rel = path.strip_prefix(base).unwrap_or(&path);
        let key = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        out.push(key);
    }
    Ok(())
}

fn map_io(err: io::Error, bucket: &str, key: &str) -> StorageError {
    match err.kind() {
        io::ErrorKind::NotFound => StorageError::NotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        },
        io::ErrorKind::PermissionDenied => {
            StorageError::AccessDenied(format!("{bucket}/{key}: {err}"))
        }
        _ => StorageError::Transient(format!("{bucket}/{key}: {err}")),
    }
}
