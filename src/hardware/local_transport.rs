//! Directory-backed configuration transport.
//!
//! Serves the controller's file tree from a local directory, typically a
//! mounted share of the controller's `Admin` area. Remote paths are resolved
//! against the root and may not escape it.

use crate::error::{FtsError, FtsResult};
use crate::hardware::capabilities::ConfigTransport;
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// [`ConfigTransport`] over a local directory tree.
#[derive(Debug, Clone)]
pub struct LocalTransport {
    root: PathBuf,
}

impl LocalTransport {
    /// Serve files below `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory of the controller file tree.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, remote_path: &str) -> FtsResult<PathBuf> {
        let relative = Path::new(remote_path);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if remote_path.is_empty() || escapes {
            return Err(FtsError::Transport(format!(
                "remote path '{remote_path}' must be relative to the controller root"
            )));
        }
        Ok(self.root.join(relative))
    }
}

/// Controller files are latin-1; every byte maps to the code point of the same value.
fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

#[async_trait]
impl ConfigTransport for LocalTransport {
    async fn fetch_text(&self, remote_path: &str) -> FtsResult<Vec<String>> {
        let path = self.resolve(remote_path)?;
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| FtsError::Transport(format!("read {}: {e}", path.display())))?;
        let text = decode_latin1(&bytes);
        debug!(remote_path, bytes = bytes.len(), "fetched remote text");
        Ok(text.lines().map(str::to_string).collect())
    }

    async fn save_file(&self, remote_path: &str, local_path: &Path) -> FtsResult<()> {
        let source = self.resolve(remote_path)?;
        tokio::fs::copy(&source, local_path).await.map_err(|e| {
            FtsError::Transport(format!(
                "copy {} -> {}: {e}",
                source.display(),
                local_path.display()
            ))
        })?;
        Ok(())
    }

    async fn upload_file(&self, local_path: &Path, remote_path: &str) -> FtsResult<()> {
        let target = self.resolve(remote_path)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| FtsError::Transport(format!("create {}: {e}", parent.display())))?;
        }
        tokio::fs::copy(local_path, &target).await.map_err(|e| {
            FtsError::Transport(format!(
                "copy {} -> {}: {e}",
                local_path.display(),
                target.display()
            ))
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn fetch_text_decodes_latin1_lines() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("Config")).unwrap();
        std::fs::write(
            dir.path().join("Config/system.ini"),
            b"[GROUPS]\r\nMovingLinear = GROUP3\r\n; \xb5m stage\r\n",
        )
        .unwrap();

        let transport = LocalTransport::new(dir.path());
        let lines = transport.fetch_text("Config/system.ini").await.unwrap();

        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1], "MovingLinear = GROUP3");
        assert_eq!(lines[2], "; µm stage");
    }

    #[tokio::test]
    async fn paths_escaping_the_root_are_rejected() {
        let dir = tempdir().unwrap();
        let transport = LocalTransport::new(dir.path());

        let err = transport.fetch_text("../etc/passwd").await.unwrap_err();
        assert!(matches!(err, FtsError::Transport(_)));
        let err = transport.fetch_text("/etc/passwd").await.unwrap_err();
        assert!(matches!(err, FtsError::Transport(_)));
    }

    #[tokio::test]
    async fn save_and_upload_copy_files() {
        let remote = tempdir().unwrap();
        let local = tempdir().unwrap();
        let transport = LocalTransport::new(remote.path());

        let source = local.path().join("profile.txt");
        std::fs::write(&source, "velocity=10\n").unwrap();
        transport
            .upload_file(&source, "Public/profile.txt")
            .await
            .unwrap();
        assert!(remote.path().join("Public/profile.txt").exists());

        let copy = local.path().join("copy.txt");
        transport
            .save_file("Public/profile.txt", &copy)
            .await
            .unwrap();
        assert_eq!(std::fs::read_to_string(copy).unwrap(), "velocity=10\n");
    }

    #[tokio::test]
    async fn missing_file_is_a_transport_error() {
        let dir = tempdir().unwrap();
        let transport = LocalTransport::new(dir.path());
        let err = transport.fetch_text("Config/none.ini").await.unwrap_err();
        assert!(matches!(err, FtsError::Transport(_)));
    }
}
