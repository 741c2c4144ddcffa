//! Local-disk file area.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;
use uuid::Uuid;

use super::{FileArea, FileError};

/// Two directories on the local filesystem, created on first write.
///
/// Writes replace files atomically.
#[derive(Debug, Clone)]
pub struct LocalFileArea {
    input_dir: PathBuf,
    output_dir: PathBuf,
}

impl LocalFileArea {
    pub fn new(input_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            input_dir: input_dir.into(),
            output_dir: output_dir.into(),
        }
    }

    pub fn input_dir(&self) -> &Path {
        &self.input_dir
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn input_path(&self, name: &str) -> Result<PathBuf, FileError> {
        Ok(self.input_dir.join(checked_name(name)?))
    }

    /// Create both directories if they are missing.
    pub async fn ensure_dirs(&self) -> Result<(), FileError> {
        for dir in [&self.input_dir, &self.output_dir] {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| io_err(dir, e))?;
        }
        Ok(())
    }
}

/// Rejects names that are empty or contain path components.
fn checked_name(name: &str) -> Result<&str, FileError> {
    let ok = !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains('/')
        && !name.contains('\\');
    if ok {
        Ok(name)
    } else {
        Err(FileError::InvalidName(name.to_string()))
    }
}

fn io_err(path: &Path, source: std::io::Error) -> FileError {
    FileError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Writes `bytes` under `name` by renaming a sibling temp file over it, so
/// a concurrent reader sees the old content or the new, never a partial file.
async fn write_file(dir: &Path, name: &str, bytes: &[u8]) -> Result<(), FileError> {
    let path = dir.join(checked_name(name)?);
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| io_err(dir, e))?;

    let temp = dir.join(format!(".{}.{}.tmp", name, Uuid::new_v4().simple()));
    if let Err(e) = tokio::fs::write(&temp, bytes).await {
        let _ = tokio::fs::remove_file(&temp).await;
        return Err(io_err(&temp, e));
    }
    if let Err(e) = tokio::fs::rename(&temp, &path).await {
        let _ = tokio::fs::remove_file(&temp).await;
        return Err(io_err(&path, e));
    }

    debug!(path = %path.display(), size = bytes.len(), "Wrote file");
    Ok(())
}

#[async_trait]
impl FileArea for LocalFileArea {
    async fn write_input(&self, name: &str, bytes: &[u8]) -> Result<(), FileError> {
        write_file(&self.input_dir, name, bytes).await
    }

    async fn read_input(&self, name: &str) -> Result<Vec<u8>, FileError> {
        let path = self.input_path(name)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(FileError::NotFound(path.display().to_string()))
            }
            Err(e) => Err(io_err(&path, e)),
        }
    }

    async fn write_output(&self, name: &str, bytes: &[u8]) -> Result<(), FileError> {
        write_file(&self.output_dir, name, bytes).await
    }

    fn output_path(&self, name: &str) -> Result<PathBuf, FileError> {
        Ok(self.output_dir.join(checked_name(name)?))
    }

    async fn exists_output(&self, name: &str) -> Result<bool, FileError> {
        let path = self.output_path(name)?;
        tokio::fs::try_exists(&path)
            .await
            .map_err(|e| io_err(&path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn area(dir: &TempDir) -> LocalFileArea {
        LocalFileArea::new(dir.path().join("in"), dir.path().join("out"))
    }

    #[tokio::test]
    async fn test_input_roundtrip_creates_dirs() {
        let dir = TempDir::new().unwrap();
        let area = area(&dir);

        area.write_input("a.png", b"bytes").await.unwrap();
        assert!(area.input_dir().exists());
        assert_eq!(area.read_input("a.png").await.unwrap(), b"bytes");
    }

    #[tokio::test]
    async fn test_output_overwrites() {
        let dir = TempDir::new().unwrap();
        let area = area(&dir);

        assert!(!area.exists_output("a.png").await.unwrap());
        area.write_output("a.png", b"first").await.unwrap();
        area.write_output("a.png", b"second").await.unwrap();

        assert!(area.exists_output("a.png").await.unwrap());
        let path = area.output_path("a.png").unwrap();
        assert_eq!(std::fs::read(path).unwrap(), b"second");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_output_replaced_atomically() {
        let dir = TempDir::new().unwrap();
        let area = Arc::new(area(&dir));
        let small = vec![b'a'; 64 * 1024];
        let large = vec![b'b'; 512 * 1024];
        area.write_output("a.png", &small).await.unwrap();

        let writer = {
            let area = Arc::clone(&area);
            let (small, large) = (small.clone(), large.clone());
            tokio::spawn(async move {
                for i in 0..40 {
                    let bytes = if i % 2 == 0 { &large } else { &small };
                    area.write_output("a.png", bytes).await.unwrap();
                }
            })
        };

        let path = area.output_path("a.png").unwrap();
        while !writer.is_finished() {
            let seen = tokio::fs::read(&path).await.unwrap();
            assert!(seen == small || seen == large, "partial read of {} bytes", seen.len());
        }
        writer.await.unwrap();

        // No temp files are left behind.
        let names: Vec<_> = std::fs::read_dir(area.output_dir())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("a.png")]);
    }

    #[tokio::test]
    async fn test_read_missing_input() {
        let dir = TempDir::new().unwrap();
        let err = area(&dir).read_input("nope.png").await.unwrap_err();
        assert!(matches!(err, FileError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_rejects_path_components() {
        let dir = TempDir::new().unwrap();
        let area = area(&dir);

        for name in ["", "..", "../escape.png", "a/b.png"] {
            let err = area.write_input(name, b"x").await.unwrap_err();
            assert!(matches!(err, FileError::InvalidName(_)), "{:?}", name);
        }
        assert!(area.output_path("../x").is_err());
    }

    #[tokio::test]
    async fn test_ensure_dirs() {
        let dir = TempDir::new().unwrap();
        let area = area(&dir);
        area.ensure_dirs().await.unwrap();
        assert!(area.input_dir().is_dir());
        assert!(area.output_dir().is_dir());
    }
}
