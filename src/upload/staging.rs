//! Streaming receipt of an upload into a temporary file.

use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;

use super::{UploadError, UploadPolicy};

/// A received file waiting in the upload directory for processing.
///
/// The temporary file is deleted if this value is dropped before
/// [`IncomingFile::persist`] is called.
pub struct IncomingFile {
    temp: NamedTempFile,
    writer: Option<tokio::fs::File>,
    original_name: Option<String>,
    content_type: Option<String>,
    size: u64,
    policy: UploadPolicy,
}

impl std::fmt::Debug for IncomingFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IncomingFile")
            .field("path", &self.temp.path())
            .field("original_name", &self.original_name)
            .field("content_type", &self.content_type)
            .field("size", &self.size)
            .finish()
    }
}

impl IncomingFile {
    /// Start receiving a file into `dir`.
    pub fn create_in(
        dir: &Path,
        original_name: Option<String>,
        content_type: Option<String>,
        policy: &UploadPolicy,
    ) -> Result<Self, UploadError> {
        let temp = tempfile::Builder::new()
            .prefix(".incoming-")
            .tempfile_in(dir)?;
        let writer = tokio::fs::File::from_std(temp.reopen()?);

        Ok(Self {
            temp,
            writer: Some(writer),
            original_name,
            content_type,
            size: 0,
            policy: policy.clone(),
        })
    }

    /// Append a chunk, failing as soon as the size limit is crossed.
    pub async fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), UploadError> {
        let size = self.size + chunk.len() as u64;
        self.policy.check_size(size)?;

        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| UploadError::Internal("write after finish".to_string()))?;
        writer.write_all(chunk).await?;
        self.size = size;
        Ok(())
    }

    /// Flush and close the write handle.
    pub async fn finish(&mut self) -> Result<(), UploadError> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush().await?;
            writer.sync_all().await?;
        }
        Ok(())
    }

    pub fn original_name(&self) -> Option<&str> {
        self.original_name.as_deref()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn temp_path(&self) -> &Path {
        self.temp.path()
    }

    /// Move the file to `dest`, refusing to overwrite an existing file.
    pub async fn persist(mut self, dest: PathBuf) -> Result<PathBuf, UploadError> {
        self.finish().await?;
        let temp = self.temp;

        tokio::task::spawn_blocking(move || {
            temp.persist_noclobber(&dest)
                .map(|_| dest)
                .map_err(|e| UploadError::Io(e.error))
        })
        .await
        .map_err(|e| UploadError::Internal(e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_staged_file_persists_contents() {
        let dir = tempdir().unwrap();
        let policy = UploadPolicy::default();
        let mut incoming = IncomingFile::create_in(
            dir.path(),
            Some("people.csv".to_string()),
            Some("text/csv".to_string()),
            &policy,
        )
        .unwrap();

        incoming.write_chunk(b"name,age\n").await.unwrap();
        incoming.write_chunk(b"John,30\n").await.unwrap();
        assert_eq!(incoming.size(), 17);

        let dest = dir.path().join("stored.csv");
        let stored = incoming.persist(dest.clone()).await.unwrap();
        assert_eq!(stored, dest);
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "name,age\nJohn,30\n");
    }

    #[tokio::test]
    async fn test_oversized_file_is_rejected_and_cleaned_up() {
        let dir = tempdir().unwrap();
        let policy = UploadPolicy {
            max_bytes: 8,
            ..Default::default()
        };
        let mut incoming = IncomingFile::create_in(dir.path(), None, None, &policy).unwrap();
        let temp_path = incoming.temp_path().to_path_buf();

        incoming.write_chunk(b"12345678").await.unwrap();
        let err = incoming.write_chunk(b"9").await.unwrap_err();
        assert!(matches!(err, UploadError::FileTooLarge { limit: 8 }));

        drop(incoming);
        assert!(!temp_path.exists());
    }
}
