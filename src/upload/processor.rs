//! The unit of upload work executed under the concurrency limiter.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use super::{IncomingFile, UploadError};

/// Default simulated processing latency per file.
pub const DEFAULT_PROCESSING_DELAY: Duration = Duration::from_secs(2);

/// Outcome of a stored upload.
#[derive(Debug, Clone, Serialize)]
pub struct UploadResult {
    pub id: Uuid,
    /// Generated name of the stored artifact.
    pub filename: String,
    #[serde(skip)]
    pub path: PathBuf,
    pub size: u64,
    pub original_name: Option<String>,
}

/// Persists received files under generated names.
#[derive(Debug, Clone)]
pub struct UploadProcessor {
    upload_dir: PathBuf,
    processing_delay: Duration,
}

impl UploadProcessor {
    pub fn new(upload_dir: impl Into<PathBuf>, processing_delay: Duration) -> Self {
        Self {
            upload_dir: upload_dir.into(),
            processing_delay,
        }
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    /// Process one received file.
    ///
    /// `None` means the request carried no file part; that is reported as
    /// [`UploadError::MissingFile`] without waiting out the processing delay.
    pub async fn process(&self, file: Option<IncomingFile>) -> Result<UploadResult, UploadError> {
        let file = file.ok_or(UploadError::MissingFile)?;

        if !self.processing_delay.is_zero() {
            tokio::time::sleep(self.processing_delay).await;
        }

        let id = Uuid::new_v4();
        let filename = generate_filename(id, file.original_name());
        let original_name = file.original_name().map(str::to_string);
        let size = file.size();

        let path = file.persist(self.upload_dir.join(&filename)).await?;

        info!(
            upload_id = %id,
            filename = %filename,
            size,
            "Stored upload"
        );

        Ok(UploadResult {
            id,
            filename,
            path,
            size,
            original_name,
        })
    }
}

/// Build a storage name from the current time plus the original extension.
///
/// A short suffix from `id` keeps names distinct when two uploads land in
/// the same millisecond.
pub fn generate_filename(id: Uuid, original_name: Option<&str>) -> String {
    let stamp = Utc::now().timestamp_millis();
    let suffix = &id.simple().to_string()[..8];

    let extension = original_name
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| format!(".{}", ext.to_ascii_lowercase()))
        .unwrap_or_default();

    format!("{}-{}{}", stamp, suffix, extension)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upload::UploadPolicy;
    use tempfile::tempdir;

    #[test]
    fn test_generate_filename_keeps_extension() {
        let name = generate_filename(Uuid::new_v4(), Some("People Data.CSV"));
        assert!(name.ends_with(".csv"));
        let stamp = name.split('-').next().unwrap();
        assert!(stamp.parse::<i64>().is_ok());
    }

    #[test]
    fn test_generate_filename_drops_unsafe_extension() {
        assert!(!generate_filename(Uuid::new_v4(), Some("x.c/sv")).contains('/'));
        assert!(!generate_filename(Uuid::new_v4(), None).contains('.'));
    }

    #[test]
    fn test_upload_result_serializes_without_path() {
        let id = Uuid::new_v4();
        let result = UploadResult {
            id,
            filename: "1-abcdef01.csv".to_string(),
            path: PathBuf::from("/srv/uploads/1-abcdef01.csv"),
            size: 12,
            original_name: Some("people.csv".to_string()),
        };

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["id"], id.to_string());
        assert_eq!(json["filename"], "1-abcdef01.csv");
        assert!(json.get("path").is_none());
    }

    #[tokio::test]
    async fn test_missing_file_is_reported() {
        let dir = tempdir().unwrap();
        let processor = UploadProcessor::new(dir.path(), Duration::from_secs(60));
        let err = processor.process(None).await.unwrap_err();
        assert!(matches!(err, UploadError::MissingFile));
        assert_eq!(err.to_string(), "No file uploaded");
    }

    #[tokio::test(start_paused = true)]
    async fn test_process_waits_then_stores() {
        let dir = tempdir().unwrap();
        let processor = UploadProcessor::new(dir.path(), Duration::from_secs(2));

        let mut incoming = IncomingFile::create_in(
            dir.path(),
            Some("data.csv".to_string()),
            Some("text/csv".to_string()),
            &UploadPolicy::default(),
        )
        .unwrap();
        incoming.write_chunk(b"a,b\n1,2\n").await.unwrap();

        let start = tokio::time::Instant::now();
        let result = processor.process(Some(incoming)).await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(2));

        assert!(result.filename.ends_with(".csv"));
        assert_eq!(result.size, 8);
        assert_eq!(result.original_name.as_deref(), Some("data.csv"));
        assert_eq!(std::fs::read(&result.path).unwrap(), b"a,b\n1,2\n");
    }
}
