//! Upload intake: policy checks, staged receipt, and final storage.
//!
//! A request's file is streamed into a hidden temporary file inside the
//! upload directory while the size limit is enforced. Once the limiter grants
//! the work a slot, [`UploadProcessor`] moves it to its permanent name.

mod processor;
mod staging;

use std::path::Path;

use thiserror::Error;

use crate::limiter::LimiterError;

pub use processor::{
    generate_filename, UploadProcessor, UploadResult, DEFAULT_PROCESSING_DELAY,
};
pub use staging::IncomingFile;

/// Default maximum accepted file size (250 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 250 * 1024 * 1024;

/// Media type accepted by default.
pub const CSV_MEDIA_TYPE: &str = "text/csv";

/// Errors that can occur while receiving or storing an upload.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("No file uploaded")]
    MissingFile,

    #[error("Only CSV files are allowed!")]
    UnsupportedMediaType { found: Option<String> },

    #[error("Multer error: File too large")]
    FileTooLarge { limit: u64 },

    #[error("Multer error: Unexpected field")]
    UnexpectedField(String),

    #[error("Unknown error: {0}")]
    Malformed(String),

    #[error("Upload queue is full. Please try again later.")]
    QueueFull,

    #[error("Timed out waiting for an upload slot. Please try again later.")]
    QueueTimeout,

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<LimiterError> for UploadError {
    fn from(err: LimiterError) -> Self {
        match err {
            LimiterError::QueueFull(_) => UploadError::QueueFull,
            LimiterError::QueueTimeout(_) => UploadError::QueueTimeout,
            other => UploadError::Internal(other.to_string()),
        }
    }
}

/// What an upload must satisfy before it is queued.
#[derive(Debug, Clone)]
pub struct UploadPolicy {
    pub max_bytes: u64,
    pub allowed_media_type: String,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            allowed_media_type: CSV_MEDIA_TYPE.to_string(),
        }
    }
}

impl UploadPolicy {
    /// Check the declared media type of a file part.
    ///
    /// Parameters such as `; charset=utf-8` are ignored. When the client sent
    /// no content type, the type is guessed from the file name's extension.
    pub fn check_media_type(
        &self,
        content_type: Option<&str>,
        file_name: Option<&str>,
    ) -> Result<(), UploadError> {
        let declared = content_type
            .map(media_type_essence)
            .filter(|essence| !essence.is_empty())
            .or_else(|| {
                file_name
                    .and_then(|name| mime_guess::from_path(Path::new(name)).first())
                    .map(|mime| mime.essence_str().to_string())
            });

        match declared {
            Some(ref essence) if essence.eq_ignore_ascii_case(&self.allowed_media_type) => Ok(()),
            found => Err(UploadError::UnsupportedMediaType { found }),
        }
    }

    /// Check a running byte count against the size limit.
    pub fn check_size(&self, bytes: u64) -> Result<(), UploadError> {
        if bytes > self.max_bytes {
            Err(UploadError::FileTooLarge {
                limit: self.max_bytes,
            })
        } else {
            Ok(())
        }
    }
}

fn media_type_essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csv_accepted_with_parameters() {
        let policy = UploadPolicy::default();
        assert!(policy.check_media_type(Some("text/csv"), None).is_ok());
        assert!(policy
            .check_media_type(Some("Text/CSV; charset=utf-8"), Some("a.csv"))
            .is_ok());
    }

    #[test]
    fn test_declared_type_wins_over_extension() {
        let policy = UploadPolicy::default();
        let err = policy
            .check_media_type(Some("text/plain"), Some("data.csv"))
            .unwrap_err();
        assert_eq!(err.to_string(), "Only CSV files are allowed!");
    }

    #[test]
    fn test_extension_fallback() {
        let policy = UploadPolicy::default();
        assert!(policy.check_media_type(None, Some("report.csv")).is_ok());
        assert!(policy.check_media_type(None, Some("report.txt")).is_err());
        assert!(policy.check_media_type(None, None).is_err());
    }

    #[test]
    fn test_size_limit_is_inclusive() {
        let policy = UploadPolicy {
            max_bytes: 10,
            ..Default::default()
        };
        assert!(policy.check_size(10).is_ok());
        assert!(matches!(
            policy.check_size(11),
            Err(UploadError::FileTooLarge { limit: 10 })
        ));
    }

    #[test]
    fn test_limiter_errors_map_to_overload() {
        assert!(matches!(
            UploadError::from(LimiterError::QueueFull(3)),
            UploadError::QueueFull
        ));
        assert!(matches!(
            UploadError::from(LimiterError::Closed),
            UploadError::Internal(_)
        ));
    }
}
