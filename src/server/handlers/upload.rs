//! `POST /upload`.

use std::sync::Arc;

use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        Multipart, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::{debug, error};

use super::super::AppState;
use crate::limiter::WorkItem;
use crate::upload::{IncomingFile, UploadError};

/// Multipart field carrying the file.
pub const FILE_FIELD: &str = "file";

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub message: &'static str,
    pub filename: String,
}

/// Receive a CSV file and store it once a processing slot frees up.
pub async fn upload_file(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, UploadError> {
    let incoming = match multipart {
        Ok(multipart) => receive_file(multipart, &state).await?,
        Err(rejection) => {
            debug!("Upload request without a multipart body: {}", rejection);
            None
        }
    };
    // Requests without a file never take a slot or a queue position
    let incoming = incoming.ok_or(UploadError::MissingFile)?;

    let processor = Arc::clone(&state.processor);
    let item = WorkItem::new(async move { processor.process(Some(incoming)).await });
    debug!(work_id = %item.id(), "Submitting upload");

    let result = state.limiter.submit(item).await??;

    Ok(Json(UploadResponse {
        message: "File uploaded successfully",
        filename: result.filename,
    }))
}

/// Stream the single file part into the upload directory.
///
/// Non-file form fields are skipped. A second file part, or a file under any
/// name other than [`FILE_FIELD`], is rejected.
async fn receive_file(
    mut multipart: Multipart,
    state: &AppState,
) -> Result<Option<IncomingFile>, UploadError> {
    let mut received: Option<IncomingFile> = None;

    while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.file_name().is_none() {
            continue;
        }

        let field_name = field.name().unwrap_or_default().to_string();
        if field_name != FILE_FIELD || received.is_some() {
            return Err(UploadError::UnexpectedField(field_name));
        }

        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        state
            .policy
            .check_media_type(content_type.as_deref(), file_name.as_deref())?;

        let mut incoming = IncomingFile::create_in(
            state.processor.upload_dir(),
            file_name,
            content_type,
            &state.policy,
        )?;
        while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
            incoming.write_chunk(&chunk).await?;
        }
        incoming.finish().await?;

        debug!(
            original_name = incoming.original_name().unwrap_or(""),
            size = incoming.size(),
            "Received upload"
        );
        received = Some(incoming);
    }

    Ok(received)
}

fn multipart_error(err: MultipartError) -> UploadError {
    UploadError::Malformed(err.body_text())
}

impl IntoResponse for UploadError {
    fn into_response(self) -> Response {
        let status = match &self {
            UploadError::MissingFile => StatusCode::BAD_REQUEST,
            UploadError::QueueFull => StatusCode::TOO_MANY_REQUESTS,
            UploadError::QueueTimeout => StatusCode::SERVICE_UNAVAILABLE,
            // Media type and size rejections keep the original 500 mapping.
            UploadError::UnsupportedMediaType { .. }
            | UploadError::FileTooLarge { .. }
            | UploadError::UnexpectedField(_)
            | UploadError::Malformed(_)
            | UploadError::Internal(_)
            | UploadError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let message = match &self {
            UploadError::Internal(_) | UploadError::Io(_) => {
                error!("Upload failed: {}", self);
                "Internal server error".to_string()
            }
            other => {
                debug!("Upload rejected: {}", other);
                other.to_string()
            }
        };

        (status, Json(serde_json::json!({ "message": message }))).into_response()
    }
}
