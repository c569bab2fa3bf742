use crate::AppState;
use crate::api::error::AppError;
use crate::models::StoredFile;
use crate::services::storage::BodyLimitExceeded;
use axum::{
    Json,
    body::Body,
    extract::{Multipart, Path, Query, State, multipart::MultipartError},
    http::{StatusCode, header},
    response::Response,
};
use futures::TryStreamExt;
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use tokio_util::io::{ReaderStream, StreamReader};
use utoipa::{IntoParams, ToSchema};

/// Marks files created through `/test/upload-text`.
pub const TEXT_UPLOAD_PREFIX: &str = "test_";

#[derive(Serialize, Deserialize, ToSchema)]
pub struct UploadResponse {
    pub status: String,
    pub filename: String,
    pub size: u64,
    pub download_url: String,
}

impl From<StoredFile> for UploadResponse {
    fn from(stored: StoredFile) -> Self {
        Self {
            status: "success".to_string(),
            filename: stored.name,
            size: stored.size_bytes,
            download_url: stored.download_url,
        }
    }
}

/// Multipart body accepted by `/upload`.
#[derive(ToSchema)]
#[allow(dead_code)]
pub struct UploadForm {
    #[schema(value_type = String, format = Binary)]
    file: Vec<u8>,
}

#[derive(Deserialize, IntoParams)]
pub struct UploadTextQuery {
    /// Text stored verbatim as a `.txt` file
    pub content: String,
}

fn multipart_error(e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge("Request body exceeds the maximum allowed limit".to_string())
    } else {
        AppError::BadRequest(e.body_text())
    }
}

/// Tags a body limit overflow so it survives the conversion to io::Error.
fn field_stream_error(e: MultipartError) -> std::io::Error {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        std::io::Error::other(BodyLimitExceeded)
    } else {
        std::io::Error::other(e.body_text())
    }
}

#[utoipa::path(
    post,
    path = "/upload",
    request_body(content = UploadForm, content_type = "multipart/form-data", description = "File upload"),
    responses(
        (status = 200, description = "File stored", body = UploadResponse),
        (status = 400, description = "No file field in the form"),
        (status = 413, description = "Upload exceeds the size limit"),
        (status = 500, description = "File could not be written")
    ),
    tag = "files"
)]
pub async fn upload_file(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let result: Result<Json<UploadResponse>, AppError> = async {
        while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
            if field.name() != Some("file") {
                continue;
            }

            let suggested_name = field.file_name().map(|s| s.to_string());
            let reader = StreamReader::new(field.map_err(field_stream_error));

            let stored = state
                .relay
                .upload(suggested_name.as_deref(), Box::new(reader))
                .await?;

            return Ok(Json(stored.into()));
        }

        Err(AppError::BadRequest("No file provided".to_string()))
    }
    .await;

    match result {
        Ok(res) => Ok(res),
        Err(e) => {
            // Drain the rest of the body, otherwise browsers report a connection reset
            tracing::warn!("Upload failed: {}. Consuming remaining stream...", e);
            while let Ok(Some(mut field)) = multipart.next_field().await {
                while let Ok(Some(_)) = field.chunk().await {}
            }
            Err(e)
        }
    }
}

#[utoipa::path(
    post,
    path = "/test/upload-text",
    params(UploadTextQuery),
    responses(
        (status = 200, description = "Text stored as test_<uuid>.txt", body = UploadResponse)
    ),
    tag = "files"
)]
pub async fn upload_text(
    State(state): State<AppState>,
    Query(query): Query<UploadTextQuery>,
) -> Result<Json<UploadResponse>, AppError> {
    let stored = state
        .relay
        .upload_with_prefix(
            TEXT_UPLOAD_PREFIX,
            Some("text.txt"),
            Box::new(Cursor::new(query.content.into_bytes())),
        )
        .await?;

    Ok(Json(stored.into()))
}

#[utoipa::path(
    get,
    path = "/files/{name}",
    params(
        ("name" = String, Path, description = "Name returned by /upload")
    ),
    responses(
        (status = 200, description = "File content", content_type = "application/octet-stream"),
        (status = 400, description = "Name is not a plain file name"),
        (status = 404, description = "File not found")
    ),
    tag = "files"
)]
pub async fn download_file(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Response, AppError> {
    let download = state.relay.download(&name).await?;

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, mime::APPLICATION_OCTET_STREAM.as_ref())
        .header(header::CONTENT_LENGTH, download.size)
        .header(
            header::CONTENT_DISPOSITION,
            attachment_disposition(&download.name),
        )
        .body(Body::from_stream(ReaderStream::new(download.reader)))
        .map_err(|e| AppError::Internal(format!("Failed to build download response: {}", e)))
}

/// Generated names are always plain ASCII, but files dropped into the
/// directory by an operator can carry any valid UTF-8 name.
pub(crate) fn attachment_disposition(filename: &str) -> String {
    let is_plain = filename
        .chars()
        .all(|c| c.is_ascii() && !c.is_control() && c != '"' && c != '\\' && c != ';');

    if is_plain {
        format!("attachment; filename=\"{}\"", filename)
    } else {
        let ascii_filename = filename
            .chars()
            .filter(|c| c.is_ascii() && !c.is_control() && *c != '"' && *c != '\\' && *c != ';')
            .collect::<String>();
        let fallback = if ascii_filename.is_empty() {
            "file"
        } else {
            &ascii_filename
        };
        format!(
            "attachment; filename=\"{}\"; filename*=UTF-8''{}",
            fallback,
            utf8_percent_encode(filename, NON_ALPHANUMERIC)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attachment_disposition() {
        assert_eq!(
            attachment_disposition("abc.shr"),
            "attachment; filename=\"abc.shr\""
        );
        assert_eq!(
            attachment_disposition("résumé.pdf"),
            "attachment; filename=\"rsum.pdf\"; filename*=UTF-8''r%C3%A9sum%C3%A9%2Epdf"
        );
    }
}
