//! Handlers for file-based batch submission.
//!
//! Accepts CSV/TSV or SDF files as multipart uploads, parses them into
//! structures on the blocking pool, and admits the result like a JSON
//! submission.

use axum::body::Bytes;
use axum::extract::multipart::{Field, MultipartError};
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use chemaudit_core::batch::BatchState;
use chemaudit_core::types::BatchId;
use chemaudit_core::upload::{self, FileFormat, SkippedRecord, UploadError, DEFAULT_SMILES_COLUMN};
use chemaudit_core::validation::ValidationOptions;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// Response body for an accepted file upload.
#[derive(Debug, Serialize)]
pub struct UploadBatchResponse {
    pub id: BatchId,
    pub state: BatchState,
    pub total: usize,
    pub filename: String,
    pub format: FileFormat,
    /// Records left out of the batch, with the reason for each.
    pub skipped: Vec<SkippedRecord>,
}

/// Multipart fields of an upload request.
#[derive(Debug, Default)]
struct UploadForm {
    file: Option<(String, Bytes)>,
    smiles_column: Option<String>,
    name_column: Option<String>,
    options: ValidationOptions,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /batches/upload
///
/// Multipart fields: `file` (required), `smiles_column`, `name_column`,
/// `include_extended_safety`, `include_chembl_alerts`,
/// `include_standardization`, `timeout_ms`.
pub async fn upload_batch(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<impl IntoResponse> {
    let mut form = UploadForm::default();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        match name.as_str() {
            "file" => form.file = Some(read_file(field).await?),
            "smiles_column" => form.smiles_column = non_empty(read_text(field).await?),
            "name_column" => form.name_column = non_empty(read_text(field).await?),
            "include_extended" | "include_extended_safety" => {
                form.options.include_extended = parse_flag(&name, &read_text(field).await?)?;
            }
            "include_chembl" | "include_chembl_alerts" => {
                form.options.include_chembl = parse_flag(&name, &read_text(field).await?)?;
            }
            "include_standardization" => {
                form.options.include_standardization =
                    parse_flag(&name, &read_text(field).await?)?;
            }
            "timeout_ms" => {
                let raw = read_text(field).await?;
                let ms = raw.trim().parse().map_err(|_| {
                    AppError::BadRequest(format!("Invalid timeout_ms value: {raw}"))
                })?;
                form.options.timeout_ms = Some(ms);
            }
            other => {
                tracing::debug!(field = other, "Ignoring unknown upload field");
            }
        }
    }

    let (filename, content) = form
        .file
        .ok_or_else(|| AppError::BadRequest("No file received in multipart upload".into()))?;
    let format = FileFormat::from_filename(&filename)?;
    let smiles_column = form
        .smiles_column
        .unwrap_or_else(|| DEFAULT_SMILES_COLUMN.to_string());
    let name_column = form.name_column;

    let parsed = tokio::task::spawn_blocking(move || {
        upload::parse_upload(format, &content, &smiles_column, name_column.as_deref())
    })
    .await
    .map_err(|e| AppError::InternalError(format!("Upload parser failed: {e}")))??;

    tracing::info!(
        filename = %filename,
        format = format.as_str(),
        structures = parsed.structures.len(),
        skipped = parsed.skipped.len(),
        "Batch file parsed",
    );

    let snapshot = state.registry.submit(parsed.structures, form.options).await?;
    let response = UploadBatchResponse {
        id: snapshot.id,
        state: snapshot.state,
        total: snapshot.counters.total,
        filename,
        format,
        skipped: parsed.skipped,
    };

    Ok((StatusCode::CREATED, Json(DataResponse { data: response })))
}

/// POST /batches/detect-columns
///
/// Inspect the header of a delimited file and suggest the descriptor and
/// name columns.
pub async fn detect_columns(mut multipart: Multipart) -> AppResult<impl IntoResponse> {
    let mut file = None;
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() == Some("file") {
            file = Some(read_file(field).await?);
        }
    }

    let (filename, content) =
        file.ok_or_else(|| AppError::BadRequest("No file received in multipart upload".into()))?;
    if FileFormat::from_filename(&filename)? != FileFormat::Csv {
        return Err(UploadError::UnsupportedFormat(filename).into());
    }

    let detection = tokio::task::spawn_blocking(move || upload::detect_columns(&content))
        .await
        .map_err(|e| AppError::InternalError(format!("Column detection failed: {e}")))??;

    Ok(Json(DataResponse { data: detection }))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn read_file(field: Field<'_>) -> AppResult<(String, Bytes)> {
    let filename = field.file_name().unwrap_or("upload").to_string();
    let data = field.bytes().await.map_err(multipart_error)?;
    Ok((filename, data))
}

async fn read_text(field: Field<'_>) -> AppResult<String> {
    field.text().await.map_err(multipart_error)
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn parse_flag(field: &str, value: &str) -> AppResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" | "" => Ok(false),
        other => Err(AppError::BadRequest(format!(
            "Invalid value for {field}: {other}"
        ))),
    }
}

/// A body over the request limit surfaces here while streaming fields.
fn multipart_error(err: MultipartError) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge(err.body_text())
    } else {
        AppError::BadRequest(err.body_text())
    }
}
