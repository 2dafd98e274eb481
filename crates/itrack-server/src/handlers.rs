//! Route handlers under `/api/v1/internships`.
//!
//! Bodies are read as raw bytes and parsed here so that malformed JSON
//! gets the same failure envelope as every other error.

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use itrack_core::ids::{PrincipalId, RecordId};
use itrack_core::ports::Artifact;
use itrack_core::{InternshipDetails, PipelineError};
use itrack_pipeline::{AmendRequest, ArtifactKind, SubmitRequest, Upload};

use crate::extract::Authenticated;
use crate::response::{created, parse_json, parse_optional_json, success, ApiError};
use crate::state::AppState;

type ApiResult<T> = Result<T, ApiError>;

/// A document sent inline as base64.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileBody {
    pub file_name: String,
    pub mime_type: String,
    pub content_base64: String,
}

impl FileBody {
    fn decode(self) -> Result<Upload, ApiError> {
        let bytes = STANDARD
            .decode(self.content_base64.trim())
            .map_err(|e| ApiError(PipelineError::Validation(format!("invalid base64 content: {e}"))))?;
        Ok(Upload {
            bytes,
            mime_type: self.mime_type,
            file_name: self.file_name,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterBody {
    #[serde(flatten)]
    pub details: InternshipDetails,
    pub offer_letter: Option<FileBody>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AmendBody {
    #[serde(flatten)]
    pub details: InternshipDetails,
    pub offer_letter: Option<FileBody>,
    pub version: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ApproveBody {
    pub comment: Option<String>,
    pub version: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReasonBody {
    #[serde(default)]
    pub reason: String,
    pub version: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct VersionBody {
    pub version: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct CompletionBody {
    pub certificate: FileBody,
    pub version: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    #[serde(default = "default_kind")]
    pub kind: ArtifactKind,
}

fn default_kind() -> ArtifactKind {
    ArtifactKind::OfferLetter
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadResponse {
    pub file_name: String,
    pub mime_type: String,
    pub content_base64: String,
}

impl From<Artifact> for DownloadResponse {
    fn from(a: Artifact) -> Self {
        Self {
            file_name: a.logical_name,
            mime_type: a.mime_type,
            content_base64: STANDARD.encode(&a.bytes),
        }
    }
}

/// POST /register
pub async fn register(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    let body: RegisterBody = parse_json(&body)?;
    let request = SubmitRequest {
        details: body.details,
        offer_letter: body.offer_letter.map(FileBody::decode).transpose()?,
    };
    let record = state.service.submit(&principal, request).await?;
    Ok(created(record))
}

/// GET /{id}
pub async fn view(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path(id): Path<RecordId>,
) -> ApiResult<impl IntoResponse> {
    Ok(success(state.service.view(&principal, &id).await?))
}

/// PUT /{id}
pub async fn amend(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path(id): Path<RecordId>,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    let body: AmendBody = parse_json(&body)?;
    let request = AmendRequest {
        details: body.details,
        offer_letter: body.offer_letter.map(FileBody::decode).transpose()?,
    };
    let record = state
        .service
        .amend(&principal, &id, request, body.version)
        .await?;
    Ok(success(record))
}

/// DELETE /{id}?version=N
pub async fn delete(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path(id): Path<RecordId>,
    Query(query): Query<VersionBody>,
) -> ApiResult<impl IntoResponse> {
    let record = state.service.delete(&principal, &id, query.version).await?;
    Ok(success(record))
}

/// GET /view/all
pub async fn list(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
) -> ApiResult<impl IntoResponse> {
    Ok(success(state.service.list(&principal).await?))
}

/// GET /student/{student_id}
pub async fn list_for_student(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path(student_id): Path<PrincipalId>,
) -> ApiResult<impl IntoResponse> {
    Ok(success(
        state.service.list_for_student(&principal, &student_id).await?,
    ))
}

/// POST /approval/{id}
pub async fn approve(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path(id): Path<RecordId>,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    let body: ApproveBody = parse_optional_json(&body)?;
    let record = state
        .service
        .approve(&principal, &id, body.comment.as_deref(), body.version)
        .await?;
    Ok(success(record))
}

/// POST /send-back/{id}
pub async fn send_back(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path(id): Path<RecordId>,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    let body: ReasonBody = parse_optional_json(&body)?;
    let record = state
        .service
        .send_back(&principal, &id, &body.reason, body.version)
        .await?;
    Ok(success(record))
}

/// POST /reject/{id}
pub async fn reject(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path(id): Path<RecordId>,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    let body: ReasonBody = parse_optional_json(&body)?;
    let record = state
        .service
        .reject(&principal, &id, &body.reason, body.version)
        .await?;
    Ok(success(record))
}

/// POST /resubmit/{id}
pub async fn resubmit(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path(id): Path<RecordId>,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    let body: VersionBody = parse_optional_json(&body)?;
    let record = state.service.resubmit(&principal, &id, body.version).await?;
    Ok(success(record))
}

/// POST /completion-update/{id}
pub async fn register_completion(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path(id): Path<RecordId>,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    let body: CompletionBody = parse_json(&body)?;
    let certificate = body.certificate.decode()?;
    let record = state
        .service
        .register_completion(&principal, &id, certificate, body.version)
        .await?;
    Ok(success(record))
}

/// GET /approval-status/{id}
pub async fn approval_status(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path(id): Path<RecordId>,
) -> ApiResult<impl IntoResponse> {
    Ok(success(state.service.status(&principal, &id).await?))
}

/// GET /check
pub async fn check(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
) -> ApiResult<impl IntoResponse> {
    Ok(success(state.service.my_statuses(&principal).await?))
}

/// GET /download-file/{id}?kind=offer_letter|certificate
pub async fn download(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path(id): Path<RecordId>,
    Query(query): Query<DownloadQuery>,
) -> ApiResult<impl IntoResponse> {
    let artifact = state.service.download(&principal, &id, query.kind).await?;
    Ok(success(DownloadResponse::from(artifact)))
}
