//! Response envelopes and error mapping.
//!
//! Success: `{"status":"success","data":…}`.
//! Failure: `{"status":"fail","code":…,"message":…}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use tracing::error;

use itrack_core::PipelineError;

#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub status: &'static str,
    pub data: T,
}

pub fn success<T: Serialize>(data: T) -> Json<Envelope<T>> {
    Json(Envelope {
        status: "success",
        data,
    })
}

pub fn created<T: Serialize>(data: T) -> (StatusCode, Json<Envelope<T>>) {
    (StatusCode::CREATED, success(data))
}

/// A pipeline failure on its way out to a client.
#[derive(Debug)]
pub struct ApiError(pub PipelineError);

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self.0 {
            PipelineError::Authentication(_) => StatusCode::UNAUTHORIZED,
            PipelineError::Authorization(_) => StatusCode::FORBIDDEN,
            PipelineError::Validation(_) => StatusCode::BAD_REQUEST,
            PipelineError::StateConflict(_) => StatusCode::CONFLICT,
            PipelineError::NotFound(_) => StatusCode::NOT_FOUND,
            PipelineError::Storage(_) | PipelineError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<PipelineError> for ApiError {
    fn from(e: PipelineError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = %self.0, "request failed");
        }
        let body = json!({
            "status": "fail",
            "code": self.0.kind(),
            "message": self.0.public_message(),
        });
        (status, Json(body)).into_response()
    }
}

/// Parse a JSON request body. Malformed bodies are validation failures
/// and use the regular failure envelope.
pub fn parse_json<T: DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(body)
        .map_err(|e| ApiError(PipelineError::Validation(format!("invalid request body: {e}"))))
}

/// Like [`parse_json`], but an empty body yields the default.
pub fn parse_optional_json<T: DeserializeOwned + Default>(body: &[u8]) -> Result<T, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    parse_json(body)
}
