use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::info;

pub const MISSING_FULL_SHOT_MESSAGE: &str = "Vui lòng tải ảnh toàn cảnh sản phẩm.";
pub const GENERATION_FAILED_MESSAGE: &str =
    "Đã xảy ra lỗi khi tạo concept. Vui lòng kiểm tra API Key hoặc thử lại.";
pub const IMAGE_FAILED_MESSAGE: &str = "Không thể tạo ảnh. Vui lòng thử lại.";

/// The concept call failed, returned nothing, or returned something that isn't three valid concepts.
#[derive(Debug, Error)]
#[error("concept generation failed: {0}")]
pub struct GenerationError(pub String);

impl GenerationError {
    pub fn display_message(&self) -> &'static str {
        GENERATION_FAILED_MESSAGE
    }
}

/// A single pose's image call failed or produced no image.
#[derive(Debug, Error)]
#[error("image generation failed: {0}")]
pub struct ImageGenerationError(pub String);

impl ImageGenerationError {
    pub fn display_message(&self) -> &'static str {
        IMAGE_FAILED_MESSAGE
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ApiError {
    #[error("studio session not found")]
    SessionNotFound,
    #[error("{}", MISSING_FULL_SHOT_MESSAGE)]
    MissingFullShot,
    #[error("a concept generation is already running")]
    GenerationInProgress,
    #[error("this pose image is already being generated")]
    PoseInProgress,
    #[error("no concepts have been generated yet")]
    NoConcepts,
    #[error("the concepts changed before this pose image arrived; it was discarded")]
    PoseDiscarded,
    #[error("concept {0} does not exist")]
    ConceptOutOfRange(usize),
    #[error("pose {0} does not exist")]
    PoseOutOfRange(usize),
    #[error("no image for {0}")]
    ImageNotFound(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::SessionNotFound | ApiError::ImageNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::MissingFullShot => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::GenerationInProgress
            | ApiError::PoseInProgress
            | ApiError::NoConcepts
            | ApiError::PoseDiscarded => {
                StatusCode::CONFLICT
            }
            ApiError::ConceptOutOfRange(_)
            | ApiError::PoseOutOfRange(_)
            | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("{}", self);
        } else {
            info!(%status, "{}", self);
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
