use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::adaptive::ProgressionError;
use crate::models::SessionEnvelope;
use crate::services::session_store::StoreError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid request body: {0}")]
    BadRequest(String),
    #[error("validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
    #[error("session {0} not found")]
    SessionNotFound(String),
    #[error(transparent)]
    Progression(#[from] ProgressionError),
    #[error("session {0} was updated concurrently")]
    Conflict(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::SessionNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Progression(ProgressionError::UnknownReview(_)) => StatusCode::NOT_FOUND,
            ApiError::Progression(_) | ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message shown to the learner. Internal details stay in the log.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::BadRequest(_) => "Dữ liệu gửi lên không hợp lệ.".to_string(),
            ApiError::Validation(_) => "Vui lòng kiểm tra lại thông tin đã nhập.".to_string(),
            ApiError::SessionNotFound(_) => {
                "Không tìm thấy bài kiểm tra. Em hãy bắt đầu lại nhé!".to_string()
            }
            ApiError::Progression(e) => e.user_message().to_string(),
            ApiError::Conflict(_) => {
                "Câu trả lời của em đang được xử lý, vui lòng đợi trong giây lát.".to_string()
            }
            ApiError::Internal(_) => "Đã có lỗi xảy ra. Vui lòng thử lại sau.".to_string(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => ApiError::SessionNotFound(id),
            StoreError::Conflict { id, .. } | StoreError::AlreadyExists(id) => {
                ApiError::Conflict(id)
            }
            other => ApiError::Internal(anyhow::Error::new(other)),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed: {:#}", self);
        } else {
            tracing::warn!("Request rejected ({}): {}", status.as_u16(), self);
        }
        (status, Json(SessionEnvelope::failure(self.user_message()))).into_response()
    }
}
