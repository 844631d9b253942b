//! Error Handling Module
//!
//! Provides type-safe error handling with proper HTTP status code mapping.
//! Uses thiserror for domain errors and integrates with tracing for structured logging.
//!
//! ```text
//! StoreError ──▶ EngineError ──▶ ApiError ──▶ HTTP response
//!  (storage)      (check-in core)   (axum)
//! ```

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// 저장소 계층 에러
#[derive(Debug, Error)]
pub enum StoreError {
    /// 낙관적 버전 검사 실패 (다른 writer가 먼저 사용자 상태를 변경함)
    #[error("concurrent update detected for user {0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// 체크인 엔진 에러
///
/// - `Validation`: 상태 변경 전에 거부됨, 입력을 고쳐 재요청 가능
/// - `NotFound`: 상태 변경 없음
/// - `ConcurrencyConflict`: 재시도 한도 초과, 부분 적용 없음
/// - `Storage`: 그 외 내부 장애
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("concurrent update for user {user_id} after {attempts} attempts")]
    ConcurrencyConflict { user_id: String, attempts: u32 },

    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl EngineError {
    pub fn validation(msg: impl Into<String>) -> Self {
        EngineError::Validation(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        EngineError::NotFound(what.into())
    }
}

/// API 에러 타입
///
/// 각 에러 variant는 적절한 HTTP 상태 코드에 매핑됨
/// 민감한 내부 정보는 클라이언트에 노출하지 않음
#[derive(Debug, Error)]
pub enum ApiError {
    // ============ 400 Bad Request ============
    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Validation failed: {0}")]
    ValidationError(String),

    // ============ 404 Not Found ============
    #[error("Resource not found: {0}")]
    NotFound(String),

    // ============ 409 Conflict ============
    #[error("Concurrent update: {0}")]
    Conflict(String),

    // ============ 500 Internal Server Error ============
    #[error("Database error: {0}")]
    DatabaseError(String),
}

/// API 에러 응답 구조
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = match &self {
            // 4xx 클라이언트 에러
            ApiError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                "BAD_REQUEST",
                msg.clone(),
                None,
            ),
            ApiError::ValidationError(msg) => (
                StatusCode::BAD_REQUEST,
                "VALIDATION_ERROR",
                "Validation failed".to_string(),
                Some(msg.clone()),
            ),
            ApiError::NotFound(resource) => (
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                format!("{} not found", resource),
                None,
            ),
            ApiError::Conflict(msg) => (
                StatusCode::CONFLICT,
                "CONCURRENCY_CONFLICT",
                "Concurrent update, please retry".to_string(),
                Some(msg.clone()),
            ),

            // 5xx 서버 에러
            ApiError::DatabaseError(_) => {
                // 내부 에러는 클라이언트에 상세 정보 노출 안 함
                tracing::error!("Database error: {:?}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "Database error occurred".to_string(),
                    None,
                )
            }
        };

        let body = ErrorResponse {
            error: message,
            code: code.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// 엔진 에러를 ApiError로 변환
impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Validation(msg) => ApiError::ValidationError(msg),
            EngineError::NotFound(what) => ApiError::NotFound(what),
            e @ EngineError::ConcurrencyConflict { .. } => {
                tracing::warn!(error = %e, "check-in gave up after retries");
                ApiError::Conflict(e.to_string())
            }
            EngineError::Storage(StoreError::Conflict(user_id)) => {
                ApiError::Conflict(format!("user {}", user_id))
            }
            EngineError::Storage(StoreError::Database(e)) => {
                tracing::error!("SQLx error: {:?}", e);
                ApiError::DatabaseError(e.to_string())
            }
        }
    }
}

/// 요청 본문 파싱 실패 (필드 누락, 타입 불일치, 잘못된 JSON)
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::ValidationError(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_error_status_mapping() {
        let cases = [
            (EngineError::validation("duration"), StatusCode::BAD_REQUEST),
            (EngineError::not_found("entry"), StatusCode::NOT_FOUND),
            (
                EngineError::ConcurrencyConflict {
                    user_id: "42".to_string(),
                    attempts: 3,
                },
                StatusCode::CONFLICT,
            ),
            (
                EngineError::Storage(StoreError::Database(sqlx::Error::PoolTimedOut)),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            let response = ApiError::from(err).into_response();
            assert_eq!(response.status(), expected);
        }
    }

    #[test]
    fn test_conflict_message_names_user() {
        let err = EngineError::ConcurrencyConflict {
            user_id: "10001".to_string(),
            attempts: 3,
        };
        assert!(err.to_string().contains("10001"));
        assert!(err.to_string().contains("3 attempts"));
    }
}
