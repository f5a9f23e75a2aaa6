use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use couchspawn_core::document::DocResult;
use couchspawn_core::error::CouchError;

/// A `CouchError` rendered as CouchDB's `{"error", "reason"}` body.
#[derive(Debug)]
pub struct ApiError(pub CouchError);

impl From<CouchError> for ApiError {
    fn from(e: CouchError) -> Self {
        ApiError(e)
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        ApiError(CouchError::Json(e))
    }
}

impl ApiError {
    pub fn db_not_found() -> Self {
        ApiError(CouchError::NotFound("Database does not exist.".into()))
    }

    /// Turn a failed per-document write result into the error a
    /// single-document endpoint responds with.
    pub fn from_doc_result(result: DocResult) -> Self {
        let reason = result.reason.unwrap_or_default();
        ApiError(match result.error.as_deref() {
            Some("conflict") => CouchError::Conflict,
            Some("not_found") => CouchError::NotFound(reason),
            Some("forbidden") => CouchError::Forbidden(reason),
            _ => CouchError::BadRequest(reason),
        })
    }

    fn parts(&self) -> (StatusCode, &'static str, String) {
        match &self.0 {
            CouchError::NotFound(reason) => (StatusCode::NOT_FOUND, "not_found", reason.clone()),
            CouchError::Conflict => (
                StatusCode::CONFLICT,
                "conflict",
                "Document update conflict.".into(),
            ),
            CouchError::BadRequest(reason) => {
                (StatusCode::BAD_REQUEST, "bad_request", reason.clone())
            }
            CouchError::Forbidden(reason) => (StatusCode::FORBIDDEN, "forbidden", reason.clone()),
            CouchError::InvalidRev(_) => (
                StatusCode::BAD_REQUEST,
                "bad_request",
                "Invalid rev format".into(),
            ),
            CouchError::MissingId => (
                StatusCode::BAD_REQUEST,
                "bad_request",
                "Document id must not be empty".into(),
            ),
            CouchError::DatabaseExists(_) => (
                StatusCode::PRECONDITION_FAILED,
                "file_exists",
                "The database could not be created, the file already exists.".into(),
            ),
            CouchError::IllegalDatabaseName(name) => (
                StatusCode::BAD_REQUEST,
                "illegal_database_name",
                format!(
                    "Name: '{name}'. Only lowercase characters (a-z), digits (0-9), and any of \
                     the characters _, $, (, ), +, -, and / are allowed. Must begin with a letter."
                ),
            ),
            CouchError::Json(e) => (StatusCode::BAD_REQUEST, "bad_request", e.to_string()),
            CouchError::DatabaseError(reason) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_server_error",
                reason.clone(),
            ),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, reason) = self.parts();
        if status.is_server_error() {
            tracing::error!(%error, %reason, "request failed");
        }
        (
            status,
            Json(serde_json::json!({ "error": error, "reason": reason })),
        )
            .into_response()
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes() {
        let cases = [
            (CouchError::NotFound("missing".into()), StatusCode::NOT_FOUND),
            (CouchError::Conflict, StatusCode::CONFLICT),
            (
                CouchError::DatabaseExists("x".into()),
                StatusCode::PRECONDITION_FAILED,
            ),
            (
                CouchError::IllegalDatabaseName("X".into()),
                StatusCode::BAD_REQUEST,
            ),
        ];
        for (error, status) in cases {
            assert_eq!(ApiError(error).into_response().status(), status);
        }
    }

    #[test]
    fn doc_result_conflict_maps_to_409() {
        let failed = DocResult::failed("a".into(), &CouchError::Conflict);
        let response = ApiError::from_doc_result(failed).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }
}
