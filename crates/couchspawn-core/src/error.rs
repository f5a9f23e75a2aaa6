use thiserror::Error;

/// Failures of an emulated database, one variant per CouchDB error kind.
#[derive(Debug, Error)]
pub enum CouchError {
    /// `reason` is CouchDB's: `"missing"`, `"deleted"`, or a message.
    #[error("not_found: {0}")]
    NotFound(String),

    #[error("conflict: the revision is not a current leaf")]
    Conflict,

    #[error("bad_request: {0}")]
    BadRequest(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("invalid rev `{0}`")]
    InvalidRev(String),

    #[error("document id is empty")]
    MissingId,

    #[error("database `{0}` already exists")]
    DatabaseExists(String),

    #[error("illegal database name `{0}`")]
    IllegalDatabaseName(String),

    #[error("storage: {0}")]
    DatabaseError(String),

    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CouchError>;
