//! Server- and database-level endpoints.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use couchspawn_core::adapter::Adapter;

use crate::error::ApiResult;
use crate::query::{self, Params};
use crate::state::ServerState;

/// CouchDB version the emulator reports to clients.
pub const COUCHDB_VERSION: &str = "3.3.3";

pub async fn welcome() -> impl IntoResponse {
    Json(json!({
        "couchdb": "Welcome",
        "version": COUCHDB_VERSION,
        "vendor": {
            "name": "couchspawn",
            "version": env!("CARGO_PKG_VERSION"),
        },
    }))
}

pub async fn all_dbs(State(state): State<ServerState>) -> impl IntoResponse {
    Json(state.names().await)
}

pub async fn uuids(Query(params): Query<Params>) -> ApiResult<impl IntoResponse> {
    let count = query::number(&params, "count")?.unwrap_or(1).min(1000);
    let uuids: Vec<String> = (0..count)
        .map(|_| uuid::Uuid::new_v4().simple().to_string())
        .collect();
    Ok(Json(json!({ "uuids": uuids })))
}

pub async fn create_db(
    State(state): State<ServerState>,
    Path(db): Path<String>,
) -> ApiResult<impl IntoResponse> {
    state.create(&db).await?;
    Ok((StatusCode::CREATED, Json(json!({ "ok": true }))))
}

pub async fn db_info(
    State(state): State<ServerState>,
    Path(db): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let database = state.get(&db).await?;
    Ok(Json(database.adapter.info().await?))
}

pub async fn delete_db(
    State(state): State<ServerState>,
    Path(db): Path<String>,
) -> ApiResult<impl IntoResponse> {
    state.delete(&db).await?;
    Ok(Json(json!({ "ok": true })))
}

pub async fn ensure_full_commit(
    State(state): State<ServerState>,
    Path(db): Path<String>,
) -> ApiResult<impl IntoResponse> {
    state.get(&db).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "ok": true, "instance_start_time": "0" })),
    ))
}
