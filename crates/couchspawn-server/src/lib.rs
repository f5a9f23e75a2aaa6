//! A CouchDB-compatible HTTP emulator backed by in-memory databases.
//!
//! It speaks enough of the CouchDB 3.x API for a PouchDB-style client to
//! create databases, write and read documents, and replicate in both
//! directions: `_bulk_docs`, `_bulk_get`, `_revs_diff`, `_changes`, and
//! `_local` checkpoints.
//!
//! ```no_run
//! # async fn run() -> std::io::Result<()> {
//! let app = couchspawn_server::router(couchspawn_server::ServerState::new());
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:5984").await?;
//! axum::serve(listener, app).await
//! # }
//! ```

pub mod changes;
pub mod db;
pub mod docs;
pub mod error;
pub mod query;
pub mod state;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post, put};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use db::COUCHDB_VERSION;
pub use error::{ApiError, ApiResult};
pub use state::ServerState;

/// Replication batches can be large; CouchDB's own default is far higher.
const MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

/// Build the CouchDB route table over `state`.
///
/// Database routes are registered with and without a trailing slash since
/// clients address databases as `http://host/db/`.
pub fn router(state: ServerState) -> Router {
    let database = || {
        put(db::create_db)
            .get(db::db_info)
            .delete(db::delete_db)
            .post(docs::post_doc)
    };

    Router::new()
        .route("/", get(db::welcome))
        .route("/_all_dbs", get(db::all_dbs))
        .route("/_uuids", get(db::uuids))
        .route("/{db}", database())
        .route("/{db}/", database())
        .route(
            "/{db}/_all_docs",
            get(docs::all_docs_get).post(docs::all_docs_post),
        )
        .route("/{db}/_bulk_docs", post(docs::bulk_docs))
        .route("/{db}/_bulk_get", post(docs::bulk_get))
        .route("/{db}/_revs_diff", post(docs::revs_diff))
        .route(
            "/{db}/_changes",
            get(changes::changes_get).post(changes::changes_post),
        )
        .route("/{db}/_ensure_full_commit", post(db::ensure_full_commit))
        .route(
            "/{db}/_local/{id}",
            get(docs::get_local)
                .put(docs::put_local)
                .delete(docs::delete_local),
        )
        .route(
            "/{db}/_design/{id}",
            get(docs::get_design)
                .put(docs::put_design)
                .delete(docs::delete_design),
        )
        .route(
            "/{db}/{docid}",
            get(docs::get_doc).put(docs::put_doc).delete(docs::delete_doc),
        )
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(CorsLayer::very_permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
