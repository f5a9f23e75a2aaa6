//! `_changes`: normal, longpoll, and continuous feeds.

use std::convert::Infallible;
use std::time::Duration;

use axum::Json;
use axum::body::{Body, Bytes};
use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use couchspawn_changes::{ContinuousFeed, spawn_feed, wait_for_changes};
use couchspawn_core::adapter::Adapter;
use couchspawn_core::document::{ChangesOptions, ChangesStyle, Seq};
use couchspawn_core::error::CouchError;

use crate::error::ApiResult;
use crate::query::{self, Params};
use crate::state::{Database, ServerState};

/// CouchDB's default `timeout` for longpoll and continuous feeds.
const DEFAULT_FEED_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Feed {
    Normal,
    Longpoll,
    Continuous,
}

struct ChangesRequest {
    feed: Feed,
    opts: ChangesOptions,
    since_now: bool,
    timeout: Duration,
    heartbeat: Option<Duration>,
}

impl ChangesRequest {
    fn from_params(params: &Params) -> ApiResult<Self> {
        let feed = match params.get("feed").map(String::as_str) {
            None | Some("normal") => Feed::Normal,
            Some("longpoll") => Feed::Longpoll,
            Some("continuous") | Some("eventsource") => Feed::Continuous,
            Some(other) => {
                return Err(CouchError::BadRequest(format!("Invalid feed: {other}")).into());
            }
        };

        let since = params.get("since").map(String::as_str).unwrap_or("0");
        let style = match params.get("style").map(String::as_str) {
            Some("all_docs") => ChangesStyle::AllDocs,
            _ => ChangesStyle::MainOnly,
        };
        // `heartbeat=true` means CouchDB's default interval.
        let heartbeat = match params.get("heartbeat").map(String::as_str) {
            None | Some("false") => None,
            Some("true") => Some(Duration::from_secs(60)),
            Some(_) => query::number(params, "heartbeat")?.map(Duration::from_millis),
        };

        Ok(Self {
            feed,
            opts: ChangesOptions {
                since: Seq::from_query(since),
                limit: query::number(params, "limit")?,
                descending: query::flag(params, "descending"),
                include_docs: query::flag(params, "include_docs"),
                style,
                doc_ids: query::json_list(params, "doc_ids")?,
            },
            since_now: since == "now",
            timeout: query::number(params, "timeout")?
                .map_or(DEFAULT_FEED_TIMEOUT, Duration::from_millis),
            heartbeat,
        })
    }
}

async fn respond(db: Database, mut request: ChangesRequest) -> ApiResult<Response> {
    if request.since_now {
        request.opts.since = db.adapter.info().await?.update_seq;
    }

    match request.feed {
        Feed::Normal => Ok(Json(db.adapter.changes(request.opts).await?).into_response()),
        Feed::Longpoll => {
            let response = wait_for_changes(
                db.adapter.as_ref(),
                db.changes.subscribe(),
                request.opts,
                request.timeout,
            )
            .await?;
            Ok(Json(response).into_response())
        }
        Feed::Continuous => Ok(continuous(db, request)),
    }
}

/// Newline-delimited change rows until the client goes away, the limit is
/// reached, or the feed sits idle for `timeout` without heartbeats.
fn continuous(db: Database, request: ChangesRequest) -> Response {
    let feed = ContinuousFeed::new(
        db.adapter.clone(),
        db.changes.subscribe(),
        request.opts.clone(),
    );
    let (mut events, guard) = spawn_feed(feed);

    let (tx, rx) = mpsc::channel::<Result<String, Infallible>>(64);
    let heartbeat = request.heartbeat;
    let timeout = request.timeout;
    let mut last_seq = request.opts.since;

    tokio::spawn(async move {
        let _guard = guard;
        let mut ticker = tokio::time::interval(heartbeat.unwrap_or(DEFAULT_FEED_TIMEOUT));
        ticker.tick().await;
        let idle = tokio::time::sleep(timeout);
        tokio::pin!(idle);

        loop {
            tokio::select! {
                event = events.recv() => {
                    let Some(event) = event else { break };
                    last_seq = event.seq.clone();
                    let line = match serde_json::to_string(&event) {
                        Ok(json) => json + "\n",
                        Err(e) => {
                            tracing::warn!(error = %e, "failed to encode change row");
                            continue;
                        }
                    };
                    if tx.send(Ok(line)).await.is_err() {
                        return;
                    }
                    idle.as_mut().reset(tokio::time::Instant::now() + timeout);
                }
                _ = ticker.tick(), if heartbeat.is_some() => {
                    if tx.send(Ok("\n".into())).await.is_err() {
                        return;
                    }
                }
                _ = &mut idle, if heartbeat.is_none() => break,
            }
        }

        let _ = tx
            .send(Ok(serde_json::json!({ "last_seq": last_seq }).to_string() + "\n"))
            .await;
    });

    (
        [(header::CONTENT_TYPE, "application/json")],
        Body::from_stream(ReceiverStream::new(rx)),
    )
        .into_response()
}

pub async fn changes_get(
    State(state): State<ServerState>,
    Path(db): Path<String>,
    Query(params): Query<Params>,
) -> ApiResult<Response> {
    let database = state.get(&db).await?;
    respond(database, ChangesRequest::from_params(&params)?).await
}

#[derive(Deserialize)]
struct ChangesBody {
    doc_ids: Option<Vec<String>>,
}

/// `POST /{db}/_changes` carries `doc_ids` in the body (`filter=_doc_ids`).
pub async fn changes_post(
    State(state): State<ServerState>,
    Path(db): Path<String>,
    Query(params): Query<Params>,
    body: Bytes,
) -> ApiResult<Response> {
    let database = state.get(&db).await?;
    let mut request = ChangesRequest::from_params(&params)?;
    let body: ChangesBody = serde_json::from_value(query::body_json(&body)?)?;
    if body.doc_ids.is_some() {
        request.opts.doc_ids = body.doc_ids;
    }
    respond(database, request).await
}
