//! Admin HTTP surface.
//!
//! Serves Prometheus metrics, the registered watchers' status, and a small
//! editing API over the configuration records. Every edit lands in the
//! durable store and therefore reaches the manager as a change
//! notification.


use std::collections::BTreeSet;
use std::convert::Infallible;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;
use tokio::sync::watch;
use tracing::error;
use tracing::info;
use warp::http::StatusCode;
use warp::reply::Response;
use warp::Filter;
use warp::Rejection;
use warp::Reply;

use crate::gather_metrics;
use crate::ConfigSource;
use crate::Error;
use crate::Result;
use crate::SinkTarget;
use crate::SledConfigSource;
use crate::SourceRecord;
use crate::WatcherRegistry;

/// Collaborators behind the admin routes
#[derive(Clone)]
pub struct AdminState {
    pub records: Arc<SledConfigSource>,
    pub registry: WatcherRegistry,
}

/// Body of `PUT /sources/{key}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceBody {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub accounts: BTreeSet<String>,
    pub sink_target: SinkTarget,
}

fn default_enabled() -> bool {
    true
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

pub fn routes(state: AdminState) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let metrics = warp::path!("metrics")
        .and(warp::get())
        .and_then(metrics_handler);

    let watchers = warp::path!("watchers")
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(list_watchers);

    let list = warp::path!("sources")
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(list_sources);

    let put = warp::path!("sources" / String)
        .and(warp::put())
        .and(warp::body::content_length_limit(64 * 1024))
        .and(warp::body::json())
        .and(with_state(state.clone()))
        .and_then(put_source);

    let delete = warp::path!("sources" / String)
        .and(warp::delete())
        .and(with_state(state))
        .and_then(delete_source);

    metrics.or(watchers).or(list).or(put).or(delete)
}

/// Serves [`routes`] on `0.0.0.0:port` until `shutdown` fires
pub async fn start_server(
    port: u16,
    state: AdminState,
    mut shutdown: watch::Receiver<()>,
) -> Result<()> {
    let (addr, server) = warp::serve(routes(state))
        .try_bind_with_graceful_shutdown(([0, 0, 0, 0], port), async move {
            let _ = shutdown.changed().await;
        })
        .map_err(|e| Error::Server(format!("bind admin server on port {}: {}", port, e)))?;

    info!(%addr, "admin server listening");
    server.await;
    info!("admin server stopped");
    Ok(())
}

fn with_state(state: AdminState) -> impl Filter<Extract = (AdminState,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

async fn metrics_handler() -> std::result::Result<impl Reply, Rejection> {
    Ok(gather_metrics())
}

async fn list_watchers(state: AdminState) -> std::result::Result<impl Reply, Rejection> {
    Ok(warp::reply::json(&state.registry.snapshot()))
}

async fn list_sources(state: AdminState) -> std::result::Result<Response, Rejection> {
    match state.records.list_all().await {
        Ok(records) => Ok(warp::reply::json(&records).into_response()),
        Err(e) => Ok(internal_error(e)),
    }
}

async fn put_source(
    key: String,
    body: SourceBody,
    state: AdminState,
) -> std::result::Result<Response, Rejection> {
    if key.trim().is_empty() {
        return Ok(error_reply(StatusCode::BAD_REQUEST, "source key cannot be empty".to_string()));
    }

    let record = SourceRecord {
        key,
        enabled: body.enabled,
        accounts: body.accounts,
        sink_target: body.sink_target,
    };
    match state.records.put_record(&record) {
        Ok(previous) => {
            info!(key = %record.key, replaced = previous.is_some(), "source record stored");
            let status = if previous.is_some() {
                StatusCode::OK
            } else {
                StatusCode::CREATED
            };
            Ok(warp::reply::with_status(warp::reply::json(&record), status).into_response())
        }
        Err(e) => Ok(internal_error(e)),
    }
}

async fn delete_source(
    key: String,
    state: AdminState,
) -> std::result::Result<Response, Rejection> {
    match state.records.remove_record(&key) {
        Ok(Some(_)) => {
            info!(%key, "source record removed");
            Ok(StatusCode::NO_CONTENT.into_response())
        }
        Ok(None) => Ok(error_reply(StatusCode::NOT_FOUND, format!("no source record {:?}", key))),
        Err(e) => Ok(internal_error(e)),
    }
}

fn internal_error(e: Error) -> Response {
    error!("admin request failed: {:?}", e);
    error_reply(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

fn error_reply(
    status: StatusCode,
    error: String,
) -> Response {
    warp::reply::with_status(warp::reply::json(&ErrorBody { error }), status).into_response()
}
