use std::convert::Infallible;
use std::fmt::Display;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::body::Body;
use axum::extract::{Multipart, State};
use axum::http::header::{HeaderName, CACHE_CONTROL, CONNECTION, CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use log::{error, info, warn};
use parking_lot::RwLock;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

use stocksync_lib::spreadsheet::Inventory;
use stocksync_lib::sync::SyncSession;

use crate::options::Config;
use crate::ExitCode;

/// Name of the multipart field carrying the spreadsheet
const UPLOAD_FIELD: &str = "file";

/// Frames buffered between a running stream and its HTTP body
const FRAME_BUFFER: usize = 16;

/// Serve the upload and analysis endpoints until Ctrl-C
pub(crate) async fn serve(config: &Config) -> Result<ExitCode> {
    let state = Arc::new(AppState::new(config.session()?));
    let listener = TcpListener::bind(config.listen)
        .await
        .with_context(|| format!("Cannot listen on {}", config.listen))?;
    info!("Listening on http://{}", listener.local_addr()?);

    let shutdown = state.shutdown.clone();
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Cannot listen for Ctrl-C: {e}");
            }
            info!("Shutting down");
            shutdown.cancel();
        })
        .await
        .context("HTTP server failed")?;
    Ok(ExitCode::Success)
}

/// State shared by all requests
#[derive(Debug)]
pub(crate) struct AppState {
    session: SyncSession,
    /// Most recently uploaded spreadsheet
    inventory: RwLock<Option<Arc<Inventory>>>,
    /// Ends running streams when the server shuts down
    shutdown: CancellationToken,
}

impl AppState {
    pub(crate) fn new(session: SyncSession) -> Self {
        Self {
            session,
            inventory: RwLock::new(None),
            shutdown: CancellationToken::new(),
        }
    }
}

pub(crate) fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/upload", post(upload))
        .route("/analysis", get(analysis))
        .with_state(state)
}

/// Failure reported in the response envelope.
///
/// The HTTP status is always 200; clients look at `status` in the body.
#[derive(Debug)]
struct ApiError {
    err: String,
    msg: &'static str,
}

impl ApiError {
    fn new(msg: &'static str, err: impl Display) -> Self {
        Self {
            err: err.to_string(),
            msg,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        warn!("{}: {}", self.msg, self.err);
        Json(json!({ "status": 1, "err": self.err, "msg": self.msg })).into_response()
    }
}

fn success() -> Json<serde_json::Value> {
    Json(json!({ "status": 0, "data": null }))
}

async fn upload(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<serde_json::Value>, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::new("Invalid upload", e))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::new("Invalid upload", e))?;
        let inventory = Inventory::from_xlsx(bytes.to_vec())
            .map_err(|e| ApiError::new("Cannot read spreadsheet", e))?;
        info!(
            "Uploaded inventory with {} rows for {} item numbers",
            inventory.len(),
            inventory.item_count()
        );
        *state.inventory.write() = Some(Arc::new(inventory));
        return Ok(success());
    }
    Err(ApiError::new(
        "Invalid upload",
        format!("missing form field `{UPLOAD_FIELD}`"),
    ))
}

async fn analysis(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let inventory = state
        .inventory
        .read()
        .clone()
        .ok_or_else(|| ApiError::new("No inventory", "upload a spreadsheet first"))?;
    let tasks = state
        .session
        .prepare(&inventory)
        .await
        .map_err(|e| ApiError::new("Cannot fetch products and stores", e))?;

    // The body owns the receiver; a client disconnect drops it and the
    // stream sees a closed sink.
    let (sink, frames) = mpsc::channel(FRAME_BUFFER);
    let session = state.session.clone();
    let shutdown = state.shutdown.clone();
    tokio::spawn(async move {
        tokio::select! {
            end = session.stream(tasks, sink) => match end {
                Ok(end) => info!("Analysis stream ended: {end:?}"),
                Err(e) => error!("Analysis stream failed: {e}"),
            },
            () = shutdown.cancelled() => info!("Analysis stream cancelled by shutdown"),
        }
    });

    let body = Body::from_stream(ReceiverStream::new(frames).map(Ok::<_, Infallible>));
    Ok((
        [
            (CONTENT_TYPE, "text/event-stream"),
            (CACHE_CONTROL, "no-cache"),
            (CONNECTION, "keep-alive"),
            (HeaderName::from_static("x-accel-buffering"), "no"),
        ],
        body,
    )
        .into_response())
}
