//! Metrics callback server
// (c) 2024 Ross Younger
//!
//! The player page POSTs its metrics as a JSON object when it has finished sampling.
//! Each body is stored as `<dir>/<label>.json`, where the label is whatever the driver
//! set through the [`CallbackHandle`] just before starting the browser session.

use std::{
    net::SocketAddr,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::{Context as _, Result};
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use serde_json::Value;
use tokio::{
    net::TcpListener,
    sync::{watch, Mutex, Notify},
    task::JoinHandle,
};
use tracing::{debug, error, info, warn};

use crate::util::fs::write_json;

/// Body sent back for every accepted callback
pub const RESPONSE_BODY: &str = "Hello, World! Here is a POST response";

/// Format of the timestamp labels used to name callback files
pub const LABEL_FORMAT: &str = "%Y%m%d-%H%M%S";

/// A label for the current local time
#[must_use]
pub fn timestamp_label() -> String {
    chrono::Local::now().format(LABEL_FORMAT).to_string()
}

#[derive(Debug)]
struct Shared {
    dir: PathBuf,
    expected: usize,
    label: watch::Sender<String>,
    /// Held for the whole of each request, so callbacks are processed one at a time
    written: Mutex<Vec<PathBuf>>,
    finished: Notify,
}

/// A callback listener, not yet bound
#[derive(Debug)]
pub struct CallbackServer {
    shared: Arc<Shared>,
}

impl CallbackServer {
    /// Creates a server which stores callbacks in `dir` and stops after `expected` of them
    #[must_use]
    pub fn new(dir: &Path, expected: usize) -> Self {
        let (label, _) = watch::channel(timestamp_label());
        Self {
            shared: Arc::new(Shared {
                dir: dir.to_path_buf(),
                expected,
                label,
                written: Mutex::new(Vec::new()),
                finished: Notify::new(),
            }),
        }
    }

    /// Sets the name (without extension) of the file the next callback is stored in
    pub fn set_label(&self, label: &str) {
        let _ = self.shared.label.send_replace(label.to_string());
    }

    fn router(&self) -> Router {
        Router::new()
            .route("/", post(receive).options(preflight))
            // A long session's metrics run to several megabytes
            .layer(DefaultBodyLimit::disable())
            .with_state(self.shared.clone())
    }

    /// Binds and starts serving in the background
    pub async fn start(self, addr: SocketAddr) -> Result<CallbackHandle> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("binding callback listener on {addr}"))?;
        let local_addr = listener.local_addr()?;
        info!("listening for metrics callbacks on {local_addr}");
        if self.shared.expected == 0 {
            self.shared.finished.notify_one();
        }

        let shared = self.shared.clone();
        let router = self.router();
        let task = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move { shared.finished.notified().await })
                .await
                .context("callback server terminated unexpectedly")
        });
        Ok(CallbackHandle {
            server: self,
            local_addr,
            task,
        })
    }
}

/// Control handle for a running [`CallbackServer`]
#[derive(Debug)]
pub struct CallbackHandle {
    server: CallbackServer,
    local_addr: SocketAddr,
    task: JoinHandle<Result<()>>,
}

impl CallbackHandle {
    /// Sets the name (without extension) of the file the next callback is stored in
    pub fn set_label(&self, label: &str) {
        self.server.set_label(label);
    }

    /// The address actually bound
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Waits for the expected number of callbacks, or until `limit` expires.
    /// Returns the files written.
    pub async fn wait(mut self, limit: Duration) -> Result<Vec<PathBuf>> {
        let shared = self.server.shared.clone();
        if let Ok(joined) = tokio::time::timeout(limit, &mut self.task).await {
            joined.context("callback server task failed")??;
        } else {
            let received = shared.written.lock().await.len();
            warn!(
                "timed out waiting for metrics callbacks ({received} of {} received)",
                shared.expected
            );
            shared.finished.notify_one();
            self.task
                .await
                .context("callback server task failed")??;
        }
        let written = std::mem::take(&mut *shared.written.lock().await);
        Ok(written)
    }

    /// Shuts the server down without waiting for outstanding callbacks.
    /// The listening socket is closed when this returns.
    pub async fn stop(self) {
        self.server.shared.finished.notify_one();
        match self.task.await {
            Ok(Ok(())) => debug!("callback server stopped"),
            Ok(Err(e)) => warn!("callback server: {e:#}"),
            Err(e) => warn!("callback server task failed: {e}"),
        }
    }
}

/// The player page posts cross-origin, so the browser may ask first
async fn preflight() -> impl IntoResponse {
    (
        StatusCode::NO_CONTENT,
        [
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
            (header::ACCESS_CONTROL_ALLOW_METHODS, "POST"),
            (header::ACCESS_CONTROL_ALLOW_HEADERS, "content-type"),
        ],
    )
}

async fn receive(State(shared): State<Arc<Shared>>, body: Bytes) -> Response {
    let value: Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            warn!("rejected callback with unparseable body: {e}");
            return (StatusCode::BAD_REQUEST, format!("invalid JSON: {e}")).into_response();
        }
    };

    let mut written = shared.written.lock().await;
    if written.len() >= shared.expected {
        warn!("ignoring callback beyond the expected {}", shared.expected);
        return (StatusCode::SERVICE_UNAVAILABLE, "no more callbacks expected").into_response();
    }
    let label = shared.label.borrow().clone();
    let path = shared.dir.join(format!("{label}.json"));
    if let Err(e) = write_json(&path, &value).await {
        error!("{e:#}");
        return (StatusCode::INTERNAL_SERVER_ERROR, "could not store metrics").into_response();
    }
    debug!("stored callback as {}", path.display());
    written.push(path);
    if written.len() >= shared.expected {
        shared.finished.notify_one();
    }

    (
        [
            (header::CONTENT_TYPE, "text/html"),
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
        ],
        RESPONSE_BODY,
    )
        .into_response()
}
