//! HTTP bootstrap server
//!
//! Serves the page the sandbox navigates to and the bundle it reads its
//! settings from.

use super::shutdown::TeardownStep;
use crate::bridge::PageBundle;
use crate::utils::error::{AppError, AppResult};
use async_trait::async_trait;
use axum::extract::Request;
use axum::http::header;
use axum::middleware::{self, Next};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html>
  <head>
    <meta charset="utf-8">
    <title>call-recorder</title>
    <script src="/bundle.js"></script>
  </head>
  <body></body>
</html>
"#;

/// The running bootstrap server
pub struct HttpServer {
    local_addr: SocketAddr,
    stop: Mutex<Option<oneshot::Sender<()>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl HttpServer {
    /// Bind `127.0.0.1:port` and start serving. Port 0 picks a free port.
    pub async fn start(port: u16, bundle: &PageBundle) -> AppResult<Self> {
        let bundle_js = serde_json::to_string(bundle)?;
        let app = router(bundle_js);

        let listener = TcpListener::bind(("127.0.0.1", port))
            .await
            .map_err(|e| AppError::Server(format!("failed to bind port {port}: {e}")))?;
        let local_addr = listener.local_addr()?;

        let (stop, stopped) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = stopped.await;
                })
                .await;
            if let Err(e) = served {
                tracing::error!("HTTP server error: {}", e);
            }
        });

        tracing::info!("Listening on http://{}", local_addr);
        Ok(Self {
            local_addr,
            stop: Mutex::new(Some(stop)),
            task: Mutex::new(Some(task)),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// URL of the page
    pub fn url(&self) -> String {
        format!("http://{}/", self.local_addr)
    }

    /// Stop accepting connections and wait for the server task to finish
    pub async fn close(&self) {
        if let Some(stop) = self.stop.lock().take() {
            let _ = stop.send(());
        }
        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::warn!("HTTP server task ended abnormally: {}", e);
            }
        }
    }
}

#[async_trait]
impl TeardownStep for HttpServer {
    fn name(&self) -> &'static str {
        "HTTP server"
    }

    async fn run(&self) -> anyhow::Result<()> {
        tracing::info!("Closing HTTP server...");
        self.close().await;
        tracing::info!("Closed HTTP server.");
        Ok(())
    }
}

fn router(bundle_js: String) -> Router {
    Router::new()
        .route("/", get(|| async { Html(INDEX_HTML) }))
        .route(
            "/bundle.js",
            get(move || {
                let body = bundle_js.clone();
                async move { ([(header::CONTENT_TYPE, "application/javascript")], body) }
            }),
        )
        .layer(middleware::from_fn(log_requests))
}

async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = Instant::now();

    let response = next.run(request).await.into_response();

    tracing::debug!(
        "{} {} -> {} ({:?})",
        method,
        path,
        response.status(),
        started.elapsed()
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fetch(url: String) -> (String, String) {
        let response = ureq::get(&url).call().unwrap();
        let content_type = response.content_type().to_string();
        (content_type, response.into_string().unwrap())
    }

    #[tokio::test]
    async fn test_serves_page_and_bundle() {
        let server = HttpServer::start(0, &PageBundle::default()).await.unwrap();
        let base = format!("http://{}", server.local_addr());

        let (page, bundle) = tokio::task::spawn_blocking(move || {
            (fetch(format!("{base}/")), fetch(format!("{base}/bundle.js")))
        })
        .await
        .unwrap();

        assert_eq!(page.0, "text/html");
        assert!(page.1.contains(r#"<script src="/bundle.js"></script>"#));
        assert_eq!(bundle.0, "application/javascript");
        let parsed: PageBundle = serde_json::from_str(&bundle.1).unwrap();
        assert_eq!(parsed, PageBundle::default());

        server.close().await;
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let server = HttpServer::start(0, &PageBundle::default()).await.unwrap();

        server.run().await.unwrap();
        server.close().await;

        let addr = server.local_addr();
        let refused = tokio::task::spawn_blocking(move || {
            ureq::get(&format!("http://{addr}/")).call().is_err()
        })
        .await
        .unwrap();
        assert!(refused);
    }
}
