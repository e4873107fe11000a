#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use axum::extract::{Path as UrlPath, Query};
use axum::response::Html;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use tempfile::TempDir;

use tenrankai_harness::readiness::ProbePolicy;
use tenrankai_harness::{RunnerConfig, ServerConfig};

/// Bind a fake Tenrankai site on a free port and serve it in the background
pub async fn spawn_site() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind fake site");
    let port = listener.local_addr().unwrap().port();

    let app = Router::new()
        .route("/", get(|| async { Html("<html><body><h1>Tenrankai</h1></body></html>") }))
        .route("/about", get(|| async { Html("<h2>About Tenrankai</h2>") }))
        .route("/static/style.css", get(|| async { "body { font-family: sans-serif; }" }))
        .route("/api/gallery/:name/preview", get(preview));

    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    port
}

async fn preview(
    UrlPath(name): UrlPath<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<Value> {
    let count: usize = params
        .get("count")
        .and_then(|c| c.parse().ok())
        .unwrap_or(3);
    let images: Vec<usize> = (1..=count).collect();
    Json(json!({ "gallery": name, "images": images }))
}

/// A site directory whose "server" is the shell script `serve`. Running
/// `/bin/sh serve --config ... --port ...` in that directory executes it,
/// so no executable bit is needed.
pub struct FakeServer {
    pub dir: TempDir,
}

impl FakeServer {
    pub fn new(script: &str) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let body = format!("echo \"$@\" >> invocations.log\n{}\n", script);
        std::fs::write(dir.path().join("serve"), body).expect("write script");
        Self { dir }
    }

    /// Stays alive until signalled
    pub fn sleeper() -> Self {
        Self::new("echo 'Server listening'\nexec sleep 30")
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Argument lines of every start
    pub fn invocations(&self) -> Vec<String> {
        std::fs::read_to_string(self.dir.path().join("invocations.log"))
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    pub fn server_config(&self, port: u16) -> ServerConfig {
        ServerConfig {
            binary_path: PathBuf::from("/bin/sh"),
            site_dir: self.dir.path().to_path_buf(),
            port,
            grace_period: Duration::from_millis(500),
            ..Default::default()
        }
    }

    pub fn runner_config(&self, port: u16) -> RunnerConfig {
        RunnerConfig {
            server: self.server_config(port),
            probe: fast_probe(),
            request_timeout: Duration::from_secs(5),
            keep_running: false,
        }
    }
}

pub fn fast_probe() -> ProbePolicy {
    ProbePolicy {
        max_attempts: 5,
        interval: Duration::from_millis(50),
        attempt_timeout: Duration::from_millis(500),
    }
}
