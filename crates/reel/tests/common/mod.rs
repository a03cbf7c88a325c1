//! Local HTTP server answering range requests for test clips.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use bytes::{Bytes, BytesMut};
use mp4::test_support::{ROTATE_90_MATRIX, make_movie, make_trak};
use reel_engine::ClientConfig;

/// A portrait clip: 15 s, stored 1920x1080 with a 90° display matrix.
pub fn portrait_clip() -> Bytes {
    let head = make_movie(1000, 15_000, &[make_trak(1, b"vide", 1920, 1080, ROTATE_90_MATRIX)]);
    let mut body = BytesMut::from(&head[..]);
    body.resize(64 * 1024, 0);
    body.freeze()
}

pub fn test_client_config() -> ClientConfig {
    ClientConfig {
        use_system_proxy: false,
        ..ClientConfig::default()
    }
}

#[derive(Default)]
struct Hits {
    clip: AtomicUsize,
    portrait: AtomicUsize,
}

struct ServerState {
    body: Bytes,
    hits: Hits,
}

pub struct ClipServer {
    addr: SocketAddr,
    state: Arc<ServerState>,
}

impl ClipServer {
    pub async fn start() -> Self {
        let state = Arc::new(ServerState {
            body: portrait_clip(),
            hits: Hits::default(),
        });
        let app = Router::new()
            .route("/clip.mp4", get(clip))
            .route("/portrait.mp4", get(portrait))
            .route("/ignores-range.mp4", get(ignores_range))
            .route("/missing.mp4", get(missing))
            .route("/hang.mp4", get(hang))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Self { addr, state }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}/{}", self.addr, path.trim_start_matches('/'))
    }

    pub fn body_len(&self) -> usize {
        self.state.body.len()
    }

    pub fn clip_hits(&self) -> usize {
        self.state.hits.clip.load(Ordering::SeqCst)
    }

    pub fn portrait_hits(&self) -> usize {
        self.state.hits.portrait.load(Ordering::SeqCst)
    }
}

fn parse_range(headers: &HeaderMap) -> Option<(usize, Option<usize>)> {
    let value = headers.get(header::RANGE)?.to_str().ok()?;
    let spec = value.strip_prefix("bytes=")?;
    let (start, end) = spec.split_once('-')?;
    let start = start.parse().ok()?;
    let end = if end.is_empty() { None } else { Some(end.parse().ok()?) };
    Some((start, end))
}

fn ranged(body: &Bytes, headers: &HeaderMap) -> Response {
    let len = body.len();
    let Some((start, end)) = parse_range(headers) else {
        return (StatusCode::OK, [(header::CONTENT_TYPE, "video/mp4")], body.clone()).into_response();
    };
    if start >= len {
        return StatusCode::RANGE_NOT_SATISFIABLE.into_response();
    }
    let end = end.unwrap_or(len - 1).min(len - 1);
    (
        StatusCode::PARTIAL_CONTENT,
        [
            (header::CONTENT_TYPE, "video/mp4".to_string()),
            (header::CONTENT_RANGE, format!("bytes {start}-{end}/{len}")),
        ],
        body.slice(start..=end),
    )
        .into_response()
}

async fn clip(State(state): State<Arc<ServerState>>, headers: HeaderMap) -> Response {
    state.hits.clip.fetch_add(1, Ordering::SeqCst);
    ranged(&state.body, &headers)
}

async fn portrait(State(state): State<Arc<ServerState>>, headers: HeaderMap) -> Response {
    state.hits.portrait.fetch_add(1, Ordering::SeqCst);
    ranged(&state.body, &headers)
}

async fn ignores_range(State(state): State<Arc<ServerState>>) -> Response {
    (StatusCode::OK, state.body.clone()).into_response()
}

async fn missing() -> StatusCode {
    StatusCode::NOT_FOUND
}

async fn hang() -> StatusCode {
    std::future::pending::<StatusCode>().await
}
