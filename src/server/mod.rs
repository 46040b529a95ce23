//! The HTTP API served to the site.
//!
//! - `GET /api/now-playing` - current playback, see [`PlaybackStatus`].
//! - `GET /api/posts` - every post's metadata, newest first.
//! - `GET /api/posts/{slug}` - one post's metadata and markdown, plus up to
//!   three other recent posts.
//! - `GET /healthz` - liveness.

pub(crate) mod config;
pub use config::{ServerConfig, ServerConfigError, DEFAULT_NOW_PLAYING_TTL};

use crate::{
    blog::{BlogError, PostMetadata, PostStore},
    cache::ResponseCache,
    spotify::{NowPlayingClient, PlaybackStatus},
    utils::{metrics::NOW_PLAYING_ERRORS, otel_axum::RequestSpanLayer},
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use core::error::Error;
use serde::Serialize;
use std::sync::Arc;
use tracing::error;

/// How many other posts are suggested below a post.
pub const MORE_POSTS: usize = 3;

const NOW_PLAYING_FAILED: &str = "Failed to fetch now playing data";

/// Shared state for the handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    now_playing: NowPlayingClient,
    now_playing_cache: Arc<ResponseCache<PlaybackStatus>>,
    posts: PostStore,
}

impl AppState {
    /// Create the handler state.
    pub fn new(
        now_playing: NowPlayingClient,
        now_playing_cache: ResponseCache<PlaybackStatus>,
        posts: PostStore,
    ) -> Self {
        Self {
            now_playing,
            now_playing_cache: Arc::new(now_playing_cache),
            posts,
        }
    }
}

/// Build the API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/now-playing", get(now_playing))
        .route("/api/posts", get(list_posts))
        .route("/api/posts/{slug}", get(read_post))
        .route("/healthz", get(|| async { "ok" }))
        .layer(RequestSpanLayer)
        .with_state(state)
}

/// Render an error and its source chain on one line.
fn source_chain(err: &dyn Error) -> String {
    let mut chain = err.to_string();
    let mut current = err;
    while let Some(source) = current.source() {
        chain.push_str(": ");
        chain.push_str(&source.to_string());
        current = source;
    }
    chain
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NowPlayingFailure {
    is_playing: bool,
    error: &'static str,
}

async fn now_playing(State(state): State<AppState>) -> Response {
    let client = &state.now_playing;
    let result = state
        .now_playing_cache
        .get_or_refresh(|| client.get_now_playing())
        .await;

    match result {
        Ok(status) => Json(status).into_response(),
        Err(err) => {
            metrics::counter!(NOW_PLAYING_ERRORS).increment(1);
            let chain = source_chain(&err);
            error!(%chain, "Failed to fetch now playing");
            let body = NowPlayingFailure {
                is_playing: false,
                error: NOW_PLAYING_FAILED,
            };
            (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for BlogError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            _ => {
                let chain = source_chain(&self);
                error!(%chain, "Failed to read posts");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (
            status,
            Json(ErrorBody {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

async fn list_posts(State(state): State<AppState>) -> Result<Json<Vec<PostMetadata>>, BlogError> {
    state.posts.list_posts().await.map(Json)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PostResponse {
    metadata: PostMetadata,
    content: String,
    more_posts: Vec<PostMetadata>,
}

async fn read_post(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<PostResponse>, BlogError> {
    let post = state.posts.read_post(&slug).await?;
    let more_posts = state.posts.more_posts(&slug, MORE_POSTS).await?;

    Ok(Json(PostResponse {
        metadata: post.front_matter,
        content: post.body,
        more_posts,
    }))
}
