#![allow(dead_code)]

//! A local stand-in for the Spotify token and currently-playing endpoints.

use axum::{
    extract::State,
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use portfolio_api::spotify::SpotifyConfig;
use serde_json::{json, Value};
use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};
use tokio::{net::TcpListener, task::JoinHandle};

pub const CLIENT_ID: &str = "id";
pub const CLIENT_SECRET: &str = "secret";
pub const REFRESH_TOKEN: &str = "refresh";

/// `Basic base64("id:secret")`
pub const BASIC_AUTH: &str = "Basic aWQ6c2VjcmV0";

/// A request received by the token endpoint.
#[derive(Debug, Clone)]
pub struct TokenRequest {
    pub authorization: Option<String>,
    pub form: HashMap<String, String>,
}

/// Shared state of the mock. Tokens are issued as `T1`, `T2`, ...
#[derive(Debug, Clone)]
pub struct MockSpotify {
    token_calls: Arc<AtomicUsize>,
    player_calls: Arc<AtomicUsize>,
    token_status: Arc<Mutex<StatusCode>>,
    token_body: Arc<Mutex<Option<Value>>>,
    player: Arc<Mutex<(StatusCode, Value)>>,
    token_requests: Arc<Mutex<Vec<TokenRequest>>>,
    bearers: Arc<Mutex<Vec<String>>>,
}

impl Default for MockSpotify {
    fn default() -> Self {
        Self {
            token_calls: Default::default(),
            player_calls: Default::default(),
            token_status: Arc::new(Mutex::new(StatusCode::OK)),
            token_body: Default::default(),
            player: Arc::new(Mutex::new((StatusCode::NO_CONTENT, Value::Null))),
            token_requests: Default::default(),
            bearers: Default::default(),
        }
    }
}

impl MockSpotify {
    pub fn token_calls(&self) -> usize {
        self.token_calls.load(Ordering::SeqCst)
    }

    pub fn player_calls(&self) -> usize {
        self.player_calls.load(Ordering::SeqCst)
    }

    pub fn token_requests(&self) -> Vec<TokenRequest> {
        self.token_requests.lock().unwrap().clone()
    }

    pub fn bearers(&self) -> Vec<String> {
        self.bearers.lock().unwrap().clone()
    }

    /// Make the token endpoint answer with this status.
    pub fn set_token_status(&self, status: StatusCode) {
        *self.token_status.lock().unwrap() = status;
    }

    /// Make the token endpoint answer 200 with this body instead of a token.
    pub fn set_token_body(&self, body: Value) {
        *self.token_body.lock().unwrap() = Some(body);
    }

    /// Make the player endpoint answer with this status and body. A null
    /// body is sent as an empty response.
    pub fn set_player(&self, status: StatusCode, body: Value) {
        *self.player.lock().unwrap() = (status, body);
    }

    /// Serve the mock on an ephemeral local port.
    pub async fn start(&self) -> (SocketAddr, JoinHandle<()>) {
        let app = Router::new()
            .route("/api/token", post(token))
            .route("/v1/me/player/currently-playing", get(player))
            .with_state(self.clone());
        serve(app).await
    }

    /// A config pointing at a mock served on `addr`.
    pub fn config(addr: SocketAddr) -> SpotifyConfig {
        SpotifyConfig::new(CLIENT_ID, CLIENT_SECRET, REFRESH_TOKEN)
            .with_token_url(format!("http://{addr}/api/token").parse().unwrap())
            .with_now_playing_url(
                format!("http://{addr}/v1/me/player/currently-playing")
                    .parse()
                    .unwrap(),
            )
    }
}

/// Serve a router on an ephemeral local port.
pub async fn serve(app: Router) -> (SocketAddr, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, server)
}

async fn token(
    State(mock): State<MockSpotify>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    let n = mock.token_calls.fetch_add(1, Ordering::SeqCst) + 1;
    let authorization = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    mock.token_requests
        .lock()
        .unwrap()
        .push(TokenRequest { authorization, form });

    let status = *mock.token_status.lock().unwrap();
    if status != StatusCode::OK {
        return (status, Json(json!({ "error": "invalid_grant" }))).into_response();
    }
    if let Some(body) = mock.token_body.lock().unwrap().clone() {
        return Json(body).into_response();
    }
    Json(json!({ "access_token": format!("T{n}"), "expires_in": 3600 })).into_response()
}

async fn player(State(mock): State<MockSpotify>, headers: HeaderMap) -> Response {
    mock.player_calls.fetch_add(1, Ordering::SeqCst);
    if let Some(bearer) = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        mock.bearers.lock().unwrap().push(bearer.to_owned());
    }

    let (status, body) = mock.player.lock().unwrap().clone();
    if body.is_null() {
        status.into_response()
    } else {
        (status, Json(body)).into_response()
    }
}

/// A local URL that refuses connections.
pub async fn closed_url() -> url::Url {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}/v1/me/player/currently-playing")
        .parse()
        .unwrap()
}

/// A currently-playing payload for a populated track.
pub fn track_payload() -> Value {
    json!({
        "is_playing": true,
        "progress_ms": 1000,
        "item": {
            "name": "Song",
            "artists": [{ "name": "A" }, { "name": "B" }],
            "album": {
                "name": "Alb",
                "images": [
                    { "url": "img-large", "height": 640, "width": 640 },
                    { "url": "img-small", "height": 64, "width": 64 }
                ]
            },
            "external_urls": { "spotify": "https://open.spotify.com/track/1" }
        }
    })
}
