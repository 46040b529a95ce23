use crate::{
    spotify::{AuthRefreshError, TokenCache},
    utils::metrics::NOW_PLAYING_REQUESTS,
};
use reqwest::{header::CACHE_CONTROL, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument, warn};
use url::Url;

/// Errors from the currently-playing lookup itself.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The request did not complete.
    #[error("currently-playing request failed")]
    Transport(#[source] reqwest::Error),
    /// The response body did not have the expected shape.
    #[error("malformed currently-playing response")]
    Malformed(#[source] reqwest::Error),
}

/// Errors from [`NowPlayingClient::get_now_playing`].
#[derive(Debug, thiserror::Error)]
pub enum NowPlayingError {
    /// No access token could be obtained.
    #[error(transparent)]
    Auth(#[from] AuthRefreshError),
    /// The status lookup failed.
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

/// What, if anything, is playing on the account.
///
/// Serializes to the `{isPlaying, title, artist, album, albumImageUrl,
/// songUrl}` shape served to the site. Absent fields are omitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackStatus {
    /// Whether playback is running. A paused track reports `false` but keeps
    /// its details.
    pub is_playing: bool,
    /// Track title.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Artist names, joined with `", "`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    /// Album name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
    /// First (largest) album image.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub album_image_url: Option<String>,
    /// Link to the track on Spotify.
    #[serde(rename = "songUrl", skip_serializing_if = "Option::is_none")]
    pub track_url: Option<String>,
}

impl PlaybackStatus {
    /// Nothing is playing.
    pub fn not_playing() -> Self {
        Self::default()
    }
}

#[derive(Debug, Deserialize)]
struct CurrentlyPlaying {
    #[serde(default)]
    is_playing: bool,
    #[serde(default)]
    item: Option<Track>,
}

#[derive(Debug, Deserialize)]
struct Track {
    name: String,
    #[serde(default)]
    artists: Vec<Named>,
    album: Album,
    #[serde(default)]
    external_urls: ExternalUrls,
}

#[derive(Debug, Deserialize)]
struct Named {
    name: String,
}

#[derive(Debug, Deserialize)]
struct Album {
    name: String,
    #[serde(default)]
    images: Vec<Image>,
}

#[derive(Debug, Deserialize)]
struct Image {
    url: String,
}

#[derive(Debug, Default, Deserialize)]
struct ExternalUrls {
    spotify: Option<String>,
}

impl From<CurrentlyPlaying> for PlaybackStatus {
    fn from(body: CurrentlyPlaying) -> Self {
        let Some(track) = body.item else {
            return Self::not_playing();
        };

        let artist = track
            .artists
            .into_iter()
            .map(|a| a.name)
            .collect::<Vec<_>>()
            .join(", ");

        Self {
            is_playing: body.is_playing,
            title: Some(track.name),
            artist: Some(artist),
            album: Some(track.album.name),
            album_image_url: track.album.images.into_iter().next().map(|i| i.url),
            track_url: track.external_urls.spotify,
        }
    }
}

/// Reports what the configured account is currently playing.
#[derive(Debug, Clone)]
pub struct NowPlayingClient {
    client: reqwest::Client,
    endpoint: Url,
    tokens: Arc<TokenCache>,
}

impl NowPlayingClient {
    /// Create a client for the given currently-playing endpoint.
    pub const fn new(client: reqwest::Client, endpoint: Url, tokens: Arc<TokenCache>) -> Self {
        Self {
            client,
            endpoint,
            tokens,
        }
    }

    /// The token cache used to authorize requests.
    pub const fn tokens(&self) -> &Arc<TokenCache> {
        &self.tokens
    }

    /// The currently-playing endpoint.
    pub const fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Look up the current playback state.
    ///
    /// `204 No Content` and error statuses are reported as not playing. A
    /// `401` also drops the cached token, so the next lookup refreshes it.
    /// Failing to obtain a token is an error, not a "not playing" result.
    #[instrument(skip_all)]
    pub async fn get_now_playing(&self) -> Result<PlaybackStatus, NowPlayingError> {
        metrics::counter!(NOW_PLAYING_REQUESTS).increment(1);
        let token = self.tokens.get_token().await?;

        let resp = self
            .client
            .get(self.endpoint.clone())
            .bearer_auth(token)
            .header(CACHE_CONTROL, "no-cache")
            .send()
            .await
            .inspect_err(|e| warn!(%e, "Failed to reach currently-playing endpoint"))
            .map_err(FetchError::Transport)?;

        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED {
            self.tokens.invalidate();
        }
        if status == StatusCode::NO_CONTENT || status.as_u16() >= 400 {
            debug!(%status, "Nothing playing");
            return Ok(PlaybackStatus::not_playing());
        }

        let body = resp
            .json::<CurrentlyPlaying>()
            .await
            .map_err(FetchError::Malformed)?;

        Ok(body.into())
    }
}
