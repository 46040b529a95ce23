//! Spotify now-playing lookup, guarded by an access-token cache.

pub(crate) mod config;
pub use config::{
    SpotifyConfig, SpotifyConfigError, DEFAULT_EXPIRY_MARGIN, DEFAULT_NOW_PLAYING_URL,
    DEFAULT_TOKEN_URL,
};

pub(crate) mod token;
pub use token::{
    AuthRefreshError, SpotifyTokenSource, TokenCache, TokenGrant, TokenSource, MAX_TOKEN_LIFETIME,
};

pub(crate) mod now_playing;
pub use now_playing::{FetchError, NowPlayingClient, NowPlayingError, PlaybackStatus};
