use crate::{
    spotify::{NowPlayingClient, SpotifyTokenSource, TokenCache},
    utils::{
        clock::{Clock, SystemClock},
        from_env::{EnvItemInfo, FromEnv, FromEnvErr, FromEnvVar},
    },
};
use core::num::ParseIntError;
use oauth2::{ClientId, ClientSecret, RefreshToken, TokenUrl};
use std::{sync::Arc, time::Duration};
use url::Url;

const SPOTIFY_CLIENT_ID: &str = "SPOTIFY_CLIENT_ID";
const SPOTIFY_CLIENT_SECRET: &str = "SPOTIFY_CLIENT_SECRET";
const SPOTIFY_REFRESH_TOKEN: &str = "SPOTIFY_REFRESH_TOKEN";
const SPOTIFY_TOKEN_URL: &str = "SPOTIFY_TOKEN_URL";
const SPOTIFY_NOW_PLAYING_URL: &str = "SPOTIFY_NOW_PLAYING_URL";
const SPOTIFY_TOKEN_EXPIRY_MARGIN: &str = "SPOTIFY_TOKEN_EXPIRY_MARGIN";

/// Spotify's token endpoint.
pub const DEFAULT_TOKEN_URL: &str = "https://accounts.spotify.com/api/token";

/// Spotify's currently-playing endpoint.
pub const DEFAULT_NOW_PLAYING_URL: &str = "https://api.spotify.com/v1/me/player/currently-playing";

/// Tokens are treated as expired this long before the server says they are.
pub const DEFAULT_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Possible errors when loading the Spotify configuration.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum SpotifyConfigError {
    /// One of the endpoint URLs did not parse.
    #[error("invalid endpoint url: {0}")]
    Url(#[from] url::ParseError),
    /// The expiry margin was not a whole number of seconds.
    #[error("invalid token expiry margin: {0}")]
    ExpiryMargin(#[from] ParseIntError),
}

/// Credentials and endpoints for the Spotify Web API.
///
/// The secrets are held in [`oauth2`] newtypes, so the [`Debug`] output of
/// this struct never contains them.
#[derive(Debug, Clone)]
pub struct SpotifyConfig {
    /// The app's client ID.
    pub client_id: ClientId,
    /// The app's client secret.
    pub client_secret: ClientSecret,
    /// Long-lived refresh token for the account whose playback is reported.
    pub refresh_token: RefreshToken,
    /// Authorization server token endpoint.
    pub token_url: TokenUrl,
    /// Currently-playing endpoint.
    pub now_playing_url: Url,
    /// Safety margin subtracted from each token's lifetime.
    pub expiry_margin: Duration,
}

impl SpotifyConfig {
    /// Create a config pointing at the production Spotify endpoints.
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        refresh_token: impl Into<String>,
    ) -> Self {
        Self {
            client_id: ClientId::new(client_id.into()),
            client_secret: ClientSecret::new(client_secret.into()),
            refresh_token: RefreshToken::new(refresh_token.into()),
            token_url: TokenUrl::from_url(default_url(DEFAULT_TOKEN_URL)),
            now_playing_url: default_url(DEFAULT_NOW_PLAYING_URL),
            expiry_margin: DEFAULT_EXPIRY_MARGIN,
        }
    }

    /// Override the token endpoint.
    pub fn with_token_url(mut self, url: Url) -> Self {
        self.token_url = TokenUrl::from_url(url);
        self
    }

    /// Override the currently-playing endpoint.
    pub fn with_now_playing_url(mut self, url: Url) -> Self {
        self.now_playing_url = url;
        self
    }

    /// Override the expiry margin.
    pub const fn with_expiry_margin(mut self, margin: Duration) -> Self {
        self.expiry_margin = margin;
        self
    }

    /// Build a [`TokenCache`] backed by the Spotify token endpoint.
    pub fn token_cache(&self, clock: Arc<dyn Clock>) -> Result<TokenCache, reqwest::Error> {
        // No redirects on the token exchange.
        // https://docs.rs/oauth2/latest/oauth2/#security-warning
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        let source = SpotifyTokenSource::new(self, client);
        Ok(TokenCache::new(Arc::new(source), clock).with_expiry_margin(self.expiry_margin))
    }

    /// Build a [`NowPlayingClient`] using the system clock.
    pub fn connect(&self) -> Result<NowPlayingClient, reqwest::Error> {
        self.connect_with_clock(Arc::new(SystemClock))
    }

    /// Build a [`NowPlayingClient`] whose token cache reads the given clock.
    pub fn connect_with_clock(
        &self,
        clock: Arc<dyn Clock>,
    ) -> Result<NowPlayingClient, reqwest::Error> {
        let tokens = self.token_cache(clock)?;
        Ok(NowPlayingClient::new(
            reqwest::Client::new(),
            self.now_playing_url.clone(),
            Arc::new(tokens),
        ))
    }
}

// The defaults are compile-time constants, so parsing cannot fail.
fn default_url(s: &str) -> Url {
    Url::parse(s).unwrap_or_else(|e| unreachable!("invalid built-in url {s}: {e}"))
}

impl FromEnv for SpotifyConfig {
    type Error = SpotifyConfigError;

    fn inventory() -> Vec<&'static EnvItemInfo> {
        vec![
            &EnvItemInfo {
                var: SPOTIFY_CLIENT_ID,
                description: "Spotify app client ID",
                optional: false,
            },
            &EnvItemInfo {
                var: SPOTIFY_CLIENT_SECRET,
                description: "Spotify app client secret",
                optional: false,
            },
            &EnvItemInfo {
                var: SPOTIFY_REFRESH_TOKEN,
                description: "Long-lived refresh token for the reported account",
                optional: false,
            },
            &EnvItemInfo {
                var: SPOTIFY_TOKEN_URL,
                description: "Token endpoint url. Defaults to the Spotify accounts service",
                optional: true,
            },
            &EnvItemInfo {
                var: SPOTIFY_NOW_PLAYING_URL,
                description: "Currently-playing endpoint url. Defaults to the Spotify Web API",
                optional: true,
            },
            &EnvItemInfo {
                var: SPOTIFY_TOKEN_EXPIRY_MARGIN,
                description: "Seconds subtracted from each access token's lifetime. Defaults to 60",
                optional: true,
            },
        ]
    }

    fn from_env() -> Result<Self, FromEnvErr<Self::Error>> {
        let secret = |var| {
            String::from_env_var(var).map_err(FromEnvErr::infallible_into::<SpotifyConfigError>)
        };
        let mut config = Self::new(
            secret(SPOTIFY_CLIENT_ID)?,
            secret(SPOTIFY_CLIENT_SECRET)?,
            secret(SPOTIFY_REFRESH_TOKEN)?,
        );

        if let Some(url) = Option::<Url>::from_env_var(SPOTIFY_TOKEN_URL)
            .map_err(|e| e.map(SpotifyConfigError::Url))?
        {
            config = config.with_token_url(url);
        }
        if let Some(url) = Option::<Url>::from_env_var(SPOTIFY_NOW_PLAYING_URL)
            .map_err(|e| e.map(SpotifyConfigError::Url))?
        {
            config = config.with_now_playing_url(url);
        }

        let margin = Duration::from_env_var_or(SPOTIFY_TOKEN_EXPIRY_MARGIN, DEFAULT_EXPIRY_MARGIN)
            .map_err(|e| e.map(SpotifyConfigError::ExpiryMargin))?;

        Ok(config.with_expiry_margin(margin))
    }
}
