//! Access-token cache for the Spotify Web API.
//!
//! A [`TokenCache`] holds at most one access token. The token is exchanged
//! for a new one through a [`TokenSource`] when it is absent or expired.
//! Refreshes are single-flight: callers that arrive while a refresh is
//! running wait for it and share its token.
use crate::{
    spotify::SpotifyConfig,
    utils::clock::{Clock, SystemClock},
};
use core::fmt;
use oauth2::{AccessToken, ClientId, ClientSecret, RefreshToken, TokenUrl};
use reqwest::StatusCode;
use std::{
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::{watch, Mutex};
use tracing::{debug, instrument, warn};

/// Upper bound on how long a token is cached, whatever the server reports.
pub const MAX_TOKEN_LIFETIME: Duration = Duration::from_secs(24 * 60 * 60);

/// Errors from the refresh-token exchange.
#[derive(Debug, thiserror::Error)]
pub enum AuthRefreshError {
    /// The request did not complete.
    #[error("token request failed")]
    Transport(#[source] reqwest::Error),

    /// The authorization server answered with a non-success status.
    #[error("token endpoint returned {status}: {body}")]
    Status {
        /// The response status.
        status: StatusCode,
        /// The response body, for diagnostics.
        body: String,
    },

    /// The response body was not a token response.
    #[error("malformed token response")]
    Malformed(#[source] reqwest::Error),
}

/// A freshly issued access token, as reported by the authorization server.
#[derive(Debug, Clone)]
pub struct TokenGrant {
    /// The bearer token.
    pub access_token: AccessToken,
    /// How long the server says the token is valid for.
    pub expires_in: Duration,
}

impl TokenGrant {
    /// Create a new grant.
    pub fn new(access_token: impl Into<String>, expires_in: Duration) -> Self {
        Self {
            access_token: AccessToken::new(access_token.into()),
            expires_in,
        }
    }
}

/// Something that can exchange long-lived credentials for an access token.
#[async_trait::async_trait]
pub trait TokenSource: fmt::Debug + Send + Sync {
    /// Perform one exchange.
    async fn fetch_token(&self) -> Result<TokenGrant, AuthRefreshError>;
}

#[derive(serde::Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

/// Exchanges the refresh token at the Spotify accounts service, using HTTP
/// Basic client authentication and a form-encoded
/// `grant_type=refresh_token` body.
pub struct SpotifyTokenSource {
    client: reqwest::Client,
    token_url: TokenUrl,
    client_id: ClientId,
    client_secret: ClientSecret,
    refresh_token: RefreshToken,
}

impl fmt::Debug for SpotifyTokenSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpotifyTokenSource")
            .field("token_url", &self.token_url.url().as_str())
            .field("client_id", &self.client_id.as_str())
            .finish_non_exhaustive()
    }
}

impl SpotifyTokenSource {
    /// Create a token source from the config. The client should not follow
    /// redirects.
    pub fn new(config: &SpotifyConfig, client: reqwest::Client) -> Self {
        Self {
            client,
            token_url: config.token_url.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            refresh_token: config.refresh_token.clone(),
        }
    }
}

#[async_trait::async_trait]
impl TokenSource for SpotifyTokenSource {
    #[instrument(skip_all, fields(token_url = %self.token_url.url().as_str()))]
    async fn fetch_token(&self) -> Result<TokenGrant, AuthRefreshError> {
        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", self.refresh_token.secret().as_str()),
        ];

        let resp = self
            .client
            .post(self.token_url.url().clone())
            .basic_auth(self.client_id.as_str(), Some(self.client_secret.secret()))
            .form(&form)
            .send()
            .await
            .map_err(AuthRefreshError::Transport)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AuthRefreshError::Status { status, body });
        }

        let body = resp
            .json::<TokenResponse>()
            .await
            .map_err(AuthRefreshError::Malformed)?;

        Ok(TokenGrant::new(
            body.access_token,
            Duration::from_secs(body.expires_in),
        ))
    }
}

/// The single cached token.
struct CachedToken {
    value: AccessToken,
    expires_at: Instant,
}

impl CachedToken {
    fn live_at(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// A single-slot access-token cache.
///
/// [`TokenCache::get_token`] returns the cached token while it is live and
/// otherwise performs one refresh through the [`TokenSource`]. The token is
/// considered expired `expiry_margin` before the lifetime reported by the
/// server runs out. Failed refreshes leave the cache untouched and are not
/// cached themselves.
pub struct TokenCache {
    source: Arc<dyn TokenSource>,
    clock: Arc<dyn Clock>,
    expiry_margin: Duration,

    token: watch::Sender<Option<CachedToken>>,
    // Held for the duration of a refresh.
    refresh: Mutex<()>,
}

impl fmt::Debug for TokenCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCache")
            .field("source", &self.source)
            .field("expiry_margin", &self.expiry_margin)
            .field("authenticated", &self.is_authenticated())
            .finish_non_exhaustive()
    }
}

impl TokenCache {
    /// Create an empty cache with no expiry margin.
    pub fn new(source: Arc<dyn TokenSource>, clock: Arc<dyn Clock>) -> Self {
        Self {
            source,
            clock,
            expiry_margin: Duration::ZERO,
            token: watch::channel(None).0,
            refresh: Mutex::new(()),
        }
    }

    /// Create an empty cache reading the system clock.
    pub fn with_system_clock(source: Arc<dyn TokenSource>) -> Self {
        Self::new(source, Arc::new(SystemClock))
    }

    /// Treat tokens as expired this long before the server-reported lifetime
    /// runs out. The margin never takes more than half of a token's lifetime,
    /// so a freshly issued token is always live for a while.
    pub fn with_expiry_margin(mut self, margin: Duration) -> Self {
        self.expiry_margin = margin;
        self
    }

    /// The configured expiry margin.
    pub const fn expiry_margin(&self) -> Duration {
        self.expiry_margin
    }

    /// True if a token is cached and has not expired.
    pub fn is_authenticated(&self) -> bool {
        self.live_token().is_some()
    }

    /// Drop the cached token, so the next call to [`Self::get_token`]
    /// refreshes.
    pub fn invalidate(&self) {
        if self.token.send_replace(None).is_some() {
            debug!("Dropped cached access token");
        }
    }

    fn live_token(&self) -> Option<String> {
        let now = self.clock.now();
        self.token
            .borrow()
            .as_ref()
            .filter(|t| t.live_at(now))
            .map(|t| t.value.secret().to_owned())
    }

    /// Get a live access token, refreshing it if needed.
    #[instrument(skip_all)]
    pub async fn get_token(&self) -> Result<String, AuthRefreshError> {
        if let Some(token) = self.live_token() {
            return Ok(token);
        }

        let _guard = self.refresh.lock().await;

        // Another caller may have refreshed while we waited for the lock.
        if let Some(token) = self.live_token() {
            debug!("Using token refreshed by a concurrent caller");
            return Ok(token);
        }

        debug!("Refreshing access token");
        let issued_at = self.clock.now();
        let grant = self.source.fetch_token().await.inspect_err(|err| {
            metrics::counter!(crate::utils::metrics::TOKEN_REFRESH_ERRORS).increment(1);
            warn!(%err, "Failed to refresh access token");
        })?;
        metrics::counter!(crate::utils::metrics::TOKEN_REFRESHES).increment(1);

        let margin = self.expiry_margin.min(grant.expires_in / 2);
        let lifetime = (grant.expires_in - margin).min(MAX_TOKEN_LIFETIME);
        let token = grant.access_token.secret().to_owned();
        self.token.send_replace(Some(CachedToken {
            value: grant.access_token,
            expires_at: issued_at + lifetime,
        }));
        debug!(expires_in = grant.expires_in.as_secs(), "Refreshed access token");

        Ok(token)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::utils::clock::ManualClock;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const HOUR: Duration = Duration::from_secs(3600);

    /// Issues `token-1`, `token-2`, ... or fails every call.
    #[derive(Debug, Default)]
    struct FakeTokenSource {
        calls: AtomicUsize,
        fail: bool,
        delay: Option<Duration>,
        expires_in: Option<Duration>,
    }

    impl FakeTokenSource {
        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl TokenSource for FakeTokenSource {
        async fn fetch_token(&self) -> Result<TokenGrant, AuthRefreshError> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail {
                return Err(AuthRefreshError::Status {
                    status: StatusCode::BAD_REQUEST,
                    body: "invalid_grant".to_owned(),
                });
            }
            Ok(TokenGrant::new(
                format!("token-{n}"),
                self.expires_in.unwrap_or(HOUR),
            ))
        }
    }

    fn cache_with(source: FakeTokenSource) -> (TokenCache, Arc<FakeTokenSource>, ManualClock) {
        let source = Arc::new(source);
        let clock = ManualClock::new();
        let cache = TokenCache::new(source.clone(), Arc::new(clock.clone()));
        (cache, source, clock)
    }

    #[tokio::test]
    async fn live_token_is_served_from_cache() {
        let (cache, source, clock) = cache_with(FakeTokenSource::default());

        assert_eq!(cache.get_token().await.unwrap(), "token-1");
        clock.advance(HOUR - Duration::from_secs(1));
        assert_eq!(cache.get_token().await.unwrap(), "token-1");

        assert_eq!(source.calls(), 1);
        assert!(cache.is_authenticated());
    }

    #[tokio::test]
    async fn expired_token_triggers_one_refresh() {
        let (cache, source, clock) = cache_with(FakeTokenSource::default());

        assert_eq!(cache.get_token().await.unwrap(), "token-1");
        clock.advance(HOUR);
        assert!(!cache.is_authenticated());

        assert_eq!(cache.get_token().await.unwrap(), "token-2");
        assert_eq!(cache.get_token().await.unwrap(), "token-2");
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn margin_shortens_lifetime() {
        let (cache, source, clock) = cache_with(FakeTokenSource::default());
        let cache = cache.with_expiry_margin(Duration::from_secs(60));

        cache.get_token().await.unwrap();
        clock.advance(HOUR - Duration::from_secs(61));
        assert_eq!(cache.get_token().await.unwrap(), "token-1");

        clock.advance(Duration::from_secs(1));
        assert_eq!(cache.get_token().await.unwrap(), "token-2");
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn margin_is_capped_at_half_the_lifetime() {
        let (cache, source, clock) = cache_with(FakeTokenSource {
            expires_in: Some(Duration::from_secs(30)),
            ..Default::default()
        });
        let cache = cache.with_expiry_margin(Duration::from_secs(60));

        assert_eq!(cache.get_token().await.unwrap(), "token-1");
        assert!(cache.is_authenticated());

        clock.advance(Duration::from_secs(14));
        assert_eq!(cache.get_token().await.unwrap(), "token-1");

        clock.advance(Duration::from_secs(1));
        assert!(!cache.is_authenticated());
        assert_eq!(cache.get_token().await.unwrap(), "token-2");
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn huge_lifetime_is_capped() {
        let (cache, source, clock) = cache_with(FakeTokenSource {
            expires_in: Some(Duration::from_secs(u64::MAX)),
            ..Default::default()
        });
        let cache = cache.with_expiry_margin(Duration::from_secs(60));

        assert_eq!(cache.get_token().await.unwrap(), "token-1");

        clock.advance(MAX_TOKEN_LIFETIME - Duration::from_secs(1));
        assert_eq!(cache.get_token().await.unwrap(), "token-1");

        clock.advance(Duration::from_secs(1));
        assert_eq!(cache.get_token().await.unwrap(), "token-2");
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn failed_refresh_leaves_cache_untouched() {
        let (cache, source, _clock) = cache_with(FakeTokenSource {
            fail: true,
            ..Default::default()
        });

        let err = cache.get_token().await.unwrap_err();
        assert!(matches!(err, AuthRefreshError::Status { .. }), "{err}");
        assert!(!cache.is_authenticated());

        // Errors are not cached, the next call tries again.
        assert!(cache.get_token().await.is_err());
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn invalidate_forces_refresh() {
        let (cache, source, _clock) = cache_with(FakeTokenSource::default());

        assert_eq!(cache.get_token().await.unwrap(), "token-1");
        cache.invalidate();
        assert_eq!(cache.get_token().await.unwrap(), "token-2");
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_callers_share_one_refresh() {
        let source = Arc::new(FakeTokenSource {
            delay: Some(Duration::from_millis(50)),
            ..Default::default()
        });
        let cache = Arc::new(TokenCache::with_system_clock(source.clone()));

        let tasks = (0..100)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.get_token().await })
            })
            .collect::<Vec<_>>();

        for task in tasks {
            assert_eq!(task.await.unwrap().unwrap(), "token-1");
        }
        assert_eq!(source.calls(), 1);
    }

    #[test]
    fn debug_hides_token() {
        let grant = TokenGrant::new("very-secret-token", HOUR);
        let debug = format!("{grant:?}");
        assert!(!debug.contains("very-secret-token"), "{debug}");
    }
}
