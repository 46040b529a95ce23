use crate::utils::from_env::{EnvItemInfo, FromEnv, FromEnvErr, FromEnvVar};
use std::{
    convert::Infallible,
    net::{AddrParseError, IpAddr, Ipv4Addr, SocketAddr},
    num::ParseIntError,
    path::PathBuf,
    time::Duration,
};

const HOST: &str = "HOST";
const PORT: &str = "PORT";
const POSTS_DIR: &str = "POSTS_DIR";
const NOW_PLAYING_CACHE_TTL: &str = "NOW_PLAYING_CACHE_TTL";

/// How long a now-playing response is reused by default.
pub const DEFAULT_NOW_PLAYING_TTL: Duration = Duration::from_secs(5);

/// Possible errors when loading the server configuration.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum ServerConfigError {
    /// The host is not an IP address.
    #[error("invalid host: {0}")]
    Host(AddrParseError),
    /// The port is not a u16.
    #[error("invalid port: {0}")]
    Port(ParseIntError),
    /// The cache TTL is not a whole number of seconds.
    #[error("invalid now-playing cache ttl: {0}")]
    CacheTtl(ParseIntError),
}

impl From<Infallible> for ServerConfigError {
    fn from(never: Infallible) -> Self {
        match never {}
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address to bind.
    pub host: IpAddr,
    /// Port to bind.
    pub port: u16,
    /// Directory holding `<slug>.md` posts.
    pub posts_dir: PathBuf,
    /// How long a now-playing response is reused. Zero disables reuse.
    pub now_playing_ttl: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 3000,
            posts_dir: PathBuf::from("posts"),
            now_playing_ttl: DEFAULT_NOW_PLAYING_TTL,
        }
    }
}

impl ServerConfig {
    /// The socket address to bind.
    pub const fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl FromEnv for ServerConfig {
    type Error = ServerConfigError;

    fn inventory() -> Vec<&'static EnvItemInfo> {
        vec![
            &EnvItemInfo {
                var: HOST,
                description: "IP address to bind. Defaults to 0.0.0.0",
                optional: true,
            },
            &EnvItemInfo {
                var: PORT,
                description: "Port to bind. Defaults to 3000",
                optional: true,
            },
            &EnvItemInfo {
                var: POSTS_DIR,
                description: "Directory of markdown posts. Defaults to ./posts",
                optional: true,
            },
            &EnvItemInfo {
                var: NOW_PLAYING_CACHE_TTL,
                description: "Seconds to reuse a now-playing response. 0 disables. Defaults to 5",
                optional: true,
            },
        ]
    }

    fn from_env() -> Result<Self, FromEnvErr<Self::Error>> {
        let defaults = Self::default();

        let host = IpAddr::from_env_var_or(HOST, defaults.host)
            .map_err(|e| e.map(ServerConfigError::Host))?;
        let port =
            u16::from_env_var_or(PORT, defaults.port).map_err(|e| e.map(ServerConfigError::Port))?;
        let posts_dir = PathBuf::from_env_var_or(POSTS_DIR, defaults.posts_dir)
            .map_err(|e| e.map(ServerConfigError::from))?;
        let now_playing_ttl =
            Duration::from_env_var_or(NOW_PLAYING_CACHE_TTL, defaults.now_playing_ttl)
                .map_err(|e| e.map(ServerConfigError::CacheTtl))?;

        Ok(Self {
            host,
            port,
            posts_dir,
            now_playing_ttl,
        })
    }
}
