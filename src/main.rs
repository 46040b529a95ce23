use eyre::WrapErr;
use portfolio_api::{
    blog::PostStore,
    cache::ResponseCache,
    server::{router, AppState, ServerConfig},
    spotify::SpotifyConfig,
    utils::from_env::{EnvItemInfo, FromEnv},
};
use tracing::{error, info};

fn report_missing(missing: &[&EnvItemInfo]) {
    for item in missing {
        error!(var = item.var, description = item.description, "Missing required env var");
    }
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let _guard = portfolio_api::init();

    let mut missing = Vec::new();
    if let Err(items) = SpotifyConfig::check_inventory() {
        missing.extend(items);
    }
    if let Err(items) = ServerConfig::check_inventory() {
        missing.extend(items);
    }
    if !missing.is_empty() {
        report_missing(&missing);
        eyre::bail!("{} required environment variable(s) missing", missing.len());
    }

    let spotify = SpotifyConfig::from_env().wrap_err("failed to load spotify config")?;
    let server = ServerConfig::from_env().wrap_err("failed to load server config")?;

    let now_playing = spotify.connect().wrap_err("failed to build http client")?;
    let state = AppState::new(
        now_playing,
        ResponseCache::new(server.now_playing_ttl),
        PostStore::new(&server.posts_dir),
    );

    let addr = server.addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .wrap_err_with(|| format!("failed to bind {addr}"))?;
    info!(%addr, posts_dir = %server.posts_dir.display(), "Serving");

    axum::serve(listener, router(state)).await?;
    Ok(())
}
