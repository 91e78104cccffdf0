use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use gatekeeper::core::auth::{
    AuthApiState, AuthService, JwtService, OpaqueTokenManager, PasswordHasher, auth_api_router,
};
use gatekeeper::core::config::Config;
use gatekeeper::core::db::{
    DbConfig, SessionRepository, SessionStore, UserRepository, UserStore,
    create_pool_with_migrations,
};
use gatekeeper::core::ratelimit::{ClientRateLimiter, ProxyTrust};
use gatekeeper::core::telemetry;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file (if exists)
    let _ = dotenvy::dotenv();

    let config = Config::from_env()?;
    telemetry::init_tracing(&config.log.format, &config.log.filter)?;

    // Log config status (without revealing secrets)
    info!(
        addr = %config.server_addr,
        database = config.has_database(),
        access_minutes = config.auth.access_token_minutes,
        refresh_hours = config.auth.refresh_token_hours,
        "config loaded"
    );

    let pool = create_pool_with_migrations(&DbConfig::new(config.database_url()?)).await?;
    let users: Arc<dyn UserStore> = Arc::new(UserRepository::new(pool.clone()));
    let sessions: Arc<dyn SessionStore> = Arc::new(SessionRepository::new(pool));

    let auth_service = AuthService::new(
        users,
        sessions,
        JwtService::new(config.auth.jwt_config())?,
        PasswordHasher::new(config.auth.bcrypt_cost),
        OpaqueTokenManager::new(config.auth.refresh_token_bytes),
        config.auth.refresh_ttl(),
    )?;

    let limiter = Arc::new(
        ClientRateLimiter::new(config.rate_limit.requests, config.rate_limit.period())?
            .with_proxy_trust(ProxyTrust::from_flag(config.rate_limit.trust_proxy_headers)),
    );
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = limiter.clone().spawn_sweeper(shutdown_rx);

    let app = Router::new()
        .merge(auth_api_router(AuthApiState { auth_service }, limiter))
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(config.server_addr).await?;
    info!("listening on http://{}", config.server_addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    let _ = shutdown_tx.send(true);
    sweeper.await?;
    info!("gracefully shut down");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
