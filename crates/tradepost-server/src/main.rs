use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use tradepost_api::auth::{AppStateInner, AuthKeys};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tradepost=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let secrets: Vec<String> = std::env::var("TRADEPOST_JWT_SECRETS")
        .unwrap_or_else(|_| "dev-secret-change-me".into())
        .split(',')
        .map(|s| s.trim().to_string())
        .collect();
    let db_path = std::env::var("TRADEPOST_DB_PATH").unwrap_or_else(|_| "tradepost.db".into());
    let host = std::env::var("TRADEPOST_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("TRADEPOST_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;

    // Init database; an unreachable database is a startup failure.
    let db = tradepost_db::Database::open(&PathBuf::from(&db_path))?;

    // Shared state
    let state = Arc::new(AppStateInner {
        db,
        auth: AuthKeys::new(secrets)?,
    });

    let app = tradepost_api::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("tradepost server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
