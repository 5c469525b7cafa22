use std::env;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{routing::get, Router};
use tokio::net::TcpListener;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod certificate;
mod config;
mod db;
mod error;
mod guard;
mod models;
mod notify;
mod progress;
mod routes;
mod store;

use config::AppConfig;
use guard::AccessGuard;
use notify::{LogNotifier, Notifier};
use progress::ProgressEngine;
use store::PgStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            env::var("RUST_LOG").unwrap_or_else(|_| "coursetrack=info,axum=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env();
    let pool = db::connect().await?;
    // crate-relative path for sqlx migrations
    sqlx::migrate!("./migrations").run(&pool).await?;

    let notifier: Arc<dyn Notifier> = Arc::new(LogNotifier);
    let guard = Arc::new(AccessGuard::new(config.guard.clone(), Arc::clone(&notifier)));
    let engine = ProgressEngine::new(PgStore::new(pool), config.thresholds, notifier);

    {
        let guard = Arc::clone(&guard);
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(std::time::Duration::from_secs(300));
            loop {
                tick.tick().await;
                guard.cleanup();
            }
        });
    }

    let app = Router::new()
        .route("/health", get(|| async { "ok" }))
        .merge(routes::router(routes::AppState { engine, guard }))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any));

    let port: u16 = env::var("PORT").ok().and_then(|s| s.parse().ok()).unwrap_or(8080);
    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("listening on http://0.0.0.0:{}", port);

    // the guard keys on the peer address
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}
