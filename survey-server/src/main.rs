use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{info, Level};

use survey_core::SqliteGateway;
use survey_server::config::Config;
use survey_server::routes::app_router;
use survey_server::session_store::session_pruning_loop;
use survey_server::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    info!("Starting survey session service");

    let config = Config::from_env().context("Failed to load configuration from environment")?;

    let db_path = config.state_dir.join("survey.db");
    let gateway = Arc::new(
        SqliteGateway::new(&db_path)
            .with_context(|| format!("Failed to open record store at {}", db_path.display()))?,
    );
    info!("Record store at {}", db_path.display());

    let state = Arc::new(AppState::new(gateway));

    tokio::spawn(session_pruning_loop(
        state.store.clone(),
        config.session_idle_ttl_secs,
    ));

    let app = app_router(state).layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()));

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Listening on {}", addr);

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
