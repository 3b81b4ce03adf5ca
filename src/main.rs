use clap::Parser;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;

use gatekeep::routes::{auth_router, AuthState};

mod logging;

#[derive(Parser, Debug)]
#[command(name = "gatekeep")]
struct Config {
    /// Port to listen on
    #[arg(short, long, default_value_t = 3000)]
    port: u16,

    /// Path to the SQLite database file
    #[arg(short, long, default_value = "gatekeep.db")]
    database: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::setup_logging();
    let config = Config::parse();

    let state = Arc::new(AuthState::from_env(&config.database)?);
    let app = auth_router(state).layer(CorsLayer::permissive());

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr).await?;
    log::info!("Listening on {}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}
