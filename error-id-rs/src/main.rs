// error-id-rs/src/main.rs
// Demo HTTP service for the error ID library
//
// Endpoints:
// - GET /ok     -> success
// - GET /error  -> handled error, wrapped and returned with its ID
// - GET /panic  -> handler panic, recovered by the middleware

use std::collections::HashMap;
use std::env;
use std::net::SocketAddr;

use axum::{
    extract::Query,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use tracing::{info, warn};

use error_id::{Config, Details, ErrorWithId, Settings};

#[derive(Debug, thiserror::Error)]
#[error("database connection failed")]
struct DatabaseUnavailable;

/// GET /ok
async fn ok_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "message": "Everything is working!"
    }))
}

/// GET /error - wraps a business error and returns its ID
async fn error_handler(Query(params): Query<HashMap<String, String>>) -> Response {
    let details = Details::new()
        .add("user_id", params.get("user_id").cloned().unwrap_or_default())
        .add("path", "/error");

    // `None` only when processing succeeded
    match error_id::wrap_with_details(
        process_user_data().err(),
        "user data processing failed",
        Some(details),
    ) {
        Some(wrapped) => error_id::error_response(&wrapped),
        None => Json(serde_json::json!({ "status": "success" })).into_response(),
    }
}

/// GET /panic - recovered by the middleware
async fn panic_handler() -> &'static str {
    let data: Vec<&str> = Vec::new();
    data[100]
}

fn process_user_data() -> Result<(), DatabaseUnavailable> {
    Err(DatabaseUnavailable)
}

fn report_to_ops(err: &ErrorWithId) {
    // Stand-in for an alerting integration
    warn!(error_id = %err.id(), "Error reported to on-call channel");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file
    dotenv::dotenv().ok();

    let settings = Settings::load(env::var("ERROR_ID_CONFIG").ok().as_deref())?;
    error_id::init_logging(Some(settings.logging.clone()))?;

    error_id::configure(Config::from_settings(&settings).with_on_error(report_to_ops));

    let app = error_id::with_recovery(
        Router::new()
            .route("/ok", get(ok_handler))
            .route("/error", get(error_handler))
            .route("/panic", get(panic_handler)),
        error_id::default_handler(),
    );

    let addr: SocketAddr = env::var("ERROR_ID_DEMO_ADDR")
        .unwrap_or_else(|_| "127.0.0.1:8080".to_string())
        .parse()?;

    info!(
        %addr,
        environment = %settings.environment,
        stack_traces = settings.include_stack_trace,
        "error-id demo listening"
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;

    Ok(())
}
