use std::time::Duration;

use axum::{
    Router,
    routing::{get, post},
};
use tokio::signal;
use tower_http::{
    LatencyUnit,
    limit::RequestBodyLimitLayer,
    timeout::TimeoutLayer,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use violation_service::{config, routes};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{}=debug", env!("CARGO_CRATE_NAME")).into()),
        )
        // Log to stdout
        .with(tracing_subscriber::fmt::layer().pretty())
        .init();

    info!("Starting server...");

    let env_vars = config::EnvVars::new();
    let port = env_vars.port;
    let request_timeout_in_ms = env_vars.request_timeout_in_ms;
    let request_body_size_limit = env_vars.request_body_size_limit;

    let client = models::db::client(&env_vars.mongodb_uri)
        .await
        .expect("unable to connect to MongoDB");
    if let Err(e) = models::db::ensure_indexes(&client).await {
        error!("Unable to ensure unique indexes: {e:?}");
    }

    let app_state = config::AppState { client, env_vars };

    let app = Router::new()
        .route("/status/ping", get(routes::get_status_ping))
        .route("/cheatingLogs", post(routes::post_cheating_log))
        .route("/cheatingLogs/{exam_id}", get(routes::get_cheating_logs))
        .route(
            "/cheatingLogs/detailed/{exam_id}",
            get(routes::get_detailed_cheating_logs),
        )
        .route("/exam/questions/{exam_id}", get(routes::get_questions))
        .route("/exam/{exam_id}/submit", post(routes::post_submit))
        .route("/exam/{exam_id}/verify-code", post(routes::post_verify_code))
        .layer(TimeoutLayer::new(Duration::from_millis(
            request_timeout_in_ms,
        )))
        .layer(RequestBodyLimitLayer::new(request_body_size_limit))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().include_headers(true))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(
                    DefaultOnResponse::new()
                        .level(Level::INFO)
                        .latency_unit(LatencyUnit::Micros),
                ),
        )
        .with_state(app_state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .unwrap();
    let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal());

    if let Err(err) = server.await {
        error!("Server error: {}", err);
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
