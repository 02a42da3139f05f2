use std::sync::Arc;

use tokio::io::AsyncBufReadExt;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use proctor_utils::dispatch::{BrowserEvent, RawSignal};
use session_monitor::capability::FaceSource;
use session_monitor::config::EnvVars;
use session_monitor::report::{Identity, Reporter};
use session_monitor::session::{ProctorSession, SessionConfig};

/// Runs a proctoring session wired to the aggregation service. Browser
/// events arrive as JSON lines on stdin (one tagged object per line, e.g.
/// `{"event":"tabHidden"}`); camera and microphone providers are supplied
/// by the embedding environment and are absent in the standalone binary.
#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().pretty())
        .with(sentry::integrations::tracing::layer())
        .with(EnvFilter::from_default_env())
        .init();
    tracing::info!("Starting proctoring session monitor...");
    dotenvy::dotenv().ok();

    let env_vars = EnvVars::new();

    let _guard = if let Some(sentry_dsn) = env_vars.sentry_dsn.clone() {
        tracing::info!("initializing Sentry");
        // NOTE: Events are only emitted, once the guard goes out of scope.
        Some(sentry::init((
            sentry_dsn,
            sentry::ClientOptions {
                release: sentry::release_name!(),
                traces_sample_rate: 1.0,
                ..Default::default()
            },
        )))
    } else {
        None
    };

    let identity = Identity {
        exam_id: env_vars.exam_id.clone(),
        email: env_vars.email.clone(),
        username: env_vars.username.clone(),
    };
    let reporter = Arc::new(Reporter::new(&env_vars.api_base_url, identity));
    let config = SessionConfig {
        autosave_interval: env_vars.autosave_interval,
        ..SessionConfig::default()
    };

    let session = ProctorSession::spawn(
        config,
        None,
        FaceSource::Unavailable,
        None,
        None,
        reporter,
    );
    let sender = session.signal_sender();

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();

    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                info!("interrupt received");
                break;
            }
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<BrowserEvent>(line) {
                        Ok(event) => {
                            if sender.send(RawSignal::Browser(event)).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => warn!(error = %e, "unable to parse browser event"),
                    }
                }
                Ok(None) => {
                    info!("event stream closed");
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "unable to read event stream");
                    break;
                }
            }
        }
    }

    // Stop timers and release devices on every exit path
    session.stop().await;
}
