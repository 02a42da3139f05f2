use sentry::types::Dsn;
use std::{env::var, time::Duration};
use tracing::{error, warn};

#[derive(Clone, Debug)]
pub struct EnvVars {
    pub api_base_url: String,
    pub autosave_interval: Duration,
    pub email: String,
    pub exam_id: String,
    pub sentry_dsn: Option<String>,
    pub username: String,
}

impl EnvVars {
    pub fn new() -> Self {
        let Ok(api_base_url) = var("API_BASE_URL") else {
            error!("API_BASE_URL not set");
            panic!("API_BASE_URL required");
        };
        assert!(!api_base_url.is_empty(), "API_BASE_URL must not be empty");

        let Ok(exam_id) = var("EXAM_ID") else {
            error!("EXAM_ID not set");
            panic!("EXAM_ID required");
        };
        assert!(!exam_id.is_empty(), "EXAM_ID must not be empty");

        let Ok(email) = var("EMAIL") else {
            error!("EMAIL not set");
            panic!("EMAIL required");
        };
        assert!(!email.is_empty(), "EMAIL must not be empty");

        let Ok(username) = var("USERNAME") else {
            error!("USERNAME not set");
            panic!("USERNAME required");
        };

        let sentry_dsn = match var("SENTRY_DSN") {
            Ok(dsn_string) => {
                assert!(
                    valid_sentry_dsn(&dsn_string),
                    "SENTRY_DSN is not valid DSN."
                );
                Some(dsn_string)
            }
            Err(_e) => {
                warn!("SENTRY_DSN not set.");
                None
            }
        };

        let autosave_interval = match var("AUTOSAVE_INTERVAL_IN_S") {
            Ok(v) => {
                let seconds = match v.parse() {
                    Ok(s) => s,
                    Err(e) => {
                        panic!(
                            "AUTOSAVE_INTERVAL_IN_S is not a valid whole number of seconds: {:?}",
                            e
                        );
                    }
                };
                Duration::from_secs(seconds)
            }
            Err(_e) => Duration::from_secs(15),
        };

        Self {
            api_base_url,
            autosave_interval,
            email,
            exam_id,
            sentry_dsn,
            username,
        }
    }
}

fn valid_sentry_dsn(url: &str) -> bool {
    url.parse::<Dsn>().is_ok()
}
