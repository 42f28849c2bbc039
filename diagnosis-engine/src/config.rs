use std::time::Duration;

/// Classifier inference can take a while; the default request timeout is
/// deliberately generous.
const DEFAULT_CLASSIFIER_TIMEOUT: Duration = Duration::from_secs(120);

/// Endpoints of the external collaborators, resolved from the environment
/// with defaults matching the local development topology.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub dl_endpoint: String,
    pub medgemma_endpoint: String,
    pub report_base_url: String,
    pub records_endpoint: String,
    pub classifier_timeout: Duration,
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let classifier_timeout = std::env::var("CLASSIFIER_TIMEOUT_SECS")
            .ok()
            .and_then(|value| value.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_CLASSIFIER_TIMEOUT);

        Self {
            dl_endpoint: env_or("DL_API_URL", "http://127.0.0.1:5001/analyze"),
            medgemma_endpoint: env_or("MEDGEMMA_API_URL", "http://127.0.0.1:5003/analyze"),
            report_base_url: env_or("REPORT_API_URL", "http://127.0.0.1:5001/report"),
            records_endpoint: env_or("RECORDS_API_URL", "http://127.0.0.1:5001/diagnoses"),
            classifier_timeout,
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
