use crate::error::{ConfigServerError, Result};
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder};

/// Prometheus counters for the serving surface, on a private registry
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    file_requests: IntCounterVec,
    client_secrets_issued: IntCounter,
    access_tokens_issued: IntCounter,
    tokens_encrypted: IntCounter,
    repository_active: IntGaugeVec,
}

impl Metrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let file_requests = IntCounterVec::new(
            Opts::new(
                "configserver_file_requests_total",
                "Files requested, by repository and outcome",
            ),
            &["repository", "outcome"],
        )
        .map_err(metric_error)?;
        registry
            .register(Box::new(file_requests.clone()))
            .map_err(metric_error)?;

        let client_secrets_issued = IntCounter::new(
            "configserver_client_secrets_issued_total",
            "Client secrets minted",
        )
        .map_err(metric_error)?;
        registry
            .register(Box::new(client_secrets_issued.clone()))
            .map_err(metric_error)?;

        let access_tokens_issued = IntCounter::new(
            "configserver_access_tokens_issued_total",
            "Access tokens issued through the client credentials flow",
        )
        .map_err(metric_error)?;
        registry
            .register(Box::new(access_tokens_issued.clone()))
            .map_err(metric_error)?;

        let tokens_encrypted = IntCounter::new(
            "configserver_tokens_encrypted_total",
            "Values sealed into substitution tokens",
        )
        .map_err(metric_error)?;
        registry
            .register(Box::new(tokens_encrypted.clone()))
            .map_err(metric_error)?;

        let repository_active = IntGaugeVec::new(
            Opts::new(
                "configserver_repository_active",
                "1 while the repository watcher is running, 0 once stopped",
            ),
            &["repository"],
        )
        .map_err(metric_error)?;
        registry
            .register(Box::new(repository_active.clone()))
            .map_err(metric_error)?;

        Ok(Self {
            registry,
            file_requests,
            client_secrets_issued,
            access_tokens_issued,
            tokens_encrypted,
            repository_active,
        })
    }

    pub fn record_file_request(&self, repository: &str, outcome: &str) {
        self.file_requests
            .with_label_values(&[repository, outcome])
            .inc();
    }

    pub fn client_secret_issued(&self) {
        self.client_secrets_issued.inc();
    }

    pub fn access_token_issued(&self) {
        self.access_tokens_issued.inc();
    }

    pub fn token_encrypted(&self, count: u64) {
        self.tokens_encrypted.inc_by(count);
    }

    pub fn set_repository_active(&self, repository: &str, active: bool) {
        self.repository_active
            .with_label_values(&[repository])
            .set(i64::from(active));
    }

    /// Text exposition format
    pub fn encode(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(metric_error)?;
        String::from_utf8(buffer).map_err(|e| ConfigServerError::Other(e.to_string()))
    }
}

fn metric_error(err: prometheus::Error) -> ConfigServerError {
    ConfigServerError::Other(format!("metrics: {err}"))
}
