//! Configuration for the upstream inference endpoint.
//!
//! A plain struct users construct manually; no config-file parsing
//! dependencies are introduced.

use std::time::Duration;

/// Connection settings for the remote chat-completions service.
///
/// The client tries `base_url` first and falls back to `backup_url` once on
/// a transport failure before surfacing an error.
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub backup_url: String,
    pub api_key: String,
    /// Default model used when a persona does not pin one.
    pub model: String,
    /// Hard timeout applied to each HTTP request.
    pub request_timeout: Duration,
}

impl UpstreamConfig {
    pub fn new(
        base_url: impl Into<String>,
        backup_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            backup_url: backup_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            request_timeout: Duration::from_secs(60),
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self::new(
            "https://api.openai.com/v1",
            "https://api.openai.com/v1",
            "",
            "gpt-4o-mini",
        )
    }
}
