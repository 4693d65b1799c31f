use std::time::Duration;

#[derive(Debug, Clone)]
pub struct HostConfig {
    /// Quiet period after the last qualifying edit before autosave evaluates.
    pub autosave_delay: Duration,
    /// Upper bound for any single collaborator call.
    pub request_timeout: Duration,
    /// How often publish polls render progress.
    pub progress_poll_interval: Duration,
    /// How long publish waits for the renderer to report done.
    pub publish_timeout: Duration,
    /// HTTP adapter configuration (always present).
    pub http: HttpAdapterConfig,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            autosave_delay: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            progress_poll_interval: Duration::from_millis(500),
            publish_timeout: Duration::from_secs(30 * 60),
            http: HttpAdapterConfig::default(),
        }
    }
}

impl HostConfig {
    /// Defaults overridden by `STORY_AUTOSAVE_SECS`, `STORY_PUBLISH_TIMEOUT_SECS`,
    /// `STORY_SERVER_URL` and `STORY_HTTP_TIMEOUT_MS`. Unparseable values are
    /// ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(secs) = env_u64("STORY_AUTOSAVE_SECS") {
            config.autosave_delay = Duration::from_secs(secs);
        }
        if let Some(secs) = env_u64("STORY_PUBLISH_TIMEOUT_SECS") {
            config.publish_timeout = Duration::from_secs(secs);
        }
        if let Ok(url) = std::env::var("STORY_SERVER_URL") {
            config.http.base_url = url;
        }
        if let Some(ms) = env_u64("STORY_HTTP_TIMEOUT_MS") {
            config.http.timeout = Duration::from_millis(ms);
        }
        config
    }
}

fn env_u64(key: &str) -> Option<u64> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(%key, %raw, "ignoring unparseable setting");
            None
        }
    }
}

/// Configuration for the HTTP adapter.
#[derive(Debug, Clone)]
pub struct HttpAdapterConfig {
    pub base_url: String,
    /// Default timeout for requests.
    pub timeout: Duration,
    /// Maximum response body size in bytes.
    pub max_body_size: usize,
}

impl Default for HttpAdapterConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:2020".into(),
            timeout: Duration::from_secs(30),
            max_body_size: 10 * 1024 * 1024, // 10MB
        }
    }
}
