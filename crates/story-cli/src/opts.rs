//! Global CLI options and collaborator selection.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use story_host::{Collaborators, HostConfig, HttpBackend, LocalBackend};

/// Global options for CLI commands.
///
/// These options apply to all commands and can be set via env vars.
#[derive(Args, Debug, Clone)]
pub struct StoryOpts {
    /// Authoring server base URL; local files are used when unset (env: STORY_SERVER_URL)
    #[arg(long, global = true, env = "STORY_SERVER_URL")]
    pub server: Option<String>,

    /// Directory for local saves and listings (env: STORY_DIR, default: current dir)
    #[arg(long, global = true, env = "STORY_DIR")]
    pub dir: Option<PathBuf>,

    /// JSON output envelope
    #[arg(long, global = true)]
    pub json: bool,

    /// Pretty-print JSON output (implies --json)
    #[arg(long, global = true)]
    pub pretty: bool,

    /// Suppress warnings
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Quiet period before autosave, in seconds (env: STORY_AUTOSAVE_SECS)
    #[arg(long, global = true, env = "STORY_AUTOSAVE_SECS")]
    pub autosave_secs: Option<u64>,

    /// Per-request timeout in milliseconds (env: STORY_HTTP_TIMEOUT_MS)
    #[arg(long, global = true, env = "STORY_HTTP_TIMEOUT_MS", hide = true)]
    pub timeout_ms: Option<u64>,
}

impl StoryOpts {
    pub fn root(&self) -> Result<PathBuf> {
        match &self.dir {
            Some(dir) => Ok(dir.clone()),
            None => std::env::current_dir().context("resolve current directory"),
        }
    }

    pub fn host_config(&self) -> HostConfig {
        let mut config = HostConfig::from_env();
        if let Some(secs) = self.autosave_secs {
            config.autosave_delay = Duration::from_secs(secs);
        }
        if let Some(ms) = self.timeout_ms {
            config.request_timeout = Duration::from_millis(ms);
            config.http.timeout = Duration::from_millis(ms);
        }
        if let Some(url) = &self.server {
            config.http.base_url = url.clone();
        }
        config
    }

    /// The HTTP backend when a server is configured, local files otherwise.
    pub fn collaborators(&self, config: &HostConfig) -> Result<Collaborators> {
        let remote = self.server.is_some() || std::env::var_os("STORY_SERVER_URL").is_some();
        if remote {
            let backend = HttpBackend::new(config.http.clone())?;
            tracing::debug!(url = %config.http.base_url, "using authoring server");
            Ok(Collaborators::uniform(Arc::new(backend), config.request_timeout))
        } else {
            let root = self.root()?;
            tracing::debug!(root = %root.display(), "using local directory");
            Ok(Collaborators::uniform(
                Arc::new(LocalBackend::new(root)),
                config.request_timeout,
            ))
        }
    }
}

/// Load `.env` from `dir` without overriding existing environment variables.
pub fn load_env(dir: &std::path::Path) -> Result<()> {
    let env_path = dir.join(".env");
    if env_path.exists() {
        for item in dotenvy::from_path_iter(&env_path).context("load .env")? {
            let (key, val) = item?;
            if std::env::var_os(&key).is_none() {
                unsafe {
                    std::env::set_var(&key, &val);
                }
            }
        }
    }
    Ok(())
}
