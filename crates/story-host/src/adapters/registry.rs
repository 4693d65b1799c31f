use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use story_model::{GroupOutput, RenderRequest, SubsetResponse};
use tokio::time::timeout;

use super::traits::{FileBrowser, Importer, PathValidator, Persistence, Renderer, SubsetSource};
use crate::error::{HostError, HostResult};
use crate::protocol::{
    ImportReply, ImportRequest, Listing, PathValidation, Progress, RenderSettingsReply,
    SaveRequest, SavedMeta,
};

/// The set of collaborators a session talks to. Every call is bounded by
/// the configured timeout and adapter errors become [`HostError::Transient`].
#[derive(Clone)]
pub struct Collaborators {
    persistence: Arc<dyn Persistence>,
    renderer: Arc<dyn Renderer>,
    subsets: Arc<dyn SubsetSource>,
    validator: Arc<dyn PathValidator>,
    browser: Arc<dyn FileBrowser>,
    importer: Arc<dyn Importer>,
    timeout: Duration,
}

impl Collaborators {
    /// Use one backend for every concern.
    pub fn uniform<B>(backend: Arc<B>, timeout: Duration) -> Self
    where
        B: Persistence + Renderer + SubsetSource + PathValidator + FileBrowser + Importer + 'static,
    {
        Self {
            persistence: backend.clone(),
            renderer: backend.clone(),
            subsets: backend.clone(),
            validator: backend.clone(),
            browser: backend.clone(),
            importer: backend,
            timeout,
        }
    }

    pub fn with_persistence(mut self, persistence: Arc<dyn Persistence>) -> Self {
        self.persistence = persistence;
        self
    }

    pub fn with_browser(mut self, browser: Arc<dyn FileBrowser>) -> Self {
        self.browser = browser;
        self
    }

    async fn call<T>(
        &self,
        what: &'static str,
        fut: impl Future<Output = anyhow::Result<T>>,
    ) -> HostResult<T> {
        match timeout(self.timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(HostError::Transient(format!("{what}: {err:#}"))),
            Err(_) => Err(HostError::Timeout(what.to_string())),
        }
    }

    pub async fn save(&self, request: &SaveRequest) -> HostResult<SavedMeta> {
        self.call("save", self.persistence.save(request)).await
    }

    pub async fn render_settings(
        &self,
        image_id: &str,
        groups: &[GroupOutput],
    ) -> HostResult<RenderSettingsReply> {
        self.call(
            "render settings",
            self.persistence.create_or_update_render_settings(image_id, groups),
        )
        .await
    }

    pub async fn render(&self, request: &RenderRequest) -> HostResult<()> {
        self.call("render", self.renderer.render(request)).await
    }

    pub async fn progress(&self, session: &str) -> HostResult<Progress> {
        self.call("progress", self.renderer.progress(session)).await
    }

    pub async fn subsets(&self, map_key: &str) -> HostResult<SubsetResponse> {
        self.call("mask subsets", self.subsets.get_subsets(map_key)).await
    }

    pub async fn validate_path(&self, key: &str) -> HostResult<PathValidation> {
        self.call("path validation", self.validator.validate_path(key))
            .await
    }

    pub async fn list(&self, path: &str, parent: bool) -> HostResult<Listing> {
        self.call("file browser", self.browser.list(path, parent)).await
    }

    pub async fn import(&self, request: &ImportRequest) -> HostResult<ImportReply> {
        self.call("import", self.importer.import(request)).await
    }
}
