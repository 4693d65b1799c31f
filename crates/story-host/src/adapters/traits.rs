use async_trait::async_trait;
use story_model::{GroupOutput, RenderRequest, SubsetResponse};

use crate::protocol::{
    ImportReply, ImportRequest, Listing, PathValidation, Progress, RenderSettingsReply,
    SaveRequest, SavedMeta,
};

#[async_trait]
pub trait Persistence: Send + Sync {
    async fn save(&self, request: &SaveRequest) -> anyhow::Result<SavedMeta>;

    async fn create_or_update_render_settings(
        &self,
        image_id: &str,
        groups: &[GroupOutput],
    ) -> anyhow::Result<RenderSettingsReply>;
}

#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, request: &RenderRequest) -> anyhow::Result<()>;
    async fn progress(&self, session: &str) -> anyhow::Result<Progress>;
}

#[async_trait]
pub trait SubsetSource: Send + Sync {
    async fn get_subsets(&self, map_key: &str) -> anyhow::Result<SubsetResponse>;
}

#[async_trait]
pub trait PathValidator: Send + Sync {
    async fn validate_path(&self, key: &str) -> anyhow::Result<PathValidation>;
}

#[async_trait]
pub trait FileBrowser: Send + Sync {
    async fn list(&self, path: &str, parent: bool) -> anyhow::Result<Listing>;
}

#[async_trait]
pub trait Importer: Send + Sync {
    async fn import(&self, request: &ImportRequest) -> anyhow::Result<ImportReply>;
}
