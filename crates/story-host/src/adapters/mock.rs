//! Scriptable in-memory collaborators for tests.
//!
//! [`MockBackend`] implements every collaborator trait, records what it was
//! asked to do and answers from canned responses. Saves can be delayed or
//! made to fail to exercise the autosave guards.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use story_model::{GroupOutput, RenderRequest, SubsetResponse};

use super::traits::{FileBrowser, Importer, PathValidator, Persistence, Renderer, SubsetSource};
use crate::protocol::{
    GroupUuid, ImportReply, ImportRequest, Listing, PathValidation, Progress, RenderSettingsReply,
    SaveRequest, SavedMeta,
};

#[derive(Debug, Default)]
struct MockState {
    saves: Vec<SaveRequest>,
    failing_saves: usize,
    save_delay: Duration,
    render_settings_delay: Duration,
    subsets: HashMap<String, SubsetResponse>,
    subset_delay: Duration,
    paths: HashMap<String, PathValidation>,
    validations: Vec<String>,
    renders: Vec<RenderRequest>,
    progress: VecDeque<Progress>,
    imports: VecDeque<ImportReply>,
    listing: Listing,
}

#[derive(Debug, Default, Clone)]
pub struct MockBackend {
    state: Arc<Mutex<MockState>>,
}

impl MockBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_save_delay(&self, delay: Duration) {
        self.state().save_delay = delay;
    }

    pub fn set_render_settings_delay(&self, delay: Duration) {
        self.state().render_settings_delay = delay;
    }

    /// Make the next `n` saves fail.
    pub fn fail_next_saves(&self, n: usize) {
        self.state().failing_saves = n;
    }

    pub fn set_subsets(&self, map_key: &str, response: SubsetResponse) {
        self.state().subsets.insert(map_key.to_string(), response);
    }

    pub fn set_subset_delay(&self, delay: Duration) {
        self.state().subset_delay = delay;
    }

    pub fn set_path(&self, key: &str, ready: bool, invalid: bool) {
        self.state().paths.insert(
            key.to_string(),
            PathValidation {
                ready,
                invalid,
                path: key.to_string(),
            },
        );
    }

    pub fn push_progress(&self, progress: u64, max: u64) {
        self.state().progress.push_back(Progress { progress, max });
    }

    pub fn push_import(&self, reply: ImportReply) {
        self.state().imports.push_back(reply);
    }

    pub fn set_listing(&self, listing: Listing) {
        self.state().listing = listing;
    }

    pub fn saves(&self) -> Vec<SaveRequest> {
        self.state().saves.clone()
    }

    pub fn validations(&self) -> Vec<String> {
        self.state().validations.clone()
    }

    pub fn renders(&self) -> Vec<RenderRequest> {
        self.state().renders.clone()
    }
}

#[async_trait]
impl Persistence for MockBackend {
    async fn save(&self, request: &SaveRequest) -> anyhow::Result<SavedMeta> {
        let (delay, fail) = {
            let mut state = self.state();
            let fail = state.failing_saves > 0;
            if fail {
                state.failing_saves -= 1;
            } else {
                state.saves.push(request.clone());
            }
            (state.save_delay, fail)
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if fail {
            return Err(anyhow!("connection reset"));
        }
        Ok(SavedMeta {
            path: Some(format!("mock/{}", request.story.image_name)),
            story_uuid: Some("story-uuid".into()),
        })
    }

    async fn create_or_update_render_settings(
        &self,
        _image_id: &str,
        groups: &[GroupOutput],
    ) -> anyhow::Result<RenderSettingsReply> {
        let delay = self.state().render_settings_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(RenderSettingsReply {
            groups: (0..groups.len())
                .map(|id| GroupUuid {
                    id,
                    uuid: format!("group-{id}"),
                })
                .collect(),
        })
    }
}

#[async_trait]
impl Renderer for MockBackend {
    async fn render(&self, request: &RenderRequest) -> anyhow::Result<()> {
        self.state().renders.push(request.clone());
        Ok(())
    }

    async fn progress(&self, _session: &str) -> anyhow::Result<Progress> {
        let next = self.state().progress.pop_front();
        Ok(next.unwrap_or(Progress { progress: 1, max: 1 }))
    }
}

#[async_trait]
impl SubsetSource for MockBackend {
    async fn get_subsets(&self, map_key: &str) -> anyhow::Result<SubsetResponse> {
        let (delay, response) = {
            let state = self.state();
            (state.subset_delay, state.subsets.get(map_key).cloned())
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        response.ok_or_else(|| anyhow!("no subsets for {map_key}"))
    }
}

#[async_trait]
impl PathValidator for MockBackend {
    async fn validate_path(&self, key: &str) -> anyhow::Result<PathValidation> {
        let mut state = self.state();
        state.validations.push(key.to_string());
        Ok(state.paths.get(key).cloned().unwrap_or(PathValidation {
            ready: true,
            invalid: false,
            path: key.to_string(),
        }))
    }
}

#[async_trait]
impl FileBrowser for MockBackend {
    async fn list(&self, _path: &str, _parent: bool) -> anyhow::Result<Listing> {
        Ok(self.state().listing.clone())
    }
}

#[async_trait]
impl Importer for MockBackend {
    async fn import(&self, _request: &ImportRequest) -> anyhow::Result<ImportReply> {
        self.state()
            .imports
            .pop_front()
            .ok_or_else(|| anyhow!("no import scripted"))
    }
}
