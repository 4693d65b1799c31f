//! Local-directory collaborators: stories and render requests are written
//! under a root directory, paths are validated by existence, and the file
//! browser lists the local filesystem.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use story_model::{GroupOutput, RenderRequest, SubsetResponse};

use super::traits::{FileBrowser, Importer, PathValidator, Persistence, Renderer, SubsetSource};
use crate::protocol::{
    FileEntry, GroupUuid, ImportReply, ImportRequest, Listing, PathValidation, Progress,
    RenderSettingsReply, SaveRequest, SavedMeta,
};

pub const STORY_SUFFIX: &str = ".story.json";
pub const AUTOSAVE_SUFFIX: &str = ".autosave.json";

/// Write `bytes` to `path` through a sibling temp file and a rename, so a
/// reader never sees a half-written story.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp = PathBuf::from(tmp_name);
    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)
}

async fn blocking<T: Send + 'static>(
    f: impl FnOnce() -> anyhow::Result<T> + Send + 'static,
) -> anyhow::Result<T> {
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| anyhow!("blocking task failed: {e}"))?
}

/// Collaborators backed by a local directory.
#[derive(Debug, Clone)]
pub struct LocalBackend {
    root: PathBuf,
}

impl LocalBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Target file for a save request.
    pub fn story_path(&self, request: &SaveRequest) -> PathBuf {
        let (dir, name) = match &request.destination {
            Some(dest) => (PathBuf::from(&dest.root_dir), dest.out_name.trim().to_string()),
            None => (self.root.clone(), stem(&request.story.image_name)),
        };
        let suffix = if request.is_autosave {
            AUTOSAVE_SUFFIX
        } else {
            STORY_SUFFIX
        };
        dir.join(format!("{name}{suffix}"))
    }
}

fn stem(image_name: &str) -> String {
    let base = Path::new(image_name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(image_name);
    let stem = base.split('.').next().unwrap_or(base);
    if stem.is_empty() {
        "story".to_string()
    } else {
        stem.to_string()
    }
}

#[async_trait]
impl Persistence for LocalBackend {
    async fn save(&self, request: &SaveRequest) -> anyhow::Result<SavedMeta> {
        let path = self.story_path(request);
        let bytes = serde_json::to_vec_pretty(&request.story).context("encode story")?;
        let target = path.clone();
        blocking(move || {
            write_atomic(&target, &bytes).with_context(|| format!("write {}", target.display()))
        })
        .await?;
        tracing::debug!(path = %path.display(), autosave = request.is_autosave, "story written");
        Ok(SavedMeta {
            path: Some(path.display().to_string()),
            story_uuid: request.story.story_uuid.clone(),
        })
    }

    async fn create_or_update_render_settings(
        &self,
        image_id: &str,
        groups: &[GroupOutput],
    ) -> anyhow::Result<RenderSettingsReply> {
        let reply = RenderSettingsReply {
            groups: groups
                .iter()
                .enumerate()
                .map(|(id, g)| GroupUuid {
                    id,
                    uuid: g
                        .uuid
                        .clone()
                        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
                })
                .collect(),
        };
        let path = self.root.join(format!("{}.groups.json", stem(image_id)));
        let bytes = serde_json::to_vec_pretty(groups).context("encode groups")?;
        blocking(move || write_atomic(&path, &bytes).context("write render settings")).await?;
        Ok(reply)
    }
}

#[async_trait]
impl Renderer for LocalBackend {
    async fn render(&self, request: &RenderRequest) -> anyhow::Result<()> {
        let path = Path::new(&request.root_dir)
            .join(&request.out_name)
            .join("exhibit.json");
        let bytes = serde_json::to_vec_pretty(&request.story).context("encode exhibit")?;
        blocking(move || write_atomic(&path, &bytes).context("write exhibit")).await
    }

    async fn progress(&self, _session: &str) -> anyhow::Result<Progress> {
        Ok(Progress { progress: 1, max: 1 })
    }
}

#[async_trait]
impl SubsetSource for LocalBackend {
    /// Subsets are read from a `<map>.subsets.json` file beside the map.
    async fn get_subsets(&self, map_key: &str) -> anyhow::Result<SubsetResponse> {
        let path = PathBuf::from(format!("{map_key}.subsets.json"));
        blocking(move || {
            let bytes = fs::read(&path).with_context(|| format!("read {}", path.display()))?;
            serde_json::from_slice(&bytes).context("decode subsets")
        })
        .await
    }
}

#[async_trait]
impl PathValidator for LocalBackend {
    async fn validate_path(&self, key: &str) -> anyhow::Result<PathValidation> {
        let exists = Path::new(key).exists();
        Ok(PathValidation {
            ready: exists,
            invalid: !exists,
            path: key.to_string(),
        })
    }
}

#[async_trait]
impl FileBrowser for LocalBackend {
    async fn list(&self, path: &str, parent: bool) -> anyhow::Result<Listing> {
        let requested = if path.is_empty() {
            self.root.clone()
        } else {
            PathBuf::from(path)
        };
        blocking(move || list_dir(&requested, parent)).await
    }
}

fn list_dir(requested: &Path, parent: bool) -> anyhow::Result<Listing> {
    let dir = if parent {
        requested.parent().unwrap_or(requested).to_path_buf()
    } else {
        requested.to_path_buf()
    };
    let mut entries = Vec::new();
    for entry in fs::read_dir(&dir).with_context(|| format!("list {}", dir.display()))? {
        let entry = entry?;
        let meta = entry.metadata()?;
        entries.push(FileEntry {
            name: entry.file_name().to_string_lossy().into_owned(),
            path: entry.path().display().to_string(),
            is_dir: meta.is_dir(),
            size: meta.is_file().then(|| meta.len()),
        });
    }
    Ok(Listing {
        path: dir.display().to_string(),
        entries,
    })
}

#[async_trait]
impl Importer for LocalBackend {
    /// Local imports accept a JSON import payload on disk.
    async fn import(&self, request: &ImportRequest) -> anyhow::Result<ImportReply> {
        let path = PathBuf::from(&request.filepath);
        let bytes = match blocking(move || fs::read(&path).context("read import file")).await {
            Ok(bytes) => bytes,
            Err(err) => {
                return Ok(ImportReply::Failed {
                    error: format!("IMPORT ERR: {err:#}"),
                });
            }
        };
        Ok(match serde_json::from_slice(&bytes) {
            Ok(payload) => ImportReply::Loaded(payload),
            Err(err) => ImportReply::Failed {
                error: format!("FORMAT ERR: {err}"),
            },
        })
    }
}
