//! Request and response shapes exchanged with the collaborators.

use serde::{Deserialize, Serialize};
use story_model::{DEFAULT_MAX_RANGE, Key, SaveDestination, StoryDefinition};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveRequest {
    pub is_autosave: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<SaveDestination>,
    pub story: StoryDefinition,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SavedMeta {
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub story_uuid: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupUuid {
    pub id: Key,
    pub uuid: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderSettingsReply {
    #[serde(default)]
    pub groups: Vec<GroupUuid>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub progress: u64,
    pub max: u64,
}

impl Progress {
    pub fn is_done(&self) -> bool {
        self.progress >= self.max
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathValidation {
    #[serde(default)]
    pub ready: bool,
    #[serde(default)]
    pub invalid: bool,
    #[serde(default)]
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub name: String,
    pub path: String,
    #[serde(rename = "isDir", default)]
    pub is_dir: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listing {
    pub path: String,
    #[serde(default)]
    pub entries: Vec<FileEntry>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AutosaveLogic {
    #[default]
    Ask,
    Load,
    Skip,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportRequest {
    pub filepath: String,
    #[serde(default)]
    pub csvpath: String,
    #[serde(default)]
    pub dataset: String,
    #[serde(default)]
    pub autosave_logic: AutosaveLogic,
}

fn default_max_range() -> u32 {
    DEFAULT_MAX_RANGE
}

/// Successful import: the image to author against and, when reopening a
/// saved story, its definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportPayload {
    pub image_name: String,
    #[serde(default)]
    pub channels: Vec<String>,
    #[serde(default = "default_max_range")]
    pub max_range: u32,
    #[serde(default)]
    pub rgba: bool,
    #[serde(default)]
    pub author_name: String,
    #[serde(default)]
    pub image_uuid: Option<String>,
    #[serde(default)]
    pub story: Option<StoryDefinition>,
}

/// Raw reply of the import endpoint: either a payload or an error string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ImportReply {
    Failed { error: String },
    Loaded(ImportPayload),
}
