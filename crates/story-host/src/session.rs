//! The authoring session: one live document plus the flags and
//! presentation state around it.

use serde::{Deserialize, Serialize};
use story_model::mask::viewer_masks;
use story_model::{
    Arrow, ChanRender, Cluster, Document, EditorStatus, Key, Mask, MaskPatch, ModelError, ModelResult,
    Overlay, RenderPatch, Rgb, SaveDestination, SaveState, Story, StoryPatch, VisKind, VisPatch,
    build_story_definition,
};

use crate::error::HostResult;
use crate::protocol::{ImportPayload, Progress, SaveRequest};

/// Edits to the document itself. Every one of them qualifies for autosave.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Edit {
    SetSample {
        #[serde(default)]
        rotation: Option<f64>,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        text: Option<String>,
    },
    SetImageName {
        name: String,
    },
    SetAuthor {
        name: String,
    },
    UpdateChannelRender {
        channel: Key,
        #[serde(default)]
        group: Option<Key>,
        patch: RenderPatch,
    },
    InsertGroup {
        #[serde(default)]
        after: Option<Key>,
        label: String,
        #[serde(default)]
        channels: Vec<Key>,
    },
    RemoveGroup {
        key: Key,
    },
    RenameGroup {
        key: Key,
        label: String,
    },
    SetGroupChannels {
        key: Key,
        channels: Vec<Key>,
    },
    InsertStory {
        #[serde(default)]
        after: Option<Key>,
        #[serde(default)]
        name: String,
        #[serde(default)]
        group: Key,
    },
    RemoveStory {
        key: Key,
    },
    RenameStory {
        key: Key,
        name: String,
    },
    UpdateStory {
        key: Key,
        patch: StoryPatch,
    },
    AddArrow {
        story: Key,
        arrow: Arrow,
    },
    RemoveArrow {
        story: Key,
        index: usize,
    },
    AddOverlay {
        story: Key,
        overlay: Overlay,
    },
    RemoveOverlay {
        story: Key,
        index: usize,
    },
    ToggleMask {
        story: Key,
        mask: Key,
    },
    UpdateVis {
        story: Key,
        kind: VisKind,
        patch: VisPatch,
    },
    InsertCluster {
        story: Key,
        kind: VisKind,
        #[serde(default)]
        after: Option<Key>,
        cluster: Cluster,
    },
    RemoveCluster {
        story: Key,
        kind: VisKind,
        key: Key,
    },
    UpdateCluster {
        story: Key,
        kind: VisKind,
        key: Key,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        color: Option<Rgb>,
    },
    InsertMask {
        #[serde(default)]
        after: Option<Key>,
        mask: Mask,
    },
    RemoveMask {
        key: Key,
    },
    UpdateMask {
        key: Key,
        patch: MaskPatch,
    },
}

/// Presentation-only changes. They never arm autosave.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ViewEdit {
    ShowModal { name: Option<String> },
    SelectStory { key: Key },
    SelectGroup { key: Key },
    SelectMask { key: Option<Key> },
    DismissError,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Change {
    Doc(Edit),
    View(ViewEdit),
}

impl Change {
    pub fn is_qualifying(&self) -> bool {
        matches!(self, Change::Doc(_))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ViewState {
    pub modal: Option<String>,
    pub active_story: Key,
    pub active_group: Key,
    pub active_mask: Option<Key>,
    pub publish_progress: Option<Progress>,
}

/// What the image viewer should draw for the active story.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewerProjection {
    pub story: Key,
    pub channels: Vec<(Key, ChanRender)>,
    pub masks: Vec<Key>,
}

#[derive(Debug, Clone)]
pub struct Session {
    doc: Document,
    status: EditorStatus,
    view: ViewState,
    /// Bumped on every classification-map change.
    map_generation: u64,
}

impl Session {
    pub fn new(doc: Document) -> Self {
        Self {
            doc,
            status: EditorStatus::default(),
            view: ViewState::default(),
            map_generation: 0,
        }
    }

    /// Build a session from an import: hydrate the embedded story when there
    /// is one, otherwise start a fresh document over the image.
    pub fn from_payload(payload: &ImportPayload) -> HostResult<Self> {
        let mut doc = match &payload.story {
            Some(def) => Document::from_story_definition(
                def,
                &payload.channels,
                payload.max_range,
                payload.rgba,
            )?,
            None => {
                let mut doc =
                    Document::new(payload.image_name.clone(), &payload.channels, payload.max_range);
                doc.rgba = payload.rgba;
                doc
            }
        };
        if doc.image_name.is_empty() {
            doc.image_name = payload.image_name.clone();
        }
        if doc.author_name.is_empty() {
            doc.author_name = payload.author_name.clone();
        }
        if doc.image_uuid.is_none() {
            doc.image_uuid = payload.image_uuid.clone();
        }
        Ok(Self::new(doc))
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    pub(crate) fn document_mut(&mut self) -> &mut Document {
        &mut self.doc
    }

    pub fn status(&self) -> &EditorStatus {
        &self.status
    }

    pub(crate) fn status_mut(&mut self) -> &mut EditorStatus {
        &mut self.status
    }

    pub fn map_generation(&self) -> u64 {
        self.map_generation
    }

    pub(crate) fn next_map_generation(&mut self) -> u64 {
        self.map_generation += 1;
        self.map_generation
    }

    pub fn view(&self) -> &ViewState {
        &self.view
    }

    pub(crate) fn set_publish_progress(&mut self, progress: Option<Progress>) {
        self.view.publish_progress = progress;
    }

    pub fn show_error(&mut self, message: impl Into<String>) {
        self.status.error = Some(message.into());
    }

    pub fn capture(&self) -> SaveState {
        SaveState::capture(&self.doc, &self.status)
    }

    pub fn save_request(&self, is_autosave: bool, destination: Option<SaveDestination>) -> SaveRequest {
        SaveRequest {
            is_autosave,
            destination,
            story: build_story_definition(&self.doc),
        }
    }

    /// Apply a change and report whether it qualifies for autosave.
    /// Validation failures are shown to the user and leave the document
    /// untouched; referential failures are returned.
    pub fn apply(&mut self, change: Change) -> ModelResult<bool> {
        match change {
            Change::View(edit) => {
                self.apply_view(edit);
                Ok(false)
            }
            Change::Doc(edit) => match self.apply_edit(edit) {
                Ok(()) => Ok(true),
                Err(err) if !err.is_defect() => {
                    self.show_error(err.to_string());
                    Ok(false)
                }
                Err(err) => Err(err),
            },
        }
    }

    fn apply_view(&mut self, edit: ViewEdit) {
        match edit {
            ViewEdit::ShowModal { name } => self.view.modal = name,
            ViewEdit::SelectStory { key } => self.view.active_story = key,
            ViewEdit::SelectGroup { key } => self.view.active_group = key,
            ViewEdit::SelectMask { key } => self.view.active_mask = key,
            ViewEdit::DismissError => self.status.error = None,
        }
    }

    fn apply_edit(&mut self, edit: Edit) -> Result<(), ModelError> {
        let doc = &mut self.doc;
        match edit {
            Edit::SetSample { rotation, name, text } => {
                if let Some(rotation) = rotation {
                    doc.set_sample_rotation(rotation)?;
                }
                if let Some(name) = name {
                    doc.sample.name = name;
                }
                if let Some(text) = text {
                    doc.sample.text = text;
                }
            }
            Edit::SetImageName { name } => doc.image_name = name,
            Edit::SetAuthor { name } => doc.author_name = name,
            Edit::UpdateChannelRender { channel, group, patch } => {
                doc.update_channel_render(channel, group, &patch)?;
            }
            Edit::InsertGroup { after, label, channels } => {
                let key = doc.insert_group(after, &label, channels)?;
                self.view.active_group = key;
            }
            Edit::RemoveGroup { key } => {
                doc.remove_group(key)?;
                self.view.active_group = self.view.active_group.min(doc.groups().len() - 1);
            }
            Edit::RenameGroup { key, label } => doc.rename_group(key, &label)?,
            Edit::SetGroupChannels { key, channels } => doc.set_group_channels(key, channels)?,
            Edit::InsertStory { after, name, group } => {
                let key = doc.insert_story(after, Story::named(name, group))?;
                self.view.active_story = key;
            }
            Edit::RemoveStory { key } => {
                doc.remove_story(key)?;
                self.view.active_story = self.view.active_story.min(doc.stories().len() - 1);
            }
            Edit::RenameStory { key, name } => doc.rename_story(key, &name)?,
            Edit::UpdateStory { key, patch } => doc.update_story(key, patch)?,
            Edit::AddArrow { story, arrow } => {
                doc.add_arrow(story, arrow)?;
            }
            Edit::RemoveArrow { story, index } => {
                doc.remove_arrow(story, index)?;
            }
            Edit::AddOverlay { story, overlay } => {
                doc.add_overlay(story, overlay)?;
            }
            Edit::RemoveOverlay { story, index } => {
                doc.remove_overlay(story, index)?;
            }
            Edit::ToggleMask { story, mask } => {
                doc.toggle_story_mask(story, mask)?;
            }
            Edit::UpdateVis { story, kind, patch } => doc.update_vis(story, kind, patch)?,
            Edit::InsertCluster { story, kind, after, cluster } => {
                doc.insert_cluster(story, kind, after, cluster)?;
            }
            Edit::RemoveCluster { story, kind, key } => {
                doc.remove_cluster(story, kind, key)?;
            }
            Edit::UpdateCluster { story, kind, key, name, color } => {
                doc.update_cluster(story, kind, key, name, color)?;
            }
            Edit::InsertMask { after, mask } => {
                let key = doc.insert_mask(after, mask)?;
                self.view.active_mask = Some(key);
            }
            Edit::RemoveMask { key } => {
                doc.remove_mask(key)?;
                self.view.active_mask = None;
            }
            Edit::UpdateMask { key, patch } => doc.update_mask(key, patch)?,
        }
        Ok(())
    }

    /// Channels and masks for the active story. Masks whose image is not
    /// confirmed ready stay hidden.
    pub fn viewer_projection(&self) -> ViewerProjection {
        let key = self.view.active_story.min(self.doc.stories().len().saturating_sub(1));
        let Some(story) = self.doc.stories().get(key) else {
            return ViewerProjection {
                story: key,
                channels: Vec::new(),
                masks: Vec::new(),
            };
        };
        let visible = viewer_masks(self.doc.masks(), &self.status.path_status);
        let channels = self
            .doc
            .groups()
            .get(story.group)
            .map(|group| {
                group
                    .active_ids
                    .iter()
                    .filter_map(|id| self.doc.effective_render(group, *id).map(|r| (*id, r)))
                    .filter(|(_, r)| r.visible)
                    .collect()
            })
            .unwrap_or_default();
        ViewerProjection {
            story: key,
            channels,
            masks: story
                .masks
                .iter()
                .copied()
                .filter(|m| visible.contains(m))
                .collect(),
        }
    }
}
