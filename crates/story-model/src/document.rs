//! The live authoring document and every structural edit on it.
//!
//! Edits that renumber a registry also rewrite the references other
//! registries hold into it before returning, so callers never observe a
//! half-applied reindex. Validation happens before the first write.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::channel::{ChanRender, Channel, RenderPatch, Rgb};
use crate::error::{ModelError, ModelResult};
use crate::group::{Group, check_group_label, check_label};
use crate::mask::{ALL_CELLS, Mask, MaskPatch};
use crate::reindex::{
    Key, Registry, insertion_key, prune_after_remove, shift_after_insert, shift_after_remove,
    shift_list_after_insert,
};
use crate::story::{Arrow, Axes, Cluster, Overlay, Pan, Story, StoryPatch, VisKind};
use crate::subsets::CachedSelection;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SampleInfo {
    #[serde(default)]
    pub rotation: f64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub text: String,
}

/// Edits to one visualization slot of a story.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisPatch {
    pub data: Option<String>,
    pub axes: Option<Axes>,
    pub colormap_invert: Option<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub sample: SampleInfo,
    pub image_name: String,
    pub author_name: String,
    pub story_uuid: Option<String>,
    pub image_uuid: Option<String>,
    /// Single RGBA image: groups render as a fixed red/green/blue palette.
    pub rgba: bool,
    channels: Registry<Channel>,
    groups: Registry<Group>,
    stories: Registry<Story>,
    masks: Registry<Mask>,
    /// Mask selections detached from stories while a classification map is
    /// replaced, keyed by story.
    mask_cache: BTreeMap<Key, Vec<CachedSelection>>,
}

impl Document {
    /// Fresh document over an image: one render per channel, a default group
    /// showing every channel and a single empty story.
    pub fn new(image_name: impl Into<String>, channel_labels: &[String], max_range: u32) -> Self {
        let channels = Registry::from_records(
            "channel",
            channel_labels
                .iter()
                .enumerate()
                .map(|(i, label)| Channel::new(i, label.clone(), max_range)),
        );
        let groups = Registry::from_records(
            "group",
            [Group::new("Default", channels.keys().collect())],
        );
        Self {
            sample: SampleInfo::default(),
            image_name: image_name.into(),
            author_name: String::new(),
            story_uuid: None,
            image_uuid: None,
            rgba: false,
            channels,
            groups,
            stories: Registry::from_records("story", [Story::default()]),
            masks: Registry::new("mask"),
            mask_cache: BTreeMap::new(),
        }
    }

    pub(crate) fn from_parts(
        channels: Registry<Channel>,
        groups: Registry<Group>,
        stories: Registry<Story>,
        masks: Registry<Mask>,
    ) -> Self {
        let mut doc = Self {
            sample: SampleInfo::default(),
            image_name: String::new(),
            author_name: String::new(),
            story_uuid: None,
            image_uuid: None,
            rgba: false,
            channels,
            groups,
            stories,
            masks,
            mask_cache: BTreeMap::new(),
        };
        if doc.groups.is_empty() {
            let all = doc.channels.keys().collect();
            doc.groups.push(Group::new("Default", all));
        }
        if doc.stories.is_empty() {
            doc.stories.push(Story::default());
        }
        doc.renumber_group_values();
        doc
    }

    pub fn channels(&self) -> &Registry<Channel> {
        &self.channels
    }

    pub fn groups(&self) -> &Registry<Group> {
        &self.groups
    }

    pub fn stories(&self) -> &Registry<Story> {
        &self.stories
    }

    pub fn masks(&self) -> &Registry<Mask> {
        &self.masks
    }

    pub fn mask_cache(&self) -> &BTreeMap<Key, Vec<CachedSelection>> {
        &self.mask_cache
    }

    // ---------------------------------------------------------------------
    // Channels
    // ---------------------------------------------------------------------

    /// Render used for `channel` inside `group`: the group override when one
    /// exists, otherwise the channel's own settings.
    pub fn effective_render(&self, group: &Group, channel: Key) -> Option<ChanRender> {
        group
            .render
            .get(&channel)
            .copied()
            .or_else(|| self.channels.get(channel).map(|c| c.render))
    }

    /// Patch a channel's render, either globally or as an override inside
    /// `group`.
    pub fn update_channel_render(
        &mut self,
        channel: Key,
        group: Option<Key>,
        patch: &RenderPatch,
    ) -> ModelResult<ChanRender> {
        let base = self.channels.require(channel)?.render;
        match group {
            Some(group) => {
                let mut out = base;
                self.groups.try_update(group, |g| {
                    let current = g.render.get(&channel).copied().unwrap_or(base);
                    out = current.patched(patch)?;
                    g.render.insert(channel, out);
                    Ok(())
                })?;
                Ok(out)
            }
            None => {
                let updated = self.channels.try_update(channel, |c| {
                    c.render = c.render.patched(patch)?;
                    Ok(())
                })?;
                Ok(updated.render)
            }
        }
    }

    // ---------------------------------------------------------------------
    // Groups
    // ---------------------------------------------------------------------

    fn check_channels(&self, ids: &[Key]) -> ModelResult<()> {
        ids.iter().try_for_each(|id| self.channels.ensure(*id))
    }

    fn renumber_group_values(&mut self) {
        self.groups.update_all(|key, g| {
            let changed = g.value != key;
            g.value = key;
            changed
        });
    }

    pub fn insert_group(
        &mut self,
        after: Option<Key>,
        label: &str,
        active_ids: Vec<Key>,
    ) -> ModelResult<Key> {
        check_group_label(&self.groups, label, None)?;
        self.check_channels(&active_ids)?;
        if let Some(after) = after {
            self.groups.ensure(after)?;
        }
        let key = self.groups.insert_after(after, Group::new(label, active_ids))?;
        self.stories.update_all(|_, s| {
            let next = shift_after_insert(s.group, after);
            let changed = next != s.group;
            s.group = next;
            changed
        });
        self.renumber_group_values();
        Ok(key)
    }

    /// Delete a group. Stories showing it fall back to the previous group.
    pub fn remove_group(&mut self, key: Key) -> ModelResult<Group> {
        self.groups.ensure(key)?;
        if self.groups.len() == 1 {
            return Err(ModelError::validation("the last group cannot be deleted"));
        }
        let removed = self.groups.remove(key)?;
        self.stories.update_all(|_, s| {
            let next = shift_after_remove(s.group, key);
            let changed = next != s.group;
            s.group = next;
            changed
        });
        self.renumber_group_values();
        log::debug!("removed group {key} '{}'", removed.label);
        Ok(removed.as_ref().clone())
    }

    pub fn rename_group(&mut self, key: Key, label: &str) -> ModelResult<()> {
        self.groups.ensure(key)?;
        check_group_label(&self.groups, label, Some(key))?;
        self.groups.update(key, |g| g.label = label.to_string())?;
        Ok(())
    }

    pub fn set_group_channels(&mut self, key: Key, active_ids: Vec<Key>) -> ModelResult<()> {
        self.check_channels(&active_ids)?;
        self.groups.update(key, |g| g.active_ids = active_ids)?;
        Ok(())
    }

    /// Record uuids handed back by the render-settings service.
    pub fn assign_group_uuids(&mut self, uuids: &[(Key, String)]) -> ModelResult<()> {
        for (key, _) in uuids {
            self.groups.ensure(*key)?;
        }
        for (key, uuid) in uuids {
            self.groups.update(*key, |g| g.uuid = Some(uuid.clone()))?;
        }
        Ok(())
    }

    pub fn set_sample_rotation(&mut self, rotation: f64) -> ModelResult<()> {
        if !rotation.is_finite() {
            return Err(ModelError::validation("rotation must be finite"));
        }
        self.sample.rotation = rotation;
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Stories
    // ---------------------------------------------------------------------

    fn check_story_name(&self, name: &str, skip: Option<Key>) -> ModelResult<()> {
        check_label(
            "story",
            name,
            self.stories.iter().map(|(k, s)| (k, s.name.as_str())),
            skip,
        )
    }

    fn check_story_refs(&self, group: Key, masks: &[Key]) -> ModelResult<()> {
        self.groups.ensure(group)?;
        masks.iter().try_for_each(|m| self.masks.ensure(*m))
    }

    pub fn insert_story(&mut self, after: Option<Key>, story: Story) -> ModelResult<Key> {
        check_story_numbers(Some(&story.pan), Some(story.zoom), &story.arrows, &story.overlays)?;
        if !story.name.is_empty() {
            self.check_story_name(&story.name, None)?;
        }
        self.check_story_refs(story.group, &story.masks)?;
        let key = self.stories.insert_after(after, story)?;
        self.mask_cache = std::mem::take(&mut self.mask_cache)
            .into_iter()
            .map(|(k, v)| (shift_after_insert(k, after), v))
            .collect();
        Ok(key)
    }

    /// Delete a story. Deleting the last one leaves a fresh default story.
    pub fn remove_story(&mut self, key: Key) -> ModelResult<Story> {
        let removed = self.stories.remove(key)?;
        self.mask_cache = std::mem::take(&mut self.mask_cache)
            .into_iter()
            .filter(|(k, _)| *k != key)
            .map(|(k, v)| (if k > key { k - 1 } else { k }, v))
            .collect();
        if self.stories.is_empty() {
            self.stories.push(Story::default());
        }
        Ok(removed.as_ref().clone())
    }

    pub fn rename_story(&mut self, key: Key, name: &str) -> ModelResult<()> {
        self.stories.ensure(key)?;
        self.check_story_name(name, Some(key))?;
        self.stories.update(key, |s| s.name = name.to_string())?;
        Ok(())
    }

    pub fn update_story(&mut self, key: Key, patch: StoryPatch) -> ModelResult<()> {
        check_story_numbers(
            patch.pan.as_ref(),
            patch.zoom,
            patch.arrows.as_deref().unwrap_or_default(),
            patch.overlays.as_deref().unwrap_or_default(),
        )?;
        {
            let current = self.stories.require(key)?;
            let group = patch.group.unwrap_or(current.group);
            let masks = patch.masks.as_deref().unwrap_or(&current.masks);
            self.check_story_refs(group, masks)?;
        }
        self.stories.update(key, |s| {
            if let Some(text) = patch.text {
                s.text = text;
            }
            if let Some(pan) = patch.pan {
                s.pan = pan;
            }
            if let Some(zoom) = patch.zoom {
                s.zoom = zoom;
            }
            if let Some(group) = patch.group {
                s.group = group;
            }
            if let Some(masks) = patch.masks {
                s.masks = masks;
            }
            if let Some(arrows) = patch.arrows {
                s.arrows = arrows;
            }
            if let Some(overlays) = patch.overlays {
                s.overlays = overlays;
            }
        })?;
        Ok(())
    }

    pub fn add_arrow(&mut self, story: Key, arrow: Arrow) -> ModelResult<usize> {
        check_story_numbers(None, None, std::slice::from_ref(&arrow), &[])?;
        let updated = self.stories.update(story, |s| s.arrows.push(arrow))?;
        Ok(updated.arrows.len() - 1)
    }

    pub fn remove_arrow(&mut self, story: Key, index: usize) -> ModelResult<Arrow> {
        let mut removed = None;
        self.stories.try_update(story, |s| {
            if index >= s.arrows.len() {
                return Err(ModelError::missing("arrow", index));
            }
            removed = Some(s.arrows.remove(index));
            Ok(())
        })?;
        removed.ok_or(ModelError::missing("arrow", index))
    }

    pub fn add_overlay(&mut self, story: Key, overlay: Overlay) -> ModelResult<usize> {
        check_story_numbers(None, None, &[], std::slice::from_ref(&overlay))?;
        let updated = self.stories.update(story, |s| s.overlays.push(overlay))?;
        Ok(updated.overlays.len() - 1)
    }

    pub fn remove_overlay(&mut self, story: Key, index: usize) -> ModelResult<Overlay> {
        let mut removed = None;
        self.stories.try_update(story, |s| {
            if index >= s.overlays.len() {
                return Err(ModelError::missing("overlay", index));
            }
            removed = Some(s.overlays.remove(index));
            Ok(())
        })?;
        removed.ok_or(ModelError::missing("overlay", index))
    }

    /// Add `mask` to a story's selection or take it out again. Returns
    /// whether the mask is selected afterwards.
    pub fn toggle_story_mask(&mut self, story: Key, mask: Key) -> ModelResult<bool> {
        self.masks.ensure(mask)?;
        let updated = self.stories.update(story, |s| {
            if let Some(pos) = s.masks.iter().position(|m| *m == mask) {
                s.masks.remove(pos);
            } else {
                s.masks.push(mask);
            }
        })?;
        Ok(updated.masks.contains(&mask))
    }

    pub fn update_vis(&mut self, story: Key, kind: VisKind, patch: VisPatch) -> ModelResult<()> {
        self.stories.update(story, |s| {
            let vis = s.vis_mut(kind);
            if let Some(data) = patch.data {
                vis.data = data;
            }
            if let Some(axes) = patch.axes {
                vis.axes = axes;
            }
            if let Some(invert) = patch.colormap_invert {
                vis.colormap_invert = invert;
            }
        })?;
        Ok(())
    }

    pub fn insert_cluster(
        &mut self,
        story: Key,
        kind: VisKind,
        after: Option<Key>,
        cluster: Cluster,
    ) -> ModelResult<Key> {
        let mut key = insertion_key(after);
        self.stories.try_update(story, |s| {
            key = s.vis_mut(kind).insert_cluster(after, cluster)?;
            Ok(())
        })?;
        Ok(key)
    }

    pub fn remove_cluster(&mut self, story: Key, kind: VisKind, key: Key) -> ModelResult<Cluster> {
        let mut removed = None;
        self.stories.try_update(story, |s| {
            removed = Some(s.vis_mut(kind).remove_cluster(key)?);
            Ok(())
        })?;
        removed.ok_or(ModelError::missing("cluster", key))
    }

    pub fn update_cluster(
        &mut self,
        story: Key,
        kind: VisKind,
        key: Key,
        name: Option<String>,
        color: Option<Rgb>,
    ) -> ModelResult<()> {
        self.stories.try_update(story, |s| {
            s.vis_mut(kind).clusters.update(key, |c| {
                if let Some(name) = name {
                    c.name = name;
                }
                if let Some(color) = color {
                    c.color = color;
                }
            })?;
            Ok(())
        })?;
        Ok(())
    }

    pub fn set_active_cluster(&mut self, story: Key, kind: VisKind, key: Option<Key>) -> ModelResult<()> {
        self.stories.try_update(story, |s| {
            let vis = s.vis_mut(kind);
            if let Some(key) = key {
                vis.clusters.ensure(key)?;
            }
            vis.active_cluster = key;
            Ok(())
        })?;
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Masks
    // ---------------------------------------------------------------------

    /// Insert a mask after `after`. The all-cells mask always stays at key 0,
    /// so only an empty registry accepts an insert at the front.
    pub fn insert_mask(&mut self, after: Option<Key>, mask: Mask) -> ModelResult<Key> {
        if after.is_none() && !self.masks.is_empty() {
            return Err(ModelError::validation(
                "new masks go after the all-cells mask",
            ));
        }
        let key = self.masks.insert_after(after, mask)?;
        self.stories.update_all(|_, s| {
            let next = shift_list_after_insert(&s.masks, after);
            let changed = next != s.masks;
            s.masks = next;
            changed
        });
        Ok(key)
    }

    /// Append a mask after the current last one.
    pub fn push_mask(&mut self, mask: Mask) -> ModelResult<Key> {
        let after = self.masks.last_key();
        self.insert_mask(after, mask)
    }

    /// Delete a mask, dropping it from every story. Deleting the only mask
    /// reseeds a default all-cells mask.
    pub fn remove_mask(&mut self, key: Key) -> ModelResult<Mask> {
        self.masks.ensure(key)?;
        if key == ALL_CELLS && self.masks.len() > 1 {
            return Err(ModelError::validation(
                "the all-cells mask cannot be deleted while other masks exist",
            ));
        }
        let removed = self.masks.remove(key)?;
        self.stories.update_all(|_, s| {
            let next = prune_after_remove(&s.masks, key);
            let changed = next != s.masks;
            s.masks = next;
            changed
        });
        if self.masks.is_empty() {
            self.masks.push(Mask::default());
        }
        Ok(removed.as_ref().clone())
    }

    pub fn update_mask(&mut self, key: Key, patch: MaskPatch) -> ModelResult<()> {
        self.masks.update(key, |m| {
            if let Some(name) = patch.name {
                m.name = name;
            }
            if let Some(color) = patch.color {
                m.color = color;
            }
            if let Some(path) = patch.path {
                m.path = path;
            }
        })?;
        Ok(())
    }

    pub(crate) fn set_map_path(&mut self, map_path: Option<String>) -> ModelResult<()> {
        if self.masks.is_empty() {
            self.masks.push(Mask::default());
        }
        self.masks.update(ALL_CELLS, |m| m.map_path = map_path)?;
        Ok(())
    }

    pub(crate) fn cache_selection(&mut self, story: Key, entry: CachedSelection) {
        let slot = self.mask_cache.entry(story).or_default();
        if !slot.contains(&entry) {
            slot.push(entry);
        }
    }

    pub(crate) fn take_mask_cache(&mut self) -> BTreeMap<Key, Vec<CachedSelection>> {
        std::mem::take(&mut self.mask_cache)
    }

    /// Select `mask` in `story` unless it already is.
    pub(crate) fn select_mask(&mut self, story: Key, mask: Key) -> ModelResult<bool> {
        self.masks.ensure(mask)?;
        if self.stories.require(story)?.masks.contains(&mask) {
            return Ok(false);
        }
        self.stories.update(story, |s| s.masks.push(mask))?;
        Ok(true)
    }

    // ---------------------------------------------------------------------
    // Invariants
    // ---------------------------------------------------------------------

    /// Verify density and cross references. Violations are defects.
    pub fn check_invariants(&self) -> ModelResult<()> {
        for (kind, dense) in [
            ("channel", self.channels.is_dense()),
            ("group", self.groups.is_dense()),
            ("story", self.stories.is_dense()),
            ("mask", self.masks.is_dense()),
        ] {
            if !dense {
                return Err(ModelError::InvalidInput(format!("{kind} keys are not dense")));
            }
        }
        if self.stories.is_empty() || self.groups.is_empty() {
            return Err(ModelError::InvalidInput("document has no story or group".into()));
        }
        let mut labels: Vec<&str> = self.groups.values().map(|g| g.label.as_str()).collect();
        labels.sort_unstable();
        if labels.windows(2).any(|w| w[0] == w[1]) {
            return Err(ModelError::InvalidInput("duplicate group labels".into()));
        }
        for (key, group) in self.groups.iter() {
            if group.value != key {
                return Err(ModelError::InvalidInput(format!(
                    "group {key} carries value {}",
                    group.value
                )));
            }
            self.check_channels(&group.active_ids)?;
        }
        for (_, story) in self.stories.iter() {
            self.check_story_refs(story.group, &story.masks)?;
            for vis in &story.vis {
                if !vis.clusters.is_dense() {
                    return Err(ModelError::InvalidInput("cluster keys are not dense".into()));
                }
                if let Some(active) = vis.active_cluster {
                    vis.clusters.ensure(active)?;
                }
            }
        }
        Ok(())
    }
}

/// Viewport numbers must be finite.
fn check_story_numbers(
    pan: Option<&Pan>,
    zoom: Option<f64>,
    arrows: &[Arrow],
    overlays: &[Overlay],
) -> ModelResult<()> {
    if pan.is_some_and(|p| !p.is_finite()) {
        return Err(ModelError::validation("pan must be finite"));
    }
    if zoom.is_some_and(|z| !z.is_finite()) {
        return Err(ModelError::validation("zoom must be finite"));
    }
    if !arrows.iter().all(Arrow::is_finite) {
        return Err(ModelError::validation("arrow position and angle must be finite"));
    }
    if !overlays.iter().all(Overlay::is_finite) {
        return Err(ModelError::validation("overlay bounds must be finite"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::IntensityRange;

    fn labels(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("Ch{i}")).collect()
    }

    fn doc_with_groups(names: &[&str]) -> Document {
        let mut doc = Document::new("img", &labels(3), 1000);
        doc.rename_group(0, names[0]).unwrap();
        for (i, name) in names.iter().enumerate().skip(1) {
            doc.insert_group(Some(i - 1), name, vec![0]).unwrap();
        }
        doc
    }

    fn doc_with_masks(n: usize) -> Document {
        let mut doc = Document::new("img", &labels(1), 1000);
        doc.push_mask(Mask::all_cells("seg.tif")).unwrap();
        for i in 1..n {
            doc.push_mask(Mask {
                name: format!("m{i}"),
                ..Default::default()
            })
            .unwrap();
        }
        doc
    }

    #[test]
    fn new_document_is_consistent() {
        let doc = Document::new("img", &labels(2), crate::channel::DEFAULT_MAX_RANGE);
        doc.check_invariants().unwrap();
        assert_eq!(doc.groups().get(0).unwrap().active_ids, vec![0, 1]);
        assert_eq!(doc.stories().len(), 1);
        assert!(doc.masks().is_empty());
    }

    #[test]
    fn group_delete_repoints_stories() {
        let mut doc = doc_with_groups(&["A", "B", "C", "D"]);
        doc.update_story(0, StoryPatch { group: Some(2), ..Default::default() }).unwrap();
        doc.insert_story(Some(0), Story::named("s1", 3)).unwrap();
        doc.insert_story(Some(1), Story::named("s2", 1)).unwrap();
        doc.insert_story(Some(2), Story::named("s3", 0)).unwrap();

        doc.remove_group(2).unwrap();

        let groups: Vec<Key> = doc.stories().values().map(|s| s.group).collect();
        assert_eq!(groups, vec![1, 2, 1, 0]);
        let values: Vec<Key> = doc.groups().values().map(|g| g.value).collect();
        assert_eq!(values, vec![0, 1, 2]);
        doc.check_invariants().unwrap();
    }

    #[test]
    fn group_delete_at_zero_clamps() {
        let mut doc = doc_with_groups(&["A", "B"]);
        doc.remove_group(0).unwrap();
        assert_eq!(doc.stories().get(0).unwrap().group, 0);
        assert_eq!(doc.groups().get(0).unwrap().label, "B");
    }

    #[test]
    fn last_group_is_kept() {
        let mut doc = doc_with_groups(&["A"]);
        assert!(doc.remove_group(0).unwrap_err().is_validation());
        assert_eq!(doc.groups().len(), 1);
    }

    #[test]
    fn group_insert_shifts_story_refs() {
        let mut doc = doc_with_groups(&["A", "B"]);
        doc.update_story(0, StoryPatch { group: Some(1), ..Default::default() }).unwrap();
        let key = doc.insert_group(Some(0), "Between", vec![1]).unwrap();
        assert_eq!(key, 1);
        assert_eq!(doc.stories().get(0).unwrap().group, 2);
        assert_eq!(doc.groups().get(2).unwrap().label, "B");
        doc.check_invariants().unwrap();
    }

    #[test]
    fn rename_collision_leaves_labels() {
        let mut doc = doc_with_groups(&["Group A", "Group B"]);
        let err = doc.rename_group(1, "Group A").unwrap_err();
        assert!(err.is_validation());
        assert_eq!(doc.groups().get(0).unwrap().label, "Group A");
        assert_eq!(doc.groups().get(1).unwrap().label, "Group B");
    }

    #[test]
    fn mask_delete_prunes_and_decrements() {
        let mut doc = doc_with_masks(4);
        doc.update_story(0, StoryPatch { masks: Some(vec![0, 1, 2, 3]), ..Default::default() })
            .unwrap();
        doc.remove_mask(2).unwrap();
        assert_eq!(doc.stories().get(0).unwrap().masks, vec![0, 1, 2]);
        assert_eq!(doc.masks().get(2).unwrap().name, "m3");
        doc.check_invariants().unwrap();
    }

    #[test]
    fn all_cells_mask_is_protected() {
        let mut doc = doc_with_masks(2);
        assert!(doc.remove_mask(0).unwrap_err().is_validation());
        doc.remove_mask(1).unwrap();
        doc.update_story(0, StoryPatch { masks: Some(vec![0]), ..Default::default() }).unwrap();
        doc.remove_mask(0).unwrap();
        assert_eq!(doc.masks().len(), 1);
        assert_eq!(doc.masks().get(0), Some(&Mask::default()));
        assert!(doc.stories().get(0).unwrap().masks.is_empty());
    }

    #[test]
    fn mask_insert_shifts_story_lists() {
        let mut doc = doc_with_masks(3);
        doc.update_story(0, StoryPatch { masks: Some(vec![2, 1]), ..Default::default() }).unwrap();
        let key = doc.insert_mask(Some(0), Mask::default()).unwrap();
        assert_eq!(key, 1);
        assert_eq!(doc.stories().get(0).unwrap().masks, vec![3, 2]);
        assert!(doc.insert_mask(None, Mask::default()).unwrap_err().is_validation());
    }

    #[test]
    fn story_delete_reseeds_and_shifts_cache() {
        let mut doc = doc_with_groups(&["A"]);
        doc.insert_story(Some(0), Story::named("two", 0)).unwrap();
        doc.cache_selection(1, CachedSelection::new("State", "Tumor"));
        doc.remove_story(0).unwrap();
        assert_eq!(doc.mask_cache().keys().copied().collect::<Vec<_>>(), vec![0]);
        doc.remove_story(0).unwrap();
        assert_eq!(doc.stories().len(), 1);
        assert_eq!(doc.stories().get(0), Some(&Story::default()));
        assert!(doc.mask_cache().is_empty());
    }

    #[test]
    fn story_insert_shifts_cache_and_reattaches_to_the_moved_story() {
        let mut doc = doc_with_groups(&["A"]);
        doc.push_mask(Mask::all_cells("seg.tif")).unwrap();
        doc.set_map_path(Some("map.csv".into())).unwrap();
        doc.insert_story(Some(0), Story::named("two", 0)).unwrap();
        doc.cache_selection(1, CachedSelection::new("State", "Tumor"));

        doc.insert_story(Some(0), Story::named("inserted", 0)).unwrap();
        assert_eq!(doc.mask_cache().keys().copied().collect::<Vec<_>>(), vec![2]);
        assert_eq!(doc.stories().get(2).unwrap().name, "two");

        let response = crate::SubsetResponse {
            mask_subsets: vec![("Tumor".into(), vec![1, 2])],
            subset_colors: Vec::new(),
            mask_states: vec!["State".into()],
        };
        let added = crate::subsets::merge_subsets(&mut doc, &response).unwrap();
        assert_eq!(added, vec![1]);
        assert!(doc.mask_cache().is_empty());
        assert_eq!(doc.stories().get(2).unwrap().masks, vec![1]);
        assert!(doc.stories().get(0).unwrap().masks.is_empty());
        assert!(doc.stories().get(1).unwrap().masks.is_empty());
        doc.check_invariants().unwrap();
    }

    #[test]
    fn non_finite_viewport_numbers_are_rejected() {
        let mut doc = doc_with_groups(&["A"]);
        let before = doc.clone();
        assert!(
            doc.update_story(0, StoryPatch { zoom: Some(f64::NAN), ..Default::default() })
                .unwrap_err()
                .is_validation()
        );
        let pan = Pan { x: f64::INFINITY, y: 0.5 };
        assert!(doc.update_story(0, StoryPatch { pan: Some(pan), ..Default::default() }).is_err());
        let arrow = Arrow {
            position: [0.1, f64::NAN],
            angle: 0.0,
            text: String::new(),
            hide_arrow: false,
        };
        assert!(doc.add_arrow(0, arrow).is_err());
        let overlay = Overlay::from([0.0, 0.0, f64::NAN, 1.0]);
        assert!(doc.add_overlay(0, overlay).is_err());
        let story = Story { zoom: f64::NEG_INFINITY, ..Story::named("far", 0) };
        assert!(doc.insert_story(None, story).is_err());
        assert!(doc.set_sample_rotation(f64::NAN).is_err());
        assert_eq!(doc, before);

        doc.set_sample_rotation(90.0).unwrap();
        assert_eq!(doc.sample.rotation, 90.0);
    }

    #[test]
    fn story_refs_must_resolve() {
        let mut doc = doc_with_groups(&["A"]);
        let err = doc
            .update_story(0, StoryPatch { group: Some(4), ..Default::default() })
            .unwrap_err();
        assert!(matches!(err, ModelError::Referential { kind: "group", key: 4 }));
        assert!(doc.insert_story(None, Story { masks: vec![0], ..Default::default() }).is_err());
        assert_eq!(doc.stories().len(), 1);
    }

    #[test]
    fn story_names_are_validated() {
        let mut doc = doc_with_groups(&["A"]);
        doc.rename_story(0, "Overview").unwrap();
        assert!(doc.insert_story(Some(0), Story::named("Overview", 0)).is_err());
        assert!(doc.rename_story(0, "Tumor (CD45+)").is_err());
        assert_eq!(doc.stories().get(0).unwrap().name, "Overview");
    }

    #[test]
    fn group_override_does_not_touch_base_render() {
        let mut doc = doc_with_groups(&["A"]);
        let patch = RenderPatch {
            color: Some(Rgb::RED),
            range: Some(IntensityRange { min: 10, max: 20 }),
            ..Default::default()
        };
        doc.update_channel_render(1, Some(0), &patch).unwrap();
        let group = doc.groups().get(0).unwrap().clone();
        assert_eq!(doc.effective_render(&group, 1).unwrap().color, Rgb::RED);
        assert_ne!(doc.channels().get(1).unwrap().render.color, Rgb::RED);

        let bad = RenderPatch {
            range: Some(IntensityRange { min: 30, max: 20 }),
            ..Default::default()
        };
        assert!(doc.update_channel_render(1, None, &bad).is_err());
        assert_eq!(doc.channels().get(1).unwrap().render.range.max, 1000);
    }

    #[test]
    fn arrows_and_overlays_round_out() {
        let mut doc = doc_with_groups(&["A"]);
        let arrow = Arrow {
            position: [0.2, 0.3],
            angle: 45.0,
            text: "here".into(),
            hide_arrow: false,
        };
        assert_eq!(doc.add_arrow(0, arrow.clone()).unwrap(), 0);
        assert_eq!(doc.remove_arrow(0, 0).unwrap(), arrow);
        assert!(doc.remove_arrow(0, 0).is_err());
        let overlay = Overlay { x: 0.0, y: 0.0, width: 0.1, height: 0.1 };
        doc.add_overlay(0, overlay).unwrap();
        assert_eq!(doc.remove_overlay(0, 0).unwrap(), overlay);
    }

    #[test]
    fn toggle_mask_selection() {
        let mut doc = doc_with_masks(2);
        assert!(doc.toggle_story_mask(0, 1).unwrap());
        assert!(!doc.toggle_story_mask(0, 1).unwrap());
        assert!(doc.toggle_story_mask(0, 7).is_err());
    }
}
