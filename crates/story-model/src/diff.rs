//! Change detection between two captured save states.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::document::Document;
use crate::mask::{PathStatus, path_confirmed};
use crate::output::{
    GroupOutput, MaskOutput, WaypointOutput, build_group_output, build_mask_output, build_waypoints,
};

/// Status of the classification map behind mask 0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MapStatus {
    #[default]
    Idle,
    Loading,
    Ready,
    Invalid,
}

impl MapStatus {
    pub fn is_valid(self) -> bool {
        !matches!(self, MapStatus::Invalid | MapStatus::Loading)
    }
}

/// Session flags that sit beside the document and gate saving.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EditorStatus {
    pub error: Option<String>,
    pub saving: bool,
    pub map_status: MapStatus,
    pub path_status: BTreeMap<String, PathStatus>,
}

/// Everything change detection looks at, captured at one instant.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveState {
    pub rotation: f64,
    pub image_name: String,
    pub sample_name: String,
    pub sample_text: String,
    pub author_name: String,
    pub map_status: MapStatus,
    pub masks: Vec<MaskOutput>,
    pub waypoints: Vec<WaypointOutput>,
    pub groups: Vec<GroupOutput>,
    pub error: Option<String>,
    pub saving: bool,
    pub paths_confirmed: bool,
}

impl SaveState {
    pub fn capture(doc: &Document, status: &EditorStatus) -> Self {
        Self {
            rotation: doc.sample.rotation,
            image_name: doc.image_name.clone(),
            sample_name: doc.sample.name.clone(),
            sample_text: doc.sample.text.clone(),
            author_name: doc.author_name.clone(),
            map_status: status.map_status,
            masks: build_mask_output(doc.masks()),
            waypoints: build_waypoints(doc.stories(), doc.groups(), doc.masks()),
            groups: build_group_output(doc),
            error: status.error.clone(),
            saving: status.saving,
            paths_confirmed: doc
                .masks()
                .values()
                .all(|m| path_confirmed(m, &status.path_status)),
        }
    }

    /// Name of the first condition that forbids saving right now.
    pub fn blocker(&self) -> Option<&'static str> {
        if self.error.is_some() {
            Some("error shown")
        } else if self.saving {
            Some("save in flight")
        } else if !self.paths_confirmed {
            Some("mask paths unconfirmed")
        } else if !self.map_status.is_valid() {
            Some("classification map not ready")
        } else {
            None
        }
    }
}

/// Decide whether the change from `prev` to `curr` deserves an autosave.
///
/// A mask output that only shrank does not count: entries are often removed
/// and re-added in separate steps, and the intermediate state is not saved.
pub fn is_save_worthy(prev: &SaveState, curr: &SaveState) -> bool {
    if let Some(reason) = curr.blocker() {
        log::debug!("autosave blocked: {reason}");
        return false;
    }
    let scalars_changed = prev.rotation != curr.rotation
        || prev.image_name != curr.image_name
        || prev.sample_name != curr.sample_name
        || prev.sample_text != curr.sample_text
        || prev.author_name != curr.author_name;
    let map_recovered = prev.map_status == MapStatus::Invalid && curr.map_status.is_valid();
    let masks_grew = curr.masks.len() > prev.masks.len() && curr.masks != prev.masks;

    scalars_changed
        || map_recovered
        || masks_grew
        || curr.waypoints != prev.waypoints
        || curr.groups != prev.groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mask::Mask;

    fn doc() -> Document {
        let mut doc = Document::new("img", &["DNA".to_string()], 1000);
        doc.push_mask(Mask::all_cells("")).unwrap();
        doc
    }

    fn capture(doc: &Document) -> SaveState {
        SaveState::capture(doc, &EditorStatus::default())
    }

    #[test]
    fn identical_states_are_not_worthy() {
        let d = doc();
        let s = capture(&d);
        assert!(!is_save_worthy(&s, &s));
    }

    #[test]
    fn scalar_changes_are_worthy() {
        let mut d = doc();
        let prev = capture(&d);
        d.sample.rotation = 90.0;
        assert!(is_save_worthy(&prev, &capture(&d)));
    }

    #[test]
    fn map_recovery_is_worthy() {
        let d = doc();
        let mut prev = capture(&d);
        prev.map_status = MapStatus::Invalid;
        let mut curr = capture(&d);
        curr.map_status = MapStatus::Ready;
        assert!(is_save_worthy(&prev, &curr));
        prev.map_status = MapStatus::Idle;
        assert!(!is_save_worthy(&prev, &curr));
    }

    #[test]
    fn blockers_win_over_diffs() {
        let d = doc();
        let prev = capture(&d);
        let mut curr = prev.clone();
        curr.author_name = "someone".into();
        let blocks: [fn(&mut SaveState); 4] = [
            |s: &mut SaveState| s.error = Some("boom".into()),
            |s: &mut SaveState| s.saving = true,
            |s: &mut SaveState| s.paths_confirmed = false,
            |s: &mut SaveState| s.map_status = MapStatus::Loading,
        ];
        for block in blocks {
            let mut blocked = curr.clone();
            block(&mut blocked);
            assert!(!is_save_worthy(&prev, &blocked));
        }
        assert!(is_save_worthy(&prev, &curr));
    }
}
