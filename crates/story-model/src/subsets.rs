//! Merging classification subsets into the mask registry.
//!
//! Replacing the classification map behind mask 0 throws away every other
//! mask. Stories that had subset masks selected keep a note of them in the
//! document's mask cache, and once the new subsets arrive each note is
//! matched by state label and subset name and re-selected.

use serde::{Deserialize, Serialize};

use crate::channel::Rgb;
use crate::diff::MapStatus;
use crate::document::Document;
use crate::error::{ModelError, ModelResult};
use crate::mask::{ALL_CELLS, Mask};
use crate::reindex::Key;

const DEFAULT_STATE: &str = "State";

/// State labels the classification tool uses interchangeably.
const STATE_SYNONYMS: (&str, &str) = ("State", "State1");

/// Reply of the classification-subset service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubsetResponse {
    #[serde(default)]
    pub mask_subsets: Vec<(String, Vec<u64>)>,
    #[serde(default)]
    pub subset_colors: Vec<[u8; 3]>,
    #[serde(default)]
    pub mask_states: Vec<String>,
}

impl SubsetResponse {
    pub fn validate(&self) -> ModelResult<()> {
        if let Some(i) = self.mask_subsets.iter().position(|(name, _)| name.trim().is_empty()) {
            return Err(ModelError::InvalidInput(format!("subset {i} has no name")));
        }
        Ok(())
    }

    pub fn state_label(&self) -> &str {
        self.mask_states
            .first()
            .map(String::as_str)
            .unwrap_or(DEFAULT_STATE)
    }
}

/// A story's selection of one subset mask, remembered across a map change.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CachedSelection {
    pub state_label: String,
    pub cache_name: String,
}

impl CachedSelection {
    pub fn new(state_label: impl Into<String>, cache_name: impl Into<String>) -> Self {
        Self {
            state_label: state_label.into(),
            cache_name: cache_name.into(),
        }
    }
}

/// True when a cached state label refers to the same state as `candidate`.
pub fn labels_match(cached: &str, candidate: &str) -> bool {
    let (a, b) = STATE_SYNONYMS;
    cached == candidate || (cached == a && candidate == b) || (cached == b && candidate == a)
}

/// Note every subset selection in the mask cache, then drop all masks but
/// mask 0. Returns how many selections were cached.
pub fn detach_subset_masks(doc: &mut Document) -> ModelResult<usize> {
    let mut notes = Vec::new();
    for (story_key, story) in doc.stories().iter() {
        for mask_key in &story.masks {
            let mask = doc.masks().require(*mask_key)?;
            if *mask_key == ALL_CELLS {
                continue;
            }
            if let Some(cache_name) = &mask.cache_name {
                let state = mask.state_label.as_deref().unwrap_or(DEFAULT_STATE);
                notes.push((story_key, CachedSelection::new(state, cache_name.clone())));
            }
        }
    }
    let cached = notes.len();
    for (story, note) in notes {
        doc.cache_selection(story, note);
    }
    while let Some(last) = doc.masks().last_key().filter(|k| *k != ALL_CELLS) {
        doc.remove_mask(last)?;
    }
    Ok(cached)
}

/// Clear the classification map: only mask 0 remains.
pub fn clear_classification_map(doc: &mut Document) -> ModelResult<MapStatus> {
    detach_subset_masks(doc)?;
    doc.set_map_path(None)?;
    Ok(MapStatus::Ready)
}

/// Point mask 0 at a new classification map and drop the old subsets. The
/// caller fetches the subsets and hands them to [`merge_subsets`].
pub fn begin_classification_map(doc: &mut Document, map_path: &str) -> ModelResult<MapStatus> {
    detach_subset_masks(doc)?;
    doc.set_map_path(Some(map_path.to_string()))?;
    Ok(MapStatus::Loading)
}

/// Add one mask per non-empty subset and reattach cached selections.
/// Returns the keys of the new masks.
pub fn merge_subsets(doc: &mut Document, response: &SubsetResponse) -> ModelResult<Vec<Key>> {
    response.validate()?;
    let base = doc.masks().require(ALL_CELLS)?.clone();
    let state = response.state_label().to_string();
    let mut added = Vec::new();
    for (i, (name, ids)) in response.mask_subsets.iter().enumerate() {
        if ids.is_empty() {
            continue;
        }
        let color = response
            .subset_colors
            .get(i)
            .map(|rgb| Rgb(*rgb))
            .unwrap_or_else(|| Rgb::palette(i));
        let key = doc.push_mask(Mask {
            name: name.clone(),
            color,
            path: base.path.clone(),
            map_path: base.map_path.clone(),
            cache_name: Some(name.clone()),
            state_label: Some(state.clone()),
            map_ids: ids.clone(),
        })?;
        added.push(key);
    }
    let reattached = reattach_cached(doc)?;
    log::debug!("merged {} subsets, reattached {reattached}", added.len());
    Ok(added)
}

/// Re-select cached subset masks, exact labels first, then synonyms.
/// Unmatched notes are dropped and the cache is emptied.
pub fn reattach_cached(doc: &mut Document) -> ModelResult<usize> {
    let cache = doc.take_mask_cache();
    let mut reattached = 0;
    for (story, notes) in cache {
        if !doc.stories().contains(story) {
            continue;
        }
        for note in notes {
            let subset = |exact: bool| {
                doc.masks().iter().find_map(|(key, mask)| {
                    let state = mask.state_label.as_deref()?;
                    let same_state = if exact {
                        state == note.state_label
                    } else {
                        labels_match(&note.state_label, state)
                    };
                    (key != ALL_CELLS
                        && same_state
                        && mask.cache_name.as_deref() == Some(note.cache_name.as_str()))
                    .then_some(key)
                })
            };
            let found = subset(true).or_else(|| subset(false));
            if let Some(mask) = found {
                if doc.select_mask(story, mask)? {
                    reattached += 1;
                }
            }
        }
    }
    Ok(reattached)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::story::StoryPatch;

    fn tumor_doc() -> Document {
        let mut doc = Document::new("img", &["DNA".to_string()], 1000);
        doc.push_mask(Mask::all_cells("seg.tif")).unwrap();
        doc.push_mask(Mask {
            name: "TumorCells".into(),
            path: "seg.tif".into(),
            map_path: Some("old.csv".into()),
            cache_name: Some("TumorCells".into()),
            state_label: Some("State".into()),
            map_ids: vec![1, 2],
            ..Default::default()
        })
        .unwrap();
        doc.update_story(0, StoryPatch { masks: Some(vec![0, 1]), ..Default::default() })
            .unwrap();
        doc
    }

    fn response(state: &str) -> SubsetResponse {
        SubsetResponse {
            mask_subsets: vec![
                ("Empty".into(), vec![]),
                ("TumorCells".into(), vec![3, 4]),
            ],
            subset_colors: vec![[1, 2, 3]],
            mask_states: vec![state.into()],
        }
    }

    #[test]
    fn synonyms_match_both_ways() {
        assert!(labels_match("State", "State1"));
        assert!(labels_match("State1", "State"));
        assert!(labels_match("Phenotype", "Phenotype"));
        assert!(!labels_match("State", "State2"));
    }

    #[test]
    fn clearing_map_keeps_only_all_cells() {
        let mut doc = tumor_doc();
        assert_eq!(clear_classification_map(&mut doc).unwrap(), MapStatus::Ready);
        assert_eq!(doc.masks().len(), 1);
        assert_eq!(doc.masks().get(0).unwrap().map_path, None);
        assert_eq!(doc.stories().get(0).unwrap().masks, vec![0]);
        assert_eq!(doc.mask_cache()[&0], vec![CachedSelection::new("State", "TumorCells")]);
    }

    #[test]
    fn new_map_reattaches_through_synonym_once() {
        let mut doc = tumor_doc();
        assert_eq!(begin_classification_map(&mut doc, "new.csv").unwrap(), MapStatus::Loading);
        let added = merge_subsets(&mut doc, &response("State1")).unwrap();
        assert_eq!(added, vec![1]);

        let mask = doc.masks().get(1).unwrap();
        assert_eq!(mask.map_path.as_deref(), Some("new.csv"));
        assert_eq!(mask.path, "seg.tif");
        assert_eq!(mask.color, Rgb::palette(1));
        assert_eq!(doc.stories().get(0).unwrap().masks, vec![0, 1]);
        assert!(doc.mask_cache().is_empty());
        doc.check_invariants().unwrap();
    }

    #[test]
    fn unmatched_notes_are_dropped() {
        let mut doc = tumor_doc();
        begin_classification_map(&mut doc, "new.csv").unwrap();
        merge_subsets(&mut doc, &response("Cluster")).unwrap();
        assert_eq!(doc.stories().get(0).unwrap().masks, vec![0]);
        assert!(doc.mask_cache().is_empty());
    }

    #[test]
    fn malformed_response_is_rejected() {
        let mut doc = tumor_doc();
        begin_classification_map(&mut doc, "new.csv").unwrap();
        let bad = SubsetResponse {
            mask_subsets: vec![(" ".into(), vec![1])],
            ..Default::default()
        };
        assert!(merge_subsets(&mut doc, &bad).is_err());
        assert_eq!(doc.masks().len(), 1);
    }
}
