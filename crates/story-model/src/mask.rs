use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::channel::Rgb;
use crate::reindex::{Key, Registry};

/// Key of the unfiltered "all cells" mask.
pub const ALL_CELLS: Key = 0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mask {
    pub name: String,
    pub color: Rgb,
    pub path: String,
    #[serde(default)]
    pub map_path: Option<String>,
    /// Original subset name reported by the classification service.
    #[serde(default)]
    pub cache_name: Option<String>,
    #[serde(default)]
    pub state_label: Option<String>,
    #[serde(default)]
    pub map_ids: Vec<u64>,
}

impl Default for Mask {
    fn default() -> Self {
        Self {
            name: "All cells".into(),
            color: Rgb::WHITE,
            path: String::new(),
            map_path: None,
            cache_name: None,
            state_label: None,
            map_ids: Vec::new(),
        }
    }
}

impl Mask {
    pub fn all_cells(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// True for subset masks produced from a classification map.
    pub fn is_subset(&self) -> bool {
        self.cache_name.is_some() || self.map_path.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaskPatch {
    pub name: Option<String>,
    pub color: Option<Rgb>,
    pub path: Option<String>,
}

/// Readiness of one mask image path as reported by the validator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathStatus {
    pub ready: bool,
    pub invalid: bool,
}

impl PathStatus {
    pub fn usable(&self) -> bool {
        self.ready && !self.invalid
    }
}

/// True when `mask`'s image is confirmed usable. Masks without a path have
/// nothing to validate.
pub fn path_confirmed(mask: &Mask, status: &BTreeMap<String, PathStatus>) -> bool {
    mask.path.is_empty() || status.get(&mask.path).is_some_and(PathStatus::usable)
}

/// Distinct mask paths that still need a validation round trip.
pub fn unconfirmed_paths(masks: &Registry<Mask>, status: &BTreeMap<String, PathStatus>) -> Vec<String> {
    let mut out: Vec<String> = masks
        .values()
        .filter(|m| !m.path.is_empty())
        .filter(|m| !status.get(&m.path).is_some_and(|s| s.ready || s.invalid))
        .map(|m| m.path.clone())
        .collect();
    out.sort();
    out.dedup();
    out
}

/// Masks the viewer may draw: only those whose image is ready and valid.
pub fn viewer_masks(masks: &Registry<Mask>, status: &BTreeMap<String, PathStatus>) -> Vec<Key> {
    masks
        .iter()
        .filter(|(_, m)| !m.path.is_empty() && path_confirmed(m, status))
        .map(|(k, _)| k)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn masks() -> Registry<Mask> {
        Registry::from_records(
            "mask",
            [
                Mask::all_cells("seg.tif"),
                Mask {
                    name: "Tumor".into(),
                    path: "seg.tif".into(),
                    ..Default::default()
                },
                Mask {
                    name: "Stroma".into(),
                    path: "other.tif".into(),
                    ..Default::default()
                },
            ],
        )
    }

    #[test]
    fn unconfirmed_paths_are_deduplicated() {
        let status = BTreeMap::new();
        assert_eq!(unconfirmed_paths(&masks(), &status), vec!["other.tif", "seg.tif"]);
    }

    #[test]
    fn invalid_paths_are_not_retried_but_stay_hidden() {
        let mut status = BTreeMap::new();
        status.insert("seg.tif".to_string(), PathStatus { ready: true, invalid: false });
        status.insert("other.tif".to_string(), PathStatus { ready: false, invalid: true });
        assert!(unconfirmed_paths(&masks(), &status).is_empty());
        assert_eq!(viewer_masks(&masks(), &status), vec![0, 1]);
    }
}
