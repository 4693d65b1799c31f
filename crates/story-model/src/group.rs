use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::channel::ChanRender;
use crate::error::{ModelError, ModelResult};
use crate::reindex::{Key, Registry};

static LABEL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9 _-]+$").expect("label pattern"));

/// A named set of active channels with its own render overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub label: String,
    /// Mirrors the group's key; kept in step by every reindex.
    pub value: Key,
    pub active_ids: Vec<Key>,
    /// Per-channel overrides; channels without an entry use the base render.
    #[serde(default)]
    pub render: BTreeMap<Key, ChanRender>,
    /// Assigned by the render-settings service once the group is synced.
    #[serde(default)]
    pub uuid: Option<String>,
}

impl Group {
    pub fn new(label: impl Into<String>, active_ids: Vec<Key>) -> Self {
        Self {
            label: label.into(),
            value: 0,
            active_ids,
            render: BTreeMap::new(),
            uuid: None,
        }
    }
}

/// Check a label against the name pattern and against `existing` labels.
///
/// `skip` excludes the record being renamed so that re-saving an unchanged
/// label is accepted.
pub fn check_label<'a>(
    kind: &str,
    label: &str,
    existing: impl Iterator<Item = (Key, &'a str)>,
    skip: Option<Key>,
) -> ModelResult<()> {
    if !LABEL_PATTERN.is_match(label) {
        return Err(ModelError::validation(format!(
            "{kind} name '{label}' may only contain letters, digits, spaces, dashes and underscores"
        )));
    }
    for (key, other) in existing {
        if Some(key) != skip && other == label {
            return Err(ModelError::validation(format!(
                "{kind} name '{label}' is already in use"
            )));
        }
    }
    Ok(())
}

pub fn check_group_label(groups: &Registry<Group>, label: &str, skip: Option<Key>) -> ModelResult<()> {
    check_label(
        "group",
        label,
        groups.iter().map(|(k, g)| (k, g.label.as_str())),
        skip,
    )
}

/// Resolve a group label to its key.
pub fn find_group(groups: &Registry<Group>, label: &str) -> Option<Key> {
    groups.iter().find(|(_, g)| g.label == label).map(|(k, _)| k)
}
