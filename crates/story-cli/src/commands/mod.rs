//! CLI command handlers.

pub mod browse;
pub mod build;
pub mod import;
pub mod run;

use std::path::Path;

use anyhow::{Context, Result};
use clap::ValueEnum;
use story_host::protocol::{AutosaveLogic, ImportPayload};

/// Read an import payload (image, channels and optional saved story) from a
/// JSON file.
pub fn read_payload(path: &Path) -> Result<ImportPayload> {
    let bytes = std::fs::read(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_slice(&bytes).with_context(|| format!("decode payload {}", path.display()))
}

/// What to do when the importer finds an autosave next to the story.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AutosaveChoice {
    #[default]
    Ask,
    Load,
    Skip,
}

impl From<AutosaveChoice> for AutosaveLogic {
    fn from(choice: AutosaveChoice) -> Self {
        match choice {
            AutosaveChoice::Ask => AutosaveLogic::Ask,
            AutosaveChoice::Load => AutosaveLogic::Load,
            AutosaveChoice::Skip => AutosaveLogic::Skip,
        }
    }
}
