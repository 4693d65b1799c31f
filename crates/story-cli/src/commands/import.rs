//! `story import` command.

use anyhow::{Result, bail};
use clap::Args;
use serde_json::json;
use story_host::ImportOutcome;
use story_host::protocol::ImportRequest;
use story_model::build_story_definition;

use super::AutosaveChoice;
use crate::opts::StoryOpts;
use crate::output::print_success;

#[derive(Args, Debug)]
pub struct ImportArgs {
    /// Image or saved story to open
    pub filepath: String,

    /// Cell table used by the visualizations
    #[arg(long = "csv", default_value = "")]
    pub csvpath: String,

    /// Dataset name on the authoring server
    #[arg(long, default_value = "")]
    pub dataset: String,

    /// Whether to restore an autosave the importer finds
    #[arg(long, value_enum, default_value_t = AutosaveChoice::Ask)]
    pub autosave: AutosaveChoice,
}

pub async fn cmd_import(opts: &StoryOpts, args: &ImportArgs) -> Result<()> {
    let config = opts.host_config();
    let collab = opts.collaborators(&config)?;
    let request = ImportRequest {
        filepath: args.filepath.clone(),
        csvpath: args.csvpath.clone(),
        dataset: args.dataset.clone(),
        autosave_logic: args.autosave.into(),
    };

    match story_host::import(&collab, &request).await? {
        ImportOutcome::Loaded(session) => {
            let def = build_story_definition(session.document());
            print_success(opts, serde_json::to_value(def)?, vec![])
        }
        ImportOutcome::AskAutosave => print_success(
            opts,
            json!({ "autosave": "found" }),
            vec!["an autosave exists; rerun with --autosave load or --autosave skip".into()],
        ),
        ImportOutcome::Failed { code, message } => match code {
            Some(code) => bail!("{code} error: {message}"),
            None => bail!("import failed: {message}"),
        },
    }
}
