//! `story build` command.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use story_host::Session;
use story_model::{SaveDestination, build_render_request, build_story_definition};

use super::read_payload;
use crate::opts::StoryOpts;
use crate::output::print_success;

#[derive(Args, Debug)]
pub struct BuildArgs {
    /// Import payload JSON (image, channels and optional saved story)
    pub payload: PathBuf,

    /// Write the result to this file instead of stdout
    #[arg(long)]
    pub out: Option<PathBuf>,

    /// Emit a render request for publishing under this directory
    #[arg(long = "render-root", requires = "render_name")]
    pub render_root: Option<String>,

    /// Output name of the published story
    #[arg(long = "render-name")]
    pub render_name: Option<String>,
}

pub fn cmd_build(opts: &StoryOpts, args: &BuildArgs) -> Result<()> {
    let payload = read_payload(&args.payload)?;
    let session = Session::from_payload(&payload)?;
    let doc = session.document();

    let value = match (&args.render_root, &args.render_name) {
        (Some(root_dir), Some(out_name)) => {
            let destination = SaveDestination {
                root_dir: root_dir.clone(),
                out_name: out_name.clone(),
            };
            serde_json::to_value(build_render_request(doc, &destination)?)?
        }
        _ => serde_json::to_value(build_story_definition(doc))?,
    };

    if let Some(out) = &args.out {
        let bytes = serde_json::to_vec_pretty(&value)?;
        std::fs::write(out, bytes).with_context(|| format!("write {}", out.display()))?;
        return print_success(
            opts,
            serde_json::json!({ "written": out.display().to_string() }),
            vec![],
        );
    }
    print_success(opts, value, vec![])
}
