//! `story browse` command.

use anyhow::Result;
use clap::Args;
use story_host::browser::{self, IMAGE_EXTENSIONS};

use crate::opts::StoryOpts;
use crate::output::print_success;

#[derive(Args, Debug)]
pub struct BrowseArgs {
    /// Directory to list (default: the local root)
    #[arg(default_value = "")]
    pub path: String,

    /// List the parent of PATH instead
    #[arg(long)]
    pub parent: bool,

    /// Only show files with these extensions (comma separated)
    #[arg(long = "ext", value_delimiter = ',')]
    pub extensions: Vec<String>,

    /// Only show images
    #[arg(long, conflicts_with = "extensions")]
    pub images: bool,
}

pub async fn cmd_browse(opts: &StoryOpts, args: &BrowseArgs) -> Result<()> {
    let config = opts.host_config();
    let collab = opts.collaborators(&config)?;
    let extensions: Vec<String> = if args.images {
        IMAGE_EXTENSIONS.iter().map(|e| e.to_string()).collect()
    } else {
        args.extensions.clone()
    };
    let listing = browser::browse(&collab, &args.path, args.parent, &extensions).await?;

    if opts.json || opts.pretty {
        return print_success(opts, serde_json::to_value(&listing)?, vec![]);
    }
    let mut lines = vec![listing.path.clone()];
    for entry in &listing.entries {
        if entry.is_dir {
            lines.push(format!("  {}/", entry.name));
        } else {
            let size = browser::format_size(entry.size);
            lines.push(format!("  {:<40} {size}", entry.name).trim_end().to_string());
        }
    }
    print_success(opts, serde_json::Value::String(lines.join("\n")), vec![])
}
