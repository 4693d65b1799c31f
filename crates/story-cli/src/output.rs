//! Shared output helpers for human and JSON modes.
//!
//! Human mode prints primary data to stdout and warnings to stderr. JSON mode
//! wraps responses in `{ data, warnings? }` and respects `--pretty` and
//! `--quiet`.

use anyhow::Result;
use serde_json::{Value, json};

use crate::opts::StoryOpts;

pub fn print_success(opts: &StoryOpts, data: Value, mut warnings: Vec<String>) -> Result<()> {
    if opts.quiet {
        warnings.clear();
    }
    if opts.pretty || opts.json {
        print_json(opts, data, warnings)
    } else {
        print_human(data, warnings)
    }
}

fn print_json(opts: &StoryOpts, data: Value, warnings: Vec<String>) -> Result<()> {
    let mut root = serde_json::Map::new();
    root.insert("data".into(), data);
    if !warnings.is_empty() {
        root.insert(
            "warnings".into(),
            warnings.into_iter().map(Value::String).collect(),
        );
    }
    let root = Value::Object(root);
    if opts.pretty {
        println!("{}", serde_json::to_string_pretty(&root)?);
    } else {
        println!("{}", serde_json::to_string(&root)?);
    }
    Ok(())
}

fn print_human(data: Value, warnings: Vec<String>) -> Result<()> {
    match data {
        Value::String(s) => println!("{s}"),
        Value::Null => {}
        other => println!("{}", serde_json::to_string_pretty(&other)?),
    }
    for w in warnings {
        eprintln!("warning: {w}");
    }
    Ok(())
}

/// One reply line of the `run` protocol.
pub fn reply_line(result: std::result::Result<Value, String>) -> String {
    let value = match result {
        Ok(data) => json!({ "ok": true, "data": data }),
        Err(error) => json!({ "ok": false, "error": error }),
    };
    value.to_string()
}
