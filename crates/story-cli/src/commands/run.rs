//! `story run` command: an editing session driven by JSON lines on stdin.
//!
//! Each input line is one request, e.g.
//! `{"cmd":"apply","change":{"op":"set_author","name":"Ada"}}`, and each
//! request gets one reply line `{"ok":true,"data":...}` on stdout. The session
//! shuts down at end of input.

use std::path::PathBuf;

use anyhow::{Result, anyhow, bail};
use clap::Args;
use serde::Deserialize;
use serde_json::{Value, json};
use story_host::protocol::ImportRequest;
use story_host::{
    Change, Collaborators, HostError, ImportOutcome, Session, SessionDaemon, SessionHandle,
};
use story_model::SaveDestination;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use super::{AutosaveChoice, read_payload};
use crate::opts::StoryOpts;
use crate::output::reply_line;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Start from an import payload JSON file
    #[arg(long, conflicts_with = "import")]
    pub payload: Option<PathBuf>,

    /// Start by importing this image or story through the collaborators
    #[arg(long)]
    pub import: Option<String>,

    /// Whether to restore an autosave the importer finds
    #[arg(long, value_enum, default_value_t = AutosaveChoice::Load)]
    pub autosave: AutosaveChoice,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
enum Request {
    Apply { change: Change },
    Save,
    SaveAs { destination: SaveDestination },
    Map { path: Option<String> },
    Publish { destination: SaveDestination },
    SyncRenderSettings,
    Snapshot,
}

pub async fn cmd_run(opts: &StoryOpts, args: &RunArgs) -> Result<()> {
    let config = opts.host_config();
    let collab = opts.collaborators(&config)?;
    let session = open_session(&collab, args).await?;

    let (handle, daemon) = SessionDaemon::spawn(session, collab, config);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let (reply, closed) = match serde_json::from_str::<Request>(&line) {
            Ok(request) => {
                let result = dispatch(&handle, request).await;
                let closed = matches!(result, Err(HostError::Closed));
                (result.map_err(|e| e.to_string()), closed)
            }
            Err(err) => (Err(format!("bad request: {err}")), false),
        };
        stdout.write_all(reply_line(reply).as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;
        if closed {
            break;
        }
    }

    if let Err(err) = handle.shutdown().await {
        tracing::debug!(error = %err, "session already stopped");
    }
    daemon
        .await
        .map_err(|e| anyhow!("session task failed: {e}"))??;
    Ok(())
}

async fn open_session(collab: &Collaborators, args: &RunArgs) -> Result<Session> {
    if let Some(path) = &args.payload {
        return Ok(Session::from_payload(&read_payload(path)?)?);
    }
    let Some(filepath) = &args.import else {
        bail!("either --payload or --import is required");
    };
    let request = ImportRequest {
        filepath: filepath.clone(),
        autosave_logic: args.autosave.into(),
        ..Default::default()
    };
    match story_host::import(collab, &request).await? {
        ImportOutcome::Loaded(session) => Ok(*session),
        ImportOutcome::AskAutosave => {
            bail!("an autosave exists; rerun with --autosave load or --autosave skip")
        }
        ImportOutcome::Failed { code, message } => {
            bail!("{} error: {message}", code.as_deref().unwrap_or("IMPORT"))
        }
    }
}

async fn dispatch(handle: &SessionHandle, request: Request) -> Result<Value, HostError> {
    match request {
        Request::Apply { change } => handle
            .apply(change)
            .await
            .map(|qualified| json!({ "qualified": qualified })),
        Request::Save => handle.save().await.and_then(to_value),
        Request::SaveAs { destination } => handle.save_as(destination).await.and_then(to_value),
        Request::Map { path } => handle.set_map_path(path).await.and_then(to_value),
        Request::Publish { destination } => handle.publish(destination).await.map(|()| Value::Null),
        Request::SyncRenderSettings => handle.sync_render_settings().await.map(|()| Value::Null),
        Request::Snapshot => handle.snapshot().await.and_then(to_value),
    }
}

fn to_value<T: serde::Serialize>(value: T) -> Result<Value, HostError> {
    Ok(serde_json::to_value(value)?)
}
