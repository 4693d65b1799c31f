//! Session daemon: owns the session and serializes every mutation.
//!
//! The daemon runs a select loop that:
//! 1. Evaluates autosave when the debounce deadline passes
//! 2. Applies control messages from the editor
//! 3. Applies the results of collaborator calls it spawned
//!
//! Collaborator calls never run inside the loop. Their results come back as
//! completions and are applied in arrival order.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use serde::Serialize;
use story_model::{
    GroupOutput, MapStatus, ModelError, PathStatus, SaveDestination, StoryDefinition,
    SubsetResponse, build_group_output, build_story_definition,
};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::adapters::registry::Collaborators;
use crate::autosave::{AutosaveScheduler, Evaluation};
use crate::config::HostConfig;
use crate::error::{HostError, HostResult};
use crate::masks::{self, SubsetFetch};
use crate::protocol::{PathValidation, Progress, RenderSettingsReply, SavedMeta};
use crate::publish;
use crate::session::{Change, Session, ViewState};

const CONTROL_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SaveOutcome {
    Saved(SavedMeta),
    /// A save was already in flight; nothing was started.
    AlreadySaving,
}

/// Read-only view of the session returned by [`ControlMsg::Snapshot`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub story: StoryDefinition,
    pub view: ViewState,
    pub error: Option<String>,
    pub saving: bool,
    pub map_status: MapStatus,
    pub path_status: BTreeMap<String, PathStatus>,
    pub autosave_pending: bool,
    pub last_saved: Option<SavedMeta>,
}

#[derive(Debug)]
pub enum ControlMsg {
    Apply {
        change: Change,
        resp: oneshot::Sender<HostResult<bool>>,
    },
    Save {
        resp: oneshot::Sender<HostResult<SaveOutcome>>,
    },
    SaveAs {
        destination: SaveDestination,
        resp: oneshot::Sender<HostResult<SaveOutcome>>,
    },
    /// Replies once the subsets for the new map have been merged.
    SetMapPath {
        path: Option<String>,
        resp: oneshot::Sender<HostResult<MapStatus>>,
    },
    Publish {
        destination: SaveDestination,
        resp: oneshot::Sender<HostResult<()>>,
    },
    SyncRenderSettings {
        resp: oneshot::Sender<HostResult<()>>,
    },
    Snapshot {
        resp: oneshot::Sender<SessionSnapshot>,
    },
    /// Stop taking commands, let in-flight calls finish, then exit.
    Shutdown {
        resp: oneshot::Sender<HostResult<()>>,
    },
}

enum Completion {
    Saved {
        autosave: bool,
        result: HostResult<SavedMeta>,
        resp: Option<oneshot::Sender<HostResult<SaveOutcome>>>,
    },
    Subsets {
        fetch: SubsetFetch,
        result: HostResult<SubsetResponse>,
        resp: oneshot::Sender<HostResult<MapStatus>>,
    },
    Validated(Vec<(String, HostResult<PathValidation>)>),
    Progress(Progress),
    Published {
        result: HostResult<()>,
        resp: oneshot::Sender<HostResult<()>>,
    },
    RenderSettings {
        sent: Vec<GroupOutput>,
        result: HostResult<RenderSettingsReply>,
        resp: oneshot::Sender<HostResult<()>>,
    },
}

pub struct SessionDaemon {
    session: Session,
    collab: Collaborators,
    config: HostConfig,
    autosave: AutosaveScheduler,
    control_rx: mpsc::Receiver<ControlMsg>,
    done_tx: mpsc::UnboundedSender<Completion>,
    done_rx: mpsc::UnboundedReceiver<Completion>,
    /// Spawned collaborator calls whose completion has not been applied.
    in_flight: usize,
    validating: BTreeSet<String>,
    last_saved: Option<SavedMeta>,
    shutdown_resp: Option<oneshot::Sender<HostResult<()>>>,
}

impl SessionDaemon {
    pub fn new(
        session: Session,
        collab: Collaborators,
        config: HostConfig,
        control_rx: mpsc::Receiver<ControlMsg>,
    ) -> Self {
        let (done_tx, done_rx) = mpsc::unbounded_channel();
        Self {
            autosave: AutosaveScheduler::new(config.autosave_delay),
            session,
            collab,
            config,
            control_rx,
            done_tx,
            done_rx,
            in_flight: 0,
            validating: BTreeSet::new(),
            last_saved: None,
            shutdown_resp: None,
        }
    }

    /// Start a daemon on the current runtime.
    pub fn spawn(
        session: Session,
        collab: Collaborators,
        config: HostConfig,
    ) -> (SessionHandle, JoinHandle<HostResult<()>>) {
        let (tx, rx) = mpsc::channel(CONTROL_CAPACITY);
        let mut daemon = Self::new(session, collab, config, rx);
        let handle = tokio::spawn(async move { daemon.run().await });
        (SessionHandle { tx }, handle)
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Run until shut down, or until the control channel closes and all
    /// pending work has drained.
    pub async fn run(&mut self) -> HostResult<()> {
        tracing::info!(image = %self.session.document().image_name, "session daemon started");
        self.kick_validation();

        let mut control_open = true;
        loop {
            let stopping = self.shutdown_resp.is_some();
            let deadline = if stopping {
                None
            } else {
                self.autosave.deadline()
            };

            if !control_open && self.in_flight == 0 && deadline.is_none() {
                tracing::debug!("no pending work and control closed, exiting");
                break;
            }

            let sleep_future = match deadline {
                Some(deadline) => tokio::time::sleep_until(deadline),
                None => tokio::time::sleep(Duration::from_secs(60)),
            };

            tokio::select! {
                _ = sleep_future => {
                    if deadline.is_some() {
                        self.evaluate_autosave();
                    }
                }

                msg = self.control_rx.recv(), if control_open => {
                    match msg {
                        Some(ControlMsg::Shutdown { resp }) => {
                            tracing::info!(in_flight = self.in_flight, "shutdown requested");
                            self.autosave.cancel();
                            self.shutdown_resp = Some(resp);
                            control_open = false;
                        }
                        Some(cmd) => self.apply_control(cmd)?,
                        None => {
                            tracing::debug!("control channel closed");
                            control_open = false;
                        }
                    }
                }

                Some(done) = self.done_rx.recv() => {
                    self.apply_completion(done)?;
                }
            }
        }

        if let Some(resp) = self.shutdown_resp.take() {
            let _ = resp.send(Ok(()));
        }
        tracing::info!("session daemon stopped");
        Ok(())
    }

    fn spawn_call<F>(&mut self, fut: F)
    where
        F: std::future::Future<Output = Completion> + Send + 'static,
    {
        self.in_flight += 1;
        let done = self.done_tx.clone();
        tokio::spawn(async move {
            let _ = done.send(fut.await);
        });
    }

    fn apply_control(&mut self, cmd: ControlMsg) -> HostResult<()> {
        match cmd {
            ControlMsg::Apply { change, resp } => {
                let qualifying = change.is_qualifying();
                let baseline = (qualifying && self.autosave.needs_baseline())
                    .then(|| self.session.capture());
                match self.session.apply(change) {
                    Ok(armed) => {
                        if armed {
                            self.autosave.arm(Instant::now(), baseline);
                            self.kick_validation();
                        }
                        let _ = resp.send(Ok(armed));
                    }
                    Err(err) => return Err(self.fatal(err, resp)),
                }
            }
            ControlMsg::Save { resp } => self.start_manual_save(None, resp),
            ControlMsg::SaveAs { destination, resp } => {
                if let Err(err) = destination.validate() {
                    let _ = resp.send(Err(err.into()));
                } else {
                    self.start_manual_save(Some(destination), resp);
                }
            }
            ControlMsg::SetMapPath { path, resp } => {
                let baseline = self
                    .autosave
                    .needs_baseline()
                    .then(|| self.session.capture());
                let fetch = match masks::set_map_path(&mut self.session, path) {
                    Ok(fetch) => fetch,
                    Err(err) => return Err(self.fatal(err, resp)),
                };
                self.autosave.arm(Instant::now(), baseline);
                match fetch {
                    Some(fetch) => {
                        let collab = self.collab.clone();
                        self.spawn_call(async move {
                            let result = masks::fetch_subsets(&collab, &fetch.map_path).await;
                            Completion::Subsets {
                                fetch,
                                result,
                                resp,
                            }
                        });
                    }
                    None => {
                        self.kick_validation();
                        let _ = resp.send(Ok(self.session.status().map_status));
                    }
                }
            }
            ControlMsg::Publish { destination, resp } => {
                let request = match publish::render_request(&self.session, &destination) {
                    Ok(request) => request,
                    Err(err) => {
                        let _ = resp.send(Err(err));
                        return Ok(());
                    }
                };
                self.session.set_publish_progress(None);
                let collab = self.collab.clone();
                let poll = self.config.progress_poll_interval;
                let max_wait = self.config.publish_timeout;
                let progress_tx = self.done_tx.clone();
                self.spawn_call(async move {
                    let result = publish::publish(&collab, &request, poll, max_wait, |p| {
                        let _ = progress_tx.send(Completion::Progress(p));
                    })
                    .await;
                    Completion::Published { result, resp }
                });
            }
            ControlMsg::SyncRenderSettings { resp } => {
                let image_id = publish::image_id(&self.session);
                let groups = build_group_output(self.session.document());
                let collab = self.collab.clone();
                self.spawn_call(async move {
                    let result = publish::sync_render_settings(&collab, &image_id, &groups).await;
                    Completion::RenderSettings {
                        sent: groups,
                        result,
                        resp,
                    }
                });
            }
            ControlMsg::Snapshot { resp } => {
                let _ = resp.send(self.snapshot());
            }
            // Intercepted by the run loop.
            ControlMsg::Shutdown { resp } => {
                let _ = resp.send(Ok(()));
            }
        }
        Ok(())
    }

    fn apply_completion(&mut self, done: Completion) -> HostResult<()> {
        if !matches!(done, Completion::Progress(_)) {
            self.in_flight = self.in_flight.saturating_sub(1);
        }
        match done {
            Completion::Saved {
                autosave,
                result,
                resp,
            } => {
                self.autosave.complete(Instant::now(), result.is_ok());
                self.session.status_mut().saving = false;
                let reply = match result {
                    Ok(meta) => {
                        tracing::info!(autosave, path = ?meta.path, "story saved");
                        if meta.story_uuid.is_some() {
                            self.session.document_mut().story_uuid = meta.story_uuid.clone();
                        }
                        self.last_saved = Some(meta.clone());
                        Ok(SaveOutcome::Saved(meta))
                    }
                    Err(err) => {
                        tracing::warn!(autosave, error = %err, "save failed");
                        self.session.show_error(format!("Save failed: {err}"));
                        Err(err)
                    }
                };
                if let Some(resp) = resp {
                    let _ = resp.send(reply);
                }
            }
            Completion::Subsets {
                fetch,
                result,
                resp,
            } => {
                let baseline = self
                    .autosave
                    .needs_baseline()
                    .then(|| self.session.capture());
                let status = masks::apply_subsets(&mut self.session, &fetch, result)?;
                if status == MapStatus::Ready {
                    self.autosave.arm(Instant::now(), baseline);
                }
                self.kick_validation();
                let _ = resp.send(Ok(status));
            }
            Completion::Validated(results) => {
                // Not-ready paths are retried on the next edit.
                masks::apply_validations(&mut self.session, &mut self.validating, results);
            }
            Completion::Progress(progress) => {
                tracing::debug!(progress = progress.progress, max = progress.max, "render progress");
                self.session.set_publish_progress(Some(progress));
            }
            Completion::Published { result, resp } => {
                if let Err(err) = &result {
                    tracing::warn!(error = %err, "publish failed");
                    self.session.show_error(format!("Publish failed: {err}"));
                }
                let _ = resp.send(result);
            }
            Completion::RenderSettings { sent, result, resp } => {
                let reply = result.and_then(|reply| {
                    publish::apply_render_settings(&mut self.session, &sent, &reply)
                });
                let _ = resp.send(reply);
            }
        }
        Ok(())
    }

    fn evaluate_autosave(&mut self) {
        let current = self.session.capture();
        match self.autosave.evaluate(&current) {
            Evaluation::Save => {
                tracing::debug!("autosave due");
                self.start_save(true, None, None);
            }
            Evaluation::Stale => tracing::debug!("autosave skipped: saved since last edit"),
            Evaluation::Unworthy => {
                tracing::debug!(blocker = ?current.blocker(), "autosave skipped: nothing to save");
            }
            Evaluation::Idle => {}
        }
    }

    fn start_manual_save(
        &mut self,
        destination: Option<SaveDestination>,
        resp: oneshot::Sender<HostResult<SaveOutcome>>,
    ) {
        if !self.autosave.begin_manual() {
            tracing::debug!("save requested while another is in flight");
            let _ = resp.send(Ok(SaveOutcome::AlreadySaving));
            return;
        }
        self.start_save(false, destination, Some(resp));
    }

    fn start_save(
        &mut self,
        autosave: bool,
        destination: Option<SaveDestination>,
        resp: Option<oneshot::Sender<HostResult<SaveOutcome>>>,
    ) {
        self.session.status_mut().saving = true;
        let request = self.session.save_request(autosave, destination);
        let collab = self.collab.clone();
        self.spawn_call(async move {
            let result = collab.save(&request).await;
            Completion::Saved {
                autosave,
                result,
                resp,
            }
        });
    }

    fn kick_validation(&mut self) {
        let paths = masks::claim_unconfirmed(&self.session, &mut self.validating);
        if paths.is_empty() {
            return;
        }
        tracing::debug!(count = paths.len(), "validating mask paths");
        let collab = self.collab.clone();
        self.spawn_call(async move { Completion::Validated(masks::validate_paths(&collab, paths).await) });
    }

    /// Referential failures mean the session state can no longer be trusted.
    fn fatal<T>(&self, err: ModelError, resp: oneshot::Sender<HostResult<T>>) -> HostError {
        tracing::error!(error = %err, "document defect; stopping session");
        let _ = resp.send(Err(err.clone().into()));
        err.into()
    }

    fn snapshot(&self) -> SessionSnapshot {
        let status = self.session.status();
        SessionSnapshot {
            story: build_story_definition(self.session.document()),
            view: self.session.view().clone(),
            error: status.error.clone(),
            saving: status.saving,
            map_status: status.map_status,
            path_status: status.path_status.clone(),
            autosave_pending: self.autosave.deadline().is_some(),
            last_saved: self.last_saved.clone(),
        }
    }
}

/// Cloneable client for a running [`SessionDaemon`].
#[derive(Debug, Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<ControlMsg>,
}

impl SessionHandle {
    pub fn new(tx: mpsc::Sender<ControlMsg>) -> Self {
        Self { tx }
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> ControlMsg,
    ) -> HostResult<T> {
        let (resp, rx) = oneshot::channel();
        self.tx.send(make(resp)).await.map_err(|_| HostError::Closed)?;
        rx.await.map_err(|_| HostError::Closed)
    }

    pub async fn apply(&self, change: Change) -> HostResult<bool> {
        self.request(|resp| ControlMsg::Apply { change, resp }).await?
    }

    pub async fn save(&self) -> HostResult<SaveOutcome> {
        self.request(|resp| ControlMsg::Save { resp }).await?
    }

    pub async fn save_as(&self, destination: SaveDestination) -> HostResult<SaveOutcome> {
        self.request(|resp| ControlMsg::SaveAs { destination, resp })
            .await?
    }

    pub async fn set_map_path(&self, path: Option<String>) -> HostResult<MapStatus> {
        self.request(|resp| ControlMsg::SetMapPath { path, resp })
            .await?
    }

    pub async fn publish(&self, destination: SaveDestination) -> HostResult<()> {
        self.request(|resp| ControlMsg::Publish { destination, resp })
            .await?
    }

    pub async fn sync_render_settings(&self) -> HostResult<()> {
        self.request(|resp| ControlMsg::SyncRenderSettings { resp })
            .await?
    }

    pub async fn snapshot(&self) -> HostResult<SessionSnapshot> {
        self.request(|resp| ControlMsg::Snapshot { resp }).await
    }

    pub async fn shutdown(&self) -> HostResult<()> {
        self.request(|resp| ControlMsg::Shutdown { resp }).await?
    }
}
