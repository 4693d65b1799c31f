//! Session daemon behaviour under a paused clock: debounce, staleness, the
//! single-save guard and the classification-map pipeline.

use std::sync::Arc;
use std::time::Duration;

use story_host::adapters::mock::MockBackend;
use story_host::protocol::Progress;
use story_host::{
    Change, Collaborators, Edit, HostConfig, HostResult, SaveOutcome, Session, SessionDaemon,
    SessionHandle, ViewEdit,
};
use story_model::{Document, MapStatus, Mask, SaveDestination, SubsetResponse};
use tokio::task::JoinHandle;

fn document() -> Document {
    let labels = vec!["DNA".to_string(), "CD3".to_string()];
    let mut doc = Document::new("tonsil.ome.tif", &labels, 1000);
    doc.push_mask(Mask::all_cells("cells.tif")).unwrap();
    doc
}

fn start(backend: &Arc<MockBackend>) -> (SessionHandle, JoinHandle<HostResult<()>>) {
    let config = HostConfig::default();
    let collab = Collaborators::uniform(backend.clone(), config.request_timeout);
    SessionDaemon::spawn(Session::new(document()), collab, config)
}

fn author(name: &str) -> Change {
    Change::Doc(Edit::SetAuthor { name: name.into() })
}

async fn advance(secs: u64) {
    tokio::time::sleep(Duration::from_secs(secs)).await;
}

#[tokio::test(start_paused = true)]
async fn autosave_waits_for_a_quiet_period() {
    let backend = MockBackend::new();
    let (handle, _daemon) = start(&backend);

    assert!(handle.apply(author("first")).await.unwrap());
    advance(6).await;
    handle.apply(author("second")).await.unwrap();
    advance(6).await;
    assert!(backend.saves().is_empty(), "re-arming pushes the deadline out");

    advance(5).await;
    let saves = backend.saves();
    assert_eq!(saves.len(), 1);
    assert!(saves[0].is_autosave);
    assert_eq!(saves[0].story.author_name, "second");

    let snap = handle.snapshot().await.unwrap();
    assert!(!snap.autosave_pending);
    assert!(!snap.saving);
}

#[tokio::test(start_paused = true)]
async fn presentation_changes_never_autosave() {
    let backend = MockBackend::new();
    let (handle, _daemon) = start(&backend);

    let qualified = handle
        .apply(Change::View(ViewEdit::ShowModal {
            name: Some("rename".into()),
        }))
        .await
        .unwrap();
    assert!(!qualified);
    advance(30).await;
    assert!(backend.saves().is_empty());
    assert_eq!(
        handle.snapshot().await.unwrap().view.modal.as_deref(),
        Some("rename")
    );
}

#[tokio::test(start_paused = true)]
async fn manual_save_makes_pending_autosave_stale() {
    let backend = MockBackend::new();
    let (handle, _daemon) = start(&backend);

    handle.apply(author("me")).await.unwrap();
    advance(2).await;
    let outcome = handle.save().await.unwrap();
    assert!(matches!(outcome, SaveOutcome::Saved(_)));

    advance(15).await;
    let saves = backend.saves();
    assert_eq!(saves.len(), 1);
    assert!(!saves[0].is_autosave);
}

#[tokio::test(start_paused = true)]
async fn only_one_save_runs_at_a_time() {
    let backend = MockBackend::new();
    backend.set_save_delay(Duration::from_secs(15));
    let (handle, _daemon) = start(&backend);

    handle.apply(author("me")).await.unwrap();
    let first = {
        let handle = handle.clone();
        tokio::spawn(async move { handle.save().await })
    };
    advance(1).await;

    assert_eq!(handle.save().await.unwrap(), SaveOutcome::AlreadySaving);
    // The debounce deadline passes while the manual save is still running.
    advance(12).await;
    assert!(handle.snapshot().await.unwrap().saving);

    let outcome = first.await.unwrap().unwrap();
    assert!(matches!(outcome, SaveOutcome::Saved(_)));
    advance(20).await;
    assert_eq!(backend.saves().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn failed_autosave_keeps_the_document_and_reports() {
    let backend = MockBackend::new();
    backend.fail_next_saves(1);
    let (handle, _daemon) = start(&backend);

    handle.apply(author("kept")).await.unwrap();
    advance(11).await;

    let snap = handle.snapshot().await.unwrap();
    assert!(backend.saves().is_empty());
    assert!(snap.error.as_deref().is_some_and(|e| e.contains("Save failed")));
    assert_eq!(snap.story.author_name, "kept");
    assert!(!snap.saving);

    // Nothing retries until the error is dismissed and the user edits again.
    advance(30).await;
    assert!(backend.saves().is_empty());

    handle.apply(Change::View(ViewEdit::DismissError)).await.unwrap();
    handle.apply(author("kept again")).await.unwrap();
    advance(11).await;
    assert_eq!(backend.saves().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn unready_mask_image_holds_back_autosave() {
    let backend = MockBackend::new();
    backend.set_path("cells.tif", false, false);
    let (handle, _daemon) = start(&backend);

    handle.apply(author("me")).await.unwrap();
    advance(11).await;
    assert!(backend.saves().is_empty());

    backend.set_path("cells.tif", true, false);
    handle.apply(author("me again")).await.unwrap();
    advance(11).await;
    assert_eq!(backend.saves().len(), 1);
    let snap = handle.snapshot().await.unwrap();
    assert!(snap.path_status["cells.tif"].ready);
}

fn subsets(state: &str, subsets: &[(&str, &[u64])]) -> SubsetResponse {
    SubsetResponse {
        mask_subsets: subsets
            .iter()
            .map(|(name, ids)| (name.to_string(), ids.to_vec()))
            .collect(),
        subset_colors: Vec::new(),
        mask_states: vec![state.to_string()],
    }
}

#[tokio::test(start_paused = true)]
async fn map_change_reattaches_selected_subsets() {
    let backend = MockBackend::new();
    backend.set_subsets("first.csv", subsets("State", &[("Tumor", &[1, 2]), ("Stroma", &[3])]));
    backend.set_subsets(
        "second.csv",
        subsets("State1", &[("Stroma", &[4]), ("Immune", &[]), ("Tumor", &[5])]),
    );
    let (handle, _daemon) = start(&backend);

    let status = handle.set_map_path(Some("first.csv".into())).await.unwrap();
    assert_eq!(status, MapStatus::Ready);
    handle
        .apply(Change::Doc(Edit::ToggleMask { story: 0, mask: 1 }))
        .await
        .unwrap();

    let status = handle.set_map_path(Some("second.csv".into())).await.unwrap();
    assert_eq!(status, MapStatus::Ready);

    let story = handle.snapshot().await.unwrap().story;
    let labels: Vec<_> = story.masks.iter().map(|m| m.label.as_str()).collect();
    assert_eq!(labels, vec!["All cells", "Stroma", "Tumor"]);
    assert_eq!(story.waypoints[0].masks, vec![2]);
}

#[tokio::test(start_paused = true)]
async fn reselecting_a_loading_map_merges_its_subsets_once() {
    let backend = MockBackend::new();
    backend.set_subsets("a.csv", subsets("State", &[("Tumor", &[1, 2]), ("Stroma", &[3])]));
    backend.set_subset_delay(Duration::from_secs(1));
    let (handle, _daemon) = start(&backend);

    let (first, second) = tokio::join!(
        handle.set_map_path(Some("a.csv".into())),
        handle.set_map_path(Some("a.csv".into())),
    );
    first.unwrap();
    second.unwrap();

    let snap = handle.snapshot().await.unwrap();
    assert_eq!(snap.map_status, MapStatus::Ready);
    let labels: Vec<_> = snap.story.masks.iter().map(|m| m.label.as_str()).collect();
    assert_eq!(labels, vec!["All cells", "Tumor", "Stroma"]);
}

#[tokio::test(start_paused = true)]
async fn render_settings_land_on_groups_that_shifted_meanwhile() {
    let backend = MockBackend::new();
    backend.set_render_settings_delay(Duration::from_secs(2));
    let (handle, _daemon) = start(&backend);

    let sync = {
        let handle = handle.clone();
        tokio::spawn(async move { handle.sync_render_settings().await })
    };
    advance(1).await;
    handle
        .apply(Change::Doc(Edit::InsertGroup {
            after: None,
            label: "Front".into(),
            channels: vec![0],
        }))
        .await
        .unwrap();
    sync.await.unwrap().unwrap();

    let groups = handle.snapshot().await.unwrap().story.groups;
    let uuids: Vec<_> = groups
        .iter()
        .map(|g| (g.label.as_str(), g.uuid.as_deref()))
        .collect();
    assert_eq!(uuids, vec![("Front", None), ("Default", Some("group-0"))]);
}

#[tokio::test(start_paused = true)]
async fn unreachable_subset_service_invalidates_the_map() {
    let backend = MockBackend::new();
    let (handle, _daemon) = start(&backend);

    let status = handle.set_map_path(Some("missing.csv".into())).await.unwrap();
    assert_eq!(status, MapStatus::Invalid);

    handle.apply(author("me")).await.unwrap();
    advance(11).await;
    assert!(backend.saves().is_empty());

    let status = handle.set_map_path(None).await.unwrap();
    assert_eq!(status, MapStatus::Ready);
    advance(11).await;
    assert_eq!(backend.saves().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn publish_reports_progress() {
    let backend = MockBackend::new();
    backend.push_progress(1, 2);
    backend.push_progress(2, 2);
    let (handle, _daemon) = start(&backend);

    handle
        .publish(SaveDestination {
            root_dir: "/tmp/exhibits".into(),
            out_name: "tonsil".into(),
        })
        .await
        .unwrap();
    let snap = handle.snapshot().await.unwrap();
    assert_eq!(snap.view.publish_progress, Some(Progress { progress: 2, max: 2 }));
    assert_eq!(backend.renders()[0].out_name, "tonsil");

    let err = handle
        .publish(SaveDestination {
            root_dir: "/tmp/exhibits".into(),
            out_name: "../up".into(),
        })
        .await
        .unwrap_err();
    assert!(err.is_recoverable());
}

#[tokio::test(start_paused = true)]
async fn shutdown_lets_the_running_save_finish() {
    let backend = MockBackend::new();
    backend.set_save_delay(Duration::from_secs(5));
    let (handle, daemon) = start(&backend);

    handle.apply(author("me")).await.unwrap();
    let save = {
        let handle = handle.clone();
        tokio::spawn(async move { handle.save().await })
    };
    advance(1).await;
    handle.shutdown().await.unwrap();

    assert!(matches!(save.await.unwrap().unwrap(), SaveOutcome::Saved(_)));
    daemon.await.unwrap().unwrap();
    assert_eq!(backend.saves().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn closing_the_handle_flushes_the_pending_autosave() {
    let backend = MockBackend::new();
    let (handle, daemon) = start(&backend);

    handle.apply(author("me")).await.unwrap();
    drop(handle);
    daemon.await.unwrap().unwrap();
    assert_eq!(backend.saves().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn dangling_keys_stop_the_session() {
    let backend = MockBackend::new();
    let (handle, daemon) = start(&backend);

    let err = handle
        .apply(Change::Doc(Edit::RemoveStory { key: 9 }))
        .await
        .unwrap_err();
    assert!(!err.is_recoverable());
    assert!(daemon.await.unwrap().is_err());
}
