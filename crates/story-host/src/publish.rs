//! Publishing a story and syncing group render settings.

use std::time::Duration;

use story_model::group::find_group;
use story_model::{GroupOutput, RenderRequest, SaveDestination, build_render_request};

use crate::adapters::registry::Collaborators;
use crate::error::{HostError, HostResult};
use crate::protocol::{Progress, RenderSettingsReply};
use crate::session::Session;

pub fn render_request(session: &Session, destination: &SaveDestination) -> HostResult<RenderRequest> {
    Ok(build_render_request(session.document(), destination)?)
}

/// Submit `request` and poll progress until the renderer reports done.
/// Gives up with [`HostError::Timeout`] once `max_wait` has passed.
pub async fn publish(
    collab: &Collaborators,
    request: &RenderRequest,
    poll_interval: Duration,
    max_wait: Duration,
    mut on_progress: impl FnMut(Progress),
) -> HostResult<()> {
    collab.render(request).await?;
    tracing::info!(out = %request.out_name, "render submitted");
    let poll = poll_until_done(collab, &request.out_name, poll_interval, &mut on_progress);
    match tokio::time::timeout(max_wait, poll).await {
        Ok(result) => result?,
        Err(_) => {
            tracing::warn!(out = %request.out_name, ?max_wait, "render never finished");
            return Err(HostError::Timeout(format!("render of {}", request.out_name)));
        }
    }
    tracing::info!(out = %request.out_name, "render finished");
    Ok(())
}

async fn poll_until_done(
    collab: &Collaborators,
    session: &str,
    poll_interval: Duration,
    on_progress: &mut impl FnMut(Progress),
) -> HostResult<()> {
    loop {
        let progress = collab.progress(session).await?;
        on_progress(progress);
        if progress.is_done() {
            return Ok(());
        }
        tokio::time::sleep(poll_interval).await;
    }
}

/// Image identity used by the render-settings service.
pub fn image_id(session: &Session) -> String {
    let doc = session.document();
    doc.image_uuid.clone().unwrap_or_else(|| doc.image_name.clone())
}

/// Register the current groups with the render-settings service.
pub async fn sync_render_settings(
    collab: &Collaborators,
    image_id: &str,
    groups: &[GroupOutput],
) -> HostResult<RenderSettingsReply> {
    let reply = collab.render_settings(image_id, groups).await?;
    tracing::debug!(image = %image_id, groups = reply.groups.len(), "render settings synced");
    Ok(reply)
}

/// Store the group uuids assigned by the render-settings service.
///
/// Reply ids index `sent`, the group outputs the request carried. Each is
/// matched back to the live group by label because group keys may have
/// shifted while the call ran. Groups removed or renamed since are skipped.
pub fn apply_render_settings(
    session: &mut Session,
    sent: &[GroupOutput],
    reply: &RenderSettingsReply,
) -> HostResult<()> {
    let groups = session.document().groups();
    let mut uuids = Vec::with_capacity(reply.groups.len());
    for assigned in &reply.groups {
        let label = sent
            .get(assigned.id)
            .map(|g| g.label.as_str())
            .ok_or_else(|| {
                HostError::InvalidResource(format!(
                    "render settings name unknown group {}",
                    assigned.id
                ))
            })?;
        match find_group(groups, label) {
            Some(key) => uuids.push((key, assigned.uuid.clone())),
            None => tracing::debug!(%label, "group gone before its render settings arrived"),
        }
    }
    session.document_mut().assign_group_uuids(&uuids)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use story_model::Document;

    use crate::adapters::mock::MockBackend;

    #[tokio::test(start_paused = true)]
    async fn polls_until_done() {
        let backend = MockBackend::new();
        backend.push_progress(0, 3);
        backend.push_progress(2, 3);
        backend.push_progress(3, 3);
        let collab = Collaborators::uniform(backend.clone(), Duration::from_secs(5));
        let session = Session::new(Document::new("img", &["DNA".to_string()], 1000));
        let dest = SaveDestination {
            root_dir: "/tmp/out".into(),
            out_name: "tonsil".into(),
        };
        let request = render_request(&session, &dest).unwrap();

        let mut seen = Vec::new();
        publish(
            &collab,
            &request,
            Duration::from_millis(500),
            Duration::from_secs(60),
            |p| seen.push(p.progress),
        )
        .await
        .unwrap();
        assert_eq!(seen, vec![0, 2, 3]);
        assert_eq!(backend.renders().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_render_times_out() {
        let backend = MockBackend::new();
        for _ in 0..100 {
            backend.push_progress(1, 3);
        }
        let collab = Collaborators::uniform(backend, Duration::from_secs(5));
        let session = Session::new(Document::new("img", &["DNA".to_string()], 1000));
        let dest = SaveDestination {
            root_dir: "/tmp/out".into(),
            out_name: "tonsil".into(),
        };
        let request = render_request(&session, &dest).unwrap();

        let mut polls = 0;
        let err = publish(
            &collab,
            &request,
            Duration::from_secs(1),
            Duration::from_secs(10),
            |_| polls += 1,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, HostError::Timeout(_)));
        assert!(err.is_recoverable());
        assert!((10..=11).contains(&polls), "polled {polls} times");
    }

    #[tokio::test]
    async fn uuids_land_on_groups() {
        let backend = MockBackend::new();
        let collab = Collaborators::uniform(backend, Duration::from_secs(5));
        let mut session = Session::new(Document::new("img", &["DNA".to_string()], 1000));
        let groups = story_model::build_group_output(session.document());
        let reply = sync_render_settings(&collab, &image_id(&session), &groups)
            .await
            .unwrap();
        apply_render_settings(&mut session, &groups, &reply).unwrap();
        let group = session.document().groups().get(0).unwrap();
        assert_eq!(group.uuid.as_deref(), Some("group-0"));
    }

    #[tokio::test]
    async fn uuids_follow_labels_after_groups_shift() {
        let backend = MockBackend::new();
        let collab = Collaborators::uniform(backend, Duration::from_secs(5));
        let mut session = Session::new(Document::new("img", &["DNA".to_string()], 1000));
        let sent = story_model::build_group_output(session.document());
        let reply = sync_render_settings(&collab, &image_id(&session), &sent)
            .await
            .unwrap();

        session
            .document_mut()
            .insert_group(None, "Front", vec![0])
            .unwrap();
        apply_render_settings(&mut session, &sent, &reply).unwrap();

        let groups = session.document().groups();
        assert_eq!(groups.get(0).unwrap().uuid, None);
        assert_eq!(groups.get(1).unwrap().uuid.as_deref(), Some("group-0"));
    }

    #[test]
    fn uuids_for_removed_groups_are_skipped() {
        let mut doc = Document::new("img", &["DNA".to_string()], 1000);
        doc.insert_group(Some(0), "Immune", vec![0]).unwrap();
        let mut session = Session::new(doc);
        let sent = story_model::build_group_output(session.document());
        session.document_mut().remove_group(0).unwrap();

        let reply = RenderSettingsReply {
            groups: vec![
                crate::protocol::GroupUuid { id: 0, uuid: "a".into() },
                crate::protocol::GroupUuid { id: 1, uuid: "b".into() },
            ],
        };
        apply_render_settings(&mut session, &sent, &reply).unwrap();
        let group = session.document().groups().get(0).unwrap();
        assert_eq!(group.label, "Immune");
        assert_eq!(group.uuid.as_deref(), Some("b"));

        let bad = RenderSettingsReply {
            groups: vec![crate::protocol::GroupUuid { id: 7, uuid: "x".into() }],
        };
        let err = apply_render_settings(&mut session, &sent, &bad).unwrap_err();
        assert!(err.is_recoverable());
    }
}
