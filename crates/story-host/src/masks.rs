//! Classification-map sync and mask path validation.
//!
//! Fetching runs off the session; the results are applied back onto it by
//! the daemon once they arrive.

use std::collections::BTreeSet;

use futures::future::join_all;
use story_model::mask::unconfirmed_paths;
use story_model::subsets::{begin_classification_map, clear_classification_map, merge_subsets};
use story_model::{MapStatus, ModelResult, PathStatus, SubsetResponse};

use crate::adapters::registry::Collaborators;
use crate::error::{HostError, HostResult};
use crate::protocol::PathValidation;
use crate::session::Session;

/// A subset fetch for the classification map set at `generation`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubsetFetch {
    pub map_path: String,
    pub generation: u64,
}

/// Point mask 0 at `map_path`, or clear it. Returns the fetch that must now
/// run, if any. Any fetch started earlier is superseded.
pub fn set_map_path(session: &mut Session, map_path: Option<String>) -> ModelResult<Option<SubsetFetch>> {
    let map_path = map_path.filter(|p| !p.trim().is_empty());
    let status = match &map_path {
        Some(path) => begin_classification_map(session.document_mut(), path)?,
        None => clear_classification_map(session.document_mut())?,
    };
    session.status_mut().map_status = status;
    let generation = session.next_map_generation();
    tracing::debug!(?status, map = ?map_path, generation, "classification map changed");
    Ok(map_path.map(|map_path| SubsetFetch {
        map_path,
        generation,
    }))
}

pub async fn fetch_subsets(collab: &Collaborators, map_path: &str) -> HostResult<SubsetResponse> {
    collab.subsets(map_path).await
}

/// Merge fetched subsets into the session. Only the latest fetch is applied;
/// replies to superseded fetches are dropped, even for the same map path.
/// Fetch or shape failures mark the map invalid.
pub fn apply_subsets(
    session: &mut Session,
    fetch: &SubsetFetch,
    result: HostResult<SubsetResponse>,
) -> HostResult<MapStatus> {
    let map_path = fetch.map_path.as_str();
    if fetch.generation != session.map_generation() {
        tracing::debug!(
            map = %map_path,
            generation = fetch.generation,
            latest = session.map_generation(),
            "dropping subsets for superseded fetch"
        );
        return Ok(session.status().map_status);
    }
    let merged = result.and_then(|resp| {
        merge_subsets(session.document_mut(), &resp).map_err(HostError::from)
    });
    let status = match merged {
        Ok(keys) => {
            tracing::info!(map = %map_path, masks = keys.len(), "subset masks merged");
            MapStatus::Ready
        }
        Err(err) if err.is_recoverable() => {
            tracing::warn!(map = %map_path, error = %err, "classification map rejected");
            MapStatus::Invalid
        }
        Err(err) => return Err(err),
    };
    session.status_mut().map_status = status;
    Ok(status)
}

/// Paths that still need validating and are not already being validated.
/// Claimed paths are added to `in_flight`.
pub fn claim_unconfirmed(session: &Session, in_flight: &mut BTreeSet<String>) -> Vec<String> {
    unconfirmed_paths(session.document().masks(), &session.status().path_status)
        .into_iter()
        .filter(|p| in_flight.insert(p.clone()))
        .collect()
}

/// Validate every path concurrently.
pub async fn validate_paths(
    collab: &Collaborators,
    paths: Vec<String>,
) -> Vec<(String, HostResult<PathValidation>)> {
    let checks = paths.into_iter().map(|path| async move {
        let result = collab.validate_path(&path).await;
        (path, result)
    });
    join_all(checks).await
}

/// Record validation results. Paths whose check failed stay unconfirmed and
/// are retried on the next pass.
pub fn apply_validations(
    session: &mut Session,
    in_flight: &mut BTreeSet<String>,
    results: Vec<(String, HostResult<PathValidation>)>,
) {
    for (path, result) in results {
        in_flight.remove(&path);
        match result {
            Ok(v) => {
                session.status_mut().path_status.insert(
                    path,
                    PathStatus {
                        ready: v.ready,
                        invalid: v.invalid,
                    },
                );
            }
            Err(err) => tracing::warn!(%path, error = %err, "path validation failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use story_model::{Document, Mask};

    use crate::adapters::mock::MockBackend;

    fn session() -> Session {
        let mut doc = Document::new("img", &["DNA".to_string()], 1000);
        doc.push_mask(Mask::all_cells("cells.tif")).unwrap();
        Session::new(doc)
    }

    fn response() -> SubsetResponse {
        SubsetResponse {
            mask_subsets: vec![("Tumor".into(), vec![1, 2]), ("Empty".into(), vec![])],
            subset_colors: vec![[255, 0, 0], [0, 255, 0]],
            mask_states: vec!["State".into()],
        }
    }

    #[test]
    fn merge_marks_map_ready() {
        let mut s = session();
        let fetch = set_map_path(&mut s, Some("map.csv".into())).unwrap().unwrap();
        assert_eq!(fetch.map_path, "map.csv");
        assert_eq!(s.status().map_status, MapStatus::Loading);

        let status = apply_subsets(&mut s, &fetch, Ok(response())).unwrap();
        assert_eq!(status, MapStatus::Ready);
        assert_eq!(s.document().masks().len(), 2);
    }

    #[test]
    fn failed_fetch_marks_map_invalid() {
        let mut s = session();
        let fetch = set_map_path(&mut s, Some("map.csv".into())).unwrap().unwrap();
        let status =
            apply_subsets(&mut s, &fetch, Err(HostError::Transient("down".into()))).unwrap();
        assert_eq!(status, MapStatus::Invalid);
        assert_eq!(s.document().masks().len(), 1);
    }

    #[test]
    fn superseded_results_are_dropped() {
        let mut s = session();
        let old = set_map_path(&mut s, Some("old.csv".into())).unwrap().unwrap();
        set_map_path(&mut s, Some("new.csv".into())).unwrap();
        apply_subsets(&mut s, &old, Ok(response())).unwrap();
        assert_eq!(s.document().masks().len(), 1);
        assert_eq!(s.status().map_status, MapStatus::Loading);
    }

    #[test]
    fn reselecting_the_same_map_merges_once() {
        let mut s = session();
        let first = set_map_path(&mut s, Some("map.csv".into())).unwrap().unwrap();
        let second = set_map_path(&mut s, Some("map.csv".into())).unwrap().unwrap();
        assert_ne!(first.generation, second.generation);

        assert_eq!(apply_subsets(&mut s, &first, Ok(response())).unwrap(), MapStatus::Loading);
        assert_eq!(s.document().masks().len(), 1);
        assert_eq!(apply_subsets(&mut s, &second, Ok(response())).unwrap(), MapStatus::Ready);
        assert_eq!(s.document().masks().len(), 2);
    }

    #[test]
    fn clearing_the_map_supersedes_a_pending_fetch() {
        let mut s = session();
        let fetch = set_map_path(&mut s, Some("map.csv".into())).unwrap().unwrap();
        set_map_path(&mut s, None).unwrap();
        assert_eq!(apply_subsets(&mut s, &fetch, Ok(response())).unwrap(), MapStatus::Ready);
        assert_eq!(s.document().masks().len(), 1);
    }

    #[test]
    fn clearing_the_map_is_ready_at_once() {
        let mut s = session();
        assert!(set_map_path(&mut s, Some("  ".into())).unwrap().is_none());
        assert_eq!(s.status().map_status, MapStatus::Ready);
    }

    #[tokio::test]
    async fn validation_claims_each_path_once() {
        let backend = MockBackend::new();
        backend.set_path("cells.tif", false, true);
        let collab = Collaborators::uniform(backend.clone(), Duration::from_secs(1));
        let mut s = session();
        let mut in_flight = BTreeSet::new();

        let claimed = claim_unconfirmed(&s, &mut in_flight);
        assert_eq!(claimed, vec!["cells.tif".to_string()]);
        assert!(claim_unconfirmed(&s, &mut in_flight).is_empty());

        let results = validate_paths(&collab, claimed).await;
        apply_validations(&mut s, &mut in_flight, results);
        assert!(in_flight.is_empty());
        assert_eq!(
            s.status().path_status.get("cells.tif"),
            Some(&PathStatus { ready: false, invalid: true })
        );
        assert!(claim_unconfirmed(&s, &mut in_flight).is_empty());
        assert_eq!(backend.validations(), vec!["cells.tif".to_string()]);
    }
}
