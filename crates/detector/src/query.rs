//! Read-only issue queries for administrative clients.
//!
//! Every query first checks the detector phase: before the initial metadata
//! replay has been applied the answer would be incomplete, so queries fail
//! with [`DetectorError::NotReady`] instead of returning an empty list.

use std::sync::Arc;

use inferadb_issues_types::{
    DetectorError, EntityKind, Issue, IssueFilter, IssueId, ResolvedIssue, Result,
};

use crate::{engine::ConflictEngine, index::ConflictGroup, metrics, phase::PhaseState};

/// Snapshot accessor over the detector's issues.
///
/// Cheap to clone; clones share the detector's state.
#[derive(Debug, Clone)]
pub struct IssueQuery {
    engine: Arc<ConflictEngine>,
    phase: PhaseState,
}

impl IssueQuery {
    pub(crate) fn new(engine: Arc<ConflictEngine>, phase: PhaseState) -> Self {
        Self { engine, phase }
    }

    /// Active issues matching `filter`, ordered by `first_observed` then id.
    ///
    /// Each issue is internally consistent and appears once. Issues for
    /// different names may reflect slightly different points in the feed.
    ///
    /// # Errors
    ///
    /// [`DetectorError::NotReady`] before the initial sync completes,
    /// [`DetectorError::ShuttingDown`] once the detector is draining.
    pub fn list_issues(&self, filter: &IssueFilter) -> Result<Vec<Issue>> {
        self.serving("list_issues")?;
        let mut issues: Vec<Issue> = self
            .engine
            .lifecycle()
            .active_issues(self.engine.index())
            .into_iter()
            .filter(|issue| filter.matches_structure(issue) && self.matches_name(filter, issue))
            .collect();
        issues.sort_by(|a, b| a.first_observed.cmp(&b.first_observed).then_with(|| a.id.cmp(&b.id)));
        metrics::record_query("list_issues", "ok");
        Ok(issues)
    }

    /// An active issue by id.
    ///
    /// # Errors
    ///
    /// [`DetectorError::IssueNotFound`] if no active issue has this id, plus
    /// the phase errors of [`list_issues`](Self::list_issues).
    pub fn get_issue(&self, id: IssueId) -> Result<Issue> {
        self.serving("get_issue")?;
        match self.engine.lifecycle().find(self.engine.index(), id) {
            Some(issue) => {
                metrics::record_query("get_issue", "ok");
                Ok(issue)
            },
            None => {
                metrics::record_query("get_issue", "not_found");
                Err(DetectorError::IssueNotFound { id: id.to_string() })
            },
        }
    }

    /// Up to `limit` most recently resolved issues, newest first.
    ///
    /// # Errors
    ///
    /// The phase errors of [`list_issues`](Self::list_issues).
    pub fn resolved_issues(&self, limit: usize) -> Result<Vec<ResolvedIssue>> {
        self.serving("resolved_issues")?;
        metrics::record_query("resolved_issues", "ok");
        Ok(self.engine.lifecycle().resolved(limit))
    }

    /// Number of active issues.
    ///
    /// # Errors
    ///
    /// The phase errors of [`list_issues`](Self::list_issues).
    pub fn issue_count(&self) -> Result<usize> {
        self.serving("issue_count")?;
        metrics::record_query("issue_count", "ok");
        Ok(self.engine.lifecycle().active_count())
    }

    /// Current groups of `kind` with two or more members.
    ///
    /// # Errors
    ///
    /// The phase errors of [`list_issues`](Self::list_issues).
    pub fn groups_with_conflict(&self, kind: EntityKind) -> Result<Vec<ConflictGroup>> {
        self.serving("groups_with_conflict")?;
        metrics::record_query("groups_with_conflict", "ok");
        Ok(self.engine.index().groups_with_conflict(kind))
    }

    fn serving(&self, operation: &'static str) -> Result<()> {
        self.phase.ensure_serving().inspect_err(|err| {
            let outcome = match err {
                DetectorError::NotReady => "not_ready",
                _ => "shutting_down",
            };
            metrics::record_query(operation, outcome);
        })
    }

    fn matches_name(&self, filter: &IssueFilter, issue: &Issue) -> bool {
        let (Some(name), Some(conflict)) = (&filter.name, issue.as_name_conflict()) else {
            return true;
        };
        let classifier = self.engine.classifier();
        classifier.classify(name, conflict.object_type)
            == classifier.classify(&conflict.contested_name, conflict.object_type)
    }
}
