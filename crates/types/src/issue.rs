//! Issue records surfaced to administrative clients.
//!
//! An issue is a persistent, queryable record of an ongoing condition that
//! needs operator attention. Issue payloads are a closed set of variants
//! ([`IssueDetails`]) serialized with an internal `type` tag, so the JSON form
//! of a name conflict looks like:
//!
//! ```json
//! {
//!   "id": "5d0c...",
//!   "type": "NAME_CONFLICT_ISSUE",
//!   "object_type": "namespace",
//!   "contested_name": "John Jacob Jingleheimer Schmidt",
//!   "contestants": ["0e2f...", "9a41..."],
//!   "critical": false,
//!   "description": "The following namespaces are all named ...",
//!   "first_observed": "2026-01-01T00:00:00Z",
//!   "last_observed": "2026-01-01T00:00:00Z"
//! }
//! ```

use std::{collections::BTreeSet, fmt};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{EntityId, EntityKind, IssueId};

// ============================================================================
// Issue Types
// ============================================================================

/// Discriminant of an issue, as exposed on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IssueType {
    /// Two or more entities of the same kind share a name under the
    /// configured equivalence policy.
    #[serde(rename = "NAME_CONFLICT_ISSUE")]
    NameConflict,
}

impl IssueType {
    /// Returns the wire name of the issue type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NameConflict => "NAME_CONFLICT_ISSUE",
        }
    }
}

impl fmt::Display for IssueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of a name-conflict issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameConflict {
    /// Kind of the contesting entities.
    pub object_type: EntityKind,
    /// Most recently observed raw display name among the contestants.
    ///
    /// Callers must compare this case-insensitively (or under the configured
    /// policy) against the names they created.
    pub contested_name: String,
    /// Every entity currently holding the contested name.
    pub contestants: BTreeSet<EntityId>,
}

impl NameConflict {
    /// Human-readable summary of the conflict.
    pub fn describe(&self) -> String {
        let ids: Vec<String> = self.contestants.iter().map(ToString::to_string).collect();
        format!(
            "The following {} are all named '{}': {}.",
            self.object_type.plural(),
            self.contested_name,
            ids.join(", ")
        )
    }
}

/// Strongly typed issue payload, tagged by [`IssueType`] on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum IssueDetails {
    /// Name conflict between same-kind entities.
    #[serde(rename = "NAME_CONFLICT_ISSUE")]
    NameConflict(NameConflict),
}

impl IssueDetails {
    /// Returns the discriminant of this payload.
    #[must_use]
    pub const fn issue_type(&self) -> IssueType {
        match self {
            Self::NameConflict(_) => IssueType::NameConflict,
        }
    }

    /// Whether the condition threatens availability or data safety.
    ///
    /// Name conflicts only confuse operators and name-based lookups.
    #[must_use]
    pub const fn is_critical(&self) -> bool {
        match self {
            Self::NameConflict(_) => false,
        }
    }

    /// Human-readable summary of the payload.
    pub fn describe(&self) -> String {
        match self {
            Self::NameConflict(conflict) => conflict.describe(),
        }
    }
}

// ============================================================================
// Issue Records
// ============================================================================

/// A live issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    /// Identity, stable for the lifetime of the underlying condition.
    pub id: IssueId,
    /// Typed payload (flattened, carries the `type` tag).
    #[serde(flatten)]
    pub details: IssueDetails,
    /// Whether the issue is critical.
    pub critical: bool,
    /// Human-readable summary.
    pub description: String,
    /// When the condition was first observed.
    pub first_observed: DateTime<Utc>,
    /// When the condition was last refreshed.
    pub last_observed: DateTime<Utc>,
}

impl Issue {
    /// Creates a new issue first observed at `now`.
    pub fn new(id: IssueId, details: IssueDetails, now: DateTime<Utc>) -> Self {
        Self {
            id,
            critical: details.is_critical(),
            description: details.describe(),
            details,
            first_observed: now,
            last_observed: now,
        }
    }

    /// Replaces the payload, keeping identity and `first_observed`.
    pub fn refresh(&mut self, details: IssueDetails, now: DateTime<Utc>) {
        self.critical = details.is_critical();
        self.description = details.describe();
        self.details = details;
        self.last_observed = now;
    }

    /// Returns the discriminant of this issue.
    #[must_use]
    pub const fn issue_type(&self) -> IssueType {
        self.details.issue_type()
    }

    /// Returns the name-conflict payload, if this is a name conflict.
    pub fn as_name_conflict(&self) -> Option<&NameConflict> {
        match &self.details {
            IssueDetails::NameConflict(conflict) => Some(conflict),
        }
    }
}

/// An issue that is no longer active.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedIssue {
    /// The issue as it was when last active.
    #[serde(flatten)]
    pub issue: Issue,
    /// When the condition went away.
    pub resolved_at: DateTime<Utc>,
}

// ============================================================================
// Filters
// ============================================================================

/// Selection criteria for issue listings.
///
/// All criteria are optional and combine with AND. `name` is matched by the
/// detector under its configured equivalence policy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueFilter {
    /// Only issues of this type.
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub issue_type: Option<IssueType>,
    /// Only issues about this kind of entity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_type: Option<EntityKind>,
    /// Only issues whose contested name is equivalent to this one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl IssueFilter {
    /// Filter that matches every issue.
    pub fn all() -> Self {
        Self::default()
    }

    /// Restricts to one issue type.
    #[must_use]
    pub fn with_type(mut self, issue_type: IssueType) -> Self {
        self.issue_type = Some(issue_type);
        self
    }

    /// Restricts to one entity kind.
    #[must_use]
    pub fn with_object_type(mut self, kind: EntityKind) -> Self {
        self.object_type = Some(kind);
        self
    }

    /// Restricts to conflicts over names equivalent to `name`.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Checks the structural criteria (type and object type).
    ///
    /// Name matching needs the detector's classifier and is applied there.
    pub fn matches_structure(&self, issue: &Issue) -> bool {
        if self.issue_type.is_some_and(|t| t != issue.issue_type()) {
            return false;
        }
        match (&self.object_type, issue.as_name_conflict()) {
            (Some(kind), Some(conflict)) => conflict.object_type == *kind,
            (Some(_), None) => false,
            (None, _) => true,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn conflict(kind: EntityKind, name: &str, ids: &[EntityId]) -> IssueDetails {
        IssueDetails::NameConflict(NameConflict {
            object_type: kind,
            contested_name: name.to_string(),
            contestants: ids.iter().copied().collect(),
        })
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_issue_serializes_with_type_tag() {
        let a = EntityId::random();
        let b = EntityId::random();
        let issue =
            Issue::new(IssueId::random(), conflict(EntityKind::Namespace, "users", &[a, b]), at(0));

        let value = serde_json::to_value(&issue).unwrap();
        assert_eq!(value["type"], "NAME_CONFLICT_ISSUE");
        assert_eq!(value["contested_name"], "users");
        assert_eq!(value["object_type"], "namespace");
        assert_eq!(value["critical"], false);
        let contestants = value["contestants"].as_array().unwrap();
        assert_eq!(contestants.len(), 2);
    }

    #[test]
    fn test_issue_deserializes_from_wire_form() {
        let a = EntityId::random();
        let issue =
            Issue::new(IssueId::random(), conflict(EntityKind::Server, "s1", &[a]), at(10));
        let json = serde_json::to_string(&issue).unwrap();
        let parsed: Issue = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, issue);
    }

    #[test]
    fn test_refresh_keeps_identity_and_first_observed() {
        let a = EntityId::random();
        let b = EntityId::random();
        let c = EntityId::random();
        let id = IssueId::random();
        let mut issue = Issue::new(id, conflict(EntityKind::Namespace, "x", &[a, b, c]), at(1));

        issue.refresh(conflict(EntityKind::Namespace, "X", &[a, b]), at(5));

        assert_eq!(issue.id, id);
        assert_eq!(issue.first_observed, at(1));
        assert_eq!(issue.last_observed, at(5));
        assert_eq!(issue.as_name_conflict().unwrap().contestants.len(), 2);
        assert!(issue.description.contains("'X'"));
    }

    #[test]
    fn test_description_names_kind_and_contestants() {
        let a = EntityId::random();
        let details = conflict(EntityKind::Datacenter, "east", &[a]);
        let text = details.describe();
        assert!(text.contains("datacenters"));
        assert!(text.contains(&a.to_string()));
    }

    #[test]
    fn test_filter_structure() {
        let issue = Issue::new(
            IssueId::random(),
            conflict(EntityKind::Namespace, "x", &[EntityId::random()]),
            at(0),
        );
        assert!(IssueFilter::all().matches_structure(&issue));
        assert!(IssueFilter::all().with_type(IssueType::NameConflict).matches_structure(&issue));
        assert!(
            IssueFilter::all().with_object_type(EntityKind::Namespace).matches_structure(&issue)
        );
        assert!(!IssueFilter::all().with_object_type(EntityKind::Server).matches_structure(&issue));
    }

    #[test]
    fn test_filter_parses_type_field() {
        let filter: IssueFilter =
            serde_json::from_str(r#"{"type":"NAME_CONFLICT_ISSUE","object_type":"server"}"#)
                .unwrap();
        assert_eq!(filter.issue_type, Some(IssueType::NameConflict));
        assert_eq!(filter.object_type, Some(EntityKind::Server));
        assert_eq!(filter.name, None);
    }
}
