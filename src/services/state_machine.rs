//! Job status state machine: the statuses a hauling job moves through and
//! the table of legal transitions with their guards.
//!
//! This module is pure. Guard *enforcement* (geofence containment, payload
//! checks) lives in the lifecycle controller; here an edge only names which
//! guard applies.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use thiserror::Error;

/// Lifecycle status of a hauling job.
///
/// Two tracks share the enum: the client approval track
/// (`pending_approval` / `approved` / `rejected`) and the operator track
/// (`available` through `verified`). `rejected` is terminal; `verified` is
/// settled but can be reopened by an administrator.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobStatus {
    PendingApproval,
    Approved,
    Rejected,
    Available,
    Accepted,
    EnRoute,
    OnSite,
    InProgress,
    Completed,
    Verified,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Rejected)
    }

    /// Statuses at or past acceptance carry assignment fields.
    pub fn has_assignment(self) -> bool {
        matches!(
            self,
            Self::Accepted | Self::EnRoute | Self::OnSite | Self::InProgress | Self::Completed | Self::Verified
        )
    }
}

/// Precondition that must hold before an edge commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionGuard {
    None,
    /// Truck number, driver name and starting location must be supplied.
    Assignment,
    /// Current location must fall inside the job's pickup geofence.
    PickupGeofence,
    /// Completion payload must carry a non-empty delivery confirmation.
    Completion,
    /// Only an administrative actor may request the edge.
    Admin,
}

/// One legal edge of the status graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionRule {
    pub from: JobStatus,
    pub to: JobStatus,
    pub guard: TransitionGuard,
}

const fn rule(from: JobStatus, to: JobStatus, guard: TransitionGuard) -> TransitionRule {
    TransitionRule { from, to, guard }
}

/// The full transition table. Any requested edge absent from this list is
/// invalid and leaves the job untouched.
pub const TRANSITIONS: &[TransitionRule] = &[
    // Client approval track.
    rule(JobStatus::PendingApproval, JobStatus::Approved, TransitionGuard::None),
    rule(JobStatus::PendingApproval, JobStatus::Rejected, TransitionGuard::None),
    rule(JobStatus::Approved, JobStatus::Available, TransitionGuard::None),
    // Operator track.
    rule(JobStatus::Available, JobStatus::Accepted, TransitionGuard::Assignment),
    rule(JobStatus::Accepted, JobStatus::EnRoute, TransitionGuard::None),
    rule(JobStatus::EnRoute, JobStatus::OnSite, TransitionGuard::PickupGeofence),
    rule(JobStatus::OnSite, JobStatus::InProgress, TransitionGuard::None),
    rule(JobStatus::InProgress, JobStatus::Completed, TransitionGuard::Completion),
    // Administrative edges.
    rule(JobStatus::Completed, JobStatus::Verified, TransitionGuard::Admin),
    rule(JobStatus::Verified, JobStatus::Accepted, TransitionGuard::Admin),
];

/// Requested edge is not in the transition table.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("invalid transition {from} -> {to}")]
pub struct InvalidTransition {
    pub from: JobStatus,
    pub to: JobStatus,
}

/// Look up the rule for an edge, or fail with [`InvalidTransition`].
pub fn rule_for(from: JobStatus, to: JobStatus) -> Result<&'static TransitionRule, InvalidTransition> {
    TRANSITIONS
        .iter()
        .find(|r| r.from == from && r.to == to)
        .ok_or(InvalidTransition { from, to })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    const ALL: &[JobStatus] = &[
        JobStatus::PendingApproval,
        JobStatus::Approved,
        JobStatus::Rejected,
        JobStatus::Available,
        JobStatus::Accepted,
        JobStatus::EnRoute,
        JobStatus::OnSite,
        JobStatus::InProgress,
        JobStatus::Completed,
        JobStatus::Verified,
    ];

    #[test]
    fn listed_edges_resolve() {
        for edge in TRANSITIONS {
            let rule = rule_for(edge.from, edge.to).unwrap();
            assert_eq!(rule.guard, edge.guard);
        }
    }

    #[test]
    fn unlisted_edges_are_invalid() {
        for &from in ALL {
            for &to in ALL {
                let listed = TRANSITIONS.iter().any(|r| r.from == from && r.to == to);
                if !listed {
                    assert_eq!(rule_for(from, to), Err(InvalidTransition { from, to }));
                }
            }
        }
    }

    #[test]
    fn no_edges_leave_rejected() {
        assert!(TRANSITIONS.iter().all(|r| r.from != JobStatus::Rejected));
        assert!(JobStatus::Rejected.is_terminal());
    }

    #[test]
    fn arrival_edge_is_geofence_guarded() {
        let rule = rule_for(JobStatus::EnRoute, JobStatus::OnSite).unwrap();
        assert_eq!(rule.guard, TransitionGuard::PickupGeofence);
    }

    #[test]
    fn status_string_round_trip() {
        // Status strings are persisted; Display and FromStr must agree.
        for &status in ALL {
            assert_eq!(JobStatus::from_str(&status.to_string()).unwrap(), status);
        }
        assert_eq!(JobStatus::EnRoute.to_string(), "en_route");
        assert_eq!(
            JobStatus::from_str("pending_approval").unwrap(),
            JobStatus::PendingApproval
        );
    }
}
