//! Filter types for querying plans.

use jiff::Timestamp;

use super::PlanStatus;

/// Filter options for listing plans.
#[derive(Debug, Clone, Default)]
pub struct PlanFilter {
    /// Only plans in this status
    pub status: Option<PlanStatus>,

    /// Goal contains this text (case-insensitive)
    pub goal_contains: Option<String>,

    /// Created at or after this instant
    pub created_after: Option<Timestamp>,

    /// Maximum number of plans returned, newest first
    pub limit: Option<u32>,
}

impl PlanFilter {
    /// Filter on a single status.
    pub fn with_status(status: PlanStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }
}
