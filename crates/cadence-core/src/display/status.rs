//! Feedback messages for submit, run and control operations.

use std::fmt;

use crate::{models::PlanStatus, scheduler::RunReport};

/// Outcome message of a single operation.
pub struct OperationStatus {
    pub message: String,
    pub success: bool,
}

impl OperationStatus {
    pub fn success(message: String) -> Self {
        Self {
            message,
            success: true,
        }
    }

    pub fn failure(message: String) -> Self {
        Self {
            message,
            success: false,
        }
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} {}",
            if self.success { "Success:" } else { "Error:" },
            self.message
        )
    }
}

/// Confirmation that a plan was persisted.
pub struct SubmitResult {
    pub plan_id: u64,
    pub total_steps: usize,
}

impl fmt::Display for SubmitResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Submitted plan with ID: {} ({} steps)",
            self.plan_id, self.total_steps
        )
    }
}

/// Outcome of running a plan to a settled state.
pub struct RunSummary<'a>(pub &'a RunReport);

impl fmt::Display for RunSummary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let report = self.0;
        let verb = match report.status {
            PlanStatus::Completed => "completed",
            PlanStatus::Failed => "failed",
            PlanStatus::Cancelled => "was cancelled",
            PlanStatus::Paused => "is paused",
            _ => "stopped",
        };
        writeln!(
            f,
            "Plan {} {verb} ({:.0}%).",
            report.plan_id, report.progress
        )?;
        writeln!(f)?;

        let sections = [
            ("Completed", &report.completed),
            ("Failed", &report.failed),
            ("Skipped", &report.skipped),
        ];
        for (label, keys) in sections {
            if !keys.is_empty() {
                writeln!(f, "- **{label}**: {}", keys.join(", "))?;
            }
        }
        Ok(())
    }
}
