//! Wrapper types for displaying groups of domain objects.

use std::{fmt, ops::Index};

use crate::{
    dispatcher::AgentRegistry,
    models::{LogEntry, PlanSummary, ResultRecord},
};

use super::datetime::LocalDateTime;

/// Newtype wrapper for displaying a list of plan summaries.
///
/// Titles are left to the caller. An empty list renders a short notice.
///
/// # Examples
///
/// ```rust
/// use cadence_core::{
///     display::PlanSummaries,
///     models::{PlanStatus, PlanSummary},
/// };
/// use jiff::Timestamp;
///
/// let plan = PlanSummary {
///     id: 1,
///     goal: "Survey async runtimes".to_string(),
///     status: PlanStatus::Running,
///     progress: 50.0,
///     created_at: Timestamp::now(),
///     updated_at: Timestamp::now(),
///     total_steps: 4,
///     completed_steps: 2,
///     failed_steps: 0,
///     skipped_steps: 0,
/// };
///
/// let output = PlanSummaries(vec![plan]).to_string();
/// assert!(output.contains("Survey async runtimes"));
/// ```
pub struct PlanSummaries(pub Vec<PlanSummary>);

impl PlanSummaries {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PlanSummary> {
        self.0.iter()
    }
}

impl Index<usize> for PlanSummaries {
    type Output = PlanSummary;

    fn index(&self, index: usize) -> &Self::Output {
        &self.0[index]
    }
}

impl IntoIterator for PlanSummaries {
    type Item = PlanSummary;
    type IntoIter = std::vec::IntoIter<Self::Item>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl fmt::Display for PlanSummaries {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return writeln!(f, "No plans found.");
        }
        for plan in &self.0 {
            write!(f, "{plan}")?;
        }
        Ok(())
    }
}

/// Chronological audit trail of a plan, or the attempt history of a step.
pub struct ExecutionLog(pub Vec<LogEntry>);

impl fmt::Display for ExecutionLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return writeln!(f, "No log entries.");
        }
        for entry in &self.0 {
            writeln!(f, "- {entry}")?;
        }
        Ok(())
    }
}

/// Results written for settled steps.
pub struct ResultRecords(pub Vec<ResultRecord>);

impl fmt::Display for ResultRecords {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return writeln!(f, "No results recorded.");
        }
        for record in &self.0 {
            writeln!(
                f,
                "## {} (attempt {}, {})",
                record.step_key, record.attempt, record.outcome
            )?;
            writeln!(f)?;
            writeln!(f, "- Recorded: {}", LocalDateTime(&record.created_at))?;
            writeln!(f)?;
            let payload =
                serde_json::to_string_pretty(&record.payload).map_err(|_| fmt::Error)?;
            writeln!(f, "```json\n{payload}\n```")?;
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Registered agents with their capabilities.
pub struct AgentList<'a>(pub &'a AgentRegistry);

impl fmt::Display for AgentList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return writeln!(f, "No agents registered.");
        }
        for entry in self.0.entries() {
            if entry.capabilities.is_empty() {
                writeln!(f, "- **{}**", entry.name)?;
            } else {
                writeln!(f, "- **{}**: {}", entry.name, entry.capabilities.join(", "))?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use jiff::Timestamp;
    use serde_json::json;

    use super::*;
    use crate::{
        agents::builtin_registry,
        models::{LogEvent, PlanStatus, ResultOutcome},
    };

    #[test]
    fn test_empty_collections() {
        assert_eq!(PlanSummaries(vec![]).to_string(), "No plans found.\n");
        assert_eq!(ExecutionLog(vec![]).to_string(), "No log entries.\n");
        assert_eq!(ResultRecords(vec![]).to_string(), "No results recorded.\n");
        assert_eq!(
            AgentList(&AgentRegistry::new()).to_string(),
            "No agents registered.\n"
        );
    }

    #[test]
    fn test_plan_summaries() {
        let now = Timestamp::now();
        let summary = PlanSummary {
            id: 4,
            goal: "Compare parsers".into(),
            status: PlanStatus::Failed,
            progress: 25.0,
            created_at: now,
            updated_at: now,
            total_steps: 4,
            completed_steps: 1,
            failed_steps: 1,
            skipped_steps: 2,
        };
        let plans = PlanSummaries(vec![summary]);
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].id, 4);

        let output = plans.to_string();
        assert!(output.contains("## Compare parsers (ID: 4) [failed] (1/4)"));
        assert!(output.contains("**Failed**: 1, **Skipped**: 2"));
    }

    #[test]
    fn test_log_and_results() {
        let now = Timestamp::now();
        let log = ExecutionLog(vec![LogEntry {
            id: 1,
            plan_id: 1,
            step_id: None,
            step_key: None,
            attempt: None,
            event: LogEvent::PlanTransition,
            message: "pending -> running".into(),
            created_at: now,
        }]);
        assert!(log.to_string().contains("`plan_transition`: pending -> running"));

        let results = ResultRecords(vec![ResultRecord {
            id: 1,
            plan_id: 1,
            step_id: 2,
            step_key: "fetch".into(),
            attempt: 2,
            outcome: ResultOutcome::Success,
            payload: json!({"kind": "empty", "data": null}),
            created_at: now,
        }]);
        assert!(results.to_string().contains("## fetch (attempt 2, success)"));
    }

    #[test]
    fn test_agent_list() {
        let registry = builtin_registry().unwrap();
        let output = AgentList(&registry).to_string();
        assert_eq!(output, "- **command**: process\n- **echo**: echo\n");
    }
}
