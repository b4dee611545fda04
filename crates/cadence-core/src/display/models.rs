//! Display implementations for domain models.
//!
//! All output is markdown so the CLI can render it through termimad.

use std::fmt;

use serde_json::Value;

use super::datetime::{LocalDateTime, MaybeDateTime};
use crate::models::{
    LogEntry, Plan, PlanStatus, PlanStatusReport, PlanSummary, ResultOutcome, Step, StepStatus,
};

impl fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl fmt::Display for ResultOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Writes a JSON value as a fenced block.
fn write_json(f: &mut fmt::Formatter<'_>, value: &Value) -> fmt::Result {
    let pretty = serde_json::to_string_pretty(value).map_err(|_| fmt::Error)?;
    writeln!(f, "```json")?;
    writeln!(f, "{pretty}")?;
    writeln!(f, "```")
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "# {}. {}", self.id, self.goal)?;
        writeln!(f)?;

        writeln!(f, "- Status: {}", self.status)?;
        writeln!(
            f,
            "- Progress: {:.0}% ({}/{} completed)",
            self.progress,
            self.count_steps(StepStatus::Completed),
            self.total_steps
        )?;
        writeln!(f, "- Created: {}", LocalDateTime(&self.created_at))?;
        writeln!(f, "- Updated: {}", LocalDateTime(&self.updated_at))?;

        writeln!(f, "\n## Steps")?;
        writeln!(f)?;
        for step in &self.steps {
            write!(f, "{step}")?;
        }

        if let Some(result) = &self.final_result {
            writeln!(f, "## Final result")?;
            writeln!(f)?;
            write_json(f, result)?;
        }

        Ok(())
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "### {}. {} ({})",
            self.index + 1,
            self.key,
            self.status.with_icon()
        )?;
        writeln!(f)?;
        writeln!(f, "- Agent: {} (type `{}`)", self.agent_name, self.step_type)?;
        if !self.depends_on.is_empty() {
            writeln!(f, "- Depends on: {}", self.depends_on.join(", "))?;
        }
        if let Some(group) = &self.parallel_group {
            writeln!(f, "- Group: {group}")?;
        }
        if self.retry_count > 0 {
            writeln!(f, "- Retries: {}", self.retry_count)?;
        }
        writeln!(f, "- Started: {}", MaybeDateTime(self.started_at.as_ref()))?;
        writeln!(f, "- Finished: {}", MaybeDateTime(self.completed_at.as_ref()))?;
        writeln!(f)?;

        if let Some(error) = &self.error {
            writeln!(f, "> {error}")?;
            writeln!(f)?;
        }
        if let Some(result) = &self.result {
            writeln!(f, "#### Result")?;
            writeln!(f)?;
            write_json(f, result)?;
            writeln!(f)?;
        }

        Ok(())
    }
}

impl fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "## {} (ID: {}) [{}] ({}/{})",
            self.goal, self.id, self.status, self.completed_steps, self.total_steps
        )?;
        writeln!(f)?;
        if self.failed_steps > 0 || self.skipped_steps > 0 {
            writeln!(
                f,
                "- **Failed**: {}, **Skipped**: {}",
                self.failed_steps, self.skipped_steps
            )?;
        }
        writeln!(f, "- **Created**: {}", LocalDateTime(&self.created_at))?;
        writeln!(f)
    }
}

impl fmt::Display for PlanStatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "# {}. {}", self.plan_id, self.goal)?;
        writeln!(f)?;
        writeln!(f, "Status: **{}**, progress {:.0}%", self.status, self.progress)?;
        writeln!(f)?;
        writeln!(f, "|#|Step|Agent|Status|Retries|Error|")?;
        writeln!(f, "|-:|-|-|-|-:|-|")?;
        for step in &self.steps {
            writeln!(
                f,
                "|{}|{}|{}|{}|{}|{}|",
                step.index + 1,
                step.key,
                step.agent_name,
                step.status.with_icon(),
                step.retry_count,
                step.error.as_deref().unwrap_or("").replace('|', "\\|")
            )?;
        }
        Ok(())
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} `{}`", LocalDateTime(&self.created_at), self.event.as_str())?;
        if let Some(key) = &self.step_key {
            write!(f, " {key}")?;
        }
        if let Some(attempt) = self.attempt {
            write!(f, " #{attempt}")?;
        }
        write!(f, ": {}", self.message)
    }
}
