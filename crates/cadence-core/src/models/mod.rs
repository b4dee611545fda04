//! Data models for plans, steps and their append-only records.
//!
//! Display implementations for these models live in
//! [`crate::display::models`] to keep data structures separate from
//! presentation.

pub mod document;
pub mod filters;
pub mod plan;
pub mod records;
pub mod status;
pub mod step;
pub mod summary;

#[cfg(test)]
mod tests;

pub use document::{PlanDocument, StepSpec};
pub use filters::PlanFilter;
pub use plan::Plan;
pub use records::{LogEntry, LogEvent, NewLogEntry, ResultOutcome, ResultRecord};
pub use status::{PlanStatus, StepStatus};
pub use step::Step;
pub use summary::{progress_percentage, PlanStatusReport, PlanSummary, StepStatusView};
