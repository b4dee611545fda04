//! Markdown formatting of plans, steps and the audit trail.
//!
//! Domain models implement [`std::fmt::Display`] directly (see [`models`]).
//! Collections and operation outcomes use newtype wrappers so the same data
//! can be rendered differently in lists and in detail views.
//!
//! - [`collections`]: plan lists, status tables, log and result listings
//! - [`status`]: outcomes of submit, run and control operations
//! - [`datetime`]: timestamps in the local time zone
//! - [`models`]: Display implementations for domain models
//!
//! ```rust
//! use cadence_core::display::OperationStatus;
//!
//! let status = OperationStatus::success("Plan 3 cancelled".to_string());
//! assert!(status.to_string().contains("Plan 3 cancelled"));
//! ```

pub mod collections;
pub mod datetime;
pub mod models;
pub mod status;

pub use collections::{AgentList, ExecutionLog, PlanSummaries, ResultRecords};
pub use datetime::LocalDateTime;
pub use status::{OperationStatus, RunSummary, SubmitResult};
