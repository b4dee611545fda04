//! Core library of the Cadence research-plan orchestration engine.
//!
//! A plan is a goal plus a set of steps connected by dependencies. Callers
//! submit plan documents as JSON; the engine validates them, persists them to
//! SQLite, and runs them: dependency layers execute in order, steps inside a
//! layer run concurrently, each step is dispatched to a named handler and
//! retried according to the retry policy. Every transition and attempt is
//! written to the store, so a plan can be inspected at any point and resumed
//! after a restart.
//!
//! # Display Architecture
//!
//! Domain models implement [`std::fmt::Display`] and render markdown; the
//! [`display`] module adds wrappers for lists and operation outcomes. The CLI
//! renders that markdown in the terminal.
//!
//! # Quick Start
//!
//! ```rust
//! use cadence_core::{agents::builtin_registry, models::PlanStatus, EngineBuilder};
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let dir = tempfile::tempdir()?;
//! let engine = EngineBuilder::new()
//!     .with_database_path(Some(dir.path().join("plans.db")))
//!     .with_registry(builtin_registry()?)
//!     .build()
//!     .await?;
//!
//! let report = engine
//!     .submit_and_run(&json!({
//!         "goal": "Collect two facts",
//!         "steps": [
//!             {"id": "a", "type": "echo", "agent_name": "echo", "parameters": {"fact": 1}},
//!             {"id": "b", "type": "echo", "agent_name": "echo", "parameters": {"fact": 2},
//!              "depends_on": ["a"]}
//!         ]
//!     }))
//!     .await?;
//!
//! assert_eq!(report.status, PlanStatus::Completed);
//! # Ok(())
//! # }
//! ```

pub mod agents;
pub mod config;
pub mod db;
pub mod dispatcher;
pub mod display;
pub mod engine;
pub mod error;
pub mod models;
pub mod resolver;
pub mod retry;
pub mod scheduler;
pub mod state;
pub mod store;
pub mod validator;

// Re-export commonly used types
pub use config::EngineConfig;
pub use db::Database;
pub use dispatcher::{
    AgentRegistry, ExecutionContext, Handler, HandlerError, HandlerOutput, StepInvocation,
    StepResult,
};
pub use display::{LocalDateTime, OperationStatus, PlanSummaries};
pub use engine::{Engine, EngineBuilder};
pub use error::{EngineError, Result, StepError};
pub use models::{
    LogEntry, LogEvent, Plan, PlanFilter, PlanStatus, PlanStatusReport, PlanSummary, ResultRecord,
    Step, StepStatus,
};
pub use retry::{Backoff, RetryConfig, RetryPolicy};
pub use scheduler::RunReport;
pub use validator::{ValidatedPlan, ValidationError, Validator};

/// JSON Schema of the accepted plan document.
#[cfg(feature = "schema")]
pub fn plan_document_schema() -> Result<serde_json::Value> {
    use error::ResultExt;

    let schema = schemars::schema_for!(models::PlanDocument);
    serde_json::to_value(schema).with_context("Failed to serialize plan document schema")
}
