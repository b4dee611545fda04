//! High-level engine API.
//!
//! [`Engine`] is the entry point callers use. It owns the store handle, the
//! validator, the dispatcher and the scheduler, and fronts them with async
//! methods.
//!
//! ```text
//! submit_plan ──▶ Validator ──▶ Store (one transaction)
//! run_plan    ──▶ Scheduler ──▶ Resolver, Dispatcher + retry, Store
//! queries     ──▶ Store
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use cadence_core::{agents::builtin_registry, EngineBuilder};
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = EngineBuilder::new()
//!     .with_database_path(Some("plans.db"))
//!     .with_registry(builtin_registry()?)
//!     .build()
//!     .await?;
//!
//! let plan_id = engine
//!     .submit_plan(&json!({
//!         "goal": "Say hello",
//!         "steps": [{"id": "greet", "type": "echo", "agent_name": "echo",
//!                    "parameters": {"text": "hello"}}]
//!     }))
//!     .await?;
//!
//! let report = engine.run_plan(plan_id).await?;
//! println!("{}", report.status.as_str());
//! # Ok(())
//! # }
//! ```

use std::{path::Path, sync::Arc};

pub mod builder;
pub mod plan_ops;
pub mod step_ops;

pub use builder::EngineBuilder;

use crate::{
    config::EngineConfig,
    dispatcher::{AgentRegistry, Dispatcher},
    scheduler::Scheduler,
    store::Store,
    validator::Validator,
};

/// Orchestration engine bound to one database file.
///
/// Cloning is cheap and every clone talks to the same database, so a clone
/// can be moved into a task to run a plan while the original keeps serving
/// status queries, pause, resume and cancel requests.
///
/// Several engines, in one process or several, may share a database file.
/// A run lease on each plan keeps them from executing the same plan twice:
/// the second `run_plan` call fails with `EngineError::PlanLeased` until the
/// first run ends or stops renewing its lease.
#[derive(Clone)]
pub struct Engine {
    pub(crate) store: Store,
    pub(crate) dispatcher: Dispatcher,
    pub(crate) validator: Arc<Validator>,
    pub(crate) scheduler: Scheduler,
    pub(crate) config: EngineConfig,
}

impl Engine {
    pub fn database_path(&self) -> &Path {
        self.store.path()
    }

    pub fn registry(&self) -> &AgentRegistry {
        self.dispatcher.registry()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Direct access to the persistence façade.
    pub fn store(&self) -> &Store {
        &self.store
    }
}
