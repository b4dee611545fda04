//! Routing of steps to registered handlers.
//!
//! Handlers implement [`Handler`] and are registered by name in an
//! [`AgentRegistry`] owned by the caller. The [`Dispatcher`] looks up the
//! handler named by a step, invokes it and normalizes whatever shape it
//! returns into a [`StepResult`].

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::{
    error::{EngineError, Result, StepError},
    models::Step,
};

/// What a handler sees of the step it executes.
#[derive(Debug, Clone, PartialEq)]
pub struct StepInvocation {
    pub plan_id: u64,
    pub key: String,
    pub index: u32,
    pub step_type: String,
    pub agent_name: String,
    pub parameters: Value,
    /// 1-based attempt number
    pub attempt: u32,
}

impl StepInvocation {
    pub fn from_step(step: &Step, attempt: u32) -> Self {
        Self {
            plan_id: step.plan_id,
            key: step.key.clone(),
            index: step.index,
            step_type: step.step_type.clone(),
            agent_name: step.agent_name.clone(),
            parameters: step.parameters.clone(),
            attempt,
        }
    }

    /// Returns a string parameter, if present.
    pub fn param_str(&self, name: &str) -> Option<&str> {
        self.parameters.get(name).and_then(Value::as_str)
    }
}

/// Plan-level context passed alongside every invocation.
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    pub plan_id: u64,
    pub goal: String,
    /// Results of the step's completed dependencies, by step key
    pub dependency_results: HashMap<String, Value>,
    /// Tripped when the plan is cancelled; handlers may observe it
    pub cancel: CancellationToken,
}

impl ExecutionContext {
    pub fn dependency(&self, key: &str) -> Option<&Value> {
        self.dependency_results.get(key)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Shapes a handler may return.
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerOutput {
    Json(Value),
    Text(String),
    Records(Vec<Value>),
    Empty,
}

impl HandlerOutput {
    pub fn kind(&self) -> &'static str {
        match self {
            HandlerOutput::Json(_) => "json",
            HandlerOutput::Text(_) => "text",
            HandlerOutput::Records(_) => "records",
            HandlerOutput::Empty => "empty",
        }
    }
}

/// Uniform result envelope stored for every completed step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepResult {
    pub kind: String,
    pub data: Value,
}

impl From<HandlerOutput> for StepResult {
    fn from(output: HandlerOutput) -> Self {
        let kind = output.kind().to_string();
        let data = match output {
            HandlerOutput::Json(value) => value,
            HandlerOutput::Text(text) => Value::String(text),
            HandlerOutput::Records(records) => Value::Array(records),
            HandlerOutput::Empty => Value::Null,
        };
        Self { kind, data }
    }
}

impl StepResult {
    pub fn to_value(&self) -> Value {
        json!({ "kind": self.kind, "data": self.data })
    }
}

/// Failure categories a handler can report.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandlerError {
    #[error("transient: {0}")]
    Transient(String),
    #[error("resource busy: {0}")]
    Busy(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("{0}")]
    Fatal(String),
}

impl From<HandlerError> for StepError {
    fn from(error: HandlerError) -> Self {
        match error {
            HandlerError::Transient(message) => StepError::Transient { message },
            HandlerError::Busy(message) => StepError::Transient {
                message: format!("resource busy: {message}"),
            },
            other => StepError::Fatal {
                message: other.to_string(),
            },
        }
    }
}

/// A pluggable executor for one kind of step.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn execute(
        &self,
        step: &StepInvocation,
        ctx: &ExecutionContext,
    ) -> std::result::Result<HandlerOutput, HandlerError>;
}

/// Registered handler with its advertised capabilities.
#[derive(Clone)]
pub struct AgentEntry {
    pub name: String,
    pub capabilities: Vec<String>,
    handler: Arc<dyn Handler>,
}

/// Name-keyed set of handlers.
#[derive(Clone, Default)]
pub struct AgentRegistry {
    agents: BTreeMap<String, AgentEntry>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler. Names are unique.
    pub fn register<I, S>(
        &mut self,
        name: impl Into<String>,
        capabilities: I,
        handler: Arc<dyn Handler>,
    ) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(EngineError::invalid_input("name", "agent name cannot be empty"));
        }
        if self.agents.contains_key(&name) {
            return Err(EngineError::DuplicateAgent { name });
        }

        log::debug!("Registered agent '{name}'");
        self.agents.insert(
            name.clone(),
            AgentEntry {
                name,
                capabilities: capabilities.into_iter().map(Into::into).collect(),
                handler,
            },
        );
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Handler>> {
        self.agents.get(name).map(|entry| Arc::clone(&entry.handler))
    }

    pub fn capabilities(&self, name: &str) -> Option<&[String]> {
        self.agents.get(name).map(|entry| entry.capabilities.as_slice())
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        self.agents.keys().map(String::as_str).collect()
    }

    pub fn entries(&self) -> impl Iterator<Item = &AgentEntry> {
        self.agents.values()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.agents.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

/// Invokes the handler a step names.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<AgentRegistry>,
}

impl Dispatcher {
    pub fn new(registry: Arc<AgentRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    /// Runs one attempt of a step.
    pub async fn dispatch(
        &self,
        step: &StepInvocation,
        ctx: &ExecutionContext,
    ) -> std::result::Result<StepResult, StepError> {
        let handler = self
            .registry
            .get(&step.agent_name)
            .ok_or_else(|| StepError::UnknownAgent {
                name: step.agent_name.clone(),
            })?;

        handler
            .execute(step, ctx)
            .await
            .map(StepResult::from)
            .map_err(StepError::from)
    }
}
