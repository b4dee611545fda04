#![allow(dead_code)]

use std::{
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use cadence_core::{
    agents::EchoAgent,
    retry::{Backoff, RetryPolicy},
    AgentRegistry, Engine, EngineBuilder, ExecutionContext, Handler, HandlerError, HandlerOutput,
    StepInvocation,
};
use tempfile::TempDir;
use tokio::sync::{mpsc, Notify};

/// Fails with a transient error `failures` times, then succeeds.
pub struct FlakyAgent {
    pub failures: u32,
    pub calls: AtomicU32,
}

impl FlakyAgent {
    pub fn new(failures: u32) -> Self {
        Self {
            failures,
            calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl Handler for FlakyAgent {
    async fn execute(
        &self,
        step: &StepInvocation,
        _ctx: &ExecutionContext,
    ) -> Result<HandlerOutput, HandlerError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.failures {
            Err(HandlerError::Transient(format!("flaky call {call}")))
        } else {
            Ok(HandlerOutput::Text(format!("{} done", step.key)))
        }
    }
}

/// Always fails with an unrecoverable error.
pub struct FailingAgent;

#[async_trait]
impl Handler for FailingAgent {
    async fn execute(
        &self,
        _step: &StepInvocation,
        _ctx: &ExecutionContext,
    ) -> Result<HandlerOutput, HandlerError> {
        Err(HandlerError::InvalidInput("malformed query".into()))
    }
}

/// Reports each start on a channel, then blocks until released.
pub struct GateAgent {
    pub started: mpsc::UnboundedSender<String>,
    pub release: Arc<Notify>,
}

#[async_trait]
impl Handler for GateAgent {
    async fn execute(
        &self,
        step: &StepInvocation,
        ctx: &ExecutionContext,
    ) -> Result<HandlerOutput, HandlerError> {
        let _ = self.started.send(step.key.clone());
        self.release.notified().await;
        Ok(HandlerOutput::Json(serde_json::json!({
            "key": step.key,
            "inputs": ctx.dependency_results.len(),
        })))
    }
}

/// Panics inside the handler.
pub struct PanicAgent;

#[async_trait]
impl Handler for PanicAgent {
    async fn execute(
        &self,
        _step: &StepInvocation,
        _ctx: &ExecutionContext,
    ) -> Result<HandlerOutput, HandlerError> {
        panic!("handler exploded");
    }
}

/// Returns the keys of the dependency results it was handed.
pub struct InputsAgent;

#[async_trait]
impl Handler for InputsAgent {
    async fn execute(
        &self,
        _step: &StepInvocation,
        ctx: &ExecutionContext,
    ) -> Result<HandlerOutput, HandlerError> {
        let mut keys: Vec<_> = ctx.dependency_results.keys().cloned().collect();
        keys.sort();
        Ok(HandlerOutput::Json(serde_json::json!(keys)))
    }
}

/// Retry policy with no real waiting, so tests stay fast.
pub fn fast_policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy::new(
        max_attempts,
        Backoff::Fixed {
            delay: Duration::from_millis(5),
        },
    )
}

/// Registry with `echo`, `inputs`, `fail`, `flaky` (one transient failure)
/// and `down` (never recovers).
pub fn test_registry() -> AgentRegistry {
    let mut registry = AgentRegistry::new();
    registry
        .register("echo", ["echo"], Arc::new(EchoAgent))
        .expect("register echo");
    registry
        .register("fail", ["test"], Arc::new(FailingAgent))
        .expect("register fail");
    registry
        .register("inputs", ["test"], Arc::new(InputsAgent))
        .expect("register inputs");
    registry
        .register("flaky", ["test"], Arc::new(FlakyAgent::new(1)))
        .expect("register flaky");
    registry
        .register("down", ["test"], Arc::new(FlakyAgent::new(u32::MAX)))
        .expect("register down");
    registry
}

/// Helper function to create a test engine over a fresh database.
pub async fn create_test_engine(registry: AgentRegistry) -> (TempDir, Engine) {
    create_test_engine_with(registry, |builder| builder).await
}

/// Like `create_test_engine`, with extra builder settings applied last.
pub async fn create_test_engine_with(
    registry: AgentRegistry,
    configure: impl FnOnce(EngineBuilder) -> EngineBuilder,
) -> (TempDir, Engine) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let builder = EngineBuilder::new()
        .with_database_path(Some(temp_dir.path().join("test.db")))
        .with_registry(registry)
        .with_retry(fast_policy(3))
        .with_poll_interval(Duration::from_millis(20));
    let engine = configure(builder)
        .build()
        .await
        .expect("Failed to create engine");
    (temp_dir, engine)
}
