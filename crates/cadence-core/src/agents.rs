//! Built-in generic handlers.
//!
//! - `echo` returns its parameters unchanged.
//! - `command` runs a local program and returns its standard output.

use std::{io, path::Path, sync::Arc};

use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;

use crate::{
    dispatcher::{
        AgentRegistry, ExecutionContext, Handler, HandlerError, HandlerOutput, StepInvocation,
    },
    error::Result,
};

/// Returns the step parameters as the result.
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoAgent;

#[async_trait]
impl Handler for EchoAgent {
    async fn execute(
        &self,
        step: &StepInvocation,
        _ctx: &ExecutionContext,
    ) -> std::result::Result<HandlerOutput, HandlerError> {
        Ok(match &step.parameters {
            Value::Null => HandlerOutput::Empty,
            other => HandlerOutput::Json(other.clone()),
        })
    }
}

/// Runs `parameters.program` with `parameters.args`.
///
/// Optional `parameters.cwd` sets the working directory. A non-zero exit
/// status is fatal; a program that cannot be found or executed is fatal;
/// any other spawn failure is transient.
#[derive(Debug, Default, Clone, Copy)]
pub struct CommandAgent;

impl CommandAgent {
    fn args(step: &StepInvocation) -> std::result::Result<Vec<String>, HandlerError> {
        match step.parameters.get("args") {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| match item {
                    Value::String(s) => Ok(s.clone()),
                    Value::Number(n) => Ok(n.to_string()),
                    Value::Bool(b) => Ok(b.to_string()),
                    _ => Err(HandlerError::InvalidInput(
                        "args must contain only strings, numbers or booleans".into(),
                    )),
                })
                .collect(),
            Some(_) => Err(HandlerError::InvalidInput("args must be an array".into())),
        }
    }
}

#[async_trait]
impl Handler for CommandAgent {
    async fn execute(
        &self,
        step: &StepInvocation,
        _ctx: &ExecutionContext,
    ) -> std::result::Result<HandlerOutput, HandlerError> {
        let program = step
            .param_str("program")
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| HandlerError::InvalidInput("missing string parameter 'program'".into()))?;
        let args = Self::args(step)?;

        let mut command = Command::new(program);
        command.args(&args).kill_on_drop(true);
        if let Some(cwd) = step.param_str("cwd") {
            // Spawning in a missing directory also reports NotFound
            if !Path::new(cwd).is_dir() {
                return Err(HandlerError::InvalidInput(format!(
                    "working directory '{cwd}' does not exist"
                )));
            }
            command.current_dir(cwd);
        }

        log::debug!("Step '{}': running {program} {}", step.key, args.join(" "));
        let output = command.output().await.map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => {
                HandlerError::InvalidInput(format!("program '{program}' not found"))
            }
            io::ErrorKind::PermissionDenied => {
                HandlerError::PermissionDenied(format!("cannot execute '{program}'"))
            }
            _ => HandlerError::Transient(format!("failed to spawn '{program}': {e}")),
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(HandlerError::Fatal(format!(
                "'{program}' exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        Ok(HandlerOutput::Text(
            String::from_utf8_lossy(&output.stdout).into_owned(),
        ))
    }
}

/// Registry preloaded with the built-in handlers.
pub fn builtin_registry() -> Result<AgentRegistry> {
    let mut registry = AgentRegistry::new();
    registry.register("echo", ["echo"], Arc::new(EchoAgent))?;
    registry.register("command", ["process"], Arc::new(CommandAgent))?;
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn invocation(agent: &str, parameters: Value) -> StepInvocation {
        StepInvocation {
            plan_id: 1,
            key: "step".into(),
            index: 0,
            step_type: "task".into(),
            agent_name: agent.into(),
            parameters,
            attempt: 1,
        }
    }

    #[tokio::test]
    async fn test_echo_returns_parameters() {
        let ctx = ExecutionContext::default();
        let out = EchoAgent
            .execute(&invocation("echo", json!({"x": [1, 2]})), &ctx)
            .await
            .unwrap();
        assert_eq!(out, HandlerOutput::Json(json!({"x": [1, 2]})));

        let out = EchoAgent
            .execute(&invocation("echo", Value::Null), &ctx)
            .await
            .unwrap();
        assert_eq!(out, HandlerOutput::Empty);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_captures_stdout() {
        let step = invocation(
            "command",
            json!({"program": "sh", "args": ["-c", "printf hello"]}),
        );
        let out = CommandAgent
            .execute(&step, &ExecutionContext::default())
            .await
            .unwrap();
        assert_eq!(out, HandlerOutput::Text("hello".into()));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_nonzero_exit_is_fatal() {
        let step = invocation(
            "command",
            json!({"program": "sh", "args": ["-c", "echo oops >&2; exit 3"]}),
        );
        let err = CommandAgent
            .execute(&step, &ExecutionContext::default())
            .await
            .unwrap_err();
        match err {
            HandlerError::Fatal(message) => assert!(message.contains("oops"), "{message}"),
            other => panic!("expected fatal error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_command_parameter_errors() {
        let ctx = ExecutionContext::default();
        let missing = CommandAgent
            .execute(&invocation("command", json!({})), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(missing, HandlerError::InvalidInput(_)));

        let not_found = CommandAgent
            .execute(
                &invocation("command", json!({"program": "definitely-not-a-real-program-xyz"})),
                &ctx,
            )
            .await
            .unwrap_err();
        match not_found {
            HandlerError::InvalidInput(message) => {
                assert!(message.contains("not found"), "{message}")
            }
            other => panic!("expected invalid input, got {other:?}"),
        }

        let bad_args = CommandAgent
            .execute(
                &invocation("command", json!({"program": "sh", "args": "-c"})),
                &ctx,
            )
            .await
            .unwrap_err();
        assert!(matches!(bad_args, HandlerError::InvalidInput(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_missing_working_directory() {
        let dir = tempfile::tempdir().unwrap();
        let gone = dir.path().join("gone");
        let step = invocation(
            "command",
            json!({"program": "sh", "args": ["-c", "pwd"], "cwd": gone.to_str().unwrap()}),
        );
        let err = CommandAgent
            .execute(&step, &ExecutionContext::default())
            .await
            .unwrap_err();
        match err {
            HandlerError::InvalidInput(message) => {
                assert!(message.contains("working directory"), "{message}");
                assert!(!message.contains("program"), "{message}");
            }
            other => panic!("expected invalid input, got {other:?}"),
        }

        // An existing directory is used as is
        let step = invocation(
            "command",
            json!({"program": "sh", "args": ["-c", "pwd"], "cwd": dir.path().to_str().unwrap()}),
        );
        let out = CommandAgent
            .execute(&step, &ExecutionContext::default())
            .await
            .unwrap();
        match out {
            HandlerOutput::Text(text) => assert!(!text.trim().is_empty()),
            other => panic!("expected text output, got {other:?}"),
        }
    }

    #[test]
    fn test_builtin_registry() {
        let registry = builtin_registry().unwrap();
        assert_eq!(registry.names(), vec!["command", "echo"]);
    }
}
