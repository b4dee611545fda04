use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Temporary workspace holding the database and plan documents.
struct TestEnv {
    dir: TempDir,
}

impl TestEnv {
    fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temporary directory"),
        }
    }

    fn db_path(&self) -> PathBuf {
        self.dir.path().join("cli_test.db")
    }

    /// Command with `--no-color` and the test database.
    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("cadence").expect("Failed to find cadence binary");
        cmd.arg("--no-color")
            .arg("--database-file")
            .arg(self.db_path())
            .env("XDG_CONFIG_HOME", self.dir.path().join("config"));
        cmd
    }

    fn write_plan(&self, name: &str, document: &serde_json::Value) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, document.to_string()).expect("Failed to write plan");
        path
    }

    fn submit(&self, plan: &Path) {
        self.cmd()
            .arg("submit")
            .arg(plan)
            .assert()
            .success();
    }
}

fn echo_plan() -> serde_json::Value {
    serde_json::json!({
        "goal": "Echo twice",
        "steps": [
            {"id": "first", "type": "echo", "agent_name": "echo", "parameters": {"n": 1}},
            {"id": "second", "type": "echo", "agent_name": "echo", "parameters": {"n": 2},
             "depends_on": ["first"]}
        ]
    })
}

#[test]
fn test_cli_list_empty_plans() {
    let env = TestEnv::new();
    env.cmd()
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("No plans found."));
}

#[test]
fn test_cli_validate_valid_plan() {
    let env = TestEnv::new();
    let plan = env.write_plan("plan.json", &echo_plan());

    env.cmd()
        .arg("validate")
        .arg(&plan)
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Plan is valid: 2 step(s) in 2 execution group(s)",
        ))
        .stdout(predicate::str::contains("- Group 1: first"));

    // Validation alone stores nothing
    env.cmd()
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("No plans found."));
}

#[test]
fn test_cli_validate_reports_reason_code() {
    let env = TestEnv::new();
    let plan = env.write_plan(
        "cycle.json",
        &serde_json::json!({
            "goal": "Loop",
            "steps": [
                {"id": "a", "type": "t", "agent_name": "echo", "depends_on": ["b"]},
                {"id": "b", "type": "t", "agent_name": "echo", "depends_on": ["a"]}
            ]
        }),
    );

    env.cmd()
        .arg("validate")
        .arg(&plan)
        .assert()
        .failure()
        .stderr(predicate::str::contains("(cycle)"));
}

#[test]
fn test_cli_validate_rejects_invalid_json() {
    let env = TestEnv::new();
    let path = env.dir.path().join("broken.json");
    std::fs::write(&path, "{ not json").unwrap();

    env.cmd()
        .arg("validate")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("not valid JSON"));
}

#[test]
fn test_cli_submit_and_run() {
    let env = TestEnv::new();
    let plan = env.write_plan("plan.json", &echo_plan());

    env.cmd()
        .arg("submit")
        .arg(&plan)
        .arg("--run")
        .assert()
        .success()
        .stdout(predicate::str::contains("Submitted plan with ID: 1 (2 steps)"))
        .stdout(predicate::str::contains("Plan 1 completed (100%)."))
        .stdout(predicate::str::contains("- **Completed**: first, second"));

    env.cmd()
        .args(["status", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Status: **completed**, progress 100%"))
        .stdout(predicate::str::contains("|1|first|echo|✓ Completed|0||"));

    env.cmd()
        .args(["show", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("# 1. Echo twice"))
        .stdout(predicate::str::contains("## Final result"));
}

#[test]
fn test_cli_run_submitted_plan() {
    let env = TestEnv::new();
    let plan = env.write_plan("plan.json", &echo_plan());
    env.submit(&plan);

    env.cmd()
        .args(["list", "--status", "pending"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Echo twice (ID: 1) [pending]"));

    env.cmd()
        .args(["run", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Plan 1 completed"));

    env.cmd()
        .args(["run", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid transition"));
}

#[test]
fn test_cli_failed_step_is_reported() {
    let env = TestEnv::new();
    let plan = env.write_plan(
        "fail.json",
        &serde_json::json!({
            "goal": "Missing program",
            "steps": [
                {"id": "exec", "type": "process", "agent_name": "command",
                 "parameters": {"program": "definitely-not-a-real-program-xyz"}},
                {"id": "after", "type": "echo", "agent_name": "echo", "depends_on": ["exec"]}
            ]
        }),
    );

    env.cmd()
        .arg("submit")
        .arg(&plan)
        .arg("--run")
        .assert()
        .success()
        .stdout(predicate::str::contains("Plan 1 failed"))
        .stdout(predicate::str::contains("- **Failed**: exec"))
        .stdout(predicate::str::contains("- **Skipped**: after"));

    env.cmd()
        .args(["history", "1", "exec"])
        .assert()
        .success()
        .stdout(predicate::str::contains("`attempt_failed` exec #1"))
        .stdout(predicate::str::contains("not found"));

    env.cmd()
        .args(["log", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("`step_skipped` after"))
        .stdout(predicate::str::contains("running -> failed"));

    env.cmd()
        .args(["results", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("## exec (attempt 1, failure)"));
}

#[test]
fn test_cli_control_commands() {
    let env = TestEnv::new();
    let plan = env.write_plan("plan.json", &echo_plan());
    env.submit(&plan);

    env.cmd()
        .args(["pause", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("found pending"));

    env.cmd()
        .args(["cancel", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Plan 1 cancelled (was pending)"));

    env.cmd()
        .args(["resume", "1"])
        .assert()
        .failure();
}

#[test]
fn test_cli_delete_requires_confirmation() {
    let env = TestEnv::new();
    let plan = env.write_plan("plan.json", &echo_plan());
    env.submit(&plan);

    env.cmd()
        .args(["delete", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--confirm"));

    env.cmd()
        .args(["delete", "1", "--confirm"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Deleted plan 1"));

    env.cmd()
        .args(["show", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Plan with ID 1 not found"));
}

#[test]
fn test_cli_step_not_found() {
    let env = TestEnv::new();
    let plan = env.write_plan("plan.json", &echo_plan());
    env.submit(&plan);

    env.cmd()
        .args(["step", "1", "first"])
        .assert()
        .success()
        .stdout(predicate::str::contains("### 1. first (○ Pending)"));

    env.cmd()
        .args(["step", "1", "nope"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Step 'nope' not found in plan 1"));
}

#[test]
fn test_cli_agents() {
    let env = TestEnv::new();
    env.cmd()
        .arg("agents")
        .assert()
        .success()
        .stdout(predicate::str::contains("- **command**: process"))
        .stdout(predicate::str::contains("- **echo**: echo"));
}

#[test]
fn test_cli_schema() {
    let env = TestEnv::new();
    env.cmd()
        .arg("schema")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"PlanDocument\""))
        .stdout(predicate::str::contains("agent_name"));
}

#[test]
fn test_cli_rejects_invalid_config() {
    let env = TestEnv::new();
    let config = env.dir.path().join("config.json");
    std::fs::write(&config, r#"{"max_concurrency": 0}"#).unwrap();

    env.cmd()
        .arg("--config")
        .arg(&config)
        .arg("list")
        .assert()
        .failure()
        .stderr(predicate::str::contains("max_concurrency"));
}
