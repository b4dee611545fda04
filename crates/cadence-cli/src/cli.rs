//! Command handlers.
//!
//! Each handler makes one or two engine calls and renders the result as
//! markdown. No orchestration logic lives here.

use std::{io::Read, path::Path};

use anyhow::{bail, Context, Result};
use cadence_core::{
    display::{
        AgentList, ExecutionLog, OperationStatus, PlanSummaries, ResultRecords, RunSummary,
        SubmitResult,
    },
    resolver::{self, StepNode},
    Engine, PlanFilter,
};
use serde_json::Value;

use crate::{
    args::{Commands, DeleteArgs, ListArgs, StepArgs, SubmitArgs},
    renderer::TerminalRenderer,
};

/// Reads a plan document from a file, or from standard input for `-`.
fn read_document(path: &Path) -> Result<Value> {
    let text = if path.as_os_str() == "-" {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("Failed to read plan document from standard input")?;
        text
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read plan document {}", path.display()))?
    };
    serde_json::from_str(&text).context("Plan document is not valid JSON")
}

pub struct Cli {
    engine: Engine,
    renderer: TerminalRenderer,
}

impl Cli {
    pub fn new(engine: Engine, renderer: TerminalRenderer) -> Self {
        Self { engine, renderer }
    }

    pub async fn handle(&self, command: Commands) -> Result<()> {
        match command {
            Commands::Validate(args) => self.validate(&args.file),
            Commands::Submit(args) => self.submit(args).await,
            Commands::Run(args) => self.run(args.plan_id).await,
            Commands::Status(args) => {
                let report = self.engine.plan_status(args.plan_id).await?;
                self.renderer.render(&report.to_string())
            }
            Commands::Show(args) => {
                let plan = self.engine.get_plan(args.plan_id).await?;
                self.renderer.render(&plan.to_string())
            }
            Commands::Step(args) => self.show_step(args).await,
            Commands::List(args) => self.list_plans(args).await,
            Commands::History(args) => self.history(args).await,
            Commands::Log(args) => {
                let log = self.engine.execution_log(args.plan_id).await?;
                self.renderer.render(&format!(
                    "# Execution log of plan {}\n\n{}",
                    args.plan_id,
                    ExecutionLog(log)
                ))
            }
            Commands::Results(args) => {
                let results = self.engine.results(args.plan_id).await?;
                self.renderer.render(&ResultRecords(results).to_string())
            }
            Commands::Cancel(args) => {
                let previous = self.engine.cancel_plan(args.plan_id).await?;
                self.confirm(format!(
                    "Plan {} cancelled (was {previous})",
                    args.plan_id
                ))
            }
            Commands::Pause(args) => {
                self.engine.pause_plan(args.plan_id).await?;
                self.confirm(format!("Plan {} paused", args.plan_id))
            }
            Commands::Resume(args) => {
                self.engine.resume_plan(args.plan_id).await?;
                self.confirm(format!("Plan {} resumed", args.plan_id))
            }
            Commands::Delete(args) => self.delete(args).await,
            Commands::Agents => self.renderer.render(&format!(
                "# Agents\n\n{}",
                AgentList(self.engine.registry())
            )),
            // Handled before the engine is built
            Commands::Schema => Ok(()),
        }
    }

    fn confirm(&self, message: String) -> Result<()> {
        self.renderer
            .render(&OperationStatus::success(message).to_string())
    }

    fn validate(&self, file: &Path) -> Result<()> {
        let document = read_document(file)?;
        let validated = self.engine.validate_plan(&document)?;
        let groups = resolver::resolve(&StepNode::from_specs(&validated.steps))?;

        let mut output = OperationStatus::success(format!(
            "Plan is valid: {} step(s) in {} execution group(s)",
            validated.steps.len(),
            groups.len()
        ))
        .to_string();
        output.push('\n');
        for group in &groups {
            output.push_str(&format!(
                "- Group {}: {}\n",
                group.ordinal + 1,
                group.steps.join(", ")
            ));
        }
        self.renderer.render(&output)
    }

    async fn submit(&self, args: SubmitArgs) -> Result<()> {
        let document = read_document(&args.file)?;
        let plan_id = self.engine.submit_plan(&document).await?;
        let plan = self.engine.get_plan(plan_id).await?;
        self.renderer.render(
            &SubmitResult {
                plan_id,
                total_steps: plan.total_steps as usize,
            }
            .to_string(),
        )?;

        if args.run {
            self.run(plan_id).await?;
        }
        Ok(())
    }

    /// Runs a plan in the background; Ctrl-C requests cancellation and waits
    /// for in-flight steps to settle.
    async fn run(&self, plan_id: u64) -> Result<()> {
        let runner = self.engine.clone();
        let mut run = tokio::spawn(async move { runner.run_plan(plan_id).await });

        let report = tokio::select! {
            joined = &mut run => joined.context("Plan run panicked")??,
            Ok(()) = tokio::signal::ctrl_c() => {
                log::warn!("Interrupt received; cancelling plan {plan_id}");
                self.engine.cancel_plan(plan_id).await?;
                run.await.context("Plan run panicked")??
            }
        };

        self.renderer.render(&RunSummary(&report).to_string())
    }

    async fn show_step(&self, args: StepArgs) -> Result<()> {
        let step = self.engine.get_step(args.plan_id, &args.step).await?;
        self.renderer.render(&step.to_string())
    }

    pub async fn list_plans(&self, args: ListArgs) -> Result<()> {
        let filter = PlanFilter {
            status: args.status.map(Into::into),
            goal_contains: args.goal,
            created_after: None,
            limit: args.limit,
        };
        let plans = self.engine.list_plans(filter).await?;
        self.renderer.render(&PlanSummaries(plans).to_string())
    }

    async fn history(&self, args: StepArgs) -> Result<()> {
        let history = self
            .engine
            .attempt_history(args.plan_id, &args.step)
            .await?;
        self.renderer.render(&format!(
            "# Attempts of '{}' in plan {}\n\n{}",
            args.step,
            args.plan_id,
            ExecutionLog(history)
        ))
    }

    async fn delete(&self, args: DeleteArgs) -> Result<()> {
        if !args.confirm {
            bail!(
                "Refusing to delete plan {} without --confirm",
                args.plan_id
            );
        }
        self.engine.delete_plan(args.plan_id).await?;
        self.confirm(format!("Deleted plan {}", args.plan_id))
    }
}
