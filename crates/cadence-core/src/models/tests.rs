#[cfg(test)]
mod model_tests {
    use jiff::Timestamp;
    use serde_json::json;

    use crate::models::{
        progress_percentage, LogEvent, Plan, PlanDocument, PlanFilter, PlanStatus, PlanStatusReport,
        PlanSummary, ResultOutcome, Step, StepStatus,
    };

    fn create_test_step(key: &str, index: u32, status: StepStatus) -> Step {
        Step {
            id: u64::from(index) + 1,
            plan_id: 456,
            key: key.to_string(),
            index,
            step_type: "search".to_string(),
            agent_name: "web".to_string(),
            parameters: json!({"query": key}),
            depends_on: vec![],
            parallel_group: None,
            status,
            retry_count: 0,
            started_at: None,
            completed_at: None,
            result: None,
            error: (status == StepStatus::Failed).then(|| "boom".to_string()),
            created_at: Timestamp::from_second(1640995200).unwrap(), // 2022-01-01 00:00:00 UTC
            updated_at: Timestamp::from_second(1641081600).unwrap(), // 2022-01-02 00:00:00 UTC
        }
    }

    fn create_test_plan() -> Plan {
        Plan {
            id: 456,
            goal: "Test goal".to_string(),
            status: PlanStatus::Running,
            total_steps: 4,
            progress: 25.0,
            document: json!({}),
            final_result: None,
            created_at: Timestamp::from_second(1640995200).unwrap(),
            updated_at: Timestamp::from_second(1641081600).unwrap(),
            steps: vec![
                create_test_step("a", 0, StepStatus::Completed),
                create_test_step("b", 1, StepStatus::Failed),
                create_test_step("c", 2, StepStatus::Skipped),
                create_test_step("d", 3, StepStatus::Pending),
            ],
        }
    }

    #[test]
    fn test_plan_status_parsing() {
        for status in [
            PlanStatus::Pending,
            PlanStatus::Running,
            PlanStatus::Paused,
            PlanStatus::Completed,
            PlanStatus::Failed,
            PlanStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<PlanStatus>(), Ok(status));
        }
        assert_eq!("Canceled".parse::<PlanStatus>(), Ok(PlanStatus::Cancelled));
        assert!("active".parse::<PlanStatus>().is_err());
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(PlanStatus::Completed.is_terminal());
        assert!(PlanStatus::Cancelled.is_terminal());
        assert!(!PlanStatus::Paused.is_terminal());

        assert!(StepStatus::Skipped.is_terminal());
        assert!(!StepStatus::Running.is_terminal());
    }

    #[test]
    fn test_step_status_with_icon() {
        assert_eq!(StepStatus::Completed.with_icon(), "✓ Completed");
        assert_eq!(StepStatus::Running.with_icon(), "➤ Running");
        assert_eq!(StepStatus::Pending.with_icon(), "○ Pending");
        assert_eq!(StepStatus::Skipped.with_icon(), "↷ Skipped");
    }

    #[test]
    fn test_status_serde_names() {
        assert_eq!(
            serde_json::to_value(PlanStatus::Cancelled).unwrap(),
            json!("cancelled")
        );
        assert_eq!(
            serde_json::to_value(LogEvent::AttemptFailed).unwrap(),
            json!("attempt_failed")
        );
        assert_eq!(
            "plan_transition".parse::<LogEvent>(),
            Ok(LogEvent::PlanTransition)
        );
        assert!(!LogEvent::StepSkipped.is_attempt());
        assert_eq!("failure".parse::<ResultOutcome>(), Ok(ResultOutcome::Failure));
    }

    #[test]
    fn test_progress_percentage() {
        assert_eq!(progress_percentage(0, 0), 0.0);
        assert_eq!(progress_percentage(1, 4), 25.0);
        assert_eq!(progress_percentage(3, 3), 100.0);
    }

    #[test]
    fn test_plan_helpers() {
        let plan = create_test_plan();
        assert_eq!(plan.step("c").map(|s| s.index), Some(2));
        assert!(plan.step("z").is_none());
        assert_eq!(plan.count_steps(StepStatus::Completed), 1);
        assert_eq!(plan.count_steps(StepStatus::Running), 0);
    }

    #[test]
    fn test_plan_summary_from_plan() {
        let summary = PlanSummary::from(&create_test_plan());
        assert_eq!(summary.id, 456);
        assert_eq!(summary.total_steps, 4);
        assert_eq!(summary.completed_steps, 1);
        assert_eq!(summary.failed_steps, 1);
        assert_eq!(summary.skipped_steps, 1);
    }

    #[test]
    fn test_status_report_from_plan() {
        let report = PlanStatusReport::from(&create_test_plan());
        assert_eq!(report.status, PlanStatus::Running);
        assert_eq!(report.steps.len(), 4);
        assert_eq!(report.steps[1].error.as_deref(), Some("boom"));
        assert_eq!(report.steps[3].status, StepStatus::Pending);
    }

    #[test]
    fn test_plan_document_deserialization() {
        let document: PlanDocument = serde_json::from_value(json!({
            "goal": "Survey",
            "steps": [
                {"id": "a", "type": "search", "agent_name": "web"},
                {"id": "b", "type": "summarize", "agent_name": "llm",
                 "parameters": {"style": "brief"}, "depends_on": ["a"],
                 "parallel_group": "g"}
            ]
        }))
        .unwrap();

        assert_eq!(document.steps[0].step_type, "search");
        assert!(document.steps[0].parameters.is_null());
        assert!(document.steps[0].depends_on.is_empty());
        assert_eq!(document.steps[1].depends_on, vec!["a"]);
        assert_eq!(document.steps[1].parallel_group.as_deref(), Some("g"));
    }

    #[test]
    fn test_plan_filter_with_status() {
        let filter = PlanFilter::with_status(PlanStatus::Failed);
        assert_eq!(filter.status, Some(PlanStatus::Failed));
        assert!(filter.goal_contains.is_none());
        assert!(filter.limit.is_none());
    }
}
