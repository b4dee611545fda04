//! The plan document accepted by the submission interface.
//!
//! The validator works on raw JSON so that it can report precise reasons
//! (a missing field rather than a generic deserialization failure). These
//! types describe the accepted shape and are what a validated plan carries.

#[cfg(feature = "schema")]
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A multi-step plan as submitted by a client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
pub struct PlanDocument {
    /// What the plan is meant to achieve
    pub goal: String,
    /// Steps in submission order; the position becomes the step index
    pub steps: Vec<StepSpec>,
}

/// One step of a plan document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
pub struct StepSpec {
    /// Identifier, unique within the plan
    pub id: String,
    /// Declared step type
    #[serde(rename = "type")]
    pub step_type: String,
    /// Name of the registered handler that executes the step
    pub agent_name: String,
    /// Opaque input handed to the handler
    #[serde(default)]
    pub parameters: Value,
    /// Ids of steps that must complete first
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Optional grouping tag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallel_group: Option<String>,
}
