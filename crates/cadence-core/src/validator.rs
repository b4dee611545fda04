//! Structural validation of submitted plan documents.
//!
//! Validation runs on the raw JSON so every rejection names a specific
//! reason. It is a pure function of the document and the configured
//! per-type parameter rules; nothing is persisted until it succeeds.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use serde_json::{Map, Value};
use thiserror::Error;

use crate::models::StepSpec;

/// Why a plan document was rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid document at {path}: {reason}")]
    InvalidDocument { path: String, reason: String },
    #[error("missing required field '{field}' at {path}")]
    MissingField { path: String, field: String },
    #[error("plan has no steps")]
    EmptyPlan,
    #[error("step id '{id}' is used more than once")]
    DuplicateStepId { id: String },
    #[error("step '{step}' depends on unknown step '{missing}'")]
    DanglingDependency { step: String, missing: String },
    #[error("step '{step}' of type '{step_type}' requires parameter '{parameter}'")]
    MissingParameter {
        step: String,
        step_type: String,
        parameter: String,
    },
    #[error("dependency cycle among steps: {}", .steps.join(", "))]
    Cycle { steps: Vec<String> },
}

impl ValidationError {
    /// Stable machine-readable reason code.
    pub fn reason_code(&self) -> &'static str {
        match self {
            ValidationError::InvalidDocument { .. } => "invalid_document",
            ValidationError::MissingField { .. } => "missing_field",
            ValidationError::EmptyPlan => "empty_plan",
            ValidationError::DuplicateStepId { .. } => "duplicate_step_id",
            ValidationError::DanglingDependency { .. } => "dangling_dependency",
            ValidationError::MissingParameter { .. } => "missing_parameter",
            ValidationError::Cycle { .. } => "cycle",
        }
    }
}

/// A plan document that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedPlan {
    pub goal: String,
    /// Steps in submission order; position is the step index
    pub steps: Vec<StepSpec>,
    /// The original document, kept for audit
    pub document: Value,
}

/// Validator with optional per-step-type required parameters.
#[derive(Debug, Clone, Default)]
pub struct Validator {
    required_parameters: HashMap<String, Vec<String>>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requires the named keys in `parameters` for every step of `step_type`.
    pub fn require_parameters<I, S>(mut self, step_type: impl Into<String>, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_parameters
            .entry(step_type.into())
            .or_default()
            .extend(keys.into_iter().map(Into::into));
        self
    }

    /// Validates a plan document.
    pub fn validate(&self, document: &Value) -> Result<ValidatedPlan, ValidationError> {
        let root = as_object(document, "$")?;
        let goal = required_str(root, "$", "goal")?;

        let raw_steps = root
            .get("steps")
            .ok_or_else(|| ValidationError::MissingField {
                path: "$".into(),
                field: "steps".into(),
            })?
            .as_array()
            .ok_or_else(|| ValidationError::InvalidDocument {
                path: "$.steps".into(),
                reason: "expected an array".into(),
            })?;

        if raw_steps.is_empty() {
            return Err(ValidationError::EmptyPlan);
        }

        let mut steps = Vec::with_capacity(raw_steps.len());
        for (index, raw) in raw_steps.iter().enumerate() {
            steps.push(self.parse_step(raw, index)?);
        }

        check_unique_ids(&steps)?;
        check_references(&steps)?;
        self.check_parameters(&steps)?;
        check_acyclic(&steps)?;

        Ok(ValidatedPlan {
            goal,
            steps,
            document: document.clone(),
        })
    }

    fn parse_step(&self, raw: &Value, index: usize) -> Result<StepSpec, ValidationError> {
        let path = format!("$.steps[{index}]");
        let object = as_object(raw, &path)?;

        let id = required_str(object, &path, "id")?;
        let step_type = required_str(object, &path, "type")?;
        let agent_name = required_str(object, &path, "agent_name")?;

        let parameters = object.get("parameters").cloned().unwrap_or(Value::Null);
        if !(parameters.is_null() || parameters.is_object()) {
            return Err(ValidationError::InvalidDocument {
                path: format!("{path}.parameters"),
                reason: "expected an object".into(),
            });
        }

        let depends_on = match object.get("depends_on") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .enumerate()
                .map(|(i, item)| {
                    item.as_str()
                        .map(String::from)
                        .ok_or_else(|| ValidationError::InvalidDocument {
                            path: format!("{path}.depends_on[{i}]"),
                            reason: "expected a step id string".into(),
                        })
                })
                .collect::<Result<_, _>>()?,
            Some(_) => {
                return Err(ValidationError::InvalidDocument {
                    path: format!("{path}.depends_on"),
                    reason: "expected an array".into(),
                });
            }
        };

        let parallel_group = match object.get("parallel_group") {
            None | Some(Value::Null) => None,
            Some(Value::String(tag)) => Some(tag.clone()),
            Some(_) => {
                return Err(ValidationError::InvalidDocument {
                    path: format!("{path}.parallel_group"),
                    reason: "expected a string".into(),
                });
            }
        };

        Ok(StepSpec {
            id,
            step_type,
            agent_name,
            parameters,
            depends_on,
            parallel_group,
        })
    }

    /// Every step carries the non-null parameters its type requires.
    fn check_parameters(&self, steps: &[StepSpec]) -> Result<(), ValidationError> {
        for step in steps {
            let Some(keys) = self.required_parameters.get(&step.step_type) else {
                continue;
            };
            for key in keys {
                let present = step
                    .parameters
                    .get(key)
                    .is_some_and(|value| !value.is_null());
                if !present {
                    return Err(ValidationError::MissingParameter {
                        step: step.id.clone(),
                        step_type: step.step_type.clone(),
                        parameter: key.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Validates a plan document with no per-type parameter rules.
pub fn validate(document: &Value) -> Result<ValidatedPlan, ValidationError> {
    Validator::new().validate(document)
}

fn as_object<'a>(value: &'a Value, path: &str) -> Result<&'a Map<String, Value>, ValidationError> {
    value
        .as_object()
        .ok_or_else(|| ValidationError::InvalidDocument {
            path: path.to_string(),
            reason: "expected an object".into(),
        })
}

fn required_str(
    object: &Map<String, Value>,
    path: &str,
    field: &str,
) -> Result<String, ValidationError> {
    match object.get(field) {
        None | Some(Value::Null) => Err(ValidationError::MissingField {
            path: path.to_string(),
            field: field.to_string(),
        }),
        Some(Value::String(s)) if s.trim().is_empty() => Err(ValidationError::MissingField {
            path: path.to_string(),
            field: field.to_string(),
        }),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(ValidationError::InvalidDocument {
            path: format!("{path}.{field}"),
            reason: "expected a string".into(),
        }),
    }
}

fn check_unique_ids(steps: &[StepSpec]) -> Result<(), ValidationError> {
    let mut seen = HashSet::with_capacity(steps.len());
    for step in steps {
        if !seen.insert(step.id.as_str()) {
            return Err(ValidationError::DuplicateStepId {
                id: step.id.clone(),
            });
        }
    }
    Ok(())
}

fn check_references(steps: &[StepSpec]) -> Result<(), ValidationError> {
    let ids: HashSet<&str> = steps.iter().map(|s| s.id.as_str()).collect();
    for step in steps {
        for dep in &step.depends_on {
            if !ids.contains(dep.as_str()) {
                return Err(ValidationError::DanglingDependency {
                    step: step.id.clone(),
                    missing: dep.clone(),
                });
            }
        }
    }
    Ok(())
}

/// Kahn's algorithm; anything left unvisited sits on or behind a cycle.
fn check_acyclic(steps: &[StepSpec]) -> Result<(), ValidationError> {
    let mut in_degree: BTreeMap<&str, usize> = BTreeMap::new();
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();

    for step in steps {
        // Duplicate entries in depends_on count once.
        let deps: HashSet<&str> = step.depends_on.iter().map(String::as_str).collect();
        in_degree.insert(step.id.as_str(), deps.len());
        for dep in deps {
            dependents.entry(dep).or_default().push(step.id.as_str());
        }
    }

    let mut queue: VecDeque<&str> = in_degree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(id, _)| *id)
        .collect();
    let mut visited = 0usize;

    while let Some(id) = queue.pop_front() {
        visited += 1;
        for dependent in dependents.get(id).into_iter().flatten() {
            if let Some(degree) = in_degree.get_mut(dependent) {
                *degree -= 1;
                if *degree == 0 {
                    queue.push_back(*dependent);
                }
            }
        }
    }

    if visited == steps.len() {
        Ok(())
    } else {
        let stuck = in_degree
            .into_iter()
            .filter(|(_, degree)| *degree > 0)
            .map(|(id, _)| id.to_string())
            .collect();
        Err(ValidationError::Cycle { steps: stuck })
    }
}
