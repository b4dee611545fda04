//! Layered topological ordering of plan steps.
//!
//! Each [`ExecutionGroup`] holds steps whose dependencies all sit in earlier
//! groups, so the steps of one group can run concurrently. Input is assumed
//! to be validated; a stalled layer is still detected and reported instead
//! of looping.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::{
    error::{EngineError, Result},
    models::{Step, StepSpec},
};

/// The minimal view of a step the resolver needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepNode {
    pub key: String,
    pub index: u32,
    pub depends_on: Vec<String>,
}

impl From<&Step> for StepNode {
    fn from(step: &Step) -> Self {
        Self {
            key: step.key.clone(),
            index: step.index,
            depends_on: step.depends_on.clone(),
        }
    }
}

impl StepNode {
    /// Builds nodes from validated specs, using submission order as index.
    pub fn from_specs(specs: &[StepSpec]) -> Vec<Self> {
        specs
            .iter()
            .enumerate()
            .map(|(index, spec)| Self {
                key: spec.id.clone(),
                index: index as u32,
                depends_on: spec.depends_on.clone(),
            })
            .collect()
    }
}

/// A set of steps with no dependency relationship among themselves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionGroup {
    /// Position of the group in execution order
    pub ordinal: usize,
    /// Step keys ordered by ascending step index
    pub steps: Vec<String>,
}

/// Resolves steps into ordered execution groups.
pub fn resolve(steps: &[StepNode]) -> Result<Vec<ExecutionGroup>> {
    let known: HashSet<&str> = steps.iter().map(|s| s.key.as_str()).collect();
    for step in steps {
        if let Some(missing) = step.depends_on.iter().find(|d| !known.contains(d.as_str())) {
            return Err(EngineError::InternalConsistency(format!(
                "step '{}' depends on unknown step '{missing}'",
                step.key
            )));
        }
    }

    let mut ordered: Vec<&StepNode> = steps.iter().collect();
    ordered.sort_by_key(|s| s.index);

    let mut assigned: HashSet<&str> = HashSet::with_capacity(steps.len());
    let mut groups = Vec::new();

    while assigned.len() < ordered.len() {
        let layer: Vec<&StepNode> = ordered
            .iter()
            .filter(|s| !assigned.contains(s.key.as_str()))
            .filter(|s| s.depends_on.iter().all(|d| assigned.contains(d.as_str())))
            .copied()
            .collect();

        if layer.is_empty() {
            let stuck: Vec<&str> = ordered
                .iter()
                .filter(|s| !assigned.contains(s.key.as_str()))
                .map(|s| s.key.as_str())
                .collect();
            return Err(EngineError::InternalConsistency(format!(
                "dependency resolution stalled with unassigned steps: {}",
                stuck.join(", ")
            )));
        }

        for step in &layer {
            assigned.insert(step.key.as_str());
        }
        groups.push(ExecutionGroup {
            ordinal: groups.len(),
            steps: layer.iter().map(|s| s.key.clone()).collect(),
        });
    }

    Ok(groups)
}

/// Reverse-edge index for propagating failures to dependents.
#[derive(Debug, Clone, Default)]
pub struct DependentIndex {
    dependents: HashMap<String, Vec<String>>,
}

impl DependentIndex {
    pub fn new(steps: &[StepNode]) -> Self {
        let mut dependents: HashMap<String, Vec<String>> = HashMap::new();
        for step in steps {
            for dep in &step.depends_on {
                dependents
                    .entry(dep.clone())
                    .or_default()
                    .push(step.key.clone());
            }
        }
        Self { dependents }
    }

    /// Every step that depends on `key`, directly or transitively.
    pub fn transitive_dependents(&self, key: &str) -> Vec<String> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut out = Vec::new();
        let mut queue: VecDeque<&str> = VecDeque::from([key]);

        while let Some(current) = queue.pop_front() {
            for dependent in self.dependents.get(current).into_iter().flatten() {
                if seen.insert(dependent.as_str()) {
                    out.push(dependent.clone());
                    queue.push_back(dependent.as_str());
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(key: &str, index: u32, deps: &[&str]) -> StepNode {
        StepNode {
            key: key.into(),
            index,
            depends_on: deps.iter().map(|d| d.to_string()).collect(),
        }
    }

    /// Checks the properties every resolution must satisfy.
    fn assert_well_formed(steps: &[StepNode], groups: &[ExecutionGroup]) {
        let mut group_of: HashMap<&str, usize> = HashMap::new();
        for group in groups {
            for key in &group.steps {
                assert!(
                    group_of.insert(key.as_str(), group.ordinal).is_none(),
                    "step {key} assigned twice"
                );
            }
        }
        assert_eq!(group_of.len(), steps.len(), "every step assigned exactly once");

        for step in steps {
            let own = group_of[step.key.as_str()];
            for dep in &step.depends_on {
                assert!(group_of[dep.as_str()] < own, "{} before its dependency {dep}", step.key);
            }
        }
    }

    #[test]
    fn test_independent_steps_share_a_group() {
        let steps = vec![node("a", 0, &[]), node("b", 1, &[]), node("c", 2, &[])];
        let groups = resolve(&steps).unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].steps, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_chain_produces_one_group_per_step() {
        let steps = vec![node("a", 0, &[]), node("b", 1, &["a"]), node("c", 2, &["b"])];
        let groups = resolve(&steps).unwrap();
        assert_eq!(groups.len(), 3);
        assert_well_formed(&steps, &groups);
    }

    #[test]
    fn test_diamond() {
        let steps = vec![
            node("fetch", 0, &[]),
            node("rank", 1, &["fetch"]),
            node("summarize", 2, &["fetch"]),
            node("report", 3, &["rank", "summarize"]),
        ];
        let groups = resolve(&steps).unwrap();
        assert_eq!(
            groups.iter().map(|g| g.steps.clone()).collect::<Vec<_>>(),
            vec![
                vec!["fetch".to_string()],
                vec!["rank".into(), "summarize".into()],
                vec!["report".into()],
            ]
        );
        assert_well_formed(&steps, &groups);
    }

    #[test]
    fn test_ties_broken_by_index_not_input_order() {
        let steps = vec![node("late", 5, &[]), node("early", 1, &[]), node("mid", 3, &[])];
        let groups = resolve(&steps).unwrap();
        assert_eq!(groups[0].steps, vec!["early", "mid", "late"]);
    }

    #[test]
    fn test_wide_graph_properties() {
        // Each step i depends on the steps whose index divides i.
        let steps: Vec<StepNode> = (1..=24u32)
            .map(|i| {
                let deps: Vec<String> = (1..i)
                    .filter(|d| i % d == 0)
                    .map(|d| format!("s{d}"))
                    .collect();
                StepNode {
                    key: format!("s{i}"),
                    index: i,
                    depends_on: deps,
                }
            })
            .collect();
        let groups = resolve(&steps).unwrap();
        assert_well_formed(&steps, &groups);
    }

    #[test]
    fn test_stalled_resolution_is_reported() {
        let steps = vec![node("a", 0, &["b"]), node("b", 1, &["a"]), node("c", 2, &[])];
        match resolve(&steps) {
            Err(EngineError::InternalConsistency(msg)) => {
                assert!(msg.contains("a, b"), "{msg}");
            }
            other => panic!("expected stall, got {other:?}"),
        }
    }

    #[test]
    fn test_transitive_dependents() {
        let steps = vec![
            node("a", 0, &[]),
            node("b", 1, &["a"]),
            node("c", 2, &["b"]),
            node("d", 3, &[]),
            node("e", 4, &["c", "d"]),
        ];
        let index = DependentIndex::new(&steps);
        let mut deps = index.transitive_dependents("a");
        deps.sort();
        assert_eq!(deps, vec!["b", "c", "e"]);
        assert_eq!(index.transitive_dependents("d"), vec!["e"]);
        assert!(index.transitive_dependents("e").is_empty());
    }
}
