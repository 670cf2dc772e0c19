//! Transition eligibility and default-workflow selection.
//!
//! Both functions are pure: they read catalog and instance data handed to
//! them and never touch a store. Condition strings on transitions are
//! opaque here; an external rules component interprets them.

use crate::domain::catalog::{WorkflowDefinition, WorkflowId, WorkflowTransition};
use crate::domain::instance::{InstanceStatus, WorkflowInstance};

/// Computes the transitions a subject may exercise next.
///
/// `instance == None` is the entry case for a subject with no prior
/// history: only entry edges (no real predecessor) are offered. A running
/// or terminated instance yields nothing. Candidates whose target already
/// has a running or completed instance for the subject are dropped, so a
/// workflow that is in flight or done is never offered again. Output is
/// sorted by priority ascending, ties broken by transition id for
/// determinism.
pub fn eligible_transitions(
    instance: Option<&WorkflowInstance>,
    transitions: &[WorkflowTransition],
    subject_instances: &[WorkflowInstance],
) -> Vec<WorkflowTransition> {
    let mut candidates: Vec<WorkflowTransition> = match instance {
        None => transitions.iter().filter(|t| t.is_entry()).cloned().collect(),
        Some(instance) => {
            if instance.status != InstanceStatus::Completed {
                return Vec::new();
            }
            transitions
                .iter()
                .filter(|t| t.source.as_ref() == Some(&instance.workflow_id))
                .cloned()
                .collect()
        }
    };

    candidates.retain(|transition| !target_occupied(&transition.target, subject_instances));
    candidates.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.id.0.cmp(&b.id.0)));
    candidates
}

fn target_occupied(target: &WorkflowId, subject_instances: &[WorkflowInstance]) -> bool {
    subject_instances.iter().any(|instance| {
        instance.workflow_id == *target
            && matches!(instance.status, InstanceStatus::Running | InstanceStatus::Completed)
    })
}

/// Picks the workflow a board view should focus by default, independent of
/// any rendering concern. Precedence: running instance, then most recently
/// completed instance, then the first catalog entry, then none.
pub fn select_default_workflow(
    instances: &[WorkflowInstance],
    workflows: &[WorkflowDefinition],
) -> Option<WorkflowId> {
    if let Some(running) = instances.iter().find(|i| i.status == InstanceStatus::Running) {
        return Some(running.workflow_id.clone());
    }
    if let Some(completed) = instances
        .iter()
        .filter(|i| i.status == InstanceStatus::Completed)
        .max_by_key(|i| i.completed_at)
    {
        return Some(completed.workflow_id.clone());
    }
    workflows.first().map(|workflow| workflow.id.clone())
}
