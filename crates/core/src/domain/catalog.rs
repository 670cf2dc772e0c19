use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StageId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkflowId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StepId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransitionId(pub String);

/// Coarse grouping of workflows, e.g. "Acquisition" or "Negotiation".
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    pub id: StageId,
    pub name: String,
}

/// A named playbook template. Deactivating (not deleting) is the removal
/// path once instances reference the definition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub id: WorkflowId,
    pub stage_id: StageId,
    pub name: String,
    pub description: String,
    pub sla_hours: i64,
    pub active: bool,
}

/// An ordered unit of work inside a workflow. Positions are strictly
/// ordered per workflow and never renumbered implicitly.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub id: StepId,
    pub workflow_id: WorkflowId,
    pub position: i64,
    pub automated: bool,
    pub message_template: Option<String>,
}

/// Directed edge between workflow definitions. `source == None` marks an
/// entry edge: the target is activatable for a subject with no predecessor
/// instance. The condition string is opaque to this crate; an external
/// rules component evaluates it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowTransition {
    pub id: TransitionId,
    pub source: Option<WorkflowId>,
    pub target: WorkflowId,
    pub condition: String,
    pub priority: i32,
    pub sla_override_hours: Option<i64>,
}

impl WorkflowTransition {
    /// A transition from a workflow to itself is a configuration error.
    pub fn is_self_loop(&self) -> bool {
        self.source.as_ref() == Some(&self.target)
    }

    pub fn is_entry(&self) -> bool {
        self.source.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::{TransitionId, WorkflowId, WorkflowTransition};

    fn transition(source: Option<&str>, target: &str) -> WorkflowTransition {
        WorkflowTransition {
            id: TransitionId("T-1".to_string()),
            source: source.map(|s| WorkflowId(s.to_string())),
            target: WorkflowId(target.to_string()),
            condition: String::new(),
            priority: 0,
            sla_override_hours: None,
        }
    }

    #[test]
    fn detects_self_loop() {
        assert!(transition(Some("WF1"), "WF1").is_self_loop());
        assert!(!transition(Some("WF0"), "WF1").is_self_loop());
    }

    #[test]
    fn entry_edge_is_never_a_self_loop() {
        let entry = transition(None, "WF0");
        assert!(entry.is_entry());
        assert!(!entry.is_self_loop());
    }
}
