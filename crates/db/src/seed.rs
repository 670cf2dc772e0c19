//! Deterministic demo dataset for local development.
//!
//! Loads a small car-sale catalog: two stages, four workflows wired into a
//! first-contact -> auction -> negotiation -> closing graph, plus one demo
//! subject. Every id is fixed and every write is an upsert, so repeated
//! runs converge on the same state.

use rust_decimal::Decimal;

use leadflow_core::domain::catalog::{
    Stage, StageId, StepId, TransitionId, WorkflowDefinition, WorkflowId, WorkflowStep,
    WorkflowTransition,
};
use leadflow_core::domain::subject::{Subject, SubjectId};
use leadflow_core::fields::{FieldKind, FieldSpec};

use crate::repositories::{
    CatalogRepository, RepositoryError, SqlCatalogRepository, SqlSubjectRepository,
    SubjectRepository,
};
use crate::DbPool;

#[derive(Clone, Debug)]
pub struct WorkflowSeedInfo {
    pub workflow_id: &'static str,
    pub name: &'static str,
    pub stage: &'static str,
}

#[derive(Clone, Debug)]
pub struct SeedSummary {
    pub workflows: Vec<WorkflowSeedInfo>,
}

#[derive(Clone, Debug)]
pub struct SeedVerification {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}

pub struct DemoDataset;

const STAGES: [(&str, &str); 2] =
    [("S-acquisition", "Acquisition"), ("S-negotiation", "Negotiation")];

const WORKFLOWS: [(&str, &str, &str, i64); 4] = [
    ("WF-first-contact", "First contact", "S-acquisition", 24),
    ("WF-auction", "Auction", "S-acquisition", 48),
    ("WF-negotiation", "Negotiation", "S-negotiation", 72),
    ("WF-closing", "Closing", "S-negotiation", 24),
];

impl DemoDataset {
    pub async fn load(pool: &DbPool) -> Result<SeedSummary, RepositoryError> {
        let catalog = SqlCatalogRepository::new(pool.clone());
        let subjects = SqlSubjectRepository::new(pool.clone());

        for (id, name) in STAGES {
            catalog
                .save_stage(Stage { id: StageId(id.to_string()), name: name.to_string() })
                .await?;
        }

        for (id, name, stage, sla_hours) in WORKFLOWS {
            catalog
                .save_workflow(WorkflowDefinition {
                    id: WorkflowId(id.to_string()),
                    stage_id: StageId(stage.to_string()),
                    name: name.to_string(),
                    description: String::new(),
                    sla_hours,
                    active: true,
                })
                .await?;
        }

        let steps: [(&str, &str, i64, bool, Option<&str>); 7] = [
            ("ST-fc-call", "WF-first-contact", 10, false, None),
            (
                "ST-fc-greet",
                "WF-first-contact",
                20,
                true,
                Some("Hello {{display_name}}, thank you for listing your car with us."),
            ),
            ("ST-au-schedule", "WF-auction", 10, false, None),
            ("ST-au-collect-bids", "WF-auction", 20, false, None),
            (
                "ST-ng-counter",
                "WF-negotiation",
                10,
                true,
                Some("Our counter offer for {{display_name}} is {{counter_offer}}."),
            ),
            ("ST-cl-contract", "WF-closing", 10, false, None),
            ("ST-cl-handover", "WF-closing", 20, false, None),
        ];
        for (id, workflow, position, automated, template) in steps {
            catalog
                .save_step(WorkflowStep {
                    id: StepId(id.to_string()),
                    workflow_id: WorkflowId(workflow.to_string()),
                    position,
                    automated,
                    message_template: template.map(str::to_string),
                })
                .await?;
        }

        let transitions: [(&str, Option<&str>, &str, i32, Option<i64>); 5] = [
            ("T-entry-first-contact", None, "WF-first-contact", 0, None),
            ("T-fc-auction", Some("WF-first-contact"), "WF-auction", 0, None),
            ("T-au-negotiation", Some("WF-auction"), "WF-negotiation", 0, Some(12)),
            ("T-au-closing", Some("WF-auction"), "WF-closing", 5, None),
            ("T-ng-closing", Some("WF-negotiation"), "WF-closing", 0, None),
        ];
        for (id, source, target, priority, sla_override_hours) in transitions {
            catalog
                .save_transition(WorkflowTransition {
                    id: TransitionId(id.to_string()),
                    source: source.map(|s| WorkflowId(s.to_string())),
                    target: WorkflowId(target.to_string()),
                    condition: String::new(),
                    priority,
                    sla_override_hours,
                })
                .await?;
        }

        catalog
            .save_field(
                &WorkflowId("WF-negotiation".to_string()),
                FieldSpec {
                    name: "expected_price".to_string(),
                    kind: FieldKind::Number,
                    required: true,
                },
            )
            .await?;
        catalog
            .save_field(
                &WorkflowId("WF-negotiation".to_string()),
                FieldSpec {
                    name: "channel".to_string(),
                    kind: FieldKind::Select {
                        options: vec!["phone".to_string(), "zalo".to_string()],
                    },
                    required: false,
                },
            )
            .await?;

        subjects
            .save(Subject {
                id: SubjectId("car-demo-1".to_string()),
                display_name: "Toyota Vios 2019".to_string(),
                intention: "sell".to_string(),
                sale_stage: "new".to_string(),
                qualification: "warm".to_string(),
                asking_price: Some(Decimal::new(420_000_000, 0)),
                highest_bid: Some(Decimal::new(400_000_000, 0)),
                contact: Some("+84900000001".to_string()),
            })
            .await?;

        Ok(SeedSummary {
            workflows: WORKFLOWS
                .iter()
                .map(|(id, name, stage, _)| WorkflowSeedInfo {
                    workflow_id: id,
                    name,
                    stage,
                })
                .collect(),
        })
    }

    pub async fn verify(pool: &DbPool) -> Result<SeedVerification, RepositoryError> {
        let catalog = SqlCatalogRepository::new(pool.clone());
        let subjects = SqlSubjectRepository::new(pool.clone());

        let stages = catalog.list_stages().await?;
        let workflows = catalog.list_workflows(None).await?;
        let entry_edges = catalog.list_entry_transitions().await?;
        let demo_subject =
            subjects.find_by_id(&SubjectId("car-demo-1".to_string())).await?.is_some();

        let checks = vec![
            ("stages", stages.len() == STAGES.len()),
            ("workflows", workflows.len() == WORKFLOWS.len()),
            ("entry-transition", entry_edges.iter().any(|t| t.target.0 == "WF-first-contact")),
            ("demo-subject", demo_subject),
        ];
        let all_present = checks.iter().all(|(_, passed)| *passed);
        Ok(SeedVerification { all_present, checks })
    }
}
