use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubjectId(pub String);

/// The lead/car record a workflow instance tracks progress for. The
/// persistent store for subjects lives outside this system; this is the
/// slice of fields the activation snapshot copies.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Subject {
    pub id: SubjectId,
    pub display_name: String,
    pub intention: String,
    pub sale_stage: String,
    pub qualification: String,
    pub asking_price: Option<Decimal>,
    pub highest_bid: Option<Decimal>,
    pub contact: Option<String>,
}

/// Point-in-time copy of subject state taken when an activation commits.
/// Later edits to the live subject must not affect a written snapshot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SubjectSnapshot {
    pub display_name: String,
    pub intention: String,
    pub sale_stage: String,
    pub qualification: String,
    pub asking_price: Option<Decimal>,
    pub highest_bid: Option<Decimal>,
}

impl Subject {
    pub fn snapshot(&self) -> SubjectSnapshot {
        SubjectSnapshot {
            display_name: self.display_name.clone(),
            intention: self.intention.clone(),
            sale_stage: self.sale_stage.clone(),
            qualification: self.qualification.clone(),
            asking_price: self.asking_price,
            highest_bid: self.highest_bid,
        }
    }
}
