//! Message template resolution.
//!
//! Step templates are Tera snippets over the subject snapshot plus the
//! activation's custom fields. `{{counter_offer}}` is derived here: the
//! highest bid minus a fixed offset from config, so templates never do
//! arithmetic.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use tera::{Context, Tera};
use thiserror::Error;

use leadflow_core::domain::subject::SubjectSnapshot;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("template render failed: {0}")]
    Template(String),
}

pub fn template_values(
    snapshot: &SubjectSnapshot,
    custom_fields: &BTreeMap<String, String>,
    counter_offer_offset: i64,
) -> Context {
    let mut context = Context::new();
    context.insert("display_name", &snapshot.display_name);
    context.insert("intention", &snapshot.intention);
    context.insert("sale_stage", &snapshot.sale_stage);
    context.insert("qualification", &snapshot.qualification);
    if let Some(asking_price) = snapshot.asking_price {
        context.insert("asking_price", &asking_price.to_string());
    }
    if let Some(highest_bid) = snapshot.highest_bid {
        context.insert("highest_bid", &highest_bid.to_string());
        let counter_offer = highest_bid - Decimal::from(counter_offer_offset);
        context.insert("counter_offer", &counter_offer.to_string());
    }
    for (name, value) in custom_fields {
        context.insert(name, value);
    }
    context
}

pub fn render_template(template: &str, values: &Context) -> Result<String, RenderError> {
    Tera::one_off(template, values, false).map_err(|e| RenderError::Template(e.to_string()))
}
