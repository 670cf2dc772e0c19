use std::str::FromStr;

use rust_decimal::Decimal;
use sqlx::Row;

use leadflow_core::domain::subject::{Subject, SubjectId};

use super::{RepositoryError, SubjectRepository};
use crate::DbPool;

pub struct SqlSubjectRepository {
    pool: DbPool,
}

impl SqlSubjectRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn parse_price(value: Option<String>) -> Result<Option<Decimal>, RepositoryError> {
    value
        .map(|raw| Decimal::from_str(&raw).map_err(|e| RepositoryError::Decode(e.to_string())))
        .transpose()
}

fn row_to_subject(row: &sqlx::sqlite::SqliteRow) -> Result<Subject, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let display_name: String =
        row.try_get("display_name").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let intention: String =
        row.try_get("intention").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let sale_stage: String =
        row.try_get("sale_stage").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let qualification: String =
        row.try_get("qualification").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let asking_price: Option<String> =
        row.try_get("asking_price").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let highest_bid: Option<String> =
        row.try_get("highest_bid").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let contact: Option<String> =
        row.try_get("contact").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(Subject {
        id: SubjectId(id),
        display_name,
        intention,
        sale_stage,
        qualification,
        asking_price: parse_price(asking_price)?,
        highest_bid: parse_price(highest_bid)?,
        contact,
    })
}

#[async_trait::async_trait]
impl SubjectRepository for SqlSubjectRepository {
    async fn find_by_id(&self, id: &SubjectId) -> Result<Option<Subject>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, display_name, intention, sale_stage, qualification,
                    asking_price, highest_bid, contact
             FROM subject WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_subject(r)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, subject: Subject) -> Result<(), RepositoryError> {
        let asking_price = subject.asking_price.map(|p| p.to_string());
        let highest_bid = subject.highest_bid.map(|p| p.to_string());

        sqlx::query(
            "INSERT INTO subject (id, display_name, intention, sale_stage, qualification,
                                  asking_price, highest_bid, contact)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 display_name = excluded.display_name,
                 intention = excluded.intention,
                 sale_stage = excluded.sale_stage,
                 qualification = excluded.qualification,
                 asking_price = excluded.asking_price,
                 highest_bid = excluded.highest_bid,
                 contact = excluded.contact",
        )
        .bind(&subject.id.0)
        .bind(&subject.display_name)
        .bind(&subject.intention)
        .bind(&subject.sale_stage)
        .bind(&subject.qualification)
        .bind(&asking_price)
        .bind(&highest_bid)
        .bind(&subject.contact)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
