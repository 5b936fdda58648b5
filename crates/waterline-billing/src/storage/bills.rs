use crate::domain::bills::Bill;
use crate::domain::types::{BillId, BillStatus, CustomerId, Money};
use crate::error::{BillingError, Result};
use crate::storage::db::DatabasePool;
use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::Row;
use std::sync::Arc;
use waterline_common::MeterNumber;

#[async_trait]
pub trait BillRepository: Send + Sync {
    async fn create_bill(&self, bill: &Bill) -> Result<()>;
    async fn get_bill(&self, id: &BillId) -> Result<Option<Bill>>;
    async fn list_bills(&self) -> Result<Vec<Bill>>;
    async fn list_by_customer(&self, customer_id: &CustomerId) -> Result<Vec<Bill>>;
    async fn list_archived(&self) -> Result<Vec<Bill>>;

    /// Move a bill's stored status, guarded by the version token.
    async fn update_status(
        &self,
        id: &BillId,
        status: BillStatus,
        expected_version: i64,
    ) -> Result<()>;

    /// Set the one-way archive flag, guarded by the version token.
    async fn set_archived(&self, id: &BillId, expected_version: i64) -> Result<()>;
}

pub struct SqlBillRepository {
    db: Arc<DatabasePool>,
}

impl SqlBillRepository {
    pub fn new(db: Arc<DatabasePool>) -> Self {
        Self { db }
    }

    fn map_row(row: &PgRow) -> Result<Bill> {
        let status: String = row.get("status");
        let meter_number: String = row.get("meter_number");

        Ok(Bill {
            id: BillId::from_uuid(row.get("bill_id")),
            customer_id: CustomerId::from_uuid(row.get("customer_id")),
            meter_number: MeterNumber::new(meter_number).map_err(|e| {
                BillingError::DatabaseError {
                    operation: "decode_meter_number".to_string(),
                    source: Box::new(e),
                }
            })?,
            previous_reading: row.get("previous_reading"),
            current_reading: row.get("current_reading"),
            consumption: row.get("consumption"),
            base_amount: Money::from_decimal(row.get("base_amount")),
            senior_discount: Money::from_decimal(row.get("senior_discount")),
            penalty_amount: Money::from_decimal(row.get("penalty_amount")),
            amount_due: Money::from_decimal(row.get("amount_due")),
            due_date: row.get("due_date"),
            status: BillStatus::parse_str(&status).ok_or_else(|| {
                BillingError::DatabaseError {
                    operation: "decode_status".to_string(),
                    source: format!("unknown bill status {status}").into(),
                }
            })?,
            archived: row.get("archived"),
            version: row.get("version"),
            created_at: row.get("created_at"),
        })
    }

    fn map_rows(rows: Vec<PgRow>) -> Result<Vec<Bill>> {
        rows.iter().map(Self::map_row).collect()
    }
}

const SELECT_BILL: &str = r#"
    SELECT bill_id, customer_id, meter_number, previous_reading, current_reading,
           consumption, base_amount, senior_discount, penalty_amount, amount_due,
           due_date, status, archived, version, created_at
    FROM billing.bills
"#;

#[async_trait]
impl BillRepository for SqlBillRepository {
    async fn create_bill(&self, bill: &Bill) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO billing.bills
                (bill_id, customer_id, meter_number, previous_reading, current_reading,
                 consumption, base_amount, senior_discount, penalty_amount, amount_due,
                 due_date, status, archived, version, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(bill.id.as_uuid())
        .bind(bill.customer_id.as_uuid())
        .bind(bill.meter_number.as_str())
        .bind(bill.previous_reading)
        .bind(bill.current_reading)
        .bind(bill.consumption)
        .bind(bill.base_amount.as_decimal())
        .bind(bill.senior_discount.as_decimal())
        .bind(bill.penalty_amount.as_decimal())
        .bind(bill.amount_due.as_decimal())
        .bind(bill.due_date)
        .bind(bill.status.as_str())
        .bind(bill.archived)
        .bind(bill.version)
        .bind(bill.created_at)
        .execute(self.db.pool())
        .await
        .map_err(|e| BillingError::DatabaseError {
            operation: "create_bill".to_string(),
            source: Box::new(e),
        })?;

        Ok(())
    }

    async fn get_bill(&self, id: &BillId) -> Result<Option<Bill>> {
        let row = sqlx::query(&format!("{SELECT_BILL} WHERE bill_id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(self.db.pool())
            .await
            .map_err(|e| BillingError::DatabaseError {
                operation: "get_bill".to_string(),
                source: Box::new(e),
            })?;

        row.as_ref().map(Self::map_row).transpose()
    }

    async fn list_bills(&self) -> Result<Vec<Bill>> {
        let rows = sqlx::query(&format!("{SELECT_BILL} ORDER BY created_at DESC"))
            .fetch_all(self.db.pool())
            .await
            .map_err(|e| BillingError::DatabaseError {
                operation: "list_bills".to_string(),
                source: Box::new(e),
            })?;

        Self::map_rows(rows)
    }

    async fn list_by_customer(&self, customer_id: &CustomerId) -> Result<Vec<Bill>> {
        let rows = sqlx::query(&format!(
            "{SELECT_BILL} WHERE customer_id = $1 ORDER BY created_at DESC"
        ))
        .bind(customer_id.as_uuid())
        .fetch_all(self.db.pool())
        .await
        .map_err(|e| BillingError::DatabaseError {
            operation: "list_by_customer".to_string(),
            source: Box::new(e),
        })?;

        Self::map_rows(rows)
    }

    async fn list_archived(&self) -> Result<Vec<Bill>> {
        let rows = sqlx::query(&format!(
            "{SELECT_BILL} WHERE archived = TRUE ORDER BY created_at DESC"
        ))
        .fetch_all(self.db.pool())
        .await
        .map_err(|e| BillingError::DatabaseError {
            operation: "list_archived".to_string(),
            source: Box::new(e),
        })?;

        Self::map_rows(rows)
    }

    async fn update_status(
        &self,
        id: &BillId,
        status: BillStatus,
        expected_version: i64,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE billing.bills
            SET status = $2, version = version + 1, updated_at = NOW()
            WHERE bill_id = $1 AND version = $3 AND archived = FALSE
            "#,
        )
        .bind(id.as_uuid())
        .bind(status.as_str())
        .bind(expected_version)
        .execute(self.db.pool())
        .await
        .map_err(|e| BillingError::DatabaseError {
            operation: "update_status".to_string(),
            source: Box::new(e),
        })?;

        if result.rows_affected() == 0 {
            return Err(BillingError::StateConflict {
                entity: "bill".to_string(),
                id: id.to_string(),
            });
        }

        Ok(())
    }

    async fn set_archived(&self, id: &BillId, expected_version: i64) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE billing.bills
            SET archived = TRUE, version = version + 1, updated_at = NOW()
            WHERE bill_id = $1 AND version = $2 AND archived = FALSE
            "#,
        )
        .bind(id.as_uuid())
        .bind(expected_version)
        .execute(self.db.pool())
        .await
        .map_err(|e| BillingError::DatabaseError {
            operation: "set_archived".to_string(),
            source: Box::new(e),
        })?;

        if result.rows_affected() == 0 {
            return Err(BillingError::StateConflict {
                entity: "bill".to_string(),
                id: id.to_string(),
            });
        }

        Ok(())
    }
}
