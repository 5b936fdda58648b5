use crate::domain::credits::{CreditTransaction, Customer};
use crate::domain::types::{
    BillId, BillStatus, CreditTransactionType, CustomerId, Money, TransactionId,
};
use crate::error::{BillingError, Result};
use crate::storage::db::DatabasePool;
use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::Row;
use std::sync::Arc;
use waterline_common::distributed::{acquire_xact_lock, LockKey};
use waterline_common::MeterNumber;

#[async_trait]
pub trait CreditRepository: Send + Sync {
    async fn get_customer(&self, id: &CustomerId) -> Result<Option<Customer>>;
    async fn create_customer(&self, customer: &Customer) -> Result<()>;
    async fn list_customers(&self) -> Result<Vec<Customer>>;

    /// Append a credit entry and increase the cached balance, atomically.
    async fn append_credit(&self, entry: &CreditTransaction, expected_version: i64) -> Result<()>;

    /// Append a debit entry, decrease the balance and move the linked
    /// bill's status — all in one transaction, or none of it.
    async fn apply_debit(
        &self,
        entry: &CreditTransaction,
        expected_customer_version: i64,
        expected_bill_version: i64,
        new_status: BillStatus,
    ) -> Result<()>;

    async fn history(
        &self,
        customer_id: &CustomerId,
        limit: Option<i64>,
    ) -> Result<Vec<CreditTransaction>>;
}

pub struct SqlCreditRepository {
    db: Arc<DatabasePool>,
}

impl SqlCreditRepository {
    pub fn new(db: Arc<DatabasePool>) -> Self {
        Self { db }
    }

    fn map_customer(row: &PgRow) -> Result<Customer> {
        let meter_number: String = row.get("meter_number");

        Ok(Customer {
            id: CustomerId::from_uuid(row.get("customer_id")),
            first_name: row.get("first_name"),
            last_name: row.get("last_name"),
            meter_number: MeterNumber::new(meter_number).map_err(|e| {
                BillingError::DatabaseError {
                    operation: "decode_meter_number".to_string(),
                    source: Box::new(e),
                }
            })?,
            is_senior: row.get("is_senior"),
            credit_balance: Money::from_decimal(row.get("credit_balance")),
            credit_limit: row
                .get::<Option<Decimal>, _>("credit_limit")
                .map(Money::from_decimal),
            version: row.get("version"),
            created_at: row.get("created_at"),
            last_updated: row.get("last_updated"),
        })
    }

    fn map_transaction(row: &PgRow) -> Result<CreditTransaction> {
        let transaction_type: String = row.get("transaction_type");

        Ok(CreditTransaction {
            id: TransactionId::from_uuid(row.get("transaction_id")),
            customer_id: CustomerId::from_uuid(row.get("customer_id")),
            amount: row.get("amount"),
            transaction_type: CreditTransactionType::parse_str(&transaction_type).ok_or_else(
                || BillingError::DatabaseError {
                    operation: "decode_transaction_type".to_string(),
                    source: format!("unknown transaction type {transaction_type}").into(),
                },
            )?,
            description: row.get("description"),
            bill_id: row
                .get::<Option<uuid::Uuid>, _>("bill_id")
                .map(BillId::from_uuid),
            created_at: row.get("created_at"),
        })
    }
}

const SELECT_CUSTOMER: &str = r#"
    SELECT customer_id, first_name, last_name, meter_number, is_senior,
           credit_balance, credit_limit, version, created_at, last_updated
    FROM billing.customers
"#;

#[async_trait]
impl CreditRepository for SqlCreditRepository {
    async fn get_customer(&self, id: &CustomerId) -> Result<Option<Customer>> {
        let row = sqlx::query(&format!("{SELECT_CUSTOMER} WHERE customer_id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(self.db.pool())
            .await
            .map_err(|e| BillingError::DatabaseError {
                operation: "get_customer".to_string(),
                source: Box::new(e),
            })?;

        row.as_ref().map(Self::map_customer).transpose()
    }

    async fn create_customer(&self, customer: &Customer) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO billing.customers
                (customer_id, first_name, last_name, meter_number, is_senior,
                 credit_balance, credit_limit, version, created_at, last_updated)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(customer.id.as_uuid())
        .bind(&customer.first_name)
        .bind(&customer.last_name)
        .bind(customer.meter_number.as_str())
        .bind(customer.is_senior)
        .bind(customer.credit_balance.as_decimal())
        .bind(customer.credit_limit.map(|l| l.as_decimal()))
        .bind(customer.version)
        .bind(customer.created_at)
        .bind(customer.last_updated)
        .execute(self.db.pool())
        .await
        .map_err(|e| BillingError::DatabaseError {
            operation: "create_customer".to_string(),
            source: Box::new(e),
        })?;

        Ok(())
    }

    async fn list_customers(&self) -> Result<Vec<Customer>> {
        let rows = sqlx::query(&format!(
            "{SELECT_CUSTOMER} ORDER BY last_name, first_name"
        ))
        .fetch_all(self.db.pool())
        .await
        .map_err(|e| BillingError::DatabaseError {
            operation: "list_customers".to_string(),
            source: Box::new(e),
        })?;

        rows.iter().map(Self::map_customer).collect()
    }

    async fn append_credit(&self, entry: &CreditTransaction, expected_version: i64) -> Result<()> {
        let mut tx = self
            .db
            .pool()
            .begin()
            .await
            .map_err(|e| BillingError::DatabaseError {
                operation: "begin_append_credit".to_string(),
                source: Box::new(e),
            })?;

        // Serialize ledger writes per customer; the lock releases with the
        // transaction.
        acquire_xact_lock(&mut tx, LockKey::for_customer(entry.customer_id.as_uuid()))
            .await
            .map_err(|e| BillingError::DatabaseError {
                operation: "lock_customer".to_string(),
                source: Box::new(e),
            })?;

        let updated = sqlx::query(
            r#"
            UPDATE billing.customers
            SET credit_balance = credit_balance + $2,
                version = version + 1,
                last_updated = NOW()
            WHERE customer_id = $1 AND version = $3
            "#,
        )
        .bind(entry.customer_id.as_uuid())
        .bind(entry.amount)
        .bind(expected_version)
        .execute(&mut *tx)
        .await
        .map_err(|e| BillingError::DatabaseError {
            operation: "update_balance".to_string(),
            source: Box::new(e),
        })?;

        if updated.rows_affected() == 0 {
            return Err(BillingError::ConcurrencyConflict {
                customer_id: entry.customer_id.to_string(),
            });
        }

        insert_transaction(&mut tx, entry).await?;

        tx.commit().await.map_err(|e| BillingError::DatabaseError {
            operation: "commit_append_credit".to_string(),
            source: Box::new(e),
        })?;

        Ok(())
    }

    async fn apply_debit(
        &self,
        entry: &CreditTransaction,
        expected_customer_version: i64,
        expected_bill_version: i64,
        new_status: BillStatus,
    ) -> Result<()> {
        let bill_id = entry.bill_id.ok_or_else(|| BillingError::ValidationError {
            field: "bill_id".to_string(),
            message: "debit entries must reference a bill".to_string(),
        })?;

        let mut tx = self
            .db
            .pool()
            .begin()
            .await
            .map_err(|e| BillingError::DatabaseError {
                operation: "begin_apply_debit".to_string(),
                source: Box::new(e),
            })?;

        acquire_xact_lock(&mut tx, LockKey::for_customer(entry.customer_id.as_uuid()))
            .await
            .map_err(|e| BillingError::DatabaseError {
                operation: "lock_customer".to_string(),
                source: Box::new(e),
            })?;

        // Debit amounts are negative; the balance guard keeps the ledger
        // from going below zero even if the caller computed a stale amount.
        let updated = sqlx::query(
            r#"
            UPDATE billing.customers
            SET credit_balance = credit_balance + $2,
                version = version + 1,
                last_updated = NOW()
            WHERE customer_id = $1 AND version = $3 AND credit_balance + $2 >= 0
            "#,
        )
        .bind(entry.customer_id.as_uuid())
        .bind(entry.amount)
        .bind(expected_customer_version)
        .execute(&mut *tx)
        .await
        .map_err(|e| BillingError::DatabaseError {
            operation: "update_balance".to_string(),
            source: Box::new(e),
        })?;

        if updated.rows_affected() == 0 {
            return Err(BillingError::ConcurrencyConflict {
                customer_id: entry.customer_id.to_string(),
            });
        }

        insert_transaction(&mut tx, entry).await?;

        let bill_updated = sqlx::query(
            r#"
            UPDATE billing.bills
            SET status = $2, version = version + 1, updated_at = NOW()
            WHERE bill_id = $1 AND version = $3 AND archived = FALSE
            "#,
        )
        .bind(bill_id.as_uuid())
        .bind(new_status.as_str())
        .bind(expected_bill_version)
        .execute(&mut *tx)
        .await
        .map_err(|e| BillingError::DatabaseError {
            operation: "update_bill_status".to_string(),
            source: Box::new(e),
        })?;

        // Dropping the transaction rolls back the balance change and the
        // ledger entry along with it.
        if bill_updated.rows_affected() == 0 {
            return Err(BillingError::StateConflict {
                entity: "bill".to_string(),
                id: bill_id.to_string(),
            });
        }

        tx.commit().await.map_err(|e| BillingError::DatabaseError {
            operation: "commit_apply_debit".to_string(),
            source: Box::new(e),
        })?;

        Ok(())
    }

    async fn history(
        &self,
        customer_id: &CustomerId,
        limit: Option<i64>,
    ) -> Result<Vec<CreditTransaction>> {
        let limit = limit.unwrap_or(100);

        let rows = sqlx::query(
            r#"
            SELECT transaction_id, customer_id, amount, transaction_type,
                   description, bill_id, created_at
            FROM billing.credit_transactions
            WHERE customer_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(customer_id.as_uuid())
        .bind(limit)
        .fetch_all(self.db.pool())
        .await
        .map_err(|e| BillingError::DatabaseError {
            operation: "history".to_string(),
            source: Box::new(e),
        })?;

        rows.iter().map(Self::map_transaction).collect()
    }
}

async fn insert_transaction(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    entry: &CreditTransaction,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO billing.credit_transactions
            (transaction_id, customer_id, amount, transaction_type,
             description, bill_id, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(entry.id.as_uuid())
    .bind(entry.customer_id.as_uuid())
    .bind(entry.amount)
    .bind(entry.transaction_type.as_str())
    .bind(&entry.description)
    .bind(entry.bill_id.map(|b| b.as_uuid()))
    .bind(entry.created_at)
    .execute(&mut **tx)
    .await
    .map_err(|e| BillingError::DatabaseError {
        operation: "insert_transaction".to_string(),
        source: Box::new(e),
    })?;

    Ok(())
}
