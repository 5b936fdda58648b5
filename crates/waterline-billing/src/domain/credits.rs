use crate::domain::types::{
    BillId, BillStatus, CreditTransactionType, CustomerId, Money, TransactionId,
};
use crate::error::{BillingError, Result};
use crate::storage::{BillRepository, CreditRepository};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use waterline_common::MeterNumber;

/// A customer-meter account holding the prepaid credit balance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    pub first_name: String,
    pub last_name: String,
    pub meter_number: MeterNumber,
    pub is_senior: bool,
    pub credit_balance: Money,
    /// Display bound only; staff may record credit past it.
    pub credit_limit: Option<Money>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl Customer {
    pub fn new(
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        meter_number: MeterNumber,
        is_senior: bool,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: CustomerId::new(),
            first_name: first_name.into(),
            last_name: last_name.into(),
            meter_number,
            is_senior,
            credit_balance: Money::zero(),
            credit_limit: None,
            version: 0,
            created_at: now,
            last_updated: now,
        }
    }

    /// "Last, First" — the sort key for customer-facing listings.
    pub fn display_name(&self) -> String {
        format!("{}, {}", self.last_name, self.first_name)
    }

    pub fn apply_credit(&mut self, amount: Money) {
        self.credit_balance = self.credit_balance.add(amount);
        self.last_updated = Utc::now();
    }

    pub fn consume_credit(&mut self, amount: Money) -> Result<()> {
        let new_balance = self.credit_balance.subtract(amount).ok_or_else(|| {
            BillingError::InsufficientCredit {
                available: self.credit_balance.as_decimal(),
                required: amount.as_decimal(),
            }
        })?;
        self.credit_balance = new_balance;
        self.last_updated = Utc::now();
        Ok(())
    }
}

/// One append-only ledger entry.
///
/// Amounts are signed: credits positive, debits negative. The customer's
/// cached balance is the running sum of these.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditTransaction {
    pub id: TransactionId,
    pub customer_id: CustomerId,
    pub amount: Decimal,
    pub transaction_type: CreditTransactionType,
    pub description: String,
    pub bill_id: Option<BillId>,
    pub created_at: DateTime<Utc>,
}

impl CreditTransaction {
    pub fn credit(
        customer_id: CustomerId,
        amount: Money,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: TransactionId::new(),
            customer_id,
            amount: amount.as_decimal(),
            transaction_type: CreditTransactionType::Credit,
            description: description.into(),
            bill_id: None,
            created_at: Utc::now(),
        }
    }

    pub fn debit(customer_id: CustomerId, amount: Money, bill_id: BillId) -> Self {
        Self {
            id: TransactionId::new(),
            customer_id,
            amount: -amount.as_decimal(),
            transaction_type: CreditTransactionType::Debit,
            description: format!("Credit applied to bill {bill_id}"),
            bill_id: Some(bill_id),
            created_at: Utc::now(),
        }
    }
}

/// Result of applying standing credit against a bill.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ApplyCreditOutcome {
    pub amount_applied: Money,
    pub remaining_due: Money,
    pub new_status: BillStatus,
}

/// Credit ledger operations
#[async_trait]
pub trait LedgerOperations: Send + Sync {
    async fn balance(&self, customer_id: &CustomerId) -> Result<Money>;

    async fn record_credit(
        &self,
        customer_id: &CustomerId,
        amount: Money,
        description: &str,
    ) -> Result<CreditTransaction>;

    async fn apply_credit_to_bill(
        &self,
        customer_id: &CustomerId,
        bill_id: &BillId,
    ) -> Result<ApplyCreditOutcome>;

    async fn history(
        &self,
        customer_id: &CustomerId,
        limit: Option<i64>,
    ) -> Result<Vec<CreditTransaction>>;
}

pub struct LedgerManager {
    credits: Arc<dyn CreditRepository + Send + Sync>,
    bills: Arc<dyn BillRepository + Send + Sync>,
}

impl LedgerManager {
    pub fn new(
        credits: Arc<dyn CreditRepository + Send + Sync>,
        bills: Arc<dyn BillRepository + Send + Sync>,
    ) -> Self {
        Self { credits, bills }
    }

    async fn require_customer(&self, customer_id: &CustomerId) -> Result<Customer> {
        self.credits
            .get_customer(customer_id)
            .await?
            .ok_or_else(|| BillingError::CustomerNotFound {
                id: customer_id.to_string(),
            })
    }
}

#[async_trait]
impl LedgerOperations for LedgerManager {
    async fn balance(&self, customer_id: &CustomerId) -> Result<Money> {
        let customer = self.require_customer(customer_id).await?;
        Ok(customer.credit_balance)
    }

    async fn record_credit(
        &self,
        customer_id: &CustomerId,
        amount: Money,
        description: &str,
    ) -> Result<CreditTransaction> {
        if !amount.is_positive() {
            return Err(BillingError::InvalidAmount {
                amount: amount.as_decimal(),
            });
        }

        let customer = self.require_customer(customer_id).await?;

        let entry = CreditTransaction::credit(customer.id, amount, description);
        self.credits.append_credit(&entry, customer.version).await?;

        info!("Recorded {} credit for customer {}", amount, customer.id);

        Ok(entry)
    }

    async fn apply_credit_to_bill(
        &self,
        customer_id: &CustomerId,
        bill_id: &BillId,
    ) -> Result<ApplyCreditOutcome> {
        let customer = self.require_customer(customer_id).await?;

        let bill = self
            .bills
            .get_bill(bill_id)
            .await?
            .ok_or_else(|| BillingError::BillNotFound {
                id: bill_id.to_string(),
            })?;

        if bill.customer_id != customer.id {
            return Err(BillingError::ValidationError {
                field: "bill_id".to_string(),
                message: format!("bill {} does not belong to customer {}", bill.id, customer.id),
            });
        }

        if bill.archived {
            return Err(BillingError::StateConflict {
                entity: "bill".to_string(),
                id: bill.id.to_string(),
            });
        }

        let amount_applied = customer.credit_balance.min(bill.amount_due);

        if !amount_applied.is_positive() {
            // Nothing to apply; the bill is untouched.
            return Ok(ApplyCreditOutcome {
                amount_applied: Money::zero(),
                remaining_due: bill.amount_due,
                new_status: bill.status,
            });
        }

        let new_status = if amount_applied == bill.amount_due {
            BillStatus::Paid
        } else {
            BillStatus::PartiallyPaid
        };
        let remaining_due = bill
            .amount_due
            .subtract(amount_applied)
            .unwrap_or(Money::zero());

        let entry = CreditTransaction::debit(customer.id, amount_applied, bill.id);
        self.credits
            .apply_debit(&entry, customer.version, bill.version, new_status)
            .await?;

        info!(
            "Applied {} credit to bill {} for customer {}",
            amount_applied, bill.id, customer.id
        );

        Ok(ApplyCreditOutcome {
            amount_applied,
            remaining_due,
            new_status,
        })
    }

    async fn history(
        &self,
        customer_id: &CustomerId,
        limit: Option<i64>,
    ) -> Result<Vec<CreditTransaction>> {
        self.credits.history(customer_id, limit).await
    }
}
