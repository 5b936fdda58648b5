use crate::domain::credits::Customer;
use crate::domain::inputs::ValidatedReadings;
use crate::domain::schedule;
use crate::domain::tariff::{BillTotals, TariffSchedule};
use crate::domain::types::{BillId, BillStatus, CustomerId, Money};
use crate::domain::views::{self, CustomerBillingView};
use crate::error::{BillingError, Result};
use crate::storage::{BillRepository, CreditRepository};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use waterline_common::MeterNumber;

/// One billing cycle's charge record for a customer-meter pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bill {
    pub id: BillId,
    pub customer_id: CustomerId,
    pub meter_number: MeterNumber,
    pub previous_reading: Decimal,
    pub current_reading: Decimal,
    pub consumption: Decimal,
    pub base_amount: Money,
    pub senior_discount: Money,
    pub penalty_amount: Money,
    pub amount_due: Money,
    pub due_date: NaiveDate,
    pub status: BillStatus,
    pub archived: bool,
    pub version: i64,
    pub created_at: DateTime<Utc>,
}

impl Bill {
    pub fn new(
        customer: &Customer,
        readings: ValidatedReadings,
        totals: BillTotals,
        due_date: NaiveDate,
    ) -> Self {
        Self {
            id: BillId::new(),
            customer_id: customer.id,
            meter_number: customer.meter_number.clone(),
            previous_reading: readings.previous_reading,
            current_reading: readings.current_reading,
            consumption: totals.consumption,
            base_amount: totals.base_amount,
            senior_discount: totals.senior_discount,
            penalty_amount: totals.penalty_amount,
            amount_due: totals.amount_due,
            due_date,
            status: BillStatus::Unpaid,
            archived: false,
            version: 0,
            created_at: Utc::now(),
        }
    }

    /// Stored status with the read-time overdue derivation applied.
    pub fn effective_status(&self, today: NaiveDate) -> BillStatus {
        if !self.archived && self.status == BillStatus::Unpaid && self.due_date < today {
            BillStatus::Overdue
        } else {
            self.status
        }
    }

    /// Payment-driven transition; bounded by the status transition table.
    pub fn transition_to(&mut self, next: BillStatus) -> Result<()> {
        if self.archived {
            return Err(BillingError::StateConflict {
                entity: "bill".to_string(),
                id: self.id.to_string(),
            });
        }
        if !self.status.can_transition_to(next) {
            return Err(BillingError::InvalidStatusTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        Ok(())
    }

    /// Staff correction; bypasses the transition table but never targets
    /// overdue and never touches an archived bill.
    pub fn override_status(&mut self, next: BillStatus) -> Result<()> {
        if self.archived {
            return Err(BillingError::StateConflict {
                entity: "bill".to_string(),
                id: self.id.to_string(),
            });
        }
        if !next.is_override_target() {
            return Err(BillingError::InvalidStatusTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        Ok(())
    }

    /// One-way archive flag. Returns whether the flag changed; repeated
    /// calls are a no-op.
    pub fn archive(&mut self) -> bool {
        if self.archived {
            return false;
        }
        self.archived = true;
        true
    }
}

/// Bill management operations
#[async_trait]
pub trait BillOperations: Send + Sync {
    async fn create_bill(
        &self,
        customer_id: &CustomerId,
        readings: ValidatedReadings,
    ) -> Result<Bill>;

    async fn get_bill(&self, bill_id: &BillId) -> Result<Bill>;

    async fn archive_bill(&self, bill_id: &BillId) -> Result<Bill>;

    async fn override_status(&self, bill_id: &BillId, new_status: BillStatus) -> Result<Bill>;

    async fn customer_views(&self) -> Result<Vec<CustomerBillingView>>;

    async fn list_archived(&self) -> Result<Vec<Bill>>;
}

pub struct BillManager {
    tariff: TariffSchedule,
    bills: Arc<dyn BillRepository + Send + Sync>,
    credits: Arc<dyn CreditRepository + Send + Sync>,
}

impl BillManager {
    pub fn new(
        tariff: TariffSchedule,
        bills: Arc<dyn BillRepository + Send + Sync>,
        credits: Arc<dyn CreditRepository + Send + Sync>,
    ) -> Self {
        Self {
            tariff,
            bills,
            credits,
        }
    }

    async fn require_bill(&self, bill_id: &BillId) -> Result<Bill> {
        self.bills
            .get_bill(bill_id)
            .await?
            .ok_or_else(|| BillingError::BillNotFound {
                id: bill_id.to_string(),
            })
    }
}

#[async_trait]
impl BillOperations for BillManager {
    async fn create_bill(
        &self,
        customer_id: &CustomerId,
        readings: ValidatedReadings,
    ) -> Result<Bill> {
        let customer = self
            .credits
            .get_customer(customer_id)
            .await?
            .ok_or_else(|| BillingError::CustomerNotFound {
                id: customer_id.to_string(),
            })?;

        let totals = self.tariff.compute(
            readings.previous_reading,
            readings.current_reading,
            customer.is_senior,
            readings.penalty_applied,
        )?;

        let due_date = schedule::due_date_for(Utc::now().date_naive());
        let bill = Bill::new(&customer, readings, totals, due_date);

        self.bills.create_bill(&bill).await?;

        info!(
            "Created bill {} for customer {} ({} due {})",
            bill.id, customer.id, bill.amount_due, bill.due_date
        );

        Ok(bill)
    }

    async fn get_bill(&self, bill_id: &BillId) -> Result<Bill> {
        self.require_bill(bill_id).await
    }

    async fn archive_bill(&self, bill_id: &BillId) -> Result<Bill> {
        let mut bill = self.require_bill(bill_id).await?;

        // Idempotent: a second archive changes nothing and writes nothing.
        if bill.archive() {
            self.bills.set_archived(&bill.id, bill.version).await?;
            bill.version += 1;
            info!("Archived bill {}", bill.id);
        }

        Ok(bill)
    }

    async fn override_status(&self, bill_id: &BillId, new_status: BillStatus) -> Result<Bill> {
        let mut bill = self.require_bill(bill_id).await?;

        bill.override_status(new_status)?;
        self.bills
            .update_status(&bill.id, bill.status, bill.version)
            .await?;
        bill.version += 1;

        info!("Overrode bill {} status to {}", bill.id, new_status);

        Ok(bill)
    }

    async fn customer_views(&self) -> Result<Vec<CustomerBillingView>> {
        let bills = self.bills.list_bills().await?;
        let customers = self.credits.list_customers().await?;
        Ok(views::group_by_customer(&bills, &customers))
    }

    async fn list_archived(&self) -> Result<Vec<Bill>> {
        self.bills.list_archived().await
    }
}
