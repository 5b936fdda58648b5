//! In-memory repository implementations for development and testing.
//!
//! The write-lock scope stands in for the database transaction: every
//! mutation happens under one guard, so the version checks observe the
//! same serialized view the SQL implementations get from the per-customer
//! advisory lock.

use crate::domain::bills::Bill;
use crate::domain::credits::{CreditTransaction, Customer};
use crate::domain::types::{BillId, BillStatus, CustomerId, Money};
use crate::error::{BillingError, Result};
use crate::storage::bills::BillRepository;
use crate::storage::credits::CreditRepository;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
pub struct InMemoryBillRepository {
    bills: RwLock<HashMap<BillId, Bill>>,
}

impl InMemoryBillRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BillRepository for InMemoryBillRepository {
    async fn create_bill(&self, bill: &Bill) -> Result<()> {
        let mut bills = self.bills.write().await;
        bills.insert(bill.id, bill.clone());
        Ok(())
    }

    async fn get_bill(&self, id: &BillId) -> Result<Option<Bill>> {
        let bills = self.bills.read().await;
        Ok(bills.get(id).cloned())
    }

    async fn list_bills(&self) -> Result<Vec<Bill>> {
        let bills = self.bills.read().await;
        Ok(bills.values().cloned().collect())
    }

    async fn list_by_customer(&self, customer_id: &CustomerId) -> Result<Vec<Bill>> {
        let bills = self.bills.read().await;
        let mut result: Vec<Bill> = bills
            .values()
            .filter(|b| b.customer_id == *customer_id)
            .cloned()
            .collect();
        result.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(result)
    }

    async fn list_archived(&self) -> Result<Vec<Bill>> {
        let bills = self.bills.read().await;
        let mut result: Vec<Bill> = bills.values().filter(|b| b.archived).cloned().collect();
        result.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(result)
    }

    async fn update_status(
        &self,
        id: &BillId,
        status: BillStatus,
        expected_version: i64,
    ) -> Result<()> {
        let mut bills = self.bills.write().await;
        let bill = bills.get_mut(id);
        match bill {
            Some(b) if b.version == expected_version && !b.archived => {
                b.status = status;
                b.version += 1;
                Ok(())
            }
            _ => Err(BillingError::StateConflict {
                entity: "bill".to_string(),
                id: id.to_string(),
            }),
        }
    }

    async fn set_archived(&self, id: &BillId, expected_version: i64) -> Result<()> {
        let mut bills = self.bills.write().await;
        let bill = bills.get_mut(id);
        match bill {
            Some(b) if b.version == expected_version && !b.archived => {
                b.archived = true;
                b.version += 1;
                Ok(())
            }
            _ => Err(BillingError::StateConflict {
                entity: "bill".to_string(),
                id: id.to_string(),
            }),
        }
    }
}

pub struct InMemoryCreditRepository {
    customers: RwLock<HashMap<CustomerId, Customer>>,
    transactions: RwLock<Vec<CreditTransaction>>,
    bills: Arc<InMemoryBillRepository>,
}

impl InMemoryCreditRepository {
    /// The bill store is shared so debit application can move the linked
    /// bill's status the way the SQL transaction does.
    pub fn new(bills: Arc<InMemoryBillRepository>) -> Self {
        Self {
            customers: RwLock::new(HashMap::new()),
            transactions: RwLock::new(Vec::new()),
            bills,
        }
    }
}

#[async_trait]
impl CreditRepository for InMemoryCreditRepository {
    async fn get_customer(&self, id: &CustomerId) -> Result<Option<Customer>> {
        let customers = self.customers.read().await;
        Ok(customers.get(id).cloned())
    }

    async fn create_customer(&self, customer: &Customer) -> Result<()> {
        let mut customers = self.customers.write().await;
        customers.insert(customer.id, customer.clone());
        Ok(())
    }

    async fn list_customers(&self) -> Result<Vec<Customer>> {
        let customers = self.customers.read().await;
        Ok(customers.values().cloned().collect())
    }

    async fn append_credit(&self, entry: &CreditTransaction, expected_version: i64) -> Result<()> {
        let mut customers = self.customers.write().await;
        let customer = customers.get_mut(&entry.customer_id).ok_or_else(|| {
            BillingError::CustomerNotFound {
                id: entry.customer_id.to_string(),
            }
        })?;

        if customer.version != expected_version {
            return Err(BillingError::ConcurrencyConflict {
                customer_id: entry.customer_id.to_string(),
            });
        }

        customer.apply_credit(Money::from_decimal(entry.amount));
        customer.version += 1;

        self.transactions.write().await.push(entry.clone());
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

        let mut customers = self.customers.write().await;
        let customer = customers.get_mut(&entry.customer_id).ok_or_else(|| {
            BillingError::CustomerNotFound {
                id: entry.customer_id.to_string(),
            }
        })?;

        if customer.version != expected_customer_version {
            return Err(BillingError::ConcurrencyConflict {
                customer_id: entry.customer_id.to_string(),
            });
        }

        let mut bills = self.bills.bills.write().await;
        let bill = match bills.get_mut(&bill_id) {
            Some(b) if b.version == expected_bill_version && !b.archived => b,
            _ => {
                return Err(BillingError::StateConflict {
                    entity: "bill".to_string(),
                    id: bill_id.to_string(),
                })
            }
        };

        // Debit amounts are negative. The balance check runs before either
        // record mutates, so a failure leaves no partial state.
        customer.consume_credit(Money::from_decimal(-entry.amount))?;
        customer.version += 1;

        bill.status = new_status;
        bill.version += 1;

        self.transactions.write().await.push(entry.clone());
        Ok(())
    }

    async fn history(
        &self,
        customer_id: &CustomerId,
        limit: Option<i64>,
    ) -> Result<Vec<CreditTransaction>> {
        let transactions = self.transactions.read().await;
        let mut result: Vec<CreditTransaction> = transactions
            .iter()
            .filter(|t| t.customer_id == *customer_id)
            .cloned()
            .collect();
        result.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        result.truncate(limit.unwrap_or(100).max(0) as usize);
        Ok(result)
    }
}
