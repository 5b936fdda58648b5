//! End-to-end tests for the billing managers over the in-memory
//! repositories: bill creation, credit recording and application,
//! aggregation, archive semantics and conflict surfacing.

use pretty_assertions::assert_eq;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use waterline_billing::domain::bills::{BillManager, BillOperations};
use waterline_billing::domain::credits::{
    CreditTransaction, Customer, LedgerManager, LedgerOperations,
};
use waterline_billing::domain::inputs::{BillReadingsInput, ValidatedReadings};
use waterline_billing::domain::tariff::TariffSchedule;
use waterline_billing::domain::types::{BillStatus, Money};
use waterline_billing::error::BillingError;
use waterline_billing::storage::{
    BillRepository, CreditRepository, InMemoryBillRepository, InMemoryCreditRepository,
};
use waterline_common::MeterNumber;

struct TestContext {
    bills: Arc<InMemoryBillRepository>,
    credits: Arc<InMemoryCreditRepository>,
    bill_manager: BillManager,
    ledger: LedgerManager,
}

impl TestContext {
    fn new() -> Self {
        let bills = Arc::new(InMemoryBillRepository::new());
        let credits = Arc::new(InMemoryCreditRepository::new(bills.clone()));

        let bill_manager = BillManager::new(
            TariffSchedule::default(),
            bills.clone(),
            credits.clone(),
        );
        let ledger = LedgerManager::new(credits.clone(), bills.clone());

        Self {
            bills,
            credits,
            bill_manager,
            ledger,
        }
    }

    async fn seed_customer(&self, first: &str, last: &str, meter: &str, senior: bool) -> Customer {
        let customer = Customer::new(first, last, MeterNumber::new(meter).unwrap(), senior);
        self.credits.create_customer(&customer).await.unwrap();
        customer
    }

    fn readings(previous: Decimal, current: Decimal) -> ValidatedReadings {
        ValidatedReadings {
            previous_reading: previous,
            current_reading: current,
            penalty_applied: false,
        }
    }
}

#[tokio::test]
async fn test_create_bill_computes_amounts_and_due_date() {
    let ctx = TestContext::new();
    let customer = ctx.seed_customer("Elena", "Reyes", "MTR-001", false).await;

    let bill = ctx
        .bill_manager
        .create_bill(&customer.id, TestContext::readings(dec!(100), dec!(120)))
        .await
        .unwrap();

    assert_eq!(bill.consumption, dec!(20));
    assert_eq!(bill.amount_due.as_decimal(), dec!(1000));
    assert_eq!(bill.status, BillStatus::Unpaid);
    assert!(!bill.archived);

    // Due dates never land on a weekend
    let weekday = bill.due_date.format("%a").to_string();
    assert_ne!(weekday, "Sat");
    assert_ne!(weekday, "Sun");
}

#[tokio::test]
async fn test_create_bill_applies_senior_discount() {
    let ctx = TestContext::new();
    let customer = ctx.seed_customer("Ramon", "Santos", "MTR-002", true).await;

    let bill = ctx
        .bill_manager
        .create_bill(&customer.id, TestContext::readings(dec!(0), dec!(30)))
        .await
        .unwrap();

    assert_eq!(bill.base_amount.as_decimal(), dec!(1500));
    assert_eq!(bill.senior_discount.as_decimal(), dec!(300));
    assert_eq!(bill.amount_due.as_decimal(), dec!(1200));
}

#[tokio::test]
async fn test_validated_form_input_feeds_bill_creation() {
    let ctx = TestContext::new();
    let customer = ctx.seed_customer("Elena", "Reyes", "MTR-001", false).await;

    // String-or-number fields, the way form payloads arrive
    let input: BillReadingsInput = serde_json::from_value(serde_json::json!({
        "previous_reading": "100",
        "current_reading": 120,
        "penalty_applied": true,
    }))
    .unwrap();

    let bill = ctx
        .bill_manager
        .create_bill(&customer.id, input.validate().unwrap())
        .await
        .unwrap();

    assert_eq!(bill.base_amount.as_decimal(), dec!(1000));
    assert_eq!(bill.penalty_amount.as_decimal(), dec!(100));
    assert_eq!(bill.amount_due.as_decimal(), dec!(1100));
}

#[tokio::test]
async fn test_partial_credit_application() {
    let ctx = TestContext::new();
    let customer = ctx.seed_customer("Elena", "Reyes", "MTR-001", false).await;

    // Balance 50 against a bill of 80
    ctx.ledger
        .record_credit(&customer.id, Money::from_decimal(dec!(50)), "prepayment")
        .await
        .unwrap();

    let bill = ctx
        .bill_manager
        .create_bill(&customer.id, TestContext::readings(dec!(0), dec!(1.6)))
        .await
        .unwrap();
    assert_eq!(bill.amount_due.as_decimal(), dec!(80));

    let outcome = ctx
        .ledger
        .apply_credit_to_bill(&customer.id, &bill.id)
        .await
        .unwrap();

    assert_eq!(outcome.amount_applied.as_decimal(), dec!(50));
    assert_eq!(outcome.remaining_due.as_decimal(), dec!(30));
    assert_eq!(outcome.new_status, BillStatus::PartiallyPaid);

    // Credit fully consumed, bill status persisted
    assert_eq!(ctx.ledger.balance(&customer.id).await.unwrap(), Money::zero());
    let stored = ctx.bill_manager.get_bill(&bill.id).await.unwrap();
    assert_eq!(stored.status, BillStatus::PartiallyPaid);
}

#[tokio::test]
async fn test_full_credit_application_pays_bill() {
    let ctx = TestContext::new();
    let customer = ctx.seed_customer("Elena", "Reyes", "MTR-001", false).await;

    ctx.ledger
        .record_credit(&customer.id, Money::from_decimal(dec!(500)), "prepayment")
        .await
        .unwrap();

    let bill = ctx
        .bill_manager
        .create_bill(&customer.id, TestContext::readings(dec!(0), dec!(2)))
        .await
        .unwrap();
    assert_eq!(bill.amount_due.as_decimal(), dec!(100));

    let outcome = ctx
        .ledger
        .apply_credit_to_bill(&customer.id, &bill.id)
        .await
        .unwrap();

    assert_eq!(outcome.amount_applied.as_decimal(), dec!(100));
    assert_eq!(outcome.remaining_due, Money::zero());
    assert_eq!(outcome.new_status, BillStatus::Paid);

    assert_eq!(
        ctx.ledger.balance(&customer.id).await.unwrap().as_decimal(),
        dec!(400)
    );
}

#[tokio::test]
async fn test_zero_balance_leaves_bill_untouched() {
    let ctx = TestContext::new();
    let customer = ctx.seed_customer("Elena", "Reyes", "MTR-001", false).await;

    let bill = ctx
        .bill_manager
        .create_bill(&customer.id, TestContext::readings(dec!(0), dec!(2)))
        .await
        .unwrap();

    let outcome = ctx
        .ledger
        .apply_credit_to_bill(&customer.id, &bill.id)
        .await
        .unwrap();

    assert_eq!(outcome.amount_applied, Money::zero());
    assert_eq!(outcome.remaining_due.as_decimal(), dec!(100));
    assert_eq!(outcome.new_status, BillStatus::Unpaid);

    // No ledger entry was written
    assert!(ctx.ledger.history(&customer.id, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_record_credit_rejects_non_positive_amounts() {
    let ctx = TestContext::new();
    let customer = ctx.seed_customer("Elena", "Reyes", "MTR-001", false).await;

    let err = ctx
        .ledger
        .record_credit(&customer.id, Money::zero(), "nothing")
        .await
        .unwrap_err();
    assert!(matches!(err, BillingError::InvalidAmount { .. }));

    assert_eq!(ctx.ledger.balance(&customer.id).await.unwrap(), Money::zero());
}

#[tokio::test]
async fn test_balance_equals_running_sum_of_ledger() {
    let ctx = TestContext::new();
    let customer = ctx.seed_customer("Elena", "Reyes", "MTR-001", false).await;

    ctx.ledger
        .record_credit(&customer.id, Money::from_decimal(dec!(100)), "prepayment")
        .await
        .unwrap();

    let first = ctx
        .bill_manager
        .create_bill(&customer.id, TestContext::readings(dec!(0), dec!(1.6)))
        .await
        .unwrap();
    ctx.ledger
        .apply_credit_to_bill(&customer.id, &first.id)
        .await
        .unwrap();

    ctx.ledger
        .record_credit(&customer.id, Money::from_decimal(dec!(35)), "counter payment")
        .await
        .unwrap();

    let second = ctx
        .bill_manager
        .create_bill(&customer.id, TestContext::readings(dec!(0), dec!(3)))
        .await
        .unwrap();
    ctx.ledger
        .apply_credit_to_bill(&customer.id, &second.id)
        .await
        .unwrap();

    let history = ctx.ledger.history(&customer.id, None).await.unwrap();
    let running_sum: Decimal = history.iter().map(|t| t.amount).sum();
    let balance = ctx.ledger.balance(&customer.id).await.unwrap();

    assert_eq!(balance.as_decimal(), running_sum);
    // 100 - 80 + 35 - 55 (clamped to the remaining balance)
    assert_eq!(balance, Money::zero());
    assert_eq!(history.len(), 4);
}

#[tokio::test]
async fn test_stale_version_surfaces_concurrency_conflict() {
    let ctx = TestContext::new();
    let customer = ctx.seed_customer("Elena", "Reyes", "MTR-001", false).await;

    // A first write moves the version
    ctx.ledger
        .record_credit(&customer.id, Money::from_decimal(dec!(10)), "prepayment")
        .await
        .unwrap();

    // A writer holding the stale version loses its optimistic check
    let stale = CreditTransaction::credit(customer.id, Money::from_decimal(dec!(10)), "race");
    let err = ctx
        .credits
        .append_credit(&stale, customer.version)
        .await
        .unwrap_err();
    assert!(matches!(err, BillingError::ConcurrencyConflict { .. }));

    // The conflicting entry never landed
    assert_eq!(ctx.ledger.history(&customer.id, None).await.unwrap().len(), 1);
    assert_eq!(
        ctx.ledger.balance(&customer.id).await.unwrap().as_decimal(),
        dec!(10)
    );
}

#[tokio::test]
async fn test_apply_credit_to_archived_bill_conflicts() {
    let ctx = TestContext::new();
    let customer = ctx.seed_customer("Elena", "Reyes", "MTR-001", false).await;

    ctx.ledger
        .record_credit(&customer.id, Money::from_decimal(dec!(100)), "prepayment")
        .await
        .unwrap();

    let bill = ctx
        .bill_manager
        .create_bill(&customer.id, TestContext::readings(dec!(0), dec!(2)))
        .await
        .unwrap();
    ctx.bill_manager.archive_bill(&bill.id).await.unwrap();

    let err = ctx
        .ledger
        .apply_credit_to_bill(&customer.id, &bill.id)
        .await
        .unwrap_err();
    assert!(matches!(err, BillingError::StateConflict { .. }));

    // Balance untouched
    assert_eq!(
        ctx.ledger.balance(&customer.id).await.unwrap().as_decimal(),
        dec!(100)
    );
}

#[tokio::test]
async fn test_archive_is_idempotent_with_no_duplicate_writes() {
    let ctx = TestContext::new();
    let customer = ctx.seed_customer("Elena", "Reyes", "MTR-001", false).await;

    let bill = ctx
        .bill_manager
        .create_bill(&customer.id, TestContext::readings(dec!(0), dec!(2)))
        .await
        .unwrap();

    let first = ctx.bill_manager.archive_bill(&bill.id).await.unwrap();
    assert!(first.archived);

    let second = ctx.bill_manager.archive_bill(&bill.id).await.unwrap();
    assert!(second.archived);
    // No second write happened: the version did not move again
    assert_eq!(second.version, first.version);

    assert_eq!(ctx.bill_manager.list_archived().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_override_status_persists_and_respects_archive() {
    let ctx = TestContext::new();
    let customer = ctx.seed_customer("Elena", "Reyes", "MTR-001", false).await;

    let bill = ctx
        .bill_manager
        .create_bill(&customer.id, TestContext::readings(dec!(0), dec!(2)))
        .await
        .unwrap();

    let overridden = ctx
        .bill_manager
        .override_status(&bill.id, BillStatus::Paid)
        .await
        .unwrap();
    assert_eq!(overridden.status, BillStatus::Paid);

    let stored = ctx.bill_manager.get_bill(&bill.id).await.unwrap();
    assert_eq!(stored.status, BillStatus::Paid);

    ctx.bill_manager.archive_bill(&bill.id).await.unwrap();
    let err = ctx
        .bill_manager
        .override_status(&bill.id, BillStatus::Unpaid)
        .await
        .unwrap_err();
    assert!(matches!(err, BillingError::StateConflict { .. }));
}

#[tokio::test]
async fn test_customer_views_aggregate_and_sort() {
    let ctx = TestContext::new();
    let reyes = ctx.seed_customer("Elena", "Reyes", "MTR-001", false).await;
    let cruz = ctx.seed_customer("Ben", "Cruz", "MTR-002", false).await;

    // Reyes: an older unpaid bill, then a newer bill paid in full
    let older = ctx
        .bill_manager
        .create_bill(&reyes.id, TestContext::readings(dec!(0), dec!(2)))
        .await
        .unwrap();
    assert_eq!(older.amount_due.as_decimal(), dec!(100));

    ctx.ledger
        .record_credit(&reyes.id, Money::from_decimal(dec!(80)), "prepayment")
        .await
        .unwrap();
    let newer = ctx
        .bill_manager
        .create_bill(&reyes.id, TestContext::readings(dec!(0), dec!(1.6)))
        .await
        .unwrap();
    ctx.ledger
        .apply_credit_to_bill(&reyes.id, &newer.id)
        .await
        .unwrap();

    // Cruz: one unpaid bill
    ctx.bill_manager
        .create_bill(&cruz.id, TestContext::readings(dec!(0), dec!(4)))
        .await
        .unwrap();

    let views = ctx.bill_manager.customer_views().await.unwrap();
    assert_eq!(views.len(), 2);

    // Sorted by "Last, First"
    assert_eq!(views[0].customer_name, "Cruz, Ben");
    assert_eq!(views[1].customer_name, "Reyes, Elena");

    // The paid latest bill on top of an older unpaid one reads partially paid
    let reyes_view = &views[1];
    assert_eq!(reyes_view.latest_bill.id, newer.id);
    assert_eq!(reyes_view.latest_bill.status, BillStatus::Paid);
    assert_eq!(reyes_view.total_outstanding.as_decimal(), dec!(100));
    assert_eq!(reyes_view.status, BillStatus::PartiallyPaid);
    assert_eq!(reyes_view.total_bills, 2);
}

#[tokio::test]
async fn test_list_by_customer_returns_newest_first() {
    let ctx = TestContext::new();
    let customer = ctx.seed_customer("Elena", "Reyes", "MTR-001", false).await;

    let first = ctx
        .bill_manager
        .create_bill(&customer.id, TestContext::readings(dec!(0), dec!(1)))
        .await
        .unwrap();
    let second = ctx
        .bill_manager
        .create_bill(&customer.id, TestContext::readings(dec!(1), dec!(3)))
        .await
        .unwrap();

    let bills = ctx.bills.list_by_customer(&customer.id).await.unwrap();
    assert_eq!(bills.len(), 2);
    assert_eq!(bills[0].id, second.id);
    assert_eq!(bills[1].id, first.id);
}
