use crate::domain::bills::Bill;
use crate::domain::credits::Customer;
use crate::domain::types::{BillStatus, CustomerId, Money};
use serde::Serialize;
use std::collections::HashMap;

/// Per-customer rollup of active bills. Recomputed on every read, never
/// persisted.
#[derive(Debug, Clone, Serialize)]
pub struct CustomerBillingView {
    pub customer_id: CustomerId,
    pub customer_name: String,
    pub latest_bill: Bill,
    pub total_outstanding: Money,
    pub status: BillStatus,
    pub total_bills: usize,
}

/// Group a flat bill collection into per-customer views.
///
/// The customer slice supplies display names; the caller loads both
/// collections through the repository. Deterministic for a given input,
/// no I/O, no clock access.
pub fn group_by_customer(bills: &[Bill], customers: &[Customer]) -> Vec<CustomerBillingView> {
    let by_id: HashMap<CustomerId, &Customer> = customers.iter().map(|c| (c.id, c)).collect();

    let mut grouped: HashMap<CustomerId, Vec<&Bill>> = HashMap::new();
    for bill in bills.iter().filter(|b| !b.archived) {
        grouped.entry(bill.customer_id).or_default().push(bill);
    }

    let mut views: Vec<CustomerBillingView> = grouped
        .into_iter()
        .map(|(customer_id, mut group)| {
            group.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            let latest = group[0].clone();

            // Only bills still marked unpaid count toward the outstanding
            // total; partially paid and overdue do not contribute.
            let total_outstanding = group
                .iter()
                .filter(|b| b.status == BillStatus::Unpaid)
                .fold(Money::zero(), |acc, b| acc.add(b.amount_due));

            // A paid latest bill sitting on top of older unpaid bills reads
            // as partially paid at the customer level.
            let status = if total_outstanding.is_positive() && latest.status == BillStatus::Paid {
                BillStatus::PartiallyPaid
            } else {
                latest.status
            };

            let customer_name = by_id
                .get(&customer_id)
                .map(|c| c.display_name())
                .unwrap_or_default();

            CustomerBillingView {
                customer_id,
                customer_name,
                total_bills: group.len(),
                latest_bill: latest,
                total_outstanding,
                status,
            }
        })
        .collect();

    views.sort_by(|a, b| {
        a.customer_name
            .to_lowercase()
            .cmp(&b.customer_name.to_lowercase())
    });

    views
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::inputs::ValidatedReadings;
    use crate::domain::tariff::TariffSchedule;
    use chrono::{Duration, NaiveDate, Utc};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use waterline_common::MeterNumber;

    fn customer(first: &str, last: &str, meter: &str) -> Customer {
        Customer::new(first, last, MeterNumber::new(meter).unwrap(), false)
    }

    fn bill_for(customer: &Customer, consumption: Decimal, age_hours: i64) -> Bill {
        let readings = ValidatedReadings {
            previous_reading: Decimal::ZERO,
            current_reading: consumption,
            penalty_applied: false,
        };
        let totals = TariffSchedule::default()
            .compute(Decimal::ZERO, consumption, false, false)
            .unwrap();
        let due_date = NaiveDate::from_ymd_opt(2024, 3, 20).unwrap();
        let mut bill = Bill::new(customer, readings, totals, due_date);
        bill.created_at = Utc::now() - Duration::hours(age_hours);
        bill
    }

    #[test]
    fn test_stale_paid_latest_reads_partially_paid() {
        let c = customer("Elena", "Reyes", "MTR-001");

        // Older unpaid bill worth 100, newer paid bill
        let older = bill_for(&c, dec!(2), 48);
        let mut newer = bill_for(&c, dec!(1), 1);
        newer.transition_to(BillStatus::Paid).unwrap();

        let views = group_by_customer(&[older, newer], &[c]);

        assert_eq!(views.len(), 1);
        let view = &views[0];
        assert_eq!(view.total_outstanding.as_decimal(), dec!(100));
        assert_eq!(view.latest_bill.status, BillStatus::Paid);
        assert_eq!(view.status, BillStatus::PartiallyPaid);
        assert_eq!(view.total_bills, 2);
    }

    #[test]
    fn test_partially_paid_bills_excluded_from_outstanding() {
        let c = customer("Elena", "Reyes", "MTR-001");

        let unpaid = bill_for(&c, dec!(2), 48);
        let mut partial = bill_for(&c, dec!(4), 24);
        partial.transition_to(BillStatus::PartiallyPaid).unwrap();

        let views = group_by_customer(&[unpaid, partial], &[c]);

        // Only the fully unpaid bill contributes
        assert_eq!(views[0].total_outstanding.as_decimal(), dec!(100));
    }

    #[test]
    fn test_archived_bills_excluded() {
        let c = customer("Elena", "Reyes", "MTR-001");

        let active = bill_for(&c, dec!(2), 24);
        let mut archived = bill_for(&c, dec!(6), 1);
        archived.archive();

        let views = group_by_customer(&[active.clone(), archived], &[c]);

        assert_eq!(views[0].total_bills, 1);
        assert_eq!(views[0].latest_bill.id, active.id);
    }

    #[test]
    fn test_customer_with_only_archived_bills_has_no_view() {
        let c = customer("Elena", "Reyes", "MTR-001");
        let mut bill = bill_for(&c, dec!(2), 1);
        bill.archive();

        let views = group_by_customer(&[bill], &[c]);
        assert!(views.is_empty());
    }

    #[test]
    fn test_output_sorted_by_display_name_case_insensitive() {
        let zabala = customer("Ana", "zabala", "MTR-001");
        let cruz = customer("Ben", "Cruz", "MTR-002");
        let abad = customer("Carla", "Abad", "MTR-003");

        let bills = vec![
            bill_for(&zabala, dec!(1), 1),
            bill_for(&cruz, dec!(1), 1),
            bill_for(&abad, dec!(1), 1),
        ];

        let views = group_by_customer(&bills, &[zabala, cruz, abad]);

        let names: Vec<&str> = views.iter().map(|v| v.customer_name.as_str()).collect();
        assert_eq!(names, vec!["Abad, Carla", "Cruz, Ben", "zabala, Ana"]);
    }

    #[test]
    fn test_latest_bill_is_newest_by_created_at() {
        let c = customer("Elena", "Reyes", "MTR-001");

        let oldest = bill_for(&c, dec!(1), 72);
        let newest = bill_for(&c, dec!(2), 1);
        let middle = bill_for(&c, dec!(3), 36);

        let views = group_by_customer(&[oldest, newest.clone(), middle], &[c]);

        assert_eq!(views[0].latest_bill.id, newest.id);
    }
}
