pub mod bills;
pub mod credits;
pub mod inputs;
pub mod schedule;
pub mod tariff;
pub mod types;
pub mod views;

pub use bills::{Bill, BillManager, BillOperations};
pub use credits::{
    ApplyCreditOutcome, CreditTransaction, Customer, LedgerManager, LedgerOperations,
};
pub use tariff::{BillTotals, TariffSchedule};
pub use types::{BillId, BillStatus, CreditTransactionType, CustomerId, Money, TransactionId};
pub use views::{group_by_customer, CustomerBillingView};
