pub mod bills;
pub mod credits;
pub mod db;
pub mod memory;

pub use bills::{BillRepository, SqlBillRepository};

pub use credits::{CreditRepository, SqlCreditRepository};

pub use db::DatabasePool;

pub use memory::{InMemoryBillRepository, InMemoryCreditRepository};
