use rust_decimal::Decimal;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, BillingError>;

/// Error taxonomy for the billing engine.
///
/// Every variant is recoverable; callers decide whether to surface,
/// re-read, or retry. The engine itself never retries.
#[derive(Debug, Error)]
pub enum BillingError {
    #[error("Validation failed for {field}: {message}")]
    ValidationError { field: String, message: String },

    #[error("Invalid credit amount: {amount}")]
    InvalidAmount { amount: Decimal },

    #[error("Invalid status transition from {from} to {to}")]
    InvalidStatusTransition { from: String, to: String },

    #[error("{entity} {id} was modified concurrently")]
    StateConflict { entity: String, id: String },

    #[error("Credit balance for customer {customer_id} was modified concurrently")]
    ConcurrencyConflict { customer_id: String },

    #[error("Customer not found: {id}")]
    CustomerNotFound { id: String },

    #[error("Bill not found: {id}")]
    BillNotFound { id: String },

    #[error("Insufficient credit: available {available}, required {required}")]
    InsufficientCredit {
        available: Decimal,
        required: Decimal,
    },

    #[error("Database error during {operation}")]
    DatabaseError {
        operation: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}
