use sqlx::PgConnection;
use std::fmt;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum LockError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// A unique key identifying a specific advisory lock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LockKey(i64);

impl LockKey {
    pub const fn new(key: i64) -> Self {
        Self(key)
    }

    /// Key scoping ledger writes to a single customer.
    ///
    /// Folds the UUID down to 64 bits; a collision only widens the lock
    /// scope, it never narrows it.
    pub fn for_customer(customer_id: Uuid) -> Self {
        let n = customer_id.as_u128();
        Self((n as i64) ^ ((n >> 64) as i64))
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for LockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016X}", self.0)
    }
}

/// Take a transaction-scoped PostgreSQL advisory lock.
///
/// Blocks until the lock is granted. PostgreSQL releases the lock
/// automatically when the surrounding transaction commits or rolls back,
/// so there is no guard to hold or release (crash safety included).
pub async fn acquire_xact_lock(conn: &mut PgConnection, key: LockKey) -> Result<(), LockError> {
    debug!("Acquiring advisory xact lock {}", key);

    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(key.value())
        .execute(&mut *conn)
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_key_for_customer_is_deterministic() {
        let id = Uuid::new_v4();
        assert_eq!(LockKey::for_customer(id), LockKey::for_customer(id));
    }

    #[test]
    fn test_lock_key_for_customer_distinguishes_customers() {
        let a = LockKey::for_customer(Uuid::new_v4());
        let b = LockKey::for_customer(Uuid::new_v4());
        assert_ne!(a, b);
    }

    #[test]
    fn test_lock_key_display() {
        let key = LockKey::new(0x00B1_77A0_0001);
        assert_eq!(key.to_string(), "0x000000B177A00001");
        assert_eq!(key.value(), 0x00B1_77A0_0001);
    }
}
