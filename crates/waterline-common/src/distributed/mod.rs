pub mod postgres_lock;

pub use postgres_lock::{acquire_xact_lock, LockError, LockKey};
