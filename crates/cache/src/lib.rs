pub mod reconcile;
pub mod record;
pub mod store;

pub use reconcile::{ReconcileOutcome, Reconciler, StatementRun};
pub use record::{CacheEntry, PeriodRecord};
pub use store::{CacheError, CacheStore};
