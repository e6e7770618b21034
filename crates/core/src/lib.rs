pub mod money;
pub mod period;
pub mod result;
pub mod transaction;

pub use money::Money;
pub use period::{DateRange, Period, PeriodError};
pub use result::{MatchResult, MatchStatus, MatchVia};
pub use transaction::{DocumentId, SourceKind, Statement, TagId, Transaction};
