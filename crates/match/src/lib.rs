pub mod index;
pub mod matcher;
pub mod reference;
pub(crate) mod util;

pub use index::{Candidate, DocumentIndex, InMemoryIndex, IndexError, IndexedDocument, SearchQuery};
pub use matcher::{
    AmountOnlyTier, CounterpartyAmountTier, MatchContext, MatchTier, MatchWindows, Matcher,
    ReferenceTier,
};
pub use reference::extract_references;
