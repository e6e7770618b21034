pub mod extractor;
pub mod openai;
pub mod source;

pub use extractor::{ExtractError, MockExtractor, StatementContent, TransactionExtractor};
pub use openai::{parse_transactions, OpenAiExtractor};
pub use source::{flatten_delimited, FixedSource, StatementSource};
