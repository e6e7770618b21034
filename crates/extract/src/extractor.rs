use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use tally_core::{SourceKind, Transaction};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Statement has no readable content")]
    EmptyContent,
    #[error("Could not read statement: {0}")]
    Source(String),
    #[error("Extraction service unavailable: {0}")]
    Unavailable(String),
    #[error("Extraction request timed out")]
    Timeout,
    #[error("Extraction service returned HTTP {status}: {body}")]
    Api { status: u16, body: String },
    #[error("Malformed extraction output: {0}")]
    Malformed(String),
}

/// Raw statement text handed to the extractor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatementContent {
    pub kind: SourceKind,
    pub text: String,
}

impl StatementContent {
    pub fn new(kind: SourceKind, text: impl Into<String>) -> Self {
        Self { kind, text: text.into() }
    }

    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Turns statement content into an ordered transaction list.
/// Order is extraction order, not necessarily chronological.
#[async_trait]
pub trait TransactionExtractor: Send + Sync {
    async fn extract(&self, content: &StatementContent) -> Result<Vec<Transaction>, ExtractError>;
}

// ── Mock extractor (always available, used for tests) ─────────────────────────

/// Returns a preset transaction list (or a preset failure) and counts calls.
pub struct MockExtractor {
    transactions: Vec<Transaction>,
    failure: Option<String>,
    calls: AtomicUsize,
}

impl MockExtractor {
    pub fn new(transactions: Vec<Transaction>) -> Self {
        Self { transactions, failure: None, calls: AtomicUsize::new(0) }
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self { transactions: Vec::new(), failure: Some(message.into()), calls: AtomicUsize::new(0) }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransactionExtractor for MockExtractor {
    async fn extract(&self, _content: &StatementContent) -> Result<Vec<Transaction>, ExtractError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.failure {
            Some(message) => Err(ExtractError::Unavailable(message.clone())),
            None => Ok(self.transactions.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tally_core::Money;

    fn content() -> StatementContent {
        StatementContent::new(SourceKind::PdfOcr, "03.03.2025 ACME -50.00")
    }

    #[tokio::test]
    async fn mock_returns_preset_transactions() {
        let tx = Transaction {
            date: NaiveDate::from_ymd_opt(2025, 3, 3).unwrap(),
            amount: Money::from_cents(-5000),
            counterparty: "ACME".to_string(),
            description: String::new(),
            raw_reference: None,
        };
        let mock = MockExtractor::new(vec![tx.clone()]);
        assert_eq!(mock.extract(&content()).await.unwrap(), vec![tx]);
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn failing_mock_still_counts() {
        let mock = MockExtractor::failing("quota");
        assert!(matches!(mock.extract(&content()).await, Err(ExtractError::Unavailable(_))));
        assert_eq!(mock.call_count(), 1);
    }

    #[test]
    fn blank_content() {
        assert!(StatementContent::new(SourceKind::PdfOcr, " \n\t").is_blank());
        assert!(!content().is_blank());
    }
}
