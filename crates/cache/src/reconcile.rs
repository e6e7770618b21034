use tally_core::{DocumentId, MatchResult, Period, Statement, Transaction};
use tally_extract::{ExtractError, StatementSource, TransactionExtractor};
use tally_match::Matcher;
use tracing::{debug, info, warn};

use crate::record::{CacheEntry, PeriodRecord};
use crate::store::{CacheError, CacheStore};

/// Counts from one reconciliation pass over a statement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// Matched on an earlier run and skipped without querying.
    pub already_matched: usize,
    pub newly_matched: usize,
    pub still_unmatched: usize,
    /// Slots left `NotFound` because the index could not be queried.
    pub lookup_failures: usize,
}

/// Result of processing one statement end to end.
#[derive(Debug, Clone)]
pub struct StatementRun {
    pub document_id: DocumentId,
    pub title: String,
    /// Whether the extractor ran for this statement on this run.
    pub extracted: bool,
    pub outcome: ReconcileOutcome,
    /// Final results, parallel to the cached transactions.
    pub results: Vec<MatchResult>,
    /// Whether the updated record reached disk.
    pub persisted: bool,
}

/// Drives extraction and matching for a month, keeping the cache record
/// current. Extraction runs at most once per statement; slots only move
/// from `NotFound` to `Matched`.
pub struct Reconciler<'a> {
    store: &'a CacheStore,
    source: &'a dyn StatementSource,
    extractor: &'a dyn TransactionExtractor,
    matcher: &'a Matcher<'a>,
}

impl<'a> Reconciler<'a> {
    pub fn new(
        store: &'a CacheStore,
        source: &'a dyn StatementSource,
        extractor: &'a dyn TransactionExtractor,
        matcher: &'a Matcher<'a>,
    ) -> Self {
        Self { store, source, extractor, matcher }
    }

    /// The persisted record for `period`, or a fresh empty one.
    pub async fn load(&self, period: Period) -> Result<PeriodRecord, CacheError> {
        Ok(self
            .store
            .load(period)
            .await?
            .unwrap_or_else(|| PeriodRecord::new(period)))
    }

    /// Cached transactions for `statement`, extracting them first if the
    /// record has none. A fresh extraction is persisted immediately; a failed
    /// one leaves the record untouched.
    pub async fn get_or_extract(
        &self,
        record: &mut PeriodRecord,
        statement: &Statement,
    ) -> Result<Vec<Transaction>, ExtractError> {
        if let Some(entry) = record.entry(statement.document_id) {
            info!(document = %statement.document_id, count = entry.len(), "using cached transactions");
            return Ok(entry.transactions().to_vec());
        }

        let content = self.source.fetch(statement).await?;
        if content.is_blank() {
            return Err(ExtractError::EmptyContent);
        }
        info!(document = %statement.document_id, kind = %content.kind, "extracting transactions");
        let transactions = self.extractor.extract(&content).await?;
        info!(document = %statement.document_id, count = transactions.len(), "transactions extracted");

        record.insert(statement.document_id, CacheEntry::new(statement, transactions.clone()));
        if let Err(e) = self.store.persist(record).await {
            warn!(document = %statement.document_id, error = %e, "could not persist extracted transactions");
        }
        Ok(transactions)
    }

    /// Match every `NotFound` slot of `entry`. Matched slots are never
    /// queried again. Lookup failures leave the slot for the next run.
    pub async fn reconcile(&self, entry: &mut CacheEntry) -> ReconcileOutcome {
        let mut outcome = ReconcileOutcome::default();

        for index in 0..entry.len() {
            if entry.results()[index].is_matched() {
                outcome.already_matched += 1;
                continue;
            }

            let lookup = self
                .matcher
                .match_transaction(&entry.transactions()[index])
                .await;
            match lookup {
                Ok(result) if result.is_matched() => {
                    if entry.record_match(index, result) {
                        outcome.newly_matched += 1;
                    }
                }
                Ok(_) => {
                    debug!(index, "no document found");
                    outcome.still_unmatched += 1;
                }
                Err(e) => {
                    warn!(index, error = %e, "document lookup failed, will retry on next run");
                    outcome.lookup_failures += 1;
                    outcome.still_unmatched += 1;
                }
            }
        }

        outcome
    }

    /// Extract (if needed), reconcile and persist one statement.
    ///
    /// Only an extraction failure is returned as an error; a persistence
    /// failure is logged and reported through [`StatementRun::persisted`].
    pub async fn run_statement(
        &self,
        record: &mut PeriodRecord,
        statement: &Statement,
    ) -> Result<StatementRun, ExtractError> {
        let extracted = !record.contains(statement.document_id);
        self.get_or_extract(record, statement).await?;

        let (outcome, results) = match record.entry_mut(statement.document_id) {
            Some(entry) => {
                let outcome = self.reconcile(entry).await;
                (outcome, entry.results().to_vec())
            }
            None => (ReconcileOutcome::default(), Vec::new()),
        };

        let persisted = match self.store.persist(record).await {
            Ok(()) => true,
            Err(e) => {
                warn!(document = %statement.document_id, error = %e, "could not persist reconciliation results");
                false
            }
        };

        Ok(StatementRun {
            document_id: statement.document_id,
            title: statement.title.clone(),
            extracted,
            outcome,
            results,
            persisted,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tally_core::{Money, SourceKind, TagId};
    use tally_extract::{FixedSource, MockExtractor};
    use tally_match::{InMemoryIndex, IndexedDocument};

    const STATEMENT_TAG: TagId = TagId(9);

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, d).unwrap()
    }

    fn tx(d: u32, cents: i64, counterparty: &str) -> Transaction {
        Transaction {
            date: date(d),
            amount: Money::from_cents(cents),
            counterparty: counterparty.to_string(),
            description: String::new(),
            raw_reference: None,
        }
    }

    fn statement() -> Statement {
        Statement {
            document_id: DocumentId(100),
            title: "March statement".to_string(),
            period: Period::new(2025, 3).unwrap(),
            source_kind: SourceKind::PdfOcr,
            original_file_name: None,
        }
    }

    #[tokio::test]
    async fn extraction_failure_leaves_no_entry() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path());
        let source = FixedSource::new("text");
        let extractor = MockExtractor::failing("down");
        let index = InMemoryIndex::new(vec![]);
        let matcher = Matcher::new(&index, STATEMENT_TAG);
        let reconciler = Reconciler::new(&store, &source, &extractor, &matcher);

        let mut record = reconciler.load(Period::new(2025, 3).unwrap()).await.unwrap();
        assert!(reconciler.run_statement(&mut record, &statement()).await.is_err());
        assert!(!record.contains(DocumentId(100)));
        assert!(store.load(Period::new(2025, 3).unwrap()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn blank_content_is_not_extracted() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path());
        let source = FixedSource::new("   ");
        let extractor = MockExtractor::new(vec![tx(3, -100, "X")]);
        let index = InMemoryIndex::new(vec![]);
        let matcher = Matcher::new(&index, STATEMENT_TAG);
        let reconciler = Reconciler::new(&store, &source, &extractor, &matcher);

        let mut record = PeriodRecord::new(Period::new(2025, 3).unwrap());
        let err = reconciler.get_or_extract(&mut record, &statement()).await.unwrap_err();
        assert!(matches!(err, ExtractError::EmptyContent));
        assert_eq!(extractor.call_count(), 0);
    }

    #[tokio::test]
    async fn cached_transactions_skip_source_and_extractor() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path());
        let source = FixedSource::new("text");
        let extractor = MockExtractor::new(vec![tx(3, -100, "X")]);
        let index = InMemoryIndex::new(vec![]);
        let matcher = Matcher::new(&index, STATEMENT_TAG);
        let reconciler = Reconciler::new(&store, &source, &extractor, &matcher);

        let mut record = PeriodRecord::new(Period::new(2025, 3).unwrap());
        let first = reconciler.get_or_extract(&mut record, &statement()).await.unwrap();
        let second = reconciler.get_or_extract(&mut record, &statement()).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(extractor.call_count(), 1);
        assert_eq!(source.fetch_count(), 1);
        // Persisted right after extraction, before any matching.
        assert!(store.load(Period::new(2025, 3).unwrap()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn matched_slots_are_not_queried_again() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path());
        let source = FixedSource::new("text");
        let extractor = MockExtractor::new(vec![tx(3, -5000, "")]);
        let index = InMemoryIndex::new(vec![IndexedDocument::new(7, "Receipt")
            .amount(Money::from_cents(5000))
            .date(date(4))]);
        let matcher = Matcher::new(&index, STATEMENT_TAG);
        let reconciler = Reconciler::new(&store, &source, &extractor, &matcher);

        let mut record = PeriodRecord::new(Period::new(2025, 3).unwrap());
        let run = reconciler.run_statement(&mut record, &statement()).await.unwrap();
        assert!(run.extracted);
        assert_eq!(run.outcome.newly_matched, 1);
        let queries = index.query_count();

        let run = reconciler.run_statement(&mut record, &statement()).await.unwrap();
        assert!(!run.extracted);
        assert_eq!(run.outcome.already_matched, 1);
        assert_eq!(index.query_count(), queries);
    }
}
