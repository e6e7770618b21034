use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::atomic::{AtomicUsize, Ordering};
use tally_core::{DateRange, DocumentId, Money, TagId};
use thiserror::Error;

use crate::util::{name_similarity, normalize};

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("Document index unavailable: {0}")]
    Unavailable(String),
    #[error("Document index request timed out")]
    Timeout,
    #[error("Malformed document index response: {0}")]
    Malformed(String),
}

/// Search terms for one lookup. `exclude_tag` is always set so bank
/// statements never come back as candidates.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    pub reference: Option<String>,
    pub counterparty: Option<String>,
    /// Unsigned amount; documents carry amounts without a debit/credit sign.
    pub amount: Option<Money>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub exclude_tag: TagId,
}

impl SearchQuery {
    pub fn new(exclude_tag: TagId) -> Self {
        Self {
            reference: None,
            counterparty: None,
            amount: None,
            date_from: None,
            date_to: None,
            exclude_tag,
        }
    }

    pub fn reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn counterparty(mut self, counterparty: impl Into<String>) -> Self {
        self.counterparty = Some(counterparty.into());
        self
    }

    pub fn amount(mut self, amount: Money) -> Self {
        self.amount = Some(amount.abs());
        self
    }

    pub fn within(mut self, range: DateRange) -> Self {
        self.date_from = Some(range.start);
        self.date_to = Some(range.end);
        self
    }
}

/// A document returned by the index, in index order.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub document_id: DocumentId,
    pub title: String,
    pub date: Option<NaiveDate>,
    pub tags: Vec<TagId>,
}

/// Read-only search over the document store.
#[async_trait]
pub trait DocumentIndex: Send + Sync {
    async fn search(&self, query: &SearchQuery) -> Result<Vec<Candidate>, IndexError>;
}

// ── In-memory index ───────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct IndexedDocument {
    pub id: DocumentId,
    pub title: String,
    /// Invoice or document number.
    pub number: Option<String>,
    pub counterparty: Option<String>,
    pub amount: Option<Money>,
    pub date: Option<NaiveDate>,
    pub tags: Vec<TagId>,
}

impl IndexedDocument {
    pub fn new(id: i64, title: impl Into<String>) -> Self {
        Self {
            id: DocumentId(id),
            title: title.into(),
            number: None,
            counterparty: None,
            amount: None,
            date: None,
            tags: Vec::new(),
        }
    }

    pub fn number(mut self, number: impl Into<String>) -> Self {
        self.number = Some(number.into());
        self
    }

    pub fn counterparty(mut self, counterparty: impl Into<String>) -> Self {
        self.counterparty = Some(counterparty.into());
        self
    }

    pub fn amount(mut self, amount: Money) -> Self {
        self.amount = Some(amount.abs());
        self
    }

    pub fn date(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }

    pub fn tag(mut self, tag: TagId) -> Self {
        self.tags.push(tag);
        self
    }

    fn to_candidate(&self) -> Candidate {
        Candidate {
            document_id: self.id,
            title: self.title.clone(),
            date: self.date,
            tags: self.tags.clone(),
        }
    }
}

const FUZZY_THRESHOLD: f32 = 0.7;

/// Exact-field index over a fixed document set. Counterparty names are
/// compared fuzzily; everything else must be equal.
pub struct InMemoryIndex {
    documents: Vec<IndexedDocument>,
    queries: AtomicUsize,
}

impl InMemoryIndex {
    pub fn new(documents: Vec<IndexedDocument>) -> Self {
        Self {
            documents,
            queries: AtomicUsize::new(0),
        }
    }

    /// Number of searches served so far.
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    fn accepts(&self, doc: &IndexedDocument, q: &SearchQuery) -> bool {
        if doc.tags.contains(&q.exclude_tag) {
            return false;
        }
        if let Some(reference) = &q.reference {
            let hit = doc
                .number
                .as_deref()
                .is_some_and(|n| normalize(n) == normalize(reference));
            if !hit {
                return false;
            }
        }
        if let Some(counterparty) = &q.counterparty {
            let hit = doc
                .counterparty
                .as_deref()
                .is_some_and(|c| name_similarity(c, counterparty) >= FUZZY_THRESHOLD);
            if !hit {
                return false;
            }
        }
        if let Some(amount) = q.amount {
            if doc.amount != Some(amount.abs()) {
                return false;
            }
        }
        if q.date_from.is_some() || q.date_to.is_some() {
            let Some(date) = doc.date else {
                return false;
            };
            if q.date_from.is_some_and(|from| date < from) || q.date_to.is_some_and(|to| date > to) {
                return false;
            }
        }
        true
    }
}

#[async_trait]
impl DocumentIndex for InMemoryIndex {
    async fn search(&self, query: &SearchQuery) -> Result<Vec<Candidate>, IndexError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        let mut hits: Vec<Candidate> = self
            .documents
            .iter()
            .filter(|doc| self.accepts(doc, query))
            .map(IndexedDocument::to_candidate)
            .collect();
        hits.sort_by_key(|c| c.document_id);
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STATEMENT_TAG: TagId = TagId(9);

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn index() -> InMemoryIndex {
        InMemoryIndex::new(vec![
            IndexedDocument::new(3, "Invoice DH-202512-10218")
                .number("DH-202512-10218")
                .counterparty("Dati Holding SIA")
                .amount(Money::from_cents(12100))
                .date(date(2025, 12, 2)),
            IndexedDocument::new(1, "Telco bill")
                .counterparty("Telco")
                .amount(Money::from_cents(2500))
                .date(date(2025, 12, 20)),
            IndexedDocument::new(2, "Statement December")
                .amount(Money::from_cents(2500))
                .date(date(2025, 12, 31))
                .tag(STATEMENT_TAG),
        ])
    }

    #[tokio::test]
    async fn reference_matches_number_only() {
        let idx = index();
        let hits = idx
            .search(&SearchQuery::new(STATEMENT_TAG).reference("dh-202512-10218"))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].document_id, DocumentId(3));
    }

    #[tokio::test]
    async fn excluded_tag_is_never_returned() {
        let idx = index();
        let hits = idx
            .search(&SearchQuery::new(STATEMENT_TAG).amount(Money::from_cents(-2500)))
            .await
            .unwrap();
        assert_eq!(hits.iter().map(|c| c.document_id).collect::<Vec<_>>(), vec![DocumentId(1)]);
    }

    #[tokio::test]
    async fn counterparty_is_fuzzy() {
        let idx = index();
        let hits = idx
            .search(
                &SearchQuery::new(STATEMENT_TAG)
                    .counterparty("DATI HOLDING")
                    .amount(Money::from_cents(12100)),
            )
            .await
            .unwrap();
        assert_eq!(hits[0].document_id, DocumentId(3));
    }

    #[tokio::test]
    async fn date_range_is_inclusive_and_drops_undated() {
        let mut docs = vec![IndexedDocument::new(4, "Undated").amount(Money::from_cents(2500))];
        docs.push(
            IndexedDocument::new(5, "Dated")
                .amount(Money::from_cents(2500))
                .date(date(2025, 12, 20)),
        );
        let idx = InMemoryIndex::new(docs);
        let range = DateRange::new(date(2025, 12, 20), date(2025, 12, 21));
        let hits = idx
            .search(&SearchQuery::new(STATEMENT_TAG).amount(Money::from_cents(2500)).within(range))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].document_id, DocumentId(5));
        assert_eq!(idx.query_count(), 1);
    }
}
