use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tally_core::{DateRange, MatchResult, MatchVia, TagId, Transaction};
use tracing::debug;

use crate::index::{Candidate, DocumentIndex, IndexError, SearchQuery};
use crate::reference::extract_references;

/// Date windows (in days) bounding the counterparty and amount-only tiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchWindows {
    /// Incoming payments often settle invoices from months before.
    pub credit_lookback_days: u32,
    pub debit_lookback_days: u32,
    /// Documents dated shortly after the booking (e.g. a receipt issued late).
    pub forward_days: u32,
    pub amount_only_days: u32,
}

impl Default for MatchWindows {
    fn default() -> Self {
        Self {
            credit_lookback_days: 365,
            debit_lookback_days: 30,
            forward_days: 14,
            amount_only_days: 5,
        }
    }
}

impl MatchWindows {
    pub fn counterparty_window(&self, tx: &Transaction) -> DateRange {
        let lookback = if tx.is_credit() {
            self.credit_lookback_days
        } else {
            self.debit_lookback_days
        };
        DateRange::around(tx.date, lookback, self.forward_days)
    }

    pub fn amount_only_window(&self, tx: &Transaction) -> DateRange {
        DateRange::around(tx.date, self.amount_only_days, self.amount_only_days)
    }
}

/// Everything a tier may consult besides the transaction itself.
pub struct MatchContext<'a> {
    pub index: &'a dyn DocumentIndex,
    pub exclude_tag: TagId,
    pub windows: &'a MatchWindows,
}

impl MatchContext<'_> {
    /// Runs `query` and keeps only candidates that are not statements and,
    /// if `window` is given, are dated inside it. The index is not trusted
    /// to have applied either filter.
    async fn admissible(
        &self,
        query: &SearchQuery,
        window: Option<DateRange>,
    ) -> Result<Vec<Candidate>, IndexError> {
        debug!(?query, "searching document index");
        let hits = self.index.search(query).await?;
        Ok(hits
            .into_iter()
            .filter(|c| !c.tags.contains(&self.exclude_tag))
            .filter(|c| match window {
                Some(w) => c.date.is_some_and(|d| w.contains(d)),
                None => true,
            })
            .collect())
    }
}

/// One matching strategy. Returns `Ok(None)` when it finds nothing, which
/// hands the transaction to the next tier.
#[async_trait]
pub trait MatchTier: Send + Sync {
    fn via(&self) -> MatchVia;

    async fn attempt(
        &self,
        tx: &Transaction,
        ctx: &MatchContext<'_>,
    ) -> Result<Option<Candidate>, IndexError>;
}

/// Looks up invoice/document numbers quoted in the transaction. Date and
/// amount are ignored.
pub struct ReferenceTier;

#[async_trait]
impl MatchTier for ReferenceTier {
    fn via(&self) -> MatchVia {
        MatchVia::Reference
    }

    async fn attempt(
        &self,
        tx: &Transaction,
        ctx: &MatchContext<'_>,
    ) -> Result<Option<Candidate>, IndexError> {
        for reference in extract_references(tx) {
            let query = SearchQuery::new(ctx.exclude_tag).reference(reference);
            let hits = ctx.admissible(&query, None).await?;
            if let Some(best) = closest(hits, tx.date) {
                return Ok(Some(best));
            }
        }
        Ok(None)
    }
}

/// Fuzzy counterparty plus exact amount, inside a sign-dependent lookback.
pub struct CounterpartyAmountTier;

#[async_trait]
impl MatchTier for CounterpartyAmountTier {
    fn via(&self) -> MatchVia {
        MatchVia::CounterpartyAmount
    }

    async fn attempt(
        &self,
        tx: &Transaction,
        ctx: &MatchContext<'_>,
    ) -> Result<Option<Candidate>, IndexError> {
        if tx.counterparty.trim().is_empty() || tx.amount.is_zero() {
            return Ok(None);
        }
        let window = ctx.windows.counterparty_window(tx);
        let query = SearchQuery::new(ctx.exclude_tag)
            .counterparty(tx.counterparty.trim())
            .amount(tx.amount)
            .within(window);
        let hits = ctx.admissible(&query, Some(window)).await?;
        Ok(closest(hits, tx.date))
    }
}

/// Exact amount in a narrow window around the booking date. Weakest signal,
/// tried last.
pub struct AmountOnlyTier;

#[async_trait]
impl MatchTier for AmountOnlyTier {
    fn via(&self) -> MatchVia {
        MatchVia::AmountOnly
    }

    async fn attempt(
        &self,
        tx: &Transaction,
        ctx: &MatchContext<'_>,
    ) -> Result<Option<Candidate>, IndexError> {
        if tx.amount.is_zero() {
            return Ok(None);
        }
        let window = ctx.windows.amount_only_window(tx);
        let query = SearchQuery::new(ctx.exclude_tag)
            .amount(tx.amount)
            .within(window);
        let hits = ctx.admissible(&query, Some(window)).await?;
        Ok(closest(hits, tx.date))
    }
}

/// Closest document by date; ties (and undated documents) resolved by
/// lowest id.
fn closest(candidates: Vec<Candidate>, date: NaiveDate) -> Option<Candidate> {
    candidates.into_iter().min_by_key(|c| {
        let distance = c
            .date
            .map(|d| (d - date).num_days().unsigned_abs())
            .unwrap_or(u64::MAX);
        (distance, c.document_id)
    })
}

/// Runs the tiers in order and stops at the first hit.
pub struct Matcher<'a> {
    index: &'a dyn DocumentIndex,
    exclude_tag: TagId,
    windows: MatchWindows,
    tiers: Vec<Box<dyn MatchTier>>,
}

impl<'a> Matcher<'a> {
    pub fn new(index: &'a dyn DocumentIndex, exclude_tag: TagId) -> Self {
        Self {
            index,
            exclude_tag,
            windows: MatchWindows::default(),
            tiers: vec![
                Box::new(ReferenceTier),
                Box::new(CounterpartyAmountTier),
                Box::new(AmountOnlyTier),
            ],
        }
    }

    pub fn with_windows(mut self, windows: MatchWindows) -> Self {
        self.windows = windows;
        self
    }

    pub fn with_tiers(mut self, tiers: Vec<Box<dyn MatchTier>>) -> Self {
        self.tiers = tiers;
        self
    }

    /// Match one transaction. `NotFound` is a normal outcome; an `Err` means
    /// the index could not be queried and the transaction should be retried
    /// on a later run.
    pub async fn match_transaction(&self, tx: &Transaction) -> Result<MatchResult, IndexError> {
        let ctx = MatchContext {
            index: self.index,
            exclude_tag: self.exclude_tag,
            windows: &self.windows,
        };

        for tier in &self.tiers {
            if let Some(hit) = tier.attempt(tx, &ctx).await? {
                debug!(
                    document = %hit.document_id,
                    via = %tier.via(),
                    date = %tx.date,
                    "transaction matched"
                );
                return Ok(MatchResult::matched(tx.clone(), hit.document_id, tier.via(), hit.title));
            }
        }

        Ok(MatchResult::not_found(tx.clone()))
    }
}
