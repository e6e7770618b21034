use serde::{Deserialize, Serialize};
use std::fmt;

use super::transaction::{DocumentId, Transaction};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    NotFound,
    Matched,
}

/// Which matcher tier produced a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchVia {
    Reference,
    CounterpartyAmount,
    AmountOnly,
}

impl fmt::Display for MatchVia {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchVia::Reference => write!(f, "reference"),
            MatchVia::CounterpartyAmount => write!(f, "counterparty+amount"),
            MatchVia::AmountOnly => write!(f, "amount"),
        }
    }
}

/// Outcome of matching one transaction. A `Matched` result is final.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchResult {
    pub transaction: Transaction,
    pub status: MatchStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_document_id: Option<DocumentId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_via: Option<MatchVia>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_title: Option<String>,
}

impl MatchResult {
    pub fn not_found(transaction: Transaction) -> Self {
        MatchResult {
            transaction,
            status: MatchStatus::NotFound,
            matched_document_id: None,
            matched_via: None,
            matched_title: None,
        }
    }

    pub fn matched(
        transaction: Transaction,
        document_id: DocumentId,
        via: MatchVia,
        title: impl Into<String>,
    ) -> Self {
        MatchResult {
            transaction,
            status: MatchStatus::Matched,
            matched_document_id: Some(document_id),
            matched_via: Some(via),
            matched_title: Some(title.into()),
        }
    }

    pub fn is_matched(&self) -> bool {
        self.status == MatchStatus::Matched
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Money;
    use chrono::NaiveDate;

    fn tx() -> Transaction {
        Transaction {
            date: NaiveDate::from_ymd_opt(2025, 3, 3).unwrap(),
            amount: Money::from_cents(-2500),
            counterparty: "Telco".to_string(),
            description: "March bill".to_string(),
            raw_reference: None,
        }
    }

    #[test]
    fn status_orders_not_found_before_matched() {
        assert!(MatchStatus::NotFound < MatchStatus::Matched);
    }

    #[test]
    fn matched_carries_document() {
        let r = MatchResult::matched(tx(), DocumentId(7), MatchVia::Reference, "Invoice 7");
        assert!(r.is_matched());
        assert_eq!(r.matched_document_id, Some(DocumentId(7)));
        assert_eq!(r.matched_via, Some(MatchVia::Reference));
    }

    #[test]
    fn not_found_serializes_without_match_fields() {
        let json = serde_json::to_value(MatchResult::not_found(tx())).unwrap();
        assert_eq!(json["status"], "not_found");
        assert!(json.get("matched_document_id").is_none());
    }
}
