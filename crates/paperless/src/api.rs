//! Wire types and pure helpers for the Paperless-ngx API.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tally_core::{DocumentId, Period, SourceKind, Statement, TagId};
use tally_match::{Candidate, SearchQuery};

/// Page size used for search queries; only the best few hits matter.
pub const SEARCH_PAGE_SIZE: u32 = 10;
pub const LIST_PAGE_SIZE: u32 = 100;

#[derive(Debug, Deserialize)]
pub struct DocumentPage {
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub results: Vec<ApiDocument>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiDocument {
    pub id: i64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub created: Option<String>,
    #[serde(default)]
    pub tags: Vec<i64>,
    #[serde(default)]
    pub original_file_name: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

impl ApiDocument {
    pub fn display_title(&self) -> String {
        self.title
            .clone()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| format!("Document #{}", self.id))
    }

    pub fn created_date(&self) -> Option<NaiveDate> {
        self.created.as_deref().and_then(parse_created)
    }

    pub fn into_candidate(self) -> Candidate {
        Candidate {
            document_id: DocumentId(self.id),
            title: self.display_title(),
            date: self.created_date(),
            tags: self.tags.iter().copied().map(TagId).collect(),
        }
    }

    pub fn into_statement(self, period: Period) -> Statement {
        let source_kind = self
            .original_file_name
            .as_deref()
            .map(SourceKind::from_file_name)
            .unwrap_or(SourceKind::PdfOcr);
        Statement {
            document_id: DocumentId(self.id),
            title: self.display_title(),
            period,
            source_kind,
            original_file_name: self.original_file_name,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ApiNote {
    pub id: i64,
    #[serde(default)]
    pub note: String,
}

#[derive(Debug, Serialize)]
pub struct NewNote<'a> {
    pub note: &'a str,
}

/// `created` is a date on newer servers and an RFC 3339 timestamp on older ones.
pub fn parse_created(value: &str) -> Option<NaiveDate> {
    let head = value.get(..10)?;
    NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()
}

/// Full-text query string for a search. Amounts are sent unsigned with two
/// decimals, the way they appear on invoices.
pub fn query_text(q: &SearchQuery) -> String {
    let mut terms: Vec<String> = Vec::new();
    if let Some(reference) = &q.reference {
        terms.push(reference.clone());
    }
    if let Some(counterparty) = &q.counterparty {
        terms.push(counterparty.clone());
    }
    if let Some(amount) = q.amount {
        terms.push(amount.abs().to_string());
    }
    terms.join(" ")
}

pub fn search_params(q: &SearchQuery) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("query", query_text(q)),
        ("page_size", SEARCH_PAGE_SIZE.to_string()),
        ("tags__id__none", q.exclude_tag.to_string()),
    ];
    if let Some(from) = q.date_from {
        params.push(("created__date__gte", from.to_string()));
    }
    if let Some(to) = q.date_to {
        params.push(("created__date__lte", to.to_string()));
    }
    params
}

pub fn statement_params(tag: TagId, period: Period) -> Vec<(&'static str, String)> {
    vec![
        ("tags__id__all", tag.to_string()),
        ("created__date__gte", period.first_day().to_string()),
        ("created__date__lt", period.next_first_day().to_string()),
        ("page_size", LIST_PAGE_SIZE.to_string()),
    ]
}

/// File name from a `Content-Disposition: attachment; filename="..."` header.
pub fn content_disposition_filename(header: &str) -> Option<String> {
    let start = header.find("filename=\"")? + "filename=\"".len();
    let rest = &header[start..];
    let end = rest.find('"')?;
    let name = &rest[..end];
    (!name.is_empty()).then(|| name.to_string())
}

/// Pick `;`, tab or `,` by which occurs most in the first line.
pub fn sniff_delimiter(data: &[u8]) -> u8 {
    let first_line = data.split(|b| *b == b'\n').next().unwrap_or_default();
    [b';', b'\t', b',']
        .into_iter()
        .max_by_key(|d| (first_line.iter().filter(|b| *b == d).count(), *d == b','))
        .unwrap_or(b',')
}
