use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::money::Money;
use super::period::Period;

/// Identifier of a document in the external document store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(pub i64);

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagId(pub i64);

impl fmt::Display for TagId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One line of a bank statement as returned by the extractor.
///
/// Transactions have no natural key; within a statement they are identified
/// by position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub date: NaiveDate,
    pub amount: Money,
    pub counterparty: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_reference: Option<String>,
}

impl Transaction {
    pub fn is_credit(&self) -> bool {
        self.amount.is_credit()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Scanned or digital PDF; content comes from the document store's OCR text.
    PdfOcr,
    /// Spreadsheet export (CSV, XLS, XLSX, ODS).
    Spreadsheet,
}

impl SourceKind {
    /// Classify a statement by its original file name.
    pub fn from_file_name(name: &str) -> Self {
        let ext = name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "csv" | "tsv" | "xls" | "xlsx" | "ods" => SourceKind::Spreadsheet,
            _ => SourceKind::PdfOcr,
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::PdfOcr => write!(f, "pdf_ocr"),
            SourceKind::Spreadsheet => write!(f, "spreadsheet"),
        }
    }
}

/// A bank statement document for one period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statement {
    pub document_id: DocumentId,
    pub title: String,
    pub period: Period,
    pub source_kind: SourceKind,
    /// Original upload name, used to pick how the content is read.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_file_name: Option<String>,
}
