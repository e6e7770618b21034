use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use tally_core::Statement;

use crate::extractor::{ExtractError, StatementContent};

/// Where statement content comes from (the document store in production).
#[async_trait]
pub trait StatementSource: Send + Sync {
    async fn fetch(&self, statement: &Statement) -> Result<StatementContent, ExtractError>;
}

/// Flatten a delimited spreadsheet export into one `a | b | c` line per row.
/// Rows whose cells are all blank are dropped.
pub fn flatten_delimited(data: &[u8], delimiter: u8) -> Result<String, ExtractError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .from_reader(data);

    let mut lines = Vec::new();
    for record in reader.byte_records() {
        let record = record.map_err(|e| ExtractError::Source(e.to_string()))?;
        let cells: Vec<String> = record
            .iter()
            .map(|cell| String::from_utf8_lossy(cell).trim().to_string())
            .collect();
        if cells.iter().all(String::is_empty) {
            continue;
        }
        lines.push(cells.join(" | "));
    }
    Ok(lines.join("\n"))
}

/// Serves the same text for every statement and counts fetches.
pub struct FixedSource {
    text: String,
    fetches: AtomicUsize,
}

impl FixedSource {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into(), fetches: AtomicUsize::new(0) }
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StatementSource for FixedSource {
    async fn fetch(&self, statement: &Statement) -> Result<StatementContent, ExtractError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(StatementContent::new(statement.source_kind, self.text.clone()))
    }
}
