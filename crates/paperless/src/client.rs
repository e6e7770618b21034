use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_DISPOSITION};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tally_core::{DocumentId, Period, SourceKind, Statement, TagId};
use tally_extract::{flatten_delimited, ExtractError, StatementContent, StatementSource};
use tally_match::{Candidate, DocumentIndex, IndexError, SearchQuery};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::api::{
    content_disposition_filename, search_params, sniff_delimiter, statement_params, ApiDocument,
    ApiNote, DocumentPage, NewNote,
};

#[derive(Debug, Error)]
pub enum PaperlessError {
    #[error("Invalid Paperless configuration: {0}")]
    Config(String),
    #[error("Paperless request timed out: {0}")]
    Timeout(String),
    #[error("Paperless request failed: {0}")]
    Request(String),
    #[error("Paperless returned HTTP {status} for {url}")]
    Status { status: u16, url: String },
    #[error("Unexpected Paperless response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for PaperlessError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            PaperlessError::Timeout(e.to_string())
        } else if e.is_decode() {
            PaperlessError::Decode(e.to_string())
        } else {
            PaperlessError::Request(e.to_string())
        }
    }
}

impl From<PaperlessError> for IndexError {
    fn from(e: PaperlessError) -> Self {
        match e {
            PaperlessError::Timeout(_) => IndexError::Timeout,
            PaperlessError::Decode(msg) => IndexError::Malformed(msg),
            other => IndexError::Unavailable(other.to_string()),
        }
    }
}

impl From<PaperlessError> for ExtractError {
    fn from(e: PaperlessError) -> Self {
        match e {
            PaperlessError::Timeout(_) => ExtractError::Timeout,
            other => ExtractError::Source(other.to_string()),
        }
    }
}

pub struct PaperlessClient {
    client: reqwest::Client,
    base_url: String,
}

impl PaperlessClient {
    pub fn new(base_url: &str, token: &str, timeout: Duration) -> Result<Self, PaperlessError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Token {token}"))
                .map_err(|_| PaperlessError::Config("token is not a valid header value".to_string()))?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| PaperlessError::Config(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        params: &[(&str, String)],
    ) -> Result<T, PaperlessError> {
        let response = self.client.get(url).query(params).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(PaperlessError::Status { status: status.as_u16(), url: url.to_string() });
        }
        Ok(response.json().await?)
    }

    /// Statements tagged `tag` and created within `period`, following pagination.
    pub async fn list_statements(
        &self,
        tag: TagId,
        period: Period,
    ) -> Result<Vec<Statement>, PaperlessError> {
        let mut page: DocumentPage = self
            .get_json(&self.url("/api/documents/"), &statement_params(tag, period))
            .await?;
        let mut docs = std::mem::take(&mut page.results);

        while let Some(next) = page.next.take() {
            page = self.get_json(&next, &[]).await?;
            docs.append(&mut page.results);
        }

        info!(count = docs.len(), %period, "statements listed");
        Ok(docs.into_iter().map(|d| d.into_statement(period)).collect())
    }

    /// Original upload bytes plus the file name the server reports.
    pub async fn download_original(
        &self,
        id: DocumentId,
    ) -> Result<(Vec<u8>, Option<String>), PaperlessError> {
        let url = self.url(&format!("/api/documents/{id}/download/"));
        let response = self
            .client
            .get(&url)
            .query(&[("original", "true")])
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(PaperlessError::Status { status: status.as_u16(), url });
        }
        let filename = response
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(content_disposition_filename);
        let bytes = response.bytes().await?;
        Ok((bytes.to_vec(), filename))
    }

    /// OCR text the server holds for a document.
    pub async fn document_content(&self, id: DocumentId) -> Result<String, PaperlessError> {
        let doc: ApiDocument = self
            .get_json(&self.url(&format!("/api/documents/{id}/")), &[])
            .await?;
        Ok(doc.content.unwrap_or_default())
    }

    /// Replace the note starting with `prefix` (if any) by `text`.
    pub async fn replace_note(
        &self,
        id: DocumentId,
        prefix: &str,
        text: &str,
    ) -> Result<(), PaperlessError> {
        let url = self.url(&format!("/api/documents/{id}/notes/"));
        let notes: Vec<ApiNote> = self.get_json(&url, &[]).await?;

        if let Some(old) = notes.iter().find(|n| n.note.starts_with(prefix)) {
            let response = self
                .client
                .delete(&url)
                .query(&[("id", old.id.to_string())])
                .send()
                .await?;
            if !response.status().is_success() {
                return Err(PaperlessError::Status { status: response.status().as_u16(), url });
            }
        }

        let response = self.client.post(&url).json(&NewNote { note: text }).send().await?;
        if !response.status().is_success() {
            return Err(PaperlessError::Status { status: response.status().as_u16(), url });
        }
        Ok(())
    }

    /// Spreadsheet originals we can read as delimited text; anything else
    /// (and any download failure) falls back to the OCR text.
    async fn spreadsheet_text(&self, statement: &Statement) -> Option<String> {
        let (bytes, header_name) = match self.download_original(statement.document_id).await {
            Ok(download) => download,
            Err(e) => {
                warn!(document = %statement.document_id, error = %e, "could not download original");
                return None;
            }
        };
        let name = header_name.or_else(|| statement.original_file_name.clone())?;
        let ext = name.rsplit_once('.').map(|(_, e)| e.to_ascii_lowercase())?;
        let delimiter = match ext.as_str() {
            "csv" => sniff_delimiter(&bytes),
            "tsv" => b'\t',
            other => {
                info!(document = %statement.document_id, extension = other, "no reader for spreadsheet format, using OCR text");
                return None;
            }
        };
        match flatten_delimited(&bytes, delimiter) {
            Ok(text) if !text.trim().is_empty() => {
                debug!(document = %statement.document_id, file = %name, "parsed spreadsheet original");
                Some(text)
            }
            Ok(_) => None,
            Err(e) => {
                warn!(document = %statement.document_id, error = %e, "could not read spreadsheet");
                None
            }
        }
    }
}

#[async_trait]
impl DocumentIndex for PaperlessClient {
    async fn search(&self, query: &SearchQuery) -> Result<Vec<Candidate>, IndexError> {
        let page: DocumentPage = self
            .get_json(&self.url("/api/documents/"), &search_params(query))
            .await?;
        Ok(page.results.into_iter().map(ApiDocument::into_candidate).collect())
    }
}

#[async_trait]
impl StatementSource for PaperlessClient {
    async fn fetch(&self, statement: &Statement) -> Result<StatementContent, ExtractError> {
        if statement.source_kind == SourceKind::Spreadsheet {
            if let Some(text) = self.spreadsheet_text(statement).await {
                return Ok(StatementContent::new(SourceKind::Spreadsheet, text));
            }
        }

        let text = self.document_content(statement.document_id).await?;
        let content = StatementContent::new(SourceKind::PdfOcr, text);
        if content.is_blank() {
            return Err(ExtractError::EmptyContent);
        }
        Ok(content)
    }
}
