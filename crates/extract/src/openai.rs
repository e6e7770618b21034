//! Transaction extraction through the OpenAI chat-completions API.

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tally_core::{Money, Transaction};
use tracing::{debug, warn};

use crate::extractor::{ExtractError, StatementContent, TransactionExtractor};

const API_URL: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
const MAX_RETRIES: u32 = 2;

const SYSTEM_PROMPT: &str = "You are a bank statement parser. Extract all transactions \
from the provided bank statement text. Return a JSON array of objects with these fields:\n\
- \"date\": transaction date in YYYY-MM-DD format\n\
- \"amount\": transaction amount as a number (positive for credits, negative for debits)\n\
- \"counterparty\": name of the other party\n\
- \"description\": payment description/reference\n\
- \"ref\": invoice or document reference number if mentioned (e.g. invoice number, \
contract number), otherwise empty string\n\n\
Return ONLY the JSON array, no other text.";

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// One row as the model emits it.
#[derive(Deserialize)]
struct RawTransaction {
    date: String,
    amount: Decimal,
    #[serde(default)]
    counterparty: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default, rename = "ref")]
    reference: Option<String>,
}

impl RawTransaction {
    fn into_transaction(self, row: usize) -> Result<Transaction, ExtractError> {
        let date = NaiveDate::parse_from_str(self.date.trim(), "%Y-%m-%d").map_err(|_| {
            ExtractError::Malformed(format!("row {row}: invalid date '{}'", self.date))
        })?;
        Ok(Transaction {
            date,
            amount: Money::from_decimal(self.amount),
            counterparty: self.counterparty.unwrap_or_default().trim().to_string(),
            description: self.description.unwrap_or_default().trim().to_string(),
            raw_reference: self
                .reference
                .map(|r| r.trim().to_string())
                .filter(|r| !r.is_empty()),
        })
    }
}

/// Parse the model's reply: a JSON array, optionally wrapped in a Markdown fence.
pub fn parse_transactions(reply: &str) -> Result<Vec<Transaction>, ExtractError> {
    let body = strip_code_fence(reply.trim());
    let rows: Vec<RawTransaction> =
        serde_json::from_str(body).map_err(|e| ExtractError::Malformed(e.to_string()))?;
    rows.into_iter()
        .enumerate()
        .map(|(i, row)| row.into_transaction(i + 1))
        .collect()
}

fn strip_code_fence(text: &str) -> &str {
    if !text.starts_with("```") {
        return text;
    }
    let after_open = text.split_once('\n').map(|(_, rest)| rest).unwrap_or("");
    after_open
        .rsplit_once("```")
        .map(|(inner, _)| inner)
        .unwrap_or(after_open)
        .trim()
}

fn is_retryable(err: &ExtractError) -> bool {
    match err {
        ExtractError::Timeout | ExtractError::Unavailable(_) => true,
        ExtractError::Api { status, .. } => *status == 429 || *status >= 500,
        _ => false,
    }
}

pub struct OpenAiExtractor {
    client: reqwest::Client,
    model: String,
    api_url: String,
}

impl OpenAiExtractor {
    pub fn new(api_key: &str, model: impl Into<String>, timeout: Duration) -> Result<Self, ExtractError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {api_key}"))
                .map_err(|_| ExtractError::Unavailable("API key is not a valid header value".to_string()))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| ExtractError::Unavailable(e.to_string()))?;

        Ok(Self { client, model: model.into(), api_url: API_URL.to_string() })
    }

    /// Point at an OpenAI-compatible endpoint instead of api.openai.com.
    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    async fn complete(&self, statement_text: &str) -> Result<String, ExtractError> {
        let request = ChatCompletionRequest {
            model: &self.model,
            temperature: 0.0,
            messages: vec![
                ChatMessage { role: "system", content: SYSTEM_PROMPT },
                ChatMessage { role: "user", content: statement_text },
            ],
        };

        let response = self
            .client
            .post(&self.api_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ExtractError::Timeout
                } else {
                    ExtractError::Unavailable(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let body = body.chars().take(200).collect();
            return Err(ExtractError::Api { status: status.as_u16(), body });
        }

        let data: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| ExtractError::Malformed(format!("response body: {e}")))?;

        Ok(data
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default())
    }
}

#[async_trait]
impl TransactionExtractor for OpenAiExtractor {
    async fn extract(&self, content: &StatementContent) -> Result<Vec<Transaction>, ExtractError> {
        if content.is_blank() {
            return Err(ExtractError::EmptyContent);
        }

        let mut attempt = 0;
        let reply = loop {
            match self.complete(&content.text).await {
                Ok(reply) => break reply,
                Err(e) if attempt < MAX_RETRIES && is_retryable(&e) => {
                    attempt += 1;
                    warn!(attempt, error = %e, "extraction request failed, retrying");
                    tokio::time::sleep(Duration::from_secs(2u64.pow(attempt))).await;
                }
                Err(e) => return Err(e),
            }
        };

        debug!(model = %self.model, chars = reply.len(), "extraction reply received");
        parse_transactions(&reply)
    }
}
