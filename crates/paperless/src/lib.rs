//! Paperless-ngx REST client: statement listing, statement content, document
//! search and audit notes.

pub mod api;
pub mod client;

pub use client::{PaperlessClient, PaperlessError};
