//! Markup-to-plain-text conversion of stored revisions.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::ConverterPool;
use crate::error::{AppError, Result};
use crate::models::{CleanRevision, RevisionContent, RevisionMeta};
use crate::storage::DumpStorage;

/// Conversion request understood by the converter service.
#[derive(Debug, Clone, Serialize)]
pub struct ConversionRequest<'a> {
    pub text: &'a str,
    pub from: &'static str,
    pub to: &'static str,
    pub extensions: [&'static str; 1],
    pub wrap: &'static str,
}

impl<'a> ConversionRequest<'a> {
    pub fn plain_text(text: &'a str) -> Self {
        Self {
            text,
            from: "mediawiki",
            to: "plain",
            extensions: ["strip-comments"],
            wrap: "none",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConversionResponse {
    pub output: Option<String>,
    #[serde(default)]
    pub base64: bool,
}

impl ConversionResponse {
    /// Converted text, base64-decoded when the service flags it.
    pub fn into_text(self, endpoint: &str) -> Result<String> {
        let output = self
            .output
            .ok_or_else(|| AppError::converter(endpoint, "response has no output"))?;
        if !self.base64 {
            return Ok(output);
        }
        let bytes = STANDARD
            .decode(output.as_bytes())
            .map_err(|e| AppError::converter(endpoint, format!("invalid base64 output: {e}")))?;
        String::from_utf8(bytes)
            .map_err(|e| AppError::converter(endpoint, format!("output is not UTF-8: {e}")))
    }
}

/// Converts stored raw revisions through the converter pool.
pub struct Cleaner {
    storage: DumpStorage,
    pool: Arc<ConverterPool>,
    client: reqwest::Client,
}

impl Cleaner {
    /// `client` should carry the per-conversion timeout.
    pub fn new(storage: DumpStorage, pool: Arc<ConverterPool>, client: reqwest::Client) -> Self {
        Self {
            storage,
            pool,
            client,
        }
    }

    /// Read a revision's raw content from storage and clean it.
    pub async fn clean(&self, meta: &RevisionMeta, cancel: &CancellationToken) -> Result<CleanRevision> {
        let raw = self.storage.read_raw(meta).await?;
        self.clean_content(&raw, cancel).await
    }

    /// Convert raw content and persist the result.
    ///
    /// The endpoint lease is held until the cleaned revision is on disk.
    pub async fn clean_content(
        &self,
        raw: &RevisionContent,
        cancel: &CancellationToken,
    ) -> Result<CleanRevision> {
        let lease = self.pool.acquire(cancel).await?;
        let endpoint = lease.endpoint().as_str();

        let response = self
            .client
            .post(lease.endpoint().clone())
            .json(&ConversionRequest::plain_text(raw.markup()))
            .send()
            .await
            .map_err(|e| AppError::converter(endpoint, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::converter(
                endpoint,
                format!("status {}", status.as_u16()),
            ));
        }

        let body: ConversionResponse = response
            .json()
            .await
            .map_err(|e| AppError::converter(endpoint, format!("unparsable response: {e}")))?;
        let text = body.into_text(endpoint)?;

        let clean = CleanRevision::from_content(raw, text);
        self.storage.write_clean(&clean).await?;
        drop(lease);

        log::debug!("Cleaned revision {}", clean.rev_id);
        Ok(clean)
    }
}
