// src/utils/http.rs

//! HTTP client utilities.

use std::time::Duration;

use crate::error::Result;
use crate::models::{ApiConfig, ConverterConfig};

/// Create the client used for every upstream API request.
///
/// No request timeout is set beyond the transport defaults.
pub fn create_async_client(config: &ApiConfig) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .user_agent(&config.user_agent)
        .build()?;
    Ok(client)
}

/// Create the client used for converter calls, bounded by the per-call timeout.
pub fn create_converter_client(config: &ConverterConfig) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?;
    Ok(client)
}
