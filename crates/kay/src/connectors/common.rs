//! Common utilities shared across connectors.
//!
//! This module provides HTTP client creation, URL validation and the mapping
//! of transport failures and HTTP statuses onto [`Error`] variants.

use crate::error::{Error, Result};
use reqwest::{Client, RequestBuilder, Response};
use std::time::Duration;

/// Maximum file size for local imports (100MB).
pub const MAX_FILE_SIZE: u64 = 100 * 1024 * 1024;

/// Builds an HTTP client with a request timeout and certificate policy.
///
/// # Errors
///
/// Returns `Error::Config` if the TLS backend cannot be initialized.
pub fn build_http_client(timeout: Duration, verify_certs: bool) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10).min(timeout))
        .danger_accept_invalid_certs(!verify_certs)
        .build()
        .map_err(|e| Error::Config(format!("Cannot build HTTP client: {}", e)))
}

/// Validates a URL for safety (anti-SSRF).
pub fn validate_url(url: &str) -> Result<()> {
    // Check for valid scheme
    let valid_schemes = ["http://", "https://", "redis://", "rediss://"];
    let has_valid_scheme = valid_schemes.iter().any(|s| url.starts_with(s));

    if !has_valid_scheme {
        return Err(Error::Config(format!(
            "Invalid URL scheme in '{}'. Allowed: http, https, redis, rediss",
            url
        )));
    }

    // Basic URL format validation
    if url.len() < 10 || !url.contains("://") {
        return Err(Error::Config(format!("Invalid URL format: {}", url)));
    }

    Ok(())
}

/// Joins a base URL and a path without doubling slashes.
pub fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Sends a request, classifying transport failures.
pub async fn send(request: RequestBuilder, source_name: &str) -> Result<Response> {
    request.send().await.map_err(|e| {
        if e.is_timeout() {
            Error::Timeout(format!("{} request timed out: {}", source_name, e))
        } else {
            Error::Connection(format!("{} request failed: {}", source_name, e))
        }
    })
}

/// Sends a request and turns non-success statuses into errors.
pub async fn send_checked(request: RequestBuilder, source_name: &str) -> Result<Response> {
    let response = send(request, source_name).await?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(handle_http_error(status.as_u16(), &body, source_name));
    }

    Ok(response)
}

/// Handles HTTP error responses and returns appropriate errors.
pub fn handle_http_error(status_code: u16, body: &str, source_name: &str) -> Error {
    match status_code {
        401 | 403 => Error::Authentication(format!("{} auth failed: {}", source_name, body)),
        _ => Error::Status {
            service: source_name.to_string(),
            status: status_code,
            body: body.to_string(),
        },
    }
}
