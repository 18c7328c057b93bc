// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the CRM board's GraphQL API.
//!
//! Handles authentication, transient-error retry with exponential
//! backoff, and response decoding. Transient means connection/timeout
//! failures, 5xx, and rate limiting (429); anything else fails fast.

use std::time::Duration;

use leadflow_core::LeadflowError;
use serde_json::Value;
use tracing::{debug, error, warn};

/// GraphQL client for the CRM board API.
#[derive(Debug, Clone)]
pub struct BoardClient {
    client: reqwest::Client,
    api_url: String,
    api_token: String,
    /// Total attempts per request, including the first.
    max_attempts: u32,
    backoff_base: Duration,
}

impl BoardClient {
    /// Create a client for the given endpoint and token.
    pub fn new(api_url: String, api_token: String, max_attempts: u32) -> Result<Self, LeadflowError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(25))
            .build()
            .map_err(|e| LeadflowError::Crm {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;
        Ok(Self {
            client,
            api_url,
            api_token,
            max_attempts: max_attempts.max(1),
            backoff_base: Duration::from_secs(1),
        })
    }

    /// Shrinks the retry backoff (for testing against wiremock).
    #[cfg(test)]
    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    /// Execute a GraphQL query with bounded retries.
    ///
    /// Backoff doubles per attempt (2s, 4s at the default base). API-level
    /// `errors` in an otherwise successful response are logged and the
    /// body returned as-is, matching the board API's partial-failure
    /// semantics.
    pub async fn graphql(&self, query: &str, variables: Value) -> Result<Value, LeadflowError> {
        let payload = serde_json::json!({ "query": query, "variables": variables });
        let mut last_error: Option<LeadflowError> = None;

        for attempt in 0..self.max_attempts {
            if attempt > 0 {
                let backoff = self.backoff_base * 2u32.pow(attempt);
                warn!(attempt, backoff_secs = backoff.as_secs_f32(), "retrying CRM request");
                tokio::time::sleep(backoff).await;
            }

            let response = self
                .client
                .post(&self.api_url)
                .header("Authorization", &self.api_token)
                .json(&payload)
                .send()
                .await;

            let response = match response {
                Ok(r) => r,
                Err(e) => {
                    // Connect/timeout errors are transient.
                    last_error = Some(LeadflowError::Crm {
                        message: format!("CRM request failed: {e}"),
                        source: Some(Box::new(e)),
                    });
                    continue;
                }
            };

            let status = response.status();
            debug!(status = %status, attempt, "CRM response received");

            if status.is_success() {
                let body: Value = response.json().await.map_err(|e| LeadflowError::Crm {
                    message: format!("failed to decode CRM response: {e}"),
                    source: Some(Box::new(e)),
                })?;
                if let Some(errors) = body.get("errors") {
                    error!(%errors, "CRM API returned errors");
                }
                return Ok(body);
            }

            let transient = status.is_server_error() || status.as_u16() == 429;
            let body = response.text().await.unwrap_or_default();
            let err = LeadflowError::Crm {
                message: format!("CRM API returned {status}: {body}"),
                source: None,
            };
            if transient {
                last_error = Some(err);
                continue;
            }
            return Err(err);
        }

        Err(last_error.unwrap_or_else(|| LeadflowError::Crm {
            message: "CRM request failed after retries".into(),
            source: None,
        }))
    }
}
