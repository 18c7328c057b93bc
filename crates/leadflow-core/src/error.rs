// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Leadflow backbone.

use thiserror::Error;

/// The primary error type used across the Leadflow crates.
///
/// A duplicate webhook delivery is deliberately not represented here:
/// it is a normal ingestion outcome (`AckDecision::Duplicate`), not a
/// failure.
#[derive(Debug, Error)]
pub enum LeadflowError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Session store errors (database connection, query failure, serialization).
    ///
    /// Fatal for the event being processed, never for the process.
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// CRM synchronization errors (API failure, exhausted retries).
    ///
    /// Non-fatal: the local session update is authoritative and is never
    /// rolled back; the next event for the contact retries the sync.
    #[error("crm sync error: {message}")]
    Crm {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Signal extraction collaborator failure.
    ///
    /// Degrades to "no signals": the funnel performs a no-op transition.
    #[error("signal extraction error: {message}")]
    Extraction { message: String },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}
