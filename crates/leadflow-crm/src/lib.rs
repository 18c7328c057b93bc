// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! CRM board synchronization for the Leadflow backbone.
//!
//! Projects a session plus a funnel transition into lead-item mutations on
//! a GraphQL board API: dedup-before-create by normalized phone, a new
//! item per sales cycle, fixed label lookup tables for the board's
//! vocabulary, and exponential-backoff retry for transient failures.
//!
//! The CRM is best-effort and eventually convergent: a failed sync never
//! rolls back local session state; the next event for the contact
//! triggers a fresh attempt.

pub mod client;
pub mod labels;
pub mod schedule;
pub mod sync;

pub use client::BoardClient;
pub use sync::{CrmSync, LeadRef};
