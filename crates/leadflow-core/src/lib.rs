// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core domain types and logic for the Leadflow message backbone.
//!
//! Holds the pieces every other crate depends on: the shared error type,
//! session and event types, the bounded dedup set, the funnel state
//! machine, the human-handoff detector, and the trait seams
//! ([`SessionStore`], [`SignalExtractor`]) that storage and ingestion
//! implement or consume.

pub mod dedup;
pub mod error;
pub mod funnel;
pub mod handoff;
pub mod traits;
pub mod types;

pub use dedup::BoundedDedupSet;
pub use error::LeadflowError;
pub use funnel::{FunnelStateMachine, Transition};
pub use handoff::HumanHandoffDetector;
pub use traits::{SessionStore, SignalExtractor};
pub use types::{
    Appointment, ContactId, Direction, FunnelStage, InboundEvent, MessageId, Session,
    SessionContext, Signals,
};
