// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Trait seams between the backbone and its collaborators.

use async_trait::async_trait;

use crate::error::LeadflowError;
use crate::types::{ContactId, InboundEvent, Session, Signals};

/// Mutation applied to a session inside the store's per-contact critical
/// section. `Fn` rather than `FnOnce` so a failed write can be retried
/// against a fresh read.
pub type SessionMutator = Box<dyn Fn(&mut Session) + Send + Sync>;

/// Durable, contact-keyed store of conversation state.
///
/// The single source of truth for stage, context, and silencing. `upsert`
/// is read-modify-write under a per-contact lock so concurrent events for
/// the same contact never interleave their updates; upserts for different
/// contacts proceed independently.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, contact_id: &ContactId) -> Result<Option<Session>, LeadflowError>;

    /// Load (or create) the contact's session, apply `mutator`, and
    /// persist the result. `updated_at` strictly increases on every
    /// successful upsert.
    async fn upsert(
        &self,
        contact_id: &ContactId,
        mutator: SessionMutator,
    ) -> Result<Session, LeadflowError>;

    /// Release underlying storage resources on shutdown.
    async fn close(&self) -> Result<(), LeadflowError>;
}

/// Conversation/NLU collaborator that turns an event plus recent context
/// into funnel signals.
///
/// A failing extractor degrades to "no signals": the event is still
/// recorded but the funnel performs a no-op transition.
#[async_trait]
pub trait SignalExtractor: Send + Sync {
    async fn extract(
        &self,
        session: &Session,
        event: &InboundEvent,
    ) -> Result<Signals, LeadflowError>;
}
