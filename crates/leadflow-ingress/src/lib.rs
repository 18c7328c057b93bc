// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Webhook ingestion pipeline.
//!
//! The entry point of the backbone. [`WebhookIngress::handle`] decides
//! the channel acknowledgment synchronously (dedup check only) and runs
//! everything else in a spawned task, so provider-side redelivery timers
//! never observe downstream latency. Per-contact processing is serialized
//! through one critical section covering both the session upsert and the
//! CRM sync; different contacts never block on each other.
//!
//! The ingress is an explicitly constructed context object handed to the
//! transport layer, never ambient state: build it at startup, share it
//! behind an `Arc`, drop it at shutdown.

use std::sync::Arc;

use chrono::{Duration, Utc};
use dashmap::DashMap;
use leadflow_config::model::{BotConfig, IngressConfig, LeadflowConfig};
use leadflow_core::funnel::{FunnelStateMachine, Transition};
use leadflow_core::types::{ContactId, Direction, FunnelStage, InboundEvent, Session, Signals};
use leadflow_core::{
    BoundedDedupSet, HumanHandoffDetector, LeadflowError, SessionStore, SignalExtractor,
};
use leadflow_crm::CrmSync;
use tracing::{debug, error, info, warn};

/// Synchronous outcome of event ingestion, returned to the delivering
/// channel before any downstream work runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckDecision {
    /// New event; processing was scheduled.
    Accepted,
    /// Already seen; dropped without further processing.
    Duplicate,
}

/// The webhook ingestion context.
pub struct WebhookIngress {
    dedup: BoundedDedupSet,
    store: Arc<dyn SessionStore>,
    extractor: Arc<dyn SignalExtractor>,
    crm: Option<Arc<CrmSync>>,
    detector: HumanHandoffDetector,
    /// Per-contact critical section shared by session upsert and CRM sync.
    contact_locks: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
    store_attempts: u32,
}

impl WebhookIngress {
    pub fn new(
        ingress: &IngressConfig,
        bot: &BotConfig,
        store: Arc<dyn SessionStore>,
        extractor: Arc<dyn SignalExtractor>,
        crm: Option<Arc<CrmSync>>,
    ) -> Self {
        let detector = HumanHandoffDetector::new(
            bot.sender_id.clone(),
            Duration::minutes(i64::from(ingress.auto_reactivate_minutes)),
            Duration::minutes(i64::from(ingress.handoff_window_minutes)),
        );
        Self {
            dedup: BoundedDedupSet::new(ingress.dedup_capacity),
            store,
            extractor,
            crm,
            detector,
            contact_locks: DashMap::new(),
            store_attempts: ingress.store_attempts.max(1),
        }
    }

    /// Wire the full pipeline from configuration, building the CRM sync
    /// (when credentials are present) with the deployment's local-time
    /// offset for appointment parsing and month-group placement.
    pub fn from_config(
        config: &LeadflowConfig,
        store: Arc<dyn SessionStore>,
        extractor: Arc<dyn SignalExtractor>,
    ) -> Result<Self, LeadflowError> {
        let crm =
            CrmSync::from_config(&config.crm, config.ingress.utc_offset_hours)?.map(Arc::new);
        Ok(Self::new(&config.ingress, &config.bot, store, extractor, crm))
    }

    /// Ingest one event.
    ///
    /// Returns immediately: the dedup check is the only work done before
    /// the acknowledgment decision. Everything after (session, funnel,
    /// CRM, handoff) runs in a spawned task whose failures are logged,
    /// never surfaced to the channel.
    pub fn handle(self: &Arc<Self>, event: InboundEvent) -> AckDecision {
        if !self.dedup.add(event.message_id.as_str()) {
            debug!(
                message_id = event.message_id.as_str(),
                contact = event.contact_id.as_str(),
                "duplicate delivery, dropping"
            );
            return AckDecision::Duplicate;
        }

        let ingress = Arc::clone(self);
        tokio::spawn(async move {
            ingress.process(event).await;
        });
        AckDecision::Accepted
    }

    /// Whether automated responses are currently suppressed for a contact.
    ///
    /// Exposed to the response-generation collaborator; while true, no
    /// automated send may be attempted.
    pub async fn is_silenced(&self, contact_id: &ContactId) -> Result<bool, LeadflowError> {
        let session = self.store.get(contact_id).await?;
        Ok(session.is_some_and(|s| s.is_silenced(Utc::now())))
    }

    /// Out-of-band stage update (human action): terminal stages bypass
    /// the rank check and retire the contact's current sales cycle.
    pub async fn set_stage_external(
        &self,
        contact_id: &ContactId,
        stage: FunnelStage,
    ) -> Result<Session, LeadflowError> {
        let lock = self.lock_for(contact_id);
        let _guard = lock.lock().await;

        let current = self
            .store
            .get(contact_id)
            .await?
            .map(|s| s.stage)
            .unwrap_or_default();
        let transition = FunnelStateMachine::set_external(current, stage)?;

        let session = self
            .store
            .upsert(contact_id, Box::new(move |s| s.stage = transition.next))
            .await?;
        info!(contact = contact_id.as_str(), stage = %stage, "stage set out-of-band");

        self.sync_crm(&session, &transition).await;
        Ok(session)
    }

    /// Full processing path, inside the per-contact critical section.
    async fn process(&self, event: InboundEvent) {
        let contact_id = event.contact_id.clone();
        let lock = self.lock_for(&contact_id);
        let _guard = lock.lock().await;

        let session = match self.get_with_retry(&contact_id).await {
            Ok(Some(session)) => session,
            // Sessions are created by the first inbound message; an
            // outbound echo for an unknown contact has nothing to update.
            Ok(None) if event.direction != Direction::Inbound => {
                debug!(
                    contact = contact_id.as_str(),
                    "outbound event for unknown contact, dropping"
                );
                return;
            }
            Ok(None) => Session::new(contact_id.clone(), Utc::now()),
            Err(e) => {
                error!(
                    contact = contact_id.as_str(),
                    error = %e,
                    "session read failed after retries, dropping event"
                );
                return;
            }
        };

        let silenced_until = self.detector.evaluate(&event, Utc::now());

        // Outbound events only feed the handoff detector and the audit
        // trail; signals and funnel transitions are inbound-only.
        let (signals, transition) = if event.direction == Direction::Inbound {
            let signals = match self.extractor.extract(&session, &event).await {
                Ok(signals) => signals,
                Err(e) => {
                    warn!(
                        contact = contact_id.as_str(),
                        error = %e,
                        "signal extraction failed, treating as no signals"
                    );
                    Signals::default()
                }
            };
            let transition = FunnelStateMachine::evaluate(session.stage, &signals);
            (signals, transition)
        } else {
            (
                Signals::default(),
                FunnelStateMachine::evaluate(session.stage, &Signals::default()),
            )
        };

        if transition.changed() {
            info!(
                contact = contact_id.as_str(),
                from = %transition.from_stage(),
                to = %transition.next,
                new_cycle = transition.starts_new_cycle,
                "funnel transition"
            );
        }
        if let Some(until) = silenced_until {
            info!(
                contact = contact_id.as_str(),
                until = %until,
                "human takeover detected, bot silenced"
            );
        }

        let updated = {
            let event = event.clone();
            let signals = signals.clone();
            self.upsert_with_retry(
                &contact_id,
                Box::new(move |s: &mut Session| {
                    s.stage = transition.next;
                    s.context.absorb(&signals);
                    if let Some(name) = &event.contact_name {
                        s.context.name = Some(name.clone());
                    }
                    if event.direction == Direction::Inbound {
                        s.context.turns += 1;
                        s.last_message_id = Some(event.message_id.clone());
                    }
                    if let Some(until) = silenced_until {
                        s.silenced_until = Some(until);
                    }
                }),
            )
            .await
        };

        let session = match updated {
            Ok(session) => session,
            Err(e) => {
                error!(
                    contact = contact_id.as_str(),
                    error = %e,
                    "session upsert failed after retries, dropping event"
                );
                return;
            }
        };

        if transition.changed() {
            self.sync_crm(&session, &transition).await;
        }
    }

    /// CRM failures are logged and swallowed; local state stays
    /// authoritative and the next event retries the sync.
    async fn sync_crm(&self, session: &Session, transition: &Transition) {
        let Some(crm) = &self.crm else {
            return;
        };
        match crm.sync(session, transition).await {
            Ok(lead) => debug!(
                contact = session.contact_id.as_str(),
                lead = %lead.0,
                "CRM sync complete"
            ),
            Err(e) => warn!(
                contact = session.contact_id.as_str(),
                error = %e,
                "CRM sync failed, will retry on next event"
            ),
        }
    }

    async fn get_with_retry(
        &self,
        contact_id: &ContactId,
    ) -> Result<Option<Session>, LeadflowError> {
        let mut last = None;
        for attempt in 0..self.store_attempts {
            match self.store.get(contact_id).await {
                Ok(session) => return Ok(session),
                Err(e) => {
                    warn!(attempt, error = %e, "session read failed");
                    last = Some(e);
                }
            }
        }
        Err(last.unwrap_or_else(|| LeadflowError::Internal("no attempts made".into())))
    }

    async fn upsert_with_retry(
        &self,
        contact_id: &ContactId,
        mutator: leadflow_core::traits::SessionMutator,
    ) -> Result<Session, LeadflowError> {
        let mutator: Arc<dyn Fn(&mut Session) + Send + Sync> = Arc::from(mutator);
        let mut last = None;
        for attempt in 0..self.store_attempts {
            let m = Arc::clone(&mutator);
            match self
                .store
                .upsert(contact_id, Box::new(move |s| m(s)))
                .await
            {
                Ok(session) => return Ok(session),
                Err(e) => {
                    warn!(attempt, error = %e, "session upsert failed");
                    last = Some(e);
                }
            }
        }
        Err(last.unwrap_or_else(|| LeadflowError::Internal("no attempts made".into())))
    }

    fn lock_for(&self, contact_id: &ContactId) -> Arc<tokio::sync::Mutex<()>> {
        self.contact_locks
            .entry(contact_id.as_str().to_string())
            .or_default()
            .clone()
    }
}
