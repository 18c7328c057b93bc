// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types used across the Leadflow crates.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// Stable key identifying a conversation's counterpart (canonical phone/JID).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContactId(pub String);

impl ContactId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Unique identifier for an inbound or outbound message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl MessageId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Direction of a message relative to the backbone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Inbound,
    Outbound,
}

/// An event delivered by the channel gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundEvent {
    pub message_id: MessageId,
    pub contact_id: ContactId,
    pub direction: Direction,
    /// Sender identity as reported by the channel (may differ from the
    /// contact for outbound messages echoed back by the provider).
    pub sender_id: String,
    /// Whether the channel attributes this message to the bot itself.
    pub sender_is_bot: bool,
    /// Contact display name as pushed by the channel, if any.
    pub contact_name: Option<String>,
    pub text: Option<String>,
    /// Reference to attached media, if any. Transcription is a
    /// collaborator concern; the backbone only carries the reference.
    pub media_ref: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Discrete phase in the sales pipeline assigned to a contact.
///
/// The `Display`/`FromStr` forms are the exact CRM board labels, so stage
/// values round-trip through the external system's vocabulary.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    EnumIter,
    Serialize,
    Deserialize,
)]
pub enum FunnelStage {
    #[default]
    #[strum(serialize = "1er Contacto")]
    FirstContact,
    #[strum(serialize = "Intención")]
    Intent,
    #[strum(serialize = "Cotización")]
    Quoted,
    #[strum(serialize = "Cita Programada")]
    AppointmentScheduled,
    /// Override stage: applicable from any non-terminal stage, never
    /// undone by a later positive signal.
    #[strum(serialize = "Sin Interes")]
    NotInterested,
    #[strum(serialize = "Cita Asistida")]
    AppointmentAttended,
    #[strum(serialize = "Cita No Asistida")]
    AppointmentMissed,
    #[strum(serialize = "Venta Cerrada")]
    SaleClosed,
    #[strum(serialize = "Financiamiento en Proceso")]
    FinancingInProgress,
    #[strum(serialize = "Venta Caida")]
    SaleFallenThrough,
}

impl FunnelStage {
    /// Hierarchy rank for monotonic advancement. `None` for the override
    /// and terminal stages, which sit outside the rank order.
    pub fn rank(&self) -> Option<u8> {
        match self {
            FunnelStage::FirstContact => Some(1),
            FunnelStage::Intent => Some(2),
            FunnelStage::Quoted => Some(3),
            FunnelStage::AppointmentScheduled => Some(4),
            _ => None,
        }
    }

    /// Stages reachable only through an out-of-band (human) update.
    pub fn is_external_only(&self) -> bool {
        matches!(
            self,
            FunnelStage::AppointmentAttended
                | FunnelStage::AppointmentMissed
                | FunnelStage::SaleClosed
                | FunnelStage::FinancingInProgress
                | FunnelStage::SaleFallenThrough
        )
    }

    /// Whether this stage closes the current sales cycle: the next
    /// bot-driven signal must start a fresh cycle (and a fresh CRM record)
    /// rather than mutate the retired one.
    pub fn ends_cycle(&self) -> bool {
        self.is_external_only() || matches!(self, FunnelStage::NotInterested)
    }
}

/// A confirmed appointment, parsed from free text by a collaborator or by
/// the CRM schedule parser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appointment {
    pub date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<NaiveTime>,
}

/// Signals extracted from an inbound event by the NLU collaborator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signals {
    /// Vehicle model the contact showed interest in, verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vehicle: Option<String>,
    /// Appointment the contact confirmed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub appointment_confirmed: Option<Appointment>,
    #[serde(default)]
    pub disinterest: bool,
    #[serde(default)]
    pub quoted: bool,
}

impl Signals {
    /// True when no signal is present: the funnel performs a no-op
    /// transition and no CRM mutation is emitted.
    pub fn is_empty(&self) -> bool {
        self.vehicle.is_none()
            && self.appointment_confirmed.is_none()
            && !self.disinterest
            && !self.quoted
    }
}

/// Free-form conversation state owned exclusively by the session.
///
/// A fixed set of optional named fields rather than an open dictionary;
/// `extra` is the escape hatch for forward-compatible untyped fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionContext {
    /// Contact display name, when the channel provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vehicle: Option<String>,
    /// Payment preference as stated by the contact ("contado", "credito").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment: Option<String>,
    /// Appointment text as the contact phrased it, before parsing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub appointment_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub appointment: Option<Appointment>,
    /// Cursor into the photo carousel shown so far.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_cursor: Option<u32>,
    /// Processed inbound turns for this contact across all cycles.
    #[serde(default)]
    pub turns: u32,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl SessionContext {
    /// Fold extracted signals into the context. Present signal fields
    /// overwrite (last-write-wins); absent ones leave prior values alone.
    pub fn absorb(&mut self, signals: &Signals) {
        if let Some(vehicle) = &signals.vehicle {
            self.vehicle = Some(vehicle.clone());
        }
        if let Some(appointment) = &signals.appointment_confirmed {
            self.appointment = Some(appointment.clone());
        }
    }
}

/// Durable per-contact conversation state: the single source of truth
/// read and written by every other component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub contact_id: ContactId,
    pub stage: FunnelStage,
    pub context: SessionContext,
    /// Most recently processed inbound message id (secondary dedup signal
    /// and audit trail).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message_id: Option<MessageId>,
    pub updated_at: DateTime<Utc>,
    /// While set and in the future, automated responses are suppressed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub silenced_until: Option<DateTime<Utc>>,
}

impl Session {
    /// A fresh session for a contact never seen before.
    pub fn new(contact_id: ContactId, now: DateTime<Utc>) -> Self {
        Self {
            contact_id,
            stage: FunnelStage::FirstContact,
            context: SessionContext::default(),
            last_message_id: None,
            updated_at: now,
            silenced_until: None,
        }
    }

    /// Whether the silencing window is active at `now`.
    pub fn is_silenced(&self, now: DateTime<Utc>) -> bool {
        self.silenced_until.is_some_and(|until| until > now)
    }
}
