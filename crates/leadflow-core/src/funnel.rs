// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The sales-funnel stage machine.
//!
//! A pure function of `(current stage, signals)`. The funnel only ever
//! moves forward by rank, which makes re-applying an older event's signals
//! after a newer one harmless: out-of-order webhook delivery cannot
//! regress a contact's stage.

use tracing::debug;

use crate::error::LeadflowError;
use crate::types::{FunnelStage, Signals};

/// Outcome of evaluating one event's signals against the current stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub next: FunnelStage,
    /// True when the contact's previous cycle was closed by a terminal
    /// stage and this event opens a fresh one: CRM sync must create a new
    /// lead record rather than mutate the retired one.
    pub starts_new_cycle: bool,
    from: FunnelStage,
}

impl Transition {
    /// Whether anything observable happened. A no-op transition emits no
    /// CRM mutation.
    pub fn changed(&self) -> bool {
        self.next != self.from || self.starts_new_cycle
    }

    pub fn from_stage(&self) -> FunnelStage {
        self.from
    }
}

/// Computes the next funnel stage from detected signals.
pub struct FunnelStateMachine;

impl FunnelStateMachine {
    /// Evaluate bot-driven signals against the current stage.
    ///
    /// Rules, in order:
    /// 1. No signals: no-op transition.
    /// 2. Current stage closed the cycle: restart from `FirstContact`
    ///    with `starts_new_cycle` set, then apply the signals to the
    ///    fresh cycle.
    /// 3. Disinterest overrides to `NotInterested`.
    /// 4. Otherwise advance to the highest-rank stage implied by the
    ///    signal set, never below the current rank. Simultaneous signals
    ///    are evaluated together (max rank), not sequentially.
    ///
    /// Terminal stages are never produced here; see [`Self::set_external`].
    pub fn evaluate(current: FunnelStage, signals: &Signals) -> Transition {
        if signals.is_empty() {
            return Transition {
                next: current,
                starts_new_cycle: false,
                from: current,
            };
        }

        let (effective, starts_new_cycle) = if current.ends_cycle() {
            debug!(stage = %current, "terminal stage, starting new sales cycle");
            (FunnelStage::FirstContact, true)
        } else {
            (current, false)
        };

        if signals.disinterest {
            return Transition {
                next: FunnelStage::NotInterested,
                starts_new_cycle,
                from: current,
            };
        }

        let implied = Self::implied_stage(signals);
        let next = if implied.rank() > effective.rank() {
            implied
        } else {
            effective
        };

        Transition {
            next,
            starts_new_cycle,
            from: current,
        }
    }

    /// Accept a direct out-of-band stage-set request (human action),
    /// bypassing the rank check. Only external-only stages are valid here.
    pub fn set_external(
        current: FunnelStage,
        requested: FunnelStage,
    ) -> Result<Transition, LeadflowError> {
        if !requested.is_external_only() {
            return Err(LeadflowError::Internal(format!(
                "stage '{requested}' cannot be set out-of-band"
            )));
        }
        Ok(Transition {
            next: requested,
            starts_new_cycle: false,
            from: current,
        })
    }

    /// Highest-rank stage implied by the signal set. Any non-empty signal
    /// set implies at least `FirstContact`.
    fn implied_stage(signals: &Signals) -> FunnelStage {
        if signals.appointment_confirmed.is_some() {
            FunnelStage::AppointmentScheduled
        } else if signals.quoted {
            FunnelStage::Quoted
        } else if signals.vehicle.is_some() {
            FunnelStage::Intent
        } else {
            FunnelStage::FirstContact
        }
    }
}
