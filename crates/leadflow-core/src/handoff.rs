// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Human-handoff detection and bot silencing.
//!
//! When a human agent takes over a conversation the bot must go quiet.
//! Detection is an ordered list of independent predicates over the same
//! event context, combined by logical OR: any positive signal opens a
//! silencing window. While silenced, ingestion still records events and
//! updates context; only outbound generation is suppressed.

use chrono::{DateTime, Duration, Utc};
use regex::RegexSet;
use tracing::debug;

use crate::types::{Direction, InboundEvent};

/// Everything a predicate may look at for one event.
pub struct HandoffContext<'a> {
    pub event: &'a InboundEvent,
    /// The bot's own sender identity on the channel.
    pub bot_sender_id: &'a str,
    /// Evaluation time; events older than the detection window are ignored.
    pub now: DateTime<Utc>,
    pub window: Duration,
}

impl HandoffContext<'_> {
    /// Outbound message inside the trailing detection window.
    fn recent_outbound(&self) -> bool {
        self.event.direction == Direction::Outbound
            && self.now.signed_duration_since(self.event.timestamp) <= self.window
    }
}

/// One independently testable handoff heuristic.
pub trait HandoffPredicate: Send + Sync {
    fn name(&self) -> &'static str;
    fn matches(&self, ctx: &HandoffContext<'_>) -> bool;
}

/// Characteristic human-only markers (emoji) in an outbound message
/// attributed to a non-bot sender.
pub struct EmojiMarker;

impl EmojiMarker {
    fn has_emoji(text: &str) -> bool {
        text.chars().any(|c| {
            let cp = c as u32;
            (0x1F300..=0x1FAFF).contains(&cp)
                || (0x2600..=0x27BF).contains(&cp)
                || (0x1F000..=0x1F0FF).contains(&cp)
        })
    }
}

impl HandoffPredicate for EmojiMarker {
    fn name(&self) -> &'static str {
        "emoji-marker"
    }

    fn matches(&self, ctx: &HandoffContext<'_>) -> bool {
        ctx.recent_outbound()
            && !ctx.event.sender_is_bot
            && ctx.event.text.as_deref().is_some_and(Self::has_emoji)
    }
}

/// Known human-agent phrase patterns in an outbound message.
pub struct AgentPhrase {
    patterns: RegexSet,
}

impl AgentPhrase {
    pub fn new() -> Self {
        // Phrases the sales team actually types; the bot never produces these.
        let patterns = RegexSet::new([
            r"(?i)soy\s+el\s+asesor",
            r"(?i)le\s+atiende\b",
            r"(?i)quedo\s+a\s+sus\s+[oó]rdenes",
            r"(?i)en\s+un\s+momento\s+le\s+(llamo|marco)",
            r"(?i)con\s+gusto\s+le\s+apoyo",
        ])
        .expect("agent phrase patterns are valid");
        Self { patterns }
    }
}

impl Default for AgentPhrase {
    fn default() -> Self {
        Self::new()
    }
}

impl HandoffPredicate for AgentPhrase {
    fn name(&self) -> &'static str {
        "agent-phrase"
    }

    fn matches(&self, ctx: &HandoffContext<'_>) -> bool {
        ctx.event.direction == Direction::Outbound
            && ctx
                .event
                .text
                .as_deref()
                .is_some_and(|t| self.patterns.is_match(t))
    }
}

/// Outbound message from a sender identity distinct from the bot's own
/// within the detection window.
pub struct ForeignSender;

impl HandoffPredicate for ForeignSender {
    fn name(&self) -> &'static str {
        "foreign-sender"
    }

    fn matches(&self, ctx: &HandoffContext<'_>) -> bool {
        ctx.recent_outbound() && ctx.event.sender_id != ctx.bot_sender_id
    }
}

/// Decides whether a human agent has taken over a conversation.
pub struct HumanHandoffDetector {
    bot_sender_id: String,
    auto_reactivate: Duration,
    window: Duration,
    predicates: Vec<Box<dyn HandoffPredicate>>,
}

impl HumanHandoffDetector {
    /// Detector with the standard predicate set.
    ///
    /// `auto_reactivate` is how long the bot stays silent after a trigger;
    /// `window` is the trailing span in which outbound markers count.
    pub fn new(bot_sender_id: String, auto_reactivate: Duration, window: Duration) -> Self {
        Self {
            bot_sender_id,
            auto_reactivate,
            window,
            predicates: vec![
                Box::new(EmojiMarker),
                Box::new(AgentPhrase::new()),
                Box::new(ForeignSender),
            ],
        }
    }

    /// Evaluate one message event. Returns the new `silenced_until`
    /// timestamp when a human takeover is detected, `None` otherwise.
    ///
    /// All predicates are evaluated; any positive one triggers silencing.
    pub fn evaluate(&self, event: &InboundEvent, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let ctx = HandoffContext {
            event,
            bot_sender_id: &self.bot_sender_id,
            now,
            window: self.window,
        };
        for predicate in &self.predicates {
            if predicate.matches(&ctx) {
                debug!(
                    predicate = predicate.name(),
                    contact = %event.contact_id.as_str(),
                    "human takeover detected, silencing bot"
                );
                return Some(now + self.auto_reactivate);
            }
        }
        None
    }
}
