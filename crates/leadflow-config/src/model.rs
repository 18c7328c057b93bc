// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Leadflow backbone.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level Leadflow configuration.
///
/// Loaded from TOML with environment variable overrides. All sections are
/// optional and default to sensible values; the CRM section is inert
/// until an API token and board id are provided.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LeadflowConfig {
    /// Bot identity and logging settings.
    #[serde(default)]
    pub bot: BotConfig,

    /// Session store settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// CRM board synchronization settings.
    #[serde(default)]
    pub crm: CrmConfig,

    /// Webhook ingestion settings.
    #[serde(default)]
    pub ingress: IngressConfig,
}

/// Bot identity and logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BotConfig {
    /// Display name of the bot persona.
    #[serde(default = "default_bot_name")]
    pub name: String,

    /// The bot's own sender identity on the channel, used by the
    /// human-handoff detector to recognize foreign senders.
    #[serde(default)]
    pub sender_id: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            name: default_bot_name(),
            sender_id: String::new(),
            log_level: default_log_level(),
        }
    }
}

fn default_bot_name() -> String {
    "leadflow".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Session store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

fn default_database_path() -> String {
    "leadflow.db".to_string()
}

/// CRM board synchronization configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CrmConfig {
    /// CRM API token. `None` disables synchronization.
    #[serde(default)]
    pub api_token: Option<String>,

    /// Board holding the lead items.
    #[serde(default)]
    pub board_id: Option<String>,

    /// GraphQL endpoint of the CRM.
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Total attempts per mutation, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Board column ids, keyed by purpose.
    #[serde(default)]
    pub columns: CrmColumns,
}

impl Default for CrmConfig {
    fn default() -> Self {
        Self {
            api_token: None,
            board_id: None,
            api_url: default_api_url(),
            max_attempts: default_max_attempts(),
            columns: CrmColumns::default(),
        }
    }
}

fn default_api_url() -> String {
    "https://api.monday.com/v2".to_string()
}

fn default_max_attempts() -> u32 {
    3
}

/// Board column ids for the lead item projection.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CrmColumns {
    /// Digits-only phone column used as the dedup key.
    #[serde(default)]
    pub dedupe_phone: Option<String>,

    /// Last processed message id (audit trail).
    #[serde(default)]
    pub last_message_id: Option<String>,

    /// Display phone column.
    #[serde(default)]
    pub phone: Option<String>,

    /// Funnel stage status column.
    #[serde(default)]
    pub stage: Option<String>,

    /// Vehicle dropdown column.
    #[serde(default)]
    pub vehicle: Option<String>,

    /// Payment status column.
    #[serde(default)]
    pub payment: Option<String>,

    /// Appointment date column.
    #[serde(default)]
    pub appointment: Option<String>,
}

/// Webhook ingestion configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct IngressConfig {
    /// Capacity of the in-memory message-id dedup set.
    #[serde(default = "default_dedup_capacity")]
    pub dedup_capacity: usize,

    /// How long the bot stays silent after a human takeover, in minutes.
    #[serde(default = "default_auto_reactivate_minutes")]
    pub auto_reactivate_minutes: u32,

    /// Trailing window in which outbound handoff markers count, in minutes.
    #[serde(default = "default_handoff_window_minutes")]
    pub handoff_window_minutes: u32,

    /// Local-retry attempts for session store failures before the event
    /// is dropped.
    #[serde(default = "default_store_attempts")]
    pub store_attempts: u32,

    /// Offset from UTC of the dealership's local time, in hours. Used to
    /// anchor appointment parsing and month-group placement.
    #[serde(default = "default_utc_offset_hours")]
    pub utc_offset_hours: i8,
}

impl Default for IngressConfig {
    fn default() -> Self {
        Self {
            dedup_capacity: default_dedup_capacity(),
            auto_reactivate_minutes: default_auto_reactivate_minutes(),
            handoff_window_minutes: default_handoff_window_minutes(),
            store_attempts: default_store_attempts(),
            utc_offset_hours: default_utc_offset_hours(),
        }
    }
}

fn default_dedup_capacity() -> usize {
    8000
}

fn default_auto_reactivate_minutes() -> u32 {
    240
}

fn default_handoff_window_minutes() -> u32 {
    10
}

fn default_store_attempts() -> u32 {
    2
}

fn default_utc_offset_hours() -> i8 {
    // America/Mexico_City, no DST since 2022.
    -6
}
