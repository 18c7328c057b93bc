// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Lead-item projection: dedup-before-create, cycle handling, and field
//! mapping.
//!
//! One lead item is active per contact per sales cycle. A contact found
//! in a terminal stage on the board gets a fresh item instead of a
//! mutation of the retired one. The board's funnel column only advances,
//! mirroring the local state machine, so a lagging or reordered sync can
//! never pull a lead backwards.

use chrono::{FixedOffset, NaiveDateTime, Utc};
use leadflow_config::model::{CrmColumns, CrmConfig};
use leadflow_core::funnel::Transition;
use leadflow_core::types::{FunnelStage, Session};
use leadflow_core::LeadflowError;
use serde_json::{json, Map, Value};
use std::str::FromStr;
use tracing::{debug, info, warn};

use crate::client::BoardClient;
use crate::labels::{month_group_name, resolve_payment, resolve_vehicle, PAYMENT_UNDEFINED};
use crate::schedule::parse_appointment;

const FALLBACK_LEAD_NAME: &str = "Lead sin nombre";

/// Reference to a lead item on the board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeadRef(pub String);

/// A lead located by the dedup search.
#[derive(Debug)]
struct FoundLead {
    id: String,
    stage: Option<FunnelStage>,
}

/// Projects sessions and funnel transitions into board mutations.
pub struct CrmSync {
    client: BoardClient,
    board_id: String,
    columns: CrmColumns,
    utc_offset_hours: i8,
}

impl CrmSync {
    pub fn new(
        client: BoardClient,
        board_id: String,
        columns: CrmColumns,
        utc_offset_hours: i8,
    ) -> Self {
        Self {
            client,
            board_id,
            columns,
            utc_offset_hours,
        }
    }

    /// Build from config. Returns `None` when the CRM section is inert
    /// (no token or board id): synchronization is disabled, not an error.
    pub fn from_config(
        config: &CrmConfig,
        utc_offset_hours: i8,
    ) -> Result<Option<Self>, LeadflowError> {
        let (Some(token), Some(board_id)) = (&config.api_token, &config.board_id) else {
            info!("CRM sync disabled: api_token or board_id not configured");
            return Ok(None);
        };
        let client = BoardClient::new(config.api_url.clone(), token.clone(), config.max_attempts)?;
        Ok(Some(Self::new(
            client,
            board_id.clone(),
            config.columns.clone(),
            utc_offset_hours,
        )))
    }

    /// Synchronize one transition for a contact.
    ///
    /// Local session state is authoritative; an error here is non-fatal
    /// and the next event for the contact retries from current state.
    pub async fn sync(
        &self,
        session: &Session,
        transition: &Transition,
    ) -> Result<LeadRef, LeadflowError> {
        let phone = sanitize_phone(session.contact_id.as_str());
        if phone.is_empty() {
            return Err(LeadflowError::Crm {
                message: "lead has no usable phone, cannot sync".into(),
                source: None,
            });
        }

        let active = match self.find_lead_by_phone(&phone).await? {
            Some(found) if found.stage.is_some_and(|s| s.ends_cycle()) => {
                debug!(phone, prior = %found.id, "lead cycle closed, creating a new item");
                None
            }
            Some(_) if transition.starts_new_cycle => None,
            other => other,
        };

        let item_id = match active {
            Some(found) => {
                let column_values =
                    self.build_column_values(session, transition.next, false, found.stage, &phone);
                self.update_lead(session, &phone, &found.id, column_values, transition)
                    .await?;
                found.id
            }
            None => {
                let column_values =
                    self.build_column_values(session, transition.next, true, None, &phone);
                self.create_lead(session, &phone, column_values).await?
            }
        };

        Ok(LeadRef(item_id))
    }

    /// Search the dedup column for the contact's phone, returning the
    /// most recently created item when several match.
    async fn find_lead_by_phone(&self, phone: &str) -> Result<Option<FoundLead>, LeadflowError> {
        let Some(dedupe_col) = &self.columns.dedupe_phone else {
            warn!("no dedupe column configured, every sync will create a new lead");
            return Ok(None);
        };

        let query = "query ($board_id: ID!, $col_id: String!, $val: String!) {
            items_page_by_column_values(
                limit: 10,
                board_id: $board_id,
                columns: [{column_id: $col_id, column_values: [$val]}]
            ) { items { id name column_values { id text } } }
        }";
        let variables = json!({
            "board_id": self.board_id,
            "col_id": dedupe_col,
            "val": phone,
        });

        let body = self.client.graphql(query, variables).await?;
        let items = body["data"]["items_page_by_column_values"]["items"]
            .as_array()
            .cloned()
            .unwrap_or_default();

        let best = items.into_iter().max_by_key(|item| {
            item["id"]
                .as_str()
                .and_then(|id| id.parse::<i64>().ok())
                .unwrap_or(0)
        });
        let Some(item) = best else {
            return Ok(None);
        };

        let id = item["id"].as_str().unwrap_or_default().to_string();
        if id.is_empty() {
            return Ok(None);
        }

        let stage = self.columns.stage.as_ref().and_then(|stage_col| {
            item["column_values"].as_array().and_then(|cols| {
                cols.iter()
                    .find(|col| col["id"].as_str() == Some(stage_col.as_str()))
                    .and_then(|col| col["text"].as_str())
                    .and_then(|text| FunnelStage::from_str(text.trim()).ok())
            })
        });

        Ok(Some(FoundLead { id, stage }))
    }

    /// Assemble the column_values payload for a create or update.
    ///
    /// The stage column is written only when the funnel advances (or the
    /// item is new, or the override applies); everything else is
    /// last-write-wins.
    fn build_column_values(
        &self,
        session: &Session,
        stage: FunnelStage,
        is_new: bool,
        board_stage: Option<FunnelStage>,
        phone: &str,
    ) -> Map<String, Value> {
        let mut vals = Map::new();

        if let Some(col) = &self.columns.dedupe_phone {
            vals.insert(col.clone(), json!(phone));
        }
        if let (Some(col), Some(msg_id)) = (&self.columns.last_message_id, &session.last_message_id)
        {
            vals.insert(col.clone(), json!(msg_id.as_str()));
        }
        if let Some(col) = &self.columns.phone {
            vals.insert(col.clone(), json!({"phone": phone, "countryShortName": "MX"}));
        }

        if let Some(col) = &self.columns.stage {
            let advance = board_stage.is_none_or(|current| stage.rank() > current.rank());
            // Overrides sit outside the rank order and always win: the
            // NotInterested signal and the human-set terminal stages.
            let overrides = stage == FunnelStage::NotInterested || stage.is_external_only();
            if is_new || overrides || advance {
                vals.insert(col.clone(), json!({"label": stage.to_string()}));
            } else {
                debug!(current = ?board_stage, candidate = %stage, "funnel does not regress, stage kept");
            }
        }

        if let Some(col) = &self.columns.vehicle {
            if let Some(label) = session.context.vehicle.as_deref().and_then(resolve_vehicle) {
                vals.insert(col.clone(), json!({"labels": [label]}));
            }
        }

        if let Some(col) = &self.columns.payment {
            let label = resolve_payment(session.context.payment.as_deref());
            if is_new || label != PAYMENT_UNDEFINED {
                vals.insert(col.clone(), json!({"label": label}));
            }
        }

        if let Some(col) = &self.columns.appointment {
            if let Some(appt) = self.appointment_of(session) {
                let mut value = Map::new();
                value.insert("date".into(), json!(appt.date.to_string()));
                if let Some(time) = appt.time {
                    value.insert("time".into(), json!(time.format("%H:%M:%S").to_string()));
                }
                vals.insert(col.clone(), Value::Object(value));
            }
        }

        vals
    }

    fn appointment_of(&self, session: &Session) -> Option<leadflow_core::types::Appointment> {
        session.context.appointment.clone().or_else(|| {
            session
                .context
                .appointment_text
                .as_deref()
                .and_then(|text| parse_appointment(text, self.local_now()))
        })
    }

    async fn create_lead(
        &self,
        session: &Session,
        phone: &str,
        column_values: Map<String, Value>,
    ) -> Result<String, LeadflowError> {
        let name = session
            .context
            .name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(FALLBACK_LEAD_NAME);
        let item_name = format!("{name} | {phone}");

        let group_name = month_group_name(self.local_now().date());
        let group_id = self.find_group_id(&group_name).await?;

        info!(phone, group = %group_name, stage = %session.stage, "creating lead item");

        let vals = serde_json::to_string(&column_values).map_err(|e| LeadflowError::Crm {
            message: format!("failed to encode column values: {e}"),
            source: Some(Box::new(e)),
        })?;

        let body = if let Some(group_id) = group_id {
            let query = "mutation ($board_id: ID!, $group_id: String!, $name: String!, $vals: JSON!) {
                create_item(board_id: $board_id, group_id: $group_id, item_name: $name, column_values: $vals) { id }
            }";
            self.client
                .graphql(
                    query,
                    json!({
                        "board_id": self.board_id,
                        "group_id": group_id,
                        "name": item_name,
                        "vals": vals,
                    }),
                )
                .await?
        } else {
            let query = "mutation ($board_id: ID!, $name: String!, $vals: JSON!) {
                create_item(board_id: $board_id, item_name: $name, column_values: $vals) { id }
            }";
            self.client
                .graphql(
                    query,
                    json!({
                        "board_id": self.board_id,
                        "name": item_name,
                        "vals": vals,
                    }),
                )
                .await?
        };

        let item_id = body["data"]["create_item"]["id"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| LeadflowError::Crm {
                message: "create_item returned no id".into(),
                source: None,
            })?;

        self.append_note(&item_id, &self.creation_note(session, phone))
            .await;
        Ok(item_id)
    }

    async fn update_lead(
        &self,
        session: &Session,
        phone: &str,
        item_id: &str,
        column_values: Map<String, Value>,
        transition: &Transition,
    ) -> Result<(), LeadflowError> {
        info!(phone, item_id, stage = %transition.next, "updating lead item");

        if !column_values.is_empty() {
            let vals = serde_json::to_string(&column_values).map_err(|e| LeadflowError::Crm {
                message: format!("failed to encode column values: {e}"),
                source: Some(Box::new(e)),
            })?;
            let query = "mutation ($item_id: ID!, $board_id: ID!, $vals: JSON!) {
                change_multiple_column_values(item_id: $item_id, board_id: $board_id, column_values: $vals) { id }
            }";
            self.client
                .graphql(
                    query,
                    json!({
                        "item_id": item_id,
                        "board_id": self.board_id,
                        "vals": vals,
                    }),
                )
                .await?;
        }

        // Promote the placeholder item name once a real name is known.
        if let Some(name) = session
            .context
            .name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
        {
            let query = "mutation ($board_id: ID!, $item_id: ID!, $value: String!) {
                change_simple_column_value(board_id: $board_id, item_id: $item_id, column_id: \"name\", value: $value) { id }
            }";
            let rename = self
                .client
                .graphql(
                    query,
                    json!({
                        "board_id": self.board_id,
                        "item_id": item_id,
                        "value": format!("{name} | {phone}"),
                    }),
                )
                .await;
            if let Err(e) = rename {
                warn!(item_id, error = %e, "failed to update lead item name");
            }
        }

        if transition.changed() {
            self.append_note(
                item_id,
                &format!("Actualizado a etapa: {}", transition.next),
            )
            .await;
        }
        Ok(())
    }

    async fn find_group_id(&self, group_name: &str) -> Result<Option<String>, LeadflowError> {
        let query = "query ($board_id: ID!) {
            boards(ids: [$board_id]) { groups { id title } }
        }";
        let body = self
            .client
            .graphql(query, json!({ "board_id": self.board_id }))
            .await?;

        let groups = body["data"]["boards"][0]["groups"]
            .as_array()
            .cloned()
            .unwrap_or_default();
        for group in groups {
            if group["title"]
                .as_str()
                .is_some_and(|t| t.eq_ignore_ascii_case(group_name))
            {
                return Ok(group["id"].as_str().map(str::to_string));
            }
        }
        warn!(group = group_name, "month group not found on board");
        Ok(None)
    }

    /// Notes are best-effort: a failure is logged, never propagated.
    async fn append_note(&self, item_id: &str, note: &str) {
        let query = "mutation ($item_id: ID!, $body: String!) {
            create_update(item_id: $item_id, body: $body) { id }
        }";
        if let Err(e) = self
            .client
            .graphql(query, json!({ "item_id": item_id, "body": note }))
            .await
        {
            warn!(item_id, error = %e, "failed to append lead note");
        }
    }

    fn creation_note(&self, session: &Session, phone: &str) -> String {
        let name = session.context.name.as_deref().unwrap_or(FALLBACK_LEAD_NAME);
        let interest = session.context.vehicle.as_deref().unwrap_or("N/A");
        let mut note = format!(
            "ETAPA: {}\nNombre: {name}\nTel: {phone}\nInterés: {interest}\n",
            session.stage
        );
        if let Some(appt) = self.appointment_of(session) {
            note.push_str(&format!("Cita: {}", appt.date));
            if let Some(time) = appt.time {
                note.push_str(&format!(" {}", time.format("%H:%M:%S")));
            }
            note.push('\n');
        }
        note.push_str(&format!(
            "Pago: {}\n",
            resolve_payment(session.context.payment.as_deref())
        ));
        note
    }

    fn local_now(&self) -> NaiveDateTime {
        let offset = FixedOffset::east_opt(i32::from(self.utc_offset_hours) * 3600)
            .unwrap_or_else(|| FixedOffset::east_opt(0).expect("zero offset is valid"));
        Utc::now().with_timezone(&offset).naive_local()
    }
}

/// Normalize a contact identifier into the digits-only dedup key.
pub fn sanitize_phone(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}
