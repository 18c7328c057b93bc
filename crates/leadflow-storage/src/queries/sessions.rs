// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session row mapping and CRUD operations.
//!
//! Stage values are stored as their CRM board labels (the `Display` form
//! of `FunnelStage`) and timestamps as RFC 3339 with millisecond
//! precision, so rows stay readable in ad-hoc inspection.

use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use leadflow_core::types::{ContactId, FunnelStage, MessageId, Session, SessionContext};
use leadflow_core::LeadflowError;
use rusqlite::params;

use crate::database::{map_tr_err, Database};

const SELECT_COLUMNS: &str =
    "contact_id, stage, context, last_message_id, updated_at, silenced_until";

/// Fetch a session by contact id.
pub async fn get_session(
    db: &Database,
    contact_id: &ContactId,
) -> Result<Option<Session>, LeadflowError> {
    let contact_id = contact_id.as_str().to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SELECT_COLUMNS} FROM sessions WHERE contact_id = ?1"
            ))?;
            let result = stmt.query_row(params![contact_id], row_to_parts);
            match result {
                Ok(parts) => Ok(Some(parts_to_session(parts)?)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Insert or replace the contact's session row.
pub async fn upsert_session(db: &Database, session: &Session) -> Result<(), LeadflowError> {
    let contact_id = session.contact_id.as_str().to_string();
    let stage = session.stage.to_string();
    let context = serde_json::to_string(&session.context).map_err(|e| LeadflowError::Storage {
        source: Box::new(e),
    })?;
    let last_message_id = session.last_message_id.as_ref().map(|m| m.as_str().to_string());
    let updated_at = format_ts(session.updated_at);
    let silenced_until = session.silenced_until.map(format_ts);

    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO sessions (contact_id, stage, context, last_message_id, updated_at, silenced_until)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(contact_id) DO UPDATE SET
                     stage = excluded.stage,
                     context = excluded.context,
                     last_message_id = excluded.last_message_id,
                     updated_at = excluded.updated_at,
                     silenced_until = excluded.silenced_until",
                params![
                    contact_id,
                    stage,
                    context,
                    last_message_id,
                    updated_at,
                    silenced_until,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Raw column values before domain conversion.
type RowParts = (String, String, String, Option<String>, String, Option<String>);

fn row_to_parts(row: &rusqlite::Row<'_>) -> Result<RowParts, rusqlite::Error> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

fn parts_to_session(parts: RowParts) -> Result<Session, tokio_rusqlite::Error> {
    let (contact_id, stage, context, last_message_id, updated_at, silenced_until) = parts;
    let stage = FunnelStage::from_str(&stage)
        .map_err(|e| tokio_rusqlite::Error::Other(Box::new(e)))?;
    let context: SessionContext = serde_json::from_str(&context)
        .map_err(|e| tokio_rusqlite::Error::Other(Box::new(e)))?;
    Ok(Session {
        contact_id: ContactId(contact_id),
        stage,
        context,
        last_message_id: last_message_id.map(MessageId),
        updated_at: parse_ts(&updated_at)?,
        silenced_until: silenced_until.as_deref().map(parse_ts).transpose()?,
    })
}

fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>, tokio_rusqlite::Error> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| tokio_rusqlite::Error::Other(Box::new(e)))
}
