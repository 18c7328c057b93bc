// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the core `SessionStore` trait.
//!
//! Upserts are read-modify-write under a per-contact async mutex, so
//! concurrent events for the same contact never interleave their updates.
//! Different contacts take different locks and proceed independently;
//! the SQLite single-writer thread is the only point they share.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use leadflow_config::model::StorageConfig;
use leadflow_core::traits::{SessionMutator, SessionStore};
use leadflow_core::types::{ContactId, Session};
use leadflow_core::LeadflowError;
use tracing::debug;

use crate::database::Database;
use crate::queries;

/// SQLite-backed session store.
pub struct SqliteSessionStore {
    db: Database,
    upsert_locks: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
}

impl SqliteSessionStore {
    /// Open the store at the configured path, running migrations.
    pub async fn open(config: &StorageConfig) -> Result<Self, LeadflowError> {
        let db = Database::open(&config.database_path).await?;
        debug!(path = %config.database_path, "session store opened");
        Ok(Self {
            db,
            upsert_locks: DashMap::new(),
        })
    }

    fn lock_for(&self, contact_id: &ContactId) -> Arc<tokio::sync::Mutex<()>> {
        self.upsert_locks
            .entry(contact_id.as_str().to_string())
            .or_default()
            .clone()
    }
}

fn truncate_to_millis(ts: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ts.timestamp_millis()).unwrap_or(ts)
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn get(&self, contact_id: &ContactId) -> Result<Option<Session>, LeadflowError> {
        queries::sessions::get_session(&self.db, contact_id).await
    }

    async fn upsert(
        &self,
        contact_id: &ContactId,
        mutator: SessionMutator,
    ) -> Result<Session, LeadflowError> {
        let lock = self.lock_for(contact_id);
        let _guard = lock.lock().await;

        let mut session = queries::sessions::get_session(&self.db, contact_id)
            .await?
            .unwrap_or_else(|| Session::new(contact_id.clone(), Utc::now()));
        let previous = truncate_to_millis(session.updated_at);

        mutator(&mut session);

        // Rows carry millisecond precision, so the in-memory value is
        // truncated to match what a reload would return. updated_at must
        // strictly increase even when the clock has not advanced between
        // two upserts for the same contact.
        let now = truncate_to_millis(Utc::now());
        session.updated_at = if now > previous {
            now
        } else {
            previous + Duration::milliseconds(1)
        };

        queries::sessions::upsert_session(&self.db, &session).await?;
        Ok(session)
    }

    async fn close(&self) -> Result<(), LeadflowError> {
        self.db.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use leadflow_core::types::{FunnelStage, MessageId};
    use tempfile::tempdir;

    async fn open_store() -> (SqliteSessionStore, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let config = StorageConfig {
            database_path: dir.path().join("store.db").to_str().unwrap().to_string(),
        };
        let store = SqliteSessionStore::open(&config).await.unwrap();
        (store, dir)
    }

    #[tokio::test]
    async fn upsert_creates_session_on_first_contact() {
        let (store, _dir) = open_store().await;
        let contact = ContactId("5215512345678".into());

        let session = store
            .upsert(
                &contact,
                Box::new(|s| {
                    s.last_message_id = Some(MessageId("wamid.1".into()));
                }),
            )
            .await
            .unwrap();

        assert_eq!(session.stage, FunnelStage::FirstContact);
        assert_eq!(session.last_message_id, Some(MessageId("wamid.1".into())));

        let loaded = store.get(&contact).await.unwrap().unwrap();
        assert_eq!(loaded, session);
        store.close().await.unwrap();
    }

    #[tokio::test]
    async fn updated_at_strictly_increases() {
        let (store, _dir) = open_store().await;
        let contact = ContactId("5215512345678".into());

        let mut last = store.upsert(&contact, Box::new(|_| {})).await.unwrap().updated_at;
        for _ in 0..5 {
            let next = store.upsert(&contact, Box::new(|_| {})).await.unwrap().updated_at;
            assert!(next > last, "updated_at must strictly increase");
            last = next;
        }
        store.close().await.unwrap();
    }

    #[tokio::test]
    async fn concurrent_same_contact_upserts_do_not_lose_updates() {
        let (store, _dir) = open_store().await;
        let store = Arc::new(store);
        let contact = ContactId("5215512345678".into());

        let mut handles = Vec::new();
        for _ in 0..20 {
            let store = Arc::clone(&store);
            let contact = contact.clone();
            handles.push(tokio::spawn(async move {
                store
                    .upsert(&contact, Box::new(|s| s.context.turns += 1))
                    .await
                    .unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let session = store.get(&contact).await.unwrap().unwrap();
        assert_eq!(session.context.turns, 20, "no increment may be lost");
        store.close().await.unwrap();
    }

    #[tokio::test]
    async fn different_contacts_proceed_independently() {
        let (store, _dir) = open_store().await;
        let store = Arc::new(store);

        let mut handles = Vec::new();
        for i in 0..10 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                let contact = ContactId(format!("52155000000{i:02}"));
                store
                    .upsert(&contact, Box::new(|s| s.context.turns += 1))
                    .await
                    .unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        for i in 0..10 {
            let contact = ContactId(format!("52155000000{i:02}"));
            assert!(store.get(&contact).await.unwrap().is_some());
        }
        store.close().await.unwrap();
    }

    #[tokio::test]
    async fn sessions_survive_reopen() {
        let dir = tempdir().unwrap();
        let config = StorageConfig {
            database_path: dir.path().join("durable.db").to_str().unwrap().to_string(),
        };
        let contact = ContactId("5215512345678".into());

        {
            let store = SqliteSessionStore::open(&config).await.unwrap();
            store
                .upsert(&contact, Box::new(|s| s.stage = FunnelStage::Quoted))
                .await
                .unwrap();
            store.close().await.unwrap();
        }

        let store = SqliteSessionStore::open(&config).await.unwrap();
        let session = store.get(&contact).await.unwrap().unwrap();
        assert_eq!(session.stage, FunnelStage::Quoted);
        store.close().await.unwrap();
    }
}
