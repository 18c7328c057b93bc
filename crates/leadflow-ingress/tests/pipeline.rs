// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end pipeline tests: real SQLite store, wiremock CRM board,
//! keyword-driven extractor.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use leadflow_config::model::{BotConfig, CrmColumns, CrmConfig, IngressConfig, StorageConfig};
use leadflow_core::types::{
    Appointment, ContactId, Direction, FunnelStage, InboundEvent, MessageId, Session, Signals,
};
use leadflow_core::{LeadflowError, SessionStore, SignalExtractor};
use leadflow_crm::CrmSync;
use leadflow_ingress::{AckDecision, WebhookIngress};
use leadflow_storage::SqliteSessionStore;
use wiremock::matchers::{body_string_contains, method};
use wiremock::{Mock, MockServer, ResponseTemplate};

const BOT_ID: &str = "bot:5215500000000";
const CONTACT: &str = "5215512345678";

/// Deterministic stand-in for the conversation-AI collaborator.
struct KeywordExtractor;

#[async_trait]
impl SignalExtractor for KeywordExtractor {
    async fn extract(
        &self,
        _session: &Session,
        event: &InboundEvent,
    ) -> Result<Signals, LeadflowError> {
        let text = event.text.as_deref().unwrap_or_default().to_lowercase();
        let mut signals = Signals::default();
        if text.contains("tunland") || text.contains("miler") {
            signals.vehicle = Some(text.clone());
        }
        if text.contains("cotiza") {
            signals.quoted = true;
        }
        if text.contains("confirmo la cita") {
            signals.appointment_confirmed = Some(Appointment {
                date: NaiveDate::from_ymd_opt(2026, 3, 10).unwrap(),
                time: None,
            });
        }
        if text.contains("no me interesa") {
            signals.disinterest = true;
        }
        Ok(signals)
    }
}

async fn build_ingress(
    dir: &tempfile::TempDir,
    crm: Option<Arc<CrmSync>>,
) -> (Arc<WebhookIngress>, Arc<SqliteSessionStore>) {
    let storage = StorageConfig {
        database_path: dir
            .path()
            .join("sessions.db")
            .to_string_lossy()
            .into_owned(),
    };
    let store = Arc::new(SqliteSessionStore::open(&storage).await.unwrap());
    let bot = BotConfig {
        sender_id: BOT_ID.to_string(),
        ..Default::default()
    };
    let ingress = Arc::new(WebhookIngress::new(
        &IngressConfig::default(),
        &bot,
        store.clone(),
        Arc::new(KeywordExtractor),
        crm,
    ));
    (ingress, store)
}

fn crm_against(server: &MockServer) -> Arc<CrmSync> {
    let config = CrmConfig {
        api_token: Some("test-token".into()),
        board_id: Some("4000".into()),
        api_url: server.uri(),
        max_attempts: 1,
        columns: CrmColumns {
            dedupe_phone: Some("text_phone".into()),
            stage: Some("status_embudo".into()),
            vehicle: Some("dropdown_vehiculo".into()),
            ..Default::default()
        },
    };
    Arc::new(CrmSync::from_config(&config, -6).unwrap().unwrap())
}

fn inbound(msg_id: &str, contact: &str, text: &str) -> InboundEvent {
    InboundEvent {
        message_id: MessageId(msg_id.to_string()),
        contact_id: ContactId(contact.to_string()),
        direction: Direction::Inbound,
        sender_id: contact.to_string(),
        sender_is_bot: false,
        contact_name: Some("Pedro".to_string()),
        text: Some(text.to_string()),
        media_ref: None,
        timestamp: Utc::now(),
    }
}

fn outbound_from(msg_id: &str, contact: &str, sender_id: &str, text: &str) -> InboundEvent {
    InboundEvent {
        message_id: MessageId(msg_id.to_string()),
        contact_id: ContactId(contact.to_string()),
        direction: Direction::Outbound,
        sender_id: sender_id.to_string(),
        sender_is_bot: sender_id == BOT_ID,
        contact_name: None,
        text: Some(text.to_string()),
        media_ref: None,
        timestamp: Utc::now(),
    }
}

/// Poll until the spawned processing task has produced the expected
/// session state.
async fn wait_for_session(
    store: &SqliteSessionStore,
    contact: &str,
    pred: impl Fn(&Session) -> bool,
) -> Session {
    let contact = ContactId(contact.to_string());
    for _ in 0..300 {
        if let Some(session) = store.get(&contact).await.unwrap() {
            if pred(&session) {
                return session;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("session for {} never reached the expected state", contact.0);
}

async fn wait_for_request(server: &MockServer, needle: &str) -> String {
    for _ in 0..300 {
        for req in server.received_requests().await.unwrap_or_default() {
            let body = String::from_utf8_lossy(&req.body).into_owned();
            if body.contains(needle) {
                return body;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("no request containing {needle:?} arrived");
}

#[tokio::test]
async fn duplicate_delivery_is_processed_once() {
    let dir = tempfile::tempdir().unwrap();
    let (ingress, store) = build_ingress(&dir, None).await;

    let event = inbound("msg-1", CONTACT, "hola");
    assert_eq!(ingress.handle(event.clone()), AckDecision::Accepted);
    assert_eq!(ingress.handle(event), AckDecision::Duplicate);

    let session = wait_for_session(&store, CONTACT, |s| s.context.turns == 1).await;
    // Give a straggler task the chance to show up; the count must hold.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let after = store.get(&session.contact_id).await.unwrap().unwrap();
    assert_eq!(after.context.turns, 1);
}

#[tokio::test]
async fn vehicle_mention_advances_funnel_and_creates_lead() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_string_contains("items_page_by_column_values"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": {"items_page_by_column_values": {"items": []}}
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_string_contains("boards(ids:"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": {"boards": [{"groups": []}]}
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_string_contains("create_item"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": {"create_item": {"id": "1001"}}
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_string_contains("create_update"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": {"create_update": {"id": "1"}}
        })))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let (ingress, store) = build_ingress(&dir, Some(crm_against(&server))).await;

    ingress.handle(inbound("msg-2", CONTACT, "Me interesa el Tunland G9 diesel"));

    let session = wait_for_session(&store, CONTACT, |s| s.stage == FunnelStage::Intent).await;
    assert_eq!(session.context.vehicle.as_deref(), Some("me interesa el tunland g9 diesel"));

    let create_body = wait_for_request(&server, "create_item").await;
    assert!(create_body.contains("Tunland G9"), "resolved vehicle label missing");
    assert!(create_body.contains("Pedro"), "lead name missing");
}

#[tokio::test]
async fn funnel_never_regresses_across_events() {
    let dir = tempfile::tempdir().unwrap();
    let (ingress, store) = build_ingress(&dir, None).await;

    ingress.handle(inbound("msg-3", CONTACT, "confirmo la cita"));
    wait_for_session(&store, CONTACT, |s| {
        s.stage == FunnelStage::AppointmentScheduled
    })
    .await;

    ingress.handle(inbound("msg-4", CONTACT, "el miler me gusta"));
    let session = wait_for_session(&store, CONTACT, |s| s.context.turns == 2).await;
    assert_eq!(session.stage, FunnelStage::AppointmentScheduled);
    assert_eq!(session.context.vehicle.as_deref(), Some("el miler me gusta"));
}

#[tokio::test]
async fn crm_failure_leaves_local_state_and_next_event_catches_up() {
    let server = MockServer::start().await;
    // First sync fails outright; local state must still advance.
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_string_contains("items_page_by_column_values"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": {"items_page_by_column_values": {"items": []}}
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_string_contains("boards(ids:"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": {"boards": [{"groups": []}]}
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_string_contains("create_item"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": {"create_item": {"id": "2002"}}
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_string_contains("create_update"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": {"create_update": {"id": "1"}}
        })))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let (ingress, store) = build_ingress(&dir, Some(crm_against(&server))).await;

    ingress.handle(inbound("msg-5", CONTACT, "quiero el tunland e5"));
    let session = wait_for_session(&store, CONTACT, |s| s.stage == FunnelStage::Intent).await;
    assert_eq!(session.context.turns, 1);

    // The next event triggers a fresh sync from current state, which now
    // creates the record the failed attempt never did.
    ingress.handle(inbound("msg-5b", CONTACT, "me pasan la cotizacion"));
    wait_for_session(&store, CONTACT, |s| s.stage == FunnelStage::Quoted).await;
    let create_body = wait_for_request(&server, "create_item").await;
    assert!(create_body.contains("Cotizaci"), "catch-up sync must carry the current stage");
}

#[tokio::test]
async fn human_takeover_silences_without_stopping_ingestion() {
    let dir = tempfile::tempdir().unwrap();
    let (ingress, store) = build_ingress(&dir, None).await;
    let contact_id = ContactId(CONTACT.to_string());

    ingress.handle(outbound_from(
        "msg-6",
        CONTACT,
        "agent:carlos",
        "Paso el costo en un momento",
    ));
    wait_for_session(&store, CONTACT, |s| s.silenced_until.is_some()).await;
    assert!(ingress.is_silenced(&contact_id).await.unwrap());

    // Inbound traffic keeps updating the session while silenced.
    ingress.handle(inbound("msg-7", CONTACT, "gracias"));
    let session = wait_for_session(&store, CONTACT, |s| s.context.turns == 1).await;
    assert!(session.silenced_until.is_some());
    assert!(ingress.is_silenced(&contact_id).await.unwrap());
}

#[tokio::test]
async fn contacts_are_processed_independently() {
    let dir = tempfile::tempdir().unwrap();
    let (ingress, store) = build_ingress(&dir, None).await;

    ingress.handle(inbound("msg-8", "5215511111111", "cotizacion del tunland g7"));
    ingress.handle(inbound("msg-9", "5215522222222", "hola buenas tardes"));

    let first =
        wait_for_session(&store, "5215511111111", |s| s.stage == FunnelStage::Quoted).await;
    let second =
        wait_for_session(&store, "5215522222222", |s| s.context.turns == 1).await;
    assert_eq!(first.stage, FunnelStage::Quoted);
    assert_eq!(second.stage, FunnelStage::FirstContact);
}

#[tokio::test]
async fn disinterest_then_new_signal_opens_fresh_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let (ingress, store) = build_ingress(&dir, None).await;

    ingress.handle(inbound("msg-10", CONTACT, "no me interesa, gracias"));
    wait_for_session(&store, CONTACT, |s| s.stage == FunnelStage::NotInterested).await;

    ingress.handle(inbound("msg-11", CONTACT, "me pasan una cotizacion?"));
    let session = wait_for_session(&store, CONTACT, |s| s.stage == FunnelStage::Quoted).await;
    assert_eq!(session.context.turns, 2);
}

#[tokio::test]
async fn outbound_echo_for_unknown_contact_creates_no_session() {
    let dir = tempfile::tempdir().unwrap();
    let (ingress, store) = build_ingress(&dir, None).await;
    let contact = "5215533333333";

    ingress.handle(outbound_from(
        "msg-13",
        contact,
        "agent:carlos",
        "Buen día, le atiende Carlos",
    ));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(
        store
            .get(&ContactId(contact.to_string()))
            .await
            .unwrap()
            .is_none(),
        "a session must only be created by the first inbound message"
    );
}

#[tokio::test]
async fn from_config_wires_the_crm_sync() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_string_contains("items_page_by_column_values"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": {"items_page_by_column_values": {"items": []}}
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_string_contains("boards(ids:"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": {"boards": [{"groups": []}]}
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_string_contains("create_item"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": {"create_item": {"id": "3003"}}
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_string_contains("create_update"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": {"create_update": {"id": "1"}}
        })))
        .mount(&server)
        .await;

    let toml = format!(
        r#"
        [bot]
        sender_id = "{BOT_ID}"

        [crm]
        api_token = "test-token"
        board_id = "4000"
        api_url = "{}"
        max_attempts = 1

        [crm.columns]
        dedupe_phone = "text_phone"
        stage = "status_embudo"
        vehicle = "dropdown_vehiculo"

        [ingress]
        utc_offset_hours = -6
        "#,
        server.uri()
    );
    let config = leadflow_config::load_config_from_str(&toml).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let storage = StorageConfig {
        database_path: dir
            .path()
            .join("sessions.db")
            .to_string_lossy()
            .into_owned(),
    };
    let store = Arc::new(SqliteSessionStore::open(&storage).await.unwrap());
    let ingress = Arc::new(
        WebhookIngress::from_config(&config, store.clone(), Arc::new(KeywordExtractor)).unwrap(),
    );

    ingress.handle(inbound("msg-14", CONTACT, "me interesa el tunland g9"));

    wait_for_session(&store, CONTACT, |s| s.stage == FunnelStage::Intent).await;
    let create_body = wait_for_request(&server, "create_item").await;
    assert!(create_body.contains("Tunland G9"));
}

#[tokio::test]
async fn external_stage_set_applies_terminal_stages_only() {
    let dir = tempfile::tempdir().unwrap();
    let (ingress, store) = build_ingress(&dir, None).await;
    let contact_id = ContactId(CONTACT.to_string());

    ingress.handle(inbound("msg-12", CONTACT, "confirmo la cita"));
    wait_for_session(&store, CONTACT, |s| {
        s.stage == FunnelStage::AppointmentScheduled
    })
    .await;

    let session = ingress
        .set_stage_external(&contact_id, FunnelStage::SaleClosed)
        .await
        .unwrap();
    assert_eq!(session.stage, FunnelStage::SaleClosed);

    let err = ingress
        .set_stage_external(&contact_id, FunnelStage::Intent)
        .await;
    assert!(err.is_err());
}
