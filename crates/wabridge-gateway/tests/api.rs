// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Route-level tests: the full axum router over harness-built accounts.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use serde_json::{Value, json};
use tower::ServiceExt;
use wabridge_config::AccountConfig;
use wabridge_gateway::{AuthConfig, GatewayState, build_router};
use wabridge_test_utils::TestHarness;
use wabridge_core::SendPayload;
use wabridge_test_utils::mock_transport::{raw_media, raw_text};
use wabridge_webhook::{DeliveryPolicy, WebhookForwarder};

const KEY: &str = "test-key";
const WAIT: Duration = Duration::from_secs(5);

fn app(harness: &TestHarness) -> Router {
    let webhooks = Arc::new(WebhookForwarder::new(DeliveryPolicy::default()).unwrap());
    build_router(GatewayState {
        router: harness.router.clone(),
        webhooks,
        media: harness.media.clone(),
        auth: AuthConfig {
            api_key: Some(KEY.to_string()),
        },
        started_at: Instant::now(),
    })
}

fn request(method: Method, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("x-auth-token", KEY);
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn call(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}

async fn two_accounts() -> TestHarness {
    TestHarness::builder()
        .with_account(AccountConfig {
            id: "home".into(),
            label: Some("Home Phone".into()),
            ..AccountConfig::default()
        })
        .with_account(AccountConfig {
            id: "office".into(),
            label: Some("Office".into()),
            ..AccountConfig::default()
        })
        .build()
        .await
        .unwrap()
}

// ---- Test 1: health is public, everything else needs the token ----

#[tokio::test]
async fn test_health_is_public_and_api_requires_token() {
    let harness = TestHarness::single().await.unwrap();
    let app = app(&harness);

    let req = Request::get("/health").body(Body::empty()).unwrap();
    let (status, body) = call(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let req = Request::get("/status").body(Body::empty()).unwrap();
    let (status, body) = call(&app, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "unauthorized");

    let req = Request::get("/status")
        .header("x-auth-token", "wrong")
        .body(Body::empty())
        .unwrap();
    let (status, _) = call(&app, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

// ---- Test 2: start session exposes a QR, pairing connects ----

#[tokio::test]
async fn test_start_session_then_qr_then_connected() {
    let harness = TestHarness::single().await.unwrap();
    let app = app(&harness);

    let (status, body) = call(&app, request(Method::POST, "/session/start", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "pairing");

    let (status, body) = call(&app, request(Method::GET, "/qr", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(
        body["qr"]
            .as_str()
            .unwrap()
            .starts_with("data:image/svg+xml;base64,")
    );

    harness.transport("default").complete_pairing();
    assert!(
        harness
            .wait_for_state("default", wabridge_core::ConnectionState::Connected, WAIT)
            .await
    );

    let (_, body) = call(&app, request(Method::GET, "/status", None)).await;
    assert_eq!(body["connected"], true);
    assert_eq!(body["state"], "connected");
    assert_eq!(body["paired_number"], "491700000000");

    let (_, body) = call(&app, request(Method::GET, "/qr", None)).await;
    assert!(body["qr"].is_null());
}

// ---- Test 3: account selection over HTTP ----

#[tokio::test]
async fn test_account_selection_errors() {
    let harness = two_accounts().await;
    let app = app(&harness);

    let (status, body) = call(&app, request(Method::GET, "/status", None)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "ambiguous_account");

    let (status, body) = call(&app, request(Method::GET, "/status?account=garage", None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "account_not_found");

    let (status, body) = call(&app, request(Method::GET, "/status?account=office", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["account"], "Office");

    let (_, body) = call(&app, request(Method::GET, "/sessions", None)).await;
    assert_eq!(body["sessions"].as_array().unwrap().len(), 2);
}

// ---- Test 4: polling with cursors and the 410 on an evicted cursor ----

#[tokio::test]
async fn test_events_poll_pages_by_cursor() {
    let harness = TestHarness::single().await.unwrap();
    harness.pair("default").await.unwrap();
    let transport = harness.transport("default");
    for i in 0..3 {
        transport.inject(raw_text(&format!("M{i}"), "491234", "hello"));
    }
    assert!(harness.wait_for_events("default", 3, WAIT).await);
    let app = app(&harness);

    let (status, body) = call(&app, request(Method::GET, "/events?after=0&limit=2", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["account"], "default");
    assert_eq!(body["events"].as_array().unwrap().len(), 2);
    assert_eq!(body["has_more"], true);
    let cursor = body["next_cursor"].as_u64().unwrap();

    let uri = format!("/events?after={cursor}");
    let (_, body) = call(&app, request(Method::GET, &uri, None)).await;
    let events = body["events"].as_array().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["seq"], 3);
    assert_eq!(body["has_more"], false);
}

#[tokio::test]
async fn test_events_reports_cursor_too_old() {
    let harness = TestHarness::single().await.unwrap();
    harness.pair("default").await.unwrap();
    harness
        .transport("default")
        .inject(raw_text("M1", "491234", "before reset"));
    assert!(harness.wait_for_events("default", 1, WAIT).await);
    harness.account("default").session().reset().await.unwrap();
    let app = app(&harness);

    let (status, body) = call(&app, request(Method::GET, "/events?after=0", None)).await;
    assert_eq!(status, StatusCode::GONE);
    assert_eq!(body["code"], "cursor_too_old");
    assert_eq!(body["oldest_seq"], 2);
}

// ---- Test 5: sends are accepted and queryable ----

#[tokio::test]
async fn test_send_message_is_accepted_and_acked() {
    let harness = TestHarness::single().await.unwrap();
    harness.pair("default").await.unwrap();
    let app = app(&harness);

    let body = json!({"number": "+49 1234", "message": "hi", "request_id": "r-1"});
    let (status, resp) = call(&app, request(Method::POST, "/send_message", Some(body))).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(resp["accepted"], true);
    assert_eq!(resp["request_id"], "r-1");

    let transport = harness.transport("default");
    assert!(transport.wait_until(WAIT, |t| t.sent().len() == 1).await);

    let deadline = tokio::time::Instant::now() + WAIT;
    loop {
        let (status, record) = call(&app, request(Method::GET, "/send/r-1", None)).await;
        assert_eq!(status, StatusCode::OK);
        if record["state"] == "acked" {
            assert_eq!(record["kind"], "text");
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "send never acked");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let (status, body) = call(&app, request(Method::GET, "/send/unknown", None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "not_found");
}

#[tokio::test]
async fn test_send_rejections_use_error_taxonomy() {
    let harness = TestHarness::single().await.unwrap();
    let app = app(&harness);

    // Not connected: accepted, then failed on the record.
    let body = json!({"number": "491234", "message": "hi", "request_id": "offline"});
    let (status, resp) = call(&app, request(Method::POST, "/send_message", Some(body))).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(resp["state"], "pending");
    let deadline = tokio::time::Instant::now() + WAIT;
    loop {
        let (_, record) = call(&app, request(Method::GET, "/send/offline", None)).await;
        if record["state"] == "failed" {
            assert_eq!(record["error_code"], "session_not_connected");
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "send never failed");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let resp = app
        .clone()
        .oneshot(
            Request::post("/send_message")
                .header("x-auth-token", KEY)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    harness.pair("default").await.unwrap();
    let (status, resp) = call(
        &app,
        request(Method::POST, "/send_message", Some(json!({"message": "hi"}))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(resp["code"], "invalid_request");
}

#[tokio::test]
async fn test_list_contact_edit_and_revoke_routes() {
    let harness = TestHarness::single().await.unwrap();
    harness.pair("default").await.unwrap();
    let app = app(&harness);

    let bodies = [
        (
            "/send_list",
            json!({"number": "1234567890", "title": "Title", "text": "Body",
                   "button_text": "Button",
                   "sections": [{"title": "Section 1", "rows": [{"title": "A", "rowId": "a"}]}]}),
        ),
        (
            "/send_contact",
            json!({"number": "1234567890", "contact_name": "Home Assistant",
                   "contact_number": "1234567890"}),
        ),
        (
            "/edit_message",
            json!({"number": "1234567890", "message_id": "MSG_ID_123", "new_content": "New Text"}),
        ),
        (
            "/revoke_message",
            json!({"number": "1234567890", "message_id": "MSG_ID_123"}),
        ),
        (
            "/send_poll",
            json!({"number": "1234567890", "question": "Lunch?", "options": ["A", "B"],
                   "quoted_message_id": "MSG7"}),
        ),
    ];
    for (uri, body) in bodies {
        let (status, resp) = call(&app, request(Method::POST, uri, Some(body))).await;
        assert_eq!(status, StatusCode::ACCEPTED, "{uri}: {resp}");
    }

    let transport = harness.transport("default");
    assert!(transport.wait_until(WAIT, |t| t.sent().len() == 5).await);
    let sent = transport.sent();
    let kinds: Vec<_> = sent.iter().map(|m| m.payload.kind_name()).collect();
    assert_eq!(kinds, vec!["list", "contact", "edit", "revoke", "poll"]);
    assert!(sent.iter().all(|m| m.jid == "1234567890@s.whatsapp.net"));
    assert!(matches!(
        &sent[4].payload,
        SendPayload::Poll { quoted_message_id: Some(id), .. } if id == "MSG7"
    ));

    let (status, resp) = call(
        &app,
        request(
            Method::POST,
            "/revoke_message",
            Some(json!({"number": "1234567890"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(resp["code"], "invalid_request");
}

// ---- Test 6: settings take effect and whitelist blocks sends ----

#[tokio::test]
async fn test_settings_update_whitelist() {
    let harness = TestHarness::single().await.unwrap();
    harness.pair("default").await.unwrap();
    let app = app(&harness);

    let body = json!({"whitelist": "49111, 49222", "mark_as_read": false});
    let (status, resp) = call(&app, request(Method::POST, "/settings", Some(body))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(resp["account"], "default");
    assert_eq!(resp["mark_as_read"], false);

    let body = json!({"number": "49333", "message": "hi"});
    let (status, resp) = call(&app, request(Method::POST, "/send_message", Some(body))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(resp["code"], "not_whitelisted");

    let body = json!({"number": "49111", "message": "hi"});
    let (status, _) = call(&app, request(Method::POST, "/send_message", Some(body))).await;
    assert_eq!(status, StatusCode::ACCEPTED);
}

// ---- Test 7: webhook management ----

#[tokio::test]
async fn test_webhook_crud() {
    let harness = two_accounts().await;
    let app = app(&harness);

    let body = json!({"id": "crm", "url": "https://crm.example.com/in", "token": "s3cret", "account": "office"});
    let (status, view) = call(&app, request(Method::POST, "/webhooks", Some(body))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["session_id"], "office");
    assert_eq!(view["has_token"], true);
    assert!(view.get("token").is_none());

    let body = json!({"url": "ftp://nope"});
    let (status, _) = call(&app, request(Method::POST, "/webhooks", Some(body))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let body = json!({"url": "https://x.example.com", "account": "garage"});
    let (status, _) = call(&app, request(Method::POST, "/webhooks", Some(body))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, list) = call(&app, request(Method::GET, "/webhooks", None)).await;
    assert_eq!(list["webhooks"].as_array().unwrap().len(), 1);

    let (status, _) = call(&app, request(Method::DELETE, "/webhooks/crm", None)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = call(&app, request(Method::DELETE, "/webhooks/crm", None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ---- Test 8: media files and stats ----

#[tokio::test]
async fn test_polled_media_event_carries_url_once_ready() {
    let harness = TestHarness::single().await.unwrap();
    harness.pair("default").await.unwrap();
    harness
        .transport("default")
        .inject(raw_media("IMG1", "491234", "image/jpeg"));
    assert!(harness.wait_for_events("default", 1, WAIT).await);
    let app = app(&harness);

    let deadline = tokio::time::Instant::now() + WAIT;
    let event = loop {
        let (status, body) = call(&app, request(Method::GET, "/events?after=0", None)).await;
        assert_eq!(status, StatusCode::OK);
        let event = body["events"][0].clone();
        assert!(event.get("media_url").is_some(), "media_url key missing: {event}");
        if event["media"]["status"] == "ready" {
            break event;
        }
        assert!(event["media_url"].is_null());
        assert!(tokio::time::Instant::now() < deadline, "media never resolved");
        tokio::time::sleep(Duration::from_millis(10)).await;
    };

    let url = event["media_url"].as_str().unwrap();
    let path = url.strip_prefix("http://bridge.test").unwrap();
    let resp = app
        .clone()
        .oneshot(request(Method::GET, path, None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()[header::CONTENT_TYPE], "image/jpeg");
}

#[tokio::test]
async fn test_media_is_served_with_content_type() {
    let harness = TestHarness::single().await.unwrap();
    let dir = harness.media.as_ref().unwrap().dir().to_path_buf();
    tokio::fs::write(dir.join("abc123.jpg"), b"jpegdata")
        .await
        .unwrap();
    let app = app(&harness);

    let resp = app
        .clone()
        .oneshot(request(Method::GET, "/media/abc123.jpg", None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()[header::CONTENT_TYPE], "image/jpeg");
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[..], b"jpegdata");

    tokio::fs::write(dir.join("report.docx"), b"PK").await.unwrap();
    let resp = app
        .clone()
        .oneshot(request(Method::GET, "/media/report.docx", None))
        .await
        .unwrap();
    assert_eq!(
        resp.headers()[header::CONTENT_TYPE],
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
    );

    let (status, _) = call(&app, request(Method::GET, "/media/missing.jpg", None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = call(&app, request(Method::GET, "/media/..secret", None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_stats_totals_span_accounts() {
    let harness = two_accounts().await;
    harness.pair("home").await.unwrap();
    harness.pair("office").await.unwrap();
    harness
        .transport("home")
        .inject(raw_text("H1", "491234", "hi"));
    harness
        .transport("office")
        .inject(raw_text("O1", "491234", "hi"));
    assert!(harness.wait_for_events("home", 1, WAIT).await);
    assert!(harness.wait_for_events("office", 1, WAIT).await);
    let app = app(&harness);

    let (status, body) = call(&app, request(Method::GET, "/stats", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["totals"]["received"], 2);
    assert_eq!(body["accounts"].as_array().unwrap().len(), 2);
}

// ---- Test 9: reset over HTTP ----

#[tokio::test]
async fn test_delete_session_resets() {
    let harness = TestHarness::single().await.unwrap();
    harness.pair("default").await.unwrap();
    let app = app(&harness);

    let (status, body) = call(&app, request(Method::DELETE, "/session", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "unpaired");
    assert!(!harness.store.contains(&harness.session_id("default")));
}
