// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Inbound pipeline: dedup, filtering, buffering, media and sink fan-out.

use std::time::Duration;

use wabridge_config::AccountConfig;
use wabridge_core::{BridgeError, ContentKind, EventBody, MediaState};
use wabridge_engine::{IngestOutcome, PipelineNotice, PipelineSettings, PolicyUpdate};
use wabridge_test_utils::harness::fast_settings;
use wabridge_test_utils::{TestHarness, raw_media, raw_text};

const WAIT: Duration = Duration::from_secs(5);

fn whitelisted(entries: &[&str]) -> AccountConfig {
    AccountConfig {
        whitelist: entries.iter().map(|e| e.to_string()).collect(),
        ..AccountConfig::default()
    }
}

// ---- Test 1: inbound text reaches buffer and sinks ----

#[tokio::test]
async fn test_text_message_is_buffered_and_forwarded() {
    let harness = TestHarness::single().await.unwrap();
    harness.pair("default").await.unwrap();

    harness
        .transport("default")
        .inject(raw_text("ABC1", "491234", "hello"));
    assert!(harness.sink.wait_for(1, WAIT).await);

    let events = harness.sink.events();
    let event = &events[0];
    assert_eq!(event.seq, 1);
    assert_eq!(event.sender_number, "491234");
    assert_eq!(event.sender_jid, "491234@s.whatsapp.net");
    assert_eq!(event.account, "default");
    assert_eq!(event.account_number.as_deref(), Some("491700000000"));
    assert_eq!(event.kind, ContentKind::Text);
    assert!(matches!(&event.body, EventBody::Text { text } if text == "hello"));
    assert!(!event.is_group);

    let page = harness.account("default").pipeline().read(None, 10).unwrap();
    assert_eq!(page.events.len(), 1);
    assert_eq!(page.next_cursor, 1);
    assert_eq!(harness.account("default").stats().received, 1);
}

// ---- Test 2: duplicate delivery ----

#[tokio::test]
async fn test_duplicate_message_id_is_dropped() {
    let harness = TestHarness::single().await.unwrap();
    let pipeline = harness.account("default").pipeline();

    assert_eq!(
        pipeline.ingest(raw_text("ABC1", "491234", "hello")),
        IngestOutcome::Appended(1)
    );
    assert_eq!(
        pipeline.ingest(raw_text("ABC1", "491234", "hello")),
        IngestOutcome::Duplicate
    );
    assert_eq!(pipeline.len(), 1);
    assert_eq!(harness.sink.len(), 1);
}

// ---- Test 3: whitelist ----

#[tokio::test]
async fn test_sender_outside_whitelist_is_dropped() {
    let harness = TestHarness::builder()
        .with_account(whitelisted(&["491111"]))
        .build()
        .await
        .unwrap();
    let pipeline = harness.account("default").pipeline();

    assert_eq!(
        pipeline.ingest(raw_text("M1", "499999", "spam")),
        IngestOutcome::DroppedWhitelist
    );
    assert_eq!(
        pipeline.ingest(raw_text("M2", "+49 1111", "hi")),
        IngestOutcome::Appended(1)
    );
    assert!(harness.sink.events().iter().all(|e| e.sender_number == "491111"));
}

#[tokio::test]
async fn test_whitelisted_group_admits_unknown_sender() {
    let harness = TestHarness::builder()
        .with_account(whitelisted(&["12345-6789"]))
        .build()
        .await
        .unwrap();
    let pipeline = harness.account("default").pipeline();

    let mut raw = raw_text("G1", "499999", "group hello");
    raw.chat_jid = "12345-6789@g.us".into();
    assert_eq!(pipeline.ingest(raw), IngestOutcome::Appended(1));

    let event = pipeline.get(1).unwrap();
    assert!(event.is_group);
    assert_eq!(event.chat_jid, "12345-6789@g.us");
}

#[tokio::test]
async fn test_dropped_message_is_readmitted_after_whitelist_change() {
    let harness = TestHarness::builder()
        .with_account(whitelisted(&["491111"]))
        .build()
        .await
        .unwrap();
    let account = harness.account("default");

    assert_eq!(
        account.pipeline().ingest(raw_text("M1", "492222", "hi")),
        IngestOutcome::DroppedWhitelist
    );

    account.policy().update(PolicyUpdate {
        whitelist: Some(vec!["491111".into(), "492222".into()]),
        ..PolicyUpdate::default()
    });
    // Filtered ids are not remembered, so the redelivery goes through.
    assert_eq!(
        account.pipeline().ingest(raw_text("M1", "492222", "hi")),
        IngestOutcome::Appended(1)
    );

    // Applying the same update twice changes nothing.
    let update = PolicyUpdate {
        whitelist: Some(vec!["491111".into()]),
        ..PolicyUpdate::default()
    };
    let first = account.policy().update(update.clone());
    let second = account.policy().update(update);
    assert_eq!(first, second);
    assert_eq!(account.policy().view().whitelist, vec!["491111".to_string()]);
}

// ---- Test 4: self messages ----

#[tokio::test]
async fn test_self_messages_follow_policy() {
    let harness = TestHarness::single().await.unwrap();
    let account = harness.account("default");

    let mut own = raw_text("SELF1", "491700000000", "note to self");
    own.from_me = true;
    assert_eq!(
        account.pipeline().ingest(own.clone()),
        IngestOutcome::DroppedSelf
    );

    account.policy().update(PolicyUpdate {
        ignore_self_messages: Some(false),
        ..PolicyUpdate::default()
    });
    assert_eq!(account.pipeline().ingest(own), IngestOutcome::Appended(1));
    assert!(account.pipeline().get(1).unwrap().from_me);
}

// ---- Test 5: read receipts ----

#[tokio::test]
async fn test_inbound_messages_are_marked_read() {
    let harness = TestHarness::single().await.unwrap();
    harness.pair("default").await.unwrap();
    let transport = harness.transport("default");

    transport.inject(raw_text("R1", "491234", "ping"));
    assert!(transport.wait_until(WAIT, |t| t.read_receipts().len() == 1).await);
    assert_eq!(transport.read_receipts()[0].0, "R1");

    harness.account("default").policy().update(PolicyUpdate {
        mark_as_read: Some(false),
        ..PolicyUpdate::default()
    });
    transport.inject(raw_text("R2", "491234", "pong"));
    assert!(harness.wait_for_events("default", 2, WAIT).await);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(transport.read_receipts().len(), 1);
}

// ---- Test 6: media ----

#[tokio::test]
async fn test_media_resolves_to_local_url() {
    let harness = TestHarness::single().await.unwrap();
    harness.pair("default").await.unwrap();
    harness
        .transport("default")
        .set_media(b"\xff\xd8\xff\xe0jpeg".to_vec());

    let pipeline = harness.account("default").pipeline();
    let mut notices = pipeline.subscribe();
    harness
        .transport("default")
        .inject(raw_media("IMG1", "491234", "image/jpeg"));

    // Sinks see the event at append time, before the download finishes.
    assert!(harness.sink.wait_for(1, WAIT).await);
    assert!(matches!(
        harness.sink.events()[0].media,
        Some(MediaState::Pending)
    ));
    let pending = serde_json::to_value(&*harness.sink.events()[0]).unwrap();
    assert!(pending["media_url"].is_null());
    assert_eq!(pending["media"]["status"], "pending");

    let resolved = tokio::time::timeout(WAIT, async {
        loop {
            if let Ok(PipelineNotice::MediaResolved(event)) = notices.recv().await {
                return event;
            }
        }
    })
    .await
    .unwrap();

    let url = resolved.media_url().unwrap();
    assert!(url.starts_with("http://bridge.test/media/"));
    assert!(url.ends_with(".jpeg"));
    let Some(MediaState::Ready(media)) = &resolved.media else {
        panic!("media not ready: {:?}", resolved.media);
    };
    assert_eq!(media.size, 8);
    assert_eq!(tokio::fs::read(&media.local_path).await.unwrap().len(), 8);

    // The buffer holds the resolved copy, and pollers see its URL.
    let buffered = pipeline.get(resolved.seq).unwrap();
    let polled = serde_json::to_value(&*buffered).unwrap();
    assert_eq!(polled["media_url"], url);
    assert!(polled["media_error"].is_null());
}

#[tokio::test]
async fn test_media_download_failure_is_marked_on_event() {
    let harness = TestHarness::single().await.unwrap();
    harness.pair("default").await.unwrap();
    harness.transport("default").fail_media("media key expired");

    let pipeline = harness.account("default").pipeline();
    let mut notices = pipeline.subscribe();
    harness
        .transport("default")
        .inject(raw_media("DOC1", "491234", "application/pdf"));

    let resolved = tokio::time::timeout(WAIT, async {
        loop {
            if let Ok(PipelineNotice::MediaResolved(event)) = notices.recv().await {
                return event;
            }
        }
    })
    .await
    .unwrap();
    assert!(resolved.media_url().is_none());
    assert!(resolved.media_error().unwrap().contains("media key expired"));
}

#[tokio::test]
async fn test_media_download_timeout_is_marked_on_event() {
    let harness = TestHarness::builder()
        .with_pipeline(PipelineSettings {
            media_timeout: Duration::from_millis(50),
            ..fast_settings().pipeline
        })
        .build()
        .await
        .unwrap();
    harness.pair("default").await.unwrap();
    harness
        .transport("default")
        .set_media_delay(Duration::from_secs(2));

    let pipeline = harness.account("default").pipeline();
    let mut notices = pipeline.subscribe();
    harness
        .transport("default")
        .inject(raw_media("VID1", "491234", "video/mp4"));

    let resolved = tokio::time::timeout(WAIT, async {
        loop {
            if let Ok(PipelineNotice::MediaResolved(event)) = notices.recv().await {
                return event;
            }
        }
    })
    .await
    .unwrap();
    assert!(resolved.media_error().unwrap().contains("timed out"));
}

#[tokio::test]
async fn test_media_without_store_is_flagged_immediately() {
    let harness = TestHarness::builder().without_media().build().await.unwrap();
    let pipeline = harness.account("default").pipeline();

    assert_eq!(
        pipeline.ingest(raw_media("IMG1", "491234", "image/png")),
        IngestOutcome::Appended(1)
    );
    let event = pipeline.get(1).unwrap();
    assert_eq!(event.media_error(), Some("media storage is disabled"));
    assert_eq!(harness.transport("default").connects(), 0);
}

// ---- Test 7: cursor reads ----

#[tokio::test]
async fn test_cursor_pages_through_buffer() {
    let harness = TestHarness::single().await.unwrap();
    let pipeline = harness.account("default").pipeline();
    for n in 1..=5 {
        pipeline.ingest(raw_text(&format!("M{n}"), "491234", &format!("message {n}")));
    }

    let first = pipeline.read(None, 2).unwrap();
    assert_eq!(
        first.events.iter().map(|e| e.seq).collect::<Vec<_>>(),
        vec![1, 2]
    );
    assert!(first.has_more);

    let second = pipeline.read(Some(first.next_cursor), 10).unwrap();
    assert_eq!(
        second.events.iter().map(|e| e.seq).collect::<Vec<_>>(),
        vec![3, 4, 5]
    );
    assert!(!second.has_more);

    // Polling at the head returns nothing and keeps the cursor.
    let idle = pipeline.read(Some(second.next_cursor), 10).unwrap();
    assert!(idle.events.is_empty());
    assert_eq!(idle.next_cursor, 5);
}

#[tokio::test]
async fn test_evicted_cursor_reports_oldest_retained() {
    let harness = TestHarness::builder()
        .with_pipeline(PipelineSettings {
            buffer_capacity: 3,
            dedup_window: 3,
            ..fast_settings().pipeline
        })
        .build()
        .await
        .unwrap();
    let pipeline = harness.account("default").pipeline();
    for n in 1..=5 {
        pipeline.ingest(raw_text(&format!("M{n}"), "491234", "x"));
    }

    let err = pipeline.read(Some(1), 10).unwrap_err();
    assert!(matches!(
        err,
        BridgeError::CursorTooOld {
            requested: 1,
            oldest: 3
        }
    ));

    // A cursor right before the oldest retained event is still valid.
    let page = pipeline.read(Some(2), 10).unwrap();
    assert_eq!(page.oldest_seq, Some(3));
    assert_eq!(page.events.len(), 3);
}

// ---- Test 8: reset ----

#[tokio::test]
async fn test_reset_clears_buffer_and_keeps_sequence_monotonic() {
    let harness = TestHarness::single().await.unwrap();
    harness.pair("default").await.unwrap();
    let transport = harness.transport("default");
    for n in 1..=3 {
        transport.inject(raw_text(&format!("M{n}"), "491234", "before"));
    }
    assert!(harness.wait_for_events("default", 3, WAIT).await);

    let account = harness.account("default");
    account.session().reset().await.unwrap();
    assert!(account.pipeline().is_empty());
    assert!(harness.sink.flushes() >= 1);

    // Old cursors are stale after a reset.
    assert!(matches!(
        account.pipeline().read(Some(0), 10),
        Err(BridgeError::CursorTooOld { oldest: 4, .. })
    ));

    harness.pair("default").await.unwrap();
    // Dedup was cleared with the buffer.
    transport.inject(raw_text("M1", "491234", "after"));
    assert!(harness.wait_for_events("default", 1, WAIT).await);
    let page = account.pipeline().read(Some(3), 10).unwrap();
    assert_eq!(page.events.len(), 1);
    assert_eq!(page.events[0].seq, 4);
}
