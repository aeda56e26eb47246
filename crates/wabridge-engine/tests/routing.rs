// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Multi-account routing and isolation.

use std::time::Duration;

use wabridge_config::AccountConfig;
use wabridge_core::{BridgeError, SendRequest, SendState};
use wabridge_test_utils::{TestHarness, raw_text};

const WAIT: Duration = Duration::from_secs(5);

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

#[tokio::test]
async fn test_missing_selector_is_ambiguous_with_two_accounts() {
    let harness = two_accounts().await;
    harness.pair("home").await.unwrap();
    harness.pair("office").await.unwrap();

    let err = harness.router.resolve(None).unwrap_err();
    assert!(matches!(err, BridgeError::AmbiguousAccount { count: 2 }));
    assert_eq!(harness.transport("home").send_attempts(), 0);
    assert_eq!(harness.transport("office").send_attempts(), 0);
}

#[tokio::test]
async fn test_selector_matches_id_label_and_number() {
    let harness = two_accounts().await;
    harness.pair("home").await.unwrap();
    harness.pair("office").await.unwrap();

    assert_eq!(harness.router.resolve(Some("office")).unwrap().id().0, "office");
    assert_eq!(
        harness.router.resolve(Some("Home Phone")).unwrap().id().0,
        "home"
    );
    // Fuzzy label match.
    assert_eq!(harness.router.resolve(Some("phone")).unwrap().id().0, "home");
    // Paired number of the second account.
    assert_eq!(
        harness
            .router
            .resolve(Some("491700000001"))
            .unwrap()
            .id()
            .0,
        "office"
    );
    assert!(matches!(
        harness.router.resolve(Some("garage")),
        Err(BridgeError::AccountNotFound { .. })
    ));
}

#[tokio::test]
async fn test_single_account_ignores_selector() {
    let harness = TestHarness::single().await.unwrap();
    assert_eq!(harness.router.resolve(None).unwrap().id().0, "default");
    assert_eq!(
        harness.router.resolve(Some("anything")).unwrap().id().0,
        "default"
    );
    // Sink selectors must still match.
    assert!(harness.router.resolve_session(Some("anything")).is_err());
    assert_eq!(harness.router.resolve_session(None).unwrap(), None);
}

#[tokio::test]
async fn test_accounts_are_isolated() {
    let harness = two_accounts().await;
    harness.pair("home").await.unwrap();
    harness.pair("office").await.unwrap();

    harness
        .transport("home")
        .inject(raw_text("SAME", "491234", "to home"));
    harness
        .transport("office")
        .inject(raw_text("SAME", "491234", "to office"));
    assert!(harness.sink.wait_for(2, WAIT).await);

    // The same message id is not a duplicate across accounts.
    assert_eq!(harness.account("home").pipeline().len(), 1);
    assert_eq!(harness.account("office").pipeline().len(), 1);
    let office_event = harness.account("office").pipeline().get(1).unwrap();
    assert_eq!(office_event.account, "Office");
    assert_eq!(office_event.account_number.as_deref(), Some("491700000001"));

    let office = harness.router.resolve(Some("office")).unwrap();
    let id = office
        .dispatcher()
        .submit(SendRequest::text("491234", "from office"))
        .unwrap()
        .request_id;
    let record = office.dispatcher().wait(&id, WAIT).await.unwrap();
    assert_eq!(record.state, SendState::Acked);
    assert_eq!(harness.transport("office").sent().len(), 1);
    assert!(harness.transport("home").sent().is_empty());

    // Resetting one account leaves the other untouched.
    harness.account("home").session().reset().await.unwrap();
    assert!(harness.account("home").pipeline().is_empty());
    assert_eq!(harness.account("office").pipeline().len(), 1);
    assert!(harness.account("office").is_connected());
}
