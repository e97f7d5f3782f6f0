//! Renewal ahead of expiry.

use super::harness::{RefreshBehavior, TestHarness};
use chrono::Duration;

#[tokio::test]
async fn token_near_expiry_is_renewed_before_sending() {
    let harness = TestHarness::new();
    harness.seed("A0", "R0", 60, false);
    harness.transport.accept("A0");
    harness.transport.accept("A1");
    harness.gateway.set_refresh(RefreshBehavior::grant("A1", 3600));

    let response = harness.get("me").await.unwrap();

    assert!(response.is_success());
    assert_eq!(harness.gateway.refresh_calls(), 1);
    assert_eq!(harness.transport.sent_tokens(), vec![Some("A1".to_string())]);
    assert_eq!(harness.transport.unauthorized_count(), 0);
}

#[tokio::test]
async fn token_with_plenty_of_life_is_sent_as_is() {
    let harness = TestHarness::new();
    harness.seed("A0", "R0", 3600, false);
    harness.transport.accept("A0");

    harness.get("me").await.unwrap();

    assert_eq!(harness.gateway.refresh_calls(), 0);
    assert_eq!(harness.transport.sent_tokens(), vec![Some("A0".to_string())]);
}

#[tokio::test]
async fn threshold_is_configurable() {
    let harness = TestHarness::with_threshold(Duration::seconds(30));
    harness.seed("A0", "R0", 60, false);
    harness.transport.accept("A0");

    harness.get("me").await.unwrap();
    assert_eq!(harness.gateway.refresh_calls(), 0);
}

#[tokio::test]
async fn proactive_failure_still_sends_with_old_token() {
    let harness = TestHarness::new();
    harness.seed("A0", "R0", 60, false);
    harness.transport.accept("A0");
    harness.gateway.set_refresh(RefreshBehavior::Reject(400));

    let response = harness.get("me").await.unwrap();

    assert!(response.is_success());
    assert_eq!(harness.transport.sent_tokens(), vec![Some("A0".to_string())]);
    // The failed renewal still ended the stored session
    assert!(harness.both_scopes_empty());
}

#[tokio::test]
async fn proactive_failure_then_401_reports_auth_failure() {
    let harness = TestHarness::new();
    harness.seed("A0", "R0", 60, false);
    harness.gateway.set_refresh(RefreshBehavior::Reject(401));

    let err = harness.get("me").await.unwrap_err();

    assert!(err.is_session_ended());
    // The second renewal found no record and never reached the gateway
    assert_eq!(harness.gateway.refresh_calls(), 1);
    assert_eq!(harness.transport.sent().len(), 1);
}

#[tokio::test]
async fn expired_token_is_left_to_the_reactive_path() {
    let harness = TestHarness::new();
    harness.seed("A0", "R0", -10, false);
    harness.transport.accept("A1");
    harness.gateway.set_refresh(RefreshBehavior::grant("A1", 3600));

    let response = harness.get("me").await.unwrap();

    assert!(response.is_success());
    assert_eq!(
        harness.transport.sent_tokens(),
        vec![Some("A0".to_string()), Some("A1".to_string())]
    );
    assert_eq!(harness.gateway.refresh_calls(), 1);
}
