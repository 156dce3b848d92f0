//! Purge-delete flows: asynchronous purge acknowledged with 202, then a
//! status poll until a terminal label.

use std::sync::Arc;
use std::time::Duration;

use converge_core::{
    ConvergeError, DeleteMode, Method, PollSpec, Reconciler, ReconcilerConfig, RemoteCallResult,
    UnknownLabelPolicy,
};
use converge_test::{purge_status_body, ManualClock, MockTransport, OrgModel};
use pretty_assertions::assert_eq;

const PURGE_PATH: &str = "/identity/Organization/org-1/$purge";
const STATUS_PATH: &str = "/ops/purge/42";

fn fast_config() -> ReconcilerConfig {
    ReconcilerConfig {
        purge_poll: PollSpec::purge()
            .with_initial_delay(Duration::from_secs(1))
            .with_poll_interval(Duration::from_secs(1))
            .with_min_poll_interval(Duration::from_secs(1))
            .with_timeout(Duration::from_secs(60)),
        ..ReconcilerConfig::default()
    }
}

fn reconciler(
    transport: Arc<MockTransport>,
    config: ReconcilerConfig,
) -> Reconciler<OrgModel, Arc<MockTransport>> {
    Reconciler::new(OrgModel, transport, config)
}

fn accepted() -> RemoteCallResult {
    RemoteCallResult::status(202).with_location(STATUS_PATH)
}

#[tokio::test(start_paused = true)]
async fn purge_polls_until_success() {
    let transport = Arc::new(MockTransport::new());
    transport.respond(Method::Post, PURGE_PATH, accepted());
    // Still running at the HTTP level, then a pending label, then done.
    transport.enqueue(Method::Get, STATUS_PATH, RemoteCallResult::status(202));
    transport.enqueue(
        Method::Get,
        STATUS_PATH,
        RemoteCallResult::with_body(200, purge_status_body("PURGING")),
    );
    transport.respond(
        Method::Get,
        STATUS_PATH,
        RemoteCallResult::with_body(200, purge_status_body("SUCCESS")),
    );

    let converged = reconciler(transport.clone(), fast_config())
        .delete("org-1", DeleteMode::Purge)
        .await
        .unwrap();

    assert!(converged.is_absent());
    assert_eq!(transport.count(Method::Get, STATUS_PATH), 3);
}

#[tokio::test]
async fn purge_already_gone_is_success() {
    let transport = Arc::new(MockTransport::new());
    // Unscripted purge answers 404: nothing left to purge.
    let converged = reconciler(transport.clone(), fast_config())
        .delete("org-1", DeleteMode::Purge)
        .await
        .unwrap();

    assert!(converged.is_absent());
    assert_eq!(transport.count(Method::Get, STATUS_PATH), 0);
}

#[tokio::test]
async fn purge_rejects_unexpected_acknowledgment() {
    let transport = Arc::new(MockTransport::new());
    transport.respond(Method::Post, PURGE_PATH, RemoteCallResult::status(200));

    let err = reconciler(transport, fast_config())
        .delete("org-1", DeleteMode::Purge)
        .await
        .unwrap_err();
    assert!(matches!(err, ConvergeError::Permanent { .. }));
}

#[tokio::test]
async fn purge_requires_follow_up_location() {
    let transport = Arc::new(MockTransport::new());
    transport.respond(Method::Post, PURGE_PATH, RemoteCallResult::status(202));

    let err = reconciler(transport, fast_config())
        .delete("org-1", DeleteMode::Purge)
        .await
        .unwrap_err();
    assert!(matches!(err, ConvergeError::Permanent { .. }));
}

#[tokio::test(start_paused = true)]
async fn purge_fails_on_anomalous_label() {
    let transport = Arc::new(MockTransport::new());
    transport.respond(Method::Post, PURGE_PATH, accepted());
    transport.respond(
        Method::Get,
        STATUS_PATH,
        RemoteCallResult::with_body(200, purge_status_body("FAILED")),
    );

    let err = reconciler(transport, fast_config())
        .delete("org-1", DeleteMode::Purge)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        ConvergeError::AnomalousLabel {
            operation: "delete".to_string(),
            resource: "org-1".to_string(),
            label: "FAILED".to_string(),
        }
    );
}

#[tokio::test(start_paused = true)]
async fn purge_unknown_label_can_be_waited_out() {
    let transport = Arc::new(MockTransport::new());
    transport.respond(Method::Post, PURGE_PATH, accepted());
    transport.enqueue(
        Method::Get,
        STATUS_PATH,
        RemoteCallResult::with_body(200, purge_status_body("DRAINING")),
    );
    transport.respond(
        Method::Get,
        STATUS_PATH,
        RemoteCallResult::with_body(200, purge_status_body("SUCCESS")),
    );

    let mut config = fast_config();
    config.purge_poll = config
        .purge_poll
        .with_unknown_label(UnknownLabelPolicy::TreatAsPending);

    let converged = reconciler(transport, config)
        .delete("org-1", DeleteMode::Purge)
        .await
        .unwrap();
    assert!(converged.is_absent());
}

#[tokio::test(start_paused = true)]
async fn purge_times_out_when_never_terminal() {
    let transport = Arc::new(MockTransport::new());
    transport.respond(Method::Post, PURGE_PATH, accepted());
    transport.respond(
        Method::Get,
        STATUS_PATH,
        RemoteCallResult::with_body(200, purge_status_body("PURGING")),
    );

    let mut config = fast_config();
    config.purge_poll = config.purge_poll.with_timeout(Duration::from_secs(5));

    let err = reconciler(transport, config)
        .delete("org-1", DeleteMode::Purge)
        .await
        .unwrap_err();
    assert!(err.is_timed_out());
}

#[tokio::test(start_paused = true)]
async fn purge_cancellation_stops_polling() {
    let transport = Arc::new(MockTransport::new());
    transport.respond(Method::Post, PURGE_PATH, accepted());
    transport.respond(
        Method::Get,
        STATUS_PATH,
        RemoteCallResult::with_body(200, purge_status_body("PURGING")),
    );

    let reconciler = reconciler(transport.clone(), fast_config());
    let cancel = reconciler.cancellation_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(3)).await;
        cancel.cancel();
    });

    let err = reconciler
        .delete("org-1", DeleteMode::Purge)
        .await
        .unwrap_err();
    assert!(matches!(err, ConvergeError::Cancelled { .. }));
    // Polling stopped well before the 60s timeout.
    assert!(transport.count(Method::Get, STATUS_PATH) <= 3);
}

#[tokio::test]
async fn manual_clock_drives_the_purge_cadence() {
    let transport = Arc::new(MockTransport::new());
    transport.respond(Method::Post, PURGE_PATH, accepted());
    transport.enqueue(
        Method::Get,
        STATUS_PATH,
        RemoteCallResult::with_body(200, purge_status_body("PURGING")),
    );
    transport.respond(
        Method::Get,
        STATUS_PATH,
        RemoteCallResult::with_body(200, purge_status_body("SUCCESS")),
    );

    let clock = ManualClock::new();
    let reconciler = Reconciler::with_clock(
        OrgModel,
        transport.clone(),
        clock.clone(),
        fast_config(),
    );

    let task = tokio::spawn(async move { reconciler.delete("org-1", DeleteMode::Purge).await });

    // Initial delay, then one cadence tick between the two checks.
    for _ in 0..2 {
        while clock.pending() == 0 {
            tokio::task::yield_now().await;
        }
        clock.advance(Duration::from_secs(1));
    }

    let converged = task.await.unwrap().unwrap();
    assert!(converged.is_absent());
    assert_eq!(transport.count(Method::Get, STATUS_PATH), 2);
}
