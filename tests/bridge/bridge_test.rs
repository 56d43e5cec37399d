/*!
 * Bridge Tests
 * Blocking guest calls served by an async controller
 */

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use sandbox_kernel::bridge::{
    Bridge, BridgeError, BridgeHandler, BridgeResult, EchoHandler, RequestKind, LOCK_IDLE,
};
use std::sync::Arc;
use std::time::Duration;

/// Answers every request with a payload larger than the mailbox
struct Oversized(usize);

#[async_trait]
impl BridgeHandler for Oversized {
    async fn handle(&self, _kind: i32, _payload: Vec<u8>) -> BridgeResult<Vec<u8>> {
        Ok(vec![7u8; self.0])
    }
}

/// Sleeps before echoing
struct Slow(Duration);

#[async_trait]
impl BridgeHandler for Slow {
    async fn handle(&self, _kind: i32, payload: Vec<u8>) -> BridgeResult<Vec<u8>> {
        tokio::time::sleep(self.0).await;
        Ok(payload)
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_ping_round_trip() {
    let (client, controller) = Bridge::new(1024, Duration::from_millis(1));
    let task = controller.clone().spawn(Arc::new(EchoHandler));

    let response = tokio::task::spawn_blocking(move || client.request_sync(RequestKind::Ping, b"ping"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(response, b"ping");

    controller.close();
    task.await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_sequential_calls_reuse_payload_area() {
    let (client, controller) = Bridge::new(64, Duration::from_millis(1));
    let _task = controller.clone().spawn(Arc::new(EchoHandler));

    let responses = tokio::task::spawn_blocking(move || {
        ["a", "longer payload", "b"]
            .iter()
            .map(|msg| client.request_sync(RequestKind::Ping, msg.as_bytes()).unwrap())
            .collect::<Vec<_>>()
    })
    .await
    .unwrap();
    assert_eq!(responses, vec![b"a".to_vec(), b"longer payload".to_vec(), b"b".to_vec()]);
    controller.close();
}

#[tokio::test]
async fn test_oversized_request_is_rejected() {
    let (client, _controller) = Bridge::new(8, Duration::from_millis(1));
    let err = client.request_sync(RequestKind::Ping, &[0u8; 9]).unwrap_err();
    assert_eq!(err, BridgeError::PayloadTooLarge { size: 9, capacity: 8 });
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_failed_and_oversized_responses_are_empty() {
    let (client, controller) = Bridge::new(16, Duration::from_millis(1));
    let _task = controller.clone().spawn(Arc::new(Oversized(17)));
    let guest = client.clone();
    let response = tokio::task::spawn_blocking(move || guest.request_sync(RequestKind::Ping, b"x"))
        .await
        .unwrap()
        .unwrap();
    assert!(response.is_empty());
    controller.close();

    let (client, controller) = Bridge::new(16, Duration::from_millis(1));
    let _task = controller.clone().spawn(Arc::new(EchoHandler));
    let response = tokio::task::spawn_blocking(move || client.request_sync(RequestKind::Socket, b"{}"))
        .await
        .unwrap()
        .unwrap();
    assert!(response.is_empty());
    controller.close();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_timeout_then_busy_until_answered() {
    let (client, controller) = Bridge::new(16, Duration::from_millis(1));
    let _task = controller.clone().spawn(Arc::new(Slow(Duration::from_millis(200))));

    let guest = client.clone();
    let err = tokio::task::spawn_blocking(move || {
        guest.request_sync_timeout(RequestKind::Ping, b"x", Duration::from_millis(10))
    })
    .await
    .unwrap()
    .unwrap_err();
    assert!(matches!(err, BridgeError::Timeout(_)));

    // The first request is still pending on the controller
    let guest = client.clone();
    let busy = tokio::task::spawn_blocking(move || guest.request_sync(RequestKind::Ping, b"y"))
        .await
        .unwrap();
    assert_eq!(busy.unwrap_err(), BridgeError::Busy);

    tokio::time::sleep(Duration::from_millis(300)).await;
    let response = tokio::task::spawn_blocking(move || client.request_sync(RequestKind::Ping, b"z"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(response, b"z");
    controller.close();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_close_wakes_blocked_guest() {
    // No controller task: the call blocks until close
    let (client, controller) = Bridge::new(16, Duration::from_millis(1));
    let guest = client.clone();
    let call = tokio::task::spawn_blocking(move || guest.request_sync(RequestKind::Ping, b"x"));

    tokio::time::sleep(Duration::from_millis(50)).await;
    controller.close();

    assert_eq!(call.await.unwrap().unwrap_err(), BridgeError::Closed);
    assert!(client.is_closed());
    assert_eq!(
        client.request_sync(RequestKind::Ping, b"x").unwrap_err(),
        BridgeError::Closed
    );
}

#[test]
fn test_fresh_mailbox_is_idle() {
    let mailbox = sandbox_kernel::bridge::Mailbox::new(32);
    assert_eq!(mailbox.lock_state(), LOCK_IDLE);
    assert_eq!(mailbox.capacity(), 32);
}
