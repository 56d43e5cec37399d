/*!
 * Request/Response Proxy Tests
 */

use crate::common::MockHttp;
use pretty_assertions::assert_eq;
use sandbox_kernel::core::errors::Errno;
use sandbox_kernel::network::{
    HostPolicy, HttpSocketProxy, SocketError, SocketEvent, SocketFamily, SocketKind, SocketProxy,
    SocketState,
};
use std::sync::Arc;
use std::time::Duration;

const REQUEST: &[u8] = b"POST /submit HTTP/1.1\r\nHost: api.test\r\nContent-Type: text/plain\r\n\r\npayload";

fn proxy(policy: HostPolicy, transport: Arc<MockHttp>) -> Arc<HttpSocketProxy> {
    Arc::new(HttpSocketProxy::new(policy, transport))
}

#[tokio::test]
async fn test_buffers_until_flush_then_one_fetch() {
    let transport = MockHttp::new();
    let proxy = proxy(HostPolicy::allow_all(), transport.clone());
    let fd = proxy.open(SocketFamily::Inet4, SocketKind::Stream);
    proxy.connect(fd, "api.test", 8080, None).await.unwrap();

    proxy.send(fd, &REQUEST[..20]).unwrap();
    proxy.send(fd, &REQUEST[20..]).unwrap();
    assert_eq!(transport.count(), 0);
    assert!(proxy.recv(fd, 0).unwrap().is_empty());

    proxy.flush(fd).await.unwrap();
    assert_eq!(transport.count(), 1);
    {
        let requests = transport.requests.lock();
        let fetch = &requests[0];
        assert_eq!(fetch.method, "POST");
        assert_eq!(fetch.url.as_str(), "http://api.test:8080/submit");
        assert_eq!(fetch.body.as_ref(), b"payload");
        assert!(fetch
            .headers
            .contains(&("Content-Type".to_string(), "text/plain".to_string())));
    }

    let response = proxy.recv_wait(fd, 0).await.unwrap();
    let text = String::from_utf8(response.to_vec()).unwrap();
    assert_eq!(
        text,
        "HTTP/1.1 200 OK\r\nx-mock: 1\r\ncontent-length: 12\r\n\r\nPOST /submit"
    );
    assert!(proxy.recv_wait(fd, 0).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_partial_reads_of_response() {
    let proxy = proxy(HostPolicy::allow_all(), MockHttp::new());
    let fd = proxy.open(SocketFamily::Inet4, SocketKind::Stream);
    proxy.connect(fd, "api.test", 80, None).await.unwrap();
    proxy.send(fd, b"GET /x HTTP/1.1\r\n\r\n").unwrap();
    proxy.flush(fd).await.unwrap();

    let mut total = Vec::new();
    loop {
        let chunk = proxy.recv(fd, 7).unwrap();
        if chunk.is_empty() {
            break;
        }
        assert!(chunk.len() <= 7);
        total.extend_from_slice(&chunk);
    }
    assert!(total.ends_with(b"GET /x"));
}

#[tokio::test]
async fn test_connect_validation() {
    let transport = MockHttp::new();
    let proxy = proxy(HostPolicy::allowlist(["*.example.com"]), transport.clone());

    let fd = proxy.open(SocketFamily::Inet4, SocketKind::Stream);
    let err = proxy.connect(fd, "api.example.com", 0, None).await.unwrap_err();
    assert_eq!(err.errno(), Errno::Inval);

    let fd = proxy.open(SocketFamily::Inet4, SocketKind::Stream);
    let err = proxy.connect(fd, "example.org", 80, None).await.unwrap_err();
    assert_eq!(err, SocketError::Blocked { host: "example.org".into() });
    assert_eq!(err.errno(), Errno::Acces);

    let fd = proxy.open(SocketFamily::Inet4, SocketKind::Stream);
    proxy.connect(fd, "example.com", 443, None).await.unwrap();
    assert_eq!(proxy.table().state(fd), Some(SocketState::Connected));
    assert_eq!(transport.count(), 0);
}

#[tokio::test]
async fn test_send_before_connect_is_not_connected() {
    let proxy = proxy(HostPolicy::allow_all(), MockHttp::new());
    let fd = proxy.open(SocketFamily::Inet4, SocketKind::Stream);
    assert_eq!(proxy.send(fd, b"x").unwrap_err().errno(), Errno::Notconn);
}

#[tokio::test]
async fn test_closed_descriptor_is_ebadf_and_double_close_is_noop() {
    let proxy = proxy(HostPolicy::allow_all(), MockHttp::new());
    let fd = proxy.open(SocketFamily::Inet4, SocketKind::Stream);
    proxy.close(fd);
    proxy.close(fd);

    assert_eq!(proxy.send(fd, b"x").unwrap_err(), SocketError::BadDescriptor { fd });
    assert_eq!(proxy.recv(fd, 1).unwrap_err().errno(), Errno::Badf);
    assert!(proxy.table().is_empty());
}

#[tokio::test]
async fn test_transport_failure_publishes_error_then_closed() {
    let transport = MockHttp::failing(SocketError::Refused("connection refused".into()));
    let proxy = proxy(HostPolicy::allow_all(), transport);
    let mut events = proxy.subscribe();

    let fd = proxy.open(SocketFamily::Inet4, SocketKind::Stream);
    proxy.connect(fd, "down.test", 80, None).await.unwrap();
    proxy.send(fd, b"GET / HTTP/1.1\r\n\r\n").unwrap();
    let err = proxy.flush(fd).await.unwrap_err();
    assert_eq!(err.errno(), Errno::Connrefused);

    assert_eq!(events.recv().await.unwrap(), SocketEvent::Connected { fd });
    match events.recv().await.unwrap() {
        SocketEvent::Error { fd: got, errno, .. } => {
            assert_eq!(got, fd);
            assert_eq!(errno, Errno::Connrefused);
        }
        other => panic!("expected error event, got {other:?}"),
    }
    assert_eq!(events.recv().await.unwrap(), SocketEvent::Closed { fd });
    assert_eq!(proxy.table().state(fd), Some(SocketState::Closed));
}

#[tokio::test]
async fn test_close_aborts_in_flight_fetch() {
    let proxy = proxy(HostPolicy::allow_all(), MockHttp::slow(Duration::from_secs(30)));
    let fd = proxy.open(SocketFamily::Inet4, SocketKind::Stream);
    proxy.connect(fd, "slow.test", 80, None).await.unwrap();
    proxy.send(fd, b"GET / HTTP/1.1\r\n\r\n").unwrap();

    let flushing = {
        let proxy = Arc::clone(&proxy);
        tokio::spawn(async move { proxy.flush(fd).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    proxy.close(fd);

    let result = tokio::time::timeout(Duration::from_secs(5), flushing)
        .await
        .expect("flush should finish once the socket is closed")
        .unwrap();
    assert!(result.is_err());
    assert!(!proxy.table().contains(fd));
}

#[test]
fn test_wildcard_policy() {
    let policy = HostPolicy::allowlist(["*.cdn.net", "Exact.io"]);
    assert!(policy.is_allowed("cdn.net"));
    assert!(policy.is_allowed("a.b.cdn.net"));
    assert!(policy.is_allowed("exact.io"));
    assert!(!policy.is_allowed("sub.exact.io"));
    assert!(!policy.is_allowed("notcdn.net"));
    assert!(HostPolicy::from_option(None).is_allowed("anything"));
    assert!(!HostPolicy::from_option(Some(vec![])).is_allowed("anything"));
}
