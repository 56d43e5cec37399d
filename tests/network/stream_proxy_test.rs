/*!
 * Stream Proxy Tests
 */

use crate::common::{EchoStream, RefusingStream};
use pretty_assertions::assert_eq;
use sandbox_kernel::core::errors::Errno;
use sandbox_kernel::network::{
    HostPolicy, SocketEvent, SocketFamily, SocketKind, SocketProxy, SocketState, StreamSocketProxy,
};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_frames_are_echoed_as_separate_chunks() {
    let transport = Arc::new(EchoStream::default());
    let proxy = StreamSocketProxy::new(HostPolicy::allow_all(), transport.clone());
    let fd = proxy.open(SocketFamily::Inet4, SocketKind::Stream);
    proxy.connect(fd, "ws.test", 9000, None).await.unwrap();
    assert_eq!(transport.opened.lock()[0].as_str(), "ws://ws.test:9000/");

    proxy.send(fd, b"one").unwrap();
    proxy.send(fd, b"two").unwrap();

    let first = proxy.recv_wait(fd, 100).await.unwrap();
    let second = proxy.recv_wait(fd, 100).await.unwrap();
    assert_eq!(first.as_ref(), b"echo:one");
    assert_eq!(second.as_ref(), b"echo:two");
}

#[tokio::test]
async fn test_explicit_url_wins() {
    let transport = Arc::new(EchoStream::default());
    let proxy = StreamSocketProxy::new(HostPolicy::allow_all(), transport.clone());
    let fd = proxy.open(SocketFamily::Inet6, SocketKind::Stream);
    proxy
        .connect(fd, "ws.test", 443, Some("wss://ws.test/socket"))
        .await
        .unwrap();
    assert_eq!(transport.opened.lock()[0].as_str(), "wss://ws.test/socket");
}

#[tokio::test]
async fn test_refused_connection_moves_to_error() {
    let proxy = StreamSocketProxy::new(HostPolicy::allow_all(), Arc::new(RefusingStream));
    let mut events = proxy.subscribe();
    let fd = proxy.open(SocketFamily::Inet4, SocketKind::Stream);

    let err = proxy.connect(fd, "down.test", 1234, None).await.unwrap_err();
    assert_eq!(err.errno(), Errno::Connrefused);
    assert_eq!(proxy.table().state(fd), Some(SocketState::Error));
    assert!(matches!(events.recv().await.unwrap(), SocketEvent::Error { .. }));
    assert_eq!(events.recv().await.unwrap(), SocketEvent::Closed { fd });

    // Terminal: nothing to wait for
    let drained = tokio::time::timeout(Duration::from_secs(1), proxy.recv_wait(fd, 10))
        .await
        .unwrap()
        .unwrap();
    assert!(drained.is_empty());
}

#[tokio::test]
async fn test_close_all_drops_every_socket() {
    let proxy = StreamSocketProxy::new(HostPolicy::allow_all(), Arc::new(EchoStream::default()));
    let a = proxy.open(SocketFamily::Inet4, SocketKind::Stream);
    let b = proxy.open(SocketFamily::Inet4, SocketKind::Stream);
    proxy.connect(a, "ws.test", 80, None).await.unwrap();
    assert_eq!((a, b), (1000, 1001));

    proxy.close_all();
    assert!(proxy.table().is_empty());
    assert_eq!(proxy.send(a, b"x").unwrap_err().errno(), Errno::Badf);
}
