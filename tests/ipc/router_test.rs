/*!
 * Serve Router Tests
 * Requests addressed to a guest port, answered by a fake context
 */

use bytes::Bytes;
use futures::StreamExt;
use pretty_assertions::assert_eq;
use sandbox_kernel::ipc::{
    channel, FromContext, Port, ServeCommand, ServeError, ServeEvent, ServeRouter,
    ToContext, ResponseSink,
};
use sandbox_kernel::network::HttpRequest;
use std::sync::Arc;

fn request(path: &str) -> HttpRequest {
    HttpRequest {
        method: "GET".into(),
        path: path.into(),
        headers: vec![("accept".into(), "*/*".into())],
        body: Bytes::new(),
    }
}

/// Router with one instance "box" listening on port 3000
fn router_with_instance() -> (Arc<ServeRouter>, Port<ToContext, FromContext>) {
    let router = Arc::new(ServeRouter::default());
    let (controller, context) = channel::<FromContext, ToContext>();
    router.register("box", controller.sender());
    router.deliver("box", ServeEvent::Listen { port: 3000 });
    (router, context)
}

async fn next_request(context: &Port<ToContext, FromContext>) -> (u64, String) {
    match context.recv_async().await.unwrap() {
        ToContext::Serve(ServeCommand::Request { id, path, .. }) => (id, path),
        other => panic!("expected serve request, got {other:?}"),
    }
}

#[test]
fn test_sink_end_supplies_default_head() {
    let (controller, context) = channel::<FromContext, ToContext>();
    let sink = ResponseSink::new(4, context.sender());
    sink.end().unwrap();

    assert_eq!(
        controller.recv().unwrap(),
        FromContext::Serve(ServeEvent::ResponseHead {
            id: 4,
            status: 200,
            headers: Vec::new()
        })
    );
    assert_eq!(controller.recv().unwrap(), FromContext::Serve(ServeEvent::End { id: 4 }));
}

#[test]
fn test_sink_rejects_chunk_before_head() {
    let (_controller, context) = channel::<FromContext, ToContext>();
    let mut sink = ResponseSink::new(5, context.sender());
    assert!(sink.chunk("early").is_err());
    sink.error("gave up").unwrap();
}

#[tokio::test]
async fn test_streamed_response_in_order() {
    let (router, context) = router_with_instance();
    assert_eq!(router.url_for("box", 3000), "/__sandbox__/box/3000/");

    let dispatch = {
        let router = Arc::clone(&router);
        tokio::spawn(async move { router.dispatch(request("/__sandbox__/box/3000/hello")).await })
    };

    let (id, path) = next_request(&context).await;
    assert_eq!(path, "/hello");
    router.deliver(
        "box",
        ServeEvent::ResponseHead {
            id,
            status: 201,
            headers: vec![("content-type".into(), "text/plain".into())],
        },
    );
    router.deliver("box", ServeEvent::Chunk { id, data: b"one ".to_vec() });
    router.deliver("box", ServeEvent::Chunk { id, data: b"two".to_vec() });
    router.deliver("box", ServeEvent::End { id });

    let response = dispatch.await.unwrap().unwrap();
    assert_eq!(response.status, 201);
    let chunks: Vec<Bytes> = response
        .body
        .into_stream()
        .map(|chunk| chunk.unwrap())
        .collect()
        .await;
    assert_eq!(chunks, vec![Bytes::from("one "), Bytes::from("two")]);

    // Frames after the terminal one are dropped
    router.deliver("box", ServeEvent::Chunk { id, data: b"late".to_vec() });
}

#[tokio::test]
async fn test_handler_error_before_head() {
    let (router, context) = router_with_instance();
    let dispatch = {
        let router = Arc::clone(&router);
        tokio::spawn(async move { router.dispatch(request("/__sandbox__/box/3000/")).await })
    };
    let (id, _) = next_request(&context).await;
    router.deliver("box", ServeEvent::Error { id, message: "boom".into() });

    let err = dispatch.await.unwrap().unwrap_err();
    assert!(matches!(err, ServeError::Handler(message) if message == "boom"));
}

#[tokio::test]
async fn test_routing_failures() {
    let (router, _context) = router_with_instance();

    let err = router.dispatch(request("/elsewhere")).await.unwrap_err();
    assert!(matches!(err, ServeError::NotRouted(_)));

    let err = router.dispatch(request("/__sandbox__/ghost/3000/")).await.unwrap_err();
    assert!(matches!(err, ServeError::UnknownInstance(_)));

    let err = router.dispatch(request("/__sandbox__/box/4000/")).await.unwrap_err();
    assert!(matches!(err, ServeError::NotListening { port: 4000, .. }));

    router.deliver("box", ServeEvent::Unlisten { port: 3000 });
    assert!(!router.is_listening("box", 3000));
}

#[tokio::test]
async fn test_unregister_fails_in_flight_requests() {
    let (router, context) = router_with_instance();
    let dispatch = {
        let router = Arc::clone(&router);
        tokio::spawn(async move { router.dispatch(request("/__sandbox__/box/3000/")).await })
    };
    let _ = next_request(&context).await;
    assert!(router.unregister("box"));
    assert!(!router.is_registered("box"));

    let err = dispatch.await.unwrap().unwrap_err();
    assert!(matches!(err, ServeError::Disposed));
}
