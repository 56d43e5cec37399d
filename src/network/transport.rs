/*!
 * Host Transports
 * The host-side I/O a socket proxy delegates to: one-shot HTTP fetches and
 * duplex message streams
 */

use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, warn};
use url::Url;

use super::http::HttpResponse;
use super::types::{SocketError, SocketResult};

/// One host-level HTTP request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub url: Url,
    pub method: String,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

/// Performs host HTTP requests for the request/response proxy
#[async_trait]
pub trait HttpTransport: Send + Sync + 'static {
    async fn fetch(&self, request: FetchRequest) -> SocketResult<HttpResponse>;
}

/// An open duplex stream
///
/// Frames pushed into `outgoing` are sent in order. `incoming` yields each
/// inbound frame and ends when the remote side closes. `tasks` are the
/// pumps behind the connection, aborted when the socket closes.
#[derive(Debug)]
pub struct StreamConnection {
    pub outgoing: mpsc::UnboundedSender<Bytes>,
    pub incoming: mpsc::UnboundedReceiver<Bytes>,
    pub tasks: Vec<AbortHandle>,
}

/// Opens duplex streams for the stream proxy
#[async_trait]
pub trait StreamTransport: Send + Sync + 'static {
    async fn open(&self, url: &Url) -> SocketResult<StreamConnection>;
}

/// [`HttpTransport`] backed by a shared `reqwest::Client`
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> SocketResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| SocketError::Unreachable(err.to_string()))?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn fetch(&self, request: FetchRequest) -> SocketResult<HttpResponse> {
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|_| SocketError::Malformed(format!("bad method '{}'", request.method)))?;
        debug!(%method, url = %request.url, "proxy fetch");

        let mut builder = self.client.request(method, request.url.clone());
        for (key, value) in &request.headers {
            // reqwest derives these from the URL and body
            if key.eq_ignore_ascii_case("host") || key.eq_ignore_ascii_case("content-length") {
                continue;
            }
            builder = builder.header(key.as_str(), value.as_str());
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }

        let response = builder.send().await.map_err(map_reqwest_error)?;
        let status = response.status();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(key, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (key.as_str().to_string(), value.to_string()))
            })
            .collect();
        let body = response.bytes().await.map_err(map_reqwest_error)?;

        Ok(HttpResponse {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or("").to_string(),
            headers,
            body,
        })
    }
}

fn map_reqwest_error(err: reqwest::Error) -> SocketError {
    if err.is_connect() {
        SocketError::Refused(err.to_string())
    } else {
        SocketError::Unreachable(err.to_string())
    }
}

/// [`StreamTransport`] over WebSocket
#[derive(Debug, Default, Clone, Copy)]
pub struct WebSocketTransport;

#[async_trait]
impl StreamTransport for WebSocketTransport {
    async fn open(&self, url: &Url) -> SocketResult<StreamConnection> {
        let (ws_stream, _) = connect_async(url.as_str())
            .await
            .map_err(|err| SocketError::Refused(format!("{url}: {err}")))?;
        let (mut sink, mut stream) = ws_stream.split();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Bytes>();
        let (in_tx, in_rx) = mpsc::unbounded_channel::<Bytes>();

        let writer = tokio::spawn(async move {
            while let Some(frame) = out_rx.recv().await {
                if let Err(err) = sink.send(Message::Binary(frame.to_vec())).await {
                    warn!(error = %err, "websocket send failed");
                    break;
                }
            }
            let _ = sink.close().await;
        });

        let reader = tokio::spawn(async move {
            while let Some(message) = stream.next().await {
                let frame = match message {
                    Ok(Message::Text(text)) => Bytes::from(text.into_bytes()),
                    Ok(Message::Binary(bin)) => Bytes::from(bin),
                    Ok(Message::Close(_)) => break,
                    Ok(_) => continue,
                    Err(err) => {
                        warn!(error = %err, "websocket receive failed");
                        break;
                    }
                };
                if in_tx.send(frame).is_err() {
                    break;
                }
            }
        });

        Ok(StreamConnection {
            outgoing: out_tx,
            incoming: in_rx,
            tasks: vec![writer.abort_handle(), reader.abort_handle()],
        })
    }
}
