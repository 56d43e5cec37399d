/*!
 * Network Module
 * Socket proxies that stand in for host networking inside the sandbox
 */

pub mod bridge;
pub mod http;
pub mod policy;
pub mod proxy;
pub mod queue;
pub mod table;
pub mod transport;
pub mod types;

// Re-exports
pub use bridge::{SocketBridge, SocketCall, SocketReply};
pub use http::{HttpRequest, HttpResponse};
pub use policy::HostPolicy;
pub use proxy::{HttpSocketProxy, SocketProxy, StreamSocketProxy};
pub use queue::ChunkQueue;
pub use table::{SocketDescriptor, SocketTable};
pub use transport::{
    FetchRequest, HttpTransport, ReqwestTransport, StreamConnection, StreamTransport,
    WebSocketTransport,
};
pub use types::{SocketError, SocketEvent, SocketFamily, SocketKind, SocketResult, SocketState};
