/*!
 * IPC Module
 * Cross-context message protocol: tagged families, ports, correlation and
 * serve routing
 */

pub mod messages;
pub mod pending;
pub mod port;
pub mod serve;
pub mod subscribers;

// Re-exports
pub use messages::{
    FromContext, FsReply, FsRequest, ProcessCommand, ProcessEvent, ProtocolError, ServeCommand,
    ServeEvent, ToContext,
};
pub use pending::{PendingTasks, TaskError, TaskReceiver};
pub use port::{channel, decode_frame, Port, PortReceiver, PortSender};
pub use serve::{
    parse_route, Channel, ResponseSink, ServeBody, ServeError, ServeHandler, ServeResponse,
    ServeRouter,
};
pub use subscribers::{SubscriberId, Subscribers};
