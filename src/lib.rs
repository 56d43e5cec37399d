/*!
 * Sandbox Kernel Library
 *
 * Runs untrusted guest programs in isolated execution contexts backed by
 * an in-memory filesystem, a synchronous call bridge and proxied sockets.
 */

pub mod bridge;
pub mod config;
pub mod core;
pub mod ipc;
pub mod modules;
pub mod monitoring;
pub mod network;
pub mod process;
pub mod syscalls;
pub mod vfs;

// Re-exports
pub use config::SandboxConfig;
pub use crate::core::errors::Errno;
pub use monitoring::init_tracing;
pub use process::{
    ExecOutput, GuestModule, GuestRegistry, ProcessHandle, Sandbox, SandboxBuilder, SandboxError,
    SandboxResult, SandboxState,
};
pub use vfs::{MemFs, VfsError, VfsSnapshot};
