/*!
 * Process Module
 *
 * Sandbox orchestration: the controller-side [`Sandbox`], the execution
 * context thread that runs guests, and the handles that connect them.
 */

pub mod context;
pub mod guest;
pub mod handle;
pub mod sandbox;
pub mod types;

// Re-exports
pub use context::ExecutionContext;
pub use guest::{GuestFactory, GuestModule, GuestRegistry};
pub use handle::ProcessHandle;
pub use sandbox::{Sandbox, SandboxBuilder};
pub use types::{ExecOutput, SandboxError, SandboxResult, SandboxState};
