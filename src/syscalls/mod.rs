/*!
 * Syscalls Module
 *
 * The guest import surface. Arguments arrive as offsets into the guest's
 * linear memory and every import answers with an [`Errno`]; nothing but a
 * [`Trap`] unwinds the guest.
 *
 * [`Errno`]: crate::core::errors::Errno
 */

mod env;
mod fs;
mod host;
mod memory;
mod serve;
mod socket;
mod types;

// Re-export public API
pub use env::{CLOCK_MONOTONIC, CLOCK_REALTIME};
pub use host::{GuestHost, StdinSource};
pub use memory::{GuestMemory, GuestMemoryExt, LinearMemory};
pub use serve::ServeRegistrar;
pub use types::{null_sink, OutputSink, SyscallResult, Trap};
