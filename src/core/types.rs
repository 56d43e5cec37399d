/*!
 * Core Types
 * Common handle and id types used across the sandbox
 */

/// File descriptor type (VFS and guest-visible)
pub type Fd = u32;

/// Socket descriptor type
pub type SockFd = u32;

/// Inode number
pub type Ino = u64;

/// Correlation id for cross-context request/response pairs
pub type TaskId = u64;

/// Guest-visible process id (one per exec/spawn)
pub type ProcessId = u64;

/// Listening port registered by a guest HTTP server
pub type ServePort = u16;

/// Milliseconds since the UNIX epoch
pub type TimestampMs = u64;

/// Standard stream descriptors, reserved below the VFS descriptor range
pub const STDIN_FD: Fd = 0;
pub const STDOUT_FD: Fd = 1;
pub const STDERR_FD: Fd = 2;
