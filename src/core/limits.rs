/*!
 * Sandbox Limits and Constants
 *
 * Centralized location for sandbox-wide limits, defaults and magic numbers.
 * Grouped by subsystem; values that are part of a wire contract are marked
 * [WIRE].
 */

use std::time::Duration;

// =============================================================================
// VFS
// =============================================================================

/// Inode number of the root directory
pub const ROOT_INO: u64 = 1;

/// First descriptor handed out by the VFS (0-2 are the standard streams)
pub const FIRST_VFS_FD: u32 = 3;

/// Maximum symlink expansions during a single path walk
pub const MAX_SYMLINK_HOPS: usize = 40;

/// Default mode bits for regular files
pub const DEFAULT_FILE_MODE: u32 = 0o100644;

/// Default mode bits for directories
pub const DEFAULT_DIR_MODE: u32 = 0o040755;

/// Default mode bits for symbolic links
pub const DEFAULT_SYMLINK_MODE: u32 = 0o120777;

/// Largest size a file may grow to through writes, seeks or truncation
pub const MAX_FILE_SIZE: u64 = 256 * 1024 * 1024;

/// [WIRE] Encoding tag written into every VFS snapshot
pub const SNAPSHOT_ENCODING: &str = "base64";

// =============================================================================
// SYNCHRONOUS BRIDGE
// =============================================================================

/// Default payload capacity of the mailbox (64KB)
pub const BRIDGE_PAYLOAD_CAPACITY: usize = 64 * 1024;

/// Controller poll interval while no request is pending
pub const BRIDGE_POLL_INTERVAL: Duration = Duration::from_millis(1);

// =============================================================================
// SOCKETS
// =============================================================================

/// First socket descriptor; kept well above VFS descriptors so the guest
/// can tell the two tables apart
pub const FIRST_SOCKET_FD: u32 = 1000;

/// Default receive size used when a caller passes zero
pub const DEFAULT_RECV_SIZE: usize = 64 * 1024;

/// Bytes of a socket reply that are not payload: the JSON envelope plus
/// base64 padding
pub const SOCKET_REPLY_OVERHEAD: usize = 64;

// =============================================================================
// PROCESSES AND CONTEXTS
// =============================================================================

/// Bound on how long boot waits for the execution context to report ready
pub const DEFAULT_BOOT_TIMEOUT: Duration = Duration::from_secs(30);

/// Exit code reported for a process that was killed
pub const KILLED_EXIT_CODE: i32 = 137;

/// Exit code reported when the requested command is not registered
pub const COMMAND_NOT_FOUND_EXIT_CODE: i32 = 127;

/// [WIRE] Path prefix the HTTP-intercepting context routes on
pub const DEFAULT_SERVE_PREFIX: &str = "/__sandbox__";
