/*!
 * Virtual File System Module
 * In-memory POSIX-like filesystem owned by each execution context
 */

pub mod memory;
pub mod paths;
pub mod snapshot;
pub mod types;

// Re-exports
pub use memory::{FileDescriptor, MemFs, SharedFs};
pub use snapshot::VfsSnapshot;
pub use types::{Entry, FileType, FsEvent, Metadata, OpenFlags, VfsError, VfsResult, Whence};
