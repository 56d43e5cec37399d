/*!
 * VFS Types
 * Shared types for filesystem operations with serde support
 */

mod entry;
mod errors;
mod event;
mod file_type;
mod metadata;
mod open_flags;

pub use entry::Entry;
pub use errors::{VfsError, VfsResult};
pub use event::FsEvent;
pub use file_type::FileType;
pub use metadata::Metadata;
pub use open_flags::{OpenFlags, Whence};
