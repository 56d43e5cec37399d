/*!
 * VFS Change Events
 * Notifications emitted after a mutation commits
 */

use serde::{Deserialize, Serialize};

/// Filesystem change notification
///
/// Emitted by the store that performed the mutation and fanned out to
/// subscribers by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FsEvent {
    Create { path: String },
    Delete { path: String },
    Move { from: String, to: String },
}

impl FsEvent {
    /// Path the event is primarily about (the destination for moves)
    #[must_use]
    pub fn path(&self) -> &str {
        match self {
            FsEvent::Create { path } | FsEvent::Delete { path } => path,
            FsEvent::Move { to, .. } => to,
        }
    }
}
