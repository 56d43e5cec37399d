/*!
 * VFS Directory Entry
 */

use super::file_type::FileType;
use crate::core::types::Ino;
use serde::{Deserialize, Serialize};

/// One child of a directory, as returned by `readdir_entries`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub name: String,
    pub ino: Ino,
    pub file_type: FileType,
}
