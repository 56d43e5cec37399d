/*!
 * VFS Snapshots
 * Flat path → base64 map used to seed, save and restore a filesystem
 */

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::memory::{InodeKind, MemFs};
use super::paths;
use super::types::{VfsError, VfsResult};
use crate::core::limits::{ROOT_INO, SNAPSHOT_ENCODING};
use crate::core::types::Ino;

/// Serializable picture of every regular file in a filesystem
///
/// Only file contents are captured; directories are implied by the paths
/// and symlinks are not carried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VfsSnapshot {
    pub files: BTreeMap<String, String>,
    pub encoding: String,
}

impl Default for VfsSnapshot {
    fn default() -> Self {
        Self {
            files: BTreeMap::new(),
            encoding: SNAPSHOT_ENCODING.to_string(),
        }
    }
}

impl VfsSnapshot {
    /// Build a snapshot from raw path/content pairs
    pub fn from_files<P, D>(files: impl IntoIterator<Item = (P, D)>) -> Self
    where
        P: AsRef<str>,
        D: AsRef<[u8]>,
    {
        Self {
            files: files
                .into_iter()
                .map(|(path, data)| (paths::normalize(path.as_ref()), STANDARD.encode(data)))
                .collect(),
            encoding: SNAPSHOT_ENCODING.to_string(),
        }
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Decoded contents of one entry
    pub fn get(&self, path: &str) -> Option<Vec<u8>> {
        self.files
            .get(&paths::normalize(path))
            .and_then(|encoded| STANDARD.decode(encoded).ok())
    }
}

impl MemFs {
    /// Capture every regular file reachable from the root
    pub fn snapshot(&self) -> VfsSnapshot {
        let mut files = BTreeMap::new();
        let mut stack: Vec<(Ino, String)> = vec![(ROOT_INO, "/".to_string())];

        while let Some((ino, path)) = stack.pop() {
            let Some(inode) = self.inodes.get(&ino) else {
                continue;
            };
            match &inode.kind {
                InodeKind::File { data } => {
                    files.insert(path, STANDARD.encode(data));
                }
                InodeKind::Directory { children } => {
                    for (name, child) in children {
                        stack.push((*child, paths::join(&path, name)));
                    }
                }
                InodeKind::Symlink { .. } => {}
            }
        }

        VfsSnapshot {
            files,
            encoding: SNAPSHOT_ENCODING.to_string(),
        }
    }

    /// Overlay a snapshot onto this filesystem
    ///
    /// Parents are created as needed and existing files are overwritten;
    /// files absent from the snapshot are left alone. The whole snapshot is
    /// decoded before anything is written, so a bad entry changes nothing.
    pub fn restore(&mut self, snapshot: &VfsSnapshot) -> VfsResult<()> {
        if snapshot.encoding != SNAPSHOT_ENCODING {
            return Err(VfsError::invalid(
                "restore",
                "/",
                format!("unsupported snapshot encoding '{}'", snapshot.encoding),
            ));
        }

        let decoded = snapshot
            .files
            .iter()
            .map(|(path, encoded)| {
                STANDARD
                    .decode(encoded)
                    .map(|data| (path.as_str(), data))
                    .map_err(|err| VfsError::invalid("restore", path, err.to_string()))
            })
            .collect::<VfsResult<Vec<_>>>()?;

        for (path, data) in decoded {
            if let Some((parent, _)) = paths::split_parent(path) {
                self.mkdirp(&parent)?;
            }
            self.write_file(path, data)?;
        }
        Ok(())
    }

    /// Fresh filesystem populated from a snapshot
    pub fn from_snapshot(snapshot: &VfsSnapshot) -> VfsResult<Self> {
        let mut fs = Self::new();
        fs.restore(snapshot)?;
        Ok(fs)
    }
}
