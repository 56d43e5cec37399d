/*!
 * In-Memory Filesystem
 * Inode store plus descriptor table, the only storage backend the sandbox has
 */

mod dir_ops;
mod fd_ops;
mod file_ops;
mod node;

use ahash::{HashMap, HashMapExt, HashSet, HashSetExt};
use parking_lot::Mutex;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use tracing::trace;

use super::paths;
use super::types::*;
use crate::core::clock::now_ms;
use crate::core::limits::{FIRST_VFS_FD, MAX_SYMLINK_HOPS, ROOT_INO};
use crate::core::types::{Fd, Ino};
pub(in crate::vfs) use node::{Inode, InodeKind};

/// VFS handle shared between an owner and its syscall layer
pub type SharedFs = Arc<Mutex<MemFs>>;

/// An open file handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileDescriptor {
    pub fd: Fd,
    pub ino: Ino,
    pub offset: u64,
    pub flags: OpenFlags,
}

/// In-memory filesystem
///
/// Inode numbers come from a monotonic counter and are never reused.
/// Unlinking a file that still has open descriptors detaches it from the
/// tree but keeps the inode alive until the last descriptor closes.
#[derive(Debug)]
pub struct MemFs {
    pub(super) inodes: HashMap<Ino, Inode>,
    pub(super) next_ino: Ino,
    pub(super) fds: BTreeMap<Fd, FileDescriptor>,
    pub(super) next_fd: Fd,
    pub(super) orphans: HashSet<Ino>,
    pub(super) observer: Option<flume::Sender<FsEvent>>,
}

impl MemFs {
    /// Create an empty filesystem containing only the root directory
    pub fn new() -> Self {
        let mut inodes = HashMap::new();
        inodes.insert(ROOT_INO, Inode::directory(ROOT_INO, now_ms()));

        Self {
            inodes,
            next_ino: ROOT_INO + 1,
            fds: BTreeMap::new(),
            next_fd: FIRST_VFS_FD,
            orphans: HashSet::new(),
            observer: None,
        }
    }

    /// Wrap into the shared handle used across the crate
    pub fn shared(self) -> SharedFs {
        Arc::new(Mutex::new(self))
    }

    /// Route change notifications to `tx`
    ///
    /// Events are emitted after the mutation commits. A disconnected
    /// receiver is ignored.
    pub fn set_observer(&mut self, tx: flume::Sender<FsEvent>) {
        self.observer = Some(tx);
    }

    /// Number of live inodes, including orphans kept alive by descriptors
    pub fn inode_count(&self) -> usize {
        self.inodes.len()
    }

    /// Metadata for `path`, following symlinks
    pub fn stat(&self, path: &str) -> VfsResult<Metadata> {
        let ino = self.lookup("stat", path, true)?;
        self.meta(ino, "stat", path)
    }

    /// Metadata for `path` without following a final symlink
    pub fn lstat(&self, path: &str) -> VfsResult<Metadata> {
        let ino = self.lookup("lstat", path, false)?;
        self.meta(ino, "lstat", path)
    }

    /// Whether `path` resolves to anything
    pub fn exists(&self, path: &str) -> bool {
        self.lookup("access", path, true).is_ok()
    }

    fn meta(&self, ino: Ino, op: &str, path: &str) -> VfsResult<Metadata> {
        self.inodes
            .get(&ino)
            .map(|inode| inode.meta)
            .ok_or_else(|| VfsError::not_found(op, path))
    }

    /// Resolve `path` to an inode
    pub(super) fn lookup(&self, op: &str, path: &str, follow_last: bool) -> VfsResult<Ino> {
        self.walk(op, path, follow_last, path)
    }

    /// Resolve the parent directory of `path`
    ///
    /// Returns the parent inode, the final segment and the normalized path.
    /// Failures report the full path, not the parent's.
    pub(super) fn lookup_parent(&self, op: &str, path: &str) -> VfsResult<(Ino, String, String)> {
        let (parent, name) = paths::split_parent(path)
            .ok_or_else(|| VfsError::invalid(op, "/", "operation not permitted on the root"))?;
        let parent_ino = self.walk(op, &parent, true, path)?;
        let is_dir = self
            .inodes
            .get(&parent_ino)
            .map(Inode::is_dir)
            .unwrap_or(false);
        if !is_dir {
            return Err(VfsError::not_a_directory(op, path));
        }
        let full = paths::join(&parent, &name);
        Ok((parent_ino, name, full))
    }

    /// Walk segment by segment from the root
    ///
    /// Symlinks are expanded in place; absolute targets restart at the root,
    /// relative ones continue from the directory holding the link. `..`
    /// never pops, whether it comes from the caller or from a link target.
    fn walk(&self, op: &str, path: &str, follow_last: bool, reported: &str) -> VfsResult<Ino> {
        let mut pending: VecDeque<String> = paths::segments(path).map(str::to_string).collect();
        let mut stack: Vec<Ino> = vec![ROOT_INO];
        let mut hops = 0usize;

        while let Some(segment) = pending.pop_front() {
            let current = *stack.last().unwrap_or(&ROOT_INO);
            let children = self
                .inodes
                .get(&current)
                .ok_or_else(|| VfsError::not_found(op, reported))?
                .children()
                .ok_or_else(|| VfsError::not_a_directory(op, reported))?;
            let child = *children
                .get(&segment)
                .ok_or_else(|| VfsError::not_found(op, reported))?;
            let node = self
                .inodes
                .get(&child)
                .ok_or_else(|| VfsError::not_found(op, reported))?;

            if let InodeKind::Symlink { target } = &node.kind {
                if !pending.is_empty() || follow_last {
                    hops += 1;
                    if hops > MAX_SYMLINK_HOPS {
                        return Err(VfsError::invalid(
                            op,
                            reported,
                            "too many levels of symbolic links",
                        ));
                    }
                    let mut expanded: VecDeque<String> =
                        paths::segments(target).map(str::to_string).collect();
                    expanded.extend(pending.drain(..));
                    pending = expanded;
                    if target.starts_with('/') {
                        stack.truncate(1);
                    }
                    continue;
                }
            }
            stack.push(child);
        }

        Ok(*stack.last().unwrap_or(&ROOT_INO))
    }

    pub(super) fn alloc_ino(&mut self) -> Ino {
        let ino = self.next_ino;
        self.next_ino += 1;
        ino
    }

    /// Link `ino` into `parent` under `name`
    pub(super) fn link_child(&mut self, parent: Ino, name: &str, ino: Ino) {
        let now = now_ms();
        if let Some(dir) = self.inodes.get_mut(&parent) {
            if let Some(children) = dir.children_mut() {
                children.insert(name.to_string(), ino);
            }
            dir.touch(now);
        }
    }

    /// Remove `name` from `parent`, returning the detached inode number
    pub(super) fn unlink_child(&mut self, parent: Ino, name: &str) -> Option<Ino> {
        let now = now_ms();
        let dir = self.inodes.get_mut(&parent)?;
        let removed = dir.children_mut()?.remove(name);
        dir.touch(now);
        removed
    }

    pub(super) fn child_of(&self, parent: Ino, name: &str) -> Option<Ino> {
        self.inodes.get(&parent)?.children()?.get(name).copied()
    }

    /// Drop a detached inode, or park it as an orphan while descriptors remain
    pub(super) fn release(&mut self, ino: Ino) {
        if self.fds.values().any(|fd| fd.ino == ino) {
            trace!(ino, "inode detached while open, keeping until close");
            self.orphans.insert(ino);
        } else {
            self.inodes.remove(&ino);
        }
    }

    pub(super) fn emit(&self, event: FsEvent) {
        if let Some(tx) = &self.observer {
            let _ = tx.send(event);
        }
    }
}

impl Default for MemFs {
    fn default() -> Self {
        Self::new()
    }
}
