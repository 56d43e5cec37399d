/*!
 * Directory Operations
 * mkdir, readdir, rmdir, rename and symlinks
 */

use super::super::paths;
use super::super::types::*;
use super::node::{Inode, InodeKind};
use super::MemFs;
use crate::core::clock::now_ms;

impl MemFs {
    /// Create a single directory; the parent must exist
    pub fn mkdir(&mut self, path: &str) -> VfsResult<()> {
        if paths::split_parent(path).is_none() {
            return Err(VfsError::already_exists("mkdir", "/"));
        }
        let (parent, name, full) = self.lookup_parent("mkdir", path)?;
        if self.child_of(parent, &name).is_some() {
            return Err(VfsError::already_exists("mkdir", path));
        }
        let ino = self.alloc_ino();
        self.inodes.insert(ino, Inode::directory(ino, now_ms()));
        self.link_child(parent, &name, ino);
        self.emit(FsEvent::Create { path: full });
        Ok(())
    }

    /// Create a directory and any missing ancestors
    ///
    /// Idempotent: existing directories along the way are accepted, so a
    /// second call is a no-op. A non-directory in the way fails ENOTDIR.
    pub fn mkdirp(&mut self, path: &str) -> VfsResult<()> {
        let mut current = String::new();
        for segment in paths::segments(path) {
            current.push('/');
            current.push_str(segment);
            match self.lookup("mkdir", &current, true) {
                Ok(ino) => {
                    if !self.inodes.get(&ino).map(Inode::is_dir).unwrap_or(false) {
                        return Err(VfsError::not_a_directory("mkdir", path));
                    }
                }
                Err(err) if err.is_not_found() => self.mkdir(&current)?,
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    /// Names in a directory, sorted
    pub fn readdir(&self, path: &str) -> VfsResult<Vec<String>> {
        let ino = self.lookup("scandir", path, true)?;
        let children = self
            .inodes
            .get(&ino)
            .and_then(Inode::children)
            .ok_or_else(|| VfsError::not_a_directory("scandir", path))?;
        Ok(children.keys().cloned().collect())
    }

    /// Directory entries with their types, sorted by name
    pub fn readdir_entries(&self, path: &str) -> VfsResult<Vec<Entry>> {
        let ino = self.lookup("scandir", path, true)?;
        let children = self
            .inodes
            .get(&ino)
            .and_then(Inode::children)
            .ok_or_else(|| VfsError::not_a_directory("scandir", path))?;
        Ok(children
            .iter()
            .filter_map(|(name, child)| {
                self.inodes.get(child).map(|inode| Entry {
                    name: name.clone(),
                    ino: *child,
                    file_type: inode.file_type(),
                })
            })
            .collect())
    }

    /// Remove an empty directory
    pub fn rmdir(&mut self, path: &str) -> VfsResult<()> {
        if paths::split_parent(path).is_none() {
            return Err(VfsError::invalid("rmdir", "/", "cannot remove the root"));
        }
        let (parent, name, full) = self.lookup_parent("rmdir", path)?;
        let ino = self
            .child_of(parent, &name)
            .ok_or_else(|| VfsError::not_found("rmdir", path))?;
        match self.inodes.get(&ino).map(|inode| &inode.kind) {
            Some(InodeKind::Directory { children }) if !children.is_empty() => {
                return Err(VfsError::not_empty("rmdir", path));
            }
            Some(InodeKind::Directory { .. }) => {}
            _ => return Err(VfsError::not_a_directory("rmdir", path)),
        }
        self.unlink_child(parent, &name);
        self.release(ino);
        self.emit(FsEvent::Delete { path: full });
        Ok(())
    }

    /// Move a file, symlink or directory
    ///
    /// An existing file at the destination is replaced; an existing
    /// directory is replaced only if it is empty and the source is a
    /// directory too.
    pub fn rename(&mut self, from: &str, to: &str) -> VfsResult<()> {
        let (src_parent, src_name, src_full) = self.lookup_parent("rename", from)?;
        let src = self
            .child_of(src_parent, &src_name)
            .ok_or_else(|| VfsError::not_found("rename", from))?;
        let (dst_parent, dst_name, dst_full) = self.lookup_parent("rename", to)?;

        let src_is_dir = self.inodes.get(&src).map(Inode::is_dir).unwrap_or(false);
        if src_is_dir && src_full != dst_full && paths::is_within(&dst_full, &src_full) {
            return Err(VfsError::invalid(
                "rename",
                to,
                "cannot move a directory into itself",
            ));
        }

        if let Some(existing) = self.child_of(dst_parent, &dst_name) {
            if existing == src {
                return Ok(());
            }
            match (src_is_dir, self.inodes.get(&existing).map(|inode| &inode.kind)) {
                (true, Some(InodeKind::Directory { children })) if !children.is_empty() => {
                    return Err(VfsError::not_empty("rename", to));
                }
                (true, Some(InodeKind::Directory { .. })) => {}
                (true, _) => return Err(VfsError::not_a_directory("rename", to)),
                (false, Some(InodeKind::Directory { .. })) => {
                    return Err(VfsError::is_a_directory("rename", to));
                }
                (false, _) => {}
            }
            self.unlink_child(dst_parent, &dst_name);
            self.release(existing);
        }

        self.unlink_child(src_parent, &src_name);
        self.link_child(dst_parent, &dst_name, src);
        if let Some(inode) = self.inodes.get_mut(&src) {
            inode.meta.ctime_ms = now_ms();
        }
        self.emit(FsEvent::Move {
            from: src_full,
            to: dst_full,
        });
        Ok(())
    }

    /// Create a symlink at `path` pointing to `target`
    pub fn symlink(&mut self, target: &str, path: &str) -> VfsResult<()> {
        let (parent, name, full) = self.lookup_parent("symlink", path)?;
        if self.child_of(parent, &name).is_some() {
            return Err(VfsError::already_exists("symlink", path));
        }
        let ino = self.alloc_ino();
        self.inodes
            .insert(ino, Inode::symlink(ino, target.to_string(), now_ms()));
        self.link_child(parent, &name, ino);
        self.emit(FsEvent::Create { path: full });
        Ok(())
    }

    /// Target of the symlink at `path`
    pub fn readlink(&self, path: &str) -> VfsResult<String> {
        let ino = self.lookup("readlink", path, false)?;
        match self.inodes.get(&ino).map(|inode| &inode.kind) {
            Some(InodeKind::Symlink { target }) => Ok(target.clone()),
            _ => Err(VfsError::invalid("readlink", path, "not a symbolic link")),
        }
    }
}
