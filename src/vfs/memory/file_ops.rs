/*!
 * File Operations
 * Whole-file read/write, unlink and truncate
 */

use super::super::types::*;
use super::node::{Inode, InodeKind};
use super::MemFs;
use crate::core::clock::now_ms;
use crate::core::limits::MAX_FILE_SIZE;

impl MemFs {
    /// Write `data` to `path`, creating the file or replacing its contents
    ///
    /// The parent must already exist. An existing file is overwritten in
    /// place, keeping its inode number.
    pub fn write_file(&mut self, path: &str, data: impl Into<Vec<u8>>) -> VfsResult<()> {
        let data = data.into();
        match self.lookup("open", path, true) {
            Ok(ino) => {
                let inode = self
                    .inodes
                    .get_mut(&ino)
                    .ok_or_else(|| VfsError::not_found("open", path))?;
                match &mut inode.kind {
                    InodeKind::File { data: existing } => {
                        *existing = data;
                        inode.touch(now_ms());
                        Ok(())
                    }
                    InodeKind::Directory { .. } => Err(VfsError::is_a_directory("open", path)),
                    InodeKind::Symlink { .. } => Err(VfsError::invalid("open", path, "dangling symlink")),
                }
            }
            Err(err) if err.is_not_found() => {
                let (parent, name, full) = self.lookup_parent("open", path)?;
                if self.child_of(parent, &name).is_some() {
                    // A dangling symlink occupies the name
                    return Err(VfsError::already_exists("open", path));
                }
                let ino = self.alloc_ino();
                self.inodes.insert(ino, Inode::file(ino, data, now_ms()));
                self.link_child(parent, &name, ino);
                self.emit(FsEvent::Create { path: full });
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Read a whole file as bytes
    pub fn read_file_bytes(&mut self, path: &str) -> VfsResult<Vec<u8>> {
        let ino = self.lookup("open", path, true)?;
        let inode = self
            .inodes
            .get_mut(&ino)
            .ok_or_else(|| VfsError::not_found("open", path))?;
        match &inode.kind {
            InodeKind::File { data } => {
                let out = data.clone();
                inode.meta.atime_ms = now_ms();
                Ok(out)
            }
            InodeKind::Directory { .. } => Err(VfsError::is_a_directory("read", path)),
            InodeKind::Symlink { .. } => Err(VfsError::invalid("read", path, "dangling symlink")),
        }
    }

    /// Read a whole file as UTF-8 text
    pub fn read_file(&mut self, path: &str) -> VfsResult<String> {
        let bytes = self.read_file_bytes(path)?;
        String::from_utf8(bytes).map_err(|_| VfsError::invalid("read", path, "file is not valid UTF-8"))
    }

    /// Remove a file or symlink
    pub fn unlink(&mut self, path: &str) -> VfsResult<()> {
        let (parent, name, full) = self.lookup_parent("unlink", path)?;
        let ino = self
            .child_of(parent, &name)
            .ok_or_else(|| VfsError::not_found("unlink", path))?;
        if self.inodes.get(&ino).map(Inode::is_dir).unwrap_or(false) {
            return Err(VfsError::is_a_directory("unlink", path));
        }
        self.unlink_child(parent, &name);
        self.release(ino);
        self.emit(FsEvent::Delete { path: full });
        Ok(())
    }

    /// Resize a file, zero-filling when it grows
    pub fn truncate(&mut self, path: &str, len: u64) -> VfsResult<()> {
        if len > MAX_FILE_SIZE {
            return Err(VfsError::invalid("truncate", path, "exceeds maximum file size"));
        }
        let ino = self.lookup("truncate", path, true)?;
        let inode = self
            .inodes
            .get_mut(&ino)
            .ok_or_else(|| VfsError::not_found("truncate", path))?;
        match &mut inode.kind {
            InodeKind::File { data } => {
                data.resize(len as usize, 0);
                inode.touch(now_ms());
                Ok(())
            }
            _ => Err(VfsError::is_a_directory("truncate", path)),
        }
    }
}
