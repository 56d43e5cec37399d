/*!
 * Descriptor Operations
 * open/read/write/seek/close over the descriptor table
 */

use super::super::types::*;
use super::node::{Inode, InodeKind};
use super::{FileDescriptor, MemFs};
use crate::core::clock::now_ms;
use crate::core::limits::MAX_FILE_SIZE;
use crate::core::types::Fd;
use tracing::trace;

impl MemFs {
    /// Open `path` and return a new descriptor
    pub fn open(&mut self, path: &str, flags: OpenFlags) -> VfsResult<Fd> {
        flags.validate(path)?;

        let ino = match self.lookup("open", path, true) {
            Ok(ino) => {
                if flags.create && flags.exclusive {
                    return Err(VfsError::already_exists("open", path));
                }
                let inode = self
                    .inodes
                    .get_mut(&ino)
                    .ok_or_else(|| VfsError::not_found("open", path))?;
                match &mut inode.kind {
                    InodeKind::Directory { .. } if flags.is_writable() => {
                        return Err(VfsError::is_a_directory("open", path));
                    }
                    InodeKind::File { data } if flags.truncate => {
                        data.clear();
                        inode.touch(now_ms());
                    }
                    _ => {}
                }
                ino
            }
            Err(err) if err.is_not_found() && flags.create => {
                let (parent, name, full) = self.lookup_parent("open", path)?;
                if self.child_of(parent, &name).is_some() {
                    return Err(VfsError::already_exists("open", path));
                }
                let ino = self.alloc_ino();
                self.inodes.insert(ino, Inode::file(ino, Vec::new(), now_ms()));
                self.link_child(parent, &name, ino);
                self.emit(FsEvent::Create { path: full });
                ino
            }
            Err(err) => return Err(err),
        };

        let offset = if flags.append {
            self.inodes.get(&ino).map(|inode| inode.meta.size).unwrap_or(0)
        } else {
            0
        };

        let fd = self.next_fd;
        self.next_fd += 1;
        self.fds.insert(
            fd,
            FileDescriptor {
                fd,
                ino,
                offset,
                flags,
            },
        );
        trace!(fd, ino, path, "opened descriptor");
        Ok(fd)
    }

    /// Read up to `buf.len()` bytes at the descriptor's offset
    ///
    /// Returns 0 at end of file.
    pub fn fd_read(&mut self, fd: Fd, buf: &mut [u8]) -> VfsResult<usize> {
        let desc = self.descriptor("read", fd)?;
        if !desc.flags.read {
            return Err(VfsError::bad_descriptor("read", fd));
        }
        let inode = self
            .inodes
            .get_mut(&desc.ino)
            .ok_or_else(|| VfsError::bad_descriptor("read", fd))?;
        let data = match &inode.kind {
            InodeKind::File { data } => data,
            _ => return Err(VfsError::is_a_directory("read", &fd.to_string())),
        };

        let start = (desc.offset as usize).min(data.len());
        let n = buf.len().min(data.len() - start);
        buf[..n].copy_from_slice(&data[start..start + n]);
        inode.meta.atime_ms = now_ms();

        if let Some(entry) = self.fds.get_mut(&fd) {
            entry.offset += n as u64;
        }
        Ok(n)
    }

    /// Write `buf` at the descriptor's offset, or at EOF in append mode
    ///
    /// Writing past the end zero-fills the gap. A write that would end
    /// beyond [`MAX_FILE_SIZE`] fails with EINVAL and changes nothing.
    pub fn fd_write(&mut self, fd: Fd, buf: &[u8]) -> VfsResult<usize> {
        let desc = self.descriptor("write", fd)?;
        if !desc.flags.is_writable() {
            return Err(VfsError::bad_descriptor("write", fd));
        }
        let inode = self
            .inodes
            .get_mut(&desc.ino)
            .ok_or_else(|| VfsError::bad_descriptor("write", fd))?;
        let data = match &mut inode.kind {
            InodeKind::File { data } => data,
            _ => return Err(VfsError::is_a_directory("write", &fd.to_string())),
        };

        let start = if desc.flags.append {
            data.len() as u64
        } else {
            desc.offset
        };
        let end = start
            .checked_add(buf.len() as u64)
            .filter(|end| *end <= MAX_FILE_SIZE)
            .ok_or_else(|| {
                VfsError::invalid("write", &fd.to_string(), "exceeds maximum file size")
            })?;
        let (start, end) = (start as usize, end as usize);
        if data.len() < end {
            data.resize(end, 0);
        }
        data[start..end].copy_from_slice(buf);
        inode.touch(now_ms());

        if let Some(entry) = self.fds.get_mut(&fd) {
            entry.offset = end as u64;
        }
        Ok(buf.len())
    }

    /// Reposition the descriptor; returns the new absolute offset
    pub fn fd_seek(&mut self, fd: Fd, offset: i64, whence: Whence) -> VfsResult<u64> {
        let desc = self.descriptor("seek", fd)?;
        let size = self
            .inodes
            .get(&desc.ino)
            .map(|inode| inode.meta.size)
            .unwrap_or(0);
        let base = match whence {
            Whence::Set => 0i64,
            Whence::Current => desc.offset as i64,
            Whence::End => size as i64,
        };
        let target = base
            .checked_add(offset)
            .filter(|pos| *pos >= 0)
            .ok_or_else(|| VfsError::invalid("seek", &fd.to_string(), "resulting offset is negative"))?;

        if let Some(entry) = self.fds.get_mut(&fd) {
            entry.offset = target as u64;
        }
        Ok(target as u64)
    }

    /// Metadata of the inode behind a descriptor, orphaned or not
    pub fn fd_stat(&self, fd: Fd) -> VfsResult<Metadata> {
        let desc = self.descriptor("fstat", fd)?;
        self.inodes
            .get(&desc.ino)
            .map(|inode| inode.meta)
            .ok_or_else(|| VfsError::bad_descriptor("fstat", fd))
    }

    /// Close a descriptor, dropping its inode if it was the last reference
    /// to an unlinked file
    pub fn close(&mut self, fd: Fd) -> VfsResult<()> {
        let desc = self
            .fds
            .remove(&fd)
            .ok_or_else(|| VfsError::bad_descriptor("close", fd))?;
        if self.orphans.contains(&desc.ino) && !self.fds.values().any(|d| d.ino == desc.ino) {
            self.orphans.remove(&desc.ino);
            self.inodes.remove(&desc.ino);
            trace!(ino = desc.ino, "released orphaned inode");
        }
        Ok(())
    }

    /// Number of open descriptors
    pub fn open_count(&self) -> usize {
        self.fds.len()
    }

    fn descriptor(&self, op: &str, fd: Fd) -> VfsResult<FileDescriptor> {
        self.fds
            .get(&fd)
            .copied()
            .ok_or_else(|| VfsError::bad_descriptor(op, fd))
    }
}
