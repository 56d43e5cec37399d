/*!
 * Filesystem Imports
 * Descriptor and path operations translated onto the VFS
 */

use tracing::trace;

use super::host::GuestHost;
use super::memory::{GuestMemory, GuestMemoryExt};
use super::types::SyscallResult;
use crate::core::errors::Errno;
use crate::core::types::{Fd, STDERR_FD, STDIN_FD, STDOUT_FD};
use crate::vfs::{OpenFlags, Whence};

impl GuestHost {
    /// Open a path with POSIX `O_*` flags; the new fd is written to `fd_out`
    pub fn path_open(
        &mut self,
        mem: &mut dyn GuestMemory,
        path_ptr: u32,
        path_len: u32,
        oflags: u32,
        fd_out: u32,
    ) -> SyscallResult {
        self.run(|host| {
            let path = host.resolve(mem.read_str(path_ptr, path_len)?);
            let fd = host.fs.lock().open(&path, OpenFlags::from_posix(oflags))?;
            trace!(fd, path, "path_open");
            mem.write_u32(fd_out, fd)
        })
    }

    /// Scatter-read into an iovec array; total bytes go to `nread_out`
    pub fn fd_read(
        &mut self,
        mem: &mut dyn GuestMemory,
        fd: Fd,
        iovs: u32,
        iovs_len: u32,
        nread_out: u32,
    ) -> SyscallResult {
        self.run(|host| {
            let iovecs = mem.read_iovecs(iovs, iovs_len)?;
            let mut total: u32 = 0;
            for (ptr, len) in iovecs {
                let n = match fd {
                    STDIN_FD => {
                        let chunk = host.stdin.read(len as usize);
                        mem.write_bytes(ptr, &chunk)?;
                        chunk.len()
                    }
                    STDOUT_FD | STDERR_FD => return Err(Errno::Badf),
                    _ => {
                        let target = mem.slice_mut(ptr, len)?;
                        host.fs.lock().fd_read(fd, target)?
                    }
                };
                total += n as u32;
                if n < len as usize {
                    break;
                }
            }
            mem.write_u32(nread_out, total)
        })
    }

    /// Gather-write from an iovec array; total bytes go to `nwritten_out`
    ///
    /// fd 1 and 2 go to the output sinks and never touch the VFS.
    pub fn fd_write(
        &mut self,
        mem: &mut dyn GuestMemory,
        fd: Fd,
        iovs: u32,
        iovs_len: u32,
        nwritten_out: u32,
    ) -> SyscallResult {
        self.run(|host| {
            let iovecs = mem.read_iovecs(iovs, iovs_len)?;
            let mut total: u32 = 0;
            for (ptr, len) in iovecs {
                let data = mem.slice(ptr, len)?;
                match fd {
                    STDOUT_FD => (host.stdout)(data),
                    STDERR_FD => (host.stderr)(data),
                    STDIN_FD => return Err(Errno::Badf),
                    _ => {
                        host.fs.lock().fd_write(fd, data)?;
                    }
                }
                total += len;
            }
            mem.write_u32(nwritten_out, total)
        })
    }

    /// Reposition a descriptor; the new offset goes to `offset_out`
    pub fn fd_seek(
        &mut self,
        mem: &mut dyn GuestMemory,
        fd: Fd,
        offset: i64,
        whence: u8,
        offset_out: u32,
    ) -> SyscallResult {
        self.run(|host| {
            if fd <= STDERR_FD {
                return Err(Errno::Inval);
            }
            let whence = Whence::from_raw(whence).ok_or(Errno::Inval)?;
            let position = host.fs.lock().fd_seek(fd, offset, whence)?;
            mem.write_u64(offset_out, position)
        })
    }

    /// Close a descriptor; the standard streams are left alone
    pub fn fd_close(&mut self, fd: Fd) -> SyscallResult {
        self.run(|host| {
            if fd <= STDERR_FD {
                return Ok(());
            }
            host.fs.lock().close(fd)?;
            Ok(())
        })
    }

    pub fn path_create_directory(
        &mut self,
        mem: &mut dyn GuestMemory,
        path_ptr: u32,
        path_len: u32,
    ) -> SyscallResult {
        self.run(|host| {
            let path = host.resolve(mem.read_str(path_ptr, path_len)?);
            host.fs.lock().mkdir(&path)?;
            Ok(())
        })
    }

    pub fn path_unlink_file(
        &mut self,
        mem: &mut dyn GuestMemory,
        path_ptr: u32,
        path_len: u32,
    ) -> SyscallResult {
        self.run(|host| {
            let path = host.resolve(mem.read_str(path_ptr, path_len)?);
            host.fs.lock().unlink(&path)?;
            Ok(())
        })
    }
}
