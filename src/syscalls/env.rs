/*!
 * Environment Imports
 * argv, environ, clocks, randomness and process exit
 */

use rand::RngCore;

use super::host::GuestHost;
use super::memory::{GuestMemory, GuestMemoryExt};
use super::types::{SyscallResult, Trap};
use crate::core::clock::{monotonic_ns, realtime_ns};
use crate::core::errors::Errno;

/// Clock ids accepted by `clock_time_get`
pub const CLOCK_REALTIME: u32 = 0;
pub const CLOCK_MONOTONIC: u32 = 1;

/// Total size of a NUL-terminated string list
fn list_size(items: &[String]) -> usize {
    items.iter().map(|item| item.len() + 1).sum()
}

/// Write a NUL-terminated string list: pointers at `ptrs`, bytes at `buf`
fn write_list(
    mem: &mut dyn GuestMemory,
    items: &[String],
    ptrs: u32,
    buf: u32,
) -> Result<(), Errno> {
    let mut cursor = buf;
    for (i, item) in items.iter().enumerate() {
        let slot = ptrs
            .checked_add(i as u32 * 4)
            .ok_or(Errno::Inval)?;
        mem.write_u32(slot, cursor)?;
        mem.write_bytes(cursor, item.as_bytes())?;
        let nul = cursor.checked_add(item.len() as u32).ok_or(Errno::Inval)?;
        mem.write_bytes(nul, &[0])?;
        cursor = nul + 1;
    }
    Ok(())
}

impl GuestHost {
    pub fn args_sizes_get(
        &mut self,
        mem: &mut dyn GuestMemory,
        argc_out: u32,
        buf_size_out: u32,
    ) -> SyscallResult {
        self.run(|host| {
            mem.write_u32(argc_out, host.args.len() as u32)?;
            mem.write_u32(buf_size_out, list_size(&host.args) as u32)
        })
    }

    pub fn args_get(&mut self, mem: &mut dyn GuestMemory, argv: u32, argv_buf: u32) -> SyscallResult {
        self.run(|host| write_list(mem, &host.args, argv, argv_buf))
    }

    pub fn environ_sizes_get(
        &mut self,
        mem: &mut dyn GuestMemory,
        count_out: u32,
        buf_size_out: u32,
    ) -> SyscallResult {
        self.run(|host| {
            mem.write_u32(count_out, host.env.len() as u32)?;
            mem.write_u32(buf_size_out, list_size(&host.env) as u32)
        })
    }

    pub fn environ_get(&mut self, mem: &mut dyn GuestMemory, environ: u32, environ_buf: u32) -> SyscallResult {
        self.run(|host| write_list(mem, &host.env, environ, environ_buf))
    }

    /// Nanosecond timestamp of the given clock; precision is ignored
    pub fn clock_time_get(
        &mut self,
        mem: &mut dyn GuestMemory,
        clock_id: u32,
        _precision: u64,
        time_out: u32,
    ) -> SyscallResult {
        self.run(|_| {
            let now = match clock_id {
                CLOCK_REALTIME => realtime_ns(),
                CLOCK_MONOTONIC => monotonic_ns(),
                _ => return Err(Errno::Inval),
            };
            mem.write_u64(time_out, now)
        })
    }

    pub fn random_get(&mut self, mem: &mut dyn GuestMemory, buf: u32, len: u32) -> SyscallResult {
        self.run(|_| {
            let target = mem.slice_mut(buf, len)?;
            rand::thread_rng().fill_bytes(target);
            Ok(())
        })
    }

    /// Stop the guest with `code`; always returns `Err(Trap::Exit)`
    pub fn proc_exit(&mut self, code: i32) -> SyscallResult {
        self.check_killed()?;
        Err(Trap::Exit(code))
    }
}
