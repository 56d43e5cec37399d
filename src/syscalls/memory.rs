/*!
 * Guest Memory
 * Bounds-checked access to a guest's linear memory
 */

use crate::core::errors::Errno;

/// A guest's linear memory as seen by the import layer
pub trait GuestMemory {
    fn bytes(&self) -> &[u8];
    fn bytes_mut(&mut self) -> &mut [u8];
}

/// Typed reads and writes at guest offsets
///
/// Every access is bounds-checked; anything out of range is `EINVAL`.
/// Integers are little-endian.
pub trait GuestMemoryExt: GuestMemory {
    fn slice(&self, ptr: u32, len: u32) -> Result<&[u8], Errno> {
        let start = ptr as usize;
        let end = start.checked_add(len as usize).ok_or(Errno::Inval)?;
        self.bytes().get(start..end).ok_or(Errno::Inval)
    }

    fn slice_mut(&mut self, ptr: u32, len: u32) -> Result<&mut [u8], Errno> {
        let start = ptr as usize;
        let end = start.checked_add(len as usize).ok_or(Errno::Inval)?;
        self.bytes_mut().get_mut(start..end).ok_or(Errno::Inval)
    }

    fn read_u32(&self, ptr: u32) -> Result<u32, Errno> {
        let raw = self.slice(ptr, 4)?;
        Ok(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
    }

    fn write_u32(&mut self, ptr: u32, value: u32) -> Result<(), Errno> {
        self.slice_mut(ptr, 4)?.copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    fn read_u64(&self, ptr: u32) -> Result<u64, Errno> {
        let raw = self.slice(ptr, 8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(raw);
        Ok(u64::from_le_bytes(buf))
    }

    fn write_u64(&mut self, ptr: u32, value: u64) -> Result<(), Errno> {
        self.slice_mut(ptr, 8)?.copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    /// UTF-8 string at (ptr, len)
    fn read_str(&self, ptr: u32, len: u32) -> Result<&str, Errno> {
        std::str::from_utf8(self.slice(ptr, len)?).map_err(|_| Errno::Inval)
    }

    fn write_bytes(&mut self, ptr: u32, data: &[u8]) -> Result<(), Errno> {
        let len = u32::try_from(data.len()).map_err(|_| Errno::Inval)?;
        self.slice_mut(ptr, len)?.copy_from_slice(data);
        Ok(())
    }

    /// (ptr, len) pairs of an iovec array
    fn read_iovecs(&self, iovs: u32, count: u32) -> Result<Vec<(u32, u32)>, Errno> {
        (0..count)
            .map(|i| {
                let base = iovs.checked_add(i.checked_mul(8).ok_or(Errno::Inval)?).ok_or(Errno::Inval)?;
                let len_at = base.checked_add(4).ok_or(Errno::Inval)?;
                Ok((self.read_u32(base)?, self.read_u32(len_at)?))
            })
            .collect()
    }
}

impl<T: GuestMemory + ?Sized> GuestMemoryExt for T {}

/// Plain growable linear memory
#[derive(Debug, Clone, Default)]
pub struct LinearMemory {
    data: Vec<u8>,
}

impl LinearMemory {
    pub fn new(size: usize) -> Self {
        Self {
            data: vec![0u8; size],
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Grow to at least `size` bytes, zero-filled
    pub fn grow(&mut self, size: usize) {
        if size > self.data.len() {
            self.data.resize(size, 0);
        }
    }
}

impl GuestMemory for LinearMemory {
    fn bytes(&self) -> &[u8] {
        &self.data
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}
