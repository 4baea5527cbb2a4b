//! Append-only arena over one process's view of a shared region.
//!
//! Everything written here is addressed by offset. Pointer-valued fields hold
//! `base + offset` while absolute and plain `offset` while relative; the
//! header (see [`crate::header`]) tracks which fields are pointers so both
//! conversions can be applied in bulk.

use crate::header::{PointerForm, FIXUP_ENTRY_SIZE};
use crate::IpcError;
use std::collections::HashSet;

/// Every allocation starts on this boundary.
pub const MEMBER_ALIGNMENT: usize = 8;

pub(crate) const fn align_up(value: usize) -> usize {
    (value + MEMBER_ALIGNMENT - 1) & !(MEMBER_ALIGNMENT - 1)
}

pub struct IpcBuffer<'a> {
    bytes: &'a mut [u8],
    base: u64,
    cursor: usize,
    /// Pointer fields already in the relocation list.
    registered: HashSet<usize>,
}

impl<'a> IpcBuffer<'a> {
    /// Wrap a mapping with an empty arena.
    pub fn new(bytes: &'a mut [u8]) -> Self {
        let base = bytes.as_ptr() as u64;
        Self {
            bytes,
            base,
            cursor: 0,
            registered: HashSet::new(),
        }
    }

    /// Address of offset 0 in this process.
    pub fn base(&self) -> u64 {
        self.base
    }

    pub fn capacity(&self) -> usize {
        self.bytes.len()
    }

    /// Bytes handed out so far.
    pub fn used(&self) -> usize {
        self.cursor
    }

    pub(crate) fn set_cursor(&mut self, cursor: usize) -> Result<(), IpcError> {
        if cursor > self.bytes.len() {
            return Err(IpcError::OffsetOutOfBounds {
                offset: cursor,
                len: 0,
            });
        }
        self.cursor = cursor;
        Ok(())
    }

    pub(crate) fn reset_fixups(&mut self) {
        self.registered.clear();
    }

    pub(crate) fn adopt_fixups(&mut self, slots: Vec<usize>) {
        self.registered = slots.into_iter().collect();
    }

    pub(crate) fn track_fixup(&mut self, slot: usize) {
        self.registered.insert(slot);
    }

    pub(crate) fn is_registered(&self, slot: usize) -> bool {
        self.registered.contains(&slot)
    }

    /// First byte taken by the relocation list at the end of the region.
    fn arena_limit(&self) -> usize {
        self.bytes
            .len()
            .saturating_sub(FIXUP_ENTRY_SIZE * self.registered.len())
    }

    /// Reserve `size` zero-filled bytes and return their offset.
    pub fn allocate(&mut self, size: usize) -> Result<usize, IpcError> {
        let start = align_up(self.cursor);
        let limit = self.arena_limit();
        let end = start
            .checked_add(size)
            .filter(|end| *end <= limit)
            .ok_or(IpcError::OutOfSpace {
                requested: size,
                available: limit.saturating_sub(start),
            })?;
        self.bytes[start..end].fill(0);
        self.cursor = end;
        Ok(start)
    }

    fn range(&self, offset: usize, len: usize) -> Result<std::ops::Range<usize>, IpcError> {
        offset
            .checked_add(len)
            .filter(|end| *end <= self.bytes.len())
            .map(|end| offset..end)
            .ok_or(IpcError::OffsetOutOfBounds { offset, len })
    }

    pub fn read_bytes(&self, offset: usize, len: usize) -> Result<&[u8], IpcError> {
        let range = self.range(offset, len)?;
        Ok(&self.bytes[range])
    }

    pub fn write_bytes(&mut self, offset: usize, data: &[u8]) -> Result<(), IpcError> {
        let range = self.range(offset, data.len())?;
        self.bytes[range].copy_from_slice(data);
        Ok(())
    }

    fn read_array<const N: usize>(&self, offset: usize) -> Result<[u8; N], IpcError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(offset, N)?);
        Ok(out)
    }

    pub fn read_u32(&self, offset: usize) -> Result<u32, IpcError> {
        Ok(u32::from_le_bytes(self.read_array(offset)?))
    }

    pub fn write_u32(&mut self, offset: usize, value: u32) -> Result<(), IpcError> {
        self.write_bytes(offset, &value.to_le_bytes())
    }

    pub fn read_i32(&self, offset: usize) -> Result<i32, IpcError> {
        Ok(i32::from_le_bytes(self.read_array(offset)?))
    }

    pub fn write_i32(&mut self, offset: usize, value: i32) -> Result<(), IpcError> {
        self.write_bytes(offset, &value.to_le_bytes())
    }

    pub fn read_u64(&self, offset: usize) -> Result<u64, IpcError> {
        Ok(u64::from_le_bytes(self.read_array(offset)?))
    }

    pub fn write_u64(&mut self, offset: usize, value: u64) -> Result<(), IpcError> {
        self.write_bytes(offset, &value.to_le_bytes())
    }

    pub fn read_i64(&self, offset: usize) -> Result<i64, IpcError> {
        Ok(i64::from_le_bytes(self.read_array(offset)?))
    }

    pub fn write_i64(&mut self, offset: usize, value: i64) -> Result<(), IpcError> {
        self.write_bytes(offset, &value.to_le_bytes())
    }

    pub fn read_f32(&self, offset: usize) -> Result<f32, IpcError> {
        Ok(f32::from_le_bytes(self.read_array(offset)?))
    }

    pub fn write_f32(&mut self, offset: usize, value: f32) -> Result<(), IpcError> {
        self.write_bytes(offset, &value.to_le_bytes())
    }

    /// Read a NUL-terminated string starting at `offset`.
    pub fn read_cstr(&self, offset: usize) -> Result<String, IpcError> {
        let tail = self.read_bytes(offset, self.bytes.len().saturating_sub(offset))?;
        let len = tail
            .iter()
            .position(|b| *b == 0)
            .ok_or(IpcError::OffsetOutOfBounds {
                offset,
                len: tail.len(),
            })?;
        Ok(String::from_utf8_lossy(&tail[..len]).into_owned())
    }

    /// Copy `s` plus a terminating NUL into fresh arena space.
    pub fn allocate_cstr(&mut self, s: &str) -> Result<usize, IpcError> {
        let offset = self.allocate(s.len() + 1)?;
        self.write_bytes(offset, s.as_bytes())?;
        Ok(offset)
    }

    /// Store a pointer to `target` (or null) in the field at `slot` and
    /// register the field for relocation.
    pub fn write_pointer(&mut self, slot: usize, target: Option<usize>) -> Result<(), IpcError> {
        self.expect_form(PointerForm::Absolute)?;
        match target {
            Some(target) => {
                self.range(target, 0)?;
                self.write_u64(slot, self.base + target as u64)?;
                self.register_pointer(slot)
            }
            None => self.write_u64(slot, 0),
        }
    }

    /// Resolve the pointer field at `slot` to an arena offset.
    pub fn read_pointer(&self, slot: usize) -> Result<Option<usize>, IpcError> {
        self.expect_form(PointerForm::Absolute)?;
        let address = self.read_u64(slot)?;
        if address == 0 {
            return Ok(None);
        }
        self.offset_of(address).map(Some)
    }

    /// Translate an absolute address in this process to an arena offset.
    pub fn offset_of(&self, address: u64) -> Result<usize, IpcError> {
        address
            .checked_sub(self.base)
            .map(|off| off as usize)
            .filter(|off| *off < self.bytes.len())
            .ok_or(IpcError::PointerOutOfBounds { address })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_aligns_and_zero_fills() {
        let mut backing = vec![0xAAu8; 64];
        let mut buf = IpcBuffer::new(&mut backing);

        let a = buf.allocate(3).unwrap();
        let b = buf.allocate(8).unwrap();
        assert_eq!(a, 0);
        assert_eq!(b, 8);
        assert_eq!(buf.read_bytes(a, 3).unwrap(), &[0, 0, 0]);
        assert_eq!(buf.used(), 16);
    }

    #[test]
    fn test_allocate_out_of_space() {
        let mut backing = vec![0u8; 32];
        let mut buf = IpcBuffer::new(&mut backing);
        buf.allocate(24).unwrap();
        let err = buf.allocate(16).unwrap_err();
        assert!(matches!(
            err,
            IpcError::OutOfSpace {
                requested: 16,
                available: 8
            }
        ));
    }

    #[test]
    fn test_scalar_access_is_bounds_checked() {
        let mut backing = vec![0u8; 16];
        let mut buf = IpcBuffer::new(&mut backing);
        buf.write_u64(8, 0xdead_beef).unwrap();
        assert_eq!(buf.read_u64(8).unwrap(), 0xdead_beef);
        assert!(buf.write_u64(12, 1).is_err());
        assert!(buf.read_u32(usize::MAX).is_err());
    }

    #[test]
    fn test_cstr_roundtrip() {
        let mut backing = vec![0u8; 64];
        let mut buf = IpcBuffer::new(&mut backing);
        let at = buf.allocate_cstr("/user/hand/left").unwrap();
        assert_eq!(buf.read_cstr(at).unwrap(), "/user/hand/left");
    }

    #[test]
    fn test_offset_of_rejects_foreign_addresses() {
        let mut backing = vec![0u8; 64];
        let buf = IpcBuffer::new(&mut backing);
        assert_eq!(buf.offset_of(buf.base() + 10).unwrap(), 10);
        assert!(buf.offset_of(buf.base() + 64).is_err());
        assert!(buf.offset_of(buf.base().wrapping_sub(8)).is_err());
    }
}
