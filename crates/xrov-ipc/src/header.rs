//! Request header at offset 0 of every shared region.
//!
//! Layout (little-endian):
//! ```text
//! offset  field             size
//! ------  ----------------  ----
//!  0      request_type      8
//!  8      result            4    (API result code written by the server)
//! 12      fixup_count       4
//! 16      pointer_form      4    (0 = absolute, 1 = relative)
//! 20      arena_used        4    (bytes allocated by the requester)
//! ```
//! The `Args` record of the request follows at [`ARGS_OFFSET`].
//!
//! The relocation list (offsets of pointer fields, 8 bytes each) grows
//! down from the end of the region: entry `i` sits at
//! `capacity - 8 * (i + 1)`. Arena and list share the free space, so the
//! number of pointers a request may carry is bounded only by the region.

use crate::buffer::{align_up, IpcBuffer};
use crate::IpcError;

const REQUEST_TYPE: usize = 0;
const RESULT: usize = 8;
const FIXUP_COUNT: usize = 12;
const POINTER_FORM: usize = 16;
const ARENA_USED: usize = 20;

pub const HEADER_SIZE: usize = 24;

/// Bytes one relocation entry takes from the end of the region.
pub const FIXUP_ENTRY_SIZE: usize = 8;

/// Where the first allocation after the header lands.
pub const ARGS_OFFSET: usize = align_up(HEADER_SIZE);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum PointerForm {
    /// Pointer fields hold addresses valid in the current process.
    Absolute = 0,
    /// Pointer fields hold offsets from the start of the region.
    Relative = 1,
}

impl IpcBuffer<'_> {
    /// Reset the arena and write a fresh header tagged with `request_type`.
    pub fn begin_request(&mut self, request_type: u64) -> Result<(), IpcError> {
        self.set_cursor(0)?;
        if self.capacity() < HEADER_SIZE {
            return Err(IpcError::RegionTooSmall(self.capacity()));
        }
        let at = self.allocate(HEADER_SIZE)?;
        debug_assert_eq!(at, 0);
        self.write_u64(REQUEST_TYPE, request_type)?;
        self.reset_fixups();
        self.write_u32(POINTER_FORM, PointerForm::Absolute as u32)
    }

    /// Record how much of the arena the request occupies.
    pub fn seal_request(&mut self) -> Result<(), IpcError> {
        let used = self.used() as u32;
        self.write_u32(ARENA_USED, used)
    }

    /// Continue allocating after the requester's data (serving side).
    pub fn resume_request(&mut self) -> Result<(), IpcError> {
        let used = (self.read_u32(ARENA_USED)? as usize).max(HEADER_SIZE);
        self.set_cursor(used)?;
        let fixups = self.fixups()?;
        self.adopt_fixups(fixups);
        Ok(())
    }

    pub fn request_type(&self) -> Result<u64, IpcError> {
        self.read_u64(REQUEST_TYPE)
    }

    pub fn result(&self) -> Result<i32, IpcError> {
        self.read_i32(RESULT)
    }

    pub fn set_result(&mut self, result: i32) -> Result<(), IpcError> {
        self.write_i32(RESULT, result)
    }

    pub fn fixup_count(&self) -> Result<usize, IpcError> {
        Ok(self.read_u32(FIXUP_COUNT)? as usize)
    }

    pub fn pointer_form(&self) -> Result<PointerForm, IpcError> {
        match self.read_u32(POINTER_FORM)? {
            0 => Ok(PointerForm::Absolute),
            _ => Ok(PointerForm::Relative),
        }
    }

    pub(crate) fn expect_form(&self, form: PointerForm) -> Result<(), IpcError> {
        let current = self.pointer_form()?;
        if current == form {
            Ok(())
        } else {
            Err(IpcError::RelocationState(current))
        }
    }

    fn fixup_entry(&self, index: usize) -> usize {
        self.capacity() - FIXUP_ENTRY_SIZE * (index + 1)
    }

    fn fixups(&self) -> Result<Vec<usize>, IpcError> {
        let count = self.fixup_count()?;
        if count > (self.capacity() - HEADER_SIZE) / FIXUP_ENTRY_SIZE {
            return Err(IpcError::TooManyPointers(count));
        }
        (0..count)
            .map(|i| self.read_u64(self.fixup_entry(i)).map(|slot| slot as usize))
            .collect()
    }

    /// Add the pointer field at `slot` to the relocation list. Registering a
    /// slot twice is a no-op.
    pub fn register_pointer(&mut self, slot: usize) -> Result<(), IpcError> {
        if self.is_registered(slot) {
            return Ok(());
        }
        let count = self.fixup_count()?;
        let entry = self
            .capacity()
            .checked_sub(FIXUP_ENTRY_SIZE * (count + 1))
            .filter(|entry| *entry >= align_up(self.used()))
            .ok_or(IpcError::TooManyPointers(count))?;
        self.write_u64(entry, slot as u64)?;
        self.write_u32(FIXUP_COUNT, count as u32 + 1)?;
        self.track_fixup(slot);
        Ok(())
    }

    /// Convert every registered pointer to a region offset. Null stays null.
    pub fn make_pointers_relative(&mut self) -> Result<(), IpcError> {
        self.expect_form(PointerForm::Absolute)?;
        for slot in self.fixups()? {
            let address = self.read_u64(slot)?;
            if address != 0 {
                let offset = self.offset_of(address)?;
                self.write_u64(slot, offset as u64)?;
            }
        }
        self.write_u32(POINTER_FORM, PointerForm::Relative as u32)
    }

    /// Convert every registered offset back into an address in this process.
    pub fn make_pointers_absolute(&mut self) -> Result<(), IpcError> {
        self.expect_form(PointerForm::Relative)?;
        for slot in self.fixups()? {
            let offset = self.read_u64(slot)?;
            if offset != 0 {
                if offset as usize >= self.capacity() {
                    return Err(IpcError::OffsetOutOfBounds {
                        offset: offset as usize,
                        len: 0,
                    });
                }
                let address = self.base() + offset;
                self.write_u64(slot, address)?;
            }
        }
        self.write_u32(POINTER_FORM, PointerForm::Absolute as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(backing: &mut [u8]) -> IpcBuffer<'_> {
        let mut buf = IpcBuffer::new(backing);
        buf.begin_request(7).unwrap();
        buf
    }

    #[test]
    fn test_header_fields() {
        let mut backing = vec![0u8; 4096];
        let mut buf = request(&mut backing);
        assert_eq!(buf.request_type().unwrap(), 7);
        assert_eq!(buf.used(), HEADER_SIZE);
        buf.set_result(-12).unwrap();
        assert_eq!(buf.result().unwrap(), -12);
        assert_eq!(buf.pointer_form().unwrap(), PointerForm::Absolute);
    }

    #[test]
    fn test_relative_then_absolute_restores_pointers() {
        let mut backing = vec![0u8; 4096];
        let mut buf = request(&mut backing);
        let slot = buf.allocate(16).unwrap();
        let target = buf.allocate(8).unwrap();
        buf.write_pointer(slot, Some(target)).unwrap();
        buf.write_pointer(slot + 8, None).unwrap();

        buf.make_pointers_relative().unwrap();
        assert_eq!(buf.read_u64(slot).unwrap(), target as u64);
        assert_eq!(buf.read_u64(slot + 8).unwrap(), 0, "null stays null");

        buf.make_pointers_absolute().unwrap();
        assert_eq!(buf.read_pointer(slot).unwrap(), Some(target));
        assert_eq!(buf.read_pointer(slot + 8).unwrap(), None);
    }

    #[test]
    fn test_conversion_happens_once_per_direction() {
        let mut backing = vec![0u8; 4096];
        let mut buf = request(&mut backing);
        assert!(buf.make_pointers_absolute().is_err());
        buf.make_pointers_relative().unwrap();
        assert!(matches!(
            buf.make_pointers_relative(),
            Err(IpcError::RelocationState(PointerForm::Relative))
        ));
        assert!(buf.read_pointer(HEADER_SIZE).is_err(), "no dereference while relative");
    }

    #[test]
    fn test_register_is_deduplicated() {
        let mut backing = vec![0u8; 4096];
        let mut buf = request(&mut backing);
        let slot = buf.allocate(8).unwrap();
        buf.register_pointer(slot).unwrap();
        buf.register_pointer(slot).unwrap();
        assert_eq!(buf.fixup_count().unwrap(), 1);
    }

    #[test]
    fn test_relocation_list_is_bounded_by_free_space() {
        let mut backing = vec![0u8; 64 * 1024];
        let mut buf = request(&mut backing);
        let pointers = 1000;
        let slots = buf.allocate(8 * pointers).unwrap();
        let target = buf.allocate(8).unwrap();
        for i in 0..pointers {
            buf.write_pointer(slots + 8 * i, Some(target)).unwrap();
        }
        assert_eq!(buf.fixup_count().unwrap(), pointers);

        buf.make_pointers_relative().unwrap();
        assert_eq!(buf.read_u64(slots + 8 * (pointers - 1)).unwrap(), target as u64);
        buf.make_pointers_absolute().unwrap();
        assert_eq!(buf.read_pointer(slots).unwrap(), Some(target));
    }

    #[test]
    fn test_arena_and_relocation_list_do_not_overlap() {
        let mut backing = vec![0u8; 256];
        let mut buf = request(&mut backing);
        let slot = buf.allocate(8).unwrap();
        buf.register_pointer(slot).unwrap();
        let room = 256 - FIXUP_ENTRY_SIZE - buf.used();
        assert!(buf.allocate(room + 1).is_err());
        buf.allocate(room).unwrap();
        let next = buf.used() - 8;
        assert!(matches!(buf.register_pointer(next), Err(IpcError::TooManyPointers(1))));
    }

    #[test]
    fn test_resume_continues_after_requester_data() {
        let mut backing = vec![0u8; 4096];
        {
            let mut buf = request(&mut backing);
            buf.allocate(100).unwrap();
            buf.seal_request().unwrap();
        }
        let mut buf = IpcBuffer::new(&mut backing);
        buf.resume_request().unwrap();
        assert_eq!(buf.used(), HEADER_SIZE + 100);
        assert!(buf.allocate(8).unwrap() >= HEADER_SIZE + 100);
    }

    #[test]
    fn test_resume_keeps_requester_pointers_registered() {
        let mut backing = vec![0u8; 4096];
        let slot = {
            let mut buf = request(&mut backing);
            let slot = buf.allocate(8).unwrap();
            let target = buf.allocate(8).unwrap();
            buf.write_pointer(slot, Some(target)).unwrap();
            buf.seal_request().unwrap();
            slot
        };
        let mut buf = IpcBuffer::new(&mut backing);
        buf.resume_request().unwrap();
        buf.register_pointer(slot).unwrap();
        assert_eq!(buf.fixup_count().unwrap(), 1);
    }
}
