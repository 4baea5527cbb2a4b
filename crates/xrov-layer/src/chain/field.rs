//! Per-field copy, wire and handle-walk rules.
//!
//! Every value that can appear inside a record implements [`Field`]. The
//! wire form of a field is fixed-size ([`Field::WIRE_SIZE`]); anything
//! variable-length (strings, arrays, chains) is written out of line and
//! referenced through a registered pointer slot.

use super::{
    copy_chain, decode_chain, encode_chain, first_known, visit_chain, Chain, CopyPolicy,
    NEXT_OFFSET,
};
use crate::error::Result;
use crate::types::{
    ActionHandle, ActionSetHandle, ActionType, DebugUtilsMessengerHandle, EnvironmentBlendMode,
    FixedStr, FormFactor, InstanceHandle, ObjectType, Path, ReferenceSpaceType, SessionHandle,
    SessionState, SpaceHandle, StructureType, SwapchainHandle, SystemId, ViewConfigurationType,
};
use xrov_ipc::IpcBuffer;

/// A handle field that substitution may rewrite.
pub enum HandleSlot<'a> {
    Session(&'a mut SessionHandle),
    Swapchain(&'a mut SwapchainHandle),
    Space(&'a mut SpaceHandle),
}

pub trait HandleVisitor {
    fn visit(&mut self, slot: HandleSlot<'_>) -> Result<()>;
}

pub trait Field: Clone + Default {
    /// Bytes this field occupies inline in its enclosing record.
    const WIRE_SIZE: usize;

    /// Write the field at `at`. Under [`CopyPolicy::TypeAndNext`] only
    /// structure types and links are written; the rest stays zero-filled.
    fn encode(&self, buf: &mut IpcBuffer<'_>, at: usize, policy: CopyPolicy) -> Result<()>;

    fn decode(buf: &IpcBuffer<'_>, at: usize) -> Result<Self>;

    fn deep_copy(&self) -> Result<Self> {
        Ok(self.clone())
    }

    fn visit_handles(&mut self, _visitor: &mut dyn HandleVisitor) -> Result<()> {
        Ok(())
    }

    /// Serving side: store a produced output into the space the requester
    /// reserved at `at`.
    fn write_back(&self, buf: &mut IpcBuffer<'_>, at: usize) -> Result<()> {
        self.encode(buf, at, CopyPolicy::Everything)
    }

    /// Requesting side: fetch an output the server wrote at `at`.
    fn copy_out(&mut self, buf: &IpcBuffer<'_>, at: usize) -> Result<()> {
        *self = Self::decode(buf, at)?;
        Ok(())
    }
}

macro_rules! int_field {
    ($($ty:ty => $write:ident, $read:ident as $wire:ty;)*) => {
        $(
            impl Field for $ty {
                const WIRE_SIZE: usize = 8;

                fn encode(&self, buf: &mut IpcBuffer<'_>, at: usize, policy: CopyPolicy) -> Result<()> {
                    if policy == CopyPolicy::Everything {
                        buf.$write(at, *self as $wire)?;
                    }
                    Ok(())
                }

                fn decode(buf: &IpcBuffer<'_>, at: usize) -> Result<Self> {
                    Ok(buf.$read(at)? as $ty)
                }
            }
        )*
    };
}

int_field! {
    u32 => write_u64, read_u64 as u64;
    u64 => write_u64, read_u64 as u64;
    i32 => write_i64, read_i64 as i64;
    i64 => write_i64, read_i64 as i64;
}

impl Field for f32 {
    const WIRE_SIZE: usize = 8;

    fn encode(&self, buf: &mut IpcBuffer<'_>, at: usize, policy: CopyPolicy) -> Result<()> {
        if policy == CopyPolicy::Everything {
            buf.write_f32(at, *self)?;
        }
        Ok(())
    }

    fn decode(buf: &IpcBuffer<'_>, at: usize) -> Result<Self> {
        Ok(buf.read_f32(at)?)
    }
}

impl Field for bool {
    const WIRE_SIZE: usize = 8;

    fn encode(&self, buf: &mut IpcBuffer<'_>, at: usize, policy: CopyPolicy) -> Result<()> {
        if policy == CopyPolicy::Everything {
            buf.write_u64(at, u64::from(*self))?;
        }
        Ok(())
    }

    fn decode(buf: &IpcBuffer<'_>, at: usize) -> Result<Self> {
        Ok(buf.read_u64(at)? != 0)
    }
}

macro_rules! newtype_field {
    ($($ty:ident($inner:ty)),* $(,)?) => {
        $(
            impl Field for $ty {
                const WIRE_SIZE: usize = 8;

                fn encode(&self, buf: &mut IpcBuffer<'_>, at: usize, policy: CopyPolicy) -> Result<()> {
                    self.0.encode(buf, at, policy)
                }

                fn decode(buf: &IpcBuffer<'_>, at: usize) -> Result<Self> {
                    Ok($ty(<$inner>::decode(buf, at)?))
                }
            }
        )*
    };
}

newtype_field!(
    StructureType(i32),
    FormFactor(i32),
    ViewConfigurationType(i32),
    ReferenceSpaceType(i32),
    SessionState(i32),
    EnvironmentBlendMode(i32),
    ActionType(i32),
    ObjectType(i32),
    Path(u64),
    SystemId(u64),
    InstanceHandle(u64),
    ActionSetHandle(u64),
    ActionHandle(u64),
    DebugUtilsMessengerHandle(u64),
);

macro_rules! virtual_handle_field {
    ($($ty:ident => $slot:ident),* $(,)?) => {
        $(
            impl Field for $ty {
                const WIRE_SIZE: usize = 8;

                fn encode(&self, buf: &mut IpcBuffer<'_>, at: usize, policy: CopyPolicy) -> Result<()> {
                    self.0.encode(buf, at, policy)
                }

                fn decode(buf: &IpcBuffer<'_>, at: usize) -> Result<Self> {
                    Ok($ty(u64::decode(buf, at)?))
                }

                fn visit_handles(&mut self, visitor: &mut dyn HandleVisitor) -> Result<()> {
                    if self.is_null() {
                        return Ok(());
                    }
                    visitor.visit(HandleSlot::$slot(self))
                }
            }
        )*
    };
}

virtual_handle_field!(
    SessionHandle => Session,
    SwapchainHandle => Swapchain,
    SpaceHandle => Space,
);

/// Inline character array, padded to the slot size.
impl<const N: usize> Field for FixedStr<N> {
    const WIRE_SIZE: usize = (N + 7) & !7;

    fn encode(&self, buf: &mut IpcBuffer<'_>, at: usize, policy: CopyPolicy) -> Result<()> {
        if policy == CopyPolicy::Everything {
            buf.write_bytes(at, &self.0)?;
        }
        Ok(())
    }

    fn decode(buf: &IpcBuffer<'_>, at: usize) -> Result<Self> {
        let mut bytes = [0u8; N];
        bytes.copy_from_slice(buf.read_bytes(at, N)?);
        Ok(FixedStr(bytes))
    }
}

/// NUL-terminated string behind a pointer. Empty strings travel as null.
impl Field for String {
    const WIRE_SIZE: usize = 8;

    fn encode(&self, buf: &mut IpcBuffer<'_>, at: usize, policy: CopyPolicy) -> Result<()> {
        if policy == CopyPolicy::TypeAndNext || self.is_empty() {
            return Ok(buf.write_pointer(at, None)?);
        }
        let target = buf.allocate_cstr(self)?;
        Ok(buf.write_pointer(at, Some(target))?)
    }

    fn decode(buf: &IpcBuffer<'_>, at: usize) -> Result<Self> {
        match buf.read_pointer(at)? {
            Some(target) => Ok(buf.read_cstr(target)?),
            None => Ok(String::new()),
        }
    }

    fn deep_copy(&self) -> Result<Self> {
        let mut copy = String::new();
        copy.try_reserve_exact(self.len() + 1)?;
        copy.push_str(self);
        Ok(copy)
    }
}

/// Counted array: `count` slot followed by a pointer to the elements.
impl<T: Field> Field for Vec<T> {
    const WIRE_SIZE: usize = 16;

    fn encode(&self, buf: &mut IpcBuffer<'_>, at: usize, policy: CopyPolicy) -> Result<()> {
        buf.write_u64(at, self.len() as u64)?;
        if self.is_empty() {
            return Ok(buf.write_pointer(at + 8, None)?);
        }
        let elements = buf.allocate(self.len() * T::WIRE_SIZE)?;
        for (i, element) in self.iter().enumerate() {
            element.encode(buf, elements + i * T::WIRE_SIZE, policy)?;
        }
        Ok(buf.write_pointer(at + 8, Some(elements))?)
    }

    fn decode(buf: &IpcBuffer<'_>, at: usize) -> Result<Self> {
        let count = buf.read_u64(at)? as usize;
        let Some(elements) = buf.read_pointer(at + 8)? else {
            return Ok(Vec::new());
        };
        let mut out = Vec::new();
        out.try_reserve(count)?;
        for i in 0..count {
            out.push(T::decode(buf, elements + i * T::WIRE_SIZE)?);
        }
        Ok(out)
    }

    fn deep_copy(&self) -> Result<Self> {
        let mut out = Vec::new();
        out.try_reserve_exact(self.len())?;
        for element in self {
            out.push(element.deep_copy()?);
        }
        Ok(out)
    }

    fn visit_handles(&mut self, visitor: &mut dyn HandleVisitor) -> Result<()> {
        self.iter_mut()
            .try_for_each(|element| element.visit_handles(visitor))
    }

    /// Writes at most as many elements as the requester reserved and
    /// reports the written count in the count slot.
    fn write_back(&self, buf: &mut IpcBuffer<'_>, at: usize) -> Result<()> {
        let reserved = buf.read_u64(at)? as usize;
        let written = match buf.read_pointer(at + 8)? {
            Some(elements) => {
                let written = self.len().min(reserved);
                for (i, element) in self.iter().take(written).enumerate() {
                    element.write_back(buf, elements + i * T::WIRE_SIZE)?;
                }
                written
            }
            None => 0,
        };
        Ok(buf.write_u64(at, written as u64)?)
    }

    /// Copies back up to the count the server reported, then truncates.
    fn copy_out(&mut self, buf: &IpcBuffer<'_>, at: usize) -> Result<()> {
        let reported = buf.read_u64(at)? as usize;
        let Some(elements) = buf.read_pointer(at + 8)? else {
            self.clear();
            return Ok(());
        };
        let count = reported.min(self.len());
        for (i, element) in self.iter_mut().take(count).enumerate() {
            element.copy_out(buf, elements + i * T::WIRE_SIZE)?;
        }
        self.truncate(count);
        Ok(())
    }
}

/// Pointer to the head of a chain.
impl Field for Chain {
    const WIRE_SIZE: usize = 8;

    fn encode(&self, buf: &mut IpcBuffer<'_>, at: usize, policy: CopyPolicy) -> Result<()> {
        let target = encode_chain(buf, self.as_deref(), policy)?;
        Ok(buf.write_pointer(at, target)?)
    }

    fn decode(buf: &IpcBuffer<'_>, at: usize) -> Result<Self> {
        decode_chain(buf, buf.read_pointer(at)?)
    }

    fn deep_copy(&self) -> Result<Self> {
        copy_chain(self, CopyPolicy::Everything)
    }

    fn visit_handles(&mut self, visitor: &mut dyn HandleVisitor) -> Result<()> {
        visit_chain(self, visitor)
    }

    /// Fills the requester's record in place when the structure types
    /// agree; otherwise writes a fresh chain and repoints the slot.
    fn write_back(&self, buf: &mut IpcBuffer<'_>, at: usize) -> Result<()> {
        let Some(record) = first_known(self) else {
            return Ok(());
        };
        if let Some(existing) = buf.read_pointer(at)? {
            if StructureType(buf.read_i32(existing)?) == record.structure_type() {
                record.write_back_fields(buf, existing)?;
                return record.next().write_back(buf, existing + NEXT_OFFSET);
            }
        }
        let target = encode_chain(buf, Some(record), CopyPolicy::Everything)?;
        Ok(buf.write_pointer(at, target)?)
    }

    /// Copies field-by-field into matching records; a chain of a different
    /// shape replaces the caller's.
    fn copy_out(&mut self, buf: &IpcBuffer<'_>, at: usize) -> Result<()> {
        let Some(source) = buf.read_pointer(at)? else {
            return Ok(());
        };
        let ty = StructureType(buf.read_i32(source)?);
        match self {
            Some(record) if record.structure_type() == ty && record.is_known() => {
                record.copy_out_fields(buf, source)?;
                record.next_mut().copy_out(buf, source + NEXT_OFFSET)
            }
            _ => {
                *self = decode_chain(buf, Some(source))?;
                Ok(())
            }
        }
    }
}
