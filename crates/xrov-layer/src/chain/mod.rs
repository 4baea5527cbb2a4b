//! Structure chains: polymorphic records linked through `next`.
//!
//! A [`Chain`] is the owned form of an extensible argument. Every record
//! kind this layer knows is a variant of [`Record`]; anything else is kept
//! as [`Record::Unknown`] so a chain built by a newer application still
//! walks, but unknown records are dropped by copy, encode and decode.
//!
//! Wire layout of one record inside an [`IpcBuffer`]:
//! ```text
//! offset  field
//! ------  ---------------------------------------------
//!  0      structure type (i32 in an 8-byte slot)
//!  8      next pointer (registered for relocation)
//! 16      kind-specific fields, one 8-byte slot per scalar
//! ```

mod field;
mod records;

pub use field::{Field, HandleSlot, HandleVisitor};
pub use records::*;

use crate::error::{LayerError, Result};
use crate::types::StructureType;
use xrov_config::{log_chain_info, log_chain_warn};
use xrov_ipc::IpcBuffer;

pub type Chain = Option<Box<Record>>;

pub const RECORD_HEADER_SIZE: usize = 16;
pub const NEXT_OFFSET: usize = 8;

/// Decoding stops here so a corrupt or cyclic wire chain cannot spin forever.
pub const MAX_CHAIN_LENGTH: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyPolicy {
    /// Copy every reachable record with all of its fields.
    Everything,
    /// Keep only each record's structure type and `next` link.
    TypeAndNext,
}

/// Implemented by every concrete record so callers can search chains by type.
pub trait ChainRecord: Sized {
    const TYPE: StructureType;

    fn from_record(record: &Record) -> Option<&Self>;
    fn from_record_mut(record: &mut Record) -> Option<&mut Self>;
    fn into_record(self) -> Record;
}

/// Iterate the records of a chain, head first.
pub fn iter_chain(chain: &Chain) -> impl Iterator<Item = &Record> {
    std::iter::successors(chain.as_deref(), |record| record.next().as_deref())
}

/// First record of type `T` anywhere in the chain.
pub fn find_in_chain<T: ChainRecord>(chain: &Chain) -> Option<&T> {
    iter_chain(chain).find_map(T::from_record)
}

pub fn find_in_chain_mut<T: ChainRecord>(chain: &mut Chain) -> Option<&mut T> {
    let mut cursor = chain.as_deref_mut();
    while let Some(record) = cursor {
        if record.structure_type() == T::TYPE {
            return T::from_record_mut(record);
        }
        cursor = record.next_mut().as_deref_mut();
    }
    None
}

/// Append `record` at the end of `chain`.
pub fn push_back(chain: &mut Chain, record: Record) {
    match chain {
        Some(existing) => push_back(existing.next_mut(), record),
        None => *chain = Some(Box::new(record)),
    }
}

/// Build a chain from detached records, preserving order.
pub(crate) fn link(records: Vec<Record>) -> Chain {
    records.into_iter().rev().fold(None, |next, mut record| {
        *record.next_mut() = next;
        Some(Box::new(record))
    })
}

fn report_unknown(action: &'static str, ty: StructureType) {
    log_chain_info!(
        "Skipping unknown structure in chain",
        action = action,
        structure_type = ty.0
    );
}

/// Deep-copy a chain. Unknown records are dropped and their successors
/// relinked; any allocation failure fails the whole copy.
pub fn copy_chain(source: &Chain, policy: CopyPolicy) -> Result<Chain> {
    let mut copies = Vec::new();
    for record in iter_chain(source) {
        match record.copy_detached(policy)? {
            Some(copy) => {
                copies.try_reserve(1)?;
                copies.push(copy);
            }
            None => report_unknown("copy", record.structure_type()),
        }
    }
    Ok(link(copies))
}

/// Release a chain record by record. Returns how many records were freed.
pub fn free_chain(chain: Chain) -> usize {
    let mut freed = 0;
    let mut cursor = chain;
    while let Some(mut record) = cursor {
        if let Record::Unknown(unknown) = record.as_ref() {
            report_unknown("free", unknown.ty);
        }
        cursor = record.next_mut().take();
        freed += 1;
    }
    freed
}

/// Run `visitor` over every handle field of every known record.
pub fn visit_chain(chain: &mut Chain, visitor: &mut dyn HandleVisitor) -> Result<()> {
    let mut cursor = chain.as_deref_mut();
    while let Some(record) = cursor {
        record.visit_fields(visitor)?;
        cursor = record.next_mut().as_deref_mut();
    }
    Ok(())
}

/// Write the chain into the arena and return the offset of its first
/// known record.
pub fn encode_chain(
    buf: &mut IpcBuffer<'_>,
    chain: Option<&Record>,
    policy: CopyPolicy,
) -> Result<Option<usize>> {
    let mut head = None;
    let mut previous_next_slot: Option<usize> = None;
    let mut cursor = chain;

    while let Some(record) = cursor {
        cursor = record.next().as_deref();
        if let Record::Unknown(unknown) = record {
            report_unknown("encode", unknown.ty);
            continue;
        }

        let at = buf.allocate(record.wire_size())?;
        buf.write_i32(at, record.structure_type().0)?;
        record.encode_fields(buf, at, policy)?;

        match previous_next_slot {
            Some(slot) => buf.write_pointer(slot, Some(at))?,
            None => head = Some(at),
        }
        previous_next_slot = Some(at + NEXT_OFFSET);
    }
    Ok(head)
}

/// Rebuild an owned chain from the wire, starting at `at`.
pub fn decode_chain(buf: &IpcBuffer<'_>, mut at: Option<usize>) -> Result<Chain> {
    let mut records = Vec::new();
    let mut walked = 0;

    while let Some(offset) = at {
        walked += 1;
        if walked > MAX_CHAIN_LENGTH {
            log_chain_warn!("Chain on the wire is too long", limit = MAX_CHAIN_LENGTH as u64);
            return Err(LayerError::ValidationFailure("structure chain too long"));
        }

        let ty = StructureType(buf.read_i32(offset)?);
        match Record::decode_fields(ty, buf, offset)? {
            Some(record) => {
                records.try_reserve(1)?;
                records.push(record);
            }
            None => report_unknown("decode", ty),
        }
        at = buf.read_pointer(offset + NEXT_OFFSET)?;
    }
    Ok(link(records))
}

/// Skip unknown records at the head of a chain.
pub(crate) fn first_known(chain: &Chain) -> Option<&Record> {
    let mut cursor = chain.as_deref();
    while let Some(Record::Unknown(unknown)) = cursor {
        report_unknown("write back", unknown.ty);
        cursor = unknown.next.as_deref();
    }
    cursor
}
