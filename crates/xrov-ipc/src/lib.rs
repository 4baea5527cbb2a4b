//! # xrov-ipc
//!
//! The wire side of overlay RPC: a bump-allocated arena over a shared
//! mapping ([`IpcBuffer`]), the request header and the pointer-relocation
//! list at the far end of the region, the memory-mapped region backing a connection, and the doorbell
//! channel both processes block on.

pub mod buffer;
pub mod channel;
pub mod header;
pub mod region;

pub use buffer::{IpcBuffer, MEMBER_ALIGNMENT};
pub use channel::{open_connection, Endpoint, RpcChannel};
pub use header::{PointerForm, ARGS_OFFSET, FIXUP_ENTRY_SIZE, HEADER_SIZE};
pub use region::SharedRegion;

#[derive(Debug, thiserror::Error)]
pub enum IpcError {
    #[error("shared buffer exhausted: requested {requested} bytes, {available} available")]
    OutOfSpace { requested: usize, available: usize },
    #[error("pointer relocation list of {0} entries met the arena")]
    TooManyPointers(usize),
    #[error("pointer {address:#x} does not point into the shared buffer")]
    PointerOutOfBounds { address: u64 },
    #[error("access of {len} bytes at offset {offset} is outside the shared buffer")]
    OffsetOutOfBounds { offset: usize, len: usize },
    #[error("pointers are already in {0:?} form")]
    RelocationState(PointerForm),
    #[error("region of {0} bytes cannot hold a request header")]
    RegionTooSmall(usize),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure of the round trip itself, as opposed to an API-level error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("peer process terminated")]
    PeerTerminated,
    #[error("timed out waiting for peer")]
    TimedOut,
}
