//! # xrov-layer
//!
//! An API layer that lets an overlay application draw into another
//! process's XR session.
//!
//! Handles for sessions, swapchains and spaces are virtualized: the
//! application only ever sees values issued by this process. In an overlay
//! process those handles are proxied, and calls on them are marshaled into
//! a shared region and answered by the main process's [`MainRpcServer`].
//!
//! ```text
//! overlay app ─► Layer (overlay) ─► rpc::call ═══ shm ═══► MainRpcServer ─► Layer (main) ─► runtime
//! ```

pub mod actions;
pub mod chain;
pub mod downchain;
pub mod error;
pub mod handles;
pub mod main_as_overlay;
pub mod proc_addr;
pub mod rpc;
pub mod state;
pub mod substitute;
pub mod sync;
pub mod testing;
pub mod types;

mod trampoline;

pub use downchain::Downchain;
pub use error::{LayerError, Result};
pub use main_as_overlay::{MainHost, MainSessionStatus, OverlayConnection};
pub use proc_addr::{xr_get_instance_proc_addr, SupportedCommand};
pub use rpc::{spawn_connection, MainRpcServer};
pub use state::{install, installed, Layer, LayerOptions};
pub use types::XrResult;
