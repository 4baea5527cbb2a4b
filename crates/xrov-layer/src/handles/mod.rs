//! Handle bookkeeping: one table per handle kind, the entries stored in
//! them, and the allocator for process-local handle values.
//!
//! Sessions, swapchains and spaces are virtualized: the application sees a
//! local handle and the entry records the actual handle underneath. Other
//! kinds are tracked under the runtime's own handle value.

mod alloc;
mod extra;
mod info;
mod table;

pub use alloc::LocalHandleAllocator;
pub use extra::{
    ActionExtra, ActionSetExtra, BoundActionSpace, DebugMessengerExtra, HandleExtra,
    InstanceChildren, InstanceExtra, SessionActions, SessionChildren, SessionExtra, SpaceExtra,
    SpaceOrigin, SwapchainExtra,
};
pub use info::{HandleInfo, Teardown};
pub use table::HandleTable;

use crate::downchain::Downchain;
use crate::types::{
    ActionHandle, ActionSetHandle, DebugUtilsMessengerHandle, InstanceHandle, SessionHandle,
    SpaceHandle, SwapchainHandle, XrResult,
};
use std::fmt::Debug;
use std::hash::Hash;

pub trait HandleKind: Copy + Eq + Hash + Debug + Send + Sync + 'static {
    /// API type name, used in diagnostics.
    const NAME: &'static str;
    /// Whether local values differ from the runtime's.
    const VIRTUALIZED: bool;

    type Parent: Copy + Eq + Debug + Send + Sync + 'static;

    fn from_raw(raw: u64) -> Self;
    fn into_raw(self) -> u64;

    /// Call the runtime's destroy entry point for this kind.
    fn destroy_actual(downchain: &dyn Downchain, actual: Self) -> XrResult;
}

macro_rules! handle_kind {
    ($($handle:ident: parent = $parent:ty, virtualized = $virt:expr, destroy = $destroy:ident;)*) => {
        $(
            impl HandleKind for $handle {
                const NAME: &'static str = $handle::API_NAME;
                const VIRTUALIZED: bool = $virt;
                type Parent = $parent;

                fn from_raw(raw: u64) -> Self {
                    $handle(raw)
                }

                fn into_raw(self) -> u64 {
                    self.0
                }

                fn destroy_actual(downchain: &dyn Downchain, actual: Self) -> XrResult {
                    downchain.$destroy(actual)
                }
            }
        )*
    };
}

handle_kind! {
    InstanceHandle: parent = InstanceHandle, virtualized = false, destroy = destroy_instance;
    SessionHandle: parent = InstanceHandle, virtualized = true, destroy = destroy_session;
    SwapchainHandle: parent = SessionHandle, virtualized = true, destroy = destroy_swapchain;
    SpaceHandle: parent = SessionHandle, virtualized = true, destroy = destroy_space;
    ActionSetHandle: parent = InstanceHandle, virtualized = false, destroy = destroy_action_set;
    ActionHandle: parent = ActionSetHandle, virtualized = false, destroy = destroy_action;
    DebugUtilsMessengerHandle: parent = InstanceHandle, virtualized = false, destroy = destroy_debug_utils_messenger;
}

pub type InstanceInfo = HandleInfo<InstanceHandle, InstanceExtra>;
pub type SessionInfo = HandleInfo<SessionHandle, SessionExtra>;
pub type SwapchainInfo = HandleInfo<SwapchainHandle, SwapchainExtra>;
pub type SpaceInfo = HandleInfo<SpaceHandle, SpaceExtra>;
pub type ActionSetInfo = HandleInfo<ActionSetHandle, ActionSetExtra>;
pub type ActionInfo = HandleInfo<ActionHandle, ActionExtra>;
pub type DebugMessengerInfo = HandleInfo<DebugUtilsMessengerHandle, DebugMessengerExtra>;
