use super::{HandleExtra, HandleKind};
use crate::downchain::Downchain;
use crate::error::{LayerError, Result};
use crate::sync::{lock, serialize_downchain};
use crate::types::{InstanceHandle, XrResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use xrov_config::{log_handle_debug, log_handle_warn};

/// Outcome of [`HandleInfo::destroy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Teardown {
    /// First destroy; carries the runtime's result, or `SUCCESS` when no
    /// runtime call was needed.
    Performed(XrResult),
    AlreadyDestroyed,
}

/// One live handle.
///
/// The downchain is shared with every other entry created under the same
/// instance and is released on teardown. `parent` is a back-reference
/// only.
pub struct HandleInfo<K: HandleKind, X: HandleExtra> {
    pub local: K,
    pub actual: K,
    pub instance: InstanceHandle,
    /// The object lives in another process and is reached over RPC.
    pub is_proxied: bool,
    pub extra: X,
    parent: Mutex<Option<K::Parent>>,
    downchain: Mutex<Option<Arc<dyn Downchain>>>,
    valid: AtomicBool,
}

impl<K: HandleKind, X: HandleExtra> HandleInfo<K, X> {
    /// An unvirtualized entry whose actual handle equals `local`.
    pub fn new(local: K, instance: InstanceHandle, downchain: Arc<dyn Downchain>, extra: X) -> Self {
        Self {
            local,
            actual: local,
            instance,
            is_proxied: false,
            extra,
            parent: Mutex::new(None),
            downchain: Mutex::new(Some(downchain)),
            valid: AtomicBool::new(true),
        }
    }

    pub fn with_parent(self, parent: K::Parent) -> Self {
        *lock(&self.parent) = Some(parent);
        self
    }

    pub fn with_actual(mut self, actual: K) -> Self {
        self.actual = actual;
        self
    }

    pub fn proxied(mut self) -> Self {
        self.is_proxied = true;
        self
    }

    pub fn parent(&self) -> Option<K::Parent> {
        *lock(&self.parent)
    }

    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    /// The dispatch table, unless the entry has been torn down.
    pub fn downchain(&self) -> Result<Arc<dyn Downchain>> {
        lock(&self.downchain)
            .clone()
            .ok_or_else(|| LayerError::handle_invalid(K::NAME, self.local.into_raw()))
    }

    /// Invalidate the entry. Only the first call tears down; later calls
    /// warn and change nothing.
    pub fn destroy(&self) -> Teardown {
        if !self.valid.swap(false, Ordering::AcqRel) {
            log_handle_warn!(
                "Destroy called on an already destroyed handle",
                kind = K::NAME,
                handle = self.local.into_raw()
            );
            return Teardown::AlreadyDestroyed;
        }
        Teardown::Performed(self.teardown())
    }

    /// Invalidate the entry without touching the runtime object, for an
    /// entry that never became the owner of its actual handle.
    pub fn disarm(&self) {
        self.valid.store(false, Ordering::Release);
        lock(&self.parent).take();
        lock(&self.downchain).take();
    }

    fn teardown(&self) -> XrResult {
        self.extra.release_children();
        lock(&self.parent).take();
        let downchain = lock(&self.downchain).take();

        if !K::VIRTUALIZED || self.is_proxied {
            return XrResult::SUCCESS;
        }
        let Some(downchain) = downchain else {
            return XrResult::SUCCESS;
        };

        log_handle_debug!(
            "Destroying runtime object",
            kind = K::NAME,
            actual = self.actual.into_raw()
        );
        let _serialized = serialize_downchain();
        K::destroy_actual(downchain.as_ref(), self.actual)
    }
}

impl<K: HandleKind, X: HandleExtra> Drop for HandleInfo<K, X> {
    fn drop(&mut self) {
        if *self.valid.get_mut() {
            *self.valid.get_mut() = false;
            self.teardown();
        }
    }
}
