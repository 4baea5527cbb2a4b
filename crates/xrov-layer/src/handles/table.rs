use super::{HandleExtra, HandleInfo, HandleKind};
use crate::error::{LayerError, Result};
use crate::sync::lock;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use xrov_config::log_handle_debug;

struct TableInner<K: HandleKind, X: HandleExtra> {
    entries: HashMap<K, Arc<HandleInfo<K, X>>>,
    /// actual -> local, kept only for virtualized kinds.
    local_for_actual: HashMap<K, K>,
}

/// Registry of live handles of one kind.
///
/// Entries and the actual-to-local map share one lock so a lookup never
/// observes one updated without the other. The lock is held only for the
/// map operation itself.
pub struct HandleTable<K: HandleKind, X: HandleExtra> {
    inner: Mutex<TableInner<K, X>>,
}

impl<K: HandleKind, X: HandleExtra> Default for HandleTable<K, X> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: HandleKind, X: HandleExtra> HandleTable<K, X> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(TableInner {
                entries: HashMap::new(),
                local_for_actual: HashMap::new(),
            }),
        }
    }

    /// Register `info` under its local handle.
    ///
    /// A rejected entry is disarmed before it is dropped: its actual handle
    /// belongs to whichever entry already holds it. An entry with a null
    /// actual handle has nothing underneath yet and is not reverse-mapped.
    pub fn add(&self, info: HandleInfo<K, X>) -> Result<Arc<HandleInfo<K, X>>> {
        let info = Arc::new(info);
        let mapped = K::VIRTUALIZED && info.actual.into_raw() != 0;
        let rejected = {
            let mut inner = lock(&self.inner);
            if inner.entries.contains_key(&info.local) {
                Some(LayerError::ValidationFailure("local handle already registered"))
            } else if mapped && inner.local_for_actual.contains_key(&info.actual) {
                Some(LayerError::ValidationFailure("actual handle already mapped"))
            } else {
                if mapped {
                    inner.local_for_actual.insert(info.actual, info.local);
                }
                inner.entries.insert(info.local, info.clone());
                None
            }
        };
        if let Some(err) = rejected {
            info.disarm();
            drop(info);
            return Err(err);
        }

        log_handle_debug!(
            "Registered handle",
            kind = K::NAME,
            local = info.local.into_raw(),
            actual = info.actual.into_raw(),
            proxied = info.is_proxied
        );
        Ok(info)
    }

    /// Live entry for `local`.
    pub fn get(&self, local: K) -> Result<Arc<HandleInfo<K, X>>> {
        lock(&self.inner)
            .entries
            .get(&local)
            .filter(|info| info.is_valid())
            .cloned()
            .ok_or_else(|| LayerError::handle_invalid(K::NAME, local.into_raw()))
    }

    pub fn remove(&self, local: K) -> Result<()> {
        let removed = {
            let mut inner = lock(&self.inner);
            let info = inner
                .entries
                .remove(&local)
                .ok_or_else(|| LayerError::handle_invalid(K::NAME, local.into_raw()))?;
            if K::VIRTUALIZED && inner.local_for_actual.get(&info.actual) == Some(&local) {
                inner.local_for_actual.remove(&info.actual);
            }
            info
        };
        // Last reference may tear down; do it outside the table lock.
        drop(removed);
        Ok(())
    }

    /// Reverse lookup for a virtualized kind.
    pub fn local_for_actual(&self, actual: K) -> Result<K> {
        lock(&self.inner)
            .local_for_actual
            .get(&actual)
            .copied()
            .ok_or_else(|| LayerError::handle_invalid(K::NAME, actual.into_raw()))
    }

    pub fn contains(&self, local: K) -> bool {
        lock(&self.inner).entries.contains_key(&local)
    }

    /// Snapshot of every registered local handle.
    pub fn handles(&self) -> Vec<K> {
        lock(&self.inner).entries.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.inner).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handles::{SpaceExtra, SpaceOrigin};
    use crate::testing::FakeRuntime;
    use crate::types::{InstanceHandle, ReferenceSpaceType, SpaceHandle};

    fn space(runtime: &Arc<FakeRuntime>, local: u64, actual: u64) -> HandleInfo<SpaceHandle, SpaceExtra> {
        HandleInfo::new(
            SpaceHandle(local),
            InstanceHandle(1),
            runtime.clone(),
            SpaceExtra::new(SpaceOrigin::Reference(ReferenceSpaceType::LOCAL)),
        )
        .with_actual(SpaceHandle(actual))
    }

    #[test]
    fn test_add_get_remove() {
        let runtime = Arc::new(FakeRuntime::new());
        let table = HandleTable::new();
        table.add(space(&runtime, 10, 100)).unwrap();

        assert_eq!(table.get(SpaceHandle(10)).unwrap().actual, SpaceHandle(100));
        assert_eq!(table.local_for_actual(SpaceHandle(100)).unwrap(), SpaceHandle(10));

        table.remove(SpaceHandle(10)).unwrap();
        assert!(matches!(
            table.get(SpaceHandle(10)),
            Err(LayerError::HandleInvalid { .. })
        ));
        assert!(table.local_for_actual(SpaceHandle(100)).is_err());
        assert!(matches!(
            table.remove(SpaceHandle(10)),
            Err(LayerError::HandleInvalid { .. })
        ));
    }

    #[test]
    fn test_duplicates_are_rejected() {
        let runtime = Arc::new(FakeRuntime::new());
        let table = HandleTable::new();
        table.add(space(&runtime, 10, 100)).unwrap();
        assert!(table.add(space(&runtime, 10, 101)).is_err());
        assert!(table.add(space(&runtime, 11, 100)).is_err());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_rejected_duplicate_leaves_runtime_object_alive() {
        let runtime = Arc::new(FakeRuntime::new());
        let table = HandleTable::new();
        let kept = table.add(space(&runtime, 10, 100)).unwrap();
        assert!(table.add(space(&runtime, 11, 100)).is_err());
        assert!(table.add(space(&runtime, 10, 101)).is_err());

        assert_eq!(runtime.count("destroy_space"), 0);
        assert!(kept.is_valid());
        assert_eq!(table.local_for_actual(SpaceHandle(100)).unwrap(), SpaceHandle(10));
    }

    #[test]
    fn test_null_actual_handles_are_not_mapped() {
        let runtime = Arc::new(FakeRuntime::new());
        let table = HandleTable::new();
        table.add(space(&runtime, 10, 0).proxied()).unwrap();
        table.add(space(&runtime, 11, 0).proxied()).unwrap();
        assert_eq!(table.len(), 2);
        assert!(table.local_for_actual(SpaceHandle::NULL).is_err());

        table.remove(SpaceHandle(10)).unwrap();
        assert!(table.get(SpaceHandle(11)).is_ok());
    }

    #[test]
    fn test_destroyed_entry_fails_lookup() {
        let runtime = Arc::new(FakeRuntime::new());
        let table = HandleTable::new();
        let info = table.add(space(&runtime, 10, 100)).unwrap();
        info.destroy();
        assert!(table.get(SpaceHandle(10)).is_err());
    }
}
