use super::HandleKind;
use std::sync::atomic::{AtomicU64, Ordering};

const NAMESPACE_SHIFT: u32 = 40;
const NAMESPACE_MASK: u64 = 0xFF_FFFF;
const COUNTER_MASK: u64 = (1 << NAMESPACE_SHIFT) - 1;

/// Issues local handle values.
///
/// A value is `namespace << 40 | counter`. Two processes with different
/// namespaces therefore never hand out the same value.
pub struct LocalHandleAllocator {
    namespace: u64,
    next: AtomicU64,
}

impl LocalHandleAllocator {
    /// Namespace taken from the low bits of the process id.
    pub fn for_current_process() -> Self {
        Self::with_namespace(u64::from(std::process::id()))
    }

    pub fn with_namespace(namespace: u64) -> Self {
        Self {
            namespace: namespace & NAMESPACE_MASK,
            next: AtomicU64::new(1),
        }
    }

    pub fn namespace(&self) -> u64 {
        self.namespace
    }

    pub fn allocate<K: HandleKind>(&self) -> K {
        let counter = self.next.fetch_add(1, Ordering::Relaxed) & COUNTER_MASK;
        K::from_raw((self.namespace << NAMESPACE_SHIFT) | counter)
    }

    /// Whether `raw` was issued under this allocator's namespace.
    pub fn owns(&self, raw: u64) -> bool {
        raw >> NAMESPACE_SHIFT == self.namespace && raw & COUNTER_MASK != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{SessionHandle, SwapchainHandle};

    #[test]
    fn test_values_are_unique_and_namespaced() {
        let a = LocalHandleAllocator::with_namespace(1);
        let b = LocalHandleAllocator::with_namespace(2);

        let first: SessionHandle = a.allocate();
        let second: SwapchainHandle = a.allocate();
        let other: SessionHandle = b.allocate();

        assert_ne!(first.0, second.0);
        assert_ne!(first.0, other.0);
        assert!(a.owns(first.0));
        assert!(!a.owns(other.0));
        assert!(!first.is_null());
    }
}
