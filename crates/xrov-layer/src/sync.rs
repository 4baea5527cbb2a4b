use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

/// Lock a table mutex, recovering the data if a holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
struct Ownership {
    owner: Option<ThreadId>,
    depth: usize,
}

/// Process-wide gate for downchain calls.
///
/// Reentrant on the owning thread, since a runtime may call back into the
/// layer from inside a call the layer made.
#[derive(Default)]
pub struct DownchainGate {
    state: Mutex<Ownership>,
    released: Condvar,
}

impl DownchainGate {
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(Ownership {
                owner: None,
                depth: 0,
            }),
            released: Condvar::new(),
        }
    }

    pub fn enter(&self) -> GateGuard<'_> {
        let me = thread::current().id();
        let mut state = lock(&self.state);
        while state.owner.is_some_and(|owner| owner != me) {
            state = self
                .released
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        state.owner = Some(me);
        state.depth += 1;
        GateGuard { gate: self }
    }
}

pub struct GateGuard<'a> {
    gate: &'a DownchainGate,
}

impl Drop for GateGuard<'_> {
    fn drop(&mut self) {
        let mut state = lock(&self.gate.state);
        state.depth -= 1;
        if state.depth == 0 {
            state.owner = None;
            self.gate.released.notify_one();
        }
    }
}

static DOWNCHAIN_GATE: DownchainGate = DownchainGate::new();
static SYNCHRONIZE_EVERY_CALL: AtomicBool = AtomicBool::new(false);

/// Serialize every downchain call through one process-wide gate, for
/// runtimes that are not thread-safe.
pub fn set_synchronize_every_call(enabled: bool) {
    SYNCHRONIZE_EVERY_CALL.store(enabled, Ordering::Release);
}

pub fn synchronize_every_call() -> bool {
    SYNCHRONIZE_EVERY_CALL.load(Ordering::Acquire)
}

/// Held for the duration of one downchain call when serialization is on.
pub fn serialize_downchain() -> Option<GateGuard<'static>> {
    synchronize_every_call().then(|| DOWNCHAIN_GATE.enter())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[test]
    fn test_reentrant_on_same_thread() {
        let gate = DownchainGate::new();
        let outer = gate.enter();
        let inner = gate.enter();
        drop(inner);
        assert_eq!(lock(&gate.state).depth, 1);
        drop(outer);
        assert_eq!(lock(&gate.state).owner, None);
    }

    #[test]
    fn test_excludes_other_threads() {
        let gate = Arc::new(DownchainGate::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let workers: Vec<_> = (0..4)
            .map(|_| {
                let gate = gate.clone();
                let inside = inside.clone();
                thread::spawn(move || {
                    for _ in 0..100 {
                        let _outer = gate.enter();
                        let _nested = gate.enter();
                        assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0);
                        inside.fetch_sub(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }
    }
}
