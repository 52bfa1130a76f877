//! In-memory store, used by tests and by callers that opt out of persistence.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::error::StoreError;
use crate::store::traits::StateStore;

/// Keeps the value in memory. Saves can be made to fail on demand.
#[derive(Default)]
pub struct MemoryStore<T> {
    value: Mutex<T>,
    fail_saves: AtomicBool,
    fail_loads: AtomicBool,
    saves: AtomicUsize,
}

impl<T: Clone + Default> MemoryStore<T> {
    pub fn new() -> Self {
        Self {
            value: Mutex::new(T::default()),
            fail_saves: AtomicBool::new(false),
            fail_loads: AtomicBool::new(false),
            saves: AtomicUsize::new(0),
        }
    }

    pub fn with_value(value: T) -> Self {
        let store = Self::new();
        *store.lock() = value;
        store
    }

    /// Make subsequent saves fail with an IO error.
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent loads fail with an IO error.
    pub fn set_fail_loads(&self, fail: bool) {
        self.fail_loads.store(fail, Ordering::SeqCst);
    }

    /// Number of successful saves.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Current stored value.
    pub fn current(&self) -> T {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, T> {
        self.value
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn simulated_failure() -> StoreError {
        StoreError::Io {
            path: "memory".to_string(),
            source: std::io::Error::other("simulated failure"),
        }
    }
}

impl<T: Clone + Default + Send> StateStore<T> for MemoryStore<T> {
    fn load(&self) -> Result<T, StoreError> {
        if self.fail_loads.load(Ordering::SeqCst) {
            return Err(Self::simulated_failure());
        }
        Ok(self.current())
    }

    fn save(&self, value: &T) -> Result<(), StoreError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(Self::simulated_failure());
        }
        *self.lock() = value.clone();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
