//! Store trait shared by every persisted structure.
//!
//! The ledger, the published history, and the seen-item cache are each read
//! in full and written in full. Volumes are small enough that row-level
//! updates buy nothing.

use crate::error::StoreError;

/// Whole-value persistence for one structure.
pub trait StateStore<T>: Send + Sync {
    /// Read the stored value. A store with nothing in it yields `T::default()`.
    fn load(&self) -> Result<T, StoreError>;

    /// Replace the stored value.
    fn save(&self, value: &T) -> Result<(), StoreError>;

    /// Short description for logs.
    fn describe(&self) -> String;
}

impl<T, S> StateStore<T> for std::sync::Arc<S>
where
    S: StateStore<T> + ?Sized,
{
    fn load(&self) -> Result<T, StoreError> {
        (**self).load()
    }

    fn save(&self, value: &T) -> Result<(), StoreError> {
        (**self).save(value)
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}
