use nvrec_core::{RecordId, StoreResult};
use nvrec_hal::{BlockStorage, PlatformDelay};
use spin::Mutex;

use crate::RecordStore;

/// A `RecordStore` behind a spin lock, for stores reached from more than one context.
/// The lock is held across the whole device operation, so at most one erase/write/read
/// is ever in flight.
pub struct SharedStore<D, P> {
    inner: Mutex<RecordStore<D, P>>,
}

impl<D: BlockStorage, P: PlatformDelay> SharedStore<D, P> {
    pub fn new(store: RecordStore<D, P>) -> Self {
        Self { inner: Mutex::new(store) }
    }

    pub fn set(&self, id: RecordId, value: u32) {
        self.inner.lock().set(id, value);
    }

    pub fn get(&self, id: RecordId) -> Option<u32> {
        self.inner.lock().get(id)
    }

    pub fn clear(&self, id: RecordId) {
        self.inner.lock().clear(id);
    }

    pub fn synchronize(&self) -> StoreResult<()> {
        self.inner.lock().synchronize()
    }

    /// Run several operations under one lock, e.g. set-then-synchronize.
    pub fn with<R>(&self, f: impl FnOnce(&mut RecordStore<D, P>) -> R) -> R {
        f(&mut self.inner.lock())
    }

    pub fn into_inner(self) -> RecordStore<D, P> {
        self.inner.into_inner()
    }
}
