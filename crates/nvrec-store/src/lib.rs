#![no_std]
#![forbid(unsafe_code)]

extern crate alloc;
use alloc::vec;

use log::{debug, info};
use nvrec_core::{Mirror, RecordId, StoreResult};
use nvrec_flash::FlashRegion;
use nvrec_hal::{BlockStorage, PlatformDelay};

pub mod selftest;
mod shared;
pub use shared::SharedStore;

/// Tagged 32-bit records mirrored in RAM and persisted to one flash page.
///
/// Reads and writes only touch the mirror. Nothing reaches flash until
/// [`RecordStore::synchronize`], so unsynchronized `set`s are lost on reset.
pub struct RecordStore<D, P> {
    region: FlashRegion<D, P>,
    mirror: Mirror,
    dirty: bool,
}

impl<D: BlockStorage, P: PlatformDelay> RecordStore<D, P> {
    /// Bring up the region and load the mirror from flash.
    /// Tags are not checked here; invalid slots show up as absent on `get`.
    pub fn storage_init(mut region: FlashRegion<D, P>) -> StoreResult<Self> {
        region.init()?;
        let mut store = Self { region, mirror: Mirror::erased(), dirty: false };
        store.reload()?;
        Ok(store)
    }

    /// Re-read the first page into the mirror, dropping pending changes.
    pub fn reload(&mut self) -> StoreResult<()> {
        let mut page = vec![0u8; self.region.page_size() as usize];
        self.region.read(self.region.start_addr(), &mut page)?;
        self.mirror = Mirror::from_bytes(&page)?;
        self.dirty = false;
        Ok(())
    }

    pub fn set(&mut self, id: RecordId, value: u32) {
        self.mirror.set(id, value);
        self.dirty = true;
    }

    pub fn get(&self, id: RecordId) -> Option<u32> {
        let value = self.mirror.record(id).value();
        if value.is_none() {
            info!("Invalid data at {}(0x{:08x})", id.index(), self.region.start_addr() + id.offset());
            log::logger().flush();
        }
        value
    }

    /// Mark a slot absent. Persisted by the next `synchronize`.
    pub fn clear(&mut self, id: RecordId) {
        self.mirror.clear(id);
        self.dirty = true;
    }

    /// Erase the first page and program the whole mirror back.
    /// A failed erase stops here; the write is never issued over stale data.
    pub fn synchronize(&mut self) -> StoreResult<()> {
        let start = self.region.start_addr();
        self.region.erase(start, 1)?;
        self.region.write(start, &self.mirror.to_bytes())?;
        self.dirty = false;
        debug!("synchronized {} records", RecordId::ALL.len());
        Ok(())
    }

    /// Erase every page of the region. The mirror is left as is.
    pub fn erase_region(&mut self) -> StoreResult<()> {
        let start = self.region.start_addr();
        let pages = self.region.pages();
        self.region.erase(start, pages)?;
        self.dirty = true;
        Ok(())
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Every slot with its value, absent slots as `None`. Does not log.
    pub fn iter(&self) -> impl Iterator<Item = (RecordId, Option<u32>)> + '_ {
        RecordId::ALL.into_iter().map(move |id| (id, self.mirror.record(id).value()))
    }

    pub fn region(&self) -> &FlashRegion<D, P> {
        &self.region
    }

    pub fn into_region(self) -> FlashRegion<D, P> {
        self.region
    }
}
