//! On-target exercise routines for bring-up. They go through the public store API only.

use log::{debug, info};
use nvrec_core::{RecordId, StoreResult};
use nvrec_hal::{BlockStorage, PlatformDelay};

use crate::RecordStore;

pub const PATTERN_START: u32 = 0xAABB_CCDD;
pub const PATTERN_STEP: u32 = 0x10;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SelfTestReport {
    pub matched: usize,
    pub mismatched: usize,
}

impl SelfTestReport {
    pub fn passed(&self) -> bool {
        self.mismatched == 0
    }
}

/// Value written to `id` by [`write_and_verify`].
pub fn pattern_value(id: RecordId) -> u32 {
    PATTERN_START.wrapping_sub(PATTERN_STEP.wrapping_mul(id.index() as u32))
}

/// Slot `i` gets value `i`. Mirror only.
pub fn write_sequential<D: BlockStorage, P: PlatformDelay>(store: &mut RecordStore<D, P>) {
    for id in RecordId::ALL {
        store.set(id, id.index() as u32);
    }
}

pub fn read_all<D: BlockStorage, P: PlatformDelay>(store: &RecordStore<D, P>) {
    for id in RecordId::ALL {
        match store.get(id) {
            Some(v) => info!("Read data: id({}) 0x{:08x}", id.index(), v),
            None => info!("Read data: id({}) <absent>", id.index()),
        }
    }
}

/// Writes the descending pattern, synchronizes, reloads from flash and compares.
pub fn write_and_verify<D: BlockStorage, P: PlatformDelay>(
    store: &mut RecordStore<D, P>,
) -> StoreResult<SelfTestReport> {
    for id in RecordId::ALL {
        store.set(id, pattern_value(id));
    }
    store.synchronize()?;
    store.reload()?;

    let mut report = SelfTestReport::default();
    for id in RecordId::ALL {
        let expected = pattern_value(id);
        match store.get(id) {
            Some(v) if v == expected => {
                debug!("Data matched 0x{:08x} == 0x{:08x}", expected, v);
                report.matched += 1;
            }
            other => {
                debug!("Failed, Data not matched 0x{:08x} != {:?}", expected, other);
                report.mismatched += 1;
            }
        }
    }
    Ok(report)
}
