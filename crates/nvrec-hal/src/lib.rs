#![no_std]
#![forbid(unsafe_code)]

use nvrec_core::{FlashOp, StoreError, StoreResult};

/// Erase/program granularity reported by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashGeometry {
    pub erase_unit: u32,
    pub program_unit: u32,
}

/// Address range a driver instance is allowed to touch: `[start_addr, end_addr)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionBounds {
    pub start_addr: u32,
    pub end_addr: u32,
}

impl RegionBounds {
    pub fn len(&self) -> u32 {
        self.end_addr.saturating_sub(self.start_addr)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, addr: u32, len: usize) -> bool {
        let end = addr as u64 + len as u64;
        addr >= self.start_addr && end <= self.end_addr as u64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashResult {
    Success,
    Failure(u32),
}

/// Delivered once per finished operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashEvent {
    pub op: FlashOp,
    pub result: FlashResult,
    pub addr: u32,
    /// Bytes for read/write, pages for erase.
    pub len: u32,
}

/// Block storage driver with asynchronous completion.
/// INVARIANT: erase/write/read only queue the operation; completion is observed
/// through `is_busy` and `take_event`.
pub trait BlockStorage: Send {
    fn init(&mut self, region: &RegionBounds) -> StoreResult<()>;

    /// Must be answerable before `init`; the region is validated against it first.
    fn geometry(&self) -> FlashGeometry;

    fn erase(&mut self, addr: u32, pages: u32) -> StoreResult<()>;

    fn write(&mut self, addr: u32, data: &[u8]) -> StoreResult<()>;

    fn read(&mut self, addr: u32, buf: &mut [u8]) -> StoreResult<()>;

    fn is_busy(&self) -> bool;

    /// Pops the completion event of the last finished operation, if the driver reports one.
    fn take_event(&mut self) -> Option<FlashEvent>;

    // Default: busy means WouldBlock, otherwise hand over whatever event is pending.
    fn poll_completion(&mut self) -> nb::Result<Option<FlashEvent>, StoreError> {
        if self.is_busy() {
            return Err(nb::Error::WouldBlock);
        }
        Ok(self.take_event())
    }
}

/// Millisecond blocking sleep.
pub trait PlatformDelay: Send {
    fn delay_ms(&mut self, ms: u32);
}
