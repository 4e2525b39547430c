use std::fs;
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use log::{debug, warn};
use nvrec_core::{FlashOp, StoreError, StoreResult, APPLICATION_AREA_END, PAGE_SIZE};
use nvrec_hal::{BlockStorage, FlashEvent, FlashGeometry, FlashResult, PlatformDelay, RegionBounds};

const ERASED_BYTE: u8 = 0xFF;
const STUCK: u32 = u32::MAX;

/// Fault injection switches. Each one-shot fault is consumed by the next matching op.
#[derive(Debug, Clone, Copy, Default)]
pub struct Faults {
    pub fail_init: bool,
    pub reject: Option<FlashOp>,
    pub fail: Option<FlashOp>,
    pub hang: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpStats {
    pub erases: u32,
    pub writes: u32,
    pub reads: u32,
    pub read_bytes: usize,
}

/// RAM-backed NOR flash. Programming only clears bits; erase sets whole units to 0xFF.
/// Operations complete after `latency_polls` busy polls and then post one event.
pub struct SimFlash {
    base: u32,
    mem: Vec<u8>,
    geometry: FlashGeometry,
    bound: Option<RegionBounds>,
    latency_polls: u32,
    busy: AtomicU32,
    pending: Option<FlashEvent>,
    pub faults: Faults,
    stats: OpStats,
}

impl SimFlash {
    /// Erased flash covering `[base, base + size)`.
    pub fn new(base: u32, size: usize) -> Self {
        Self {
            base,
            mem: vec![ERASED_BYTE; size],
            geometry: FlashGeometry { erase_unit: PAGE_SIZE, program_unit: 4 },
            bound: None,
            latency_polls: 0,
            busy: AtomicU32::new(0),
            pending: None,
            faults: Faults::default(),
            stats: OpStats::default(),
        }
    }

    /// One erased page at the default store location.
    pub fn single_page() -> Self {
        Self::new(APPLICATION_AREA_END - PAGE_SIZE, PAGE_SIZE as usize)
    }

    pub fn with_latency(mut self, polls: u32) -> Self {
        self.latency_polls = polls;
        self
    }

    pub fn with_geometry(mut self, geometry: FlashGeometry) -> Self {
        self.geometry = geometry;
        self
    }

    /// Loads a flash image from disk. A missing file yields erased flash.
    pub fn load_image(path: &Path, base: u32, size: usize) -> anyhow::Result<Self> {
        let mut flash = Self::new(base, size);
        match fs::read(path) {
            Ok(bytes) => {
                if bytes.len() != size {
                    anyhow::bail!("image {} is {} bytes, expected {}", path.display(), bytes.len(), size);
                }
                flash.mem.copy_from_slice(&bytes);
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("no image at {}, starting erased", path.display());
            }
            Err(e) => return Err(e.into()),
        }
        Ok(flash)
    }

    pub fn save_image(&self, path: &Path) -> anyhow::Result<()> {
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, &self.mem)?;
        fs::rename(tmp, path)?;
        Ok(())
    }

    pub fn contents(&self) -> &[u8] {
        &self.mem
    }

    /// Overwrite raw cells, bypassing NOR rules. For seeding garbage in tests.
    pub fn poke(&mut self, addr: u32, bytes: &[u8]) {
        let off = (addr - self.base) as usize;
        self.mem[off..off + bytes.len()].copy_from_slice(bytes);
    }

    pub fn stats(&self) -> OpStats {
        self.stats
    }

    fn span(&self, op: FlashOp, addr: u32, len: usize) -> StoreResult<core::ops::Range<usize>> {
        let bound = self.bound.ok_or(StoreError::Rejected { op })?;
        if !bound.contains(addr, len) || addr < self.base {
            return Err(StoreError::Rejected { op });
        }
        let off = (addr - self.base) as usize;
        if off + len > self.mem.len() {
            return Err(StoreError::Rejected { op });
        }
        Ok(off..off + len)
    }

    // An issue attempt counts as one poll, so a pending op drains no matter who asks.
    fn admit(&mut self, op: FlashOp) -> StoreResult<()> {
        if self.is_busy() {
            warn!("sim flash: {} issued while busy", op);
            return Err(StoreError::Rejected { op });
        }
        if self.faults.reject == Some(op) {
            self.faults.reject = None;
            return Err(StoreError::Rejected { op });
        }
        Ok(())
    }

    /// Returns whether the op should take effect.
    fn post(&mut self, op: FlashOp, addr: u32, len: u32) -> bool {
        let failed = self.faults.fail == Some(op);
        if failed {
            self.faults.fail = None;
        }
        let result = if failed { FlashResult::Failure(1) } else { FlashResult::Success };
        self.pending = Some(FlashEvent { op, result, addr, len });
        self.busy.store(if self.faults.hang { STUCK } else { self.latency_polls }, Ordering::SeqCst);
        !failed
    }
}

impl BlockStorage for SimFlash {
    fn init(&mut self, region: &RegionBounds) -> StoreResult<()> {
        let inside = region.start_addr >= self.base
            && (region.end_addr as u64) <= self.base as u64 + self.mem.len() as u64;
        if self.faults.fail_init || region.is_empty() || !inside {
            return Err(StoreError::DeviceInit);
        }
        self.bound = Some(*region);
        self.busy.store(0, Ordering::SeqCst);
        self.pending = None;
        Ok(())
    }

    fn geometry(&self) -> FlashGeometry {
        self.geometry
    }

    fn erase(&mut self, addr: u32, pages: u32) -> StoreResult<()> {
        self.admit(FlashOp::Erase)?;
        let unit = self.geometry.erase_unit;
        if unit == 0 || addr % unit != 0 {
            return Err(StoreError::Rejected { op: FlashOp::Erase });
        }
        let span = self.span(FlashOp::Erase, addr, (pages as usize).saturating_mul(unit as usize))?;
        self.stats.erases += 1;
        if self.post(FlashOp::Erase, addr, pages) {
            self.mem[span].fill(ERASED_BYTE);
        }
        Ok(())
    }

    fn write(&mut self, addr: u32, data: &[u8]) -> StoreResult<()> {
        self.admit(FlashOp::Write)?;
        let unit = self.geometry.program_unit;
        if unit == 0 || addr % unit != 0 || data.len() % unit as usize != 0 {
            return Err(StoreError::Rejected { op: FlashOp::Write });
        }
        let span = self.span(FlashOp::Write, addr, data.len())?;
        self.stats.writes += 1;
        if self.post(FlashOp::Write, addr, data.len() as u32) {
            for (cell, b) in self.mem[span].iter_mut().zip(data) {
                *cell &= *b;
            }
        }
        Ok(())
    }

    fn read(&mut self, addr: u32, buf: &mut [u8]) -> StoreResult<()> {
        self.admit(FlashOp::Read)?;
        let span = self.span(FlashOp::Read, addr, buf.len())?;
        self.stats.reads += 1;
        self.stats.read_bytes += buf.len();
        if self.post(FlashOp::Read, addr, buf.len() as u32) {
            buf.copy_from_slice(&self.mem[span]);
        }
        Ok(())
    }

    fn is_busy(&self) -> bool {
        let left = self.busy.load(Ordering::SeqCst);
        if left == 0 {
            return false;
        }
        if left != STUCK {
            self.busy.store(left - 1, Ordering::SeqCst);
        }
        true
    }

    fn take_event(&mut self) -> Option<FlashEvent> {
        self.pending.take()
    }
}

/// `PlatformDelay` on top of `std::thread::sleep`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdDelay;

impl PlatformDelay for StdDelay {
    fn delay_ms(&mut self, ms: u32) {
        std::thread::sleep(Duration::from_millis(ms as u64));
    }
}
