use log::{debug, error, info};
use nvrec_core::{FlashOp, StoreError, StoreResult, APPLICATION_AREA_END, MIRROR_BYTES, PAGE_SIZE};
use nvrec_hal::{BlockStorage, FlashEvent, FlashGeometry, FlashResult, PlatformDelay, RegionBounds};

use crate::wait::{CompletionWaiter, WaitPolicy};

/// Placement of the store on flash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionConfig {
    pub start_addr: u32,
    pub page_size: u32,
    pub pages: u32,
}

impl Default for RegionConfig {
    fn default() -> Self {
        Self {
            start_addr: APPLICATION_AREA_END - PAGE_SIZE,
            page_size: PAGE_SIZE,
            pages: 1,
        }
    }
}

impl RegionConfig {
    pub fn bounds(&self) -> StoreResult<RegionBounds> {
        let len = self.page_size.checked_mul(self.pages).ok_or(StoreError::InvalidRegion)?;
        let end_addr = self.start_addr.checked_add(len).ok_or(StoreError::InvalidRegion)?;
        Ok(RegionBounds { start_addr: self.start_addr, end_addr })
    }

    /// Region must be whole erase units and large enough for the mirror.
    pub fn validate(&self, geometry: &FlashGeometry) -> StoreResult<RegionBounds> {
        let bounds = self.bounds()?;
        let unit = geometry.erase_unit;
        if self.pages == 0 || unit == 0 || geometry.program_unit == 0 {
            return Err(StoreError::InvalidRegion);
        }
        if self.page_size != unit || self.start_addr % unit != 0 || bounds.len() % unit != 0 {
            return Err(StoreError::InvalidRegion);
        }
        if (bounds.len() as usize) < MIRROR_BYTES || MIRROR_BYTES % geometry.program_unit as usize != 0 {
            return Err(StoreError::InvalidRegion);
        }
        Ok(bounds)
    }
}

/// Owns the device and the single region the store lives in.
/// Every operation blocks until the device reports completion or the wait bound expires.
pub struct FlashRegion<D, P> {
    device: D,
    delay: P,
    waiter: CompletionWaiter,
    config: RegionConfig,
    bounds: RegionBounds,
}

impl<D: BlockStorage, P: PlatformDelay> FlashRegion<D, P> {
    pub fn new(device: D, delay: P, config: RegionConfig, policy: WaitPolicy) -> Self {
        // Overflowing configs produce an empty range here and are rejected by init().
        let bounds = config.bounds().unwrap_or(RegionBounds {
            start_addr: config.start_addr,
            end_addr: config.start_addr,
        });
        Self { device, delay, waiter: CompletionWaiter::new(policy), config, bounds }
    }

    /// Checks the region against the device geometry, then binds it to the driver.
    /// Failure here is fatal for the store.
    pub fn init(&mut self) -> StoreResult<()> {
        let bounds = self.config.validate(&self.device.geometry())?;
        if let Err(e) = self.device.init(&bounds) {
            error!("flash init failed for 0x{:08x}..0x{:08x}: {}", bounds.start_addr, bounds.end_addr, e);
            return Err(StoreError::DeviceInit);
        }

        let Self { device, delay, waiter, .. } = self;
        match waiter.wait_for(delay, FlashOp::Other, || device.poll_completion()) {
            Ok(Some(FlashEvent { result: FlashResult::Failure(code), .. })) => {
                error!("flash init reported failure code {}", code);
                return Err(StoreError::DeviceInit);
            }
            Ok(_) => {}
            Err(e) => {
                error!("flash not ready after init: {}", e);
                return Err(StoreError::DeviceInit);
            }
        }

        self.bounds = bounds;
        self.print_flash_info();
        Ok(())
    }

    pub fn read(&mut self, addr: u32, buf: &mut [u8]) -> StoreResult<()> {
        self.check_range(addr, buf.len())?;
        info!("Read 0x{:08x}, len({})", addr, buf.len());
        log::logger().flush();

        self.wait_idle(FlashOp::Read)?;
        self.device.read(addr, buf)?;
        self.complete(FlashOp::Read)
    }

    /// Programs `data` at `addr`. The target bytes must be erased; this is not checked.
    pub fn write(&mut self, addr: u32, data: &[u8]) -> StoreResult<()> {
        self.check_range(addr, data.len())?;
        match data {
            [a0, a1, a2, a3, b0, b1, b2, b3, ..] => info!(
                "Writing to 0x{:08x} 0x{:08x} 0x{:08x}, len({})",
                addr,
                u32::from_le_bytes([*a0, *a1, *a2, *a3]),
                u32::from_le_bytes([*b0, *b1, *b2, *b3]),
                data.len()
            ),
            _ => info!("Writing to 0x{:08x}, len({})", addr, data.len()),
        }
        log::logger().flush();

        self.wait_idle(FlashOp::Write)?;
        self.device.write(addr, data)?;
        self.complete(FlashOp::Write)
    }

    /// Resets `pages` pages from `addr` to all-ones.
    pub fn erase(&mut self, addr: u32, pages: u32) -> StoreResult<()> {
        let len = (pages as usize).saturating_mul(self.config.page_size as usize);
        self.check_range(addr, len)?;
        if pages == 0 || self.config.page_size == 0 || (addr - self.bounds.start_addr) % self.config.page_size != 0 {
            return Err(StoreError::InvalidRegion);
        }
        info!("Erase flash 0x{:08x}, len({})", addr, pages);
        log::logger().flush();

        self.wait_idle(FlashOp::Erase)?;
        self.device.erase(addr, pages)?;
        self.complete(FlashOp::Erase)
    }

    /// Completion callback: logs the outcome and turns a failure into an error.
    pub fn on_event(&self, event: &FlashEvent) -> StoreResult<()> {
        if let FlashResult::Failure(code) = event.result {
            error!(
                "--> Event received: ERROR while executing {} at 0x{:x} (code {}).",
                event.op, event.addr, code
            );
            return Err(StoreError::Device { op: event.op, addr: event.addr, code });
        }

        match event.op {
            FlashOp::Write => info!("--> Event received: wrote {} bytes at address 0x{:x}.", event.len, event.addr),
            FlashOp::Erase => info!("--> Event received: erased {} page from address 0x{:x}.", event.len, event.addr),
            FlashOp::Read => debug!("--> Event received: read {} bytes at address 0x{:x}.", event.len, event.addr),
            FlashOp::Other => {}
        }
        Ok(())
    }

    pub fn start_addr(&self) -> u32 { self.bounds.start_addr }
    pub fn end_addr(&self) -> u32 { self.bounds.end_addr }
    pub fn page_size(&self) -> u32 { self.config.page_size }
    pub fn pages(&self) -> u32 { self.config.pages }
    pub fn geometry(&self) -> FlashGeometry { self.device.geometry() }
    pub fn policy(&self) -> WaitPolicy { self.waiter.policy() }

    pub fn device(&self) -> &D { &self.device }

    pub fn into_parts(self) -> (D, P) {
        (self.device, self.delay)
    }

    fn check_range(&self, addr: u32, len: usize) -> StoreResult<()> {
        if self.bounds.contains(addr, len) {
            Ok(())
        } else {
            Err(StoreError::OutOfRegion { addr, len })
        }
    }

    /// Never issue on top of an operation still in flight, e.g. one that timed out earlier.
    /// Its completion event belongs to nobody anymore and is dropped.
    fn wait_idle(&mut self, op: FlashOp) -> StoreResult<()> {
        let Self { device, delay, waiter, .. } = self;
        waiter.wait_for(delay, op, || {
            if device.is_busy() { Err(nb::Error::WouldBlock) } else { Ok(()) }
        })?;
        if let Some(stale) = self.device.take_event() {
            debug!("dropping stale {} event for 0x{:x}", stale.op, stale.addr);
        }
        Ok(())
    }

    fn complete(&mut self, op: FlashOp) -> StoreResult<()> {
        let Self { device, delay, waiter, .. } = self;
        let event = waiter.wait_for(delay, op, || device.poll_completion())?;
        match event {
            Some(event) if event.op != op => {
                error!("expected {} completion, got {}", op, event.op);
                Err(StoreError::UnexpectedEvent { expected: op, got: event.op })
            }
            Some(event) => self.on_event(&event),
            None => {
                debug!("{} finished without a completion event", op);
                Ok(())
            }
        }
    }

    fn print_flash_info(&self) {
        let geometry = self.device.geometry();
        info!("========| flash info |========");
        info!("erase unit: \t{} bytes", geometry.erase_unit);
        info!("program unit: \t{} bytes", geometry.program_unit);
        info!("region: \t0x{:08x}..0x{:08x}", self.bounds.start_addr, self.bounds.end_addr);
        info!("==============================");
    }
}
