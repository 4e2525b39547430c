use nvrec_core::{FlashOp, StoreError, StoreResult};
use nvrec_flash::{FlashRegion, RegionConfig, WaitPolicy};
use nvrec_hal::{BlockStorage, FlashEvent, FlashGeometry, FlashResult, PlatformDelay, RegionBounds};
use std::sync::atomic::{AtomicU32, Ordering};

const BASE: u32 = 0x77000;
const PAGE: u32 = 0x1000;

// --- MOCKS ---
struct ScriptedFlash {
    mem: Vec<u8>,
    erase_unit: u32,
    busy: AtomicU32,
    busy_per_op: u32,
    hang: bool,
    fail_op: Option<FlashOp>,
    init_fails: bool,
    misreport: Option<FlashOp>,
    bound: bool,
    pending: Option<FlashEvent>,
    issued: Vec<(FlashOp, u32)>,
}

impl ScriptedFlash {
    fn new() -> Self {
        Self {
            mem: vec![0xFF; PAGE as usize],
            erase_unit: PAGE,
            busy: AtomicU32::new(0),
            busy_per_op: 0,
            hang: false,
            fail_op: None,
            init_fails: false,
            misreport: None,
            bound: false,
            pending: None,
            issued: Vec::new(),
        }
    }

    fn issue(&mut self, op: FlashOp, addr: u32, len: u32) {
        self.issued.push((op, len));
        self.busy.store(if self.hang { u32::MAX } else { self.busy_per_op }, Ordering::SeqCst);
        let result = if self.fail_op == Some(op) { FlashResult::Failure(3) } else { FlashResult::Success };
        let reported = self.misreport.unwrap_or(op);
        self.pending = Some(FlashEvent { op: reported, result, addr, len });
    }
}

impl BlockStorage for ScriptedFlash {
    fn init(&mut self, _: &RegionBounds) -> StoreResult<()> {
        if self.init_fails {
            return Err(StoreError::Rejected { op: FlashOp::Other });
        }
        self.bound = true;
        Ok(())
    }

    fn geometry(&self) -> FlashGeometry {
        FlashGeometry { erase_unit: self.erase_unit, program_unit: 4 }
    }

    fn erase(&mut self, addr: u32, pages: u32) -> StoreResult<()> {
        let off = (addr - BASE) as usize;
        self.mem[off..off + (pages * PAGE) as usize].fill(0xFF);
        self.issue(FlashOp::Erase, addr, pages);
        Ok(())
    }

    fn write(&mut self, addr: u32, data: &[u8]) -> StoreResult<()> {
        let off = (addr - BASE) as usize;
        for (cell, b) in self.mem[off..off + data.len()].iter_mut().zip(data) {
            *cell &= *b;
        }
        self.issue(FlashOp::Write, addr, data.len() as u32);
        Ok(())
    }

    fn read(&mut self, addr: u32, buf: &mut [u8]) -> StoreResult<()> {
        let off = (addr - BASE) as usize;
        buf.copy_from_slice(&self.mem[off..off + buf.len()]);
        self.issue(FlashOp::Read, addr, buf.len() as u32);
        Ok(())
    }

    fn is_busy(&self) -> bool {
        let left = self.busy.load(Ordering::SeqCst);
        if left == 0 {
            return false;
        }
        if left != u32::MAX {
            self.busy.store(left - 1, Ordering::SeqCst);
        }
        true
    }

    fn take_event(&mut self) -> Option<FlashEvent> {
        self.pending.take()
    }
}

#[derive(Default)]
struct CountingDelay {
    calls: u32,
    total_ms: u32,
}

impl PlatformDelay for CountingDelay {
    fn delay_ms(&mut self, ms: u32) {
        self.calls += 1;
        self.total_ms += ms;
    }
}

fn region(dev: ScriptedFlash) -> FlashRegion<ScriptedFlash, CountingDelay> {
    let config = RegionConfig { start_addr: BASE, page_size: PAGE, pages: 1 };
    FlashRegion::new(dev, CountingDelay::default(), config, WaitPolicy::default())
}

#[test]
fn test_init_binds_region() {
    let mut r = region(ScriptedFlash::new());
    r.init().unwrap();

    assert_eq!(r.start_addr(), BASE);
    assert_eq!(r.end_addr(), BASE + PAGE);
    assert_eq!(r.geometry().erase_unit, PAGE);
    assert_eq!(r.policy(), WaitPolicy::default());
    assert_eq!(r.policy().budget_ms(), 500);
}

#[test]
fn test_init_failure_is_fatal() {
    let mut dev = ScriptedFlash::new();
    dev.init_fails = true;
    let mut r = region(dev);

    assert_eq!(r.init(), Err(StoreError::DeviceInit));
}

#[test]
fn test_geometry_mismatch_rejected() {
    let mut dev = ScriptedFlash::new();
    dev.erase_unit = 0x800; // Region page no longer one erase unit
    let mut r = region(dev);

    assert_eq!(r.init(), Err(StoreError::InvalidRegion));

    // Checked before the driver is bound
    let (dev, _) = r.into_parts();
    assert!(!dev.bound);
    assert!(dev.issued.is_empty());
}

#[test]
fn test_erase_write_read_cycle() {
    let mut r = region(ScriptedFlash::new());
    r.init().unwrap();

    r.erase(BASE, 1).unwrap();
    r.write(BASE + 8, &[0xDC, 0x0E, 0, 0, 0x78, 0x56, 0x34, 0x12]).unwrap();

    let mut buf = [0u8; 16];
    r.read(BASE, &mut buf).unwrap();
    assert_eq!(&buf[0..8], &[0xFF; 8]);
    assert_eq!(&buf[8..16], &[0xDC, 0x0E, 0, 0, 0x78, 0x56, 0x34, 0x12]);

    let (dev, _) = r.into_parts();
    assert_eq!(dev.issued, vec![(FlashOp::Erase, 1), (FlashOp::Write, 8), (FlashOp::Read, 16)]);
}

#[test]
fn test_out_of_region_never_reaches_device() {
    let mut r = region(ScriptedFlash::new());
    r.init().unwrap();

    let mut buf = [0u8; 16];
    assert_eq!(
        r.read(BASE + PAGE - 8, &mut buf),
        Err(StoreError::OutOfRegion { addr: BASE + PAGE - 8, len: 16 })
    );
    assert!(matches!(r.write(BASE - 4, &[0; 4]), Err(StoreError::OutOfRegion { .. })));
    assert!(matches!(r.erase(BASE, 2), Err(StoreError::OutOfRegion { .. })));

    let (dev, _) = r.into_parts();
    assert!(dev.issued.is_empty());
}

#[test]
fn test_busy_device_is_polled_with_delay() {
    let mut dev = ScriptedFlash::new();
    dev.busy_per_op = 3;
    let mut r = region(dev);
    r.init().unwrap();

    r.erase(BASE, 1).unwrap();

    let (_, delay) = r.into_parts();
    assert_eq!(delay.calls, 3);
    assert_eq!(delay.total_ms, 6);
}

#[test]
fn test_hung_device_times_out() {
    let mut r = region(ScriptedFlash::new());
    r.init().unwrap();

    // Wedge the device after init
    let (mut dev, delay) = r.into_parts();
    dev.hang = true;
    let config = RegionConfig { start_addr: BASE, page_size: PAGE, pages: 1 };
    let policy = WaitPolicy { poll_interval_ms: 2, max_polls: 10 };
    let mut r = FlashRegion::new(dev, delay, config, policy);

    assert_eq!(r.erase(BASE, 1), Err(StoreError::Timeout { op: FlashOp::Erase }));

    let (_, delay) = r.into_parts();
    assert_eq!(delay.calls, 10);
}

#[test]
fn test_failed_completion_is_reported() {
    let mut dev = ScriptedFlash::new();
    dev.fail_op = Some(FlashOp::Write);
    let mut r = region(dev);
    r.init().unwrap();

    r.erase(BASE, 1).unwrap();
    assert_eq!(
        r.write(BASE, &[0; 8]),
        Err(StoreError::Device { op: FlashOp::Write, addr: BASE, code: 3 })
    );
}

#[test]
fn test_on_event_logs_success() {
    let r = region(ScriptedFlash::new());
    let ok = FlashEvent { op: FlashOp::Erase, result: FlashResult::Success, addr: BASE, len: 1 };
    assert!(r.on_event(&ok).is_ok());
}

#[test]
fn test_page_read_is_one_bulk_transfer() {
    let mut r = region(ScriptedFlash::new());
    r.init().unwrap();

    let mut page = vec![0u8; PAGE as usize];
    r.read(BASE, &mut page).unwrap();

    let (dev, _) = r.into_parts();
    assert_eq!(dev.issued, vec![(FlashOp::Read, PAGE)]);
}

fn slow_region(busy_per_op: u32) -> FlashRegion<ScriptedFlash, CountingDelay> {
    let mut dev = ScriptedFlash::new();
    dev.busy_per_op = busy_per_op;
    let config = RegionConfig { start_addr: BASE, page_size: PAGE, pages: 1 };
    let policy = WaitPolicy { poll_interval_ms: 1, max_polls: 3 };
    let mut r = FlashRegion::new(dev, CountingDelay::default(), config, policy);
    r.init().unwrap();
    r
}

#[test]
fn test_no_issue_while_previous_op_in_flight() {
    let mut r = slow_region(20);

    assert_eq!(r.erase(BASE, 1), Err(StoreError::Timeout { op: FlashOp::Erase }));
    // The erase is still running; the write must wait for it, not pile on
    assert_eq!(r.write(BASE, &[0; 8]), Err(StoreError::Timeout { op: FlashOp::Write }));

    let (dev, delay) = r.into_parts();
    assert_eq!(dev.issued, vec![(FlashOp::Erase, 1)]);
    assert_eq!(delay.calls, 6);
}

#[test]
fn test_next_op_runs_once_timed_out_op_drains() {
    let mut r = slow_region(5);
    assert_eq!(r.erase(BASE, 1), Err(StoreError::Timeout { op: FlashOp::Erase }));

    let (mut dev, delay) = r.into_parts();
    dev.busy_per_op = 0;
    let config = RegionConfig { start_addr: BASE, page_size: PAGE, pages: 1 };
    let mut r = FlashRegion::new(dev, delay, config, WaitPolicy::default());

    // The late erase event is discarded, the write gets its own
    r.write(BASE, &[0; 8]).unwrap();

    let (dev, _) = r.into_parts();
    assert_eq!(dev.issued, vec![(FlashOp::Erase, 1), (FlashOp::Write, 8)]);
    assert!(dev.pending.is_none());
}

#[test]
fn test_event_for_other_op_is_error() {
    let mut dev = ScriptedFlash::new();
    dev.misreport = Some(FlashOp::Read);
    let mut r = region(dev);
    r.init().unwrap();

    assert_eq!(
        r.erase(BASE, 1),
        Err(StoreError::UnexpectedEvent { expected: FlashOp::Erase, got: FlashOp::Read })
    );
}
