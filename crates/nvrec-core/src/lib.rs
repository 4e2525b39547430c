#![no_std]
#![forbid(unsafe_code)]
#[cfg(feature = "std")]
extern crate std;

mod record;
pub use record::{Mirror, Record, RecordId};

/// Tag marking a slot that holds caller-written data.
pub const VALID_TAG: u32 = 0x0000_0EDC;

/// Word pattern of a never-programmed flash cell.
pub const ERASED_WORD: u32 = 0xFFFF_FFFF;

/// Serialized size of one record: tag word followed by value word.
pub const RECORD_SIZE: usize = 8;

/// Active records in the mirror.
pub const RECORD_COUNT: usize = 16;

// One 4 KiB page holds 512 records; past that the layout needs more than one erase unit.
pub const MAX_RECORDS: usize = 512;

pub const MIRROR_BYTES: usize = RECORD_COUNT * RECORD_SIZE;

// Default placement: the last page below the application area.
pub const APPLICATION_AREA_END: u32 = 0x0007_8000;
pub const PAGE_SIZE: u32 = 0x1000;

const _: () = assert!(RECORD_COUNT <= MAX_RECORDS);
const _: () = assert!(MIRROR_BYTES <= PAGE_SIZE as usize);

/// Kind of device operation, carried by completion events and errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashOp {
    Write,
    Erase,
    Read,
    Other,
}

impl core::fmt::Display for FlashOp {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            FlashOp::Write => "write",
            FlashOp::Erase => "erase",
            FlashOp::Read => "read",
            FlashOp::Other => "other",
        };
        f.write_str(name)
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreError {
    /// The driver could not be bound to the region. Unrecoverable.
    DeviceInit,
    /// The device refused to queue the operation.
    Rejected { op: FlashOp },
    /// The completion event reported a failure.
    Device { op: FlashOp, addr: u32, code: u32 },
    /// The device stayed busy past the wait bound.
    Timeout { op: FlashOp },
    /// The completion event was for a different operation than the one issued.
    UnexpectedEvent { expected: FlashOp, got: FlashOp },
    OutOfRegion { addr: u32, len: usize },
    InvalidRegion,
    InvalidRecordId(usize),
}

impl core::fmt::Display for StoreError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            StoreError::DeviceInit => write!(f, "flash device initialization failed"),
            StoreError::Rejected { op } => write!(f, "device rejected {} request", op),
            StoreError::Device { op, addr, code } => {
                write!(f, "{} at 0x{:08x} failed with code {}", op, addr, code)
            }
            StoreError::Timeout { op } => write!(f, "{} did not complete in time", op),
            StoreError::UnexpectedEvent { expected, got } => {
                write!(f, "expected {} completion, device reported {}", expected, got)
            }
            StoreError::OutOfRegion { addr, len } => {
                write!(f, "access of {} bytes at 0x{:08x} leaves the region", len, addr)
            }
            StoreError::InvalidRegion => write!(f, "region does not match device geometry"),
            StoreError::InvalidRecordId(idx) => write!(f, "record index {} out of range", idx),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for StoreError {}
