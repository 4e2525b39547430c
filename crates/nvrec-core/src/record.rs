use crate::{StoreError, StoreResult, ERASED_WORD, MIRROR_BYTES, RECORD_COUNT, RECORD_SIZE, VALID_TAG};

/// One persisted slot: tag word then value word, little-endian on flash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Record {
    pub tag: u32,
    pub value: u32,
}

impl Record {
    /// What an erased page decodes to. Never valid.
    pub const ERASED: Record = Record { tag: ERASED_WORD, value: ERASED_WORD };

    pub fn new(value: u32) -> Self {
        Self { tag: VALID_TAG, value }
    }

    pub fn is_valid(&self) -> bool {
        self.tag == VALID_TAG
    }

    pub fn value(&self) -> Option<u32> {
        if self.is_valid() { Some(self.value) } else { None }
    }

    fn write_to(&self, buf: &mut [u8]) {
        buf[0..4].copy_from_slice(&self.tag.to_le_bytes());
        buf[4..8].copy_from_slice(&self.value.to_le_bytes());
    }

    fn read_from(buf: &[u8]) -> Self {
        Self {
            tag: u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]),
            value: u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]),
        }
    }
}

/// Index of a record slot. Extend the list (up to `MAX_RECORDS`) together with `RECORD_COUNT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u16)]
pub enum RecordId {
    Id00,
    Id01,
    Id02,
    Id03,
    Id04,
    Id05,
    Id06,
    Id07,
    Id08,
    Id09,
    Id10,
    Id11,
    Id12,
    Id13,
    Id14,
    Id15,
}

impl RecordId {
    pub const ALL: [RecordId; RECORD_COUNT] = [
        RecordId::Id00, RecordId::Id01, RecordId::Id02, RecordId::Id03,
        RecordId::Id04, RecordId::Id05, RecordId::Id06, RecordId::Id07,
        RecordId::Id08, RecordId::Id09, RecordId::Id10, RecordId::Id11,
        RecordId::Id12, RecordId::Id13, RecordId::Id14, RecordId::Id15,
    ];

    pub const LAST: RecordId = RecordId::Id15;

    pub fn index(self) -> usize {
        self as usize
    }

    /// Byte offset of this record from the region start.
    pub fn offset(self) -> u32 {
        (self.index() * RECORD_SIZE) as u32
    }
}

impl TryFrom<usize> for RecordId {
    type Error = StoreError;

    fn try_from(idx: usize) -> StoreResult<Self> {
        RecordId::ALL.get(idx).copied().ok_or(StoreError::InvalidRecordId(idx))
    }
}

impl core::fmt::Display for RecordId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:02}", self.index())
    }
}

/// RAM copy of every record, in index order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mirror {
    records: [Record; RECORD_COUNT],
}

impl Default for Mirror {
    fn default() -> Self {
        Self::erased()
    }
}

impl Mirror {
    pub fn erased() -> Self {
        Self { records: [Record::ERASED; RECORD_COUNT] }
    }

    pub fn record(&self, id: RecordId) -> &Record {
        &self.records[id.index()]
    }

    pub fn set(&mut self, id: RecordId, value: u32) {
        self.records[id.index()] = Record::new(value);
    }

    pub fn clear(&mut self, id: RecordId) {
        self.records[id.index()] = Record::ERASED;
    }

    /// Serialized flash image of the whole mirror.
    pub fn to_bytes(&self) -> [u8; MIRROR_BYTES] {
        let mut out = [0u8; MIRROR_BYTES];
        for (rec, chunk) in self.records.iter().zip(out.chunks_exact_mut(RECORD_SIZE)) {
            rec.write_to(chunk);
        }
        out
    }

    /// Decodes the first `RECORD_COUNT` records of `buf`. Bytes past them are ignored.
    pub fn from_bytes(buf: &[u8]) -> StoreResult<Self> {
        if buf.len() < MIRROR_BYTES {
            return Err(StoreError::InvalidRegion);
        }
        let mut mirror = Self::erased();
        for (rec, chunk) in mirror.records.iter_mut().zip(buf.chunks_exact(RECORD_SIZE)) {
            *rec = Record::read_from(chunk);
        }
        Ok(mirror)
    }
}
