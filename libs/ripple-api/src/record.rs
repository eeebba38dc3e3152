/// Opaque frame as delivered by the transport. `tag` identifies the schema
/// of `payload`; nothing else about the bytes is known at this level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    pub tag: u8,
    pub payload: Vec<u8>,
}

impl RawFrame {
    pub fn new(tag: u8, payload: impl Into<Vec<u8>>) -> Self {
        Self { tag, payload: payload.into() }
    }
}

/// A decoded sensor reading.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Measured value (noise level).
    pub value: f32,
    /// Capture time, milliseconds since the Unix epoch.
    pub timestamp: i64,
    /// Origin of the reading.
    pub source: String,
}

/// Immutable snapshot of one closed window.
///
/// Never empty: the accumulator does not close empty windows.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    window: u64,
    records: Vec<Record>,
}

impl Batch {
    /// Returns `None` for an empty record list.
    pub fn new(window: u64, records: Vec<Record>) -> Option<Self> {
        if records.is_empty() {
            return None;
        }
        Some(Self { window, records })
    }

    /// 1-based sequence number of the window this batch was taken from.
    pub fn window(&self) -> u64 {
        self.window
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
