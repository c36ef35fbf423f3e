//! Bounded ring of serialized statistics windows backing the
//! dashboard's `/bms/stats/data` endpoint.

use std::io::{self, Write};

use parking_lot::Mutex;

/// Seconds of statistics history kept for the dashboard.
pub const HISTORY_SECONDS: usize = 60;
/// Maximum statistics windows produced per second (fault mode).
pub const MAX_WINDOWS_PER_SEC: usize = 4;
/// History ring capacity.
pub const HISTORY_CAPACITY: usize = HISTORY_SECONDS * MAX_WINDOWS_PER_SEC;

/// Maximum bytes of one serialized window kept in the ring.
pub const HISTORY_ENTRY_MAXLEN: usize = 512;

#[derive(Clone)]
struct HistEntry {
    payload: [u8; HISTORY_ENTRY_MAXLEN],
    len: usize,
}

impl HistEntry {
    const EMPTY: HistEntry = HistEntry {
        payload: [0; HISTORY_ENTRY_MAXLEN],
        len: 0,
    };
}

struct HistInner {
    items: Box<[HistEntry]>,
    /// Next write position.
    head: usize,
    /// Valid entries.
    count: usize,
}

/// FIFO-with-overwrite ring of text payloads.
pub struct HistoryRing {
    inner: Mutex<HistInner>,
    capacity: usize,
}

impl Default for HistoryRing {
    fn default() -> Self {
        Self::new()
    }
}

impl HistoryRing {
    pub fn new() -> Self {
        Self::with_capacity(HISTORY_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(HistInner {
                items: vec![HistEntry::EMPTY; capacity].into_boxed_slice(),
                head: 0,
                count: 0,
            }),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().count
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Value-copy one payload into the next slot, overwriting the oldest
    /// entry when the ring is full. Payloads longer than
    /// [`HISTORY_ENTRY_MAXLEN`] - 1 bytes are truncated.
    pub fn push(&self, payload: &[u8]) {
        if payload.is_empty() {
            return;
        }
        let len = payload.len().min(HISTORY_ENTRY_MAXLEN - 1);

        let mut inner = self.inner.lock();
        let head = inner.head;
        inner.items[head].payload[..len].copy_from_slice(&payload[..len]);
        inner.items[head].len = len;
        inner.head = (head + 1) % self.capacity;
        if inner.count < self.capacity {
            inner.count += 1;
        }
    }

    /// Stream the ring as a JSON array in FIFO order.
    ///
    /// `(head, count)` are captured under the lock, then the lock is
    /// released around every chunk write and re-entered only to copy one
    /// entry's bytes out. A concurrent push may overwrite entries not
    /// yet copied; the output stays parseable, older entries may come
    /// out stale.
    pub fn render_as_json_array(&self, sink: &mut dyn Write) -> io::Result<()> {
        sink.write_all(b"[")?;

        let (head, count) = {
            let inner = self.inner.lock();
            (inner.head, inner.count)
        };
        let start = (head + self.capacity - count) % self.capacity;

        let mut entry = [0u8; HISTORY_ENTRY_MAXLEN];
        for i in 0..count {
            if i != 0 {
                sink.write_all(b",")?;
            }

            let idx = (start + i) % self.capacity;
            let len = {
                let inner = self.inner.lock();
                let len = inner.items[idx].len.min(HISTORY_ENTRY_MAXLEN - 1);
                entry[..len].copy_from_slice(&inner.items[idx].payload[..len]);
                len
            };

            if len > 0 {
                sink.write_all(&entry[..len])?;
            }
        }

        sink.write_all(b"]")
    }
}
