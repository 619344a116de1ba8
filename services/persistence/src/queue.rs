//! Event queue — append-only matcher command log
//!
//! Exactly one producer per deployment appends commands; a single consumer
//! reads them back in offset order and acknowledges batches. Offsets are
//! dense and start at 1.
//!
//! The local transport is a single append-only file of framed records:
//!
//! ```text
//! [payload_len: u32][payload: bincode(QueueEventWithMeta)][checksum: u32]
//! ```
//!
//! The checksum is CRC32C over the payload. Recovery scans from the start
//! and truncates at the first damaged or incomplete record, so a crash
//! mid-append loses at most the torn tail. The consumer's acknowledged
//! offset lives in a sibling file, rewritten atomically on each ack.

use crc32c::crc32c;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::warn;
use types::{QueueEvent, QueueEventWithMeta};

// ── Errors ──────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("codec error: {0}")]
    Codec(String),

    #[error("close timed out")]
    Timeout,
}

// ── Contract ────────────────────────────────────────────────────────

/// Totally ordered, at-least-once command log.
///
/// The consumer deduplicates by offset (and by order id for placements);
/// producers pass a client request id so a retried append cannot assign a
/// second offset to the same command.
pub trait EventQueue: Send + Sync {
    /// Durably append an event. Returns the assigned `(offset, timestamp)`.
    /// Retrying with the same `request_id` returns the original assignment.
    fn append(&self, event: QueueEvent, request_id: &str) -> Result<(u64, u64), QueueError>;

    /// Highest offset assigned to any event (0 when empty).
    fn last_event_offset(&self) -> Result<u64, QueueError>;

    /// Highest offset whose consumption has been acknowledged.
    fn last_processed_offset(&self) -> Result<u64, QueueError>;

    /// Events in offset order starting at `from_offset`, at most `max`.
    fn poll(&self, from_offset: u64, max: usize) -> Result<Vec<QueueEventWithMeta>, QueueError>;

    /// Acknowledge consumption up to and including `offset`.
    fn commit(&self, offset: u64) -> Result<(), QueueError>;

    /// Flush and release. Fails with `Timeout` if the producer cannot be
    /// quiesced in time.
    fn close(&self, timeout: Duration) -> Result<(), QueueError>;
}

// ── Record framing ──────────────────────────────────────────────────

const HEADER_LEN: usize = 4;
const TRAILER_LEN: usize = 4;
// Guards the scanner against interpreting garbage as a huge length.
const MAX_RECORD_LEN: usize = 16 * 1024 * 1024;

fn encode_record(meta: &QueueEventWithMeta) -> Result<Vec<u8>, QueueError> {
    let payload = bincode::serialize(meta).map_err(|e| QueueError::Codec(e.to_string()))?;
    let mut buf = Vec::with_capacity(HEADER_LEN + payload.len() + TRAILER_LEN);
    buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    buf.extend_from_slice(&payload);
    buf.extend_from_slice(&crc32c(&payload).to_le_bytes());
    Ok(buf)
}

/// Decode the record starting at `pos`. Returns the event and the position
/// just past it, or `None` when the remaining bytes do not form a whole,
/// intact record (the truncation point).
fn decode_at(data: &[u8], pos: usize) -> Option<(QueueEventWithMeta, usize)> {
    let rest = data.get(pos..)?;
    if rest.len() < HEADER_LEN {
        return None;
    }
    let len = u32::from_le_bytes(rest[..4].try_into().ok()?) as usize;
    if len == 0 || len > MAX_RECORD_LEN {
        return None;
    }
    let total = HEADER_LEN + len + TRAILER_LEN;
    if rest.len() < total {
        return None;
    }
    let payload = &rest[HEADER_LEN..HEADER_LEN + len];
    let stored = u32::from_le_bytes(rest[HEADER_LEN + len..total].try_into().ok()?);
    if crc32c(payload) != stored {
        return None;
    }
    let meta: QueueEventWithMeta = bincode::deserialize(payload).ok()?;
    Some((meta, pos + total))
}

// ── Local transport ─────────────────────────────────────────────────

const EVENTS_FILE: &str = "events.log";
const OFFSET_FILE: &str = "consumer.offset";
const REQUEST_MEMO_CAPACITY: usize = 1024;

struct Producer {
    writer: BufWriter<File>,
    last_offset: u64,
    /// Bounded request-id memo for append idempotency.
    memo: HashMap<String, (u64, u64)>,
    memo_order: VecDeque<String>,
}

struct ReadCursor {
    /// Byte position of the next unread record.
    pos: u64,
    /// Offset of the record at `pos`.
    next_offset: u64,
}

/// Single-file embedded queue transport.
pub struct LocalQueue {
    dir: PathBuf,
    producer: Mutex<Producer>,
    cursor: Mutex<ReadCursor>,
    processed: Mutex<u64>,
}

impl LocalQueue {
    /// Open (or create) the queue under `dir`, recovering the valid prefix
    /// of an existing log.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, QueueError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        let log_path = dir.join(EVENTS_FILE);

        let (last_offset, valid_len, file_len) = Self::recover(&log_path)?;
        if valid_len < file_len {
            warn!(
                lost = file_len - valid_len,
                "truncating damaged tail of the event log"
            );
            let f = OpenOptions::new().write(true).open(&log_path)?;
            f.set_len(valid_len)?;
            f.sync_all()?;
        }

        let file = OpenOptions::new().create(true).append(true).open(&log_path)?;
        let processed = Self::read_committed(&dir)?;

        Ok(Self {
            dir,
            producer: Mutex::new(Producer {
                writer: BufWriter::new(file),
                last_offset,
                memo: HashMap::new(),
                memo_order: VecDeque::new(),
            }),
            cursor: Mutex::new(ReadCursor {
                pos: 0,
                next_offset: 1,
            }),
            processed: Mutex::new(processed),
        })
    }

    /// Append with an explicit timestamp. The trait's `append` stamps the
    /// wall clock; replay-sensitive tests pass their own.
    pub fn append_at(
        &self,
        event: QueueEvent,
        request_id: &str,
        timestamp: u64,
    ) -> Result<(u64, u64), QueueError> {
        let mut p = self.producer.lock();
        if let Some(&assigned) = p.memo.get(request_id) {
            return Ok(assigned);
        }

        let offset = p.last_offset + 1;
        let meta = QueueEventWithMeta {
            offset,
            timestamp,
            event,
        };
        let bytes = encode_record(&meta)?;
        p.writer.write_all(&bytes)?;
        p.writer.flush()?;
        p.writer.get_ref().sync_all()?;
        p.last_offset = offset;

        if p.memo_order.len() >= REQUEST_MEMO_CAPACITY {
            if let Some(evicted) = p.memo_order.pop_front() {
                p.memo.remove(&evicted);
            }
        }
        p.memo.insert(request_id.to_string(), (offset, timestamp));
        p.memo_order.push_back(request_id.to_string());

        Ok((offset, timestamp))
    }

    /// Scan the log, returning `(last offset, valid byte length, file length)`.
    fn recover(path: &Path) -> Result<(u64, u64, u64), QueueError> {
        if !path.exists() {
            return Ok((0, 0, 0));
        }
        let mut data = Vec::new();
        File::open(path)?.read_to_end(&mut data)?;

        let mut pos = 0usize;
        let mut last_offset = 0u64;
        while let Some((meta, next)) = decode_at(&data, pos) {
            last_offset = meta.offset;
            pos = next;
        }
        Ok((last_offset, pos as u64, data.len() as u64))
    }

    fn read_committed(dir: &Path) -> Result<u64, QueueError> {
        let path = dir.join(OFFSET_FILE);
        if !path.exists() {
            return Ok(0);
        }
        let mut buf = [0u8; 8];
        let mut f = File::open(path)?;
        match f.read_exact(&mut buf) {
            Ok(()) => Ok(u64::from_le_bytes(buf)),
            Err(_) => Ok(0),
        }
    }

    fn now_millis() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

impl EventQueue for LocalQueue {
    fn append(&self, event: QueueEvent, request_id: &str) -> Result<(u64, u64), QueueError> {
        self.append_at(event, request_id, Self::now_millis())
    }

    fn last_event_offset(&self) -> Result<u64, QueueError> {
        Ok(self.producer.lock().last_offset)
    }

    fn last_processed_offset(&self) -> Result<u64, QueueError> {
        Ok(*self.processed.lock())
    }

    fn poll(&self, from_offset: u64, max: usize) -> Result<Vec<QueueEventWithMeta>, QueueError> {
        let mut cur = self.cursor.lock();
        if from_offset != cur.next_offset {
            // Cold start or replay from another position: rescan.
            cur.pos = 0;
            cur.next_offset = 1;
        }

        let path = self.dir.join(EVENTS_FILE);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let mut file = File::open(path)?;
        file.seek(SeekFrom::Start(cur.pos))?;
        let mut data = Vec::new();
        file.read_to_end(&mut data)?;

        let mut out = Vec::new();
        let mut pos = 0usize;
        while out.len() < max {
            match decode_at(&data, pos) {
                Some((meta, next)) => {
                    pos = next;
                    cur.next_offset = meta.offset + 1;
                    if meta.offset >= from_offset {
                        out.push(meta);
                    }
                }
                None => break,
            }
        }
        cur.pos += pos as u64;
        Ok(out)
    }

    fn commit(&self, offset: u64) -> Result<(), QueueError> {
        let path = self.dir.join(OFFSET_FILE);
        let tmp = self.dir.join(format!("{}.tmp", OFFSET_FILE));
        {
            let mut f = File::create(&tmp)?;
            f.write_all(&offset.to_le_bytes())?;
            f.sync_all()?;
        }
        fs::rename(&tmp, &path)?;
        *self.processed.lock() = offset;
        Ok(())
    }

    fn close(&self, timeout: Duration) -> Result<(), QueueError> {
        let mut p = self.producer.try_lock_for(timeout).ok_or(QueueError::Timeout)?;
        p.writer.flush()?;
        p.writer.get_ref().sync_all()?;
        Ok(())
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use types::asset::{Asset, AssetId, AssetPair};
    use types::order::{Address, OrderId};

    fn pair(byte: u8) -> AssetPair {
        AssetPair::new(Asset::Issued(AssetId::new([byte; 32])), Asset::Native)
    }

    fn cancel_event(byte: u8) -> QueueEvent {
        QueueEvent::CancelOrder {
            pair: pair(byte),
            order_id: OrderId([byte; 32]),
            owner: Address([byte; 32]),
        }
    }

    #[test]
    fn test_append_assigns_dense_offsets() {
        let tmp = TempDir::new().unwrap();
        let queue = LocalQueue::open(tmp.path()).unwrap();

        for i in 1..=5u8 {
            let (offset, _) = queue
                .append_at(cancel_event(i), &format!("req-{}", i), 1_000 + i as u64)
                .unwrap();
            assert_eq!(offset, i as u64);
        }
        assert_eq!(queue.last_event_offset().unwrap(), 5);
    }

    #[test]
    fn test_retry_with_same_request_id_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let queue = LocalQueue::open(tmp.path()).unwrap();

        let first = queue.append_at(cancel_event(1), "req", 1_000).unwrap();
        let retry = queue.append_at(cancel_event(1), "req", 2_000).unwrap();
        assert_eq!(first, retry);
        assert_eq!(queue.last_event_offset().unwrap(), 1);
    }

    #[test]
    fn test_poll_returns_events_in_offset_order() {
        let tmp = TempDir::new().unwrap();
        let queue = LocalQueue::open(tmp.path()).unwrap();

        for i in 1..=10u8 {
            queue
                .append_at(cancel_event(i), &format!("r{}", i), 1_000)
                .unwrap();
        }

        let batch = queue.poll(1, 4).unwrap();
        assert_eq!(batch.len(), 4);
        assert_eq!(batch[0].offset, 1);
        assert_eq!(batch[3].offset, 4);

        // The cursor continues where the previous poll stopped.
        let batch = queue.poll(5, 100).unwrap();
        assert_eq!(batch.len(), 6);
        assert_eq!(batch[0].offset, 5);
        assert_eq!(batch[5].offset, 10);
    }

    #[test]
    fn test_poll_from_arbitrary_offset_rescans() {
        let tmp = TempDir::new().unwrap();
        let queue = LocalQueue::open(tmp.path()).unwrap();
        for i in 1..=6u8 {
            queue
                .append_at(cancel_event(i), &format!("r{}", i), 1_000)
                .unwrap();
        }

        let batch = queue.poll(4, 100).unwrap();
        assert_eq!(batch.iter().map(|m| m.offset).collect::<Vec<_>>(), vec![4, 5, 6]);
    }

    #[test]
    fn test_commit_and_last_processed_survive_reopen() {
        let tmp = TempDir::new().unwrap();
        {
            let queue = LocalQueue::open(tmp.path()).unwrap();
            queue.append_at(cancel_event(1), "r1", 1_000).unwrap();
            queue.append_at(cancel_event(2), "r2", 1_000).unwrap();
            queue.commit(2).unwrap();
        }

        let reopened = LocalQueue::open(tmp.path()).unwrap();
        assert_eq!(reopened.last_processed_offset().unwrap(), 2);
        assert_eq!(reopened.last_event_offset().unwrap(), 2);
    }

    #[test]
    fn test_recovery_truncates_torn_tail() {
        let tmp = TempDir::new().unwrap();
        {
            let queue = LocalQueue::open(tmp.path()).unwrap();
            for i in 1..=3u8 {
                queue
                    .append_at(cancel_event(i), &format!("r{}", i), 1_000)
                    .unwrap();
            }
        }

        // Simulate a crash mid-append: append half a record of garbage.
        let log = tmp.path().join(EVENTS_FILE);
        let mut data = fs::read(&log).unwrap();
        data.extend_from_slice(&[0x55, 0x00, 0x00, 0x00, 0x01, 0x02]);
        fs::write(&log, &data).unwrap();

        let reopened = LocalQueue::open(tmp.path()).unwrap();
        assert_eq!(reopened.last_event_offset().unwrap(), 3);
        let batch = reopened.poll(1, 100).unwrap();
        assert_eq!(batch.len(), 3);

        // New appends continue the dense sequence.
        let (offset, _) = reopened.append_at(cancel_event(4), "r4", 1_000).unwrap();
        assert_eq!(offset, 4);
    }

    #[test]
    fn test_corrupted_record_stops_the_scan() {
        let tmp = TempDir::new().unwrap();
        {
            let queue = LocalQueue::open(tmp.path()).unwrap();
            for i in 1..=3u8 {
                queue
                    .append_at(cancel_event(i), &format!("r{}", i), 1_000)
                    .unwrap();
            }
        }

        // Flip a payload byte in the middle record.
        let log = tmp.path().join(EVENTS_FILE);
        let mut data = fs::read(&log).unwrap();
        let record_len = data.len() / 3;
        data[record_len + 10] ^= 0xff;
        fs::write(&log, &data).unwrap();

        let reopened = LocalQueue::open(tmp.path()).unwrap();
        // Only the prefix before the damage survives.
        assert_eq!(reopened.last_event_offset().unwrap(), 1);
    }

    #[test]
    fn test_close_flushes() {
        let tmp = TempDir::new().unwrap();
        let queue = LocalQueue::open(tmp.path()).unwrap();
        queue.append_at(cancel_event(1), "r1", 1_000).unwrap();
        queue.close(Duration::from_secs(1)).unwrap();
    }

    #[test]
    fn test_decode_rejects_bad_checksum() {
        let meta = QueueEventWithMeta {
            offset: 1,
            timestamp: 7,
            event: cancel_event(1),
        };
        let mut bytes = encode_record(&meta).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        assert!(decode_at(&bytes, 0).is_none());
    }
}
