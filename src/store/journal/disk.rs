//! Disk-based Journal Implementation
//!
//! Append-only `journal.log` inside the journal directory. Frame layout:
//!
//! ```text
//! [payload len: u32 LE][crc32 of payload: u32 LE][bincode(JournalEntry)]
//! ```
//!
//! Every append is flushed before returning. On open the file is scanned; a
//! torn or corrupt tail is cut off so later appends stay readable.

use super::{Journal, JournalEntry, JournalOp, Lsn};
use crate::error::Result;
use parking_lot::Mutex;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

pub const JOURNAL_FILE: &str = "journal.log";
const FRAME_HEADER: usize = 8;
const MAX_FRAME: usize = 64 * 1024 * 1024;

/// Borrowing twin of `JournalEntry`, encodes to the same bytes
#[derive(Serialize)]
struct EntryRef<'a> {
    lsn: Lsn,
    op: &'a JournalOp,
}

/// Disk-based journal, one flush per record
pub struct DiskJournal {
    file: Mutex<BufWriter<File>>,
    path: PathBuf,
    lsn: AtomicU64,
    size: AtomicU64,
}

impl DiskJournal {
    /// Create or open the journal inside `dir`
    pub fn new(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(JOURNAL_FILE);
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)?;

        let (entries, valid_len) = Self::read_frames(&path)?;
        let file_len = file.metadata()?.len();
        if valid_len < file_len {
            warn!(
                path = %path.display(),
                valid_len,
                file_len,
                "journal has a torn tail, truncating"
            );
            file.set_len(valid_len)?;
        }

        let lsn = entries.last().map(|e| e.lsn + 1).unwrap_or(0);
        debug!(path = %path.display(), entries = entries.len(), "journal opened");

        Ok(Self {
            file: Mutex::new(BufWriter::new(file)),
            path,
            lsn: AtomicU64::new(lsn),
            size: AtomicU64::new(valid_len),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parse every intact frame. Returns the entries and the byte length they span.
    fn read_frames(path: &Path) -> Result<(Vec<JournalEntry>, u64)> {
        let bytes = std::fs::read(path)?;
        let mut entries = Vec::new();
        let mut offset = 0usize;

        while offset + FRAME_HEADER <= bytes.len() {
            let len = u32::from_le_bytes([
                bytes[offset],
                bytes[offset + 1],
                bytes[offset + 2],
                bytes[offset + 3],
            ]) as usize;
            let crc = u32::from_le_bytes([
                bytes[offset + 4],
                bytes[offset + 5],
                bytes[offset + 6],
                bytes[offset + 7],
            ]);

            let start = offset + FRAME_HEADER;
            if len == 0 || len > MAX_FRAME || start + len > bytes.len() {
                break;
            }
            let payload = &bytes[start..start + len];
            if crc32fast::hash(payload) != crc {
                break;
            }
            let Ok(entry) = bincode::deserialize::<JournalEntry>(payload) else {
                break;
            };

            entries.push(entry);
            offset = start + len;
        }

        Ok((entries, offset as u64))
    }

    fn encode_frame(lsn: Lsn, op: &JournalOp) -> Result<Vec<u8>> {
        let payload = bincode::serialize(&EntryRef { lsn, op })?;
        let mut frame = Vec::with_capacity(FRAME_HEADER + payload.len());
        frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        frame.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
        frame.extend_from_slice(&payload);
        Ok(frame)
    }
}

impl Drop for DiskJournal {
    fn drop(&mut self) {
        let _ = self.file.lock().flush();
    }
}

impl Journal for DiskJournal {
    fn append(&self, op: &JournalOp) -> Result<Lsn> {
        // LSN order must match file order
        let mut file = self.file.lock();
        let lsn = self.lsn.load(Ordering::Acquire);
        let frame = Self::encode_frame(lsn, op)?;

        file.write_all(&frame)?;
        file.flush()?;

        self.lsn.store(lsn + 1, Ordering::Release);
        self.size.fetch_add(frame.len() as u64, Ordering::Relaxed);
        Ok(lsn)
    }

    fn sync(&self) -> Result<()> {
        let mut file = self.file.lock();
        file.flush()?;
        file.get_ref().sync_all()?;
        Ok(())
    }

    fn replay(&self) -> Result<Vec<JournalEntry>> {
        self.file.lock().flush()?;
        Ok(Self::read_frames(&self.path)?.0)
    }

    fn size_bytes(&self) -> u64 {
        self.size.load(Ordering::Relaxed)
    }

    fn current_lsn(&self) -> Lsn {
        self.lsn.load(Ordering::Acquire)
    }

    fn is_enabled(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Cell;
    use tempfile::tempdir;

    fn put_op(row: &str) -> JournalOp {
        JournalOp::Put {
            table: "employees".into(),
            row: row.as_bytes().to_vec(),
            family: "profile".into(),
            cells: vec![(b"dept".to_vec(), Cell::new("eng", 7))],
        }
    }

    #[test]
    fn test_disk_journal_append_and_replay() {
        let dir = tempdir().unwrap();
        let journal = DiskJournal::new(dir.path()).unwrap();

        assert_eq!(journal.append(&put_op("e1")).unwrap(), 0);
        assert_eq!(journal.append(&put_op("e2")).unwrap(), 1);
        journal.sync().unwrap();

        let entries = journal.replay().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].lsn, 1);
        assert_eq!(entries[1].op, put_op("e2"));
        assert!(journal.size_bytes() > 0);
        assert!(journal.is_enabled());
    }

    #[test]
    fn test_reopen_continues_lsn() {
        let dir = tempdir().unwrap();
        {
            let journal = DiskJournal::new(dir.path()).unwrap();
            journal.append(&put_op("e1")).unwrap();
            journal.append(&put_op("e2")).unwrap();
        }

        let journal = DiskJournal::new(dir.path()).unwrap();
        assert_eq!(journal.current_lsn(), 2);
        assert_eq!(journal.append(&put_op("e3")).unwrap(), 2);
        assert_eq!(journal.replay().unwrap().len(), 3);
    }

    #[test]
    fn test_torn_tail_is_truncated() {
        let dir = tempdir().unwrap();
        {
            let journal = DiskJournal::new(dir.path()).unwrap();
            journal.append(&put_op("e1")).unwrap();
        }

        // Half-written frame after the good one
        let path = dir.path().join(JOURNAL_FILE);
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&[42, 0, 0, 0, 1, 2]).unwrap();
        drop(file);

        let journal = DiskJournal::new(dir.path()).unwrap();
        assert_eq!(journal.current_lsn(), 1);
        journal.append(&put_op("e2")).unwrap();

        let entries = journal.replay().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].op, put_op("e2"));
    }

    #[test]
    fn test_corrupt_payload_stops_replay() {
        let dir = tempdir().unwrap();
        {
            let journal = DiskJournal::new(dir.path()).unwrap();
            journal.append(&put_op("e1")).unwrap();
            journal.append(&put_op("e2")).unwrap();
        }

        let path = dir.path().join(JOURNAL_FILE);
        let mut bytes = std::fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        std::fs::write(&path, &bytes).unwrap();

        let journal = DiskJournal::new(dir.path()).unwrap();
        assert_eq!(journal.replay().unwrap().len(), 1);
    }
}
