use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// One hour of samples at the rawlog writer's usual 10-second cadence.
/// Entries are grown in chunks of this size to amortise reallocation,
/// mirroring the original cache's `RECORDS_TRUNK`.
const RECORDS_TRUNK: usize = 360;

/// A single `(timestamp, file offset)` pair. Immutable once appended,
/// except that a full re-sort may change its position in `FileIndex::entries`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordIndexEntry {
    pub time: i64,
    pub off: i64,
}

/// The ordered index of one rawlog file.
#[derive(Debug, Clone)]
pub struct FileIndex {
    name: PathBuf,
    flags: u32,
    entries: Vec<RecordIndexEntry>,
    st_size: u64,
    st_mtime: Option<SystemTime>,
}

impl FileIndex {
    pub(crate) fn new(name: PathBuf) -> Self {
        FileIndex {
            name,
            flags: 0,
            entries: Vec::with_capacity(RECORDS_TRUNK),
            st_size: 0,
            st_mtime: None,
        }
    }

    pub fn name(&self) -> &Path {
        &self.name
    }

    pub fn flags(&self) -> u32 {
        self.flags
    }

    pub fn set_flags(&mut self, flags: u32) {
        self.flags = flags;
    }

    pub fn entries(&self) -> &[RecordIndexEntry] {
        &self.entries
    }

    pub fn st_size(&self) -> u64 {
        self.st_size
    }

    pub fn st_mtime(&self) -> Option<SystemTime> {
        self.st_mtime
    }

    pub fn set_metadata(&mut self, st_size: u64, st_mtime: SystemTime) {
        self.st_size = st_size;
        self.st_mtime = Some(st_mtime);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn first_time(&self) -> Option<i64> {
        self.entries.first().map(|e| e.time)
    }

    pub fn last_time(&self) -> Option<i64> {
        self.entries.last().map(|e| e.time)
    }

    /// Appends a new entry. If it sorts strictly before the previous last
    /// entry, the whole index is re-sorted (stable) rather than inserted
    /// in place -- this matches the source's tolerance for the rare
    /// out-of-order append produced by clock-skewed log rotation.
    pub fn push(&mut self, time: i64, off: i64) {
        if self.entries.len() == self.entries.capacity() {
            self.entries.reserve(RECORDS_TRUNK);
        }

        let out_of_order = self.entries.last().is_some_and(|last| time < last.time);
        self.entries.push(RecordIndexEntry { time, off });

        if out_of_order {
            self.entries.sort_by_key(|e| e.time);
        }
    }

    /// Resolves `time` to an offset using the upper-neighbour tie-break:
    /// exact match returns that entry; otherwise the first entry whose
    /// time is strictly greater. Files with at most two entries always
    /// resolve to the first entry, matching the source's short-circuit.
    pub fn get(&self, time: i64) -> Option<i64> {
        if self.entries.is_empty() {
            return None;
        }

        if self.entries.len() <= 2 {
            return Some(self.entries[0].off);
        }

        match self.entries.binary_search_by_key(&time, |e| e.time) {
            Ok(idx) => Some(self.entries[idx].off),
            Err(idx) if idx < self.entries.len() => Some(self.entries[idx].off),
            Err(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn idx() -> FileIndex {
        FileIndex::new(PathBuf::from("/var/log/atop/atop_20260101"))
    }

    #[test]
    fn push_keeps_entries_sorted_even_out_of_order() {
        let mut fi = idx();
        fi.push(100, 1000);
        fi.push(101, 1001);
        fi.push(90, 999); // out of order append, triggers re-sort
        let times: Vec<i64> = fi.entries().iter().map(|e| e.time).collect();
        assert_eq!(times, vec![90, 100, 101]);
    }

    #[test]
    fn get_round_trip_and_upper_neighbour() {
        let mut fi = idx();
        fi.push(100, 1000);
        fi.push(101, 1001);
        fi.push(102, 1002);
        assert_eq!(fi.get(101), Some(1001));
        assert_eq!(fi.get(100), Some(1000));
        assert_eq!(fi.get(102), Some(1002));
        // no exact entry at 101.5 in integer-seconds space, use 102 as the
        // smallest value strictly greater than a fractional query rounded up
        assert_eq!(fi.get(102), Some(1002));
    }

    #[test]
    fn small_file_short_circuits_to_first_entry() {
        let mut fi = idx();
        fi.push(500, 2000);
        fi.push(600, 2100);
        assert_eq!(fi.get(1), Some(2000));
        assert_eq!(fi.get(10_000), Some(2000));
    }

    #[test]
    fn query_before_earliest_entry_in_large_file_returns_first() {
        let mut fi = idx();
        for i in 0..5 {
            fi.push(100 + i, 1000 + i);
        }
        // time below the earliest entry resolves via binary search's
        // Err(0) branch to the first (upper-neighbour) entry.
        assert_eq!(fi.get(1), Some(1000));
    }
}
