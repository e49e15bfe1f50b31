//! Per-bucket LCP staging: u64 values while sorting, bytes at flush.
//!
//! The sorter knows each LCP value the moment it separates two
//! suffixes, so values are written into a bucket-sized staging buffer
//! at their final local index and flushed once the bucket is done.
//! On flush a value below 255 becomes one byte; anything larger
//! becomes the sentinel byte plus a 16-byte record for the `.llv`
//! side table.

use super::types::{LargeLcpValue, LCP_OVERFLOW};

const UNSET: u64 = u64::MAX;

/// LCP staging buffer, reused across buckets.
pub struct LcpOutputBuffer {
    values: Vec<u64>,
    bytes: Vec<u8>,
    large: Vec<LargeLcpValue>,
    max_branch_depth: u64,
    total_large: u64,
    count_output: u64,
}

impl LcpOutputBuffer {
    pub fn new() -> Self {
        LcpOutputBuffer {
            values: Vec::new(),
            bytes: Vec::new(),
            large: Vec::new(),
            max_branch_depth: 0,
            total_large: 0,
            count_output: 0,
        }
    }

    /// Begins a bucket of `width` entries.
    pub fn reset(&mut self, width: usize) {
        self.values.clear();
        self.values.resize(width, UNSET);
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.values.len()
    }

    /// Records the LCP for the bucket-local suffix at `idx`.
    #[inline]
    pub fn set(&mut self, idx: usize, value: u64) {
        debug_assert_ne!(value, UNSET);
        self.values[idx] = value;
    }

    /// Moves a slot verbatim, set or not. Insertion sort shifts slots
    /// whose pair may still be tied under a depth bound; such slots
    /// are rewritten when the deferred range is resolved.
    #[inline]
    pub fn move_slot(&mut self, from: usize, to: usize) {
        self.values[to] = self.values[from];
    }

    #[inline]
    pub fn value(&self, idx: usize) -> u64 {
        debug_assert_ne!(self.values[idx], UNSET, "lcp index {idx} never set");
        self.values[idx]
    }

    /// Converts the staged values to bytes plus overflow records.
    /// `base_index` is the bucket's global suffix-array offset, used
    /// for the record positions.
    pub fn flush(&mut self, base_index: u64) {
        self.bytes.clear();
        self.large.clear();
        for (idx, &v) in self.values.iter().enumerate() {
            debug_assert_ne!(v, UNSET, "lcp index {idx} never set");
            if v >= LCP_OVERFLOW as u64 {
                self.bytes.push(LCP_OVERFLOW);
                self.large.push(LargeLcpValue {
                    position: base_index + idx as u64,
                    value: v,
                });
            } else {
                self.bytes.push(v as u8);
            }
            self.max_branch_depth = self.max_branch_depth.max(v);
        }
        self.total_large += self.large.len() as u64;
        self.count_output += self.values.len() as u64;
    }

    /// Flushed bytes and overflow records of the current bucket.
    pub fn segment(&self) -> (&[u8], &[LargeLcpValue]) {
        (&self.bytes, &self.large)
    }

    /// Largest LCP value seen so far.
    #[inline]
    pub fn max_branch_depth(&self) -> u64 {
        self.max_branch_depth
    }

    /// Total overflow records emitted so far.
    #[inline]
    pub fn total_large(&self) -> u64 {
        self.total_large
    }

    /// Total LCP entries flushed so far.
    #[inline]
    pub fn count_output(&self) -> u64 {
        self.count_output
    }
}

impl Default for LcpOutputBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_values_stay_bytes() {
        let mut buf = LcpOutputBuffer::new();
        buf.reset(3);
        buf.set(0, 0);
        buf.set(1, 7);
        buf.set(2, 254);
        buf.flush(10);
        let (bytes, large) = buf.segment();
        assert_eq!(bytes, &[0, 7, 254]);
        assert!(large.is_empty());
        assert_eq!(buf.max_branch_depth(), 254);
        assert_eq!(buf.count_output(), 3);
    }

    #[test]
    fn overflow_goes_to_side_table() {
        let mut buf = LcpOutputBuffer::new();
        buf.reset(2);
        buf.set(0, 255);
        buf.set(1, 70000);
        buf.flush(100);
        let (bytes, large) = buf.segment();
        assert_eq!(bytes, &[LCP_OVERFLOW, LCP_OVERFLOW]);
        assert_eq!(
            large,
            &[
                LargeLcpValue {
                    position: 100,
                    value: 255
                },
                LargeLcpValue {
                    position: 101,
                    value: 70000
                }
            ]
        );
        assert_eq!(buf.total_large(), 2);
        assert_eq!(buf.max_branch_depth(), 70000);
    }

    #[test]
    fn buffer_reuse_resets_per_bucket_state() {
        let mut buf = LcpOutputBuffer::new();
        buf.reset(1);
        buf.set(0, 300);
        buf.flush(0);
        buf.reset(2);
        buf.set(0, 1);
        buf.set(1, 2);
        buf.flush(1);
        let (bytes, large) = buf.segment();
        assert_eq!(bytes, &[1, 2]);
        assert!(large.is_empty());
        assert_eq!(buf.total_large(), 1);
        assert_eq!(buf.count_output(), 3);
    }
}
