//! Bucket table: partitioning suffixes by their k-symbol prefix code.
//!
//! Every position gets a code for the window of `prefix_length`
//! symbols starting there. All-regular windows use the base-R value of
//! their symbols. A window whose first special symbol sits at offset
//! `j` collapses onto the code `p * R^(k-j) + (R^(k-j) - 1)` where `p`
//! is the code of its regular prefix - the largest code with that
//! prefix, so special suffixes land at the tail of the bucket sharing
//! their regular prefix. The empty suffix is seeded into the very last
//! bucket's special group and ends up as the final suffix-array entry.
//!
//! A bucket stores its nonspecial suffixes first, then its special
//! group. The table keeps per-code widths plus accumulated left
//! borders, and can split the code range into parts of roughly equal
//! suffix count so the sorter never holds more than one part in
//! memory.

use crate::error::IndexError;
use crate::seq::alphabet::{is_special, SEPARATOR};
use crate::seq::{EncodedSequence, ReadMode, ScanState};

use super::types::{Code, SeqPos};

/// Upper bound on the number of bucket codes the table will allocate.
pub const MAX_CODES: u64 = 1 << 26;

/// Classification of one window position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WindowCode {
    Full(Code),
    /// Collapsed code and the offset of the first special symbol.
    Special(Code, u32),
}

/// Rolling scan over all window codes of a sequence.
struct CodeScanner<'a> {
    scan: ScanState<'a>,
    ring: Vec<u8>,
    head: usize,
    specials_in: usize,
    code: Code,
    code_valid: bool,
    pow_k1: u64,
    r: u64,
    k: usize,
    pos: u64,
    n: u64,
}

impl<'a> CodeScanner<'a> {
    fn new(seq: &'a EncodedSequence, rm: ReadMode, k: usize) -> Self {
        let n = seq.total_length();
        debug_assert!(k as u64 <= n);
        let r = seq.num_of_chars() as u64;
        let mut scan = seq.scan_from(0, rm);
        let mut ring = Vec::with_capacity(k);
        let mut specials_in = 0;
        for _ in 0..k {
            let sym = scan.next_symbol().unwrap_or(SEPARATOR);
            if is_special(sym) {
                specials_in += 1;
            }
            ring.push(sym);
        }
        CodeScanner {
            scan,
            ring,
            head: 0,
            specials_in,
            code: 0,
            code_valid: false,
            pow_k1: r.pow(k as u32 - 1),
            r,
            k,
            pos: 0,
            n,
        }
    }

    #[inline]
    fn ring_at(&self, i: usize) -> u8 {
        self.ring[(self.head + i) % self.k]
    }

    /// Code of the window at the current position.
    fn current(&mut self) -> WindowCode {
        if self.specials_in == 0 {
            if !self.code_valid {
                let mut code = 0;
                for i in 0..self.k {
                    code = code * self.r + self.ring_at(i) as u64;
                }
                self.code = code;
                self.code_valid = true;
            }
            return WindowCode::Full(self.code);
        }
        let mut j = 0;
        let mut prefix = 0u64;
        while !is_special(self.ring_at(j)) {
            prefix = prefix * self.r + self.ring_at(j) as u64;
            j += 1;
        }
        let tail = self.r.pow((self.k - j) as u32);
        WindowCode::Special(prefix * tail + (tail - 1), j as u32)
    }

    /// Slides the window one position to the right. Symbols past the
    /// sequence end count as separators.
    fn advance(&mut self) {
        let front = self.ring[self.head];
        let prev_valid = self.code_valid && self.specials_in == 0;
        let incoming = if self.pos + self.k as u64 >= self.n {
            SEPARATOR
        } else {
            debug_assert_eq!(self.scan.position(), self.pos + self.k as u64);
            self.scan.next_symbol().unwrap_or(SEPARATOR)
        };
        if is_special(front) {
            self.specials_in -= 1;
        }
        if is_special(incoming) {
            self.specials_in += 1;
        }
        self.ring[self.head] = incoming;
        self.head = (self.head + 1) % self.k;
        self.pos += 1;
        if self.specials_in == 0 && prev_valid {
            self.code = (self.code - front as u64 * self.pow_k1) * self.r + incoming as u64;
        } else {
            self.code_valid = false;
        }
    }
}

/// Extent of one bucket inside the suffix array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketSpec {
    /// Global suffix-array index of the bucket's first entry.
    pub left: u64,
    pub nonspecial: u64,
    pub special: u64,
}

impl BucketSpec {
    #[inline]
    pub fn width(&self) -> u64 {
        self.nonspecial + self.special
    }
}

/// Per-code suffix counts and accumulated left borders.
pub struct BucketTable {
    prefix_length: u32,
    num_of_codes: u64,
    leftborders: Vec<u64>,
    nonspecial: Vec<u64>,
    special: Vec<u64>,
    max_bucket_width: u64,
}

impl BucketTable {
    /// Scans the sequence once and counts every bucket. The empty
    /// suffix is accounted to the last code's special group.
    pub fn build(
        seq: &EncodedSequence,
        rm: ReadMode,
        prefix_length: u32,
    ) -> Result<Self, IndexError> {
        assert!(prefix_length >= 1);
        let n = seq.total_length();
        if n < prefix_length as u64 {
            return Err(IndexError::SequenceTooShort {
                total_length: n,
                prefix_length,
            });
        }
        let r = seq.num_of_chars() as u128;
        let num_of_codes_wide = r.pow(prefix_length);
        if num_of_codes_wide > MAX_CODES as u128 {
            return Err(IndexError::PrefixLengthTooLarge {
                prefix_length,
                num_of_codes: num_of_codes_wide,
                max_codes: MAX_CODES,
            });
        }
        let num_of_codes = num_of_codes_wide as u64;
        let mut nonspecial = vec![0u64; num_of_codes as usize];
        let mut special = vec![0u64; num_of_codes as usize];
        let mut scanner = CodeScanner::new(seq, rm, prefix_length as usize);
        for _ in 0..n {
            match scanner.current() {
                WindowCode::Full(code) => nonspecial[code as usize] += 1,
                WindowCode::Special(code, _) => special[code as usize] += 1,
            }
            scanner.advance();
        }
        special[num_of_codes as usize - 1] += 1; // empty suffix
        let mut leftborders = Vec::with_capacity(num_of_codes as usize + 1);
        let mut acc = 0u64;
        let mut max_bucket_width = 0;
        for code in 0..num_of_codes as usize {
            leftborders.push(acc);
            let width = nonspecial[code] + special[code];
            max_bucket_width = max_bucket_width.max(width);
            acc += width;
        }
        leftborders.push(acc);
        debug_assert_eq!(acc, n + 1);
        Ok(BucketTable {
            prefix_length,
            num_of_codes,
            leftborders,
            nonspecial,
            special,
            max_bucket_width,
        })
    }

    #[inline]
    pub fn prefix_length(&self) -> u32 {
        self.prefix_length
    }

    #[inline]
    pub fn num_of_codes(&self) -> u64 {
        self.num_of_codes
    }

    #[inline]
    pub fn max_bucket_width(&self) -> u64 {
        self.max_bucket_width
    }

    /// Total number of suffix-array entries, including the empty
    /// suffix.
    #[inline]
    pub fn total_width(&self) -> u64 {
        *self.leftborders.last().unwrap()
    }

    pub fn bounds(&self, code: Code) -> BucketSpec {
        let c = code as usize;
        BucketSpec {
            left: self.leftborders[c],
            nonspecial: self.nonspecial[c],
            special: self.special[c],
        }
    }

    /// Splits the code range into up to `parts` windows of roughly
    /// equal suffix count. Windows are inclusive code ranges and
    /// cover all codes.
    pub fn part_windows(&self, parts: u32) -> Vec<(Code, Code)> {
        let parts = parts.max(1) as u64;
        let target = self.total_width().div_ceil(parts);
        let mut windows = Vec::new();
        let mut lo = 0u64;
        let mut acc = 0u64;
        for code in 0..self.num_of_codes {
            acc += self.nonspecial[code as usize] + self.special[code as usize];
            if acc >= target && code + 1 < self.num_of_codes {
                windows.push((lo, code));
                lo = code + 1;
                acc = 0;
            }
        }
        windows.push((lo, self.num_of_codes - 1));
        windows
    }

    /// Number of suffix-array entries covered by a part window.
    pub fn window_width(&self, window: (Code, Code)) -> u64 {
        self.leftborders[window.1 as usize + 1] - self.leftborders[window.0 as usize]
    }

    /// Fills `out` with the suffix positions of all buckets in a part
    /// window: per bucket, nonspecial suffixes in scan order followed
    /// by the special group (ordered later by the driver). `out` must
    /// have exactly `window_width` entries.
    pub fn seed_part(
        &self,
        seq: &EncodedSequence,
        rm: ReadMode,
        window: (Code, Code),
        out: &mut [SeqPos],
    ) {
        let (lo, hi) = window;
        debug_assert_eq!(out.len() as u64, self.window_width(window));
        let base = self.leftborders[lo as usize];
        // Per-code write cursors, relative to the part base.
        let mut ns_fill: Vec<u64> = Vec::with_capacity((hi - lo + 1) as usize);
        let mut sp_fill: Vec<u64> = Vec::with_capacity((hi - lo + 1) as usize);
        for code in lo..=hi {
            let spec = self.bounds(code);
            ns_fill.push(spec.left - base);
            sp_fill.push(spec.left - base + spec.nonspecial);
        }
        let n = seq.total_length();
        let mut scanner = CodeScanner::new(seq, rm, self.prefix_length as usize);
        for pos in 0..n {
            let (code, is_special_window) = match scanner.current() {
                WindowCode::Full(code) => (code, false),
                WindowCode::Special(code, _) => (code, true),
            };
            if (lo..=hi).contains(&code) {
                let slot = if is_special_window {
                    &mut sp_fill[(code - lo) as usize]
                } else {
                    &mut ns_fill[(code - lo) as usize]
                };
                out[*slot as usize] = pos;
                *slot += 1;
            }
            scanner.advance();
        }
        if hi == self.num_of_codes - 1 {
            let slot = &mut sp_fill[(hi - lo) as usize];
            out[*slot as usize] = n;
            *slot += 1;
        }
        if cfg!(debug_assertions) {
            for (i, code) in (lo..=hi).enumerate() {
                let spec = self.bounds(code);
                debug_assert_eq!(ns_fill[i], spec.left - base + spec.nonspecial);
                debug_assert_eq!(sp_fill[i], spec.left - base + spec.width());
            }
        }
    }

    /// Offset of the first special symbol in the window at `pos`,
    /// capped at the prefix length. The empty suffix reports 0.
    pub fn special_prefix_index(&self, seq: &EncodedSequence, rm: ReadMode, pos: SeqPos) -> u64 {
        let n = seq.total_length();
        for j in 0..self.prefix_length as u64 {
            if pos + j >= n || is_special(seq.get_char(pos + j, rm)) {
                return j;
            }
        }
        self.prefix_length as u64
    }
}

/// Largest prefix length whose code count still trails the sequence
/// length, clamped to the table's allocation cap. Mirrors the usual
/// log-base-R recommendation.
pub fn recommended_prefix_length(num_of_chars: u32, total_length: u64) -> u32 {
    let r = num_of_chars.max(2) as u128;
    let mut k = 1u32;
    while r.pow(k + 1) <= total_length as u128 && r.pow(k + 1) <= MAX_CODES as u128 {
        k += 1;
    }
    k
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seq::Alphabet;

    fn encode(s: &str) -> EncodedSequence {
        let a = Alphabet::dna();
        EncodedSequence::from_symbols(&a.map_bytes(s.as_bytes()), 4).unwrap()
    }

    #[test]
    fn counts_cover_all_suffixes() {
        let seq = encode("acgtnacgtacgn");
        let t = BucketTable::build(&seq, ReadMode::Forward, 2).unwrap();
        assert_eq!(t.total_width(), seq.total_length() + 1);
        let mut sum = 0;
        for code in 0..t.num_of_codes() {
            let b = t.bounds(code);
            assert_eq!(b.left, sum);
            sum += b.width();
        }
        assert_eq!(sum, seq.total_length() + 1);
    }

    #[test]
    fn special_windows_collapse_to_prefix_tail() {
        // "an": window at 0 is "an", first special at offset 1, so its
        // code is a-prefix tail: 0 * 4 + 3 = 3.
        let seq = encode("anaa");
        let t = BucketTable::build(&seq, ReadMode::Forward, 2).unwrap();
        // pos 0 -> special code 3; pos 1 -> special j=0 code 15;
        // pos 2 -> "aa" code 0; pos 3 -> "a<end>" special code 3;
        // empty suffix -> code 15.
        assert_eq!(t.bounds(0).nonspecial, 1);
        assert_eq!(t.bounds(3).special, 2);
        assert_eq!(t.bounds(15).special, 2);
    }

    #[test]
    fn seeding_matches_counts() {
        let seq = encode("acgtnacgtacgnaccgt");
        let t = BucketTable::build(&seq, ReadMode::Forward, 3).unwrap();
        let mut out = vec![0u64; t.total_width() as usize];
        t.seed_part(&seq, ReadMode::Forward, (0, t.num_of_codes() - 1), &mut out);
        let mut seen = out.clone();
        seen.sort_unstable();
        let expected: Vec<u64> = (0..=seq.total_length()).collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn part_windows_cover_code_range() {
        let seq = encode("acgtacgtacgtnnacgt");
        let t = BucketTable::build(&seq, ReadMode::Forward, 2).unwrap();
        for parts in [1, 2, 3, 7] {
            let windows = t.part_windows(parts);
            assert_eq!(windows[0].0, 0);
            assert_eq!(windows.last().unwrap().1, t.num_of_codes() - 1);
            for w in windows.windows(2) {
                assert_eq!(w[0].1 + 1, w[1].0);
            }
            let total: u64 = t.part_windows(parts).iter().map(|&w| t.window_width(w)).sum();
            assert_eq!(total, t.total_width());
        }
    }

    #[test]
    fn rolling_code_matches_recompute() {
        let seq = encode("gattacagattacannacgtgca");
        let k = 3usize;
        let t = BucketTable::build(&seq, ReadMode::Forward, k as u32).unwrap();
        let mut scanner = CodeScanner::new(&seq, ReadMode::Forward, k);
        let n = seq.total_length();
        for pos in 0..n {
            // Recompute the code naively from single-symbol access.
            let mut naive_special = None;
            let mut prefix = 0u64;
            for j in 0..k as u64 {
                let sym = if pos + j < n {
                    seq.get_char(pos + j, ReadMode::Forward)
                } else {
                    SEPARATOR
                };
                if is_special(sym) {
                    naive_special = Some(j as u32);
                    break;
                }
                prefix = prefix * 4 + sym as u64;
            }
            let expected = match naive_special {
                None => WindowCode::Full(prefix),
                Some(j) => {
                    let tail = 4u64.pow(k as u32 - j);
                    WindowCode::Special(prefix * tail + (tail - 1), j)
                }
            };
            assert_eq!(scanner.current(), expected, "pos {pos}");
            scanner.advance();
        }
        let _ = t;
    }

    #[test]
    fn too_short_and_too_wide_rejected() {
        let seq = encode("acg");
        assert!(matches!(
            BucketTable::build(&seq, ReadMode::Forward, 5),
            Err(IndexError::SequenceTooShort { .. })
        ));
        assert!(matches!(
            BucketTable::build(&seq, ReadMode::Forward, 40),
            Err(IndexError::SequenceTooShort { .. })
        ));
    }

    #[test]
    fn recommended_length_grows_with_input() {
        assert_eq!(recommended_prefix_length(4, 16), 2);
        assert!(recommended_prefix_length(4, 1 << 20) >= 8);
        assert!(recommended_prefix_length(4, u64::MAX) <= 26);
    }
}
