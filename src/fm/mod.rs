//! Burrows-Wheeler transform and FM-index over a sorted suffix array.
//!
//! The BWT is materialized as one byte per rank: the symbol preceding
//! each suffix, wildcards and separators kept as their reserved byte
//! values, and a synthetic terminator where the whole sequence's
//! suffix sits. Under the crate's sort convention every suffix
//! starting with a special symbol lives in the tail of the array,
//! ordered by ascending position; that tail doubles as the LF target
//! table for special predecessors, so backward stepping works across
//! wildcards and separators too.
//!
//! Backward search itself only ever walks regular symbols: rank
//! queries are answered from blocked occurrence checkpoints plus a
//! short linear scan. Locate information is optional - every
//! `2^sample_rate`-th text position is sampled and found again by
//! LF-walking to the nearest marked rank.

pub mod myers;

pub use myers::{approx_search, ApproxMatch, MAX_PATTERN_LENGTH};

use crate::error::{IndexError, Result};
use crate::index::SeqPos;
use crate::seq::{is_special, EncodedSequence, ReadMode};

/// BWT byte marking the predecessor of the suffix at position 0.
pub const TERMINATOR: u8 = 253;

/// Ranks between occurrence checkpoints.
const OCC_BLOCK: usize = 128;

/// Regular symbols an index can carry (2-bit packing).
const MAX_CHARS: usize = 4;

struct LocateSamples {
    /// `2^rate`-th positions are sampled.
    rate: u64,
    /// One bit per rank.
    marked: Vec<u64>,
    /// Set bits in all words before each word.
    rank_acc: Vec<u64>,
    /// Sampled text positions in rank order.
    positions: Vec<SeqPos>,
}

impl LocateSamples {
    fn is_marked(&self, rank: u64) -> bool {
        self.marked[(rank / 64) as usize] >> (rank % 64) & 1 == 1
    }

    /// Number of marked ranks before `rank`; indexes `positions`.
    fn marked_before(&self, rank: u64) -> u64 {
        let word = (rank / 64) as usize;
        self.rank_acc[word] + (self.marked[word] & ((1u64 << (rank % 64)) - 1)).count_ones() as u64
    }
}

pub struct FmIndex {
    num_of_chars: u32,
    total_entries: u64,
    bwt: Vec<u8>,
    /// `counts[c]` = ranks of suffixes starting with a symbol < `c`;
    /// `counts[num_of_chars]` is where the special tail begins.
    counts: [u64; MAX_CHARS + 1],
    /// Cumulative regular-symbol occurrences at every block border.
    occ: Vec<[u64; MAX_CHARS]>,
    /// LF targets for ranks whose BWT byte is special, by rank.
    special_lf: Vec<(u64, u64)>,
    samples: Option<LocateSamples>,
}

impl FmIndex {
    /// Builds the index from the suffix positions of `seq` in rank
    /// order. `sample_rate` enables locate information: every
    /// `2^sample_rate`-th position is sampled.
    pub fn build(
        seq: &EncodedSequence,
        rm: ReadMode,
        suffixes: impl IntoIterator<Item = SeqPos>,
        sample_rate: Option<u32>,
    ) -> Result<Self> {
        let n = seq.total_length();
        if n == 0 {
            return Err(IndexError::EmptyInput);
        }
        let total_entries = n + 1;
        let rate = sample_rate.map(|k| 1u64 << k);
        let mut bwt = Vec::new();
        bwt.try_reserve_exact(total_entries as usize)
            .map_err(|_| IndexError::OutOfMemory {
                what: "BWT byte array",
                bytes: total_entries,
            })?;
        let mut occ = Vec::with_capacity(total_entries as usize / OCC_BLOCK + 1);
        let mut running = [0u64; MAX_CHARS];
        let mut special_tail = Vec::new();
        let mut special_pred: Vec<(u64, SeqPos)> = Vec::new();
        let mut samples = rate.map(|rate| LocateSamples {
            rate,
            marked: vec![0u64; total_entries.div_ceil(64) as usize],
            rank_acc: Vec::new(),
            positions: Vec::new(),
        });

        let mut rank = 0u64;
        for pos in suffixes {
            if rank as usize % OCC_BLOCK == 0 {
                occ.push(running);
            }
            let byte = if pos == 0 {
                TERMINATOR
            } else {
                let pred = pos - 1;
                let sym = seq.get_char(pred, rm);
                if is_special(sym) {
                    special_pred.push((rank, pred));
                } else {
                    running[sym as usize] += 1;
                }
                sym
            };
            bwt.push(byte);
            if pos < n && is_special(seq.get_char(pos, rm)) {
                debug_assert!(special_tail.last().is_none_or(|&last| last < pos));
                special_tail.push(pos);
            }
            if let Some(samples) = samples.as_mut() {
                if pos % samples.rate == 0 {
                    samples.marked[(rank / 64) as usize] |= 1 << (rank % 64);
                    samples.positions.push(pos);
                }
            }
            rank += 1;
        }
        if rank != total_entries {
            return Err(IndexError::CorruptIndex(format!(
                "suffix array holds {rank} entries, sequence implies {total_entries}"
            )));
        }
        // Rank queries go up to total_entries inclusive.
        if total_entries as usize % OCC_BLOCK == 0 {
            occ.push(running);
        }

        let mut counts = [0u64; MAX_CHARS + 1];
        for c in 0..MAX_CHARS {
            counts[c + 1] = counts[c] + running[c];
        }
        debug_assert_eq!(
            counts[MAX_CHARS] + special_tail.len() as u64 + 1,
            total_entries
        );
        let reg_end = counts[MAX_CHARS];
        let special_lf = special_pred
            .into_iter()
            .map(|(rank, pred)| {
                let at = special_tail
                    .binary_search(&pred)
                    .unwrap_or_else(|_| unreachable!("special predecessor not in tail"));
                (rank, reg_end + at as u64)
            })
            .collect();
        if let Some(samples) = samples.as_mut() {
            let mut acc = 0u64;
            samples.rank_acc = samples
                .marked
                .iter()
                .map(|&word| {
                    let before = acc;
                    acc += word.count_ones() as u64;
                    before
                })
                .collect();
        }

        Ok(FmIndex {
            num_of_chars: seq.num_of_chars(),
            total_entries,
            bwt,
            counts,
            occ,
            special_lf,
            samples,
        })
    }

    #[inline]
    pub fn num_entries(&self) -> u64 {
        self.total_entries
    }

    /// Occurrences of `sym` in `bwt[..rank]`.
    fn occurrences(&self, sym: u8, rank: u64) -> u64 {
        let block = rank as usize / OCC_BLOCK;
        let mut count = self.occ[block][sym as usize];
        for &b in &self.bwt[block * OCC_BLOCK..rank as usize] {
            if b == sym {
                count += 1;
            }
        }
        count
    }

    /// Rank of the suffix one position to the left, or `None` at the
    /// suffix covering the whole sequence.
    pub fn lf_map(&self, rank: u64) -> Option<u64> {
        match self.bwt[rank as usize] {
            TERMINATOR => None,
            sym if is_special(sym) => {
                let at = self
                    .special_lf
                    .binary_search_by_key(&rank, |&(r, _)| r)
                    .unwrap_or_else(|_| unreachable!("special BWT byte without LF target"));
                Some(self.special_lf[at].1)
            }
            sym => Some(self.counts[sym as usize] + self.occurrences(sym, rank)),
        }
    }

    /// Rank interval of all suffixes starting with `pattern`, empty
    /// when there is no occurrence. Pattern symbols must be regular.
    pub fn backward_search(&self, pattern: &[u8]) -> std::ops::Range<u64> {
        let mut lo = 0u64;
        let mut hi = self.total_entries;
        for &sym in pattern.iter().rev() {
            if sym as u32 >= self.num_of_chars {
                return 0..0;
            }
            lo = self.counts[sym as usize] + self.occurrences(sym, lo);
            hi = self.counts[sym as usize] + self.occurrences(sym, hi);
            if lo >= hi {
                return 0..0;
            }
        }
        lo..hi
    }

    pub fn exact_match_count(&self, pattern: &[u8]) -> u64 {
        let range = self.backward_search(pattern);
        range.end - range.start
    }

    /// Text position of the suffix at `rank`, via LF steps to the
    /// nearest sampled rank.
    pub fn locate(&self, rank: u64) -> Result<SeqPos> {
        let samples = self
            .samples
            .as_ref()
            .ok_or(IndexError::NoLocateInformation)?;
        let mut r = rank;
        let mut steps = 0u64;
        loop {
            if samples.is_marked(r) {
                return Ok(samples.positions[samples.marked_before(r) as usize] + steps);
            }
            // Position 0 is always sampled, so the walk never reaches
            // the terminator unmarked.
            match self.lf_map(r) {
                Some(next) => r = next,
                None => unreachable!("unsampled rank of position 0"),
            }
            steps += 1;
        }
    }

    /// LF-walks the whole BWT backward and returns the sequence
    /// symbols it spells, specials included.
    pub fn reconstruct(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.total_entries as usize - 1);
        let mut rank = self.total_entries - 1;
        loop {
            match self.bwt[rank as usize] {
                TERMINATOR => break,
                sym => {
                    out.push(sym);
                    match self.lf_map(rank) {
                        Some(next) => rank = next,
                        None => break,
                    }
                }
            }
        }
        out.reverse();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{sort_suffixes, SegmentCollector, SuffixSortOptions};
    use crate::seq::{Alphabet, SEPARATOR, WILDCARD};

    fn build_index(symbols: &[u8], sample_rate: Option<u32>) -> (EncodedSequence, FmIndex) {
        let seq = EncodedSequence::from_symbols(symbols, 4).unwrap();
        let mut out = SegmentCollector::new();
        sort_suffixes(
            &seq,
            ReadMode::Forward,
            &SuffixSortOptions::default(),
            &mut out,
            None,
        )
        .unwrap();
        let fm = FmIndex::build(&seq, ReadMode::Forward, out.suftab.iter().copied(), sample_rate)
            .unwrap();
        (seq, fm)
    }

    fn random_symbols(len: usize, state: &mut u64) -> Vec<u8> {
        (0..len)
            .map(|_| {
                *state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                match (*state >> 33) % 30 {
                    0 => WILDCARD,
                    1 => SEPARATOR,
                    x => (x % 4) as u8,
                }
            })
            .collect()
    }

    fn naive_occurrences(symbols: &[u8], pattern: &[u8]) -> Vec<u64> {
        if pattern.is_empty() || symbols.len() < pattern.len() {
            return Vec::new();
        }
        (0..=symbols.len() - pattern.len())
            .filter(|&p| symbols[p..p + pattern.len()] == *pattern)
            .map(|p| p as u64)
            .collect()
    }

    #[test]
    fn backward_search_counts_match_naive_scan() {
        let mut state = 7u64;
        let symbols = random_symbols(800, &mut state);
        let (_, fm) = build_index(&symbols, None);
        for pattern in [
            &[0u8][..],
            &[3][..],
            &[0, 1][..],
            &[2, 2, 3][..],
            &[0, 1, 2, 3][..],
            &[1, 1, 1, 1, 1, 1][..],
        ] {
            assert_eq!(
                fm.exact_match_count(pattern),
                naive_occurrences(&symbols, pattern).len() as u64,
                "pattern {pattern:?}"
            );
        }
    }

    #[test]
    fn locate_reports_every_occurrence() {
        let mut state = 21u64;
        let symbols = random_symbols(500, &mut state);
        let (_, fm) = build_index(&symbols, Some(3));
        for pattern in [&[0u8, 2][..], &[1, 3, 0][..], &[2][..]] {
            let mut located: Vec<u64> = fm
                .backward_search(pattern)
                .map(|rank| fm.locate(rank).unwrap())
                .collect();
            located.sort_unstable();
            assert_eq!(located, naive_occurrences(&symbols, pattern), "pattern {pattern:?}");
        }
    }

    #[test]
    fn locate_without_samples_is_refused() {
        let (_, fm) = build_index(&[0, 1, 2, 3, 0, 1], None);
        match fm.locate(0) {
            Err(IndexError::NoLocateInformation) => {}
            other => panic!("expected NoLocateInformation, got {other:?}"),
        }
    }

    #[test]
    fn reconstruct_inverts_the_transform() {
        let mut state = 1234u64;
        let symbols = random_symbols(700, &mut state);
        let (_, fm) = build_index(&symbols, None);
        assert_eq!(fm.reconstruct(), symbols);
    }

    #[test]
    fn lf_map_visits_every_rank_once() {
        let alphabet = Alphabet::dna();
        let symbols = alphabet.map_bytes(b"gtacatacagtnacact");
        let (_, fm) = build_index(&symbols, None);
        let mut seen = vec![false; fm.num_entries() as usize];
        let mut rank = fm.num_entries() - 1;
        loop {
            assert!(!seen[rank as usize]);
            seen[rank as usize] = true;
            match fm.lf_map(rank) {
                Some(next) => rank = next,
                None => break,
            }
        }
        assert!(seen.iter().all(|&s| s));
    }

    #[test]
    fn empty_range_for_absent_and_non_regular_patterns() {
        let (_, fm) = build_index(&[0, 0, 1, 0, 0, 1], None);
        assert_eq!(fm.exact_match_count(&[2]), 0);
        assert_eq!(fm.exact_match_count(&[WILDCARD]), 0);
        assert!(fm.backward_search(&[3, 3, 3]).is_empty());
    }
}
