//! Bucket-by-bucket suffix sorting over the whole sequence.
//!
//! Construction runs in parts: each part window covers a contiguous
//! code range, gets seeded in one sequence scan, and its buckets are
//! sorted independently. Within a bucket the nonspecial suffixes go
//! through the multikey-quicksort engine at depth `prefix_length`;
//! the special group is ordered directly by its sort key (descending
//! special offset, then ascending position) and appended. Finished
//! buckets are flushed to an [`IndexSink`] in suffix-array order, so
//! peak memory stays proportional to the largest part.
//!
//! Sort-depth bounds are honored by iterative deepening: ranges the
//! engine left tied at the bound are re-sorted with the bound doubled
//! until they resolve, or until `absolute_max_depth` caps the effort
//! and remaining ties fall back to position order.

use crate::error::{IndexError, Result};
use crate::seq::{compare_suffixes, EncodedSequence, ReadMode};

use super::bentsedg::{MkvEngine, SortJob};
use super::bucket::{recommended_prefix_length, BucketTable};
use super::lcp::LcpOutputBuffer;
use super::types::{DeferredRange, LargeLcpValue, Ordertype, SeqPos, SfxStrategy, SortCounts};

/// Receives finished suffix-array segments in rank order.
pub trait IndexSink {
    /// One flushed bucket: suffix positions, one LCP byte per entry,
    /// and the overflow records for entries holding the sentinel.
    fn segment(
        &mut self,
        suffixes: &[SeqPos],
        lcp_bytes: &[u8],
        large: &[LargeLcpValue],
    ) -> Result<()>;
}

/// Construction parameters beyond the sort strategy itself.
#[derive(Debug, Clone)]
pub struct SuffixSortOptions {
    /// Bucket prefix length; `None` picks one from the sequence
    /// length and alphabet size.
    pub prefix_length: Option<u32>,
    /// Number of part windows; higher values trade speed for memory.
    pub parts: u32,
    pub strategy: SfxStrategy,
}

impl Default for SuffixSortOptions {
    fn default() -> Self {
        SuffixSortOptions {
            prefix_length: None,
            parts: 1,
            strategy: SfxStrategy::default(),
        }
    }
}

/// Figures reported after construction; they land in the project
/// file and the verbose output.
#[derive(Debug, Clone, Default)]
pub struct DriverStats {
    pub prefix_length: u32,
    pub num_of_codes: u64,
    pub max_bucket_width: u64,
    pub parts: u32,
    pub counts: SortCounts,
    /// Entries whose LCP needed an overflow record.
    pub num_large_lcp: u64,
    /// Largest LCP value seen anywhere.
    pub max_branch_depth: u64,
    /// Rank of the longest suffix (position 0); needed to invert the
    /// Burrows-Wheeler transform.
    pub longest: u64,
}

/// Sorts all suffixes of `seq` under `rm` and streams the result into
/// `sink`. `progress`, if given, is called with (entries emitted,
/// total entries) after every flushed bucket.
pub fn sort_suffixes(
    seq: &EncodedSequence,
    rm: ReadMode,
    options: &SuffixSortOptions,
    sink: &mut dyn IndexSink,
    mut progress: Option<&mut dyn FnMut(u64, u64)>,
) -> Result<DriverStats> {
    let n = seq.total_length();
    if n == 0 {
        return Err(IndexError::EmptyInput);
    }
    let prefix_length = options
        .prefix_length
        .unwrap_or_else(|| recommended_prefix_length(seq.num_of_chars(), n));
    let table = BucketTable::build(seq, rm, prefix_length)?;
    let depth0 = prefix_length as u64;
    // The engine can only defer below its depth bound, so a bound at
    // or under the bucket depth is lifted just past it.
    let initial_bound = options.strategy.max_sort_depth.map(|md| md.max(depth0 + 1));
    let mut engine = MkvEngine::new(seq, rm, options.strategy.clone());
    let mut lcp = LcpOutputBuffer::new();
    let mut deferred: Vec<DeferredRange> = Vec::new();
    let total = table.total_width();
    let mut emitted = 0u64;
    let mut prev_last: Option<SeqPos> = None;
    let mut longest = 0u64;

    let windows = table.part_windows(options.parts);
    let parts = windows.len() as u32;
    for window in windows {
        let width = table.window_width(window) as usize;
        if width == 0 {
            continue;
        }
        let mut part: Vec<SeqPos> = Vec::new();
        part.try_reserve_exact(width)
            .map_err(|_| IndexError::OutOfMemory {
                what: "part suffix buffer",
                bytes: width as u64 * 8,
            })?;
        part.resize(width, 0);
        table.seed_part(seq, rm, window, &mut part);
        let part_base = table.bounds(window.0).left;

        for code in window.0..=window.1 {
            let spec = table.bounds(code);
            if spec.width() == 0 {
                continue;
            }
            let local = (spec.left - part_base) as usize;
            let ns = spec.nonspecial as usize;
            let sp = spec.special as usize;
            let bucket = &mut part[local..local + ns + sp];
            lcp.reset(ns + sp);
            deferred.clear();

            if ns >= 2 {
                let mut job = SortJob {
                    s: &mut bucket[..ns],
                    lcp: &mut lcp,
                    deferred: &mut deferred,
                    lcp_base: 0,
                };
                engine.sort_range(&mut job, depth0, Ordertype::Ascending, initial_bound);
                let mut bound = initial_bound.unwrap_or(0);
                while !deferred.is_empty() {
                    bound = bound.saturating_mul(2);
                    let capped = matches!(
                        options.strategy.absolute_max_depth,
                        Some(cap) if bound >= cap
                    );
                    let pending = std::mem::take(&mut deferred);
                    for range in pending {
                        let tied = &mut bucket[range.left..=range.right];
                        if capped {
                            // Effort cap reached: the remaining ties
                            // count as equal and break by position. The
                            // table still records the real common prefix
                            // of each adjacent pair, resumed past the
                            // depth the ties are already known to share.
                            tied.sort_unstable();
                            for idx in 1..tied.len() {
                                let r = compare_suffixes(
                                    seq,
                                    rm,
                                    options.strategy.cmp_mode,
                                    tied[idx - 1],
                                    tied[idx],
                                    range.depth,
                                    None,
                                );
                                lcp.set(range.left + idx, r.lcp);
                            }
                        } else {
                            let mut job = SortJob {
                                s: tied,
                                lcp: &mut lcp,
                                deferred: &mut deferred,
                                lcp_base: range.left,
                            };
                            // Ranges can arrive tied slightly past the
                            // previous bound; always deepen past them.
                            let deeper = bound.max(range.depth + 1);
                            engine.sort_range(
                                &mut job,
                                range.depth,
                                Ordertype::NoOrder,
                                Some(deeper),
                            );
                        }
                    }
                }
            }

            if sp > 0 {
                order_special_group(seq, rm, &table, &mut bucket[ns..]);
                for idx in 1..sp {
                    let j = table.special_prefix_index(seq, rm, bucket[ns + idx]);
                    lcp.set(ns + idx, j);
                }
                if ns > 0 {
                    let r = compare_suffixes(
                        seq,
                        rm,
                        options.strategy.cmp_mode,
                        bucket[ns - 1],
                        bucket[ns],
                        0,
                        None,
                    );
                    debug_assert_eq!(r.ord, std::cmp::Ordering::Less);
                    lcp.set(ns, r.lcp);
                }
            }

            let boundary = match prev_last {
                None => 0,
                Some(prev) => {
                    let r = compare_suffixes(
                        seq,
                        rm,
                        options.strategy.cmp_mode,
                        prev,
                        bucket[0],
                        0,
                        None,
                    );
                    debug_assert_eq!(r.ord, std::cmp::Ordering::Less);
                    r.lcp
                }
            };
            lcp.set(0, boundary);
            prev_last = Some(bucket[ns + sp - 1]);

            if let Some(at) = bucket.iter().position(|&s| s == 0) {
                longest = emitted + at as u64;
            }
            lcp.flush(emitted);
            let (bytes, large) = lcp.segment();
            sink.segment(bucket, bytes, large)?;
            emitted += spec.width();
            if let Some(cb) = progress.as_deref_mut() {
                cb(emitted, total);
            }
        }
    }
    debug_assert_eq!(emitted, total);

    Ok(DriverStats {
        prefix_length,
        num_of_codes: table.num_of_codes(),
        max_bucket_width: table.max_bucket_width(),
        parts,
        counts: engine.counts(),
        num_large_lcp: lcp.total_large(),
        max_branch_depth: lcp.max_branch_depth(),
        longest,
    })
}

/// Special suffixes of one bucket rank by descending special offset,
/// then ascending position: a longer regular prefix continues with a
/// regular symbol where the shorter one already shows a special, and
/// specials themselves order by absolute position.
fn order_special_group(
    seq: &EncodedSequence,
    rm: ReadMode,
    table: &BucketTable,
    group: &mut [SeqPos],
) {
    group.sort_unstable_by(|&a, &b| {
        let ja = table.special_prefix_index(seq, rm, a);
        let jb = table.special_prefix_index(seq, rm, b);
        jb.cmp(&ja).then(a.cmp(&b))
    });
}

/// In-memory sink collecting every segment, mainly for tests and for
/// building the FM index without touching disk.
#[derive(Default)]
pub struct SegmentCollector {
    pub suftab: Vec<SeqPos>,
    pub lcp_bytes: Vec<u8>,
    pub large: Vec<LargeLcpValue>,
}

impl SegmentCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decoded LCP at `idx`, resolving the overflow sentinel.
    pub fn lcp_value(&self, idx: usize) -> u64 {
        let byte = self.lcp_bytes[idx];
        if byte < super::types::LCP_OVERFLOW {
            byte as u64
        } else {
            let at = self
                .large
                .binary_search_by_key(&(idx as u64), |l| l.position)
                .expect("overflow record for sentinel entry");
            self.large[at].value
        }
    }
}

impl IndexSink for SegmentCollector {
    fn segment(
        &mut self,
        suffixes: &[SeqPos],
        lcp_bytes: &[u8],
        large: &[LargeLcpValue],
    ) -> Result<()> {
        self.suftab.extend_from_slice(suffixes);
        self.lcp_bytes.extend_from_slice(lcp_bytes);
        self.large.extend_from_slice(large);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seq::{Alphabet, CmpMode, SEPARATOR, WILDCARD};

    fn sorted(seq: &EncodedSequence, options: &SuffixSortOptions) -> SegmentCollector {
        let mut out = SegmentCollector::new();
        sort_suffixes(seq, ReadMode::Forward, options, &mut out, None).unwrap();
        out
    }

    fn naive(seq: &EncodedSequence) -> Vec<SeqPos> {
        let mut all: Vec<SeqPos> = (0..=seq.total_length()).collect();
        all.sort_by(|&a, &b| {
            compare_suffixes(seq, ReadMode::Forward, CmpMode::CharByChar, a, b, 0, None).ord
        });
        all
    }

    fn check(seq: &EncodedSequence, options: &SuffixSortOptions) {
        let expected = naive(seq);
        let got = sorted(seq, options);
        assert_eq!(got.suftab, expected);
        assert_eq!(got.lcp_value(0), 0);
        for i in 1..got.suftab.len() {
            let r = compare_suffixes(
                seq,
                ReadMode::Forward,
                CmpMode::CharByChar,
                got.suftab[i - 1],
                got.suftab[i],
                0,
                None,
            );
            assert_eq!(got.lcp_value(i), r.lcp, "lcp at rank {i}");
        }
    }

    #[test]
    fn banana_layout_is_pinned() {
        let alphabet = Alphabet::new(&["aA", "bB", "nN"]).unwrap();
        let mut symbols = alphabet.map_bytes(b"banana");
        symbols.push(SEPARATOR);
        let seq = EncodedSequence::from_symbols(&symbols, 3).unwrap();
        for parts in [1, 2] {
            let got = sorted(
                &seq,
                &SuffixSortOptions {
                    prefix_length: Some(1),
                    parts,
                    ..SuffixSortOptions::default()
                },
            );
            assert_eq!(got.suftab, vec![1, 3, 5, 0, 2, 4, 6, 7]);
            let lcps: Vec<u64> = (0..8).map(|i| got.lcp_value(i)).collect();
            assert_eq!(lcps, vec![0, 3, 1, 0, 0, 2, 0, 0]);
        }
    }

    fn random_dna(len: usize, state: &mut u64) -> Vec<u8> {
        (0..len)
            .map(|_| {
                *state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                match (*state >> 33) % 24 {
                    0 => WILDCARD,
                    1 => SEPARATOR,
                    x => (x % 4) as u8,
                }
            })
            .collect()
    }

    #[test]
    fn random_sequences_match_naive_order() {
        let mut state = 0xfeed5eed1234u64;
        for (len, parts) in [(40usize, 1u32), (300, 1), (300, 3), (1000, 4)] {
            let symbols = random_dna(len, &mut state);
            let seq = EncodedSequence::from_symbols(&symbols, 4).unwrap();
            check(
                &seq,
                &SuffixSortOptions {
                    parts,
                    ..SuffixSortOptions::default()
                },
            );
        }
    }

    #[test]
    fn bounded_depth_with_deepening_resolves_fully() {
        let mut state = 99u64;
        let symbols = random_dna(500, &mut state);
        let seq = EncodedSequence::from_symbols(&symbols, 4).unwrap();
        check(
            &seq,
            &SuffixSortOptions {
                strategy: SfxStrategy {
                    max_sort_depth: Some(4),
                    ..SfxStrategy::default()
                },
                ..SuffixSortOptions::default()
            },
        );
    }

    #[test]
    fn overflowing_lcps_use_the_side_table() {
        let n = 600u64;
        let symbols = vec![0u8; n as usize];
        let seq = EncodedSequence::from_symbols(&symbols, 4).unwrap();
        let got = sorted(&seq, &SuffixSortOptions::default());
        let expected: Vec<SeqPos> = (0..=n).collect();
        assert_eq!(got.suftab, expected);
        assert!(!got.large.is_empty());
        for i in 1..=n as usize {
            assert_eq!(got.lcp_value(i), n - i as u64);
        }
        // Sentinel bytes only where the true value does not fit.
        for i in 0..=n as usize {
            let value = if i == 0 { 0 } else { n - i as u64 };
            assert_eq!(got.lcp_bytes[i] == 255, value >= 255);
        }
    }

    #[test]
    fn absolute_depth_cap_falls_back_to_position_order() {
        let symbols = vec![0u8; 200];
        let seq = EncodedSequence::from_symbols(&symbols, 4).unwrap();
        let got = sorted(
            &seq,
            &SuffixSortOptions {
                strategy: SfxStrategy {
                    max_sort_depth: Some(8),
                    absolute_max_depth: Some(16),
                    ..SfxStrategy::default()
                },
                ..SuffixSortOptions::default()
            },
        );
        // All suffixes of a^200 start alike, so position order happens
        // to be the true order here. The lcp entries must still be the
        // real values, not the deferred range's depth.
        let expected: Vec<SeqPos> = (0..=200).collect();
        assert_eq!(got.suftab, expected);
        for i in 1..=200usize {
            assert_eq!(got.lcp_value(i), 200 - i as u64, "lcp at rank {i}");
        }
    }
}
