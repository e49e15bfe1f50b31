//! Bit-parallel approximate matching after Myers.
//!
//! The sequence is scanned once in the reversed read mode with the
//! reversed pattern, so the running score at scan position `i` is the
//! best edit distance of the pattern against any window *starting* at
//! forward position `n - 1 - i`. Whenever that score drops to the
//! distance bound, the start position is reported and the matching
//! window's length is recovered by a forward pass over the same bit
//! vectors. Separators reset the automaton, so no reported window
//! crosses a sequence boundary; wildcards match nothing.
//!
//! Patterns are limited to one machine word of symbols.

use crate::error::{IndexError, Result};
use crate::index::SeqPos;
use crate::seq::{EncodedSequence, ReadMode, SEPARATOR, WILDCARD};

/// Longest supported pattern, one bit vector per symbol class.
pub const MAX_PATTERN_LENGTH: usize = 64;

/// One approximate occurrence. `distance` is the best edit distance
/// achievable by any window at `start`; `length` is the shortest
/// window within the distance bound, which may realize a distance
/// between `distance` and the bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApproxMatch {
    pub start: SeqPos,
    pub length: u64,
    pub distance: u64,
}

struct BitVectors {
    /// Match masks for the reversed pattern, one per regular symbol.
    eqs_rev: [u64; 4],
    /// Match masks for the pattern as given, for length recovery.
    eqs_fwd: [u64; 4],
    pattern_length: u64,
    /// Bit of the last pattern row.
    ebit: u64,
}

impl BitVectors {
    fn new(pattern: &[u8]) -> Result<Self> {
        if pattern.len() > MAX_PATTERN_LENGTH {
            return Err(IndexError::PatternTooLong(pattern.len()));
        }
        let m = pattern.len();
        let mut eqs_rev = [0u64; 4];
        let mut eqs_fwd = [0u64; 4];
        for (i, &sym) in pattern.iter().enumerate() {
            debug_assert!((sym as usize) < eqs_fwd.len());
            eqs_fwd[sym as usize] |= 1 << i;
            eqs_rev[sym as usize] |= 1 << (m - 1 - i);
        }
        Ok(BitVectors {
            eqs_rev,
            eqs_fwd,
            pattern_length: m as u64,
            ebit: 1 << (m - 1),
        })
    }
}

/// Automaton state: `pv`/`mv` carry the positive and negative score
/// deltas down the current column, `score` is the last row's value.
struct State {
    pv: u64,
    mv: u64,
    score: u64,
}

impl State {
    fn reset(pattern_length: u64) -> Self {
        State {
            pv: !0,
            mv: 0,
            score: pattern_length,
        }
    }

    /// Advances the column by one sequence symbol with match mask
    /// `eq`. `hin` is the horizontal delta shifted in at the top
    /// boundary: 0 lets windows begin anywhere (searching), 1 anchors
    /// them at the scan start (plain edit distance).
    #[inline]
    fn step(&mut self, eq: u64, ebit: u64, hin: u64) {
        let xv = eq | self.mv;
        let xh = (((eq & self.pv).wrapping_add(self.pv)) ^ self.pv) | eq;
        let mut ph = self.mv | !(xh | self.pv);
        let mh = self.pv & xh;
        if ph & ebit != 0 {
            self.score += 1;
        }
        if mh & ebit != 0 {
            self.score -= 1;
        }
        ph = (ph << 1) | hin;
        self.pv = (mh << 1) | !(xv | ph);
        self.mv = ph & xv;
    }
}

/// Reports every position where a window matching `pattern` within
/// `max_distance` edits begins, in descending position order. Pattern
/// symbols must be regular; the sequence may contain wildcards and
/// separators.
pub fn approx_search(
    seq: &EncodedSequence,
    rm: ReadMode,
    pattern: &[u8],
    max_distance: u64,
    report: &mut dyn FnMut(ApproxMatch),
) -> Result<()> {
    if pattern.is_empty() {
        return Ok(());
    }
    let vectors = BitVectors::new(pattern)?;
    if max_distance >= vectors.pattern_length {
        return Err(IndexError::DistanceTooLarge {
            distance: max_distance,
            pattern_length: vectors.pattern_length,
        });
    }
    let n = seq.total_length();
    let mut state = State::reset(vectors.pattern_length);
    let mut scan = seq.scan_from(0, rm.reversed());
    let mut pos = 0u64;
    while let Some(sym) = scan.next_symbol() {
        match sym {
            SEPARATOR => state = State::reset(vectors.pattern_length),
            sym => {
                let eq = if sym == WILDCARD {
                    0
                } else {
                    vectors.eqs_rev[sym as usize]
                };
                state.step(eq, vectors.ebit, 0);
                if state.score <= max_distance {
                    let start = n - 1 - pos;
                    match forward_match_length(seq, rm, &vectors, start, max_distance) {
                        Some(length) => report(ApproxMatch {
                            start,
                            length,
                            distance: state.score,
                        }),
                        // The backward scan only reports starts with an
                        // in-bound window, which the anchored forward
                        // pass always recovers.
                        None => unreachable!("match start without a recoverable window"),
                    }
                }
            }
        }
        pos += 1;
    }
    Ok(())
}

/// Length of the shortest window beginning at `start` whose edit
/// distance to the pattern stays within the bound. The column is
/// anchored at `start`, so the score after `l` symbols is the exact
/// distance of the pattern against that window. A window within the
/// bound is at most `pattern_length + max_distance` long and never
/// crosses a separator, so the scan budget is tight.
fn forward_match_length(
    seq: &EncodedSequence,
    rm: ReadMode,
    vectors: &BitVectors,
    start: SeqPos,
    max_distance: u64,
) -> Option<u64> {
    if max_distance == 0 {
        return Some(vectors.pattern_length);
    }
    let mut state = State::reset(vectors.pattern_length);
    let mut scan = seq.scan_from(start, rm);
    let mut length = 0u64;
    while length < vectors.pattern_length + max_distance {
        let sym = scan.next_symbol()?;
        if sym == SEPARATOR {
            return None;
        }
        let eq = if sym == WILDCARD {
            0
        } else {
            vectors.eqs_fwd[sym as usize]
        };
        state.step(eq, vectors.ebit, 1);
        length += 1;
        if state.score <= max_distance {
            return Some(length);
        }
    }
    None
}
