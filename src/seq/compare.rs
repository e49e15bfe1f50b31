//! Suffix comparison under the pinned sort convention.
//!
//! Special symbols and the sequence end sort greater than every
//! regular symbol; ties between two specials fall back to ascending
//! absolute position. Both rules collapse into a single u64 key per
//! character: a regular symbol is its own value, a special (or the
//! end) at virtual pointer `p` becomes `COMPARE_OFFSET + p`. Distinct
//! suffixes therefore never compare equal.

use std::cmp::Ordering;

use crate::seq::encoded::{EncodedSequence, ReadMode, TwoBitBlock, UNITS_PER_BLOCK};

/// Offset placing special keys above every regular symbol value.
pub const COMPARE_OFFSET: u64 = 256;

/// Character-by-character or 32-symbol-block comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum CmpMode {
    CharByChar,
    Block,
}

impl CmpMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "char" => Some(CmpMode::CharByChar),
            "block" => Some(CmpMode::Block),
            _ => None,
        }
    }
}

/// Comparison key for the character of suffix `pos` at `depth`.
#[inline]
pub fn char_key(seq: &EncodedSequence, rm: ReadMode, pos: u64, depth: u64) -> u64 {
    let ptr = pos + depth;
    if ptr >= seq.total_length() {
        return COMPARE_OFFSET + ptr;
    }
    let sym = seq.get_char(ptr, rm);
    if crate::seq::alphabet::is_special(sym) {
        COMPARE_OFFSET + ptr
    } else {
        sym as u64
    }
}

/// Compares two blocks, returning the ordering and the number of
/// common leading units. Blocks cut short by a special or the end use
/// the position rule for the tail.
pub fn compare_blocks(a: &TwoBitBlock, b: &TwoBitBlock) -> (Ordering, u32) {
    let xor = a.bits ^ b.bits;
    let diff_at = (xor.leading_zeros() / 2).min(a.units).min(b.units);
    if diff_at < a.units && diff_at < b.units {
        let shift = 62 - 2 * diff_at;
        let sa = (a.bits >> shift) & 3;
        let sb = (b.bits >> shift) & 3;
        return (sa.cmp(&sb), diff_at);
    }
    match a.units.cmp(&b.units) {
        // The shorter block hits a special first, which sorts high.
        Ordering::Less => (Ordering::Greater, a.units),
        Ordering::Greater => (Ordering::Less, b.units),
        Ordering::Equal => {
            if a.units < UNITS_PER_BLOCK {
                // Both hit a special at the same depth; ascending
                // pointer wins, and equal starts mean equal blocks.
                (a.position.cmp(&b.position), a.units)
            } else {
                (Ordering::Equal, a.units)
            }
        }
    }
}

/// Result of a (possibly depth-bounded) suffix comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CmpResult {
    pub ord: Ordering,
    /// Length of the common prefix; equals the bound when `ord` is
    /// `Equal` under a `max_depth`.
    pub lcp: u64,
}

/// Compares the suffixes at `a_pos` and `b_pos`, both known to agree
/// on their first `depth` characters. With `max_depth` set the
/// comparison stops there and reports `Equal`; otherwise distinct
/// suffixes always resolve.
pub fn compare_suffixes(
    seq: &EncodedSequence,
    rm: ReadMode,
    mode: CmpMode,
    a_pos: u64,
    b_pos: u64,
    depth: u64,
    max_depth: Option<u64>,
) -> CmpResult {
    debug_assert_ne!(a_pos, b_pos);
    let mut d = depth;
    loop {
        if let Some(md) = max_depth {
            if d >= md {
                return CmpResult {
                    ord: Ordering::Equal,
                    lcp: md,
                };
            }
        }
        match mode {
            CmpMode::CharByChar => {
                let ka = char_key(seq, rm, a_pos, d);
                let kb = char_key(seq, rm, b_pos, d);
                match ka.cmp(&kb) {
                    Ordering::Equal => {
                        debug_assert!(ka < COMPARE_OFFSET);
                        d += 1;
                    }
                    ord => return CmpResult { ord, lcp: d },
                }
            }
            CmpMode::Block => {
                let ba = seq.extract_block(a_pos + d, rm);
                let bb = seq.extract_block(b_pos + d, rm);
                let (ord, common) = compare_blocks(&ba, &bb);
                let lcp = d + common as u64;
                if ord == Ordering::Equal {
                    debug_assert_eq!(common, UNITS_PER_BLOCK);
                    d = lcp;
                } else if let Some(md) = max_depth {
                    if lcp >= md {
                        return CmpResult {
                            ord: Ordering::Equal,
                            lcp: md,
                        };
                    }
                    return CmpResult { ord, lcp };
                } else {
                    return CmpResult { ord, lcp };
                }
            }
        }
    }
}
