//! Maximal repeated pair enumeration over the lcp-interval tree.
//!
//! A pair of positions repeats a substring of length `l` maximally
//! when the match extends neither left nor right. Right-maximality is
//! structural: pairs are only combined across distinct child edges of
//! an lcp-interval, so the symbols following the match differ. For
//! left-maximality every node keeps its leaf positions grouped by the
//! symbol preceding them; once a node has seen two different left
//! contexts it is left-diverse and pairs are emitted between groups
//! with different context.
//!
//! The groups are windows into shared per-symbol pools that grow in
//! traversal order, so a completed child's window sits directly after
//! its parent's and merging is a pair of length additions. Intervals
//! shallower than the requested length reset the pools; nothing below
//! the threshold is ever reported.

use crate::error::Result;
use crate::seq::{is_special, EncodedSequence, ReadMode};

use super::dfs::{depth_first_esa, DfsVisitor};
use super::types::SeqPos;

/// A substring of `length` repeated at `pos1` and `pos2`, extensible
/// in neither direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaximalPair {
    pub length: u64,
    pub pos1: SeqPos,
    pub pos2: SeqPos,
}

/// Symbol in front of a suffix. The sequence start, wildcards and
/// separators never match anything and count as unique contexts.
#[derive(Clone, Copy, PartialEq, Eq)]
enum LeftContext {
    Regular(u8),
    Unique,
}

/// Common left context of every leaf below a node so far.
#[derive(Clone, Copy, Default, PartialEq, Eq)]
enum CommonChar {
    Regular(u8),
    /// A single leaf with unique context; any further edge diversifies.
    Unique,
    #[default]
    Diverse,
}

fn narrow(common: CommonChar, ctx: LeftContext) -> CommonChar {
    match (common, ctx) {
        (CommonChar::Regular(a), LeftContext::Regular(b)) if a == b => common,
        _ => CommonChar::Diverse,
    }
}

/// Per-node payload: `(start, length)` windows into the visitor's
/// position pools, one per regular symbol, plus the unique-context
/// window.
#[derive(Default)]
pub struct PairNode {
    common: CommonChar,
    unique_start: usize,
    unique_len: usize,
    lists: Vec<(usize, usize)>,
}

pub struct MaxPairsVisitor<'a, F> {
    seq: &'a EncodedSequence,
    rm: ReadMode,
    least_length: u64,
    poslist: Vec<Vec<SeqPos>>,
    uniquechar: Vec<SeqPos>,
    cleared: bool,
    report: F,
}

impl<'a, F: FnMut(MaximalPair)> MaxPairsVisitor<'a, F> {
    pub fn new(seq: &'a EncodedSequence, rm: ReadMode, least_length: u64, report: F) -> Self {
        assert!(least_length >= 1);
        MaxPairsVisitor {
            seq,
            rm,
            least_length,
            poslist: vec![Vec::new(); seq.num_of_chars() as usize],
            uniquechar: Vec::new(),
            cleared: true,
            report,
        }
    }

    /// Positions stored below an interval shallower than the least
    /// length are dead; drop them so the pools stay small.
    fn clear_pools(&mut self) {
        if !self.cleared {
            for list in &mut self.poslist {
                list.clear();
            }
            self.uniquechar.clear();
            self.cleared = true;
        }
    }

    fn left_context(&self, leaf: SeqPos) -> LeftContext {
        if leaf == 0 {
            return LeftContext::Unique;
        }
        let sym = self.seq.get_char(leaf - 1, self.rm);
        if is_special(sym) {
            LeftContext::Unique
        } else {
            LeftContext::Regular(sym)
        }
    }

    fn add_position(&mut self, node: &mut PairNode, ctx: LeftContext, leaf: SeqPos) {
        match ctx {
            LeftContext::Regular(base) => {
                self.poslist[base as usize].push(leaf);
                node.lists[base as usize].1 += 1;
            }
            LeftContext::Unique => {
                self.uniquechar.push(leaf);
                node.unique_len += 1;
            }
        }
    }

    /// The new leaf against every position of `node` whose left
    /// context differs from `ctx`.
    fn pairs_with_leaf(&mut self, depth: u64, node: &PairNode, ctx: LeftContext, leaf: SeqPos) {
        let skip = match ctx {
            LeftContext::Regular(base) => Some(base as usize),
            LeftContext::Unique => None,
        };
        for (base, &(start, len)) in node.lists.iter().enumerate() {
            if Some(base) == skip {
                continue;
            }
            for &other in &self.poslist[base][start..start + len] {
                (self.report)(MaximalPair {
                    length: depth,
                    pos1: other,
                    pos2: leaf,
                });
            }
        }
        let start = node.unique_start;
        for &other in &self.uniquechar[start..start + node.unique_len] {
            (self.report)(MaximalPair {
                length: depth,
                pos1: other,
                pos2: leaf,
            });
        }
    }

    /// Cross products between a node's groups and a completed child's
    /// groups, skipping equal regular contexts.
    fn pairs_across(&mut self, depth: u64, node: &PairNode, child: &PairNode) {
        for (nb, &(nstart, nlen)) in node.lists.iter().enumerate() {
            for (cb, &(cstart, clen)) in child.lists.iter().enumerate() {
                if nb == cb {
                    continue;
                }
                for &p1 in &self.poslist[nb][nstart..nstart + nlen] {
                    for &p2 in &self.poslist[cb][cstart..cstart + clen] {
                        (self.report)(MaximalPair {
                            length: depth,
                            pos1: p1,
                            pos2: p2,
                        });
                    }
                }
            }
            for &p1 in &self.poslist[nb][nstart..nstart + nlen] {
                for &p2 in
                    &self.uniquechar[child.unique_start..child.unique_start + child.unique_len]
                {
                    (self.report)(MaximalPair {
                        length: depth,
                        pos1: p1,
                        pos2: p2,
                    });
                }
            }
        }
        for &p1 in &self.uniquechar[node.unique_start..node.unique_start + node.unique_len] {
            for (cb, &(cstart, clen)) in child.lists.iter().enumerate() {
                for &p2 in &self.poslist[cb][cstart..cstart + clen] {
                    (self.report)(MaximalPair {
                        length: depth,
                        pos1: p1,
                        pos2: p2,
                    });
                }
            }
            for &p2 in &self.uniquechar[child.unique_start..child.unique_start + child.unique_len] {
                (self.report)(MaximalPair {
                    length: depth,
                    pos1: p1,
                    pos2: p2,
                });
            }
        }
    }
}

impl<F: FnMut(MaximalPair)> DfsVisitor for MaxPairsVisitor<'_, F> {
    type Info = PairNode;

    fn leaf_edge(
        &mut self,
        first: bool,
        depth: SeqPos,
        info: &mut PairNode,
        leaf: SeqPos,
    ) -> Result<()> {
        if depth < self.least_length {
            self.clear_pools();
            return Ok(());
        }
        self.cleared = false;
        let ctx = self.left_context(leaf);
        if first {
            info.common = match ctx {
                LeftContext::Regular(base) => CommonChar::Regular(base),
                LeftContext::Unique => CommonChar::Unique,
            };
            info.unique_start = self.uniquechar.len();
            info.unique_len = 0;
            info.lists.resize(self.poslist.len(), (0, 0));
            for (base, window) in info.lists.iter_mut().enumerate() {
                *window = (self.poslist[base].len(), 0);
            }
            self.add_position(info, ctx, leaf);
            return Ok(());
        }
        info.common = narrow(info.common, ctx);
        if info.common == CommonChar::Diverse {
            self.pairs_with_leaf(depth, info, ctx, leaf);
        }
        self.add_position(info, ctx, leaf);
        Ok(())
    }

    fn branch_edge(
        &mut self,
        _first: bool,
        depth: SeqPos,
        info: &mut PairNode,
        child: Option<&mut PairNode>,
    ) -> Result<()> {
        if depth < self.least_length {
            self.clear_pools();
            return Ok(());
        }
        self.cleared = false;
        // An absent child opened this node with the child's own
        // payload; its groups already are the node's groups.
        let Some(child) = child else {
            return Ok(());
        };
        if info.common != CommonChar::Diverse {
            info.common = match child.common {
                CommonChar::Regular(base) => narrow(info.common, LeftContext::Regular(base)),
                _ => CommonChar::Diverse,
            };
        }
        if info.common == CommonChar::Diverse {
            self.pairs_across(depth, info, child);
        }
        // The child's pool entries sit directly after the node's own;
        // widening the windows concatenates the groups.
        for (window, &(_, clen)) in info.lists.iter_mut().zip(child.lists.iter()) {
            window.1 += clen;
        }
        info.unique_len += child.unique_len;
        Ok(())
    }

    fn complete_node(&mut self, _depth: SeqPos, _info: &mut PairNode, _below: SeqPos) -> Result<()> {
        Ok(())
    }
}

/// Enumerates every maximal repeated pair of length at least
/// `least_length`, in one pass over the esa entries.
pub fn enumerate_maximal_pairs<E, F>(
    seq: &EncodedSequence,
    rm: ReadMode,
    entries: E,
    least_length: u64,
    report: F,
) -> Result<()>
where
    E: IntoIterator<Item = (SeqPos, u64)>,
    F: FnMut(MaximalPair),
{
    let mut visitor = MaxPairsVisitor::new(seq, rm, least_length, report);
    depth_first_esa(entries, &mut visitor)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::index::driver::{sort_suffixes, SegmentCollector, SuffixSortOptions};
    use crate::seq::{Alphabet, SEPARATOR, WILDCARD};

    fn esa_entries(seq: &EncodedSequence) -> Vec<(SeqPos, u64)> {
        let mut out = SegmentCollector::new();
        sort_suffixes(
            seq,
            ReadMode::Forward,
            &SuffixSortOptions::default(),
            &mut out,
            None,
        )
        .unwrap();
        (0..out.suftab.len())
            .map(|i| (out.suftab[i], out.lcp_value(i)))
            .collect()
    }

    fn collected(symbols: &[u8], least: u64) -> BTreeSet<(u64, SeqPos, SeqPos)> {
        let seq = EncodedSequence::from_symbols(symbols, 4).unwrap();
        let entries = esa_entries(&seq);
        let mut found = BTreeSet::new();
        enumerate_maximal_pairs(&seq, ReadMode::Forward, entries, least, |pair| {
            let lo = pair.pos1.min(pair.pos2);
            let hi = pair.pos1.max(pair.pos2);
            assert!(found.insert((pair.length, lo, hi)), "duplicate {pair:?}");
        })
        .unwrap();
        found
    }

    fn symbols_match(a: u8, b: u8) -> bool {
        a == b && !is_special(a)
    }

    /// Every position pair, checked directly for two-sided maximality.
    fn reference(symbols: &[u8], least: u64) -> BTreeSet<(u64, SeqPos, SeqPos)> {
        let n = symbols.len();
        let mut found = BTreeSet::new();
        for p1 in 0..n {
            for p2 in p1 + 1..n {
                if p1 > 0 && symbols_match(symbols[p1 - 1], symbols[p2 - 1]) {
                    continue;
                }
                let mut len = 0;
                while p2 + len < n && symbols_match(symbols[p1 + len], symbols[p2 + len]) {
                    len += 1;
                }
                if len as u64 >= least {
                    found.insert((len as u64, p1 as u64, p2 as u64));
                }
            }
        }
        found
    }

    #[test]
    fn pairs_match_the_direct_enumeration() {
        let alphabet = Alphabet::dna();
        for text in [
            &b"gtacgtaccgtacgg"[..],
            b"acacacacac",
            b"gtgtaagtgtcgtgta",
        ] {
            let symbols = alphabet.map_bytes(text);
            for least in [1u64, 2, 3, 4] {
                assert_eq!(
                    collected(&symbols, least),
                    reference(&symbols, least),
                    "text {:?} least {least}",
                    std::str::from_utf8(text).unwrap()
                );
            }
        }
    }

    #[test]
    fn pairs_cross_sequence_separators() {
        let alphabet = Alphabet::dna();
        let mut symbols = alphabet.map_bytes(b"acgtac");
        symbols.push(SEPARATOR);
        symbols.extend(alphabet.map_bytes(b"tacgta"));
        assert_eq!(collected(&symbols, 2), reference(&symbols, 2));
        // "acgta" repeats across the separator.
        assert!(collected(&symbols, 2).contains(&(5, 0, 8)));
    }

    #[test]
    fn wildcard_contexts_never_match() {
        let alphabet = Alphabet::dna();
        let mut symbols = alphabet.map_bytes(b"cacgtg");
        symbols.push(WILDCARD);
        symbols.extend(alphabet.map_bytes(b"acgtgg"));
        let found = collected(&symbols, 3);
        assert_eq!(found, reference(&symbols, 3));
        // Both copies of "acgtg" survive: the second one's left
        // context is the wildcard, which matches nothing.
        assert!(found.contains(&(5, 1, 7)));
    }

    #[test]
    fn least_length_is_a_hard_floor() {
        let alphabet = Alphabet::dna();
        let symbols = alphabet.map_bytes(b"gtacgtaccgtacgg");
        for least in [2u64, 4, 6] {
            assert!(collected(&symbols, least)
                .iter()
                .all(|&(len, _, _)| len >= least));
        }
    }
}
