//! Blind-trie sorting for small suffix ranges.
//!
//! Suffixes sharing a known common prefix of `offset` symbols are
//! inserted one by one into a trie that only materializes branch
//! depths, not edge labels: locating the insertion point needs a
//! single suffix comparison against one leaf of the current tree. A
//! final depth-first enumeration emits the suffixes in order together
//! with their LCP values, which are exactly the branch depths.
//!
//! Wildcards, separators, and the boundary collapse onto one trie
//! character that sorts above every regular symbol; equal special
//! characters keep insertion order, so suffixes must arrive in
//! ascending start-position order. The node pool is preallocated for
//! the largest range the strategy routes here.

use std::cmp::Ordering;

use crate::seq::alphabet::{is_special, SEPARATOR};
use crate::seq::{compare_suffixes, CmpMode, EncodedSequence, ReadMode};

use super::lcp::LcpOutputBuffer;
use super::types::{Ordertype, SeqPos};

const NIL: u32 = u32::MAX;

#[derive(Clone, Copy)]
struct Node {
    /// Branch depth; leaves keep 0 here.
    depth: SeqPos,
    /// Leaf: suffix start position. Branch: first-child index.
    either: u64,
    rightsibling: u32,
    first_char: u8,
    leaf: bool,
}

/// Order of two trie characters: specials sort high, and an old
/// special never equals a new one, so later-inserted specials become
/// right siblings and keep insertion order.
#[inline]
fn compare_chars(old: u8, new: u8) -> Ordering {
    if old > new {
        Ordering::Greater
    } else if old < new || is_special(old) {
        Ordering::Less
    } else {
        Ordering::Equal
    }
}

pub struct BlindTrie<'a> {
    seq: &'a EncodedSequence,
    rm: ReadMode,
    cmp_mode: CmpMode,
    nodes: Vec<Node>,
    stack: Vec<u32>,
    root: u32,
    offset: SeqPos,
    /// Bounded sort depth relative to the suffix starts (the absolute
    /// bound minus `offset`); `None` sorts to full resolution.
    max_rel_depth: Option<SeqPos>,
}

impl<'a> BlindTrie<'a> {
    /// Allocates a trie for ranges of up to `max_suffixes` suffixes.
    pub fn new(
        seq: &'a EncodedSequence,
        rm: ReadMode,
        cmp_mode: CmpMode,
        max_suffixes: usize,
    ) -> Self {
        BlindTrie {
            seq,
            rm,
            cmp_mode,
            nodes: Vec::with_capacity(2 * (max_suffixes + 1) + 1),
            stack: Vec::new(),
            root: NIL,
            offset: 0,
            max_rel_depth: None,
        }
    }

    #[inline]
    fn node(&self, r: u32) -> &Node {
        &self.nodes[r as usize]
    }

    /// True while `start + add` is left of this suffix's comparison
    /// boundary (sequence end, or the bounded depth).
    fn is_left_of_boundary(&self, start: SeqPos, add: SeqPos) -> bool {
        let endpos = match self.max_rel_depth {
            Some(rel) => (start + rel).min(self.seq.total_length()),
            None => self.seq.total_length(),
        };
        start + add < endpos
    }

    /// Trie character of the suffix starting at `start`, `add` symbols
    /// in: a regular symbol, or [`SEPARATOR`] for anything special or
    /// beyond the boundary.
    fn trie_char(&self, start: SeqPos, add: SeqPos) -> u8 {
        if self.is_left_of_boundary(start, add) {
            let sym = self.seq.get_char(start + add, self.rm);
            if is_special(sym) { SEPARATOR } else { sym }
        } else {
            SEPARATOR
        }
    }

    fn new_node(&mut self, node: Node) -> u32 {
        debug_assert!(self.nodes.len() < self.nodes.capacity());
        self.nodes.push(node);
        (self.nodes.len() - 1) as u32
    }

    fn make_root(&mut self, first_start: SeqPos) -> u32 {
        let first_char = self.trie_char(first_start, 0);
        let leaf = self.new_node(Node {
            depth: 0,
            either: first_start,
            rightsibling: NIL,
            first_char,
            leaf: true,
        });
        self.new_node(Node {
            depth: 0,
            either: leaf as u64,
            rightsibling: NIL,
            first_char: 0,
            leaf: false,
        })
    }

    fn extract_leaf(&self, mut head: u32) -> u32 {
        while !self.node(head).leaf {
            head = self.node(head).either as u32;
        }
        head
    }

    fn find_succ(&self, mut node: u32, new_char: u8) -> Option<u32> {
        loop {
            match compare_chars(self.node(node).first_char, new_char) {
                Ordering::Equal => return Some(node),
                Ordering::Greater => return None,
                Ordering::Less => {
                    node = self.node(node).rightsibling;
                    if node == NIL {
                        return None;
                    }
                }
            }
        }
    }

    /// Descends to the leaf the new suffix must be compared against,
    /// recording the path on the stack.
    fn find_companion(&mut self, current_start: SeqPos) -> u32 {
        self.stack.clear();
        let mut head = self.root;
        while !self.node(head).leaf {
            self.stack.push(head);
            let new_char = self.trie_char(current_start, self.node(head).depth);
            if is_special(new_char) {
                return self.extract_leaf(head);
            }
            match self.find_succ(self.node(head).either as u32, new_char) {
                Some(succ) => head = succ,
                None => return self.extract_leaf(head),
            }
        }
        self.stack.push(head);
        head
    }

    /// Compares the new suffix with a leaf's suffix, returning the
    /// relative LCP and the two mismatching trie characters.
    fn get_lcp(&self, leaf_start: SeqPos, current_start: SeqPos) -> (SeqPos, u8, u8) {
        let r = compare_suffixes(
            self.seq,
            self.rm,
            self.cmp_mode,
            leaf_start,
            current_start,
            0,
            self.max_rel_depth,
        );
        let lcp = r.lcp;
        (
            lcp,
            self.trie_char(leaf_start, lcp),
            self.trie_char(current_start, lcp),
        )
    }

    fn insert_suffix(
        &mut self,
        oldnode: u32,
        mm_old: u8,
        lcp: SeqPos,
        mm_new: u8,
        current_start: SeqPos,
    ) {
        debug_assert!(
            is_special(mm_old)
                || is_special(mm_new)
                || mm_old != mm_new
                || self.node(oldnode).leaf
                || self.node(oldnode).depth == lcp
        );
        // Split oldnode when the mismatch sits above its depth: a new
        // node inherits depth, children, and the old mismatch char.
        if self.node(oldnode).depth != lcp {
            let old = *self.node(oldnode);
            let newnode = self.new_node(Node {
                depth: old.depth,
                either: old.either,
                rightsibling: NIL,
                first_char: mm_old,
                leaf: old.leaf,
            });
            let on = &mut self.nodes[oldnode as usize];
            on.depth = lcp;
            on.leaf = false;
            on.either = newnode as u64;
        }
        debug_assert_eq!(self.node(oldnode).depth, lcp);
        let newleaf = self.new_node(Node {
            depth: 0,
            either: current_start,
            rightsibling: NIL,
            first_char: mm_new,
            leaf: true,
        });
        // Keep siblings ordered; equal specials stay behind earlier
        // insertions.
        let mut previous = NIL;
        let mut current = self.node(oldnode).either as u32;
        while current != NIL && compare_chars(self.node(current).first_char, mm_new) == Ordering::Less
        {
            previous = current;
            current = self.node(current).rightsibling;
        }
        if previous != NIL {
            self.nodes[previous as usize].rightsibling = newleaf;
        } else {
            self.nodes[oldnode as usize].either = newleaf as u64;
        }
        self.nodes[newleaf as usize].rightsibling = current;
    }

    /// Depth-first leaf enumeration: writes the sorted suffixes back
    /// into `suffixes` and the branch depths into the LCP buffer at
    /// `lcp_base + local index`. Under a bounded depth, maximal runs
    /// of still-equal suffixes go to `unsorted` as local inclusive
    /// ranges.
    #[allow(clippy::too_many_arguments)]
    fn enumerate_leaves(
        &mut self,
        suffixes: &mut [SeqPos],
        lcp_out: &mut LcpOutputBuffer,
        lcp_base: usize,
        unsorted: &mut dyn FnMut(usize, usize, SeqPos),
    ) -> usize {
        let max_depth = self.max_rel_depth.map(|rel| rel + self.offset);
        let mut ready_for_pop = false;
        let mut next_free = 0usize;
        let mut equals_range_width = 0usize;
        let mut lcpnode = self.root;
        self.stack.clear();
        self.stack.push(self.root);
        let mut current = self.node(self.root).either as u32;
        let mut current_is_leaf = self.node(current).leaf;
        loop {
            if current_is_leaf {
                if next_free > 0 {
                    let lcpvalue = self.node(lcpnode).depth + self.offset;
                    lcp_out.set(lcp_base + next_free, lcpvalue);
                    if let Some(md) = max_depth {
                        if lcpvalue == md {
                            equals_range_width += 1;
                        } else {
                            debug_assert!(lcpvalue < md);
                            if equals_range_width > 0 {
                                unsorted(
                                    next_free - 1 - equals_range_width,
                                    next_free - 1,
                                    md,
                                );
                                equals_range_width = 0;
                            }
                        }
                    }
                }
                suffixes[next_free] = self.node(current).either - self.offset;
                next_free += 1;
                let sibling = self.node(current).rightsibling;
                if sibling == NIL {
                    ready_for_pop = true;
                    current_is_leaf = false;
                } else {
                    current = sibling;
                    current_is_leaf = self.node(current).leaf;
                    lcpnode = self.stack[self.stack.len() - 1];
                }
            } else if ready_for_pop {
                if self.stack.len() == 1 {
                    break;
                }
                let popped = self.stack.pop().unwrap();
                let sibling = self.node(popped).rightsibling;
                if sibling != NIL {
                    current = sibling;
                    current_is_leaf = self.node(current).leaf;
                    lcpnode = self.stack[self.stack.len() - 1];
                    ready_for_pop = false;
                }
            } else {
                self.stack.push(current);
                current = self.node(current).either as u32;
                current_is_leaf = self.node(current).leaf;
            }
        }
        if next_free > 0 && equals_range_width > 0 {
            unsorted(
                next_free - 1 - equals_range_width,
                next_free - 1,
                max_depth.unwrap(),
            );
        }
        next_free
    }

    /// Sorts `suffixes`, all sharing their first `offset` symbols,
    /// writing LCPs at `lcp_base + 1 ..` of the staging buffer (the
    /// entry at `lcp_base` itself belongs to the caller's boundary).
    #[allow(clippy::too_many_arguments)]
    pub fn sort(
        &mut self,
        suffixes: &mut [SeqPos],
        lcp_out: &mut LcpOutputBuffer,
        lcp_base: usize,
        offset: SeqPos,
        max_depth: Option<SeqPos>,
        order: Ordertype,
        unsorted: &mut dyn FnMut(usize, usize, SeqPos),
    ) {
        match order {
            Ordertype::NoOrder => suffixes.sort_unstable(),
            Ordertype::Descending => {
                debug_assert!(suffixes.windows(2).all(|w| w[0] > w[1]));
                suffixes.reverse();
            }
            Ordertype::Ascending => {
                debug_assert!(suffixes.windows(2).all(|w| w[0] < w[1]));
            }
        }
        debug_assert!(max_depth.is_none_or(|md| md > offset));
        self.offset = offset;
        self.max_rel_depth = max_depth.map(|md| md - offset);
        self.nodes.clear();
        self.root = self.make_root(suffixes[0] + offset);
        let mut inserted = 1usize;
        for idx in 1..suffixes.len() {
            let current_start = suffixes[idx] + offset;
            // A suffix whose remainder is empty is the range maximum;
            // ascending insertion order puts it last already.
            if !self.is_left_of_boundary(current_start, 0) {
                break;
            }
            let leaf = self.find_companion(current_start);
            debug_assert!(self.node(leaf).leaf);
            let (lcp, mm_old, mm_new) = self.get_lcp(self.node(leaf).either, current_start);
            // Walk the recorded path down to the deepest node above
            // the mismatch.
            let mut target = self.root;
            for &node in &self.stack {
                target = node;
                if self.node(node).leaf || self.node(node).depth >= lcp {
                    break;
                }
            }
            self.insert_suffix(target, mm_old, lcp, mm_new, current_start);
            inserted += 1;
        }
        let emitted = self.enumerate_leaves(suffixes, lcp_out, lcp_base, unsorted);
        debug_assert_eq!(emitted, inserted);
        // Suffixes skipped by the boundary check keep their slots;
        // their whole remainder equals the shared prefix.
        for idx in inserted..suffixes.len() {
            lcp_out.set(lcp_base + idx, offset);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seq::Alphabet;
    use std::cmp::Ordering as Ord_;

    fn encode(s: &str) -> EncodedSequence {
        let a = Alphabet::dna();
        EncodedSequence::from_symbols(&a.map_bytes(s.as_bytes()), 4).unwrap()
    }

    fn full_cmp(seq: &EncodedSequence, a: u64, b: u64) -> Ord_ {
        compare_suffixes(seq, ReadMode::Forward, CmpMode::CharByChar, a, b, 0, None).ord
    }

    fn run_trie(
        seq: &EncodedSequence,
        cmp_mode: CmpMode,
        mut suffixes: Vec<u64>,
        offset: u64,
    ) -> (Vec<u64>, Vec<u64>) {
        let mut trie = BlindTrie::new(seq, ReadMode::Forward, cmp_mode, suffixes.len());
        let mut lcp = LcpOutputBuffer::new();
        lcp.reset(suffixes.len());
        lcp.set(0, 0);
        trie.sort(
            &mut suffixes,
            &mut lcp,
            0,
            offset,
            None,
            Ordertype::NoOrder,
            &mut |_, _, _| panic!("no bounded ranges expected"),
        );
        let lcps = (1..suffixes.len()).map(|i| lcp.value(i)).collect();
        (suffixes, lcps)
    }

    #[test]
    fn sorts_and_reports_lcps() {
        let seq = encode("gtacatacagtacaca");
        for cmp_mode in [CmpMode::CharByChar, CmpMode::Block] {
            let all: Vec<u64> = (0..seq.total_length()).collect();
            let (sorted, lcps) = run_trie(&seq, cmp_mode, all, 0);
            for w in sorted.windows(2) {
                assert_eq!(full_cmp(&seq, w[0], w[1]), Ord_::Less);
            }
            for (i, w) in sorted.windows(2).enumerate() {
                let r = compare_suffixes(
                    &seq,
                    ReadMode::Forward,
                    CmpMode::CharByChar,
                    w[0],
                    w[1],
                    0,
                    None,
                );
                assert_eq!(lcps[i], r.lcp, "lcp between {} and {}", w[0], w[1]);
            }
        }
    }

    #[test]
    fn specials_order_by_position() {
        // Suffixes 1 and 4 both read "a" then a wildcard; the earlier
        // wildcard pointer sorts first.
        let seq = encode("cangantt");
        let (sorted, lcps) = run_trie(&seq, CmpMode::CharByChar, vec![4, 1], 0);
        assert_eq!(sorted, vec![1, 4]);
        assert_eq!(lcps, vec![1]);
    }

    #[test]
    fn offset_is_added_to_lcps() {
        // Suffixes 0 and 4 share "acg" before diverging (t vs end).
        let seq = encode("acgtacg");
        let (sorted, lcps) = run_trie(&seq, CmpMode::Block, vec![0, 4], 2);
        assert_eq!(sorted, vec![0, 4]);
        assert_eq!(lcps, vec![3]);
    }

    #[test]
    fn bounded_depth_reports_equal_ranges() {
        let seq = encode(&"a".repeat(64));
        let mut suffixes: Vec<u64> = vec![8, 2, 5, 40];
        let mut trie = BlindTrie::new(&seq, ReadMode::Forward, CmpMode::Block, suffixes.len());
        let mut lcp = LcpOutputBuffer::new();
        lcp.reset(suffixes.len());
        lcp.set(0, 0);
        let mut ranges = Vec::new();
        trie.sort(
            &mut suffixes,
            &mut lcp,
            0,
            0,
            Some(10),
            Ordertype::NoOrder,
            &mut |l, r, d| ranges.push((l, r, d)),
        );
        // All four suffixes read at least 10 'a's, so the whole range
        // stays equal at the bound, in ascending position order.
        assert_eq!(suffixes, vec![2, 5, 8, 40]);
        assert_eq!(ranges, vec![(0, 3, 10)]);
        for i in 1..4 {
            assert_eq!(lcp.value(i), 10);
        }
    }
}
