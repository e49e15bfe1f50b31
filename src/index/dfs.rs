//! Bottom-up depth-first traversal of the virtual suffix tree.
//!
//! The traversal consumes `(suffix, lcp)` entries in rank order and
//! replays them as suffix-tree edges: an interval stack tracks the
//! chain of open lcp-intervals, a falling lcp value closes intervals,
//! a rising one opens a new child. Visitors get leaf edges, branch
//! edges and completed nodes, each with a pooled per-node payload, so
//! repeat finding, branch statistics and similar analyses run in one
//! sequential pass without materializing the tree.

use crate::error::Result;

use super::types::SeqPos;

/// Callbacks fired during [`depth_first_esa`]. Node payloads of type
/// `Info` live in a pool alongside the interval stack; a payload is
/// reused once its node has been completed.
pub trait DfsVisitor {
    type Info: Default;

    /// Leaf attached to the node `info`; `first` marks the edge that
    /// opened the node.
    fn leaf_edge(&mut self, first: bool, depth: SeqPos, info: &mut Self::Info, leaf: SeqPos)
        -> Result<()>;

    /// Completed child node handed up to its parent `info`. `child`
    /// is `None` only on the branch edge that opens a node directly
    /// above a completed child: the node then inherits that child's
    /// pooled payload as its own, so there is nothing to merge.
    /// Visitors accumulating per-node data should reset their payload
    /// on `leaf_edge` with `first` set, and only there.
    fn branch_edge(
        &mut self,
        first: bool,
        depth: SeqPos,
        info: &mut Self::Info,
        child: Option<&mut Self::Info>,
    ) -> Result<()>;

    /// Node is complete: all its edges have been reported.
    /// `below_depth` is the depth of its parent interval.
    fn complete_node(&mut self, depth: SeqPos, info: &mut Self::Info, below_depth: SeqPos)
        -> Result<()>;

    /// Rank of the node's leftmost leaf, available when it opens.
    fn leftmost_leaf(&mut self, _info: &mut Self::Info, _rank: u64) {}

    /// Rank of the node's rightmost leaf, available when it closes.
    fn rightmost_leaf(&mut self, _info: &mut Self::Info, _rank: u64) {}
}

struct Interval<I> {
    depth: SeqPos,
    last_is_leaf_edge: bool,
    info: I,
}

/// Runs `visitor` over the entries of an enhanced suffix array given
/// in rank order. The entry at rank 0 carries no lcp information;
/// every further entry's lcp value relates it to its predecessor.
pub fn depth_first_esa<V, E>(entries: E, visitor: &mut V) -> Result<()>
where
    V: DfsVisitor,
    E: IntoIterator<Item = (SeqPos, u64)>,
{
    // The stack is a pool: popping keeps the element alive so the
    // parent can consume the completed child's payload.
    let mut stack: Vec<Interval<V::Info>> = Vec::new();
    let mut next_free = 0usize;
    let push = |stack: &mut Vec<Interval<V::Info>>, next_free: &mut usize, depth: SeqPos| {
        if *next_free == stack.len() {
            stack.push(Interval {
                depth,
                last_is_leaf_edge: true,
                info: V::Info::default(),
            });
        } else {
            stack[*next_free].depth = depth;
            stack[*next_free].last_is_leaf_edge = true;
        }
        *next_free += 1;
    };

    push(&mut stack, &mut next_free, 0);
    visitor.leftmost_leaf(&mut stack[0].info, 0);

    let mut iter = entries.into_iter();
    let Some((first_suffix, _)) = iter.next() else {
        return Ok(());
    };
    let mut previous_suffix = first_suffix;
    let mut first_root_edge = true;
    let mut current_index = 0u64;

    for (suffix, current_lcp) in iter {
        while current_lcp < stack[next_free - 1].depth {
            let top = &mut stack[next_free - 1];
            if top.last_is_leaf_edge {
                let depth = top.depth;
                visitor.leaf_edge(false, depth, &mut top.info, previous_suffix)?;
            } else {
                let (lower, upper) = stack.split_at_mut(next_free);
                let top = &mut lower[next_free - 1];
                visitor.branch_edge(false, top.depth, &mut top.info, Some(&mut upper[0].info))?;
            }
            let below_depth = if next_free >= 2 {
                stack[next_free - 2].depth
            } else {
                0
            };
            let top = &mut stack[next_free - 1];
            visitor.rightmost_leaf(&mut top.info, current_index);
            let depth = top.depth;
            visitor.complete_node(depth, &mut top.info, below_depth)?;
            next_free -= 1;
        }
        let top_depth = stack[next_free - 1].depth;
        if current_lcp == top_depth {
            let first_edge = first_root_edge && top_depth == 0;
            if first_edge {
                first_root_edge = false;
            }
            if stack[next_free - 1].last_is_leaf_edge {
                let top = &mut stack[next_free - 1];
                visitor.leaf_edge(first_edge, top_depth, &mut top.info, previous_suffix)?;
            } else {
                // A closed edge on the interval means the while loop
                // just completed a child; it sits one slot above.
                let (lower, upper) = stack.split_at_mut(next_free);
                let top = &mut lower[next_free - 1];
                visitor.branch_edge(
                    first_edge,
                    top_depth,
                    &mut top.info,
                    Some(&mut upper[0].info),
                )?;
                stack[next_free - 1].last_is_leaf_edge = true;
            }
        } else {
            push(&mut stack, &mut next_free, current_lcp);
            if stack[next_free - 2].last_is_leaf_edge {
                let top = &mut stack[next_free - 1];
                visitor.leftmost_leaf(&mut top.info, current_index);
                visitor.leaf_edge(true, current_lcp, &mut top.info, previous_suffix)?;
                stack[next_free - 2].last_is_leaf_edge = false;
            } else {
                let top = &mut stack[next_free - 1];
                visitor.branch_edge(true, current_lcp, &mut top.info, None)?;
            }
        }
        previous_suffix = suffix;
        current_index += 1;
    }

    // The entries always end on the empty suffix with lcp 0, so only
    // the root interval is still open here.
    if stack[next_free - 1].last_is_leaf_edge {
        let top = &mut stack[next_free - 1];
        let depth = top.depth;
        visitor.leaf_edge(false, depth, &mut top.info, previous_suffix)?;
        visitor.rightmost_leaf(&mut top.info, current_index);
        visitor.complete_node(depth, &mut top.info, 0)?;
    }
    Ok(())
}

/// Branch statistics gathered in one traversal: node and leaf counts
/// plus the deepest branching node.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BranchStats {
    pub leaves: u64,
    pub branch_nodes: u64,
    pub max_node_depth: u64,
}

#[derive(Default)]
pub struct BranchStatsVisitor {
    pub stats: BranchStats,
}

impl DfsVisitor for BranchStatsVisitor {
    type Info = ();

    fn leaf_edge(&mut self, _first: bool, _depth: SeqPos, _info: &mut (), _leaf: SeqPos) -> Result<()> {
        self.stats.leaves += 1;
        Ok(())
    }

    fn branch_edge(
        &mut self,
        _first: bool,
        _depth: SeqPos,
        _info: &mut (),
        _child: Option<&mut ()>,
    ) -> Result<()> {
        Ok(())
    }

    fn complete_node(&mut self, depth: SeqPos, _info: &mut (), _below_depth: SeqPos) -> Result<()> {
        self.stats.branch_nodes += 1;
        self.stats.max_node_depth = self.stats.max_node_depth.max(depth);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::driver::{sort_suffixes, SegmentCollector, SuffixSortOptions};
    use crate::seq::{Alphabet, EncodedSequence, ReadMode, SEPARATOR};

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

    /// Collects each completed node as (depth, leaves below it).
    #[derive(Default)]
    struct NodeCollector {
        nodes: Vec<(u64, u64)>,
    }

    #[derive(Default)]
    struct LeafCount(u64);

    impl DfsVisitor for NodeCollector {
        type Info = LeafCount;

        fn leaf_edge(&mut self, first: bool, _d: SeqPos, info: &mut LeafCount, _l: SeqPos) -> Result<()> {
            if first {
                info.0 = 0;
            }
            info.0 += 1;
            Ok(())
        }

        fn branch_edge(
            &mut self,
            _f: bool,
            _d: SeqPos,
            info: &mut LeafCount,
            child: Option<&mut LeafCount>,
        ) -> Result<()> {
            // A `None` child opened this node with the child's own
            // payload; its count is already in `info`.
            if let Some(child) = child {
                info.0 += child.0;
            }
            Ok(())
        }

        fn complete_node(&mut self, depth: SeqPos, info: &mut LeafCount, _below: SeqPos) -> Result<()> {
            self.nodes.push((depth, info.0));
            Ok(())
        }
    }

    #[test]
    fn banana_tree_shape() {
        let alphabet = Alphabet::new(&["aA", "bB", "nN"]).unwrap();
        let mut symbols = alphabet.map_bytes(b"banana");
        symbols.push(SEPARATOR);
        let seq = EncodedSequence::from_symbols(&symbols, 3).unwrap();
        let entries = esa_entries(&seq);

        let mut visitor = BranchStatsVisitor::default();
        depth_first_esa(entries.clone(), &mut visitor).unwrap();
        assert_eq!(visitor.stats.leaves, 8);
        assert_eq!(visitor.stats.max_node_depth, 3);
        // Intervals: root, "a", "ana", "na".
        assert_eq!(visitor.stats.branch_nodes, 4);
    }

    #[test]
    fn every_rank_reaches_exactly_one_leaf_edge() {
        let alphabet = Alphabet::dna();
        let symbols = alphabet.map_bytes(b"gtacatacagtacacagtacacacgt");
        let seq = EncodedSequence::from_symbols(&symbols, 4).unwrap();
        let entries = esa_entries(&seq);
        let total = entries.len() as u64;

        let mut visitor = BranchStatsVisitor::default();
        depth_first_esa(entries, &mut visitor).unwrap();
        assert_eq!(visitor.stats.leaves, total);
    }

    #[test]
    fn node_depths_match_lcp_intervals() {
        let alphabet = Alphabet::dna();
        let symbols = alphabet.map_bytes(b"acacacacgtgtgtacacgt");
        let seq = EncodedSequence::from_symbols(&symbols, 4).unwrap();
        let entries = esa_entries(&seq);

        let mut visitor = NodeCollector::default();
        depth_first_esa(entries.clone(), &mut visitor).unwrap();
        // The root covers every rank and closes last.
        let (root_depth, root_leaves) = *visitor.nodes.last().unwrap();
        assert_eq!(root_depth, 0);
        assert_eq!(root_leaves, entries.len() as u64);
        // Each interior node covers at least two ranks, bounded by
        // the total.
        for &(depth, leaves) in &visitor.nodes[..visitor.nodes.len() - 1] {
            assert!(depth > 0);
            assert!((2..=entries.len() as u64).contains(&leaves));
        }
    }
}
