//! Multikey-quicksort engine for bucket ranges.
//!
//! Ranges arrive already grouped by their first `depth` symbols and
//! are sorted by ternary partitioning on the next comparison unit -
//! one character, or one 32-symbol block. An explicit work stack
//! replaces recursion. Small ranges short-circuit into insertion sort
//! or the blind trie, mid-sized block-mode ranges into an LCP-aware
//! counting sort around the pivot.
//!
//! LCP values fall out of the partition bookkeeping: when a partition
//! step separates two parts, the boundary LCP is `depth` plus the
//! largest unit-LCP any element of the adjacent part had with the
//! pivot. Every value is written exactly once, at the final index of
//! the right-hand suffix of its pair.
//!
//! Under a bounded sort depth, ranges still tied at the bound are
//! pushed onto a deferred list instead of being sorted further; the
//! driver resolves them by iterative deepening.

use std::cmp::Ordering;

use crate::seq::{
    char_key, compare_blocks, compare_suffixes, is_special, CmpMode, EncodedSequence, ReadMode,
    TwoBitBlock, UNITS_PER_BLOCK,
};

use super::blindtrie::BlindTrie;
use super::lcp::LcpOutputBuffer;
use super::types::{DeferredRange, Ordertype, SeqPos, SfxStrategy, SortCounts};

/// Minimum width for pseudo-median-of-9 pivot selection and for the
/// counting-sort path.
const MIN_MEDIAN_OF_9_WIDTH: usize = 31;

struct MkvTask {
    left: usize,
    right: usize,
    depth: SeqPos,
    order: Ordertype,
}

#[derive(Clone, Copy)]
struct CountingSortInfo {
    suffix: SeqPos,
    lcp_with_pivot: u32,
    cmp: i8,
}

#[derive(Clone, Copy)]
struct MedianInfo {
    block: TwoBitBlock,
    idx: usize,
}

/// Quickselect for the true median block, after "Numerical Recipes in
/// C", section 8.5.
fn quickmedian(arr: &mut [MedianInfo]) -> MedianInfo {
    let greater = |a: &MedianInfo, b: &MedianInfo| compare_blocks(&a.block, &b.block).0 == Ordering::Greater;
    let mut low = 0usize;
    let mut high = arr.len() - 1;
    let median = low + arr.len() / 2;
    loop {
        if high <= low {
            return arr[median];
        }
        if high == low + 1 {
            if greater(&arr[low], &arr[high]) {
                arr.swap(low, high);
            }
            return arr[median];
        }
        let middle = low + (high - low + 1) / 2;
        if greater(&arr[middle], &arr[high]) {
            arr.swap(middle, high);
        }
        if greater(&arr[low], &arr[high]) {
            arr.swap(low, high);
        }
        if greater(&arr[middle], &arr[low]) {
            arr.swap(middle, low);
        }
        arr.swap(middle, low + 1);
        let mut ll = low + 1;
        let mut hh = high;
        loop {
            loop {
                ll += 1;
                if !greater(&arr[low], &arr[ll]) {
                    break;
                }
            }
            loop {
                hh -= 1;
                if !greater(&arr[hh], &arr[low]) {
                    break;
                }
            }
            if hh < ll {
                break;
            }
            arr.swap(ll, hh);
        }
        arr.swap(low, hh);
        if hh <= median {
            low = ll;
        }
        if hh >= median {
            high = hh.saturating_sub(1);
        }
    }
}

pub struct MkvEngine<'a> {
    seq: &'a EncodedSequence,
    rm: ReadMode,
    strategy: SfxStrategy,
    stack: Vec<MkvTask>,
    blindtrie: BlindTrie<'a>,
    csinfo: Vec<CountingSortInfo>,
    medianspace: Vec<MedianInfo>,
    equal_with_previous: Vec<bool>,
    /// Depth bound of the current `sort_range` call.
    max_depth: Option<SeqPos>,
    counts: SortCounts,
}

/// Mutable per-call state: the suffix range being sorted, the LCP
/// staging buffer, and the deferred-range sink. `lcp_base` maps local
/// range indices onto staging-buffer indices.
pub struct SortJob<'s, 'b> {
    pub s: &'s mut [SeqPos],
    pub lcp: &'b mut LcpOutputBuffer,
    pub deferred: &'b mut Vec<DeferredRange>,
    pub lcp_base: usize,
}

impl<'a> MkvEngine<'a> {
    pub fn new(seq: &'a EncodedSequence, rm: ReadMode, strategy: SfxStrategy) -> Self {
        strategy.validate();
        let blindtrie = BlindTrie::new(seq, rm, strategy.cmp_mode, strategy.max_bltriesort);
        MkvEngine {
            seq,
            rm,
            csinfo: Vec::with_capacity(strategy.max_countingsort),
            medianspace: vec![
                MedianInfo {
                    block: TwoBitBlock {
                        bits: 0,
                        units: 0,
                        position: 0
                    },
                    idx: 0
                };
                strategy.maxwidth_real_median
            ],
            equal_with_previous: vec![false; strategy.max_insertionsort + 1],
            stack: Vec::new(),
            max_depth: None,
            counts: SortCounts::default(),
            blindtrie,
            strategy,
        }
    }

    #[inline]
    pub fn counts(&self) -> SortCounts {
        self.counts
    }

    /// Comparison units per equal step: one character, or one block.
    #[inline]
    fn units_equal(&self) -> u32 {
        match self.strategy.cmp_mode {
            CmpMode::CharByChar => 1,
            CmpMode::Block => UNITS_PER_BLOCK,
        }
    }

    #[inline]
    fn block_at(&self, pos: SeqPos, depth: SeqPos) -> TwoBitBlock {
        self.seq.extract_block(pos + depth, self.rm)
    }

    #[inline]
    fn full_cmp(&self, a: SeqPos, b: SeqPos, depth: SeqPos, max_depth: Option<SeqPos>) -> (Ordering, SeqPos) {
        let r = compare_suffixes(self.seq, self.rm, self.strategy.cmp_mode, a, b, depth, max_depth);
        (r.ord, r.lcp)
    }

    /// Sorts a range of suffixes sharing their first `depth` symbols.
    /// Interior LCPs land at `lcp_base + 1 ..`; the boundary entry at
    /// `lcp_base` belongs to the caller. With `max_depth`, ranges
    /// still tied there go to `job.deferred` instead.
    pub fn sort_range(
        &mut self,
        job: &mut SortJob<'_, '_>,
        depth: SeqPos,
        order: Ordertype,
        max_depth: Option<SeqPos>,
    ) {
        debug_assert!(max_depth.is_none_or(|md| md > depth));
        self.max_depth = max_depth;
        self.stack.clear();
        if job.s.len() < 2 {
            return;
        }
        let last = job.s.len() - 1;
        self.subsort(job, 0, last, depth, order);
        while let Some(task) = self.stack.pop() {
            self.partition_step(job, task);
        }
    }

    /// Dispatches a subrange to the cheapest applicable strategy, or
    /// pushes it for partitioning.
    fn subsort(
        &mut self,
        job: &mut SortJob<'_, '_>,
        left: usize,
        right: usize,
        depth: SeqPos,
        order: Ordertype,
    ) {
        let width = right - left + 1;
        if width <= 1 {
            return;
        }
        if let Some(md) = self.max_depth {
            if depth >= md {
                job.deferred.push(DeferredRange {
                    left: job.lcp_base + left,
                    right: job.lcp_base + right,
                    depth,
                });
                return;
            }
            if width <= self.strategy.max_insertionsort {
                self.insertionsort_maxdepth(job, left, right, depth, md);
                return;
            }
            if width <= self.strategy.max_bltriesort {
                self.bltriesort(job, left, right, depth, Some(md), order);
                return;
            }
        } else {
            if width <= self.strategy.max_insertionsort {
                self.insertionsort(job, left, right, depth);
                return;
            }
            if width <= self.strategy.max_bltriesort {
                self.bltriesort(job, left, right, depth, None, order);
                return;
            }
        }
        self.stack.push(MkvTask {
            left,
            right,
            depth,
            order,
        });
    }

    fn bltriesort(
        &mut self,
        job: &mut SortJob<'_, '_>,
        left: usize,
        right: usize,
        depth: SeqPos,
        max_depth: Option<SeqPos>,
        order: Ordertype,
    ) {
        self.counts.bltriesort += 1;
        let base = job.lcp_base + left;
        let deferred = &mut *job.deferred;
        self.blindtrie.sort(
            &mut job.s[left..=right],
            job.lcp,
            base,
            depth,
            max_depth,
            order,
            &mut |l, r, d| {
                deferred.push(DeferredRange {
                    left: base + l,
                    right: base + r,
                    depth: d,
                })
            },
        );
    }

    fn insertionsort(&mut self, job: &mut SortJob<'_, '_>, left: usize, right: usize, depth: SeqPos) {
        self.counts.insertionsort += 1;
        for pi in left + 1..=right {
            for pj in (left + 1..=pi).rev() {
                let (ord, lcplen) = self.full_cmp(job.s[pj - 1], job.s[pj], depth, None);
                debug_assert_ne!(ord, Ordering::Equal);
                let lcpindex = job.lcp_base + pj;
                // A suffix bubbling left pushes the LCP it displaced
                // one slot to the right.
                if pj < pi && ord == Ordering::Greater {
                    let moved = job.lcp.value(lcpindex);
                    job.lcp.set(lcpindex + 1, moved);
                }
                job.lcp.set(lcpindex, lcplen);
                if ord == Ordering::Less {
                    break;
                }
                job.s.swap(pj - 1, pj);
            }
        }
    }

    fn insertionsort_maxdepth(
        &mut self,
        job: &mut SortJob<'_, '_>,
        left: usize,
        right: usize,
        depth: SeqPos,
        max_depth: SeqPos,
    ) {
        self.counts.insertionsort += 1;
        let width = right - left + 1;
        for flag in self.equal_with_previous[..width].iter_mut() {
            *flag = false;
        }
        for pi in left + 1..=right {
            for pj in (left + 1..=pi).rev() {
                let (ord, lcplen) = self.full_cmp(job.s[pj - 1], job.s[pj], depth, Some(max_depth));
                if ord != Ordering::Equal {
                    let lcpindex = job.lcp_base + pj;
                    if pj < pi && ord == Ordering::Greater {
                        job.lcp.move_slot(lcpindex, lcpindex + 1);
                    }
                    job.lcp.set(lcpindex, lcplen);
                }
                match ord {
                    Ordering::Less => break,
                    Ordering::Equal => {
                        debug_assert_eq!(lcplen, max_depth);
                        self.equal_with_previous[pj - left] = true;
                        break;
                    }
                    Ordering::Greater => {
                        job.s.swap(pj - 1, pj);
                        self.equal_with_previous.swap(pj - 1 - left, pj - left);
                    }
                }
            }
        }
        let mut equals_range_width = 0usize;
        for idx in 1..width {
            if self.equal_with_previous[idx] {
                equals_range_width += 1;
            } else if equals_range_width > 0 {
                job.deferred.push(DeferredRange {
                    left: job.lcp_base + left + idx - 1 - equals_range_width,
                    right: job.lcp_base + left + idx - 1,
                    depth: max_depth,
                });
                equals_range_width = 0;
            }
        }
        if equals_range_width > 0 {
            job.deferred.push(DeferredRange {
                left: job.lcp_base + left + width - 1 - equals_range_width,
                right: job.lcp_base + left + width - 1,
                depth: max_depth,
            });
        }
    }

    fn median_of_3_char(&self, s: &[SeqPos], depth: SeqPos, a: usize, b: usize, c: usize) -> usize {
        let va = char_key(self.seq, self.rm, s[a], depth);
        let vb = char_key(self.seq, self.rm, s[b], depth);
        if va == vb {
            return a;
        }
        let vc = char_key(self.seq, self.rm, s[c], depth);
        if va == vc || vb == vc {
            return c;
        }
        if va < vb {
            if vb < vc {
                b
            } else if va < vc {
                c
            } else {
                a
            }
        } else if vb > vc {
            b
        } else if va < vc {
            a
        } else {
            c
        }
    }

    fn median_of_3_block(&self, s: &[SeqPos], depth: SeqPos, a: usize, b: usize, c: usize) -> usize {
        let ba = self.block_at(s[a], depth);
        let bb = self.block_at(s[b], depth);
        if compare_blocks(&ba, &bb).0 == Ordering::Equal {
            return a;
        }
        let bc = self.block_at(s[c], depth);
        let ac = compare_blocks(&ba, &bc).0;
        if ac == Ordering::Equal {
            return c;
        }
        let bcmp = compare_blocks(&bb, &bc).0;
        if bcmp == Ordering::Equal {
            return c;
        }
        if compare_blocks(&ba, &bb).0 == Ordering::Less {
            if bcmp == Ordering::Less {
                b
            } else if ac == Ordering::Less {
                c
            } else {
                a
            }
        } else if bcmp == Ordering::Greater {
            b
        } else if ac == Ordering::Less {
            a
        } else {
            c
        }
    }

    fn deliver_median(&mut self, s: &[SeqPos], left: usize, right: usize, depth: SeqPos) -> usize {
        let width = right - left + 1;
        let mid = left + width / 2;
        match self.strategy.cmp_mode {
            CmpMode::CharByChar => {
                let (mut pl, mut pm, mut pr) = (left, mid, right);
                if width >= MIN_MEDIAN_OF_9_WIDTH {
                    let offset = width / 8;
                    let doubleoffset = 2 * offset;
                    pl = self.median_of_3_char(s, depth, pl, pl + offset, pl + doubleoffset);
                    pm = self.median_of_3_char(s, depth, pm - offset, pm, pm + offset);
                    pr = self.median_of_3_char(s, depth, pr - doubleoffset, pr - offset, pr);
                }
                self.median_of_3_char(s, depth, pl, pm, pr)
            }
            CmpMode::Block => {
                if width >= MIN_MEDIAN_OF_9_WIDTH {
                    if width > self.strategy.maxwidth_real_median {
                        let offset = width / 8;
                        let doubleoffset = 2 * offset;
                        let pl =
                            self.median_of_3_block(s, depth, left, left + offset, left + doubleoffset);
                        let pm = self.median_of_3_block(s, depth, mid - offset, mid, mid + offset);
                        let pr = self.median_of_3_block(
                            s,
                            depth,
                            right - doubleoffset,
                            right - offset,
                            right,
                        );
                        self.median_of_3_block(s, depth, pl, pm, pr)
                    } else {
                        for (slot, idx) in self.medianspace[..width].iter_mut().zip(left..=right) {
                            slot.idx = idx;
                            slot.block = self.seq.extract_block(s[idx] + depth, self.rm);
                        }
                        quickmedian(&mut self.medianspace[..width]).idx
                    }
                } else {
                    self.median_of_3_block(s, depth, left, mid, right)
                }
            }
        }
    }

    /// One popped stack task: pivot selection, ternary partition, LCP
    /// boundary writes, and subrange dispatch.
    fn partition_step(&mut self, job: &mut SortJob<'_, '_>, task: MkvTask) {
        let MkvTask {
            left,
            right,
            depth,
            order: parent_order,
        } = task;
        let width = right - left + 1;
        let pm = self.deliver_median(job.s, left, right, depth);
        if self.strategy.cmp_mode == CmpMode::Block
            && (MIN_MEDIAN_OF_9_WIDTH..=self.strategy.max_countingsort).contains(&width)
        {
            let pivot = self.block_at(job.s[pm], depth);
            self.counting_sort(job, left, width, &pivot, pm, parent_order, depth);
            return;
        }
        self.counts.qsort += 1;
        job.s.swap(left, pm);
        let units_equal = self.units_equal();
        // Pivot comparison closure: ordering plus common units.
        let pivot_char = char_key(self.seq, self.rm, job.s[left], depth);
        let pivot_block = self.block_at(job.s[left], depth);
        let cmp_pivot = |s: &[SeqPos], idx: usize| -> (Ordering, u32) {
            match self.strategy.cmp_mode {
                CmpMode::CharByChar => {
                    let k = char_key(self.seq, self.rm, s[idx], depth);
                    (k.cmp(&pivot_char), 0)
                }
                CmpMode::Block => {
                    let b = self.block_at(s[idx], depth);
                    compare_blocks(&b, &pivot_block)
                }
            }
        };
        let mut smaller_min_lcp = units_equal;
        let mut smaller_max_lcp = 0u32;
        let mut greater_min_lcp = units_equal;
        let mut greater_max_lcp = 0u32;
        let mut pa = left + 1;
        let mut pb = left + 1;
        let mut pc = right;
        let mut pd = right;
        loop {
            while pb <= pc {
                let (ord, common) = cmp_pivot(job.s, pb);
                match ord {
                    Ordering::Greater => {
                        debug_assert!(common < units_equal);
                        greater_min_lcp = greater_min_lcp.min(common);
                        greater_max_lcp = greater_max_lcp.max(common);
                        break;
                    }
                    Ordering::Equal => {
                        job.s.swap(pa, pb);
                        pa += 1;
                    }
                    Ordering::Less => {
                        debug_assert!(common < units_equal);
                        smaller_min_lcp = smaller_min_lcp.min(common);
                        smaller_max_lcp = smaller_max_lcp.max(common);
                    }
                }
                pb += 1;
            }
            while pb <= pc {
                let (ord, common) = cmp_pivot(job.s, pc);
                match ord {
                    Ordering::Less => {
                        debug_assert!(common < units_equal);
                        smaller_min_lcp = smaller_min_lcp.min(common);
                        smaller_max_lcp = smaller_max_lcp.max(common);
                        break;
                    }
                    Ordering::Equal => {
                        job.s.swap(pc, pd);
                        pd -= 1;
                    }
                    Ordering::Greater => {
                        debug_assert!(common < units_equal);
                        greater_min_lcp = greater_min_lcp.min(common);
                        greater_max_lcp = greater_max_lcp.max(common);
                    }
                }
                pc -= 1;
            }
            if pb > pc {
                break;
            }
            job.s.swap(pb, pc);
            pb += 1;
            pc -= 1;
        }
        // Move the equal runs from both ends into the middle.
        let w = (pa - left).min(pb - pa);
        vecswap(job.s, left, pb - w, w);
        let w = (pd - pc).min(right - pd);
        vecswap(job.s, pb, right + 1 - w, w);

        let smaller_w = pb - pa;
        let leftplusw = left + smaller_w;
        let greater_w = pd - pc;
        if smaller_w > 0 {
            job.lcp
                .set(job.lcp_base + leftplusw, depth + smaller_max_lcp as u64);
            self.subsort(
                job,
                left,
                leftplusw - 1,
                depth + smaller_min_lcp as u64,
                Ordertype::NoOrder,
            );
        }
        // Equal part keeps the pivot; recurse only while its next
        // character is a regular symbol.
        let cptr = job.s[leftplusw] + depth;
        if cptr < self.seq.total_length() && !is_special(self.seq.get_char(cptr, self.rm)) {
            self.subsort(
                job,
                leftplusw,
                right - greater_w,
                depth + units_equal as u64,
                Ordertype::NoOrder,
            );
        }
        if greater_w > 0 {
            job.lcp.set(
                job.lcp_base + right - greater_w + 1,
                depth + greater_max_lcp as u64,
            );
            self.subsort(
                job,
                right - greater_w + 1,
                right,
                depth + greater_min_lcp as u64,
                Ordertype::NoOrder,
            );
        }
    }

    /// Counting sort around the pivot: one comparison per element
    /// classifies it and records its unit-LCP with the pivot, a
    /// prefix-sum pass places everything, and the LCP distributions
    /// directly yield subrange bounds and boundary LCPs.
    #[allow(clippy::too_many_arguments)]
    fn counting_sort(
        &mut self,
        job: &mut SortJob<'_, '_>,
        left: usize,
        width: usize,
        pivot: &TwoBitBlock,
        pivotidx: usize,
        parent_order: Ordertype,
        depth: SeqPos,
    ) {
        const U: usize = UNITS_PER_BLOCK as usize;
        self.counts.countingsort += 1;
        let mut left_dist = [0usize; U + 1];
        let mut right_dist = [0usize; U + 1];
        let mut max_smaller = 0usize;
        let mut max_larger = 0usize;
        let mut smaller = 0usize;
        let mut larger = 0usize;
        self.csinfo.clear();
        for idx in 0..width {
            if left + idx == pivotidx {
                self.csinfo.push(CountingSortInfo {
                    suffix: job.s[left + idx],
                    lcp_with_pivot: UNITS_PER_BLOCK,
                    cmp: 0,
                });
                continue;
            }
            let block = self.block_at(job.s[left + idx], depth);
            let (ord, common) = compare_blocks(&block, pivot);
            let common = common as usize;
            match ord {
                Ordering::Greater => {
                    debug_assert!(common < U);
                    right_dist[common] += 1;
                    max_larger = max_larger.max(common);
                    larger += 1;
                    self.csinfo.push(CountingSortInfo {
                        suffix: job.s[left + idx],
                        lcp_with_pivot: common as u32,
                        cmp: 1,
                    });
                }
                Ordering::Less => {
                    debug_assert!(common < U);
                    left_dist[common] += 1;
                    max_smaller = max_smaller.max(common);
                    smaller += 1;
                    self.csinfo.push(CountingSortInfo {
                        suffix: job.s[left + idx],
                        lcp_with_pivot: common as u32,
                        cmp: -1,
                    });
                }
                Ordering::Equal => {
                    debug_assert_eq!(common, U);
                    self.csinfo.push(CountingSortInfo {
                        suffix: job.s[left + idx],
                        lcp_with_pivot: common as u32,
                        cmp: 0,
                    });
                }
            }
        }
        for idx in 1..=max_smaller {
            left_dist[idx] += left_dist[idx - 1];
        }
        for idx in 1..=max_larger {
            right_dist[idx] += right_dist[idx - 1];
        }
        let mut equal_offset = width - larger;
        for csidx in (0..width).rev() {
            let info = self.csinfo[csidx];
            match info.cmp {
                -1 => {
                    left_dist[info.lcp_with_pivot as usize] -= 1;
                    job.s[left + left_dist[info.lcp_with_pivot as usize]] = info.suffix;
                }
                0 => {
                    equal_offset -= 1;
                    job.s[left + equal_offset] = info.suffix;
                }
                _ => {
                    right_dist[info.lcp_with_pivot as usize] -= 1;
                    job.s[left + width - 1 - right_dist[info.lcp_with_pivot as usize]] = info.suffix;
                }
            }
        }
        // The decremented distributions now hold each class's start.
        for idx in 0..=max_smaller {
            let end = if idx < max_smaller {
                left_dist[idx + 1]
            } else {
                smaller
            };
            if left_dist[idx] + 1 < end {
                self.subsort(
                    job,
                    left + left_dist[idx],
                    left + end - 1,
                    depth + idx as u64,
                    parent_order.derive(false),
                );
            }
            if left_dist[idx] < end {
                job.lcp.set(job.lcp_base + left + end, depth + idx as u64);
            }
        }
        if width - smaller - larger > 1 {
            self.subsort(
                job,
                left + smaller,
                left + width - larger - 1,
                depth + UNITS_PER_BLOCK as u64,
                parent_order.derive(false),
            );
        }
        for idx in 0..=max_larger {
            let end = if idx < max_larger {
                right_dist[idx + 1]
            } else {
                larger
            };
            if right_dist[idx] + 1 < end {
                self.subsort(
                    job,
                    left + width - end,
                    left + width - 1 - right_dist[idx],
                    depth + idx as u64,
                    parent_order.derive(true),
                );
            }
            if right_dist[idx] < end {
                job.lcp
                    .set(job.lcp_base + left + width - end, depth + idx as u64);
            }
        }
    }
}

fn vecswap(s: &mut [SeqPos], mut a: usize, mut b: usize, mut n: usize) {
    while n > 0 {
        s.swap(a, b);
        a += 1;
        b += 1;
        n -= 1;
    }
}
