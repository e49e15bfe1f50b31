//! Shared types for suffix sorting and the persisted tables.

use serde::{Deserialize, Serialize};

use crate::seq::CmpMode;

/// A position in the concatenated sequence.
pub type SeqPos = u64;

/// A bucket code: the base-R value of a k-symbol prefix window.
pub type Code = u64;

/// LCP byte value signalling a large-value side-table record.
pub const LCP_OVERFLOW: u8 = 255;

/// LCP value too large for the byte table, stored in the `.llv` side
/// table as a `(suffix-array index, value)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LargeLcpValue {
    pub position: u64,
    pub value: u64,
}

/// Known order of a range handed to the blind trie.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ordertype {
    Ascending,
    Descending,
    NoOrder,
}

impl Ordertype {
    /// Order of a derived range relative to its parent; `turn` flips
    /// ascending and descending, unknown order stays unknown.
    pub fn derive(self, turn: bool) -> Ordertype {
        match self {
            Ordertype::NoOrder => Ordertype::NoOrder,
            Ordertype::Ascending if turn => Ordertype::Descending,
            Ordertype::Ascending => Ordertype::Ascending,
            Ordertype::Descending if turn => Ordertype::Ascending,
            Ordertype::Descending => Ordertype::Descending,
        }
    }
}

/// Thresholds steering the sort-strategy dispatch. The defaults match
/// long-standing practice: tiny ranges go to insertion sort, small
/// ones to the blind trie, mid-sized ones to counting sort, the rest
/// to ternary partitioning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SfxStrategy {
    pub cmp_mode: CmpMode,
    /// Widths up to this use insertion sort.
    pub max_insertionsort: usize,
    /// Widths up to this use the blind trie.
    pub max_bltriesort: usize,
    /// Widths up to this use counting sort (block mode only).
    pub max_countingsort: usize,
    /// Widths up to this compute an exact median pivot.
    pub maxwidth_real_median: usize,
    /// Sort-depth bound; ranges still tied here are deferred and
    /// resolved by iterative deepening.
    pub max_sort_depth: Option<u64>,
    /// Hard cap for iterative deepening; ranges still tied there fall
    /// back to ascending-position order.
    pub absolute_max_depth: Option<u64>,
}

impl Default for SfxStrategy {
    fn default() -> Self {
        SfxStrategy {
            cmp_mode: CmpMode::Block,
            max_insertionsort: 3,
            max_bltriesort: 1000,
            max_countingsort: 4000,
            maxwidth_real_median: 100,
            max_sort_depth: None,
            absolute_max_depth: None,
        }
    }
}

impl SfxStrategy {
    pub(crate) fn validate(&self) {
        assert!(self.max_insertionsort <= self.max_bltriesort);
        assert!(self.max_bltriesort <= self.max_countingsort);
    }
}

/// How often each sort strategy fired during construction.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SortCounts {
    pub insertionsort: u64,
    pub bltriesort: u64,
    pub countingsort: u64,
    pub qsort: u64,
}

impl std::ops::AddAssign for SortCounts {
    fn add_assign(&mut self, rhs: SortCounts) {
        self.insertionsort += rhs.insertionsort;
        self.bltriesort += rhs.bltriesort;
        self.countingsort += rhs.countingsort;
        self.qsort += rhs.qsort;
    }
}

/// A still-unsorted range left behind by a depth-bounded sort, as
/// index bounds into the bucket's nonspecial slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeferredRange {
    pub left: usize,
    pub right: usize,
    pub depth: SeqPos,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordertype_derivation() {
        assert_eq!(Ordertype::Ascending.derive(true), Ordertype::Descending);
        assert_eq!(Ordertype::Descending.derive(true), Ordertype::Ascending);
        assert_eq!(Ordertype::Ascending.derive(false), Ordertype::Ascending);
        assert_eq!(Ordertype::NoOrder.derive(true), Ordertype::NoOrder);
    }

    #[test]
    fn default_thresholds_are_ordered() {
        SfxStrategy::default().validate();
    }
}
