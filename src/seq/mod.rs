//! Alphabet handling and the 2-bit packed sequence container.
//!
//! Regular symbols are small integers `0..num_of_chars` (at most 4, so
//! every symbol fits in two bits). Wildcards and sequence separators
//! are kept out of the packed words and tracked as ranges instead;
//! they use the reserved byte values [`WILDCARD`] and [`SEPARATOR`].

pub mod alphabet;
pub mod compare;
pub mod encoded;

pub use alphabet::{Alphabet, is_special, SEPARATOR, WILDCARD};
pub use compare::{char_key, compare_blocks, compare_suffixes, CmpMode, COMPARE_OFFSET};
pub use encoded::{EncodedSequence, ReadMode, ScanState, SpecialRange, TwoBitBlock, UNITS_PER_BLOCK};
