//! # SXI - Enhanced Suffix Array Indexing
//!
//! SXI builds enhanced suffix arrays (suffix array + LCP table) over
//! 2-bit packed biological sequences and persists them as a small
//! family of binary tables, with an FM-index layer for exact and
//! approximate pattern matching on top.
//!
//! ## Architecture
//!
//! The crate is organized into these main modules:
//!
//! - [`seq`] - Alphabet handling and the packed sequence container
//! - [`index`] - Suffix sorting, LCP computation, on-disk tables,
//!   and bottom-up traversal of the persisted arrays
//! - [`fm`] - BWT/FM-index with backward search, locate, and
//!   bit-parallel approximate matching
//!
//! ## Quick Start
//!
//! ```ignore
//! use sxi::seq::{Alphabet, EncodedSequence, ReadMode};
//! use sxi::index::{sort_suffixes, SegmentCollector, SuffixSortOptions};
//!
//! let alphabet = Alphabet::dna();
//! let symbols = alphabet.map_bytes(b"acgtacgtnacgt");
//! let seq = EncodedSequence::from_symbols(&symbols, alphabet.num_of_chars())?;
//!
//! let mut out = SegmentCollector::new();
//! let stats = sort_suffixes(&seq, ReadMode::Forward,
//!                           &SuffixSortOptions::default(), &mut out, None)?;
//! println!("deepest branch: {}", stats.max_branch_depth);
//! ```
//!
//! ## Sorting conventions
//!
//! Wildcards, separators, and the sequence end sort *greater* than
//! every regular symbol; two special suffixes are ordered by ascending
//! absolute position. The empty suffix is therefore the global maximum
//! and always occupies the final suffix-array slot, giving the table
//! `total_length + 1` entries.

pub mod error;
pub mod fm;
pub mod index;
pub mod seq;

pub use error::IndexError;
