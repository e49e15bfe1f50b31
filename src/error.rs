//! Error taxonomy shared across index construction and querying.
//!
//! Input-shape and resource problems surface as [`IndexError`] values;
//! violations of internal sorting invariants are bugs and panic via
//! debug assertions instead.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexError {
    /// The input contained no symbols at all.
    #[error("input sequence is empty")]
    EmptyInput,

    /// The sequence is shorter than the requested bucket prefix.
    #[error("sequence of length {total_length} is too short for prefix length {prefix_length}")]
    SequenceTooShort {
        total_length: u64,
        prefix_length: u32,
    },

    /// The bucket table for this prefix length would not fit in memory.
    #[error("prefix length {prefix_length} needs {num_of_codes} bucket codes; maximum is {max_codes}")]
    PrefixLengthTooLarge {
        prefix_length: u32,
        num_of_codes: u128,
        max_codes: u64,
    },

    /// An alphabet definition was rejected.
    #[error("invalid alphabet: {0}")]
    InvalidAlphabet(String),

    /// A read mode requires complementable symbols (4-letter DNA).
    #[error("read mode {0} requires a 4-symbol complementable alphabet")]
    NotComplementable(&'static str),

    /// An allocation for the suffix buffer failed.
    #[error("cannot allocate {bytes} bytes for {what}")]
    OutOfMemory { what: &'static str, bytes: u64 },

    /// Locate was requested on an index built without position samples.
    #[error("index carries no locate information")]
    NoLocateInformation,

    /// A pattern handed to the bit-parallel matcher is too long.
    #[error("pattern length {0} exceeds the 64-symbol matcher limit")]
    PatternTooLong(usize),

    /// The distance bound admits every window of the pattern's length.
    #[error("distance bound {distance} must stay below the pattern length {pattern_length}")]
    DistanceTooLarge { distance: u64, pattern_length: u64 },

    /// On-disk tables disagree with the project file.
    #[error("corrupt index: {0}")]
    CorruptIndex(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = IndexError> = std::result::Result<T, E>;
