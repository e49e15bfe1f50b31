//! 2-bit packed sequence container with special-range tracking.
//!
//! Regular symbols live in packed 64-bit words, 32 symbols per word
//! with the first symbol in the topmost two bits. Wildcards and
//! separators are recorded as sorted, merged ranges on the side; the
//! packed words hold zero bits at those positions.
//!
//! All public accessors take *virtual* positions under a [`ReadMode`]:
//! reverse modes index the sequence from its last symbol, complement
//! modes flip each regular symbol to `3 - sym`.

use serde::{Deserialize, Serialize};

use crate::error::IndexError;
use crate::seq::alphabet::{is_special, SEPARATOR};

/// Symbols per packed word and per extracted block.
pub const UNITS_PER_BLOCK: u32 = 32;

/// Direction and strand a sequence is read in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadMode {
    Forward,
    Reverse,
    Complement,
    ReverseComplement,
}

impl ReadMode {
    #[inline]
    pub fn is_reverse(self) -> bool {
        matches!(self, ReadMode::Reverse | ReadMode::ReverseComplement)
    }

    #[inline]
    pub fn is_complement(self) -> bool {
        matches!(self, ReadMode::Complement | ReadMode::ReverseComplement)
    }

    /// Same strand read in the opposite direction.
    #[inline]
    pub fn reversed(self) -> Self {
        match self {
            ReadMode::Forward => ReadMode::Reverse,
            ReadMode::Reverse => ReadMode::Forward,
            ReadMode::Complement => ReadMode::ReverseComplement,
            ReadMode::ReverseComplement => ReadMode::Complement,
        }
    }

    /// Stable numeric code used in the project file.
    pub fn code(self) -> u8 {
        match self {
            ReadMode::Forward => 0,
            ReadMode::Reverse => 1,
            ReadMode::Complement => 2,
            ReadMode::ReverseComplement => 3,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(ReadMode::Forward),
            1 => Some(ReadMode::Reverse),
            2 => Some(ReadMode::Complement),
            3 => Some(ReadMode::ReverseComplement),
            _ => None,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "fwd" | "forward" => Some(ReadMode::Forward),
            "rev" | "reverse" => Some(ReadMode::Reverse),
            "cpl" | "complement" => Some(ReadMode::Complement),
            "rcl" | "revcompl" => Some(ReadMode::ReverseComplement),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ReadMode::Forward => "fwd",
            ReadMode::Reverse => "rev",
            ReadMode::Complement => "cpl",
            ReadMode::ReverseComplement => "rcl",
        }
    }
}

/// A maximal run of one kind of special symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpecialRange {
    pub start: u64,
    pub len: u64,
    pub sym: u8,
}

/// Up to 32 consecutive regular symbols starting at a virtual
/// position, packed with the first symbol in the top two bits. `units`
/// is cut short by the sequence end or the next special symbol;
/// unused low bits are zero.
#[derive(Debug, Clone, Copy)]
pub struct TwoBitBlock {
    pub bits: u64,
    pub units: u32,
    pub position: u64,
}

/// The packed sequence.
pub struct EncodedSequence {
    words: Vec<u64>,
    specials: Vec<SpecialRange>,
    total_length: u64,
    num_of_chars: u32,
    special_characters: u64,
    num_of_sequences: u64,
}

impl EncodedSequence {
    /// Packs a symbol slice (regular symbols plus [`WILDCARD`] /
    /// [`SEPARATOR`] bytes) into the 2-bit representation.
    pub fn from_symbols(symbols: &[u8], num_of_chars: u32) -> Result<Self, IndexError> {
        if symbols.is_empty() {
            return Err(IndexError::EmptyInput);
        }
        debug_assert!((1..=4).contains(&num_of_chars));
        let total_length = symbols.len() as u64;
        let num_words = symbols.len().div_ceil(UNITS_PER_BLOCK as usize);
        let mut words = vec![0u64; num_words];
        let mut specials: Vec<SpecialRange> = Vec::new();
        let mut special_characters = 0u64;
        let mut num_of_sequences = 1u64;
        for (i, &sym) in symbols.iter().enumerate() {
            if is_special(sym) {
                special_characters += 1;
                if sym == SEPARATOR {
                    num_of_sequences += 1;
                }
                match specials.last_mut() {
                    Some(last) if last.sym == sym && last.start + last.len == i as u64 => {
                        last.len += 1;
                    }
                    _ => specials.push(SpecialRange {
                        start: i as u64,
                        len: 1,
                        sym,
                    }),
                }
            } else {
                debug_assert!((sym as u32) < num_of_chars, "symbol {sym} out of range");
                words[i / 32] |= (sym as u64) << (62 - 2 * (i % 32));
            }
        }
        // A trailing separator terminates the last sequence instead of
        // starting a new one.
        if symbols.last() == Some(&SEPARATOR) {
            num_of_sequences -= 1;
        }
        Ok(Self {
            words,
            specials,
            total_length,
            num_of_chars,
            special_characters,
            num_of_sequences,
        })
    }

    #[inline]
    pub fn total_length(&self) -> u64 {
        self.total_length
    }

    #[inline]
    pub fn num_of_chars(&self) -> u32 {
        self.num_of_chars
    }

    #[inline]
    pub fn special_characters(&self) -> u64 {
        self.special_characters
    }

    #[inline]
    pub fn num_special_ranges(&self) -> u64 {
        self.specials.len() as u64
    }

    #[inline]
    pub fn num_of_sequences(&self) -> u64 {
        self.num_of_sequences
    }

    /// Length of the leading run of special symbols, if any.
    pub fn length_of_special_prefix(&self) -> u64 {
        match self.specials.first() {
            Some(r) if r.start == 0 => r.len,
            _ => 0,
        }
    }

    /// Length of the trailing run of special symbols, if any.
    pub fn length_of_special_suffix(&self) -> u64 {
        match self.specials.last() {
            Some(r) if r.start + r.len == self.total_length => r.len,
            _ => 0,
        }
    }

    /// Maps a virtual position under a read mode to the stored
    /// forward position.
    #[inline]
    fn actual(&self, pos: u64, rm: ReadMode) -> u64 {
        if rm.is_reverse() {
            self.total_length - 1 - pos
        } else {
            pos
        }
    }

    /// Index of the special range containing `actual`, if any.
    fn special_range_at(&self, actual: u64) -> Option<usize> {
        let idx = self
            .specials
            .partition_point(|r| r.start + r.len <= actual);
        match self.specials.get(idx) {
            Some(r) if r.start <= actual => Some(idx),
            _ => None,
        }
    }

    #[inline]
    fn raw_regular(&self, actual: u64) -> u8 {
        let w = self.words[(actual / 32) as usize];
        ((w >> (62 - 2 * (actual % 32))) & 3) as u8
    }

    #[inline]
    fn finish_symbol(&self, sym: u8, rm: ReadMode) -> u8 {
        if rm.is_complement() && !is_special(sym) {
            debug_assert_eq!(self.num_of_chars, 4);
            3 - sym
        } else {
            sym
        }
    }

    /// Symbol at a virtual position. `pos` must be `< total_length`.
    pub fn get_char(&self, pos: u64, rm: ReadMode) -> u8 {
        debug_assert!(pos < self.total_length);
        let actual = self.actual(pos, rm);
        match self.special_range_at(actual) {
            Some(idx) => self.specials[idx].sym,
            None => self.finish_symbol(self.raw_regular(actual), rm),
        }
    }

    /// True if the symbol at a virtual position is special.
    pub fn is_special_at(&self, pos: u64, rm: ReadMode) -> bool {
        self.special_range_at(self.actual(pos, rm)).is_some()
    }

    /// First special position at or after `actual`, or `total_length`.
    fn next_special_from(&self, actual: u64) -> u64 {
        let idx = self
            .specials
            .partition_point(|r| r.start + r.len <= actual);
        match self.specials.get(idx) {
            Some(r) if r.start <= actual => actual,
            Some(r) => r.start,
            None => self.total_length,
        }
    }

    /// Last special position at or before `actual`, or `None`.
    fn prev_special_from(&self, actual: u64) -> Option<u64> {
        let idx = self.specials.partition_point(|r| r.start <= actual);
        if idx == 0 {
            return None;
        }
        let r = &self.specials[idx - 1];
        Some((r.start + r.len - 1).min(actual))
    }

    /// Extracts up to 32 regular symbols starting at a virtual
    /// position. `units` is 0 when `pos` is at or past the sequence
    /// end or sits on a special symbol.
    pub fn extract_block(&self, pos: u64, rm: ReadMode) -> TwoBitBlock {
        if pos >= self.total_length {
            return TwoBitBlock {
                bits: 0,
                units: 0,
                position: pos,
            };
        }
        let remaining = self.total_length - pos;
        let actual = self.actual(pos, rm);
        let units = if rm.is_reverse() {
            // Virtual order walks the stored sequence backwards.
            let stop = match self.prev_special_from(actual) {
                Some(q) => actual - q,
                None => actual + 1,
            };
            stop.min(remaining).min(UNITS_PER_BLOCK as u64) as u32
        } else {
            let stop = self.next_special_from(actual) - actual;
            stop.min(remaining).min(UNITS_PER_BLOCK as u64) as u32
        };
        if units == 0 {
            return TwoBitBlock {
                bits: 0,
                units: 0,
                position: pos,
            };
        }
        let mut bits = if rm.is_reverse() {
            let mut b = 0u64;
            for i in 0..units as u64 {
                let sym = self.raw_regular(actual - i) as u64;
                b |= sym << (62 - 2 * i);
            }
            b
        } else {
            let word = (actual / 32) as usize;
            let off = actual % 32;
            let mut b = self.words[word] << (2 * off);
            if off > 0 && word + 1 < self.words.len() {
                b |= self.words[word + 1] >> (64 - 2 * off);
            }
            // Mask out symbols past the unit count.
            if units < UNITS_PER_BLOCK {
                b &= !0u64 << (64 - 2 * units);
            }
            b
        };
        if rm.is_complement() {
            // 2-bit complement is bitwise negation of the used bits.
            let mask = !0u64 << (64 - 2 * units as u64);
            bits = (bits ^ !0) & mask;
        }
        TwoBitBlock {
            bits,
            units,
            position: pos,
        }
    }

    /// Starts a sequential scan at a virtual position.
    pub fn scan_from(&self, pos: u64, rm: ReadMode) -> ScanState<'_> {
        ScanState {
            seq: self,
            rm,
            pos,
            hint: 0,
        }
    }
}

/// Sequential reader caching the last special-range lookup, for tight
/// loops that would otherwise binary-search per symbol.
pub struct ScanState<'a> {
    seq: &'a EncodedSequence,
    rm: ReadMode,
    pos: u64,
    hint: usize,
}

impl ScanState<'_> {
    /// Next virtual position the scan will deliver.
    #[inline]
    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Delivers the symbol at the current position and advances, or
    /// `None` at the sequence end.
    pub fn next_symbol(&mut self) -> Option<u8> {
        if self.pos >= self.seq.total_length {
            return None;
        }
        let actual = self.seq.actual(self.pos, self.rm);
        self.pos += 1;
        let specials = &self.seq.specials;
        // Check the cached range and its neighbours before searching.
        for idx in self.hint.saturating_sub(1)..(self.hint + 2).min(specials.len()) {
            let r = &specials[idx];
            if r.start <= actual && actual < r.start + r.len {
                self.hint = idx;
                return Some(r.sym);
            }
        }
        if let Some(idx) = self.seq.special_range_at(actual) {
            self.hint = idx;
            return Some(specials[idx].sym);
        }
        Some(self.seq.finish_symbol(self.seq.raw_regular(actual), self.rm))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seq::alphabet::{Alphabet, WILDCARD};

    fn encode(s: &str) -> EncodedSequence {
        let a = Alphabet::dna();
        EncodedSequence::from_symbols(&a.map_bytes(s.as_bytes()), 4).unwrap()
    }

    #[test]
    fn forward_access() {
        let seq = encode("acgtnacc");
        let rm = ReadMode::Forward;
        let got: Vec<u8> = (0..8).map(|p| seq.get_char(p, rm)).collect();
        assert_eq!(got, vec![0, 1, 2, 3, WILDCARD, 0, 1, 1]);
        assert_eq!(seq.special_characters(), 1);
        assert_eq!(seq.num_special_ranges(), 1);
    }

    #[test]
    fn read_modes() {
        let seq = encode("acgn");
        assert_eq!(seq.get_char(0, ReadMode::Reverse), WILDCARD);
        assert_eq!(seq.get_char(1, ReadMode::Reverse), 2);
        assert_eq!(seq.get_char(0, ReadMode::Complement), 3);
        assert_eq!(seq.get_char(3, ReadMode::ReverseComplement), 3);
        assert_eq!(seq.get_char(0, ReadMode::ReverseComplement), WILDCARD);
    }

    #[test]
    fn special_runs_merge() {
        let seq = encode("annncta");
        assert_eq!(seq.num_special_ranges(), 1);
        assert_eq!(seq.special_characters(), 3);
        assert_eq!(seq.length_of_special_prefix(), 0);
        let seq = encode("nnacgnn");
        assert_eq!(seq.length_of_special_prefix(), 2);
        assert_eq!(seq.length_of_special_suffix(), 2);
    }

    #[test]
    fn block_extraction_stops_at_specials() {
        let seq = encode("acgtnacgt");
        let b = seq.extract_block(0, ReadMode::Forward);
        assert_eq!(b.units, 4);
        // a=00 c=01 g=10 t=11 packed from the top.
        assert_eq!(b.bits >> 56, 0b0001_1011);
        assert_eq!(b.bits & ((1u64 << 56) - 1), 0);
        let b = seq.extract_block(4, ReadMode::Forward);
        assert_eq!(b.units, 0);
        let b = seq.extract_block(5, ReadMode::Forward);
        assert_eq!(b.units, 4);
    }

    #[test]
    fn block_extraction_spans_words() {
        let text: String = "acgt".repeat(20); // 80 symbols, no specials
        let seq = encode(&text);
        let b = seq.extract_block(30, ReadMode::Forward);
        assert_eq!(b.units, 32);
        for i in 0..32u64 {
            let sym = ((b.bits >> (62 - 2 * i)) & 3) as u8;
            assert_eq!(sym, seq.get_char(30 + i, ReadMode::Forward));
        }
    }

    #[test]
    fn block_extraction_reverse_complement() {
        let seq = encode("aacgtacgtn");
        let rm = ReadMode::ReverseComplement;
        let b = seq.extract_block(1, rm);
        // Virtual position 0 is the complemented wildcard; everything
        // after it is regular up to the sequence end.
        assert_eq!(b.units, 9);
        for i in 0..b.units as u64 {
            let sym = ((b.bits >> (62 - 2 * i)) & 3) as u8;
            assert_eq!(sym, seq.get_char(1 + i, rm));
        }
    }

    #[test]
    fn scan_matches_random_access() {
        let seq = encode("nacgtnntacgn");
        for rm in [
            ReadMode::Forward,
            ReadMode::Reverse,
            ReadMode::Complement,
            ReadMode::ReverseComplement,
        ] {
            let mut scan = seq.scan_from(0, rm);
            for p in 0..seq.total_length() {
                assert_eq!(scan.next_symbol(), Some(seq.get_char(p, rm)));
            }
            assert_eq!(scan.next_symbol(), None);
        }
    }

    #[test]
    fn separators_delimit_sequences() {
        let count = |symbols: &[u8]| {
            EncodedSequence::from_symbols(symbols, 4)
                .unwrap()
                .num_of_sequences()
        };
        // Interior separators split; a trailing one only terminates.
        assert_eq!(count(&[0, 1, 2, 3]), 1);
        assert_eq!(count(&[0, 1, SEPARATOR, 2, 3]), 2);
        assert_eq!(count(&[0, 1, 2, 3, SEPARATOR]), 1);
        assert_eq!(count(&[0, 1, SEPARATOR, 2, 3, SEPARATOR]), 2);
        assert_eq!(count(&[SEPARATOR]), 1);
    }

    #[test]
    fn empty_input_rejected() {
        let a = Alphabet::dna();
        assert!(matches!(
            EncodedSequence::from_symbols(&a.map_bytes(b""), 4),
            Err(IndexError::EmptyInput)
        ));
    }
}
