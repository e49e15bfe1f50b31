//! Character-class alphabets mapping input bytes to symbols.
//!
//! An alphabet is a list of character classes; all bytes in one class
//! map to the same symbol. Bytes outside every class fold to
//! [`WILDCARD`]. The DNA alphabet (`aA`/`cC`/`gG`/`tT`, wildcards for
//! ambiguity codes) is the default and the only one most callers need.

use crate::error::IndexError;

/// Symbol for wildcard characters (e.g. `N` in DNA input).
pub const WILDCARD: u8 = 254;

/// Symbol separating concatenated sequences.
pub const SEPARATOR: u8 = 255;

/// Wildcards and separators share the top of the byte range.
#[inline(always)]
pub fn is_special(sym: u8) -> bool {
    sym >= WILDCARD
}

const UNMAPPED: u8 = u8::MAX - 2;

/// Maps input bytes to symbols `0..num_of_chars` or [`WILDCARD`].
#[derive(Clone)]
pub struct Alphabet {
    map: [u8; 256],
    display: Vec<u8>,
    num_of_chars: u32,
}

impl Alphabet {
    /// The standard DNA alphabet: four symbols, case-insensitive,
    /// every other letter treated as a wildcard.
    pub fn dna() -> Self {
        Self::new(&["aA", "cC", "gG", "tT"]).unwrap()
    }

    /// Builds an alphabet from character classes, one symbol per
    /// class. The first byte of each class is its display character.
    /// At most 4 classes are allowed so that symbols stay packable
    /// into two bits.
    pub fn new(classes: &[&str]) -> Result<Self, IndexError> {
        if classes.is_empty() || classes.len() > 4 {
            return Err(IndexError::InvalidAlphabet(format!(
                "{} character classes; need between 1 and 4",
                classes.len()
            )));
        }
        let mut map = [UNMAPPED; 256];
        let mut display = Vec::with_capacity(classes.len());
        for (sym, class) in classes.iter().enumerate() {
            let bytes = class.as_bytes();
            if bytes.is_empty() {
                return Err(IndexError::InvalidAlphabet(format!(
                    "character class {sym} is empty"
                )));
            }
            display.push(bytes[0]);
            for &b in bytes {
                if map[b as usize] != UNMAPPED {
                    return Err(IndexError::InvalidAlphabet(format!(
                        "character {:?} appears in two classes",
                        b as char
                    )));
                }
                map[b as usize] = sym as u8;
            }
        }
        Ok(Self {
            map,
            display,
            num_of_chars: classes.len() as u32,
        })
    }

    /// Number of regular symbols.
    #[inline]
    pub fn num_of_chars(&self) -> u32 {
        self.num_of_chars
    }

    /// True if symbols can be complemented (`sym -> 3 - sym`), which
    /// requires exactly four of them.
    #[inline]
    pub fn is_complementable(&self) -> bool {
        self.num_of_chars == 4
    }

    /// Maps one input byte. Unknown bytes fold to [`WILDCARD`].
    #[inline]
    pub fn map_byte(&self, b: u8) -> u8 {
        let sym = self.map[b as usize];
        if sym == UNMAPPED { WILDCARD } else { sym }
    }

    /// Maps a byte slice to symbols.
    pub fn map_bytes(&self, bytes: &[u8]) -> Vec<u8> {
        bytes.iter().map(|&b| self.map_byte(b)).collect()
    }

    /// Maps the bytes of a pattern, rejecting anything that is not a
    /// regular symbol (wildcards cannot occur in search patterns).
    pub fn map_pattern(&self, bytes: &[u8]) -> Option<Vec<u8>> {
        bytes
            .iter()
            .map(|&b| {
                let sym = self.map_byte(b);
                (!is_special(sym)).then_some(sym)
            })
            .collect()
    }

    /// Display character for a symbol.
    pub fn show_symbol(&self, sym: u8) -> char {
        match sym {
            WILDCARD => 'n',
            SEPARATOR => '|',
            s => self.display[s as usize] as char,
        }
    }
}

impl std::fmt::Debug for Alphabet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Alphabet")
            .field("num_of_chars", &self.num_of_chars)
            .field(
                "display",
                &self.display.iter().map(|&b| b as char).collect::<String>(),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dna_mapping() {
        let a = Alphabet::dna();
        assert_eq!(a.num_of_chars(), 4);
        assert_eq!(a.map_byte(b'a'), 0);
        assert_eq!(a.map_byte(b'C'), 1);
        assert_eq!(a.map_byte(b'g'), 2);
        assert_eq!(a.map_byte(b'T'), 3);
        assert_eq!(a.map_byte(b'N'), WILDCARD);
        assert_eq!(a.map_byte(b'x'), WILDCARD);
    }

    #[test]
    fn pattern_rejects_wildcards() {
        let a = Alphabet::dna();
        assert_eq!(a.map_pattern(b"acgt"), Some(vec![0, 1, 2, 3]));
        assert_eq!(a.map_pattern(b"acnt"), None);
    }

    #[test]
    fn duplicate_class_character_rejected() {
        assert!(Alphabet::new(&["aA", "Ac"]).is_err());
    }

    #[test]
    fn specials_are_special() {
        assert!(is_special(WILDCARD));
        assert!(is_special(SEPARATOR));
        assert!(!is_special(0));
        assert!(!is_special(3));
    }
}
