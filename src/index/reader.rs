//! Memory-mapped access to a finished index.
//!
//! The `.prj` file is parsed first; the table files are then mapped
//! and validated against it, so a truncated or mismatched table is
//! caught at open time rather than as a garbage suffix position
//! later. The `.llv` side table is small and read eagerly.

use std::fs::{self, File};
use std::path::Path;

use memmap2::Mmap;

use crate::error::{IndexError, Result};
use crate::seq::ReadMode;

use super::types::{LargeLcpValue, SeqPos, LCP_OVERFLOW};
use super::writer::{table_path, DbFile, ProjectMeta};

impl ProjectMeta {
    /// Parses the `key=value` lines of a `.prj` file.
    pub fn parse(text: &str) -> Result<Self> {
        let corrupt = |msg: String| IndexError::CorruptIndex(msg);
        let mut dbfiles = Vec::new();
        let mut fields: std::collections::HashMap<&str, &str> = std::collections::HashMap::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let (key, value) = line
                .split_once('=')
                .ok_or_else(|| corrupt(format!("malformed project line {line:?}")))?;
            if key == "dbfile" {
                let mut parts = value.rsplitn(3, ' ');
                let effective_length = parts.next().and_then(|s| s.parse().ok());
                let length = parts.next().and_then(|s| s.parse().ok());
                let name = parts.next();
                match (name, length, effective_length) {
                    (Some(name), Some(length), Some(effective_length)) => dbfiles.push(DbFile {
                        name: name.to_string(),
                        length,
                        effective_length,
                    }),
                    _ => return Err(corrupt(format!("malformed dbfile line {line:?}"))),
                }
            } else {
                fields.insert(key, value);
            }
        }
        let get = |key: &str| -> Result<u64> {
            fields
                .get(key)
                .and_then(|v| v.parse().ok())
                .ok_or_else(|| corrupt(format!("missing or malformed project key {key:?}")))
        };
        if get("integersize")? != 64 {
            return Err(corrupt("only 64-bit indexes are supported".into()));
        }
        if get("littleendian")? != 1 {
            return Err(corrupt("only little-endian indexes are supported".into()));
        }
        let read_mode = ReadMode::from_code(get("readmode")? as u8)
            .ok_or_else(|| corrupt("unknown read mode".into()))?;
        Ok(ProjectMeta {
            dbfiles,
            total_length: get("totallength")?,
            special_characters: get("specialcharacters")?,
            special_ranges: get("specialranges")?,
            length_of_special_prefix: get("lengthofspecialprefix")?,
            length_of_special_suffix: get("lengthofspecialsuffix")?,
            num_of_sequences: get("numofsequences")?,
            longest: get("longest")?,
            prefix_length: get("prefixlength")? as u32,
            large_lcp_values: get("largelcpvalues")?,
            max_branch_depth: get("maxbranchdepth")?,
            read_mode,
        })
    }
}

/// Read view over the `.suf`, `.lcp` and `.llv` tables of one index.
pub struct EsaReader {
    meta: ProjectMeta,
    suf: Mmap,
    lcp: Mmap,
    llv: Vec<LargeLcpValue>,
}

impl EsaReader {
    pub fn open(indexname: &Path) -> Result<Self> {
        let text = fs::read_to_string(table_path(indexname, ".prj"))?;
        let meta = ProjectMeta::parse(&text)?;
        let entries = meta.total_length + 1;

        let suf = map_table(indexname, ".suf", entries * 8)?;
        let lcp = map_table(indexname, ".lcp", entries)?;

        let llv_bytes = fs::read(table_path(indexname, ".llv"))?;
        if llv_bytes.len() as u64 != meta.large_lcp_values * 16 {
            return Err(IndexError::CorruptIndex(format!(
                ".llv holds {} bytes, project file promises {} records",
                llv_bytes.len(),
                meta.large_lcp_values
            )));
        }
        let llv: Vec<LargeLcpValue> = llv_bytes
            .chunks_exact(16)
            .map(|chunk| LargeLcpValue {
                position: u64::from_le_bytes(chunk[..8].try_into().unwrap()),
                value: u64::from_le_bytes(chunk[8..].try_into().unwrap()),
            })
            .collect();
        if !llv.windows(2).all(|w| w[0].position < w[1].position) {
            return Err(IndexError::CorruptIndex(
                ".llv records are not sorted by position".into(),
            ));
        }
        // Every sentinel byte must line up with its overflow record,
        // in order; lcp() counts on this holding.
        let mut next = llv.iter();
        for (rank, &byte) in lcp.iter().enumerate() {
            if byte == LCP_OVERFLOW && next.next().map(|l| l.position) != Some(rank as u64) {
                return Err(IndexError::CorruptIndex(format!(
                    "no .llv record for the overflow entry at rank {rank}"
                )));
            }
        }

        Ok(EsaReader {
            meta,
            suf,
            lcp,
            llv,
        })
    }

    #[inline]
    pub fn meta(&self) -> &ProjectMeta {
        &self.meta
    }

    /// Number of suffix-array entries, including the empty suffix.
    #[inline]
    pub fn num_entries(&self) -> u64 {
        self.meta.total_length + 1
    }

    /// Suffix position at `rank`.
    pub fn suffix(&self, rank: u64) -> SeqPos {
        let at = rank as usize * 8;
        u64::from_le_bytes(self.suf[at..at + 8].try_into().unwrap())
    }

    /// LCP between the suffixes at `rank - 1` and `rank`, overflow
    /// resolved through the side table.
    pub fn lcp(&self, rank: u64) -> u64 {
        let byte = self.lcp[rank as usize];
        if byte < LCP_OVERFLOW {
            byte as u64
        } else {
            match self.llv.binary_search_by_key(&rank, |l| l.position) {
                Ok(at) => self.llv[at].value,
                // Ruled out by the correspondence check in open().
                Err(_) => unreachable!("overflow entry without record at rank {rank}"),
            }
        }
    }

    /// All `(suffix, lcp)` entries in rank order.
    pub fn entries(&self) -> impl Iterator<Item = (SeqPos, u64)> + '_ {
        (0..self.num_entries()).map(|rank| (self.suffix(rank), self.lcp(rank)))
    }
}

fn map_table(indexname: &Path, ext: &str, expected_bytes: u64) -> Result<Mmap> {
    let path = table_path(indexname, ext);
    let file = File::open(&path)?;
    let map = unsafe { Mmap::map(&file)? };
    if map.len() as u64 != expected_bytes {
        return Err(IndexError::CorruptIndex(format!(
            "{} holds {} bytes, project file implies {}",
            path.display(),
            map.len(),
            expected_bytes
        )));
    }
    Ok(map)
}
