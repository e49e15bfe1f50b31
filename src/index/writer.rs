//! On-disk index writers: `.suf`, `.lcp`, `.llv` tables plus the
//! `.prj` project file.
//!
//! All tables are streamed through [`TableWriter`], which implements
//! [`IndexSink`] so the sort driver can write buckets as they finish.
//! Every file is written under a `.tmp` name and renamed into place in
//! [`TableWriter::finish`], so an interrupted build never leaves a
//! half-written index behind.
//!
//! Formats, all little-endian:
//! - `.suf`: `total_length + 1` u64 suffix positions in rank order.
//! - `.lcp`: one byte per rank; 255 marks an overflow entry.
//! - `.llv`: 16-byte `{position, value}` records for overflow entries.
//! - `.prj`: text `key=value` lines describing the build.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::seq::{EncodedSequence, ReadMode};

use super::driver::{DriverStats, IndexSink};
use super::types::{LargeLcpValue, SeqPos};

const WRITE_BUFFER_SIZE: usize = 65536;

/// One input file contributing to the indexed sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbFile {
    pub name: String,
    /// Bytes read from the file.
    pub length: u64,
    /// Symbols it contributed after parsing.
    pub effective_length: u64,
}

/// Everything the `.prj` file records about an index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectMeta {
    pub dbfiles: Vec<DbFile>,
    pub total_length: u64,
    pub special_characters: u64,
    pub special_ranges: u64,
    pub length_of_special_prefix: u64,
    pub length_of_special_suffix: u64,
    pub num_of_sequences: u64,
    /// Rank of the suffix starting at position 0.
    pub longest: u64,
    pub prefix_length: u32,
    pub large_lcp_values: u64,
    pub max_branch_depth: u64,
    pub read_mode: ReadMode,
}

impl ProjectMeta {
    pub fn new(
        seq: &EncodedSequence,
        rm: ReadMode,
        stats: &DriverStats,
        dbfiles: Vec<DbFile>,
    ) -> Self {
        ProjectMeta {
            dbfiles,
            total_length: seq.total_length(),
            special_characters: seq.special_characters(),
            special_ranges: seq.num_special_ranges(),
            length_of_special_prefix: seq.length_of_special_prefix(),
            length_of_special_suffix: seq.length_of_special_suffix(),
            num_of_sequences: seq.num_of_sequences(),
            longest: stats.longest,
            prefix_length: stats.prefix_length,
            large_lcp_values: stats.num_large_lcp,
            max_branch_depth: stats.max_branch_depth,
            read_mode: rm,
        }
    }

    /// Renders the `key=value` lines of the `.prj` file.
    pub fn format(&self) -> String {
        let mut out = String::new();
        for db in &self.dbfiles {
            out.push_str(&format!(
                "dbfile={} {} {}\n",
                db.name, db.length, db.effective_length
            ));
        }
        out.push_str(&format!("totallength={}\n", self.total_length));
        out.push_str(&format!("specialcharacters={}\n", self.special_characters));
        out.push_str(&format!("specialranges={}\n", self.special_ranges));
        out.push_str(&format!(
            "lengthofspecialprefix={}\n",
            self.length_of_special_prefix
        ));
        out.push_str(&format!(
            "lengthofspecialsuffix={}\n",
            self.length_of_special_suffix
        ));
        out.push_str(&format!("numofsequences={}\n", self.num_of_sequences));
        out.push_str(&format!("longest={}\n", self.longest));
        out.push_str(&format!("prefixlength={}\n", self.prefix_length));
        out.push_str(&format!("largelcpvalues={}\n", self.large_lcp_values));
        out.push_str(&format!("maxbranchdepth={}\n", self.max_branch_depth));
        out.push_str("integersize=64\n");
        out.push_str("littleendian=1\n");
        out.push_str(&format!("readmode={}\n", self.read_mode.code()));
        out
    }
}

/// `<indexname><ext>`, e.g. `genome` plus `.suf`.
pub fn table_path(indexname: &Path, ext: &str) -> PathBuf {
    let mut s: OsString = indexname.as_os_str().to_os_string();
    s.push(ext);
    PathBuf::from(s)
}

fn tmp_path(indexname: &Path, ext: &str) -> PathBuf {
    let mut p = table_path(indexname, ext).into_os_string();
    p.push(".tmp");
    PathBuf::from(p)
}

/// Streams sorted buckets into the table files.
pub struct TableWriter {
    indexname: PathBuf,
    suf: BufWriter<File>,
    lcp: BufWriter<File>,
    llv: BufWriter<File>,
    entries: u64,
}

impl TableWriter {
    /// Opens the temporary table files next to `indexname`.
    pub fn create(indexname: &Path) -> Result<Self> {
        let open = |ext: &str| -> Result<BufWriter<File>> {
            Ok(BufWriter::with_capacity(
                WRITE_BUFFER_SIZE,
                File::create(tmp_path(indexname, ext))?,
            ))
        };
        Ok(TableWriter {
            indexname: indexname.to_path_buf(),
            suf: open(".suf")?,
            lcp: open(".lcp")?,
            llv: open(".llv")?,
            entries: 0,
        })
    }

    #[inline]
    pub fn entries(&self) -> u64 {
        self.entries
    }

    /// Flushes everything, writes the project file, and renames all
    /// tables into place.
    pub fn finish(mut self, meta: &ProjectMeta) -> Result<()> {
        debug_assert_eq!(self.entries, meta.total_length + 1);
        self.suf.flush()?;
        self.lcp.flush()?;
        self.llv.flush()?;
        drop(self.suf);
        drop(self.lcp);
        drop(self.llv);
        let prj_tmp = tmp_path(&self.indexname, ".prj");
        fs::write(&prj_tmp, meta.format())?;
        for ext in [".suf", ".lcp", ".llv", ".prj"] {
            fs::rename(tmp_path(&self.indexname, ext), table_path(&self.indexname, ext))?;
        }
        Ok(())
    }
}

impl IndexSink for TableWriter {
    fn segment(
        &mut self,
        suffixes: &[SeqPos],
        lcp_bytes: &[u8],
        large: &[LargeLcpValue],
    ) -> Result<()> {
        for &pos in suffixes {
            self.suf.write_all(&pos.to_le_bytes())?;
        }
        self.lcp.write_all(lcp_bytes)?;
        for record in large {
            self.llv.write_all(&record.position.to_le_bytes())?;
            self.llv.write_all(&record.value.to_le_bytes())?;
        }
        self.entries += suffixes.len() as u64;
        Ok(())
    }
}
