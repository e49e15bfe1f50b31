use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use sxi::fm::{approx_search, FmIndex};
use sxi::index::{
    depth_first_esa, enumerate_maximal_pairs, sort_suffixes, BranchStatsVisitor, DbFile,
    EsaReader, ProjectMeta, SuffixSortOptions, TableWriter,
};
use sxi::seq::{is_special, Alphabet, EncodedSequence, ReadMode, SEPARATOR};

#[derive(Parser)]
#[command(name = "sxi")]
#[command(about = "Enhanced suffix array indexing for packed biological sequences")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the index tables for a set of sequence files
    Mkindex {
        /// Index name; tables land at <indexname>.suf/.lcp/.llv/.prj
        indexname: PathBuf,

        /// Input files, FASTA or plain text
        #[arg(short, long, required = true, num_args = 1..)]
        input: Vec<PathBuf>,

        /// Read direction: fwd, rev, cpl or rcl
        #[arg(short, long, default_value = "fwd")]
        dir: String,

        /// Bucket prefix length (default: derived from the input size)
        #[arg(short = 'p', long = "pl")]
        prefix_length: Option<u32>,

        /// Split construction into this many sequential parts
        #[arg(long, default_value_t = 1)]
        parts: u32,

        /// Print sorting-strategy counters after the build
        #[arg(short, long)]
        verbose: bool,
    },
    /// Search an index for patterns
    Query {
        /// Path to the index
        indexname: PathBuf,

        /// Patterns, plain sequence text
        #[arg(required = true)]
        patterns: Vec<String>,

        /// Report matches up to this edit distance
        #[arg(short = 'e', long, default_value_t = 0)]
        max_distance: u64,

        /// Print match counts only
        #[arg(long)]
        count: bool,
    },
    /// Enumerate maximal repeated pairs
    Repfind {
        /// Path to the index
        indexname: PathBuf,

        /// Smallest repeat length to report
        #[arg(short = 'l', long, default_value_t = 20)]
        least_length: u64,
    },
    /// Show index statistics
    Stats {
        /// Path to the index
        indexname: PathBuf,

        /// Machine-readable output
        #[arg(long)]
        json: bool,
    },
    /// Re-check an index against its input files
    Verify {
        /// Path to the index
        indexname: PathBuf,

        /// Suffix pairs to compare
        #[arg(long, default_value_t = 10000)]
        samples: u64,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Mkindex {
            indexname,
            input,
            dir,
            prefix_length,
            parts,
            verbose,
        } => {
            let rm = ReadMode::parse(&dir)
                .with_context(|| format!("unknown read direction '{dir}'"))?;
            mkindex(&indexname, &input, rm, prefix_length, parts, verbose)
        }
        Commands::Query {
            indexname,
            patterns,
            max_distance,
            count,
        } => query(&indexname, &patterns, max_distance, count),
        Commands::Repfind {
            indexname,
            least_length,
        } => repfind(&indexname, least_length),
        Commands::Stats { indexname, json } => stats(&indexname, json),
        Commands::Verify { indexname, samples } => verify(&indexname, samples),
    }
}

/// Reads and encodes the input files. FASTA records and files are
/// joined with separators; unknown characters fold to wildcards.
fn load_inputs(alphabet: &Alphabet, input: &[PathBuf]) -> Result<(Vec<u8>, Vec<DbFile>)> {
    let mut symbols = Vec::new();
    let mut dbfiles = Vec::new();
    for path in input {
        if !symbols.is_empty() {
            symbols.push(SEPARATOR);
        }
        let bytes = fs::read(path).with_context(|| format!("cannot read {}", path.display()))?;
        let before = symbols.len();
        if bytes.first() == Some(&b'>') {
            let mut first_record = true;
            for line in bytes.split(|&b| b == b'\n') {
                if line.first() == Some(&b'>') {
                    if !first_record {
                        symbols.push(SEPARATOR);
                    }
                    first_record = false;
                } else {
                    symbols.extend(
                        line.iter()
                            .filter(|b| !b.is_ascii_whitespace())
                            .map(|&b| alphabet.map_byte(b)),
                    );
                }
            }
        } else {
            symbols.extend(
                bytes
                    .iter()
                    .filter(|b| !b.is_ascii_whitespace())
                    .map(|&b| alphabet.map_byte(b)),
            );
        }
        dbfiles.push(DbFile {
            name: path.display().to_string(),
            length: bytes.len() as u64,
            effective_length: (symbols.len() - before) as u64,
        });
    }
    Ok((symbols, dbfiles))
}

fn mkindex(
    indexname: &Path,
    input: &[PathBuf],
    rm: ReadMode,
    prefix_length: Option<u32>,
    parts: u32,
    verbose: bool,
) -> Result<()> {
    let alphabet = Alphabet::dna();
    let (symbols, dbfiles) = load_inputs(&alphabet, input)?;
    let seq = EncodedSequence::from_symbols(&symbols, alphabet.num_of_chars())
        .context("encoding input")?;
    let options = SuffixSortOptions {
        prefix_length,
        parts,
        ..SuffixSortOptions::default()
    };

    let mut writer = TableWriter::create(indexname)
        .with_context(|| format!("creating tables for {}", indexname.display()))?;

    #[cfg(feature = "progress")]
    let bar = {
        let bar = indicatif::ProgressBar::new(seq.total_length() + 1);
        bar.set_style(indicatif::ProgressStyle::with_template(
            "{bar:40} {pos}/{len} suffixes {elapsed_precise}",
        )?);
        bar
    };
    #[cfg(feature = "progress")]
    let mut on_progress = |done: u64, _total: u64| bar.set_position(done);
    #[cfg(feature = "progress")]
    let progress: Option<&mut dyn FnMut(u64, u64)> = Some(&mut on_progress);
    #[cfg(not(feature = "progress"))]
    let progress: Option<&mut dyn FnMut(u64, u64)> = None;

    let driver_stats =
        sort_suffixes(&seq, rm, &options, &mut writer, progress).context("sorting suffixes")?;

    #[cfg(feature = "progress")]
    bar.finish_and_clear();

    let meta = ProjectMeta::new(&seq, rm, &driver_stats, dbfiles);
    writer
        .finish(&meta)
        .with_context(|| format!("finalizing {}", indexname.display()))?;

    println!(
        "indexed {} symbols, {} sequences, prefix length {}",
        meta.total_length, meta.num_of_sequences, meta.prefix_length
    );
    if verbose {
        let c = &driver_stats.counts;
        println!("bucket codes:     {}", driver_stats.num_of_codes);
        println!("widest bucket:    {}", driver_stats.max_bucket_width);
        println!("parts:            {}", driver_stats.parts);
        println!("insertion sorts:  {}", c.insertionsort);
        println!("blind-trie sorts: {}", c.bltriesort);
        println!("counting sorts:   {}", c.countingsort);
        println!("quicksort steps:  {}", c.qsort);
        println!("large lcp values: {}", driver_stats.num_large_lcp);
        println!("max branch depth: {}", driver_stats.max_branch_depth);
    }
    Ok(())
}

/// Re-encodes the input files named by the project file. The files
/// must still be readable where `mkindex` found them.
fn reload_sequence(meta: &ProjectMeta) -> Result<EncodedSequence> {
    let alphabet = Alphabet::dna();
    let paths: Vec<PathBuf> = meta.dbfiles.iter().map(|db| PathBuf::from(&db.name)).collect();
    let (symbols, dbfiles) = load_inputs(&alphabet, &paths)?;
    for (db, recorded) in dbfiles.iter().zip(&meta.dbfiles) {
        if db != recorded {
            bail!(
                "{} changed since the index was built ({} symbols, expected {})",
                db.name,
                db.effective_length,
                recorded.effective_length
            );
        }
    }
    let seq = EncodedSequence::from_symbols(&symbols, alphabet.num_of_chars())?;
    if seq.total_length() != meta.total_length {
        bail!(
            "input length {} does not match the indexed length {}",
            seq.total_length(),
            meta.total_length
        );
    }
    Ok(seq)
}

/// Locate-sampling density when querying: every 32nd position.
const QUERY_SAMPLE_RATE: u32 = 5;

fn query(indexname: &Path, patterns: &[String], max_distance: u64, count: bool) -> Result<()> {
    let reader = EsaReader::open(indexname)
        .with_context(|| format!("opening index {}", indexname.display()))?;
    let rm = reader.meta().read_mode;
    let seq = reload_sequence(reader.meta())?;
    let alphabet = Alphabet::dna();
    let sample = if count { None } else { Some(QUERY_SAMPLE_RATE) };
    let fm = FmIndex::build(
        &seq,
        rm,
        (0..reader.num_entries()).map(|r| reader.suffix(r)),
        sample,
    )?;

    for pattern in patterns {
        let mapped = alphabet.map_bytes(pattern.as_bytes());
        if mapped.iter().any(|&s| is_special(s)) {
            eprintln!("{pattern}: skipped, contains characters outside the alphabet");
            continue;
        }
        if max_distance == 0 {
            let range = fm.backward_search(&mapped);
            if count {
                println!("{pattern}\t{}", range.end - range.start);
            } else {
                let mut positions = range.map(|rank| fm.locate(rank)).collect::<Result<Vec<u64>, _>>()?;
                positions.sort_unstable();
                for pos in positions {
                    println!("{pattern}\t{pos}");
                }
            }
        } else {
            let mut hits = Vec::new();
            approx_search(&seq, rm, &mapped, max_distance, &mut |m| hits.push(m))?;
            hits.sort_by_key(|m| m.start);
            if count {
                println!("{pattern}\t{}", hits.len());
            } else {
                for m in hits {
                    println!("{pattern}\t{}\t{}\t{}", m.start, m.length, m.distance);
                }
            }
        }
    }
    Ok(())
}

fn repfind(indexname: &Path, least_length: u64) -> Result<()> {
    if least_length == 0 {
        bail!("the least repeat length must be at least 1");
    }
    let reader = EsaReader::open(indexname)
        .with_context(|| format!("opening index {}", indexname.display()))?;
    let meta = reader.meta().clone();
    let seq = reload_sequence(&meta)?;
    let mut pairs = 0u64;
    enumerate_maximal_pairs(&seq, meta.read_mode, reader.entries(), least_length, |p| {
        pairs += 1;
        println!("{}\t{}\t{}", p.length, p.pos1.min(p.pos2), p.pos1.max(p.pos2));
    })?;
    eprintln!("{pairs} maximal pairs of length at least {least_length}");
    Ok(())
}

fn stats(indexname: &Path, json: bool) -> Result<()> {
    let reader = EsaReader::open(indexname)
        .with_context(|| format!("opening index {}", indexname.display()))?;
    let meta = reader.meta();
    if json {
        println!("{}", serde_json::to_string_pretty(meta)?);
        return Ok(());
    }
    for db in &meta.dbfiles {
        println!("input:             {} ({} symbols)", db.name, db.effective_length);
    }
    println!("total length:      {}", meta.total_length);
    println!("sequences:         {}", meta.num_of_sequences);
    println!("special chars:     {}", meta.special_characters);
    println!("special ranges:    {}", meta.special_ranges);
    println!("prefix length:     {}", meta.prefix_length);
    println!("longest at rank:   {}", meta.longest);
    println!("large lcp values:  {}", meta.large_lcp_values);
    println!("max branch depth:  {}", meta.max_branch_depth);
    println!("read mode:         {}", meta.read_mode.name());
    Ok(())
}

fn verify(indexname: &Path, samples: u64) -> Result<()> {
    use rayon::prelude::*;
    use sxi::seq::{compare_suffixes, CmpMode};

    let reader = EsaReader::open(indexname)
        .with_context(|| format!("opening index {}", indexname.display()))?;
    let meta = reader.meta().clone();
    let seq = reload_sequence(&meta)?;
    let rm = meta.read_mode;
    let entries = reader.num_entries();

    // Every position occurs exactly once.
    let mut seen = vec![false; entries as usize];
    for rank in 0..entries {
        let pos = reader.suffix(rank);
        if pos > meta.total_length || seen[pos as usize] {
            bail!("rank {rank}: position {pos} out of range or repeated");
        }
        seen[pos as usize] = true;
    }

    // Sampled adjacent pairs: strict order and exact stored LCP.
    let step = (entries / samples).max(1);
    let ranks: Vec<u64> = (1..entries).step_by(step as usize).collect();
    let failure = ranks
        .par_iter()
        .find_map_first(|&rank| {
            let r = compare_suffixes(
                &seq,
                rm,
                CmpMode::CharByChar,
                reader.suffix(rank - 1),
                reader.suffix(rank),
                0,
                None,
            );
            (r.ord != std::cmp::Ordering::Less || r.lcp != reader.lcp(rank)).then_some(rank)
        });
    if let Some(rank) = failure {
        bail!("rank {rank}: order or lcp mismatch with the sequence");
    }

    // The virtual tree over (suf, lcp) must cover every rank and agree
    // with the recorded branch depth.
    let mut visitor = BranchStatsVisitor::default();
    depth_first_esa(reader.entries(), &mut visitor)?;
    let tree = visitor.stats;
    if tree.leaves != entries {
        bail!("traversal saw {} leaves, expected {entries}", tree.leaves);
    }
    if tree.max_node_depth != meta.max_branch_depth {
        bail!(
            "deepest branch {} disagrees with the recorded {}",
            tree.max_node_depth,
            meta.max_branch_depth
        );
    }

    // The transform must spell the input back.
    let fm = FmIndex::build(&seq, rm, (0..entries).map(|r| reader.suffix(r)), None)?;
    let spelled = fm.reconstruct();
    if spelled.len() as u64 != meta.total_length {
        bail!(
            "reconstructed {} symbols, expected {}",
            spelled.len(),
            meta.total_length
        );
    }
    let mut scan = seq.scan_from(0, rm);
    for (pos, &sym) in spelled.iter().enumerate() {
        if scan.next_symbol() != Some(sym) {
            bail!("reconstructed sequence diverges at position {pos}");
        }
    }

    println!(
        "{} ok: {} entries, {} sampled pairs, {} leaves",
        indexname.display(),
        entries,
        ranks.len(),
        tree.leaves
    );
    Ok(())
}
