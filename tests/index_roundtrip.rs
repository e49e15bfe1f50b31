//! End-to-end construction tests: sort, write the tables, and read
//! them back through the mmap reader.

use std::path::PathBuf;

use tempfile::TempDir;

use sxi::index::{
    sort_suffixes, DbFile, EsaReader, ProjectMeta, SfxStrategy, SuffixSortOptions, TableWriter,
};
use sxi::seq::{compare_suffixes, Alphabet, CmpMode, EncodedSequence, ReadMode, SEPARATOR, WILDCARD};

fn build_on_disk(
    dir: &TempDir,
    symbols: &[u8],
    num_of_chars: u32,
    options: &SuffixSortOptions,
) -> (EncodedSequence, PathBuf) {
    let seq = EncodedSequence::from_symbols(symbols, num_of_chars).unwrap();
    let indexname = dir.path().join("idx");
    let mut writer = TableWriter::create(&indexname).unwrap();
    let stats = sort_suffixes(&seq, ReadMode::Forward, options, &mut writer, None).unwrap();
    let dbfiles = vec![DbFile {
        name: "test-input".to_string(),
        length: symbols.len() as u64,
        effective_length: symbols.len() as u64,
    }];
    let meta = ProjectMeta::new(&seq, ReadMode::Forward, &stats, dbfiles);
    writer.finish(&meta).unwrap();
    (seq, indexname)
}

fn random_symbols(len: usize, state: &mut u64) -> Vec<u8> {
    (0..len)
        .map(|_| {
            *state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            match (*state >> 33) % 28 {
                0 => WILDCARD,
                1 => SEPARATOR,
                x => (x % 4) as u8,
            }
        })
        .collect()
}

#[test]
fn banana_tables_survive_the_disk_round_trip() {
    let alphabet = Alphabet::new(&["aA", "bB", "nN"]).unwrap();
    let mut symbols = alphabet.map_bytes(b"banana");
    symbols.push(SEPARATOR);
    let dir = TempDir::new().unwrap();
    let (_, indexname) = build_on_disk(
        &dir,
        &symbols,
        3,
        &SuffixSortOptions {
            prefix_length: Some(1),
            ..SuffixSortOptions::default()
        },
    );
    let reader = EsaReader::open(&indexname).unwrap();
    let suf: Vec<u64> = (0..reader.num_entries()).map(|r| reader.suffix(r)).collect();
    let lcp: Vec<u64> = (0..reader.num_entries()).map(|r| reader.lcp(r)).collect();
    assert_eq!(suf, vec![1, 3, 5, 0, 2, 4, 6, 7]);
    assert_eq!(lcp, vec![0, 3, 1, 0, 0, 2, 0, 0]);
    assert_eq!(reader.meta().longest, 3);
    assert_eq!(reader.meta().num_of_sequences, 1);
}

#[test]
fn random_index_is_a_sorted_permutation() {
    let mut state = 0xabcdefu64;
    let symbols = random_symbols(2000, &mut state);
    let dir = TempDir::new().unwrap();
    let (seq, indexname) = build_on_disk(
        &dir,
        &symbols,
        4,
        &SuffixSortOptions {
            parts: 3,
            ..SuffixSortOptions::default()
        },
    );
    let reader = EsaReader::open(&indexname).unwrap();
    let n = seq.total_length();
    assert_eq!(reader.num_entries(), n + 1);

    let mut seen = vec![false; (n + 1) as usize];
    for rank in 0..reader.num_entries() {
        let pos = reader.suffix(rank);
        assert!(pos <= n);
        assert!(!seen[pos as usize], "position {pos} appears twice");
        seen[pos as usize] = true;
    }

    for rank in 1..reader.num_entries() {
        let r = compare_suffixes(
            &seq,
            ReadMode::Forward,
            CmpMode::CharByChar,
            reader.suffix(rank - 1),
            reader.suffix(rank),
            0,
            None,
        );
        assert_eq!(r.ord, std::cmp::Ordering::Less, "rank {rank} out of order");
        assert_eq!(r.lcp, reader.lcp(rank), "rank {rank} lcp mismatch");
    }
}

#[test]
fn deep_repeat_with_small_depth_bound_terminates() {
    // 100000 identical symbols: every pair of suffixes ties far past
    // any reasonable depth bound; the effort cap breaks the ties by
    // position, which is also the true order here.
    let symbols = vec![0u8; 100000];
    let dir = TempDir::new().unwrap();
    let (_, indexname) = build_on_disk(
        &dir,
        &symbols,
        4,
        &SuffixSortOptions {
            strategy: SfxStrategy {
                max_sort_depth: Some(8),
                absolute_max_depth: Some(64),
                ..SfxStrategy::default()
            },
            ..SuffixSortOptions::default()
        },
    );
    let reader = EsaReader::open(&indexname).unwrap();
    for rank in 0..reader.num_entries() {
        assert_eq!(reader.suffix(rank), rank);
    }
    // lcp(rank) = 100000 - rank, far past the sentinel threshold.
    assert!(reader.meta().large_lcp_values > 0);
    for rank in [1u64, 2, 1000, 99744, 99745, 99746, 100000] {
        assert_eq!(reader.lcp(rank), 100000 - rank, "lcp at rank {rank}");
    }
}

#[test]
fn project_meta_round_trips_with_the_tables() {
    let mut state = 31u64;
    let symbols = random_symbols(600, &mut state);
    let dir = TempDir::new().unwrap();
    let (seq, indexname) = build_on_disk(&dir, &symbols, 4, &SuffixSortOptions::default());
    let reader = EsaReader::open(&indexname).unwrap();
    let meta = reader.meta();
    assert_eq!(meta.total_length, seq.total_length());
    assert_eq!(meta.special_characters, seq.special_characters());
    assert_eq!(meta.num_of_sequences, seq.num_of_sequences());
    assert_eq!(meta.read_mode, ReadMode::Forward);
    assert_eq!(meta.dbfiles.len(), 1);
    assert_eq!(reader.suffix(meta.longest), 0);
    // Every sentinel byte resolves through the side table.
    let max = (0..reader.num_entries()).map(|r| reader.lcp(r)).max().unwrap();
    assert_eq!(max, meta.max_branch_depth);
}
