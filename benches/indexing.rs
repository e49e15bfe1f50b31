//! Construction and query benchmarks over synthetic DNA.
//!
//! Run with: `cargo bench`
//! Save baseline: `cargo bench -- --save-baseline main`
//! Compare: `cargo bench -- --baseline main`

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use sxi::fm::FmIndex;
use sxi::index::{sort_suffixes, SegmentCollector, SuffixSortOptions};
use sxi::seq::{EncodedSequence, ReadMode, SEPARATOR, WILDCARD};

fn random_symbols(len: usize, state: &mut u64) -> Vec<u8> {
    (0..len)
        .map(|_| {
            *state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            match (*state >> 33) % 200 {
                0 => WILDCARD,
                1 => SEPARATOR,
                x => (x % 4) as u8,
            }
        })
        .collect()
}

fn bench_sort(c: &mut Criterion) {
    let mut group = c.benchmark_group("suffix-sort");
    let mut state = 0x5eedu64;
    for len in [10_000usize, 100_000, 500_000] {
        let symbols = random_symbols(len, &mut state);
        let seq = EncodedSequence::from_symbols(&symbols, 4).unwrap();
        group.throughput(Throughput::Elements(len as u64));
        group.bench_with_input(BenchmarkId::from_parameter(len), &seq, |b, seq| {
            b.iter(|| {
                let mut out = SegmentCollector::new();
                sort_suffixes(
                    seq,
                    ReadMode::Forward,
                    &SuffixSortOptions::default(),
                    &mut out,
                    None,
                )
                .unwrap();
                out.suftab.len()
            })
        });
    }
    group.finish();
}

fn bench_fm(c: &mut Criterion) {
    let mut state = 0xfeedu64;
    let symbols = random_symbols(200_000, &mut state);
    let seq = EncodedSequence::from_symbols(&symbols, 4).unwrap();
    let mut out = SegmentCollector::new();
    sort_suffixes(
        &seq,
        ReadMode::Forward,
        &SuffixSortOptions::default(),
        &mut out,
        None,
    )
    .unwrap();

    c.bench_function("fm-build-200k", |b| {
        b.iter(|| {
            FmIndex::build(&seq, ReadMode::Forward, out.suftab.iter().copied(), Some(5)).unwrap()
        })
    });

    let fm = FmIndex::build(&seq, ReadMode::Forward, out.suftab.iter().copied(), Some(5)).unwrap();
    let patterns: Vec<Vec<u8>> = (0..64u64)
        .map(|i| {
            let start = (i * 2857) as usize % (symbols.len() - 24);
            symbols[start..start + 20]
                .iter()
                .map(|&s| if s < 4 { s } else { 0 })
                .collect()
        })
        .collect();
    c.bench_function("backward-search-20mer", |b| {
        b.iter(|| {
            patterns
                .iter()
                .map(|p| fm.exact_match_count(p))
                .sum::<u64>()
        })
    });
}

criterion_group!(benches, bench_sort, bench_fm);
criterion_main!(benches);
