pub mod bentsedg;
pub mod blindtrie;
pub mod bucket;
pub mod dfs;
pub mod driver;
pub mod lcp;
pub mod maxpairs;
pub mod reader;
pub mod types;
pub mod writer;

pub use bucket::{recommended_prefix_length, BucketTable};
pub use dfs::{depth_first_esa, BranchStats, BranchStatsVisitor, DfsVisitor};
pub use driver::{
    sort_suffixes, DriverStats, IndexSink, SegmentCollector, SuffixSortOptions,
};
pub use maxpairs::{enumerate_maximal_pairs, MaxPairsVisitor, MaximalPair};
pub use reader::EsaReader;
pub use types::*;
pub use writer::{DbFile, ProjectMeta, TableWriter};
