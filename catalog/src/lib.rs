//! Task catalog core: ingestion, caching, search, and queries.
//!
//! The catalog discovers benchmark task definitions from remote
//! repositories (both directories merged into the default branch and
//! candidates proposed by open pull requests), normalizes them into
//! [`Task`] records, and serves list/search/get/stats queries from an
//! immutable, atomically swapped [`CatalogSnapshot`].
//!
//! Reads never touch the network: queries run against the snapshot the
//! [`CatalogCache`] currently holds, while refreshes rebuild a new snapshot
//! in the background and install it wholesale.

mod cache;
mod config;
mod error;
mod index;
mod ingest;
mod model;
mod parser;
mod query;

pub use cache::CatalogCache;
pub use config::BenchmarkSource;
pub use config::CatalogConfig;
pub use config::MetadataFormat;
pub use error::CatalogError;
pub use error::IngestError;
pub use index::SearchIndex;
pub use ingest::Ingestor;
pub use model::BenchmarkStats;
pub use model::CatalogSnapshot;
pub use model::CatalogStats;
pub use model::IngestDiagnostic;
pub use model::PrInfo;
pub use model::SnapshotInfo;
pub use model::SourceState;
pub use model::Task;
pub use parser::ParseError;
pub use parser::TaskMeta;
pub use query::Catalog;
pub use query::CatalogState;
pub use query::TaskFilter;
