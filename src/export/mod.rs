//! Columnar export collaborator
//!
//! Writes two append-only datasets under a base directory:
//! - `matches/`: one row per match
//! - `participants/`: one row per player per match
//!
//! Both are partitioned hive-style by (season, server, mode, date) so query
//! engines can prune partitions, and buffered per partition to amortize
//! small-file overhead. Rows are JSON-lines; the partition layout and the
//! append/flush contract are what downstream tooling depends on, not the
//! file encoding.

mod writer;

pub use writer::{DatasetWriter, ExportError, PartitionKey};
