//! Persistent artifact cache.
//!
//! [`ArtifactStore`] owns every byte written to disk; pipeline components go
//! through it and never touch the cache directory themselves.

pub mod records;
mod store;

pub use records::{
    DEFAULT_IMPORTANCE, Importance, SENTINEL_PHRASES, SourceSnapshot, SummaryRecord,
    is_sentinel_text,
};
pub use store::{
    ArtifactStore, CONTENT_FILE, CacheSettings, ClearReport, DEFAULT_RETENTION_DAYS,
    DEFAULT_SNAPSHOT_MAX_AGE_HOURS, EvictionReport, SNAPSHOT_FILE, SUMMARY_FILE,
};
