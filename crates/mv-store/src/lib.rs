//! Report store (mv-store)
//!
//! Append-only, file-per-report persistence for stage validation reports,
//! with a moka cache in front of "latest report per kind" lookups.
//!
//! # Example
//!
//! ```rust,ignore
//! use mv_store::ReportStore;
//! use mv_core::StageKind;
//!
//! let store = ReportStore::new("reports");
//! store.save(StageKind::Tables, &report).await?;
//! let latest = store.load_latest(StageKind::Tables).await?;
//! ```

pub mod cache;
pub mod error;
pub mod store;

pub use cache::LatestReportCache;
pub use error::StoreError;
pub use store::{ReportEntry, ReportStore, DEFAULT_REPORTS_DIR};
