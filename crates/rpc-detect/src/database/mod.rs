//! Game database
//!
//! Detectable games from the platform's list, cached on disk, indexed by
//! executable signature, refreshed on a schedule.

mod cache;
mod catalog;
mod index;
mod source;

pub use cache::{CatalogSnapshot, CACHE_FILE};
pub use catalog::{needs_refresh, GameCatalog};
pub use index::GameIndex;
pub use source::{parse_catalog, CatalogSource, Fetched, HttpCatalogSource, DETECTABLE_PATH, DOWNLOAD_TIMEOUT};
