//! # rpc-detect
//!
//! Game detection: the detectable games database, process enumeration and
//! the polling detector that emits `GameEvent`s.

pub mod database;
pub mod detector;
pub mod error;
pub mod process;

pub use database::{needs_refresh, CatalogSource, GameCatalog, GameIndex, HttpCatalogSource};
pub use detector::GameDetector;
pub use error::{DetectionError, RefreshError};
pub use process::{ProcessSnapshot, ProcessSource, SysinfoProcessSource};
