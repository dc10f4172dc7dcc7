//! Movies Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared utilities for the movie metadata ETL workspace.
//!
//! - **Error Handling**: [`MoviesError`] and the crate [`Result`] alias
//! - **Logging**: `tracing` subscriber setup driven by `LOG_*` variables
//! - **Checksums**: SHA-256 fingerprints of source and staging files
//!
//! # Example
//!
//! ```no_run
//! use movies_common::checksum::file_sha256;
//! use movies_common::Result;
//!
//! fn fingerprint(path: &str) -> Result<()> {
//!     let digest = file_sha256(path)?;
//!     tracing::info!(%digest, "source fingerprint");
//!     Ok(())
//! }
//! ```

pub mod checksum;
pub mod error;
pub mod logging;

pub use error::{MoviesError, Result};
