//! Movies ETL Library
//!
//! Incremental ETL for a flat movie-metadata file into Postgres.
//!
//! - **Extract**: read the source CSV ([`extract`])
//! - **Transform**: clean, backfill and project three tables ([`transform`])
//! - **Validate**: integrity rules over the cleaned set ([`validate`])
//! - **Load**: watermark-driven delta inserts in one transaction ([`load`], [`watermark`])
//! - **Orchestrate**: state machine, alerts and run reports ([`pipeline`], [`notify`])
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use movies_etl::{config::EtlConfig, db, notify::LogNotifier, pipeline::Pipeline};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = EtlConfig::load()?;
//!     let pool = db::create_pool(&config.database).await?;
//!     db::run_migrations(&pool).await?;
//!
//!     let outcome = Pipeline::new(config, pool, Arc::new(LogNotifier)).run().await?;
//!     println!("{}", outcome.report().summary());
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod extract;
pub mod load;
pub mod models;
pub mod notify;
pub mod pipeline;
pub mod transform;
pub mod validate;
pub mod watermark;

// Re-export commonly used types
pub use cli::Cli;
pub use config::EtlConfig;
pub use error::{PipelineError, PipelineResult};
pub use pipeline::{spawn_pipeline, Pipeline, PipelineOutcome, PipelineState, RunReport};
