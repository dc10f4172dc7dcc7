//! Pipeline error taxonomy

use std::path::PathBuf;
use thiserror::Error;

use crate::extract::ExtractError;
use crate::load::LoadError;
use crate::transform::TransformError;

/// Why a pipeline run failed. Every variant leaves the store as it was
/// before the run.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Source data file is missing: {}", .0.display())]
    DataFileMissing(PathBuf),

    #[error("Extraction failed: {0}")]
    Extract(#[source] ExtractError),

    #[error("Transformation failed: {0}")]
    Transform(#[from] TransformError),

    #[error("Load failed: {0}")]
    Load(#[from] LoadError),

    /// Another run holds the lock for this pipeline name
    #[error("Pipeline '{0}' is already running")]
    AlreadyRunning(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl From<ExtractError> for PipelineError {
    fn from(err: ExtractError) -> Self {
        match err {
            ExtractError::NotFound(path) => PipelineError::DataFileMissing(path),
            other => PipelineError::Extract(other),
        }
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;
