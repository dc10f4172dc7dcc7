//! Source file extraction

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use crate::models::RawMovie;

#[derive(Error, Debug)]
pub enum ExtractError {
    /// The source file does not exist
    #[error("Source file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed CSV in {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

/// Read every row of the source CSV, in file order
pub fn extract_movies(path: impl AsRef<Path>) -> Result<Vec<RawMovie>, ExtractError> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(ExtractError::NotFound(path.to_path_buf()));
    }

    let file = File::open(path).map_err(|source| match source.kind() {
        std::io::ErrorKind::NotFound => ExtractError::NotFound(path.to_path_buf()),
        _ => ExtractError::Io {
            path: path.to_path_buf(),
            source,
        },
    })?;

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(BufReader::new(file));

    let rows = reader
        .deserialize::<RawMovie>()
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| ExtractError::Csv {
            path: path.to_path_buf(),
            source,
        })?;

    debug!(path = %path.display(), "Source file parsed");
    info!(path = %path.display(), rows = rows.len(), "Extracted movies");

    Ok(rows)
}
