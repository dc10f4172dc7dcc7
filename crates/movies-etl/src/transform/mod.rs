//! Cleaning and reshaping of extracted rows
//!
//! [`Transformer::clean`] applies the cleaning rules in a fixed order, since
//! later rules rely on the defaults filled in by earlier ones:
//!
//! 1. parse `date_published`, unparseable dates become `None`
//! 2. default numeric nullables to 0 and text nullables to named defaults
//! 3. wrap the five multi-valued columns as one-element lists
//! 4. backfill `year` from the publish date, then coerce it to an integer
//! 5. project the movie, production and rating tables
//!
//! The [`convert`] submodule holds the CSV/JSON Lines staging converters.

pub mod convert;

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::models::{CleanedMovie, MultiValue, RawMovie, TransformedTables, NO_DESCRIPTION, UNKNOWN};

pub use convert::{csv_to_json, json_to_csv, ConvertError};

/// Snapshot of the cleaned set, relative to the staging directory
pub const PROCESSED_SNAPSHOT: &str = "processed/processed.csv";

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d"];
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

#[derive(Error, Debug)]
pub enum TransformError {
    /// Neither `year` nor a parseable `date_published` is present
    #[error("Row {imdb_title_id} has no year and no publish date to backfill it from")]
    MissingYear { imdb_title_id: String },

    #[error("Row {imdb_title_id} has a non-integer year '{value}'")]
    InvalidYear { imdb_title_id: String, value: String },

    #[error("Staging conversion failed: {0}")]
    Staging(#[from] ConvertError),
}

/// Applies the cleaning rules and writes the optional debug snapshot
#[derive(Debug, Clone, Default)]
pub struct Transformer {
    staging_dir: Option<PathBuf>,
}

impl Transformer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also write `processed/processed.csv` under `dir` on every clean
    pub fn with_staging_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            staging_dir: Some(dir.into()),
        }
    }

    pub fn staging_dir(&self) -> Option<&Path> {
        self.staging_dir.as_deref()
    }

    /// Clean every row and project the target tables
    pub fn clean(&self, raw: &[RawMovie]) -> Result<TransformedTables, TransformError> {
        let full = raw.iter().map(clean_row).collect::<Result<Vec<_>, _>>()?;

        let backfilled = raw
            .iter()
            .filter(|row| row.year.as_deref().map_or(true, |y| y.trim().is_empty()))
            .count();
        if backfilled > 0 {
            debug!(rows = backfilled, "Backfilled year from publish date");
        }

        if let Some(dir) = &self.staging_dir {
            let path = dir.join(PROCESSED_SNAPSHOT);
            match write_snapshot(&path, &full) {
                Ok(()) => debug!(path = %path.display(), "Wrote processed snapshot"),
                Err(e) => warn!(path = %path.display(), error = %e, "Could not write processed snapshot"),
            }
        }

        let tables = TransformedTables::from_full(full);
        info!(rows = tables.len(), "Transformation completed");

        Ok(tables)
    }
}

/// Convenience wrapper for a transformer without a staging directory
pub fn transform_movies(raw: &[RawMovie]) -> Result<TransformedTables, TransformError> {
    Transformer::new().clean(raw)
}

fn clean_row(row: &RawMovie) -> Result<CleanedMovie, TransformError> {
    // Rule 1
    let date_published = row.date_published.as_deref().and_then(parse_publish_date);

    // Rules 2 and 3
    let text = |value: &Option<String>| value.clone().unwrap_or_else(|| UNKNOWN.to_string());
    let multi = |value: &Option<String>| MultiValue::single(text(value));
    let count = |value: Option<f64>| value.unwrap_or(0.0) as i64;

    // Rule 4
    let year = match parse_year(row)?.or_else(|| date_published.map(|d| d.year())) {
        Some(year) => year,
        None => {
            return Err(TransformError::MissingYear {
                imdb_title_id: row.imdb_title_id.clone(),
            })
        },
    };

    Ok(CleanedMovie {
        imdb_title_id: row.imdb_title_id.clone(),
        title: row.title.clone(),
        year: Some(year),
        date_published,
        duration: row.duration.map(|d| d as i32),
        description: row
            .description
            .clone()
            .unwrap_or_else(|| NO_DESCRIPTION.to_string()),
        director: multi(&row.director),
        writer: multi(&row.writer),
        production_company: text(&row.production_company),
        actors: multi(&row.actors),
        country: multi(&row.country),
        language: multi(&row.language),
        avg_vote: row.avg_vote.unwrap_or(0.0),
        votes: count(row.votes),
        reviews_from_users: count(row.reviews_from_users),
        reviews_from_critics: count(row.reviews_from_critics),
    })
}

/// Source `year` as an integer; `Ok(None)` when the cell is empty
fn parse_year(row: &RawMovie) -> Result<Option<i32>, TransformError> {
    let Some(raw) = row.year.as_deref().map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };

    if let Ok(year) = raw.parse::<i32>() {
        return Ok(Some(year));
    }

    // Files round-tripped through float columns carry years like "1994.0"
    match raw.parse::<f64>() {
        Ok(value) if value.is_finite() && value.fract() == 0.0 => Ok(Some(value as i32)),
        _ => Err(TransformError::InvalidYear {
            imdb_title_id: row.imdb_title_id.clone(),
            value: raw.to_string(),
        }),
    }
}

/// Lenient publish date parser, `None` for anything unrecognised
pub fn parse_publish_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
                .map(|dt| dt.date())
        })
        .or_else(|| {
            if value.len() == 4 && value.bytes().all(|b| b.is_ascii_digit()) {
                value
                    .parse::<i32>()
                    .ok()
                    .and_then(|year| NaiveDate::from_ymd_opt(year, 1, 1))
            } else {
                None
            }
        })
}

const SNAPSHOT_HEADER: [&str; 16] = [
    "imdb_title_id",
    "title",
    "year",
    "date_published",
    "duration",
    "description",
    "director",
    "writer",
    "production_company",
    "actors",
    "country",
    "language",
    "avg_vote",
    "votes",
    "reviews_from_users",
    "reviews_from_critics",
];

fn write_snapshot(path: &Path, rows: &[CleanedMovie]) -> Result<(), ConvertError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| ConvertError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(SNAPSHOT_HEADER)?;

    for row in rows {
        writer.write_record([
            row.imdb_title_id.clone(),
            row.title.clone(),
            row.year.map(|y| y.to_string()).unwrap_or_default(),
            row.date_published
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_default(),
            row.duration.map(|d| d.to_string()).unwrap_or_default(),
            row.description.clone(),
            row.director.to_json_text(),
            row.writer.to_json_text(),
            row.production_company.clone(),
            row.actors.to_json_text(),
            row.country.to_json_text(),
            row.language.to_json_text(),
            row.avg_vote.to_string(),
            row.votes.to_string(),
            row.reviews_from_users.to_string(),
            row.reviews_from_critics.to_string(),
        ])?;
    }

    writer.flush().map_err(|source| ConvertError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    Ok(())
}
