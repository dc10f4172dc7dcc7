//! Record types flowing through the pipeline
//!
//! `RawMovie` is one row of the source file exactly as read. `CleanedMovie`
//! is the same row after the cleaning rules ran, and `MovieInfo`,
//! `ProductionInfo` and `RatingInfo` are its three column projections, one
//! per target table.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default for missing free-text columns
pub const UNKNOWN: &str = "Unknown";

/// Default for a missing `description`
pub const NO_DESCRIPTION: &str = "No description given";

/// One row of the source file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawMovie {
    pub imdb_title_id: String,
    pub title: String,
    /// Kept as text; coerced to an integer during cleaning
    pub year: Option<String>,
    pub date_published: Option<String>,
    pub duration: Option<f64>,
    pub description: Option<String>,
    pub director: Option<String>,
    pub writer: Option<String>,
    pub production_company: Option<String>,
    pub actors: Option<String>,
    pub country: Option<String>,
    pub language: Option<String>,
    pub avg_vote: Option<f64>,
    pub votes: Option<f64>,
    pub reviews_from_users: Option<f64>,
    pub reviews_from_critics: Option<f64>,
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("a multi-valued field needs at least one value")]
pub struct EmptyMultiValue;

/// Non-empty list of strings, stored as a JSON array
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct MultiValue(Vec<String>);

impl MultiValue {
    /// Wrap a scalar source string as a one-element list
    pub fn single(value: impl Into<String>) -> Self {
        Self(vec![value.into()])
    }

    pub fn values(&self) -> &[String] {
        &self.0
    }

    pub fn first(&self) -> &str {
        // Non-empty by construction
        self.0.first().map(String::as_str).unwrap_or_default()
    }

    /// Compact JSON array text, e.g. `["Frank Darabont"]`
    pub fn to_json_text(&self) -> String {
        serde_json::to_string(&self.0).unwrap_or_else(|_| "[]".to_string())
    }
}

impl TryFrom<Vec<String>> for MultiValue {
    type Error = EmptyMultiValue;

    fn try_from(values: Vec<String>) -> Result<Self, Self::Error> {
        if values.is_empty() {
            Err(EmptyMultiValue)
        } else {
            Ok(Self(values))
        }
    }
}

impl From<MultiValue> for Vec<String> {
    fn from(value: MultiValue) -> Self {
        value.0
    }
}

/// A source row after cleaning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanedMovie {
    pub imdb_title_id: String,
    pub title: String,
    /// Always `Some` when produced by the transformer
    pub year: Option<i32>,
    pub date_published: Option<NaiveDate>,
    pub duration: Option<i32>,
    pub description: String,
    pub director: MultiValue,
    pub writer: MultiValue,
    pub production_company: String,
    pub actors: MultiValue,
    pub country: MultiValue,
    pub language: MultiValue,
    pub avg_vote: f64,
    pub votes: i64,
    pub reviews_from_users: i64,
    pub reviews_from_critics: i64,
}

impl CleanedMovie {
    pub fn movie_info(&self) -> MovieInfo {
        MovieInfo {
            imdb_title_id: self.imdb_title_id.clone(),
            title: self.title.clone(),
            year: self.year,
            duration: self.duration,
            description: self.description.clone(),
        }
    }

    pub fn production_info(&self) -> ProductionInfo {
        ProductionInfo {
            imdb_title_id: self.imdb_title_id.clone(),
            director: self.director.clone(),
            writer: self.writer.clone(),
            production_company: self.production_company.clone(),
            actors: self.actors.clone(),
            country: self.country.clone(),
            language: self.language.clone(),
        }
    }

    pub fn rating_info(&self) -> RatingInfo {
        RatingInfo {
            imdb_title_id: self.imdb_title_id.clone(),
            avg_vote: self.avg_vote,
            votes: self.votes,
            reviews_from_users: self.reviews_from_users,
            reviews_from_critics: self.reviews_from_critics,
        }
    }
}

/// `movie_info` row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovieInfo {
    pub imdb_title_id: String,
    pub title: String,
    pub year: Option<i32>,
    pub duration: Option<i32>,
    pub description: String,
}

/// `production_info` row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductionInfo {
    pub imdb_title_id: String,
    pub director: MultiValue,
    pub writer: MultiValue,
    pub production_company: String,
    pub actors: MultiValue,
    pub country: MultiValue,
    pub language: MultiValue,
}

/// `rating_info` row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingInfo {
    pub imdb_title_id: String,
    pub avg_vote: f64,
    pub votes: i64,
    pub reviews_from_users: i64,
    pub reviews_from_critics: i64,
}

/// Output of the transformer: the cleaned full set and its projections
#[derive(Debug, Clone, Default)]
pub struct TransformedTables {
    pub full: Vec<CleanedMovie>,
    pub movie_info: Vec<MovieInfo>,
    pub production_info: Vec<ProductionInfo>,
    pub rating_info: Vec<RatingInfo>,
}

impl TransformedTables {
    pub fn from_full(full: Vec<CleanedMovie>) -> Self {
        let movie_info = full.iter().map(CleanedMovie::movie_info).collect();
        let production_info = full.iter().map(CleanedMovie::production_info).collect();
        let rating_info = full.iter().map(CleanedMovie::rating_info).collect();

        Self {
            full,
            movie_info,
            production_info,
            rating_info,
        }
    }

    pub fn len(&self) -> usize {
        self.full.len()
    }

    pub fn is_empty(&self) -> bool {
        self.full.is_empty()
    }
}
