//! Integrity rules over the cleaned full record set

use std::collections::HashSet;

use crate::models::CleanedMovie;

pub const MISSING_YEAR: &str = "missing year values";
pub const INVALID_VOTE_RANGE: &str = "invalid vote range";
pub const DUPLICATE_IDENTIFIER: &str = "duplicate identifier detected";

/// Run every rule and return one message per failed rule, in rule order.
/// An empty list means the set may be loaded.
pub fn validate_movies(rows: &[CleanedMovie]) -> Vec<String> {
    let mut errors = Vec::new();

    if rows.iter().any(|row| row.year.is_none()) {
        errors.push(MISSING_YEAR.to_string());
    }

    if rows.iter().any(|row| !(0.0..=10.0).contains(&row.avg_vote)) {
        errors.push(INVALID_VOTE_RANGE.to_string());
    }

    let mut seen = HashSet::with_capacity(rows.len());
    if !rows.iter().all(|row| seen.insert(row.imdb_title_id.as_str())) {
        errors.push(DUPLICATE_IDENTIFIER.to_string());
    }

    errors
}
