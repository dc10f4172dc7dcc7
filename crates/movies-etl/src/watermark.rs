//! High-water mark bookkeeping in `etl_metadata`
//!
//! One row per cursor key. Reads fall back to the smallest value of the
//! cursor's type; writes are upserts executed on the caller's connection,
//! which during a load is the pipeline transaction.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use sqlx::PgConnection;
use thiserror::Error;
use tracing::debug;

use crate::models::CleanedMovie;

const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Error, Debug)]
pub enum WatermarkError {
    #[error("Watermark query failed: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Stored watermark '{value}' for key '{key}' is not a valid cursor")]
    Corrupt { key: &'static str, value: String },
}

/// Which column decides whether a row is new
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CursorKind {
    /// `date_published`, stored under `last_date`
    #[default]
    PublishedDate,
    /// `year`, stored under `last_year`
    Year,
}

impl CursorKind {
    /// Row key in `etl_metadata`
    pub fn key(self) -> &'static str {
        match self {
            CursorKind::PublishedDate => "last_date",
            CursorKind::Year => "last_year",
        }
    }

    /// Value used before the first successful load
    pub fn initial(self) -> CursorValue {
        match self {
            CursorKind::PublishedDate => CursorValue::Date(NaiveDate::MIN),
            CursorKind::Year => CursorValue::Year(0),
        }
    }

    /// Cursor value of a row, `None` when the row has no such value
    pub fn of(self, row: &CleanedMovie) -> Option<CursorValue> {
        match self {
            CursorKind::PublishedDate => row.date_published.map(CursorValue::Date),
            CursorKind::Year => row.year.map(CursorValue::Year),
        }
    }

    pub fn parse_stored(self, value: &str) -> Result<CursorValue, WatermarkError> {
        let corrupt = || WatermarkError::Corrupt {
            key: self.key(),
            value: value.to_string(),
        };

        match self {
            CursorKind::PublishedDate => NaiveDate::parse_from_str(value.trim(), DATE_FORMAT)
                .map(CursorValue::Date)
                .map_err(|_| corrupt()),
            CursorKind::Year => value
                .trim()
                .parse::<i32>()
                .map(CursorValue::Year)
                .map_err(|_| corrupt()),
        }
    }
}

impl std::str::FromStr for CursorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "date" | "published_date" | "date_published" | "last_date" => Ok(CursorKind::PublishedDate),
            "year" | "last_year" => Ok(CursorKind::Year),
            other => Err(format!("unknown cursor '{}', expected 'date' or 'year'", other)),
        }
    }
}

impl std::fmt::Display for CursorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CursorKind::PublishedDate => write!(f, "date"),
            CursorKind::Year => write!(f, "year"),
        }
    }
}

/// A cursor position; only values of the same kind are compared
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CursorValue {
    Date(NaiveDate),
    Year(i32),
}

impl CursorValue {
    pub fn kind(&self) -> CursorKind {
        match self {
            CursorValue::Date(_) => CursorKind::PublishedDate,
            CursorValue::Year(_) => CursorKind::Year,
        }
    }

    /// Text form written to `etl_metadata.value`
    pub fn to_stored(&self) -> String {
        match self {
            CursorValue::Date(date) => date.format(DATE_FORMAT).to_string(),
            CursorValue::Year(year) => year.to_string(),
        }
    }

    pub fn year(&self) -> i32 {
        match self {
            CursorValue::Date(date) => date.year(),
            CursorValue::Year(year) => *year,
        }
    }
}

impl std::fmt::Display for CursorValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_stored())
    }
}

/// Reads and writes the watermark row of one cursor kind
#[derive(Debug, Clone, Copy)]
pub struct WatermarkStore {
    kind: CursorKind,
}

impl WatermarkStore {
    pub fn new(kind: CursorKind) -> Self {
        Self { kind }
    }

    pub fn kind(&self) -> CursorKind {
        self.kind
    }

    /// Stored watermark, if a load has ever committed one
    pub async fn get(&self, conn: &mut PgConnection) -> Result<Option<CursorValue>, WatermarkError> {
        let stored = sqlx::query_scalar::<_, String>("SELECT value FROM etl_metadata WHERE key = $1")
            .bind(self.kind.key())
            .fetch_optional(&mut *conn)
            .await?;

        stored.map(|value| self.kind.parse_stored(&value)).transpose()
    }

    /// Stored watermark, or the cursor's initial value
    pub async fn read(&self, conn: &mut PgConnection) -> Result<CursorValue, WatermarkError> {
        let value = self.get(conn).await?.unwrap_or_else(|| self.kind.initial());
        debug!(key = self.kind.key(), watermark = %value, "Read watermark");
        Ok(value)
    }

    /// Insert or update the watermark row
    pub async fn write(&self, conn: &mut PgConnection, value: CursorValue) -> Result<(), WatermarkError> {
        debug_assert_eq!(value.kind(), self.kind);

        sqlx::query(
            r#"
            INSERT INTO etl_metadata (key, value, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (key)
            DO UPDATE SET value = EXCLUDED.value, updated_at = NOW()
            "#,
        )
        .bind(self.kind.key())
        .bind(value.to_stored())
        .execute(&mut *conn)
        .await?;

        debug!(key = self.kind.key(), watermark = %value, "Advanced watermark");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::models::fixtures::cleaned;
    use sqlx::PgPool;

    #[test]
    fn test_cursor_kind_parsing() {
        assert_eq!("date".parse::<CursorKind>().unwrap(), CursorKind::PublishedDate);
        assert_eq!("YEAR".parse::<CursorKind>().unwrap(), CursorKind::Year);
        assert!("month".parse::<CursorKind>().is_err());
        assert_eq!(CursorKind::PublishedDate.key(), "last_date");
        assert_eq!(CursorKind::Year.key(), "last_year");
    }

    #[test]
    fn test_cursor_of_row() {
        let row = cleaned("tt1", 1994, Some("1994-07-06"));
        assert_eq!(
            CursorKind::PublishedDate.of(&row),
            Some(CursorValue::Date(NaiveDate::from_ymd_opt(1994, 7, 6).unwrap()))
        );
        assert_eq!(CursorKind::Year.of(&row), Some(CursorValue::Year(1994)));

        let undated = cleaned("tt2", 1994, None);
        assert_eq!(CursorKind::PublishedDate.of(&undated), None);
    }

    #[test]
    fn test_stored_form() {
        let date = CursorValue::Date(NaiveDate::from_ymd_opt(2019, 12, 25).unwrap());
        assert_eq!(date.to_stored(), "2019-12-25");
        assert_eq!(CursorKind::PublishedDate.parse_stored("2019-12-25").unwrap(), date);
        assert_eq!(CursorKind::Year.parse_stored(" 2019 ").unwrap(), CursorValue::Year(2019));

        let err = CursorKind::Year.parse_stored("2019-12-25").unwrap_err();
        assert!(matches!(err, WatermarkError::Corrupt { key: "last_year", .. }));
    }

    #[test]
    fn test_initial_values_are_minimal() {
        let earliest = CursorKind::PublishedDate.initial();
        let any_date = CursorValue::Date(NaiveDate::from_ymd_opt(1, 1, 1).unwrap());
        assert!(any_date > earliest);
        assert_eq!(CursorKind::Year.initial(), CursorValue::Year(0));
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_read_defaults_then_upserts(pool: PgPool) -> sqlx::Result<()> {
        let store = WatermarkStore::new(CursorKind::Year);
        let mut conn = pool.acquire().await?;

        assert_eq!(store.read(&mut conn).await.unwrap(), CursorValue::Year(0));
        assert_eq!(store.get(&mut conn).await.unwrap(), None);

        store.write(&mut conn, CursorValue::Year(1999)).await.unwrap();
        store.write(&mut conn, CursorValue::Year(2005)).await.unwrap();
        assert_eq!(store.read(&mut conn).await.unwrap(), CursorValue::Year(2005));

        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM etl_metadata WHERE key = 'last_year'")
            .fetch_one(&mut *conn)
            .await?;
        assert_eq!(rows, 1);

        // Other keys are untouched
        let date_store = WatermarkStore::new(CursorKind::PublishedDate);
        assert_eq!(date_store.get(&mut conn).await.unwrap(), None);
        Ok(())
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_corrupt_value_is_an_error(pool: PgPool) -> sqlx::Result<()> {
        sqlx::query("INSERT INTO etl_metadata (key, value) VALUES ('last_date', 'yesterday')")
            .execute(&pool)
            .await?;

        let mut conn = pool.acquire().await?;
        let err = WatermarkStore::new(CursorKind::PublishedDate)
            .read(&mut conn)
            .await
            .unwrap_err();
        assert!(matches!(err, WatermarkError::Corrupt { .. }));
        Ok(())
    }
}
