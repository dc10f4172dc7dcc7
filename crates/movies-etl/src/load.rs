//! Incremental loading of the cleaned tables
//!
//! Only rows whose cursor is strictly newer than the stored watermark are
//! inserted. All statements run on the connection handed in by the caller,
//! so the inserts and the watermark advance commit or roll back together.

use sqlx::types::Json;
use sqlx::{PgConnection, Postgres, QueryBuilder};
use std::collections::HashSet;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::models::{MovieInfo, ProductionInfo, RatingInfo, TransformedTables};
use crate::watermark::{CursorKind, CursorValue, WatermarkError, WatermarkStore};

/// Default rows per multi-row INSERT
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// Largest chunk that keeps the widest table under the Postgres bind limit
pub const MAX_CHUNK_SIZE: usize = u16::MAX as usize / 7;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error(transparent)]
    Watermark(#[from] WatermarkError),

    #[error("Insert into {table} failed: {source}")]
    Insert {
        table: &'static str,
        #[source]
        source: sqlx::Error,
    },
}

/// What a load did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadResult {
    pub rows_loaded: usize,
    pub previous_watermark: CursorValue,
    /// `None` when nothing was loaded and the watermark stayed put
    pub new_watermark: Option<CursorValue>,
    /// Rows skipped because they have no cursor value
    pub rows_without_cursor: usize,
}

/// Rows of each table selected for insertion
#[derive(Debug, Default)]
pub struct Delta<'a> {
    pub movie_info: Vec<&'a MovieInfo>,
    pub production_info: Vec<&'a ProductionInfo>,
    pub rating_info: Vec<&'a RatingInfo>,
    /// `Some` exactly when the delta is non-empty
    pub max_cursor: Option<CursorValue>,
    pub rows_without_cursor: usize,
}

impl Delta<'_> {
    pub fn len(&self) -> usize {
        self.movie_info.len()
    }

    pub fn is_empty(&self) -> bool {
        self.movie_info.is_empty()
    }
}

/// Rows of `tables` whose cursor is strictly greater than `watermark`
pub fn select_delta(tables: &TransformedTables, cursor: CursorKind, watermark: CursorValue) -> Delta<'_> {
    let mut ids = HashSet::new();
    let mut max_cursor: Option<CursorValue> = None;
    let mut rows_without_cursor = 0;

    for row in &tables.full {
        match cursor.of(row) {
            Some(value) if value > watermark => {
                ids.insert(row.imdb_title_id.as_str());
                max_cursor = max_cursor.max(Some(value));
            },
            Some(_) => {},
            None => rows_without_cursor += 1,
        }
    }

    Delta {
        movie_info: tables
            .movie_info
            .iter()
            .filter(|r| ids.contains(r.imdb_title_id.as_str()))
            .collect(),
        production_info: tables
            .production_info
            .iter()
            .filter(|r| ids.contains(r.imdb_title_id.as_str()))
            .collect(),
        rating_info: tables
            .rating_info
            .iter()
            .filter(|r| ids.contains(r.imdb_title_id.as_str()))
            .collect(),
        max_cursor,
        rows_without_cursor,
    }
}

/// Watermark-driven loader for the three movie tables
#[derive(Debug, Clone)]
pub struct IncrementalLoader {
    store: WatermarkStore,
    chunk_size: usize,
}

impl IncrementalLoader {
    pub fn new(cursor: CursorKind) -> Self {
        Self {
            store: WatermarkStore::new(cursor),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.clamp(1, MAX_CHUNK_SIZE);
        self
    }

    pub fn cursor(&self) -> CursorKind {
        self.store.kind()
    }

    /// Insert the new rows and advance the watermark, all on `conn`.
    ///
    /// `conn` is expected to be inside a transaction; on error the caller
    /// rolls it back.
    pub async fn load(&self, tables: &TransformedTables, conn: &mut PgConnection) -> Result<LoadResult, LoadError> {
        let cursor = self.store.kind();
        let previous_watermark = self.store.read(conn).await?;
        let delta = select_delta(tables, cursor, previous_watermark);

        if delta.rows_without_cursor > 0 {
            warn!(
                cursor = %cursor,
                rows = delta.rows_without_cursor,
                "Rows without a cursor value are never loaded"
            );
        }

        let Some(max_cursor) = delta.max_cursor else {
            info!(watermark = %previous_watermark, "No new rows since last load");
            return Ok(LoadResult {
                rows_loaded: 0,
                previous_watermark,
                new_watermark: None,
                rows_without_cursor: delta.rows_without_cursor,
            });
        };

        info!(
            rows = delta.len(),
            watermark = %previous_watermark,
            "Loading new rows"
        );

        self.insert_movie_info(conn, &delta.movie_info).await?;
        self.insert_production_info(conn, &delta.production_info).await?;
        self.insert_rating_info(conn, &delta.rating_info).await?;

        self.store.write(conn, max_cursor).await?;

        info!(
            rows = delta.len(),
            previous = %previous_watermark,
            current = %max_cursor,
            "Load completed"
        );

        Ok(LoadResult {
            rows_loaded: delta.len(),
            previous_watermark,
            new_watermark: Some(max_cursor),
            rows_without_cursor: delta.rows_without_cursor,
        })
    }

    async fn insert_movie_info(&self, conn: &mut PgConnection, rows: &[&MovieInfo]) -> Result<(), LoadError> {
        for chunk in rows.chunks(self.chunk_size) {
            let mut query_builder: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO movie_info (imdb_title_id, title, year, duration, description) ",
            );

            query_builder.push_values(chunk, |mut b, row| {
                b.push_bind(&row.imdb_title_id)
                    .push_bind(&row.title)
                    .push_bind(row.year)
                    .push_bind(row.duration)
                    .push_bind(&row.description);
            });

            query_builder
                .build()
                .execute(&mut *conn)
                .await
                .map_err(|source| LoadError::Insert {
                    table: "movie_info",
                    source,
                })?;
        }

        debug!(table = "movie_info", rows = rows.len(), "Inserted rows");
        Ok(())
    }

    async fn insert_production_info(&self, conn: &mut PgConnection, rows: &[&ProductionInfo]) -> Result<(), LoadError> {
        for chunk in rows.chunks(self.chunk_size) {
            let mut query_builder: QueryBuilder<Postgres> = QueryBuilder::new(
                r#"
                INSERT INTO production_info (
                    imdb_title_id, director, writer, production_company,
                    actors, country, language
                )
                "#,
            );

            query_builder.push_values(chunk, |mut b, row| {
                b.push_bind(&row.imdb_title_id)
                    .push_bind(Json(&row.director))
                    .push_bind(Json(&row.writer))
                    .push_bind(&row.production_company)
                    .push_bind(Json(&row.actors))
                    .push_bind(Json(&row.country))
                    .push_bind(Json(&row.language));
            });

            query_builder
                .build()
                .execute(&mut *conn)
                .await
                .map_err(|source| LoadError::Insert {
                    table: "production_info",
                    source,
                })?;
        }

        debug!(table = "production_info", rows = rows.len(), "Inserted rows");
        Ok(())
    }

    async fn insert_rating_info(&self, conn: &mut PgConnection, rows: &[&RatingInfo]) -> Result<(), LoadError> {
        for chunk in rows.chunks(self.chunk_size) {
            let mut query_builder: QueryBuilder<Postgres> = QueryBuilder::new(
                r#"
                INSERT INTO rating_info (
                    imdb_title_id, avg_vote, votes, reviews_from_users, reviews_from_critics
                )
                "#,
            );

            query_builder.push_values(chunk, |mut b, row| {
                b.push_bind(&row.imdb_title_id)
                    .push_bind(row.avg_vote)
                    .push_bind(row.votes)
                    .push_bind(row.reviews_from_users)
                    .push_bind(row.reviews_from_critics);
            });

            query_builder
                .build()
                .execute(&mut *conn)
                .await
                .map_err(|source| LoadError::Insert {
                    table: "rating_info",
                    source,
                })?;
        }

        debug!(table = "rating_info", rows = rows.len(), "Inserted rows");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::models::fixtures::cleaned;
    use chrono::NaiveDate;
    use sqlx::PgPool;

    fn tables() -> TransformedTables {
        TransformedTables::from_full(vec![
            cleaned("tt0111161", 1994, Some("1994-10-14")),
            cleaned("tt0068646", 1972, Some("1972-03-24")),
            cleaned("tt0000001", 1894, None),
        ])
    }

    async fn count(pool: &PgPool, table: &str) -> i64 {
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(pool)
            .await
            .unwrap()
    }

    #[test]
    fn test_select_delta_is_strictly_greater() {
        let tables = tables();
        let watermark = CursorValue::Date(NaiveDate::from_ymd_opt(1972, 3, 24).unwrap());

        let delta = select_delta(&tables, CursorKind::PublishedDate, watermark);
        assert_eq!(delta.len(), 1);
        assert_eq!(delta.movie_info[0].imdb_title_id, "tt0111161");
        assert_eq!(delta.production_info.len(), 1);
        assert_eq!(delta.rating_info.len(), 1);
        assert_eq!(delta.rows_without_cursor, 1);
        assert_eq!(
            delta.max_cursor,
            Some(CursorValue::Date(NaiveDate::from_ymd_opt(1994, 10, 14).unwrap()))
        );
    }

    #[test]
    fn test_select_delta_by_year() {
        let tables = TransformedTables::from_full(vec![
            cleaned("tt1", 2000, None),
            cleaned("tt2", 2001, None),
        ]);

        let delta = select_delta(&tables, CursorKind::Year, CursorValue::Year(2000));
        assert_eq!(delta.len(), 1);
        assert_eq!(delta.movie_info[0].imdb_title_id, "tt2");
        assert_eq!(delta.max_cursor, Some(CursorValue::Year(2001)));
        assert_eq!(delta.rows_without_cursor, 0);

        let empty = select_delta(&tables, CursorKind::Year, CursorValue::Year(2001));
        assert!(empty.is_empty());
        assert_eq!(empty.max_cursor, None);
    }

    #[test]
    fn test_chunk_size_is_clamped() {
        let loader = IncrementalLoader::new(CursorKind::Year).with_chunk_size(0);
        assert_eq!(loader.chunk_size, 1);
        let loader = IncrementalLoader::new(CursorKind::Year).with_chunk_size(usize::MAX);
        assert_eq!(loader.chunk_size, MAX_CHUNK_SIZE);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_second_load_is_a_no_op(pool: PgPool) -> sqlx::Result<()> {
        let loader = IncrementalLoader::new(CursorKind::PublishedDate).with_chunk_size(1);
        let tables = tables();

        let mut tx = pool.begin().await?;
        let first = loader.load(&tables, &mut *tx).await.unwrap();
        tx.commit().await?;

        assert_eq!(first.rows_loaded, 2);
        assert_eq!(first.previous_watermark, CursorKind::PublishedDate.initial());
        assert_eq!(first.rows_without_cursor, 1);
        assert_eq!(count(&pool, "movie_info").await, 2);
        assert_eq!(count(&pool, "production_info").await, 2);
        assert_eq!(count(&pool, "rating_info").await, 2);

        let mut tx = pool.begin().await?;
        let second = loader.load(&tables, &mut *tx).await.unwrap();
        tx.commit().await?;

        assert_eq!(second.rows_loaded, 0);
        assert_eq!(second.new_watermark, None);
        assert_eq!(Some(second.previous_watermark), first.new_watermark);
        assert_eq!(count(&pool, "movie_info").await, 2);

        let stored: String = sqlx::query_scalar("SELECT value FROM etl_metadata WHERE key = 'last_date'")
            .fetch_one(&pool)
            .await?;
        assert_eq!(stored, "1994-10-14");
        Ok(())
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_year_boundary_excludes_equal_rows(pool: PgPool) -> sqlx::Result<()> {
        sqlx::query("INSERT INTO etl_metadata (key, value) VALUES ('last_year', '2000')")
            .execute(&pool)
            .await?;

        let tables = TransformedTables::from_full(vec![
            cleaned("tt2000", 2000, None),
            cleaned("tt2001", 2001, None),
        ]);

        let mut tx = pool.begin().await?;
        let result = IncrementalLoader::new(CursorKind::Year)
            .load(&tables, &mut *tx)
            .await
            .unwrap();
        tx.commit().await?;

        assert_eq!(result.rows_loaded, 1);
        assert_eq!(result.new_watermark, Some(CursorValue::Year(2001)));

        let ids: Vec<String> = sqlx::query_scalar("SELECT imdb_title_id FROM movie_info")
            .fetch_all(&pool)
            .await?;
        assert_eq!(ids, vec!["tt2001".to_string()]);
        Ok(())
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_multi_values_stored_as_json_arrays(pool: PgPool) -> sqlx::Result<()> {
        let mut tx = pool.begin().await?;
        IncrementalLoader::new(CursorKind::Year)
            .load(&tables(), &mut *tx)
            .await
            .unwrap();
        tx.commit().await?;

        let actors: serde_json::Value =
            sqlx::query_scalar("SELECT actors FROM production_info WHERE imdb_title_id = 'tt0111161'")
                .fetch_one(&pool)
                .await?;
        assert_eq!(actors, serde_json::json!(["Actor One, Actor Two"]));
        Ok(())
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_failed_rating_insert_rolls_back_everything(pool: PgPool) -> sqlx::Result<()> {
        sqlx::query("ALTER TABLE rating_info ADD CONSTRAINT rating_votes_negative CHECK (votes < 0)")
            .execute(&pool)
            .await?;

        let mut tx = pool.begin().await?;
        let err = IncrementalLoader::new(CursorKind::PublishedDate)
            .load(&tables(), &mut *tx)
            .await
            .unwrap_err();
        tx.rollback().await?;

        assert!(matches!(err, LoadError::Insert { table: "rating_info", .. }));
        assert_eq!(count(&pool, "movie_info").await, 0);
        assert_eq!(count(&pool, "production_info").await, 0);
        assert_eq!(count(&pool, "etl_metadata").await, 0);
        Ok(())
    }
}
