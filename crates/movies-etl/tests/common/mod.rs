//! Shared fixtures for pipeline integration tests
//!
//! Database tests use `#[sqlx::test]`, which creates a fresh database per
//! test from `DATABASE_URL` and applies `migrations/`.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use movies_etl::config::EtlConfig;
use movies_etl::notify::{Alert, AlertCategory, Notifier, NotifyError};
use movies_etl::watermark::CursorKind;
use sqlx::PgPool;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub const HEADER: &str = "imdb_title_id,title,original_title,year,date_published,genre,duration,country,language,director,writer,production_company,actors,description,avg_vote,votes,budget,usa_gross_income,worlwide_gross_income,metascore,reviews_from_users,reviews_from_critics";

pub const SHAWSHANK: &str = "tt0111161,The Shawshank Redemption,The Shawshank Redemption,1994,1994-10-14,Drama,142,USA,English,Frank Darabont,\"Stephen King, Frank Darabont\",Castle Rock Entertainment,\"Tim Robbins, Morgan Freeman\",Two imprisoned men bond over a number of years.,9.3,2278845,$ 25000000,$ 28699976,$ 28817291,80.0,8232.0,164.0";

pub const GODFATHER: &str = "tt0068646,The Godfather,The Godfather,1972,1972-03-24,\"Crime, Drama\",175,USA,\"English, Italian, Latin\",Francis Ford Coppola,\"Mario Puzo, Francis Ford Coppola\",Paramount Pictures,\"Marlon Brando, Al Pacino\",,9.2,1572674,$ 6000000,$ 134966411,$ 246120986,100.0,3826.0,";

/// No `year`, backfilled from the publish date
pub const FORREST_GUMP: &str = "tt0109830,Forrest Gump,Forrest Gump,,1994-07-06,\"Drama, Romance\",142,USA,English,Robert Zemeckis,Eric Roth,Paramount Pictures,\"Tom Hanks, Robin Wright\",,8.8,1755490,$ 55000000,$ 330252182,$ 678226465,82.0,2086.0,186.0";

pub const MEMENTO: &str = "tt0209144,Memento,Memento,2000,2001-05-25,\"Mystery, Thriller\",113,USA,English,Christopher Nolan,Christopher Nolan,Summit Entertainment,\"Guy Pearce, Carrie-Anne Moss\",,8.4,1105193,$ 9000000,$ 25544867,$ 39723096,80.0,2379.0,270.0";

/// Average vote outside [0, 10]
pub const BAD_VOTE: &str = "tt9999999,Broken,Broken,2010,2010-01-01,Drama,90,USA,English,Nobody,Nobody,Nowhere,Nobody,,11.0,10,,,,,,";

/// Neither `year` nor a publish date
pub const NO_YEAR: &str = "tt8888888,Undated,Undated,,,Drama,90,USA,English,Nobody,Nobody,Nowhere,Nobody,,5.0,10,,,,,,";

/// Writes `rows` under the standard header
pub fn write_source(dir: &Path, rows: &[&str]) -> PathBuf {
    let path = dir.join("imdb_movies_final.csv");
    let mut body = String::from(HEADER);
    for row in rows {
        body.push('\n');
        body.push_str(row);
    }
    body.push('\n');
    std::fs::write(&path, body).unwrap();
    path
}

pub fn config(source: PathBuf, staging: Option<PathBuf>, cursor: CursorKind) -> EtlConfig {
    EtlConfig {
        source_path: source,
        staging_dir: staging,
        cursor,
        pipeline_name: "movies_etl_test".to_string(),
        insert_chunk_size: 2,
        ..Default::default()
    }
}

/// Keeps every alert it is sent
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    alerts: Arc<Mutex<Vec<Alert>>>,
}

impl RecordingNotifier {
    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.lock().unwrap().clone()
    }

    pub fn categories(&self) -> Vec<AlertCategory> {
        self.alerts().iter().map(|a| a.category).collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_alert(&self, alert: &Alert) -> Result<(), NotifyError> {
        self.alerts.lock().unwrap().push(alert.clone());
        Ok(())
    }
}

/// Always fails delivery
pub struct FailingNotifier;

#[async_trait]
impl Notifier for FailingNotifier {
    async fn send_alert(&self, _alert: &Alert) -> Result<(), NotifyError> {
        Err(NotifyError::Rejected { status: 500 })
    }
}

pub async fn count(pool: &PgPool, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
        .fetch_one(pool)
        .await
        .unwrap()
}

pub async fn stored_watermark(pool: &PgPool, key: &str) -> Option<String> {
    sqlx::query_scalar("SELECT value FROM etl_metadata WHERE key = $1")
        .bind(key)
        .fetch_optional(pool)
        .await
        .unwrap()
}
