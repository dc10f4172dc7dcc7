//! Pipeline orchestration
//!
//! A run moves through `Extracting → Transforming → Validating → Loading`
//! and ends `Committed` or `Failed`. Validation errors are a soft stop that
//! returns the run to `Idle` without an error. One database transaction
//! spans the whole run: it holds the single-flight lock from the start and
//! carries the watermark read, the inserts and the watermark write, so any
//! failure leaves the store untouched.

pub mod report;
pub mod state;

use sqlx::{PgPool, Postgres, Transaction};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::EtlConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::extract::extract_movies;
use crate::load::IncrementalLoader;
use crate::models::{RawMovie, TransformedTables};
use crate::notify::{Alert, Notifier};
use crate::transform::{csv_to_json, json_to_csv, transform_movies, TransformError, Transformer};
use crate::validate::validate_movies;
use crate::watermark::CursorKind;

pub use report::{PhaseTiming, RunReport};
pub use state::PipelineState;

/// JSON Lines copy of the source, relative to the staging directory
pub const RAW_JSON_LINES: &str = "raw/movies.jsonl";

/// CSV rebuilt from the JSON Lines copy, relative to the staging directory
pub const RAW_CSV_ROUND_TRIP: &str = "raw/movies_back.csv";

/// How a run that did not error ended
#[derive(Debug, Clone)]
pub enum PipelineOutcome {
    /// The delta (possibly empty) was loaded and committed
    Committed(RunReport),
    /// Validation rejected the batch; nothing was written
    ValidationFailed { errors: Vec<String>, report: RunReport },
}

impl PipelineOutcome {
    pub fn report(&self) -> &RunReport {
        match self {
            PipelineOutcome::Committed(report) => report,
            PipelineOutcome::ValidationFailed { report, .. } => report,
        }
    }
}

/// Incremental movie ETL pipeline
pub struct Pipeline {
    config: EtlConfig,
    pool: PgPool,
    notifier: Arc<dyn Notifier>,
}

impl Pipeline {
    pub fn new(config: EtlConfig, pool: PgPool, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            config,
            pool,
            notifier,
        }
    }

    pub fn config(&self) -> &EtlConfig {
        &self.config
    }

    /// Run the pipeline in the background. Failures are logged, not returned.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            match self.run().await {
                Ok(outcome) => info!(summary = %outcome.report().summary(), "Background pipeline run finished"),
                Err(e) => error!(error = %e, "Background pipeline run failed"),
            }
        })
    }

    /// Execute one full run
    pub async fn run(&self) -> PipelineResult<PipelineOutcome> {
        let name = self.config.pipeline_name.as_str();
        let mut tracker = RunTracker::new(name, self.config.cursor);

        info!(
            pipeline = name,
            source = %self.config.source_path.display(),
            cursor = %self.config.cursor,
            "Pipeline run started"
        );

        tracker.enter(PipelineState::Extracting);

        let mut tx = match self.pool.begin().await {
            Ok(tx) => tx,
            Err(e) => return self.fail(None, tracker, e.into()).await,
        };

        let locked = sqlx::query_scalar::<_, bool>("SELECT pg_try_advisory_xact_lock(hashtext($1))")
            .bind(name)
            .fetch_one(&mut *tx)
            .await;
        match locked {
            Ok(true) => {},
            Ok(false) => {
                warn!(pipeline = name, "Another run holds the pipeline lock, skipping");
                drop(tx);
                tracker.finish();
                return Err(PipelineError::AlreadyRunning(name.to_string()));
            },
            Err(e) => return self.fail(Some(tx), tracker, e.into()).await,
        }

        let raw = match self.extract(&mut tracker) {
            Ok(raw) => raw,
            Err(e) => return self.fail(Some(tx), tracker, e).await,
        };

        tracker.enter(PipelineState::Transforming);
        let tables = match self.transform(&raw) {
            Ok(tables) => tables,
            Err(e) => return self.fail(Some(tx), tracker, e.into()).await,
        };
        tracker.report.rows_cleaned = tables.len();
        tracker.records = tables.len();

        tracker.enter(PipelineState::Validating);
        let errors = validate_movies(&tables.full);
        tracker.records = tables.len();

        if !errors.is_empty() {
            rollback(name, tx).await;
            warn!(pipeline = name, errors = ?errors, "Validation failed, batch not loaded");

            tracker.report.validation_errors = errors.clone();
            tracker.enter(PipelineState::Idle);
            self.alert(Alert::validation_errors(name, &errors, &self.config.alerts.recipient))
                .await;

            return Ok(PipelineOutcome::ValidationFailed {
                errors,
                report: tracker.finish(),
            });
        }

        tracker.enter(PipelineState::Loading);
        let loader = IncrementalLoader::new(self.config.cursor).with_chunk_size(self.config.insert_chunk_size);
        let loaded = match loader.load(&tables, &mut *tx).await {
            Ok(loaded) => loaded,
            Err(e) => return self.fail(Some(tx), tracker, e.into()).await,
        };

        if let Err(e) = tx.commit().await {
            return self.fail(None, tracker, e.into()).await;
        }

        tracker.records = loaded.rows_loaded;
        tracker.report.rows_loaded = loaded.rows_loaded;
        tracker.report.previous_watermark = Some(loaded.previous_watermark);
        tracker.report.new_watermark = loaded.new_watermark.or(Some(loaded.previous_watermark));
        tracker.enter(PipelineState::Committed);

        Ok(PipelineOutcome::Committed(tracker.finish()))
    }

    fn extract(&self, tracker: &mut RunTracker) -> PipelineResult<Vec<RawMovie>> {
        let source = &self.config.source_path;
        let raw = extract_movies(source)?;

        match movies_common::checksum::file_sha256(source) {
            Ok(sha256) => tracker.report.source_sha256 = Some(sha256),
            Err(e) => warn!(source = %source.display(), error = %e, "Could not fingerprint source file"),
        }

        tracker.report.rows_extracted = raw.len();
        tracker.records = raw.len();
        Ok(raw)
    }

    fn transform(&self, raw: &[RawMovie]) -> Result<TransformedTables, TransformError> {
        let Some(staging) = self.config.staging_dir.as_deref() else {
            return Transformer::new().clean(raw);
        };

        let json_path = staging.join(RAW_JSON_LINES);
        let csv_path = staging.join(RAW_CSV_ROUND_TRIP);
        csv_to_json(&self.config.source_path, &json_path)?;
        json_to_csv(&json_path, &csv_path)?;
        debug!(staging = %staging.display(), "Staging artifacts written");

        Transformer::with_staging_dir(staging).clean(raw)
    }

    /// Roll back, raise the alert and hand the error back
    async fn fail(
        &self,
        tx: Option<Transaction<'static, Postgres>>,
        mut tracker: RunTracker,
        error: PipelineError,
    ) -> PipelineResult<PipelineOutcome> {
        let name = self.config.pipeline_name.as_str();
        let phase = tracker.report.state;

        if let Some(tx) = tx {
            rollback(name, tx).await;
        }

        tracker.enter(PipelineState::Failed);
        error!(pipeline = name, phase = %phase, error = %error, "Pipeline run failed");

        let recipient = &self.config.alerts.recipient;
        let alert = match &error {
            PipelineError::DataFileMissing(path) => Alert::data_file_missing(name, path, recipient),
            other => Alert::pipeline_failure(name, phase.as_str(), &other.to_string(), recipient),
        };
        self.alert(alert).await;

        tracker.finish();
        Err(error)
    }

    async fn alert(&self, alert: Alert) {
        if let Err(e) = self.notifier.send_alert(&alert).await {
            warn!(category = %alert.category, error = %e, "Failed to deliver alert");
        }
    }
}

/// A failed rollback is only logged; the server discards the transaction
/// when the connection drops.
async fn rollback(pipeline: &str, tx: Transaction<'static, Postgres>) {
    if let Err(e) = tx.rollback().await {
        warn!(pipeline, error = %e, "Rollback failed");
    }
}

/// Spawn a fire-and-forget run
pub fn spawn_pipeline(pipeline: Pipeline) -> JoinHandle<()> {
    pipeline.spawn()
}

/// Extract, transform and validate a source file without touching the
/// database. Returns the validation errors, empty when the file is loadable.
pub fn check_source(path: &Path) -> PipelineResult<Vec<String>> {
    let raw = extract_movies(path)?;
    let tables = transform_movies(&raw)?;
    Ok(validate_movies(&tables.full))
}

/// Tracks state, phase timings and lifecycle events of one run
struct RunTracker {
    report: RunReport,
    run_started: Instant,
    phase_started: Instant,
    /// Records handled by the current phase
    records: usize,
}

impl RunTracker {
    fn new(pipeline: &str, cursor: CursorKind) -> Self {
        let now = Instant::now();
        Self {
            report: RunReport::new(pipeline, cursor),
            run_started: now,
            phase_started: now,
            records: 0,
        }
    }

    fn enter(&mut self, next: PipelineState) {
        let previous = self.report.state;
        if !previous.can_transition_to(next) {
            error!(from = %previous, to = %next, "Unexpected pipeline state transition");
        }

        if previous.is_phase() {
            let elapsed = self.phase_started.elapsed();
            self.report.record_phase(previous, elapsed, self.records);
            info!(
                pipeline = %self.report.pipeline,
                phase = %previous,
                duration_ms = elapsed.as_millis() as u64,
                records = self.records,
                "Phase finished"
            );
        }

        info!(pipeline = %self.report.pipeline, from = %previous, state = %next, "Pipeline state changed");

        self.report.state = next;
        self.phase_started = Instant::now();
        self.records = 0;
    }

    fn finish(mut self) -> RunReport {
        self.report.total = self.run_started.elapsed();

        let breakdown = self
            .report
            .phase_breakdown()
            .iter()
            .map(|(phase, share)| format!("{} {:.1}%", phase, share))
            .collect::<Vec<_>>()
            .join(", ");

        info!(
            pipeline = %self.report.pipeline,
            state = %self.report.state,
            total_ms = self.report.total.as_millis() as u64,
            breakdown = %breakdown,
            summary = %self.report.summary(),
            "Pipeline run finished"
        );

        self.report
    }
}
