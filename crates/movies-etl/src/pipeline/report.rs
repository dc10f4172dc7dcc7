//! Per-run timings and counts

use std::time::Duration;

use super::state::PipelineState;
use crate::watermark::{CursorKind, CursorValue};

/// Wall-clock time spent in one phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseTiming {
    pub phase: PipelineState,
    pub duration: Duration,
    /// Records the phase produced or processed
    pub records: usize,
}

/// Outcome summary of a single run
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub pipeline: String,
    pub cursor: CursorKind,
    pub state: PipelineState,
    pub phases: Vec<PhaseTiming>,
    pub total: Duration,
    /// SHA-256 of the source file, when it could be read
    pub source_sha256: Option<String>,
    pub rows_extracted: usize,
    pub rows_cleaned: usize,
    pub rows_loaded: usize,
    pub validation_errors: Vec<String>,
    pub previous_watermark: Option<CursorValue>,
    pub new_watermark: Option<CursorValue>,
}

impl RunReport {
    pub fn new(pipeline: impl Into<String>, cursor: CursorKind) -> Self {
        Self {
            pipeline: pipeline.into(),
            cursor,
            state: PipelineState::Idle,
            phases: Vec::new(),
            total: Duration::ZERO,
            source_sha256: None,
            rows_extracted: 0,
            rows_cleaned: 0,
            rows_loaded: 0,
            validation_errors: Vec::new(),
            previous_watermark: None,
            new_watermark: None,
        }
    }

    pub fn record_phase(&mut self, phase: PipelineState, duration: Duration, records: usize) {
        self.phases.push(PhaseTiming {
            phase,
            duration,
            records,
        });
    }

    pub fn phase(&self, phase: PipelineState) -> Option<&PhaseTiming> {
        self.phases.iter().find(|t| t.phase == phase)
    }

    /// Share of total wall-clock time per phase, in percent
    pub fn phase_breakdown(&self) -> Vec<(PipelineState, f64)> {
        let total = self.total.as_secs_f64();

        self.phases
            .iter()
            .map(|timing| {
                let share = if total > 0.0 {
                    timing.duration.as_secs_f64() / total * 100.0
                } else {
                    0.0
                };
                (timing.phase, share)
            })
            .collect()
    }

    pub fn is_success(&self) -> bool {
        self.state == PipelineState::Committed
    }

    pub fn summary(&self) -> String {
        match self.state {
            PipelineState::Committed if self.rows_loaded == 0 => format!(
                "{}: no new rows (watermark {}), {} rows checked in {:.2?}",
                self.pipeline,
                self.watermark_text(self.previous_watermark),
                self.rows_cleaned,
                self.total
            ),
            PipelineState::Committed => format!(
                "{}: loaded {} of {} rows, watermark {} -> {} in {:.2?}",
                self.pipeline,
                self.rows_loaded,
                self.rows_cleaned,
                self.watermark_text(self.previous_watermark),
                self.watermark_text(self.new_watermark),
                self.total
            ),
            _ if !self.validation_errors.is_empty() => format!(
                "{}: validation failed ({}), nothing loaded",
                self.pipeline,
                self.validation_errors.join("; ")
            ),
            state => format!("{}: stopped in state {}", self.pipeline, state),
        }
    }

    fn watermark_text(&self, value: Option<CursorValue>) -> String {
        value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn report() -> RunReport {
        let mut report = RunReport::new("movies", CursorKind::Year);
        report.record_phase(PipelineState::Extracting, Duration::from_millis(250), 10);
        report.record_phase(PipelineState::Transforming, Duration::from_millis(500), 10);
        report.record_phase(PipelineState::Validating, Duration::from_millis(50), 10);
        report.record_phase(PipelineState::Loading, Duration::from_millis(200), 4);
        report.total = Duration::from_millis(1000);
        report.rows_extracted = 10;
        report.rows_cleaned = 10;
        report
    }

    #[test]
    fn test_phase_breakdown_percentages() {
        let breakdown = report().phase_breakdown();
        assert_eq!(breakdown.len(), 4);
        assert_eq!(breakdown[0].0, PipelineState::Extracting);
        assert!((breakdown[0].1 - 25.0).abs() < 1e-9);
        assert!((breakdown[1].1 - 50.0).abs() < 1e-9);
        let sum: f64 = breakdown.iter().map(|(_, pct)| pct).sum();
        assert!((sum - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_total_gives_zero_shares() {
        let mut report = report();
        report.total = Duration::ZERO;
        assert!(report.phase_breakdown().iter().all(|(_, pct)| *pct == 0.0));
    }

    #[test]
    fn test_summaries() {
        let mut report = report();
        report.state = PipelineState::Committed;
        report.rows_loaded = 4;
        report.previous_watermark = Some(CursorValue::Year(1999));
        report.new_watermark = Some(CursorValue::Year(2004));
        assert!(report.summary().starts_with("movies: loaded 4 of 10 rows, watermark 1999 -> 2004"));
        assert!(report.is_success());

        report.rows_loaded = 0;
        assert!(report.summary().starts_with("movies: no new rows (watermark 1999)"));

        let mut failed = RunReport::new("movies", CursorKind::Year);
        failed.validation_errors = vec!["invalid vote range".to_string()];
        assert_eq!(failed.summary(), "movies: validation failed (invalid vote range), nothing loaded");
        assert!(!failed.is_success());
    }
}
