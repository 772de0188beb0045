//! JSON session exporter.
//!
//! Collects published snapshots and scenario events from a run so they can
//! be replayed or charted outside the simulator.

use crate::model::{Alarm, Severity, Snapshot, StageStatus, Volatility};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use uuid::Uuid;

/// A scenario applied during the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEvent {
    pub tick: u64,
    pub scenario: String,
    pub message: String,
    pub severity: Severity,
}

/// Aggregates computed over every recorded frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    /// Tick of the last recorded frame
    pub final_tick: u64,

    /// How many frames carried each overall status
    pub overall_counts: BTreeMap<StageStatus, u64>,

    /// Worst overall status seen
    pub worst_overall: StageStatus,

    /// Distinct alarms observed, by severity
    pub alarms_by_severity: BTreeMap<Severity, u64>,

    /// Readiness coverage in the last frame
    pub final_coverage_pct: f64,
}

/// Complete session export.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionExport {
    /// Seed used
    pub seed: u64,

    /// Volatility at the start of the run
    pub volatility: Volatility,

    /// Ticks advanced
    pub ticks: u64,

    /// Recorded frames
    pub frames: Vec<Snapshot>,

    /// Scenarios applied
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub events: Vec<SessionEvent>,

    pub summary: SessionSummary,
}

impl SessionExport {
    /// Creates a new export container.
    pub fn new(seed: u64, volatility: Volatility) -> Self {
        Self {
            seed,
            volatility,
            ticks: 0,
            frames: Vec::new(),
            events: Vec::new(),
            summary: SessionSummary::default(),
        }
    }

    /// Adds a frame.
    pub fn add_frame(&mut self, snapshot: &Snapshot) {
        self.ticks = snapshot.tick;
        self.frames.push(snapshot.clone());
    }

    /// Records the summary alarm of an applied scenario.
    pub fn add_event(&mut self, tick: u64, scenario: &str, alarm: &Alarm) {
        self.events.push(SessionEvent {
            tick,
            scenario: scenario.to_string(),
            message: alarm.message.clone(),
            severity: alarm.severity,
        });
    }

    /// Recomputes the summary from the recorded frames.
    pub fn finalize(&mut self) {
        let mut summary = SessionSummary::default();
        let mut seen: BTreeSet<Uuid> = BTreeSet::new();

        for frame in &self.frames {
            *summary.overall_counts.entry(frame.overall_status).or_insert(0) += 1;
            summary.worst_overall = summary.worst_overall.max(frame.overall_status);

            for alarm in &frame.alarms {
                if seen.insert(alarm.id) {
                    *summary.alarms_by_severity.entry(alarm.severity).or_insert(0) += 1;
                }
            }
        }

        if let Some(last) = self.frames.last() {
            summary.final_tick = last.tick;
            summary.final_coverage_pct = last.readiness.coverage_pct;
        }

        self.summary = summary;
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}
