//! Headless and real-time session runners.

use crate::error::CliError;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use supplysim_core::{
    EngineHandle, ScenarioId, SessionExport, Snapshot, Stage, StageStatus, SupplyChainEngine,
    Volatility,
};
use supplysim_env::EntropySource;
use tracing::{debug, info, warn};

/// A scenario to apply once the session reaches `tick`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledEvent {
    pub tick: u64,
    pub scenario: ScenarioId,
}

impl FromStr for ScheduledEvent {
    type Err = CliError;

    /// Parses `<scenario>@<tick>`. A bare scenario name fires at tick 0.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, tick) = match s.split_once('@') {
            Some((name, tick)) => {
                let tick = tick
                    .trim()
                    .parse::<u64>()
                    .map_err(|_| CliError::BadEvent(s.to_string()))?;
                (name, tick)
            }
            None => (s, 0),
        };
        Ok(Self {
            tick,
            scenario: name.parse()?,
        })
    }
}

/// What to run.
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub ticks: u64,
    pub events: Vec<ScheduledEvent>,
    /// Record every n-th tick into the export
    pub frame_every: u64,
}

impl RunPlan {
    pub fn new(ticks: u64, mut events: Vec<ScheduledEvent>, frame_every: u64) -> Result<Self, CliError> {
        if frame_every == 0 {
            return Err(CliError::BadFrameInterval);
        }
        // Stable sort keeps command-line order for events on the same tick
        events.sort_by_key(|e| e.tick);
        for late in events.iter().filter(|e| e.tick > ticks) {
            warn!(scenario = %late.scenario, tick = late.tick, ticks, "Event scheduled past the last tick will not fire");
        }
        Ok(Self {
            ticks,
            events,
            frame_every,
        })
    }
}

/// Outcome of one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub seed: u64,
    pub volatility: Volatility,
    pub ticks: u64,
    pub overall_status: StageStatus,
    pub worst_overall: StageStatus,
    pub coverage_pct: f64,
    pub status_by_stage: BTreeMap<Stage, StageStatus>,
    pub alarms: usize,
    pub events_applied: Vec<String>,
}

impl RunReport {
    fn new(last: &Snapshot, worst_overall: StageStatus, events_applied: Vec<String>) -> Self {
        Self {
            seed: last.seed,
            volatility: last.volatility,
            ticks: last.tick,
            overall_status: last.overall_status,
            worst_overall: worst_overall.max(last.overall_status),
            coverage_pct: last.readiness.coverage_pct,
            status_by_stage: last.status_by_stage.clone(),
            alarms: last.alarms.len(),
            events_applied,
        }
    }
}

fn log_tick(snapshot: &Snapshot) {
    info!(
        "tick={:>4} | overall={:<7} | demand={:<7} procurement={:<7} logistics={:<7} inventory={:<7} | coverage={:.1}%",
        snapshot.tick,
        snapshot.overall_status,
        snapshot.demand.status,
        snapshot.procurement.status,
        snapshot.logistics.status,
        snapshot.inventory.status,
        snapshot.readiness.coverage_pct,
    );
}

fn record(export: &mut Option<&mut SessionExport>, snapshot: &Snapshot, plan: &RunPlan) {
    if let Some(export) = export.as_deref_mut() {
        if snapshot.tick % plan.frame_every == 0 || snapshot.tick == plan.ticks {
            export.add_frame(snapshot);
        }
    }
}

/// Ticks the engine synchronously, applying scheduled events on the way.
pub fn run_headless<R: EntropySource>(
    engine: &mut SupplyChainEngine<R>,
    plan: &RunPlan,
    mut export: Option<&mut SessionExport>,
) -> RunReport {
    engine.play();

    let mut pending = plan.events.iter().peekable();
    let mut applied = Vec::new();
    let mut worst = StageStatus::Ok;

    record(&mut export, &engine.snapshot(), plan);

    loop {
        let tick = engine.snapshot().tick;
        while let Some(event) = pending.next_if(|e| e.tick <= tick) {
            if let Some(alarm) = engine.simulate_event(event.scenario) {
                info!(tick, "{}", alarm.message);
                if let Some(export) = export.as_deref_mut() {
                    export.add_event(tick, event.scenario.name(), &alarm);
                }
                applied.push(event.scenario.name().to_string());
            }
        }

        let snapshot = engine.snapshot();
        worst = worst.max(snapshot.overall_status);
        if tick >= plan.ticks {
            break;
        }

        engine.tick();
        let snapshot = engine.snapshot();
        worst = worst.max(snapshot.overall_status);
        if snapshot.tick % 10 == 0 {
            log_tick(&snapshot);
        } else {
            debug!(tick = snapshot.tick, overall = %snapshot.overall_status, "Tick");
        }
        record(&mut export, &snapshot, plan);
    }

    RunReport::new(&engine.snapshot(), worst, applied)
}

/// Drives the engine on its timer until `plan.ticks` is reached.
///
/// The handle's engine is disposed on return.
pub async fn run_realtime(
    handle: EngineHandle,
    plan: &RunPlan,
    mut export: Option<&mut SessionExport>,
) -> Result<RunReport, CliError> {
    handle.play().await?;
    let (subscription, mut rx) = handle.subscribe_stream().await?;

    let mut pending = plan.events.iter().peekable();
    let mut applied = Vec::new();
    let mut worst = StageStatus::Ok;
    let mut last_logged = None;

    while let Some(snapshot) = rx.recv().await {
        worst = worst.max(snapshot.overall_status);
        if last_logged != Some(snapshot.tick) {
            log_tick(&snapshot);
            last_logged = Some(snapshot.tick);
        }
        record(&mut export, &snapshot, plan);

        while let Some(event) = pending.next_if(|e| e.tick <= snapshot.tick) {
            if let Some(alarm) = handle.simulate_event(event.scenario).await? {
                info!(tick = snapshot.tick, "{}", alarm.message);
                if let Some(export) = export.as_deref_mut() {
                    export.add_event(snapshot.tick, event.scenario.name(), &alarm);
                }
                applied.push(event.scenario.name().to_string());
            }
        }

        if snapshot.tick >= plan.ticks {
            break;
        }
    }

    subscription.unsubscribe().await;
    let last = handle.snapshot().await?;
    handle.dispose().await?;

    Ok(RunReport::new(&last, worst, applied))
}

/// Finalizes and writes an export.
pub fn write_export(export: &mut SessionExport, path: &Path) -> Result<(), CliError> {
    export.finalize();
    export.write_to_file(path).map_err(|source| CliError::Export {
        path: path.to_path_buf(),
        source,
    })?;
    info!("Exported {} frames to {}", export.frames.len(), path.display());
    Ok(())
}
