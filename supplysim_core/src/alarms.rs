//! Alarm generation, retention and acknowledgement.
//!
//! Two paths feed one most-recent-first list: ambient alarms drawn each tick
//! and scenario summaries. Each path truncates the list to its own cap right
//! after prepending.

use crate::model::{
    Alarm, AlarmMetadata, AlarmOrigin, Severity, Snapshot, Stage, StageStatus,
};
use serde_json::Value;
use supplysim_env::EntropySource;
use uuid::{Builder, Uuid};

/// Retention cap applied after an ambient alarm is prepended.
pub const AMBIENT_ALARM_CAP: usize = 20;
/// Retention cap applied after a scenario alarm is prepended.
pub const SCENARIO_ALARM_CAP: usize = 30;
/// Per-tick probability of an ambient alarm.
pub const AMBIENT_ALARM_PROBABILITY: f64 = 0.10;

/// Issues alarm ids that are unique within a session and reproducible
/// from its seed.
#[derive(Debug, Clone)]
pub struct AlarmIds {
    seed: u64,
    sequence: u64,
}

impl AlarmIds {
    pub fn new(seed: u64) -> Self {
        Self { seed, sequence: 0 }
    }

    /// Returns the next id.
    pub fn next_id(&mut self) -> Uuid {
        self.sequence += 1;
        let mut bytes = [0u8; 16];
        bytes[0..8].copy_from_slice(&self.sequence.to_le_bytes());
        bytes[8..16].copy_from_slice(&self.seed.wrapping_mul(0x517cc1b727220a95).to_le_bytes());
        Builder::from_random_bytes(bytes).into_uuid()
    }

    /// Number of ids issued so far.
    pub fn issued(&self) -> u64 {
        self.sequence
    }
}

/// Maps a stage status to the severity of an alarm about it.
pub fn severity_for(status: StageStatus) -> Severity {
    match status {
        StageStatus::Ok => Severity::Info,
        StageStatus::Risk => Severity::Warn,
        StageStatus::Delayed | StageStatus::Blocked => Severity::Critical,
    }
}

/// Picks a stage with weight `rank(status) + 1`.
pub fn pick_weighted_stage(state: &Snapshot, rng: &mut dyn EntropySource) -> Stage {
    let weights: Vec<(Stage, f64)> = Stage::ALL
        .iter()
        .map(|&stage| (stage, f64::from(state.status_of(stage).rank()) + 1.0))
        .collect();
    let total: f64 = weights.iter().map(|(_, w)| w).sum();

    let mut roll = rng.next_f64() * total;
    for (stage, weight) in &weights {
        if roll < *weight {
            return *stage;
        }
        roll -= weight;
    }
    Stage::Readiness
}

/// Renders one message from the stage's template pool.
pub fn ambient_message(stage: Stage, state: &Snapshot, rng: &mut dyn EntropySource) -> String {
    let pick = rng.pick_index(3);
    match stage {
        Stage::Demand => {
            let demand = &state.demand;
            match pick {
                0 => format!("Commitment at {:.0}% of forecast demand", demand.ratio * 100.0),
                1 => format!(
                    "Demand swing of {:+} units since last update",
                    demand.deltas.last().copied().unwrap_or(0)
                ),
                _ => format!("{} units still uncommitted", demand.shortfall()),
            }
        }
        Stage::Procurement => {
            let procurement = &state.procurement;
            match pick {
                0 => format!("{} purchase orders running late", procurement.late_pos),
                1 => format!(
                    "Supplier ETA averaging {:.1} days",
                    procurement.eta_days_mean
                ),
                _ => format!("PO backlog at {} open orders", procurement.open_pos),
            }
        }
        Stage::Logistics => {
            let logistics = &state.logistics;
            match pick {
                0 => format!("On-time delivery at {:.0}%", logistics.on_time_pct * 100.0),
                1 => format!("Carrier transit stretched to {:.1} days", logistics.avg_eta_days),
                _ => format!("{} shipments moving on corridor", logistics.shipments_in_flight),
            }
        }
        Stage::Inventory => {
            let inventory = &state.inventory;
            match pick {
                0 => format!(
                    "Inventory value ${:.0}k ({:+.1}% vs baseline)",
                    inventory.value_usd / 1000.0,
                    inventory.deviation_pct()
                ),
                1 => format!("Stock turns at {:.1}", inventory.turns),
                _ => format!(
                    "Inventory drifted {:.1}% from plan",
                    inventory.deviation_pct().abs()
                ),
            }
        }
        Stage::Readiness => {
            let readiness = &state.readiness;
            match pick {
                0 => format!("Readiness coverage at {:.1}%", readiness.coverage_pct),
                1 => format!(
                    "Readiness {} over last {} samples",
                    trend_word(&readiness.trend),
                    readiness.trend.len()
                ),
                _ => format!("Mission coverage {}", readiness.status.label().to_lowercase()),
            }
        }
    }
}

fn trend_word(trend: &[f64]) -> &'static str {
    match (trend.first(), trend.last()) {
        (Some(first), Some(last)) if last - first > 1.0 => "rising",
        (Some(first), Some(last)) if first - last > 1.0 => "falling",
        _ => "flat",
    }
}

/// Draws the ambient alarm for this tick, if any.
///
/// An alarm repeating the stage and message of the newest alarm is
/// suppressed.
pub fn ambient_alarm(
    state: &Snapshot,
    rng: &mut dyn EntropySource,
    ids: &mut AlarmIds,
    now_ms: u64,
) -> Option<Alarm> {
    if !rng.chance(AMBIENT_ALARM_PROBABILITY) {
        return None;
    }
    let stage = pick_weighted_stage(state, rng);
    let message = ambient_message(stage, state, rng);

    if let Some(latest) = state.alarms.first() {
        if latest.stage == stage && latest.message == message {
            return None;
        }
    }

    let status = state.status_of(stage);
    let mut metadata = AlarmMetadata::new();
    metadata.insert("status".into(), Value::from(status.label()));
    metadata.insert("tick".into(), Value::from(state.tick));

    Some(Alarm {
        id: ids.next_id(),
        stage,
        severity: severity_for(status),
        message,
        timestamp_ms: now_ms,
        origin: AlarmOrigin::Ambient,
        metadata: Some(metadata),
    })
}

/// Prepends an alarm and truncates the list to `cap`.
pub fn push_alarm(alarms: &mut Vec<Alarm>, alarm: Alarm, cap: usize) {
    alarms.insert(0, alarm);
    alarms.truncate(cap);
}

/// Removes the alarm with the given id. Unknown or malformed ids are a no-op.
///
/// Returns true if an alarm was removed.
pub fn acknowledge(alarms: &mut Vec<Alarm>, id: &str) -> bool {
    let Ok(id) = Uuid::parse_str(id.trim()) else {
        return false;
    };
    let before = alarms.len();
    alarms.retain(|alarm| alarm.id != id);
    alarms.len() != before
}
