//! Data model for the five-stage pipeline and the snapshot aggregate.
//!
//! Field names serialize in camelCase (with the pipeline's established
//! acronyms such as `openPOs` and `valueUSD`) so a presentation layer can
//! consume a snapshot as JSON without a mapping step.

use crate::profile::ProcessProfile;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use supplysim_env::SimError;
use uuid::Uuid;

// =============================================================================
// BOUNDS
// =============================================================================

/// Trailing committed-delta window for Demand.
pub const DEMAND_DELTA_WINDOW: usize = 5;
/// Trailing `valueUSD` window for Inventory.
pub const INVENTORY_SPARK_WINDOW: usize = 20;
/// Trailing coverage window for Readiness.
pub const READINESS_TREND_WINDOW: usize = 15;

pub const MIN_DEMAND_TOTAL: u64 = 200;
pub const MAX_DEMAND_TOTAL: u64 = 6_000;

pub const MIN_OPEN_POS: u32 = 2;
pub const MAX_OPEN_POS: u32 = 60;
pub const ETA_DAYS_MIN: f64 = 4.4;
pub const ETA_DAYS_MAX: f64 = 18.0;

/// Hard floor for on-time performance; ticks keep it above `ON_TIME_TICK_MIN`.
pub const ON_TIME_FLOOR: f64 = 0.4;
pub const ON_TIME_TICK_MIN: f64 = 0.55;
pub const ON_TIME_MAX: f64 = 0.985;
pub const LOGISTICS_ETA_MIN: f64 = 3.5;
pub const LOGISTICS_ETA_MAX: f64 = 17.8;
pub const MAX_SHIPMENTS: usize = 12;
/// Speed above which a shipment counts as in flight.
pub const IN_FLIGHT_SPEED_KPH: f64 = 12.0;
pub const MAX_SPEED_KPH: f64 = 110.0;

/// Geographic corridor shipments are confined to.
pub const CORRIDOR_LAT: (f64, f64) = (29.0, 35.0);
pub const CORRIDOR_LON: (f64, f64) = (-119.0, -94.5);

pub const INVENTORY_MIN_USD: f64 = 350_000.0;
pub const INVENTORY_MAX_USD: f64 = 2_400_000.0;
pub const TURNS_MIN: f64 = 2.8;
pub const TURNS_MAX: f64 = 8.5;

pub const COVERAGE_MIN: f64 = 20.0;
pub const COVERAGE_MAX: f64 = 100.0;

/// Pushes `value` onto a fixed-capacity window, dropping the oldest entries.
pub fn push_window<T>(window: &mut Vec<T>, value: T, capacity: usize) {
    window.push(value);
    if window.len() > capacity {
        let excess = window.len() - capacity;
        window.drain(..excess);
    }
}

// =============================================================================
// STAGES & STATUS
// =============================================================================

/// A pipeline phase tracked by the simulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Stage {
    Demand,
    Procurement,
    Logistics,
    Inventory,
    Readiness,
}

impl Stage {
    /// All stages in pipeline order.
    pub const ALL: [Stage; 5] = [
        Stage::Demand,
        Stage::Procurement,
        Stage::Logistics,
        Stage::Inventory,
        Stage::Readiness,
    ];

    /// Returns the display name.
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Demand => "Demand",
            Stage::Procurement => "Procurement",
            Stage::Logistics => "Logistics",
            Stage::Inventory => "Inventory",
            Stage::Readiness => "Readiness",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Ordinal health of a stage. Ordering is `Ok < Risk < Delayed < Blocked`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum StageStatus {
    #[default]
    #[serde(rename = "OK")]
    Ok,
    Risk,
    Delayed,
    Blocked,
}

impl StageStatus {
    /// Severity rank, 0 for OK up to 3 for Blocked.
    pub fn rank(&self) -> u8 {
        *self as u8
    }

    /// Returns the display label.
    pub fn label(&self) -> &'static str {
        match self {
            StageStatus::Ok => "OK",
            StageStatus::Risk => "Risk",
            StageStatus::Delayed => "Delayed",
            StageStatus::Blocked => "Blocked",
        }
    }
}

impl std::fmt::Display for StageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

// =============================================================================
// CONTROLS
// =============================================================================

/// Coarse multiplier applied to every per-tick noise term.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Volatility {
    Low,
    #[default]
    Medium,
    High,
}

impl Volatility {
    /// Returns the noise scale factor.
    pub fn factor(&self) -> f64 {
        match self {
            Volatility::Low => 0.45,
            Volatility::Medium => 1.0,
            Volatility::High => 1.75,
        }
    }

    /// Returns the level name.
    pub fn name(&self) -> &'static str {
        match self {
            Volatility::Low => "low",
            Volatility::Medium => "medium",
            Volatility::High => "high",
        }
    }
}

impl std::fmt::Display for Volatility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Volatility {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(Volatility::Low),
            "medium" | "med" => Ok(Volatility::Medium),
            "high" => Ok(Volatility::High),
            _ => Err(SimError::UnknownVolatility(s.to_string())),
        }
    }
}

/// User-adjustable biases, each normalized to `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Drivers {
    pub demand_growth: f64,
    pub lead_time_variance: f64,
    pub on_time_noise: f64,
}

impl Default for Drivers {
    fn default() -> Self {
        Self {
            demand_growth: 0.35,
            lead_time_variance: 0.3,
            on_time_noise: 0.25,
        }
    }
}

impl Drivers {
    /// Merges a partial update, clamping each value into `[0, 1]`.
    ///
    /// Non-finite values are ignored. Returns true if anything changed.
    pub fn merge(&mut self, update: &DriverUpdate) -> bool {
        let before = *self;
        merge_unit(&mut self.demand_growth, update.demand_growth);
        merge_unit(&mut self.lead_time_variance, update.lead_time_variance);
        merge_unit(&mut self.on_time_noise, update.on_time_noise);
        before != *self
    }
}

fn merge_unit(slot: &mut f64, value: Option<f64>) {
    if let Some(v) = value.filter(|v| v.is_finite()) {
        *slot = v.clamp(0.0, 1.0);
    }
}

/// Partial driver update; `None` fields are left untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverUpdate {
    pub demand_growth: Option<f64>,
    pub lead_time_variance: Option<f64>,
    pub on_time_noise: Option<f64>,
}

// =============================================================================
// STAGE METRICS
// =============================================================================

/// Shared shape of the stage structures.
pub trait StageMetrics {
    /// The stage these metrics belong to.
    const STAGE: Stage;

    /// Re-establishes the stage's invariants after a mutation.
    fn settle(&mut self);

    /// Stamps the tick the stage was last updated at.
    fn mark(&mut self, tick: u64);
}

/// Demand: how much of the forecast is committed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Demand {
    pub total: u64,
    pub committed: u64,
    pub ratio: f64,
    pub deltas: Vec<i64>,
    pub status: StageStatus,
    pub rationale: String,
    pub updated_at_tick: u64,
}

impl Demand {
    pub fn new(total: u64, committed: u64) -> Self {
        let mut demand = Self {
            total,
            committed,
            ratio: 0.0,
            deltas: Vec::new(),
            status: StageStatus::Ok,
            rationale: String::new(),
            updated_at_tick: 0,
        };
        demand.settle();
        demand
    }

    /// Sets committed (clamped to `[0, total]`) and records the signed change.
    pub fn set_committed(&mut self, committed: i64) {
        let previous = self.committed as i64;
        self.committed = committed.clamp(0, self.total as i64) as u64;
        push_window(
            &mut self.deltas,
            self.committed as i64 - previous,
            DEMAND_DELTA_WINDOW,
        );
        self.settle();
    }

    /// Units not yet committed.
    pub fn shortfall(&self) -> u64 {
        self.total - self.committed
    }
}

impl StageMetrics for Demand {
    const STAGE: Stage = Stage::Demand;

    fn settle(&mut self) {
        self.committed = self.committed.min(self.total);
        self.ratio = if self.total == 0 {
            0.0
        } else {
            self.committed as f64 / self.total as f64
        };
    }

    fn mark(&mut self, tick: u64) {
        self.updated_at_tick = tick;
    }
}

/// Procurement: purchase-order backlog and supplier lead time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Procurement {
    #[serde(rename = "openPOs")]
    pub open_pos: u32,
    #[serde(rename = "latePOs")]
    pub late_pos: u32,
    pub eta_days_mean: f64,
    pub target_eta_days: f64,
    pub status: StageStatus,
    pub rationale: String,
    pub updated_at_tick: u64,
}

impl Procurement {
    /// Fraction of open POs that are late.
    pub fn late_ratio(&self) -> f64 {
        if self.open_pos == 0 {
            0.0
        } else {
            self.late_pos as f64 / self.open_pos as f64
        }
    }
}

impl StageMetrics for Procurement {
    const STAGE: Stage = Stage::Procurement;

    fn settle(&mut self) {
        self.open_pos = self.open_pos.clamp(MIN_OPEN_POS, MAX_OPEN_POS);
        self.late_pos = self.late_pos.min(self.open_pos);
        self.eta_days_mean = self.eta_days_mean.clamp(ETA_DAYS_MIN, ETA_DAYS_MAX);
    }

    fn mark(&mut self, tick: u64) {
        self.updated_at_tick = tick;
    }
}

/// A shipment moving along the logistics corridor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Shipment {
    pub id: String,
    pub lat: f64,
    pub lon: f64,
    pub speed_kph: f64,
    pub heading_deg: f64,
    pub label: String,
}

impl Shipment {
    /// True when the shipment is moving at a material speed.
    pub fn is_in_flight(&self) -> bool {
        self.speed_kph > IN_FLIGHT_SPEED_KPH
    }
}

/// Logistics: carrier performance and the live shipment set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Logistics {
    pub shipments_in_flight: u32,
    #[serde(rename = "avgETA_Days")]
    pub avg_eta_days: f64,
    pub on_time_pct: f64,
    pub shipments: Vec<Shipment>,
    pub status: StageStatus,
    pub rationale: String,
    pub updated_at_tick: u64,
}

impl StageMetrics for Logistics {
    const STAGE: Stage = Stage::Logistics;

    fn settle(&mut self) {
        self.on_time_pct = self.on_time_pct.clamp(ON_TIME_FLOOR, ON_TIME_MAX);
        self.avg_eta_days = self.avg_eta_days.clamp(LOGISTICS_ETA_MIN, LOGISTICS_ETA_MAX);
        for shipment in &mut self.shipments {
            shipment.speed_kph = shipment.speed_kph.clamp(0.0, MAX_SPEED_KPH);
        }
        let moving = self.shipments.iter().filter(|s| s.is_in_flight()).count();
        self.shipments_in_flight = moving.min(MAX_SHIPMENTS) as u32;
    }

    fn mark(&mut self, tick: u64) {
        self.updated_at_tick = tick;
    }
}

/// Inventory: on-hand value against its creation baseline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Inventory {
    #[serde(rename = "valueUSD")]
    pub value_usd: f64,
    pub turns: f64,
    pub spark: Vec<f64>,
    pub baseline: f64,
    pub status: StageStatus,
    pub rationale: String,
    pub updated_at_tick: u64,
}

impl Inventory {
    /// Signed deviation from baseline as a percentage.
    pub fn deviation_pct(&self) -> f64 {
        if self.baseline <= 0.0 {
            0.0
        } else {
            (self.value_usd - self.baseline) / self.baseline * 100.0
        }
    }
}

impl StageMetrics for Inventory {
    const STAGE: Stage = Stage::Inventory;

    /// Clamps into the band and records the value in the spark history.
    fn settle(&mut self) {
        self.value_usd = self.value_usd.clamp(INVENTORY_MIN_USD, INVENTORY_MAX_USD);
        self.turns = self.turns.clamp(TURNS_MIN, TURNS_MAX);
        push_window(&mut self.spark, self.value_usd, INVENTORY_SPARK_WINDOW);
    }

    fn mark(&mut self, tick: u64) {
        self.updated_at_tick = tick;
    }
}

/// Readiness: derived every tick from the other four stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Readiness {
    pub coverage_pct: f64,
    pub trend: Vec<f64>,
    pub status: StageStatus,
    pub rationale: String,
    pub updated_at_tick: u64,
}

impl StageMetrics for Readiness {
    const STAGE: Stage = Stage::Readiness;

    /// Clamps coverage and records it in the trend history.
    fn settle(&mut self) {
        self.coverage_pct = self.coverage_pct.clamp(COVERAGE_MIN, COVERAGE_MAX);
        push_window(&mut self.trend, self.coverage_pct, READINESS_TREND_WINDOW);
    }

    fn mark(&mut self, tick: u64) {
        self.updated_at_tick = tick;
    }
}

// =============================================================================
// ALARMS
// =============================================================================

/// Alarm severity. Ordering is `Info < Warn < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warn,
    Critical,
}

impl Severity {
    /// Returns the lowercase name.
    pub fn name(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warn => "warn",
            Severity::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Which path produced an alarm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlarmOrigin {
    /// Tick-probabilistic background alarm
    Ambient,
    /// Summary of a scenario event
    Scenario,
}

/// Free-form alarm metadata.
pub type AlarmMetadata = serde_json::Map<String, serde_json::Value>;

/// A single alarm. Downstream stores upsert by `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alarm {
    pub id: Uuid,
    pub stage: Stage,
    pub severity: Severity,
    pub message: String,
    pub timestamp_ms: u64,
    pub origin: AlarmOrigin,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<AlarmMetadata>,
}

impl Alarm {
    /// Returns the metadata entry `impactedStages` as names, if present.
    pub fn impacted_stages(&self) -> Vec<String> {
        self.metadata
            .as_ref()
            .and_then(|m| m.get("impactedStages"))
            .and_then(|v| v.as_array())
            .map(|stages| {
                stages
                    .iter()
                    .filter_map(|s| s.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }
}

// =============================================================================
// SNAPSHOT
// =============================================================================

/// The complete point-in-time state of a simulation session.
///
/// The engine keeps one canonical, mutable instance; subscribers only ever
/// see clones of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub tick: u64,
    pub seed: u64,
    pub volatility: Volatility,
    pub is_running: bool,
    pub demand: Demand,
    pub procurement: Procurement,
    pub logistics: Logistics,
    pub inventory: Inventory,
    pub readiness: Readiness,
    pub status_by_stage: BTreeMap<Stage, StageStatus>,
    pub rationale_by_stage: BTreeMap<Stage, String>,
    pub overall_status: StageStatus,
    pub alarms: Vec<Alarm>,
    pub drivers: Drivers,
    pub last_updated_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_profile: Option<ProcessProfile>,
}

impl Snapshot {
    /// Returns the status of one stage.
    pub fn status_of(&self, stage: Stage) -> StageStatus {
        match stage {
            Stage::Demand => self.demand.status,
            Stage::Procurement => self.procurement.status,
            Stage::Logistics => self.logistics.status,
            Stage::Inventory => self.inventory.status,
            Stage::Readiness => self.readiness.status,
        }
    }

    /// Returns the rationale of one stage.
    pub fn rationale_of(&self, stage: Stage) -> &str {
        match stage {
            Stage::Demand => &self.demand.rationale,
            Stage::Procurement => &self.procurement.rationale,
            Stage::Logistics => &self.logistics.rationale,
            Stage::Inventory => &self.inventory.rationale,
            Stage::Readiness => &self.readiness.rationale,
        }
    }

    /// Finds an alarm by id.
    pub fn alarm(&self, id: &Uuid) -> Option<&Alarm> {
        self.alarms.iter().find(|a| &a.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_window_drops_oldest() {
        let mut window = vec![1, 2, 3];
        push_window(&mut window, 4, 3);
        assert_eq!(window, vec![2, 3, 4]);

        push_window(&mut window, 5, 5);
        assert_eq!(window, vec![2, 3, 4, 5]);
    }

    #[test]
    fn test_status_ordering() {
        assert!(StageStatus::Ok < StageStatus::Risk);
        assert!(StageStatus::Risk < StageStatus::Delayed);
        assert!(StageStatus::Delayed < StageStatus::Blocked);
        assert_eq!(StageStatus::Blocked.rank(), 3);
    }

    #[test]
    fn test_demand_set_committed_clamps() {
        let mut demand = Demand::new(1000, 900);

        demand.set_committed(1400);
        assert_eq!(demand.committed, 1000);
        assert_eq!(demand.deltas, vec![100]);
        assert_eq!(demand.ratio, 1.0);

        demand.set_committed(-50);
        assert_eq!(demand.committed, 0);
        assert_eq!(demand.deltas, vec![100, -1000]);
    }

    #[test]
    fn test_procurement_settle_bounds_late() {
        let mut procurement = Procurement {
            open_pos: 1,
            late_pos: 9,
            eta_days_mean: 30.0,
            target_eta_days: 7.0,
            status: StageStatus::Ok,
            rationale: String::new(),
            updated_at_tick: 0,
        };
        procurement.settle();

        assert_eq!(procurement.open_pos, MIN_OPEN_POS);
        assert_eq!(procurement.late_pos, MIN_OPEN_POS);
        assert_eq!(procurement.eta_days_mean, ETA_DAYS_MAX);
    }

    #[test]
    fn test_drivers_merge_clamps_and_ignores_nan() {
        let mut drivers = Drivers::default();
        let changed = drivers.merge(&DriverUpdate {
            demand_growth: Some(4.0),
            lead_time_variance: Some(f64::NAN),
            on_time_noise: Some(-1.0),
        });

        assert!(changed);
        assert_eq!(drivers.demand_growth, 1.0);
        assert_eq!(drivers.lead_time_variance, Drivers::default().lead_time_variance);
        assert_eq!(drivers.on_time_noise, 0.0);

        assert!(!drivers.merge(&DriverUpdate::default()));
    }

    #[test]
    fn test_volatility_parse() {
        assert_eq!("HIGH".parse::<Volatility>().unwrap(), Volatility::High);
        assert_eq!(Volatility::Low.factor(), 0.45);
        assert!("extreme".parse::<Volatility>().is_err());
    }

    #[test]
    fn test_serialized_field_names() {
        let procurement = Procurement {
            open_pos: 4,
            late_pos: 1,
            eta_days_mean: 7.0,
            target_eta_days: 7.0,
            status: StageStatus::Ok,
            rationale: String::new(),
            updated_at_tick: 3,
        };
        let json = serde_json::to_value(&procurement).unwrap();

        assert_eq!(json["openPOs"], 4);
        assert_eq!(json["latePOs"], 1);
        assert_eq!(json["updatedAtTick"], 3);
        assert_eq!(json["status"], "OK");
    }
}
