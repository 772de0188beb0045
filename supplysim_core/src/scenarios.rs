//! Scenario events: named, manually triggered shocks to the pipeline.
//!
//! Every scenario is a fixed sequence of stage "touches". A touch mutates one
//! stage, re-settles its invariants and stamps it with the current tick.
//! After all touches the snapshot is re-derived and one summary alarm is
//! built from the stages that were touched or changed status.

use crate::advance;
use crate::alarms::AlarmIds;
use crate::model::{
    Alarm, AlarmMetadata, AlarmOrigin, Severity, Snapshot, Stage, StageMetrics, ETA_DAYS_MIN,
    LOGISTICS_ETA_MIN, MAX_SPEED_KPH, ON_TIME_FLOOR, ON_TIME_MAX,
};
use crate::status;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use supplysim_env::{EntropySource, SimError};

// supply-delay
const SUPPLY_DELAY_SUPPLIER_ETA_DAYS: f64 = 1.6;
const SUPPLY_DELAY_LATE_POS: u32 = 1;
const SUPPLY_DELAY_TRANSIT_DAYS: f64 = 1.8;
const SUPPLY_DELAY_TRANSIT_SPREAD: f64 = 0.5;
const SUPPLY_DELAY_ON_TIME_DROP: f64 = 0.14;
const SUPPLY_DELAY_INVENTORY_SHARE: f64 = 0.16;

// po-cancellation
const PO_CANCEL_COMMITTED_SHARE: f64 = 0.07;
const PO_CANCEL_LATE_POS: u32 = 2;
const PO_CANCEL_ON_TIME_DROP: f64 = 0.25;
const PO_CANCEL_INVENTORY_SHARE: f64 = 0.18;

/// Minimum inventory hit for supply-delay and po-cancellation.
const INVENTORY_MIN_HIT_USD: f64 = 52_000.0;

// expedite
const EXPEDITE_SUPPLIER_ETA_DAYS: f64 = 1.4;
const EXPEDITE_LATE_POS: u32 = 1;
const EXPEDITE_ON_TIME_GAIN: f64 = 0.08;
const EXPEDITE_TRANSIT_DAYS: f64 = 1.2;
const EXPEDITE_TRANSIT_SPREAD: f64 = 0.4;
const EXPEDITE_SPEED_FACTOR: f64 = 1.15;

// port-congestion
const CONGESTION_ON_TIME_DROP: f64 = 0.18;
const CONGESTION_TRANSIT_DAYS: f64 = 2.6;
const CONGESTION_TRANSIT_SPREAD: f64 = 0.8;
const CONGESTION_SPEED_FACTOR: f64 = 0.35;
const CONGESTION_SUPPLIER_ETA_DAYS: f64 = 0.9;

// inventory-recovery
const RECOVERY_GAP_SHARE: f64 = 0.6;
const RECOVERY_MIN_USD: f64 = 40_000.0;
const RECOVERY_TURNS: f64 = 0.4;
const RECOVERY_SHORTFALL_SHARE: f64 = 0.3;

/// The closed set of scenario events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScenarioId {
    /// Supplier lead times stretch and carriers slip
    SupplyDelay,

    /// A block of purchase orders is cancelled
    PoCancellation,

    /// Premium freight pulls lead times in
    Expedite,

    /// Port backlog stalls the corridor
    PortCongestion,

    /// Replenishment restores stock toward plan
    InventoryRecovery,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::SupplyDelay,
            ScenarioId::PoCancellation,
            ScenarioId::Expedite,
            ScenarioId::PortCongestion,
            ScenarioId::InventoryRecovery,
        ]
    }

    /// Returns the scenario id as used on the control surface.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::SupplyDelay => "supply-delay",
            ScenarioId::PoCancellation => "po-cancellation",
            ScenarioId::Expedite => "expedite",
            ScenarioId::PortCongestion => "port-congestion",
            ScenarioId::InventoryRecovery => "inventory-recovery",
        }
    }

    /// Returns the title that prefixes the summary alarm.
    pub fn title(&self) -> &'static str {
        match self {
            ScenarioId::SupplyDelay => "Supply delay",
            ScenarioId::PoCancellation => "PO cancellation",
            ScenarioId::Expedite => "Expedite",
            ScenarioId::PortCongestion => "Port congestion",
            ScenarioId::InventoryRecovery => "Inventory recovery",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::SupplyDelay => "Supplier ETA +1.6d, transit +1.8-2.3d, on-time -14pt, inventory -16%",
            ScenarioId::PoCancellation => "Commitments -7%, 2 more late POs, on-time -25pt, inventory -18%",
            ScenarioId::Expedite => "Supplier ETA -1.4d, one late PO cleared, on-time +8pt, faster shipments",
            ScenarioId::PortCongestion => "On-time -18pt, transit +2.6-3.4d, shipments stalled, supplier ETA +0.9d",
            ScenarioId::InventoryRecovery => "Inventory recovers 60% toward baseline, 30% of shortfall committed",
        }
    }

    /// The stage the summary alarm is filed under.
    pub fn primary_stage(&self) -> Stage {
        match self {
            ScenarioId::SupplyDelay | ScenarioId::PoCancellation => Stage::Procurement,
            ScenarioId::Expedite | ScenarioId::PortCongestion => Stage::Logistics,
            ScenarioId::InventoryRecovery => Stage::Inventory,
        }
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "supply-delay" | "supplydelay" => Ok(ScenarioId::SupplyDelay),
            "po-cancellation" | "pocancellation" => Ok(ScenarioId::PoCancellation),
            "expedite" => Ok(ScenarioId::Expedite),
            "port-congestion" | "portcongestion" => Ok(ScenarioId::PortCongestion),
            "inventory-recovery" | "inventoryrecovery" => Ok(ScenarioId::InventoryRecovery),
            _ => Err(SimError::UnknownScenario(s.to_string())),
        }
    }
}

/// What a scenario did to the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioOutcome {
    pub scenario: ScenarioId,

    /// Stages touched or whose status changed, in pipeline order
    pub impacted: Vec<Stage>,

    pub severity: Severity,
}

/// Mutates one stage, re-settles it and records it as touched.
fn touch<M: StageMetrics>(
    metrics: &mut M,
    tick: u64,
    touched: &mut BTreeSet<Stage>,
    mutate: impl FnOnce(&mut M),
) {
    mutate(metrics);
    metrics.settle();
    metrics.mark(tick);
    touched.insert(M::STAGE);
}

fn inventory_hit(value: f64, share: f64) -> f64 {
    (value * share).max(INVENTORY_MIN_HIT_USD)
}

/// Applies a scenario to the snapshot and re-derives every status.
pub fn apply_scenario(
    state: &mut Snapshot,
    scenario: ScenarioId,
    rng: &mut dyn EntropySource,
) -> ScenarioOutcome {
    let before: BTreeMap<Stage, _> = state.status_by_stage.clone();
    let tick = state.tick;
    let mut touched = BTreeSet::new();

    match scenario {
        ScenarioId::SupplyDelay => {
            touch(&mut state.procurement, tick, &mut touched, |p| {
                p.eta_days_mean += SUPPLY_DELAY_SUPPLIER_ETA_DAYS;
                p.late_pos += SUPPLY_DELAY_LATE_POS;
            });
            let transit = SUPPLY_DELAY_TRANSIT_DAYS + SUPPLY_DELAY_TRANSIT_SPREAD * rng.next_f64();
            touch(&mut state.logistics, tick, &mut touched, |l| {
                l.avg_eta_days += transit;
                l.on_time_pct = (l.on_time_pct - SUPPLY_DELAY_ON_TIME_DROP).max(ON_TIME_FLOOR);
            });
            touch(&mut state.inventory, tick, &mut touched, |i| {
                i.value_usd -= inventory_hit(i.value_usd, SUPPLY_DELAY_INVENTORY_SHARE);
            });
        }
        ScenarioId::PoCancellation => {
            touch(&mut state.demand, tick, &mut touched, |d| {
                let cut = (d.total as f64 * PO_CANCEL_COMMITTED_SHARE).round() as i64;
                d.set_committed(d.committed as i64 - cut);
            });
            touch(&mut state.procurement, tick, &mut touched, |p| {
                p.late_pos = (p.late_pos + PO_CANCEL_LATE_POS).min(p.open_pos);
            });
            touch(&mut state.logistics, tick, &mut touched, |l| {
                l.on_time_pct = (l.on_time_pct - PO_CANCEL_ON_TIME_DROP).max(ON_TIME_FLOOR);
            });
            touch(&mut state.inventory, tick, &mut touched, |i| {
                i.value_usd -= inventory_hit(i.value_usd, PO_CANCEL_INVENTORY_SHARE);
            });
        }
        ScenarioId::Expedite => {
            touch(&mut state.procurement, tick, &mut touched, |p| {
                p.eta_days_mean = (p.eta_days_mean - EXPEDITE_SUPPLIER_ETA_DAYS).max(ETA_DAYS_MIN);
                p.late_pos = p.late_pos.saturating_sub(EXPEDITE_LATE_POS);
            });
            let transit = EXPEDITE_TRANSIT_DAYS + EXPEDITE_TRANSIT_SPREAD * rng.next_f64();
            touch(&mut state.logistics, tick, &mut touched, |l| {
                l.on_time_pct = (l.on_time_pct + EXPEDITE_ON_TIME_GAIN).min(ON_TIME_MAX);
                l.avg_eta_days = (l.avg_eta_days - transit).max(LOGISTICS_ETA_MIN);
                for shipment in &mut l.shipments {
                    shipment.speed_kph = (shipment.speed_kph * EXPEDITE_SPEED_FACTOR).min(MAX_SPEED_KPH);
                }
            });
        }
        ScenarioId::PortCongestion => {
            let transit = CONGESTION_TRANSIT_DAYS + CONGESTION_TRANSIT_SPREAD * rng.next_f64();
            touch(&mut state.logistics, tick, &mut touched, |l| {
                l.on_time_pct = (l.on_time_pct - CONGESTION_ON_TIME_DROP).max(ON_TIME_FLOOR);
                l.avg_eta_days += transit;
                for shipment in &mut l.shipments {
                    shipment.speed_kph *= CONGESTION_SPEED_FACTOR;
                }
            });
            touch(&mut state.procurement, tick, &mut touched, |p| {
                p.eta_days_mean += CONGESTION_SUPPLIER_ETA_DAYS;
            });
        }
        ScenarioId::InventoryRecovery => {
            touch(&mut state.inventory, tick, &mut touched, |i| {
                let gap = i.baseline - i.value_usd;
                if gap > 0.0 {
                    i.value_usd += (gap * RECOVERY_GAP_SHARE).max(RECOVERY_MIN_USD);
                } else {
                    i.value_usd += gap * RECOVERY_GAP_SHARE;
                }
                i.turns += RECOVERY_TURNS;
            });
            touch(&mut state.demand, tick, &mut touched, |d| {
                let recovered = (d.shortfall() as f64 * RECOVERY_SHORTFALL_SHARE).round() as i64;
                d.set_committed(d.committed as i64 + recovered);
            });
        }
    }

    advance::recompute_readiness(state);
    status::resolve_all(state);

    let impacted: Vec<Stage> = Stage::ALL
        .iter()
        .copied()
        .filter(|stage| touched.contains(stage) || before.get(stage) != state.status_by_stage.get(stage))
        .collect();

    let severity = match (scenario, impacted.len()) {
        (ScenarioId::InventoryRecovery, _) => Severity::Info,
        (_, n) if n >= 3 => Severity::Critical,
        (_, 2) => Severity::Warn,
        _ => Severity::Info,
    };

    ScenarioOutcome {
        scenario,
        impacted,
        severity,
    }
}

/// Builds the single summary alarm for an applied scenario.
pub fn scenario_alarm(
    state: &Snapshot,
    outcome: &ScenarioOutcome,
    ids: &mut AlarmIds,
    now_ms: u64,
) -> Alarm {
    let names: Vec<&str> = outcome.impacted.iter().map(|s| s.name()).collect();
    let message = format!(
        "{}: {} impacted (overall {})",
        outcome.scenario.title(),
        names.join(", "),
        state.overall_status
    );

    let mut metadata = AlarmMetadata::new();
    metadata.insert("scenario".into(), Value::from(outcome.scenario.name()));
    metadata.insert(
        "impactedStages".into(),
        Value::Array(names.iter().map(|&n| Value::from(n)).collect()),
    );
    metadata.insert("overallStatus".into(), Value::from(state.overall_status.label()));
    metadata.insert("tick".into(), Value::from(state.tick));

    Alarm {
        id: ids.next_id(),
        stage: outcome.scenario.primary_stage(),
        severity: outcome.severity,
        message,
        timestamp_ms: now_ms,
        origin: AlarmOrigin::Scenario,
        metadata: Some(metadata),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::initial::initial_snapshot;
    use crate::model::{StageStatus, Volatility, ETA_DAYS_MAX};
    use approx::assert_relative_eq;
    use supplysim_env::{ScriptedEntropy, SeededEntropy};

    fn fresh() -> Snapshot {
        initial_snapshot(4021, Volatility::Medium, None, &mut SeededEntropy::new(4021), 0)
    }

    #[test]
    fn test_scenario_parse_roundtrip() {
        for scenario in ScenarioId::all() {
            assert_eq!(scenario.name().parse::<ScenarioId>().unwrap(), scenario);
        }
        assert_eq!("PO_CANCELLATION".parse::<ScenarioId>().unwrap(), ScenarioId::PoCancellation);
        assert!(matches!(
            "meteor-strike".parse::<ScenarioId>(),
            Err(SimError::UnknownScenario(_))
        ));
    }

    #[test]
    fn test_po_cancellation_effects() {
        let mut state = fresh();
        let before = state.clone();

        let outcome = apply_scenario(&mut state, ScenarioId::PoCancellation, &mut ScriptedEntropy::constant(0.5));

        let cut = (before.demand.total as f64 * 0.07).round() as u64;
        assert_eq!(state.demand.committed, before.demand.committed.saturating_sub(cut));
        assert_eq!(
            state.procurement.late_pos,
            (before.procurement.late_pos + 2).min(before.procurement.open_pos)
        );
        assert_relative_eq!(
            state.logistics.on_time_pct,
            (before.logistics.on_time_pct - 0.25).max(0.4)
        );
        let hit = before.inventory.value_usd - state.inventory.value_usd;
        assert!(hit >= 52_000.0);
        assert!(hit >= before.inventory.value_usd * 0.18 - 1e-6);

        for stage in [Stage::Demand, Stage::Procurement, Stage::Logistics, Stage::Inventory] {
            assert!(outcome.impacted.contains(&stage));
        }
        assert_eq!(outcome.severity, Severity::Critical);
    }

    #[test]
    fn test_supply_delay_effects() {
        let mut state = fresh();
        let before = state.clone();

        apply_scenario(&mut state, ScenarioId::SupplyDelay, &mut ScriptedEntropy::constant(0.0));

        assert_relative_eq!(
            state.logistics.avg_eta_days,
            (before.logistics.avg_eta_days + 1.8).min(17.8)
        );
        assert_relative_eq!(
            state.logistics.on_time_pct,
            (before.logistics.on_time_pct - 0.14).max(0.4)
        );
        assert_relative_eq!(
            state.procurement.eta_days_mean,
            (before.procurement.eta_days_mean + 1.6).min(ETA_DAYS_MAX)
        );
        let hit = before.inventory.value_usd - state.inventory.value_usd;
        assert_relative_eq!(
            hit,
            (before.inventory.value_usd * 0.16).max(52_000.0),
            max_relative = 1e-9
        );
    }

    #[test]
    fn test_inventory_recovery_always_info() {
        let mut state = fresh();
        state.inventory.value_usd = state.inventory.baseline * 0.6;
        status::resolve_all(&mut state);
        assert_eq!(state.inventory.status, StageStatus::Blocked);

        let outcome = apply_scenario(&mut state, ScenarioId::InventoryRecovery, &mut ScriptedEntropy::constant(0.5));

        assert_eq!(outcome.severity, Severity::Info);
        assert!(outcome.impacted.contains(&Stage::Inventory));
        assert_relative_eq!(
            state.inventory.value_usd,
            state.inventory.baseline * 0.84,
            max_relative = 1e-9
        );
    }

    #[test]
    fn test_expedite_respects_floors() {
        let mut state = fresh();
        state.procurement.eta_days_mean = 4.6;
        state.procurement.late_pos = 0;
        state.logistics.avg_eta_days = 3.6;

        let outcome = apply_scenario(&mut state, ScenarioId::Expedite, &mut ScriptedEntropy::constant(0.5));

        assert_eq!(state.procurement.eta_days_mean, ETA_DAYS_MIN);
        assert_eq!(state.procurement.late_pos, 0);
        assert_eq!(state.logistics.avg_eta_days, LOGISTICS_ETA_MIN);
        assert!(outcome.impacted.contains(&Stage::Procurement));
        assert!(outcome.impacted.contains(&Stage::Logistics));
    }

    #[test]
    fn test_port_congestion_stalls_shipments() {
        let mut state = fresh();
        for shipment in &mut state.logistics.shipments {
            shipment.speed_kph = 30.0;
        }

        apply_scenario(&mut state, ScenarioId::PortCongestion, &mut ScriptedEntropy::constant(0.5));

        assert_eq!(state.logistics.shipments_in_flight, 0);
        assert!(state.logistics.rationale.contains("0 of"));
    }

    #[test]
    fn test_summary_alarm_shape() {
        let mut state = fresh();
        let mut ids = AlarmIds::new(state.seed);
        let outcome = apply_scenario(&mut state, ScenarioId::PoCancellation, &mut ScriptedEntropy::constant(0.5));

        let alarm = scenario_alarm(&state, &outcome, &mut ids, 99);

        assert!(alarm.message.starts_with("PO cancellation:"));
        assert_eq!(alarm.origin, AlarmOrigin::Scenario);
        assert_eq!(alarm.stage, Stage::Procurement);
        assert_eq!(alarm.timestamp_ms, 99);
        let impacted = alarm.impacted_stages();
        for name in ["Demand", "Procurement", "Logistics", "Inventory"] {
            assert!(impacted.iter().any(|s| s == name));
        }
        assert_eq!(alarm.metadata.as_ref().unwrap()["scenario"], "po-cancellation");
    }
}
