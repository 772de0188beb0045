//! Status resolver: pure classification of raw stage metrics.
//!
//! Every function here is stateless. [`resolve_all`] is the single place a
//! snapshot's derived fields (`status`, `rationale`, the per-stage maps and
//! `overall_status`) are rebuilt, and every mutation path ends by calling it.

use crate::model::{
    Demand, Inventory, Logistics, Procurement, Readiness, Snapshot, Stage, StageStatus,
};

// Demand ratio thresholds
const DEMAND_OK_RATIO: f64 = 0.85;
const DEMAND_RISK_RATIO: f64 = 0.65;
const DEMAND_DELAYED_RATIO: f64 = 0.48;

// Procurement ETA overage thresholds (days over target)
const PROCUREMENT_OK_OVERAGE: f64 = 1.5;
const PROCUREMENT_DELAYED_OVERAGE: f64 = 2.2;
const PROCUREMENT_BLOCKED_OVERAGE: f64 = 5.0;
const PROCUREMENT_BLOCKED_LATE_SHARE: f64 = 0.45;

// Logistics thresholds
const LOGISTICS_BLOCKED_ON_TIME: f64 = 0.55;
const LOGISTICS_BLOCKED_ETA: f64 = 15.0;
const LOGISTICS_DELAYED_ON_TIME: f64 = 0.60;
const LOGISTICS_RISK_ON_TIME: f64 = 0.75;
const LOGISTICS_RISK_ETA: f64 = 11.0;

// Inventory deviation thresholds (percent from baseline)
const INVENTORY_BLOCKED_PCT: f64 = 32.0;
const INVENTORY_DELAYED_PCT: f64 = 24.0;
const INVENTORY_RISK_PCT: f64 = 15.0;

// Readiness coverage thresholds (percent)
const READINESS_OK_COVERAGE: f64 = 85.0;
const READINESS_RISK_COVERAGE: f64 = 60.0;

/// Classifies Demand by its commitment ratio.
pub fn demand_status(demand: &Demand) -> StageStatus {
    if demand.ratio >= DEMAND_OK_RATIO {
        StageStatus::Ok
    } else if demand.ratio >= DEMAND_RISK_RATIO {
        StageStatus::Risk
    } else if demand.ratio >= DEMAND_DELAYED_RATIO {
        StageStatus::Delayed
    } else {
        StageStatus::Blocked
    }
}

/// Classifies Procurement by late POs and lead-time overage.
pub fn procurement_status(procurement: &Procurement) -> StageStatus {
    let late = procurement.late_pos;
    let eta = procurement.eta_days_mean;
    let target = procurement.target_eta_days;

    if late == 0 && eta <= target + PROCUREMENT_OK_OVERAGE {
        return StageStatus::Ok;
    }
    if late as f64 > procurement.open_pos as f64 * PROCUREMENT_BLOCKED_LATE_SHARE
        || eta > target + PROCUREMENT_BLOCKED_OVERAGE
    {
        return StageStatus::Blocked;
    }
    if eta > target + PROCUREMENT_DELAYED_OVERAGE {
        return StageStatus::Delayed;
    }
    if late > 0 {
        return StageStatus::Risk;
    }
    StageStatus::Ok
}

/// Classifies Logistics by on-time performance and transit time.
pub fn logistics_status(logistics: &Logistics) -> StageStatus {
    let on_time = logistics.on_time_pct;
    let eta = logistics.avg_eta_days;

    if on_time < LOGISTICS_BLOCKED_ON_TIME || eta > LOGISTICS_BLOCKED_ETA {
        StageStatus::Blocked
    } else if on_time < LOGISTICS_DELAYED_ON_TIME {
        StageStatus::Delayed
    } else if on_time < LOGISTICS_RISK_ON_TIME || eta > LOGISTICS_RISK_ETA {
        StageStatus::Risk
    } else {
        StageStatus::Ok
    }
}

/// Classifies Inventory by absolute deviation from its baseline.
pub fn inventory_status(inventory: &Inventory) -> StageStatus {
    let deviation = inventory.deviation_pct().abs();

    if deviation > INVENTORY_BLOCKED_PCT {
        StageStatus::Blocked
    } else if deviation > INVENTORY_DELAYED_PCT {
        StageStatus::Delayed
    } else if deviation > INVENTORY_RISK_PCT {
        StageStatus::Risk
    } else {
        StageStatus::Ok
    }
}

/// Classifies Readiness by coverage, falling back to upstream health.
///
/// Below the Risk threshold, Readiness mirrors the worse of Procurement and
/// Logistics: Blocked stays Blocked, anything else reads as Delayed.
pub fn readiness_status(
    coverage_pct: f64,
    procurement: StageStatus,
    logistics: StageStatus,
) -> StageStatus {
    if coverage_pct >= READINESS_OK_COVERAGE {
        StageStatus::Ok
    } else if coverage_pct >= READINESS_RISK_COVERAGE {
        StageStatus::Risk
    } else if procurement.max(logistics) == StageStatus::Blocked {
        StageStatus::Blocked
    } else {
        StageStatus::Delayed
    }
}

/// Returns the most severe status, or OK for an empty input.
pub fn worst(statuses: impl IntoIterator<Item = StageStatus>) -> StageStatus {
    statuses.into_iter().max().unwrap_or_default()
}

// =============================================================================
// RATIONALE
// =============================================================================

pub fn demand_rationale(demand: &Demand) -> String {
    format!(
        "{:.1}% of demand committed ({}/{} units)",
        demand.ratio * 100.0,
        demand.committed,
        demand.total
    )
}

pub fn procurement_rationale(procurement: &Procurement) -> String {
    format!(
        "{} of {} POs late; supplier ETA {:.1}d vs {:.1}d target",
        procurement.late_pos,
        procurement.open_pos,
        procurement.eta_days_mean,
        procurement.target_eta_days
    )
}

pub fn logistics_rationale(logistics: &Logistics) -> String {
    format!(
        "{:.0}% on time, avg transit {:.1}d, {} of {} shipments moving",
        logistics.on_time_pct * 100.0,
        logistics.avg_eta_days,
        logistics.shipments_in_flight,
        logistics.shipments.len()
    )
}

pub fn inventory_rationale(inventory: &Inventory) -> String {
    format!(
        "${:.0}k on hand ({:+.1}% vs baseline), {:.1} turns",
        inventory.value_usd / 1000.0,
        inventory.deviation_pct(),
        inventory.turns
    )
}

/// Names the limiting upstream stage once coverage drops below the Risk line.
pub fn readiness_rationale(
    readiness: &Readiness,
    procurement: StageStatus,
    logistics: StageStatus,
) -> String {
    if readiness.coverage_pct >= READINESS_RISK_COVERAGE {
        return format!("Coverage {:.1}% of requirement", readiness.coverage_pct);
    }
    let (stage, status) = if logistics > procurement {
        (Stage::Logistics, logistics)
    } else {
        (Stage::Procurement, procurement)
    };
    format!(
        "Coverage {:.1}%; constrained by {} ({})",
        readiness.coverage_pct, stage, status
    )
}

/// Recomputes every derived status and rationale on the snapshot.
pub fn resolve_all(state: &mut Snapshot) {
    state.demand.status = demand_status(&state.demand);
    state.procurement.status = procurement_status(&state.procurement);
    state.logistics.status = logistics_status(&state.logistics);
    state.inventory.status = inventory_status(&state.inventory);
    state.readiness.status = readiness_status(
        state.readiness.coverage_pct,
        state.procurement.status,
        state.logistics.status,
    );

    state.demand.rationale = demand_rationale(&state.demand);
    state.procurement.rationale = procurement_rationale(&state.procurement);
    state.logistics.rationale = logistics_rationale(&state.logistics);
    state.inventory.rationale = inventory_rationale(&state.inventory);
    state.readiness.rationale = readiness_rationale(
        &state.readiness,
        state.procurement.status,
        state.logistics.status,
    );

    state.status_by_stage = Stage::ALL
        .iter()
        .map(|&stage| (stage, state.status_of(stage)))
        .collect();
    state.rationale_by_stage = Stage::ALL
        .iter()
        .map(|&stage| (stage, state.rationale_of(stage).to_string()))
        .collect();
    state.overall_status = worst(state.status_by_stage.values().copied());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn procurement(open: u32, late: u32, eta: f64) -> Procurement {
        Procurement {
            open_pos: open,
            late_pos: late,
            eta_days_mean: eta,
            target_eta_days: 7.0,
            status: StageStatus::Ok,
            rationale: String::new(),
            updated_at_tick: 0,
        }
    }

    fn logistics(on_time: f64, eta: f64) -> Logistics {
        Logistics {
            shipments_in_flight: 0,
            avg_eta_days: eta,
            on_time_pct: on_time,
            shipments: Vec::new(),
            status: StageStatus::Ok,
            rationale: String::new(),
            updated_at_tick: 0,
        }
    }

    fn inventory(value: f64) -> Inventory {
        Inventory {
            value_usd: value,
            turns: 5.0,
            spark: Vec::new(),
            baseline: 1_000_000.0,
            status: StageStatus::Ok,
            rationale: String::new(),
            updated_at_tick: 0,
        }
    }

    #[test]
    fn test_demand_thresholds() {
        assert_eq!(demand_status(&Demand::new(100, 85)), StageStatus::Ok);
        assert_eq!(demand_status(&Demand::new(100, 84)), StageStatus::Risk);
        assert_eq!(demand_status(&Demand::new(100, 65)), StageStatus::Risk);
        assert_eq!(demand_status(&Demand::new(100, 48)), StageStatus::Delayed);
        assert_eq!(demand_status(&Demand::new(100, 47)), StageStatus::Blocked);
    }

    #[test]
    fn test_procurement_thresholds() {
        assert_eq!(procurement_status(&procurement(20, 0, 8.5)), StageStatus::Ok);
        // No late POs but ETA between OK and Delayed lines stays OK
        assert_eq!(procurement_status(&procurement(20, 0, 9.0)), StageStatus::Ok);
        assert_eq!(procurement_status(&procurement(20, 0, 9.3)), StageStatus::Delayed);
        assert_eq!(procurement_status(&procurement(20, 2, 8.0)), StageStatus::Risk);
        assert_eq!(procurement_status(&procurement(20, 2, 9.5)), StageStatus::Delayed);
        assert_eq!(procurement_status(&procurement(20, 10, 7.0)), StageStatus::Blocked);
        assert_eq!(procurement_status(&procurement(20, 0, 12.5)), StageStatus::Blocked);
    }

    #[test]
    fn test_logistics_thresholds() {
        assert_eq!(logistics_status(&logistics(0.9, 8.0)), StageStatus::Ok);
        assert_eq!(logistics_status(&logistics(0.9, 11.5)), StageStatus::Risk);
        assert_eq!(logistics_status(&logistics(0.7, 8.0)), StageStatus::Risk);
        assert_eq!(logistics_status(&logistics(0.58, 8.0)), StageStatus::Delayed);
        assert_eq!(logistics_status(&logistics(0.5, 8.0)), StageStatus::Blocked);
        assert_eq!(logistics_status(&logistics(0.9, 15.5)), StageStatus::Blocked);
    }

    #[test]
    fn test_inventory_thresholds_are_symmetric() {
        assert_eq!(inventory_status(&inventory(1_100_000.0)), StageStatus::Ok);
        assert_eq!(inventory_status(&inventory(840_000.0)), StageStatus::Risk);
        assert_eq!(inventory_status(&inventory(1_160_000.0)), StageStatus::Risk);
        assert_eq!(inventory_status(&inventory(750_000.0)), StageStatus::Delayed);
        assert_eq!(inventory_status(&inventory(650_000.0)), StageStatus::Blocked);
        assert_eq!(inventory_status(&inventory(1_400_000.0)), StageStatus::Blocked);
    }

    #[test]
    fn test_readiness_mirrors_upstream_when_low() {
        use StageStatus::*;

        assert_eq!(readiness_status(90.0, Blocked, Blocked), Ok);
        assert_eq!(readiness_status(70.0, Blocked, Ok), Risk);
        assert_eq!(readiness_status(50.0, Ok, Ok), Delayed);
        assert_eq!(readiness_status(50.0, Risk, Delayed), Delayed);
        assert_eq!(readiness_status(50.0, Ok, Blocked), Blocked);
    }

    #[test]
    fn test_worst() {
        use StageStatus::*;

        assert_eq!(worst([Ok, Risk, Ok]), Risk);
        assert_eq!(worst([Delayed, Blocked, Risk]), Blocked);
        assert_eq!(worst(Vec::new()), Ok);
    }

    #[test]
    fn test_readiness_rationale_names_constraint() {
        let readiness = Readiness {
            coverage_pct: 42.0,
            trend: Vec::new(),
            status: StageStatus::Delayed,
            rationale: String::new(),
            updated_at_tick: 0,
        };
        let text = readiness_rationale(&readiness, StageStatus::Risk, StageStatus::Blocked);

        assert!(text.contains("Logistics"));
        assert!(text.contains("Blocked"));
    }
}
