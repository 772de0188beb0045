//! Builds the starting snapshot of a session.

use crate::model::{
    Demand, Drivers, Inventory, Logistics, Procurement, Readiness, Shipment, Snapshot,
    StageMetrics, StageStatus, Volatility, CORRIDOR_LAT, CORRIDOR_LON, MAX_SHIPMENTS,
};
use crate::profile::ProcessProfile;
use crate::{advance, status};
use std::collections::BTreeMap;
use supplysim_env::EntropySource;

/// Corridor lanes, assigned to shipments in order.
const LANES: [&str; MAX_SHIPMENTS] = [
    "Long Beach → Dallas",
    "Oakland → Phoenix",
    "Los Angeles → Houston",
    "San Diego → El Paso",
    "Tucson → San Antonio",
    "Las Vegas → Albuquerque",
    "Fresno → Oklahoma City",
    "Bakersfield → Austin",
    "Riverside → Tulsa",
    "Yuma → Lubbock",
    "Ontario → Shreveport",
    "Flagstaff → Fort Worth",
];

/// Jitters the default profile when the caller did not supply one.
fn jittered_default(rng: &mut dyn EntropySource) -> ProcessProfile {
    let base = ProcessProfile::default();
    let open_pos = base.open_pos + (rng.next_f64() * 8.0) as u32;
    ProcessProfile {
        demand_total: base.demand_total + (rng.next_f64() * 400.0).round() as u64,
        committed_ratio: rng.range(0.84, 0.94),
        open_pos,
        late_pos: ((rng.next_f64() * 3.0) as u32).min(open_pos),
        eta_days_mean: rng.range(6.6, 8.1),
        target_eta_days: base.target_eta_days,
        on_time_pct: rng.range(0.86, 0.94),
        avg_eta_days: rng.range(7.6, 9.4),
        inventory_value_usd: base.inventory_value_usd * rng.range(0.95, 1.05),
        turns: rng.range(4.8, 6.0),
        shipment_count: base.shipment_count,
    }
}

fn spawn_shipments(count: usize, rng: &mut dyn EntropySource) -> Vec<Shipment> {
    (0..count.min(MAX_SHIPMENTS))
        .map(|i| Shipment {
            id: format!("SHP-{}", 101 + i),
            lat: rng.range(CORRIDOR_LAT.0 + 0.5, CORRIDOR_LAT.1 - 0.5),
            lon: rng.range(CORRIDOR_LON.0 + 1.0, CORRIDOR_LON.1 - 1.0),
            speed_kph: rng.range(45.0, 90.0),
            heading_deg: rng.range(70.0, 110.0),
            label: LANES[i].to_string(),
        })
        .collect()
}

/// Creates the tick-0 snapshot for a session.
///
/// Draw order from `rng` is fixed, so the same seed always produces the
/// same initial snapshot.
pub fn initial_snapshot(
    seed: u64,
    volatility: Volatility,
    profile: Option<&ProcessProfile>,
    rng: &mut dyn EntropySource,
    now_ms: u64,
) -> Snapshot {
    let baseline = match profile {
        Some(profile) => profile.clone(),
        None => jittered_default(rng),
    };

    let committed = (baseline.demand_total as f64 * baseline.committed_ratio).round() as u64;
    let demand = Demand::new(baseline.demand_total, committed);

    let mut procurement = Procurement {
        open_pos: baseline.open_pos,
        late_pos: baseline.late_pos,
        eta_days_mean: baseline.eta_days_mean,
        target_eta_days: baseline.target_eta_days,
        status: StageStatus::Ok,
        rationale: String::new(),
        updated_at_tick: 0,
    };
    procurement.settle();

    let mut logistics = Logistics {
        shipments_in_flight: 0,
        avg_eta_days: baseline.avg_eta_days,
        on_time_pct: baseline.on_time_pct,
        shipments: spawn_shipments(baseline.shipment_count, rng),
        status: StageStatus::Ok,
        rationale: String::new(),
        updated_at_tick: 0,
    };
    logistics.settle();

    let mut inventory = Inventory {
        value_usd: baseline.inventory_value_usd,
        turns: baseline.turns,
        spark: Vec::new(),
        baseline: baseline.inventory_value_usd,
        status: StageStatus::Ok,
        rationale: String::new(),
        updated_at_tick: 0,
    };
    inventory.settle();

    let mut state = Snapshot {
        tick: 0,
        seed,
        volatility,
        is_running: false,
        demand,
        procurement,
        logistics,
        inventory,
        readiness: Readiness {
            coverage_pct: 0.0,
            trend: Vec::new(),
            status: StageStatus::Ok,
            rationale: String::new(),
            updated_at_tick: 0,
        },
        status_by_stage: BTreeMap::new(),
        rationale_by_stage: BTreeMap::new(),
        overall_status: StageStatus::Ok,
        alarms: Vec::new(),
        drivers: Drivers::default(),
        last_updated_at: now_ms,
        process_profile: profile.cloned(),
    };

    advance::recompute_readiness(&mut state);
    status::resolve_all(&mut state);
    state
}
