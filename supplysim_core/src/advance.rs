//! Advancement engine: one stochastic step of every stage.
//!
//! Each stage reads the previous tick's upstream values (captured in
//! [`Upstream`] before anything moves), so stage order never leaks into the
//! dynamics. Readiness is then re-derived from the fresh values and every
//! status is resolved again.

use crate::model::{
    Demand, Drivers, Inventory, Logistics, Procurement, Snapshot, StageMetrics, CORRIDOR_LAT,
    CORRIDOR_LON, ETA_DAYS_MAX, ETA_DAYS_MIN, INVENTORY_MAX_USD, INVENTORY_MIN_USD,
    LOGISTICS_ETA_MAX, LOGISTICS_ETA_MIN, MAX_DEMAND_TOTAL, MAX_OPEN_POS, MAX_SPEED_KPH,
    MIN_DEMAND_TOTAL, MIN_OPEN_POS, ON_TIME_MAX, ON_TIME_TICK_MIN, TURNS_MAX, TURNS_MIN,
};
use crate::status;
use supplysim_env::EntropySource;
use tracing::trace;

// Demand
const TOTAL_GROWTH_RATE: f64 = 0.012;
const TOTAL_NOISE_UNITS: f64 = 4.0;
const COMMIT_REVERSION: f64 = 0.18;
const COMMIT_NOISE: f64 = 0.035;
const COMMIT_GROWTH_BIAS: f64 = 0.02;
const OVERSHOOT_FLOOR: f64 = 0.85;

// Procurement
const OPEN_PO_STEP: f64 = 2.0;
const LATE_SHIFT_BASE: f64 = 0.2;
const LATE_SHIFT_DRIVER: f64 = 0.35;
const LATE_UP_BASE: f64 = 0.45;
const LATE_UP_DRIVER: f64 = 0.25;
const LATE_UP_SATURATION: f64 = 0.6;
const ETA_REVERSION: f64 = 0.1;
const ETA_NOISE: f64 = 0.55;
const ETA_DRIVER_BIAS: f64 = 0.25;

// Logistics
const ON_TIME_TARGET: f64 = 0.9;
const ON_TIME_REVERSION: f64 = 0.15;
const ON_TIME_NOISE: f64 = 0.035;
const ON_TIME_DRIVER_DRAG: f64 = 0.01;
const TRANSIT_BASE_DAYS: f64 = 2.0;
const TRANSIT_PER_SUPPLIER_DAY: f64 = 0.9;
const TRANSIT_REVERSION: f64 = 0.2;
const TRANSIT_NOISE: f64 = 0.45;
const CRUISE_SPEED_KPH: f64 = 65.0;
const SPEED_REVERSION: f64 = 0.1;
const SPEED_NOISE: f64 = 8.0;
const HEADING_NOISE: f64 = 14.0;
const HOURS_PER_TICK: f64 = 0.5;
const KM_PER_DEGREE: f64 = 111.0;

// Inventory
const INVENTORY_NOISE_USD: f64 = 18_000.0;
const DEMAND_PRESSURE_USD: f64 = 60_000.0;
const LATE_PRESSURE_USD: f64 = 90_000.0;
const INVENTORY_REVERSION: f64 = 0.08;
const TURNS_BASE: f64 = 5.2;
const TURNS_NOISE: f64 = 0.8;
const TURNS_ON_TIME_GAIN: f64 = 8.0;
const TURNS_SMOOTHING: f64 = 0.7;

// Readiness blend
const READINESS_DEMAND_WEIGHT: f64 = 0.6;
const READINESS_PROCUREMENT_WEIGHT: f64 = 0.2;
const READINESS_LOGISTICS_WEIGHT: f64 = 0.2;
const LATE_PENALTY: f64 = 1.5;
const ETA_PENALTY_DAYS: f64 = 6.0;

/// Upstream values as they stood at the end of the previous tick.
#[derive(Debug, Clone, Copy)]
struct Upstream {
    demand_ratio: f64,
    late_ratio: f64,
    supplier_eta_days: f64,
    on_time_pct: f64,
}

impl Upstream {
    fn capture(state: &Snapshot) -> Self {
        Self {
            demand_ratio: state.demand.ratio,
            late_ratio: state.procurement.late_ratio(),
            supplier_eta_days: state.procurement.eta_days_mean,
            on_time_pct: state.logistics.on_time_pct,
        }
    }
}

/// Advances the snapshot by one tick and re-resolves every status.
pub fn advance_tick(state: &mut Snapshot, rng: &mut dyn EntropySource) {
    let upstream = Upstream::capture(state);
    let v = state.volatility.factor();
    let drivers = state.drivers;

    state.tick += 1;
    let tick = state.tick;

    advance_demand(&mut state.demand, &drivers, v, rng);
    advance_procurement(&mut state.procurement, &drivers, v, rng);
    advance_logistics(&mut state.logistics, &drivers, &upstream, v, rng);
    advance_inventory(&mut state.inventory, &upstream, v, rng);

    state.demand.mark(tick);
    state.procurement.mark(tick);
    state.logistics.mark(tick);
    state.inventory.mark(tick);

    recompute_readiness(state);
    status::resolve_all(state);

    trace!(
        tick,
        ratio = state.demand.ratio,
        late = state.procurement.late_pos,
        on_time = state.logistics.on_time_pct,
        coverage = state.readiness.coverage_pct,
        "advanced"
    );
}

/// Demand: committed mean-reverts toward total, biased down by growth.
pub fn advance_demand(demand: &mut Demand, drivers: &Drivers, v: f64, rng: &mut dyn EntropySource) {
    let growth = drivers.demand_growth;

    let total = demand.total as f64;
    let drift = total * TOTAL_GROWTH_RATE * growth * rng.next_f64()
        + rng.signed_noise() * TOTAL_NOISE_UNITS * v;
    let total = (total + drift)
        .round()
        .clamp(MIN_DEMAND_TOTAL as f64, MAX_DEMAND_TOTAL as f64);
    demand.total = total as u64;

    let committed = demand.committed.min(demand.total) as f64;
    let shortfall = total - committed;
    let step = shortfall * COMMIT_REVERSION + rng.signed_noise() * total * COMMIT_NOISE * v
        - growth * total * COMMIT_GROWTH_BIAS;
    let mut next = committed + step;
    if next > total {
        // Reflect the overshoot back under total, never below the floor
        next = (2.0 * total - next).max(total * OVERSHOOT_FLOOR);
    }

    demand.set_committed(next.round() as i64);
}

/// Procurement: PO backlog and lead time random-walk.
pub fn advance_procurement(
    procurement: &mut Procurement,
    drivers: &Drivers,
    v: f64,
    rng: &mut dyn EntropySource,
) {
    let variance = drivers.lead_time_variance;

    let open = procurement.open_pos as f64 + rng.signed_noise() * OPEN_PO_STEP * v;
    procurement.open_pos = open
        .round()
        .clamp(MIN_OPEN_POS as f64, MAX_OPEN_POS as f64) as u32;

    let shift = (v.round() as u32).max(1);
    if rng.chance(LATE_SHIFT_BASE + LATE_SHIFT_DRIVER * variance) {
        let up = LATE_UP_BASE + LATE_UP_DRIVER * variance
            - LATE_UP_SATURATION * procurement.late_ratio();
        if rng.chance(up) {
            procurement.late_pos += shift;
        } else {
            procurement.late_pos = procurement.late_pos.saturating_sub(shift);
        }
    }

    let eta = procurement.eta_days_mean
        + (procurement.target_eta_days - procurement.eta_days_mean) * ETA_REVERSION
        + rng.signed_noise() * ETA_NOISE * v * (0.6 + variance)
        + variance * ETA_DRIVER_BIAS * v;
    procurement.eta_days_mean = eta.clamp(ETA_DAYS_MIN, ETA_DAYS_MAX);

    procurement.settle();
}

/// Logistics: on-time and transit drift plus shipment movement.
fn advance_logistics(
    logistics: &mut Logistics,
    drivers: &Drivers,
    upstream: &Upstream,
    v: f64,
    rng: &mut dyn EntropySource,
) {
    let noise = drivers.on_time_noise;

    let on_time = upstream.on_time_pct
        + (ON_TIME_TARGET - upstream.on_time_pct) * ON_TIME_REVERSION
        + rng.signed_noise() * ON_TIME_NOISE * v * (0.5 + noise)
        - noise * ON_TIME_DRIVER_DRAG;
    logistics.on_time_pct = on_time.clamp(ON_TIME_TICK_MIN, ON_TIME_MAX);

    let target = TRANSIT_BASE_DAYS + upstream.supplier_eta_days * TRANSIT_PER_SUPPLIER_DAY;
    let eta = logistics.avg_eta_days
        + (target - logistics.avg_eta_days) * TRANSIT_REVERSION
        + rng.signed_noise() * TRANSIT_NOISE * v;
    logistics.avg_eta_days = eta.clamp(LOGISTICS_ETA_MIN, LOGISTICS_ETA_MAX);

    for shipment in &mut logistics.shipments {
        let speed = shipment.speed_kph
            + (CRUISE_SPEED_KPH - shipment.speed_kph) * SPEED_REVERSION
            + rng.signed_noise() * SPEED_NOISE * v;
        shipment.speed_kph = speed.clamp(0.0, MAX_SPEED_KPH);
        shipment.heading_deg =
            (shipment.heading_deg + rng.signed_noise() * HEADING_NOISE * v).rem_euclid(360.0);
        move_within_corridor(
            &mut shipment.lat,
            &mut shipment.lon,
            &mut shipment.heading_deg,
            shipment.speed_kph * HOURS_PER_TICK,
        );
    }

    logistics.settle();
}

/// Moves a point `km` along its heading, reflecting off the corridor edges.
pub fn move_within_corridor(lat: &mut f64, lon: &mut f64, heading_deg: &mut f64, km: f64) {
    let heading = heading_deg.to_radians();
    *lat += km * heading.cos() / KM_PER_DEGREE;
    let lon_scale = (KM_PER_DEGREE * lat.to_radians().cos()).max(1.0);
    *lon += km * heading.sin() / lon_scale;

    if *lat < CORRIDOR_LAT.0 || *lat > CORRIDOR_LAT.1 {
        *lat = lat.clamp(CORRIDOR_LAT.0, CORRIDOR_LAT.1);
        *heading_deg = (180.0 - *heading_deg).rem_euclid(360.0);
    }
    if *lon < CORRIDOR_LON.0 || *lon > CORRIDOR_LON.1 {
        *lon = lon.clamp(CORRIDOR_LON.0, CORRIDOR_LON.1);
        *heading_deg = (360.0 - *heading_deg).rem_euclid(360.0);
    }
}

/// Inventory: value drains under demand shortfall and late POs.
fn advance_inventory(
    inventory: &mut Inventory,
    upstream: &Upstream,
    v: f64,
    rng: &mut dyn EntropySource,
) {
    let demand_pressure = (1.0 - upstream.demand_ratio).max(0.0);

    let value = inventory.value_usd + rng.signed_noise() * INVENTORY_NOISE_USD * v
        - demand_pressure * DEMAND_PRESSURE_USD
        - upstream.late_ratio * LATE_PRESSURE_USD
        + (inventory.baseline - inventory.value_usd) * INVENTORY_REVERSION;
    inventory.value_usd = value.clamp(INVENTORY_MIN_USD, INVENTORY_MAX_USD);

    let sampled = TURNS_BASE
        + rng.signed_noise() * TURNS_NOISE * v
        + (upstream.on_time_pct - 0.85) * TURNS_ON_TIME_GAIN;
    let turns = inventory.turns * TURNS_SMOOTHING + sampled * (1.0 - TURNS_SMOOTHING);
    inventory.turns = turns.clamp(TURNS_MIN, TURNS_MAX);

    inventory.settle();
}

/// Procurement health in `[0, 1]`: one minus late-PO and ETA-overage penalties.
pub fn procurement_health(procurement: &Procurement) -> f64 {
    let overage = (procurement.eta_days_mean - procurement.target_eta_days).max(0.0);
    (1.0 - (procurement.late_ratio() * LATE_PENALTY + overage / ETA_PENALTY_DAYS)).clamp(0.0, 1.0)
}

/// On-time performance normalized over the tick band to `[0, 1]`.
pub fn on_time_score(logistics: &Logistics) -> f64 {
    ((logistics.on_time_pct - ON_TIME_TICK_MIN) / (ON_TIME_MAX - ON_TIME_TICK_MIN)).clamp(0.0, 1.0)
}

/// Re-derives Readiness coverage from the current stage values.
pub fn recompute_readiness(state: &mut Snapshot) {
    let blend = READINESS_DEMAND_WEIGHT * state.demand.ratio
        + READINESS_PROCUREMENT_WEIGHT * procurement_health(&state.procurement)
        + READINESS_LOGISTICS_WEIGHT * on_time_score(&state.logistics);
    state.readiness.coverage_pct = (blend * 1000.0).round() / 10.0;
    state.readiness.settle();
    state.readiness.mark(state.tick);
}
