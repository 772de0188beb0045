//! Session-level properties checked across seeds, volatility levels and
//! random command sequences.

use proptest::prelude::*;
use std::sync::{Arc, Mutex};
use supplysim_core::alarms::{AMBIENT_ALARM_CAP, SCENARIO_ALARM_CAP};
use supplysim_core::model::{
    COVERAGE_MAX, COVERAGE_MIN, ETA_DAYS_MAX, ETA_DAYS_MIN, INVENTORY_MAX_USD, INVENTORY_MIN_USD,
    INVENTORY_SPARK_WINDOW, MIN_OPEN_POS, ON_TIME_FLOOR, ON_TIME_MAX, READINESS_TREND_WINDOW,
};
use supplysim_core::{
    AlarmOrigin, DriverUpdate, EngineConfig, ScenarioId, Snapshot, Stage, StageStatus,
    SupplyChainEngine, Volatility,
};
use supplysim_env::{ManualClock, SeededEntropy};

#[derive(Debug, Clone)]
enum Op {
    Tick,
    Event(ScenarioId),
    Drivers(f64, f64, f64),
    Volatility(Volatility),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        6 => Just(Op::Tick),
        2 => prop::sample::select(ScenarioId::all()).prop_map(Op::Event),
        1 => (-0.5..1.5f64, -0.5..1.5f64, -0.5..1.5f64).prop_map(|(a, b, c)| Op::Drivers(a, b, c)),
        1 => prop::sample::select(vec![Volatility::Low, Volatility::Medium, Volatility::High])
            .prop_map(Op::Volatility),
    ]
}

fn volatility() -> impl Strategy<Value = Volatility> {
    prop::sample::select(vec![Volatility::Low, Volatility::Medium, Volatility::High])
}

fn engine(seed: u64, volatility: Volatility) -> SupplyChainEngine {
    SupplyChainEngine::with_parts(
        EngineConfig::new(seed).with_volatility(volatility),
        SeededEntropy::new(seed),
        ManualClock::shared(),
    )
}

fn apply(engine: &mut SupplyChainEngine, op: &Op) {
    match op {
        Op::Tick => {
            engine.tick();
        }
        Op::Event(scenario) => {
            engine.simulate_event(*scenario);
        }
        Op::Drivers(a, b, c) => engine.update_drivers(DriverUpdate {
            demand_growth: Some(*a),
            lead_time_variance: Some(*b),
            on_time_noise: Some(*c),
        }),
        Op::Volatility(level) => engine.set_volatility(*level),
    }
}

fn check(s: &Snapshot) -> Result<(), TestCaseError> {
    prop_assert!(s.demand.committed <= s.demand.total);
    let ratio = s.demand.committed as f64 / s.demand.total as f64;
    prop_assert!((s.demand.ratio - ratio).abs() < 1e-12);

    prop_assert!(s.procurement.late_pos <= s.procurement.open_pos);
    prop_assert!(s.procurement.open_pos >= MIN_OPEN_POS);
    prop_assert!((ETA_DAYS_MIN..=ETA_DAYS_MAX).contains(&s.procurement.eta_days_mean));

    prop_assert!((ON_TIME_FLOOR..=ON_TIME_MAX).contains(&s.logistics.on_time_pct));
    prop_assert!(s.logistics.shipments_in_flight as usize <= s.logistics.shipments.len());

    prop_assert!((INVENTORY_MIN_USD..=INVENTORY_MAX_USD).contains(&s.inventory.value_usd));
    prop_assert!(s.inventory.spark.len() <= INVENTORY_SPARK_WINDOW);

    prop_assert!((COVERAGE_MIN..=COVERAGE_MAX).contains(&s.readiness.coverage_pct));
    prop_assert!(s.readiness.trend.len() <= READINESS_TREND_WINDOW);

    prop_assert!(s.alarms.len() <= SCENARIO_ALARM_CAP);
    let worst = s.status_by_stage.values().copied().max().unwrap_or(StageStatus::Ok);
    prop_assert_eq!(s.overall_status, worst);
    prop_assert_eq!(s.status_by_stage.len(), Stage::ALL.len());
    for stage in Stage::ALL {
        prop_assert_eq!(s.status_of(stage), s.status_by_stage[&stage]);
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 48, failure_persistence: None, .. ProptestConfig::default() })]

    #[test]
    fn prop_invariants_hold_after_every_mutation(
        seed in any::<u64>(),
        level in volatility(),
        ops in prop::collection::vec(op(), 1..80),
    ) {
        let mut engine = engine(seed, level);
        check(&engine.snapshot())?;
        for op in &ops {
            apply(&mut engine, op);
            check(&engine.snapshot())?;
        }
    }

    #[test]
    fn prop_ambient_only_alarms_respect_cap(seed in any::<u64>(), level in volatility()) {
        let mut engine = engine(seed, level);
        for _ in 0..400 {
            engine.tick();
            let snapshot = engine.snapshot();
            prop_assert!(snapshot.alarms.len() <= AMBIENT_ALARM_CAP);
            prop_assert!(snapshot.alarms.iter().all(|a| a.origin == AlarmOrigin::Ambient));
        }
    }

    #[test]
    fn prop_same_inputs_same_snapshots(
        seed in any::<u64>(),
        level in volatility(),
        ops in prop::collection::vec(op(), 1..40),
    ) {
        let mut a = engine(seed, level);
        let mut b = engine(seed, level);

        let seen_a = Arc::new(Mutex::new(Vec::new()));
        let seen_b = Arc::new(Mutex::new(Vec::new()));
        let sink_a = Arc::clone(&seen_a);
        let sink_b = Arc::clone(&seen_b);
        a.subscribe(move |s| sink_a.lock().unwrap().push(s)).unwrap();
        b.subscribe(move |s| sink_b.lock().unwrap().push(s)).unwrap();

        for op in &ops {
            apply(&mut a, op);
            apply(&mut b, op);
        }

        let seen_a = seen_a.lock().unwrap();
        let seen_b = seen_b.lock().unwrap();
        prop_assert_eq!(seen_a.len(), seen_b.len());
        for (x, y) in seen_a.iter().zip(seen_b.iter()) {
            prop_assert_eq!(x.as_ref(), y.as_ref());
        }
    }

    #[test]
    fn prop_reset_restores_initial(
        seed in any::<u64>(),
        level in volatility(),
        ops in prop::collection::vec(op(), 1..40),
    ) {
        let mut engine = engine(seed, level);
        let initial = engine.snapshot();

        for op in &ops {
            apply(&mut engine, op);
        }
        engine.pause();
        engine.reset();

        let mut after = (*engine.snapshot()).clone();
        prop_assert!(!after.is_running);
        prop_assert_eq!(after.volatility, level);
        after.is_running = initial.is_running;
        prop_assert_eq!(&after, initial.as_ref());
    }
}

#[test]
fn test_po_cancellation_example_seed_4021() {
    let mut engine = engine(4021, Volatility::Medium);
    let before = engine.snapshot();

    let alarm = engine.simulate_event(ScenarioId::PoCancellation).unwrap();
    let after = engine.snapshot();

    let cut = (before.demand.total as f64 * 0.07).round() as u64;
    assert_eq!(after.demand.committed, before.demand.committed.saturating_sub(cut));
    assert_eq!(
        after.procurement.late_pos,
        (before.procurement.late_pos + 2).min(after.procurement.open_pos)
    );
    assert!((after.logistics.on_time_pct - (before.logistics.on_time_pct - 0.25).max(0.4)).abs() < 1e-9);

    let hit = (before.inventory.value_usd * 0.18).max(52_000.0);
    let expected = (before.inventory.value_usd - hit).max(INVENTORY_MIN_USD);
    assert!((after.inventory.value_usd - expected).abs() < 1e-6);

    assert_eq!(after.alarms.len(), 1);
    assert!(alarm.message.starts_with("PO cancellation:"));
    let impacted = alarm.impacted_stages();
    for stage in ["Demand", "Procurement", "Logistics", "Inventory"] {
        assert!(impacted.iter().any(|s| s == stage), "missing {}", stage);
    }
}

#[test]
fn test_reset_after_reseed_uses_new_seed() {
    let mut engine = engine(1, Volatility::Medium);
    engine.set_seed(99.0);
    engine.tick();
    engine.reset();

    let fresh = self::engine(99, Volatility::Medium);
    assert_eq!(*engine.snapshot(), *fresh.snapshot());
}
