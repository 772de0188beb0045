//! SupplyChainEngine - owns the canonical session state and publishes it.
//!
//! The engine is a plain synchronous object with exactly one mutator (`&mut
//! self`). Every effective mutation ends in [`SupplyChainEngine::publish`],
//! which clones the aggregate into a fresh `Arc<Snapshot>` and hands it to
//! each subscriber in registration order. Subscribers therefore never alias
//! live state and can read without a lock.
//!
//! Timer-driven operation lives in [`crate::driver`]; this type never spawns
//! anything on its own.

use crate::advance;
use crate::alarms::{self, AlarmIds, AMBIENT_ALARM_CAP, SCENARIO_ALARM_CAP};
use crate::initial::initial_snapshot;
use crate::model::{Alarm, DriverUpdate, Snapshot, Volatility};
use crate::profile::ProcessProfile;
use crate::scenarios::{self, ScenarioId};
use std::sync::Arc;
use std::time::Duration;
use supplysim_env::{Clock, EntropySource, SeededEntropy, SimError, SystemClock};
use tracing::{debug, info, warn};

/// Callback invoked with every published snapshot.
pub type Subscriber = Box<dyn FnMut(Arc<Snapshot>) + Send>;

/// Identifies a registered subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

/// Configuration for a simulation session.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Master seed for determinism
    pub seed: u64,

    /// Noise scale applied to every tick
    pub volatility: Volatility,

    /// Optional baseline used only when (re)building the session
    pub profile: Option<ProcessProfile>,

    /// Timer period when driven by `EngineDriver`
    pub tick_interval: Duration,

    /// Whether the session starts playing
    pub start_running: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            volatility: Volatility::Medium,
            profile: None,
            tick_interval: Duration::from_secs(3),
            start_running: true,
        }
    }
}

impl EngineConfig {
    /// Creates a configuration for the given seed.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            ..Default::default()
        }
    }

    /// Sets the volatility level.
    pub fn with_volatility(mut self, volatility: Volatility) -> Self {
        self.volatility = volatility;
        self
    }

    /// Sets the baseline process profile.
    pub fn with_profile(mut self, profile: ProcessProfile) -> Self {
        self.profile = Some(profile);
        self
    }

    /// Sets the timer period.
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Sets whether the session starts playing.
    pub fn with_running(mut self, running: bool) -> Self {
        self.start_running = running;
        self
    }
}

/// The snapshot publisher and single writer of session state.
pub struct SupplyChainEngine<R: EntropySource = SeededEntropy> {
    /// Seed the current session was built from
    seed: u64,

    volatility: Volatility,

    /// Level the session was constructed with; `reset()` restores it
    initial_volatility: Volatility,

    profile: Option<ProcessProfile>,

    tick_interval: Duration,

    rng: R,

    clock: Arc<dyn Clock>,

    /// Canonical mutable state
    state: Snapshot,

    /// Last copy handed out
    published: Arc<Snapshot>,

    /// Lives for the whole engine so ids stay unique across rebuilds
    alarm_ids: AlarmIds,

    subscribers: Vec<(SubscriptionId, Subscriber)>,

    next_subscription: u64,

    disposed: bool,
}

impl SupplyChainEngine<SeededEntropy> {
    /// Creates an engine with the production generator and wall clock.
    pub fn new(config: EngineConfig) -> Self {
        let rng = SeededEntropy::new(config.seed);
        Self::with_parts(config, rng, Arc::new(SystemClock))
    }
}

impl<R: EntropySource> SupplyChainEngine<R> {
    /// Creates an engine with an injected generator and clock.
    ///
    /// The generator is reseeded from `config.seed` before use.
    pub fn with_parts(config: EngineConfig, mut rng: R, clock: Arc<dyn Clock>) -> Self {
        rng.reseed(config.seed);
        let mut state = initial_snapshot(
            config.seed,
            config.volatility,
            config.profile.as_ref(),
            &mut rng,
            clock.now_ms(),
        );
        state.is_running = config.start_running;

        info!(
            seed = config.seed,
            volatility = %config.volatility,
            overall = %state.overall_status,
            "Supply-chain session created"
        );

        Self {
            seed: config.seed,
            volatility: config.volatility,
            initial_volatility: config.volatility,
            profile: config.profile,
            tick_interval: config.tick_interval,
            rng,
            clock,
            published: Arc::new(state.clone()),
            state,
            alarm_ids: AlarmIds::new(config.seed),
            subscribers: Vec::new(),
            next_subscription: 0,
            disposed: false,
        }
    }

    // =========================================================================
    // READERS
    // =========================================================================

    /// Returns the most recently published snapshot.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.published)
    }

    /// Returns the seed of the current session.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Returns the timer period.
    pub fn tick_interval(&self) -> Duration {
        self.tick_interval
    }

    /// Returns true while ticks take effect.
    pub fn is_running(&self) -> bool {
        self.state.is_running
    }

    /// Returns true once `dispose()` has been called.
    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Returns the number of registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    // =========================================================================
    // SUBSCRIPTIONS
    // =========================================================================

    /// Registers a subscriber and immediately replays the current snapshot.
    ///
    /// Returns `Err(SimError::Disposed)` after `dispose()`.
    pub fn subscribe<F>(&mut self, mut callback: F) -> Result<SubscriptionId, SimError>
    where
        F: FnMut(Arc<Snapshot>) + Send + 'static,
    {
        if self.disposed {
            warn!("Subscribe rejected: engine disposed");
            return Err(SimError::Disposed);
        }

        self.next_subscription += 1;
        let id = SubscriptionId(self.next_subscription);
        callback(self.snapshot());
        self.subscribers.push((id, Box::new(callback)));

        debug!(subscribers = self.subscribers.len(), "Subscriber registered");
        Ok(id)
    }

    /// Removes a subscriber. Returns false for unknown ids.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sid, _)| *sid != id);
        self.subscribers.len() != before
    }

    // =========================================================================
    // LIFECYCLE
    // =========================================================================

    /// Starts ticking. Notifies only if the state changed.
    pub fn play(&mut self) {
        self.set_running(true);
    }

    /// Suspends tick effects. Notifies only if the state changed.
    pub fn pause(&mut self) {
        self.set_running(false);
    }

    /// Flips the running flag.
    pub fn toggle(&mut self) {
        let running = !self.state.is_running;
        self.set_running(running);
    }

    fn set_running(&mut self, running: bool) {
        if self.disposed || self.state.is_running == running {
            return;
        }
        self.state.is_running = running;
        info!(running, tick = self.state.tick, "Run state changed");
        self.publish();
    }

    /// Advances one tick if running. Returns true if the tick took effect.
    ///
    /// While paused the tick is a no-op, so resuming needs no catch-up.
    pub fn tick(&mut self) -> bool {
        if self.disposed || !self.state.is_running {
            return false;
        }

        advance::advance_tick(&mut self.state, &mut self.rng);

        let now = self.clock.now_ms();
        if let Some(alarm) = alarms::ambient_alarm(&self.state, &mut self.rng, &mut self.alarm_ids, now) {
            debug!(stage = %alarm.stage, severity = %alarm.severity, "{}", alarm.message);
            alarms::push_alarm(&mut self.state.alarms, alarm, AMBIENT_ALARM_CAP);
        }

        debug!(
            tick = self.state.tick,
            overall = %self.state.overall_status,
            coverage = self.state.readiness.coverage_pct,
            "Tick"
        );
        self.publish();
        true
    }

    /// Rebuilds the session from its seed and construction volatility,
    /// keeping the running flag.
    pub fn reset(&mut self) {
        if self.disposed {
            return;
        }
        info!(seed = self.seed, "Resetting session");
        self.volatility = self.initial_volatility;
        self.rebuild();
        self.publish();
    }

    /// Rebuilds the session from a new seed.
    ///
    /// Non-finite values are ignored and the current seed is kept. Finite
    /// values are truncated toward zero and reinterpreted as `u64`, so
    /// negative seeds are valid and distinct.
    pub fn set_seed(&mut self, value: f64) -> bool {
        if self.disposed {
            return false;
        }
        if !value.is_finite() {
            warn!(value, seed = self.seed, "Ignoring non-finite seed");
            return false;
        }

        self.seed = value.trunc() as i64 as u64;
        info!(seed = self.seed, "Reseeding session");
        self.rebuild();
        self.publish();
        true
    }

    /// Changes the noise scale without rebuilding.
    pub fn set_volatility(&mut self, volatility: Volatility) {
        if self.disposed || self.volatility == volatility {
            return;
        }
        self.volatility = volatility;
        self.state.volatility = volatility;
        info!(volatility = %volatility, "Volatility changed");
        self.publish();
    }

    /// Merges a partial driver update, clamping each value into `[0, 1]`.
    pub fn update_drivers(&mut self, update: DriverUpdate) {
        if self.disposed {
            return;
        }
        if self.state.drivers.merge(&update) {
            debug!(drivers = ?self.state.drivers, "Drivers updated");
            self.publish();
        }
    }

    /// Applies a scenario and returns the summary alarm it emitted.
    pub fn simulate_event(&mut self, scenario: ScenarioId) -> Option<Alarm> {
        if self.disposed {
            return None;
        }

        let outcome = scenarios::apply_scenario(&mut self.state, scenario, &mut self.rng);
        let alarm = scenarios::scenario_alarm(
            &self.state,
            &outcome,
            &mut self.alarm_ids,
            self.clock.now_ms(),
        );
        info!(
            scenario = %scenario,
            severity = %alarm.severity,
            impacted = outcome.impacted.len(),
            "{}",
            alarm.message
        );

        alarms::push_alarm(&mut self.state.alarms, alarm.clone(), SCENARIO_ALARM_CAP);
        self.publish();
        Some(alarm)
    }

    /// Applies a scenario by name. Unrecognised names are a no-op.
    pub fn simulate_event_named(&mut self, name: &str) -> Option<Alarm> {
        match name.parse::<ScenarioId>() {
            Ok(scenario) => self.simulate_event(scenario),
            Err(e) => {
                warn!("{}", e);
                None
            }
        }
    }

    /// Removes an alarm by id. Unknown ids are a no-op.
    pub fn acknowledge_alarm(&mut self, id: &str) -> bool {
        if self.disposed {
            return false;
        }
        let removed = alarms::acknowledge(&mut self.state.alarms, id);
        if removed {
            debug!(id, "Alarm acknowledged");
            self.publish();
        }
        removed
    }

    /// Stops the session for good and releases every subscriber.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.state.is_running = false;
        self.subscribers.clear();
        info!(seed = self.seed, tick = self.state.tick, "Session disposed");
    }

    // =========================================================================
    // INTERNALS
    // =========================================================================

    fn rebuild(&mut self) {
        let running = self.state.is_running;
        self.rng.reseed(self.seed);
        self.state = initial_snapshot(
            self.seed,
            self.volatility,
            self.profile.as_ref(),
            &mut self.rng,
            self.clock.now_ms(),
        );
        self.state.is_running = running;
    }

    /// Clones the canonical state and fans it out to every subscriber.
    fn publish(&mut self) {
        self.state.last_updated_at = self.clock.now_ms();
        let snapshot = Arc::new(self.state.clone());
        self.published = Arc::clone(&snapshot);
        for (_, subscriber) in &mut self.subscribers {
            subscriber(Arc::clone(&snapshot));
        }
    }
}
