//! EngineDriver - runs a `SupplyChainEngine` on a tokio timer.
//!
//! The engine moves into a single task that owns it outright. Timer ticks and
//! control commands are serialised through one `select!` loop, so a tick can
//! never interleave with a scenario or a reseed.
//!
//! ```text
//!   EngineHandle ──mpsc──► engine task ◄── interval (3 s)
//!        ▲                     │
//!        └──── oneshot ◄───────┤
//!                              └──► subscribers (Arc<Snapshot>)
//! ```

use crate::engine::{Subscriber, SubscriptionId, SupplyChainEngine};
use crate::model::{Alarm, DriverUpdate, Snapshot, Volatility};
use crate::scenarios::ScenarioId;
use std::sync::Arc;
use std::time::Duration;
use supplysim_env::{EntropySource, SimError};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info};

/// Depth of the control queue.
const COMMAND_BUFFER: usize = 64;

enum Command {
    Play,
    Pause,
    Toggle,
    Reset,
    SetSeed(f64, oneshot::Sender<bool>),
    SetVolatility(Volatility),
    UpdateDrivers(DriverUpdate),
    SimulateEvent(ScenarioId, oneshot::Sender<Option<Alarm>>),
    Acknowledge(String, oneshot::Sender<bool>),
    Subscribe(Subscriber, oneshot::Sender<Result<SubscriptionId, SimError>>),
    Unsubscribe(SubscriptionId),
    Snapshot(oneshot::Sender<Arc<Snapshot>>),
    Dispose(oneshot::Sender<()>),
}

/// Spawns engine tasks.
pub struct EngineDriver;

impl EngineDriver {
    /// Moves `engine` into a new task and returns a handle to it.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<R: EntropySource>(engine: SupplyChainEngine<R>) -> EngineHandle {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let period = engine.tick_interval();
        let task = tokio::spawn(run(engine, rx, period));
        EngineHandle {
            tx,
            task: Arc::new(std::sync::Mutex::new(Some(task))),
        }
    }
}

async fn run<R: EntropySource>(
    mut engine: SupplyChainEngine<R>,
    mut rx: mpsc::Receiver<Command>,
    period: Duration,
) {
    let mut timer = time::interval_at(Instant::now() + period, period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(period_ms = period.as_millis() as u64, seed = engine.seed(), "Engine driver started");

    loop {
        tokio::select! {
            _ = timer.tick() => {
                // Paused engines ignore the tick; the timer keeps firing
                engine.tick();
            }
            command = rx.recv() => match command {
                Some(command) => {
                    if !apply(&mut engine, command) {
                        break;
                    }
                }
                None => {
                    debug!("All engine handles dropped");
                    engine.dispose();
                    break;
                }
            }
        }
    }

    info!(tick = engine.snapshot().tick, "Engine driver stopped");
}

/// Applies one command. Returns false once the engine is disposed.
fn apply<R: EntropySource>(engine: &mut SupplyChainEngine<R>, command: Command) -> bool {
    // Reply send failures mean the caller stopped waiting
    match command {
        Command::Play => engine.play(),
        Command::Pause => engine.pause(),
        Command::Toggle => engine.toggle(),
        Command::Reset => engine.reset(),
        Command::SetSeed(value, reply) => {
            let _ = reply.send(engine.set_seed(value));
        }
        Command::SetVolatility(level) => engine.set_volatility(level),
        Command::UpdateDrivers(update) => engine.update_drivers(update),
        Command::SimulateEvent(scenario, reply) => {
            let _ = reply.send(engine.simulate_event(scenario));
        }
        Command::Acknowledge(id, reply) => {
            let _ = reply.send(engine.acknowledge_alarm(&id));
        }
        Command::Subscribe(callback, reply) => {
            let _ = reply.send(engine.subscribe(callback));
        }
        Command::Unsubscribe(id) => {
            engine.unsubscribe(id);
        }
        Command::Snapshot(reply) => {
            let _ = reply.send(engine.snapshot());
        }
        Command::Dispose(done) => {
            engine.dispose();
            let _ = done.send(());
            return false;
        }
    }
    true
}

/// Cloneable control surface for a running engine task.
///
/// Every call returns `Err(SimError::ChannelClosed)` once the task has
/// stopped.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<Command>,
    task: Arc<std::sync::Mutex<Option<JoinHandle<()>>>>,
}

impl EngineHandle {
    async fn send(&self, command: Command) -> Result<(), SimError> {
        self.tx.send(command).await.map_err(|_| SimError::ChannelClosed)
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, SimError> {
        let (reply, response) = oneshot::channel();
        self.send(make(reply)).await?;
        response.await.map_err(|_| SimError::ChannelClosed)
    }

    pub async fn play(&self) -> Result<(), SimError> {
        self.send(Command::Play).await
    }

    pub async fn pause(&self) -> Result<(), SimError> {
        self.send(Command::Pause).await
    }

    pub async fn toggle(&self) -> Result<(), SimError> {
        self.send(Command::Toggle).await
    }

    pub async fn reset(&self) -> Result<(), SimError> {
        self.send(Command::Reset).await
    }

    /// Reseeds the session. `Ok(false)` means the value was ignored.
    pub async fn set_seed(&self, value: f64) -> Result<bool, SimError> {
        self.request(|reply| Command::SetSeed(value, reply)).await
    }

    pub async fn set_volatility(&self, level: Volatility) -> Result<(), SimError> {
        self.send(Command::SetVolatility(level)).await
    }

    pub async fn update_drivers(&self, update: DriverUpdate) -> Result<(), SimError> {
        self.send(Command::UpdateDrivers(update)).await
    }

    /// Applies a scenario and returns its summary alarm.
    pub async fn simulate_event(&self, scenario: ScenarioId) -> Result<Option<Alarm>, SimError> {
        self.request(|reply| Command::SimulateEvent(scenario, reply)).await
    }

    /// Applies a scenario by name. Unknown names resolve to `Ok(None)`.
    pub async fn simulate_event_named(&self, name: &str) -> Result<Option<Alarm>, SimError> {
        match name.parse::<ScenarioId>() {
            Ok(scenario) => self.simulate_event(scenario).await,
            Err(e) => {
                tracing::warn!("{}", e);
                Ok(None)
            }
        }
    }

    pub async fn acknowledge_alarm(&self, id: impl Into<String>) -> Result<bool, SimError> {
        let id = id.into();
        self.request(|reply| Command::Acknowledge(id, reply)).await
    }

    /// Returns the most recently published snapshot.
    pub async fn snapshot(&self) -> Result<Arc<Snapshot>, SimError> {
        self.request(Command::Snapshot).await
    }

    /// Registers a callback. It runs on the engine task, so it must not block.
    pub async fn subscribe<F>(&self, callback: F) -> Result<Subscription, SimError>
    where
        F: FnMut(Arc<Snapshot>) + Send + 'static,
    {
        let callback: Subscriber = Box::new(callback);
        let id = self.request(|reply| Command::Subscribe(callback, reply)).await??;
        Ok(Subscription {
            id,
            tx: self.tx.clone(),
            detached: false,
        })
    }

    /// Registers a channel subscriber and returns its receiving end.
    ///
    /// The current snapshot is already queued when this returns. The
    /// receiver yields `None` once the engine is disposed.
    pub async fn subscribe_stream(
        &self,
    ) -> Result<(Subscription, mpsc::UnboundedReceiver<Arc<Snapshot>>), SimError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscription = self
            .subscribe(move |snapshot| {
                let _ = tx.send(snapshot);
            })
            .await?;
        Ok((subscription, rx))
    }

    /// Disposes the engine and waits for its task to finish.
    pub async fn dispose(&self) -> Result<(), SimError> {
        self.request(Command::Dispose).await?;
        let task = self.task.lock().ok().and_then(|mut task| task.take());
        if let Some(task) = task {
            let _ = task.await;
        }
        Ok(())
    }

    /// Returns true once the engine task has stopped accepting commands.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// A registered subscriber. Dropping it detaches the callback.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    tx: mpsc::Sender<Command>,
    detached: bool,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Detaches the subscriber and waits for the command to be queued.
    /// A stopped engine has nothing to detach from.
    pub async fn unsubscribe(mut self) {
        self.detached = true;
        let _ = self.tx.send(Command::Unsubscribe(self.id)).await;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if self.detached {
            return;
        }
        match self.tx.try_send(Command::Unsubscribe(self.id)) {
            Ok(()) | Err(mpsc::error::TrySendError::Closed(_)) => {}
            Err(mpsc::error::TrySendError::Full(command)) => {
                // Queue is busy; finish the send on the runtime if there is one
                if let Ok(runtime) = tokio::runtime::Handle::try_current() {
                    let tx = self.tx.clone();
                    runtime.spawn(async move {
                        let _ = tx.send(command).await;
                    });
                } else {
                    debug!(id = ?self.id, "Dropped subscription could not be detached");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineConfig;
    use supplysim_env::{ManualClock, SeededEntropy};

    fn spawn(seed: u64) -> EngineHandle {
        let engine = SupplyChainEngine::with_parts(
            EngineConfig::new(seed),
            SeededEntropy::new(seed),
            ManualClock::shared(),
        );
        EngineDriver::spawn(engine)
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_drives_ticks() {
        let handle = spawn(7);
        let (_subscription, mut rx) = handle.subscribe_stream().await.unwrap();

        assert_eq!(rx.recv().await.unwrap().tick, 0);
        assert_eq!(rx.recv().await.unwrap().tick, 1);
        assert_eq!(rx.recv().await.unwrap().tick, 2);

        handle.dispose().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_keeps_tick_count() {
        let handle = spawn(7);
        handle.pause().await.unwrap();

        time::sleep(Duration::from_secs(30)).await;

        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.tick, 0);
        assert!(!snapshot.is_running);

        handle.play().await.unwrap();
        time::sleep(Duration::from_millis(3_100)).await;
        assert!(handle.snapshot().await.unwrap().tick >= 1);

        handle.dispose().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_control_calls_round_trip() {
        let handle = spawn(4021);
        handle.pause().await.unwrap();

        let alarm = handle
            .simulate_event(ScenarioId::PoCancellation)
            .await
            .unwrap()
            .unwrap();
        assert!(alarm.message.starts_with("PO cancellation:"));
        assert!(handle.simulate_event_named("unknown").await.unwrap().is_none());

        assert!(handle.acknowledge_alarm(alarm.id.to_string()).await.unwrap());
        assert!(!handle.acknowledge_alarm(alarm.id.to_string()).await.unwrap());

        assert!(!handle.set_seed(f64::NAN).await.unwrap());
        assert!(handle.set_seed(12.0).await.unwrap());
        assert_eq!(handle.snapshot().await.unwrap().seed, 12);

        handle.dispose().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsubscribe_detaches_stream() {
        let handle = spawn(3);
        let (subscription, mut rx) = handle.subscribe_stream().await.unwrap();
        assert_eq!(rx.recv().await.unwrap().tick, 0);

        subscription.unsubscribe().await;
        // The engine dropped the sender, so the stream ends
        assert!(rx.recv().await.is_none());

        handle.dispose().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_subscription_detaches() {
        let handle = spawn(3);
        let (subscription, mut rx) = handle.subscribe_stream().await.unwrap();
        assert_eq!(rx.recv().await.unwrap().tick, 0);

        drop(subscription);
        assert!(rx.recv().await.is_none());

        handle.dispose().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_calls_after_dispose_fail() {
        let handle = spawn(1);
        let (_subscription, mut rx) = handle.subscribe_stream().await.unwrap();
        rx.recv().await.unwrap();

        handle.dispose().await.unwrap();

        assert!(handle.is_closed());
        assert!(rx.recv().await.is_none());
        assert_eq!(handle.play().await, Err(SimError::ChannelClosed));
        assert_eq!(handle.snapshot().await.err(), Some(SimError::ChannelClosed));
        assert_eq!(handle.dispose().await, Err(SimError::ChannelClosed));
    }
}
