//! SupplySim Core - Deterministic Supply-Chain Pipeline Simulator
//!
//! Models a five-stage pipeline and advances it one tick at a time:
//!
//! ```text
//!   Demand ──► Procurement ──► Logistics ──► Inventory
//!      └────────────┴──────────────┴─────────────┴──► Readiness (derived)
//! ```
//!
//! Every stage carries raw metrics, a threshold-derived status and a
//! rationale. The worst stage status is the overall status. Randomness comes
//! from an injected [`supplysim_env::EntropySource`], so a seed and a command
//! sequence fully determine every snapshot.
//!
//! [`SupplyChainEngine`] owns the state and publishes `Arc<Snapshot>` copies to
//! subscribers; [`EngineDriver`] runs it on a tokio timer.
//!
//! ```
//! use supplysim_core::{EngineConfig, ScenarioId, SupplyChainEngine};
//!
//! let mut engine = SupplyChainEngine::new(EngineConfig::new(4021));
//! engine.tick();
//! let alarm = engine.simulate_event(ScenarioId::PoCancellation).unwrap();
//! assert!(alarm.message.starts_with("PO cancellation:"));
//! assert_eq!(engine.snapshot().tick, 1);
//! ```

pub mod advance;
pub mod alarms;
pub mod driver;
pub mod engine;
pub mod export;
pub mod initial;
pub mod model;
pub mod profile;
pub mod scenarios;
pub mod status;

// Re-export key types for convenience
pub use driver::{EngineDriver, EngineHandle, Subscription};
pub use engine::{EngineConfig, Subscriber, SubscriptionId, SupplyChainEngine};
pub use export::{SessionEvent, SessionExport, SessionSummary};
pub use model::{
    Alarm, AlarmOrigin, DriverUpdate, Drivers, Severity, Snapshot, Stage, StageStatus, Volatility,
};
pub use profile::ProcessProfile;
pub use scenarios::{ScenarioId, ScenarioOutcome};
