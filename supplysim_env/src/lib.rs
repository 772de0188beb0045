//! SupplySim Environment Abstraction Layer
//!
//! This crate isolates every source of non-determinism the simulator touches:
//! - Randomness (`EntropySource`)
//! - Wall-clock time (`Clock`)
//!
//! The simulation core only ever talks to these traits, so a whole session
//! becomes reproducible from its 64-bit seed and a virtual clock.
//!
//! # Example
//!
//! ```
//! use supplysim_env::{EntropySource, SeededEntropy};
//!
//! let mut a = SeededEntropy::new(4021);
//! let mut b = SeededEntropy::new(4021);
//! assert_eq!(a.next_f64().to_bits(), b.next_f64().to_bits());
//! ```

mod clock;
mod entropy;
mod error;

pub use clock::{Clock, ManualClock, SystemClock, SIM_EPOCH_MS};
pub use entropy::{EntropySource, ScriptedEntropy, SeededEntropy};
pub use error::SimError;
