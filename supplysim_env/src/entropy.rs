//! Injectable randomness for the simulator.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// The single source of randomness for every simulation component.
///
/// Implementations must be deterministic: the same seed yields the same
/// sequence of `next_f64()` values, with no external entropy consulted.
pub trait EntropySource: Send + 'static {
    /// Returns the next value in `[0, 1)`.
    fn next_f64(&mut self) -> f64;
    
    /// Restarts the sequence from the given seed.
    fn reseed(&mut self, seed: u64);
    
    /// Returns a uniform value in `[-1, 1)`.
    fn signed_noise(&mut self) -> f64 {
        self.next_f64() * 2.0 - 1.0
    }
    
    /// Returns true with probability `p`.
    fn chance(&mut self, p: f64) -> bool {
        self.next_f64() < p
    }
    
    /// Returns a uniform index in `0..len`. `len` must be non-zero.
    fn pick_index(&mut self, len: usize) -> usize {
        ((self.next_f64() * len as f64) as usize).min(len.saturating_sub(1))
    }
    
    /// Returns a uniform value in `[lo, hi)`.
    fn range(&mut self, lo: f64, hi: f64) -> f64 {
        lo + (hi - lo) * self.next_f64()
    }
}

/// Production generator backed by a seeded ChaCha8 stream.
///
/// ChaCha8 output is specified bit-for-bit, so sequences reproduce across
/// platforms and toolchains.
#[derive(Debug, Clone)]
pub struct SeededEntropy {
    seed: u64,
    rng: ChaCha8Rng,
}

impl SeededEntropy {
    /// Creates a generator from a 64-bit seed.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }
    
    /// Returns the seed this generator was last seeded with.
    pub fn seed(&self) -> u64 {
        self.seed
    }
}

impl EntropySource for SeededEntropy {
    fn next_f64(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }
    
    fn reseed(&mut self, seed: u64) {
        *self = Self::new(seed);
    }
}

/// Replays a fixed script of values, cycling when exhausted.
///
/// Used by tests that need to force a particular branch of the engine.
#[derive(Debug, Clone)]
pub struct ScriptedEntropy {
    script: Vec<f64>,
    cursor: usize,
}

impl ScriptedEntropy {
    /// Largest value strictly below 1.0.
    const MAX_BELOW_ONE: f64 = 1.0 - f64::EPSILON;
    
    /// Creates a source replaying `script`. Values are clamped into `[0, 1)`.
    pub fn new(script: impl Into<Vec<f64>>) -> Self {
        let script = script
            .into()
            .into_iter()
            .map(|v| if v.is_finite() { v.clamp(0.0, Self::MAX_BELOW_ONE) } else { 0.0 })
            .collect();
        Self { script, cursor: 0 }
    }
    
    /// Creates a source that always returns `value`.
    pub fn constant(value: f64) -> Self {
        Self::new(vec![value])
    }
    
    /// Number of values drawn since the last reseed.
    pub fn draws(&self) -> usize {
        self.cursor
    }
}

impl EntropySource for ScriptedEntropy {
    fn next_f64(&mut self) -> f64 {
        if self.script.is_empty() {
            return 0.0;
        }
        let value = self.script[self.cursor % self.script.len()];
        self.cursor += 1;
        value
    }
    
    fn reseed(&mut self, _seed: u64) {
        self.cursor = 0;
    }
}
