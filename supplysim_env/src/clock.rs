//! Time sources for alarm timestamps and snapshot freshness.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Virtual time 0 maps to 2024-01-01 00:00:00 UTC.
pub const SIM_EPOCH_MS: u64 = 1_704_067_200_000;

/// Wall-clock abstraction.
///
/// Timestamps never feed back into the simulation itself; they are only
/// stamped onto alarms and snapshots. Tests that compare snapshots
/// byte-for-byte use a [`ManualClock`].
pub trait Clock: Send + Sync + 'static {
    /// Returns milliseconds since the UNIX epoch.
    fn now_ms(&self) -> u64;
}

/// Production clock backed by the system time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// Virtual clock that only moves when told to.
///
/// Clones share the same underlying time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    /// Milliseconds elapsed since `SIM_EPOCH_MS`
    elapsed_ms: Arc<AtomicU64>,
}

impl ManualClock {
    /// Creates a clock at the simulation epoch.
    pub fn new() -> Self {
        Self {
            elapsed_ms: Arc::new(AtomicU64::new(0)),
        }
    }
    
    /// Creates an Arc-wrapped clock for sharing with an engine.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
    
    /// Advances virtual time by the given duration.
    pub fn advance(&self, duration: Duration) {
        self.elapsed_ms
            .fetch_add(duration.as_millis() as u64, Ordering::SeqCst);
    }
    
    /// Returns the virtual time elapsed since the epoch.
    pub fn elapsed(&self) -> Duration {
        Duration::from_millis(self.elapsed_ms.load(Ordering::SeqCst))
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        SIM_EPOCH_MS + self.elapsed_ms.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    
    #[test]
    fn test_manual_clock_time() {
        let clock = ManualClock::new();
        assert_eq!(clock.now_ms(), SIM_EPOCH_MS);
        
        clock.advance(Duration::from_secs(3));
        assert_eq!(clock.now_ms(), SIM_EPOCH_MS + 3_000);
        
        clock.advance(Duration::from_millis(500));
        assert_eq!(clock.elapsed(), Duration::from_millis(3_500));
    }
    
    #[test]
    fn test_manual_clock_clone_shares_time() {
        let clock1 = ManualClock::new();
        let clock2 = clock1.clone();
        
        clock1.advance(Duration::from_secs(5));
        
        assert_eq!(clock1.now_ms(), clock2.now_ms());
    }
    
    #[test]
    fn test_system_clock_after_epoch() {
        assert!(SystemClock.now_ms() > SIM_EPOCH_MS);
    }
}
