//! Error types for the simulator environment and control surface.

use thiserror::Error;

/// Errors surfaced by the simulator.
///
/// The engine absorbs malformed input by clamping or ignoring it, so only
/// lifecycle and parsing failures show up here.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SimError {
    /// The engine was disposed and accepts no further subscribers.
    #[error("Engine has been disposed")]
    Disposed,
    
    /// A scenario name outside the closed scenario set.
    #[error("Unknown scenario: {0}")]
    UnknownScenario(String),
    
    /// A volatility level other than low/medium/high.
    #[error("Unknown volatility level: {0}")]
    UnknownVolatility(String),
    
    /// A baseline process profile failed validation or parsing.
    #[error("Invalid process profile: {0}")]
    Profile(String),
    
    /// The engine task has stopped and its command channel is closed.
    #[error("Engine task is no longer running")]
    ChannelClosed,
}

impl SimError {
    /// Creates a profile error.
    pub fn profile(msg: impl Into<String>) -> Self {
        Self::Profile(msg.into())
    }
}
