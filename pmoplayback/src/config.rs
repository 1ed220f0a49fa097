//! Engine-wide tunables.

use std::time::Duration;

/// Default frame count for a newly created [`crate::sink::Sink`].
pub const DEFAULT_SINK_BUFFER_FRAMES: usize = 8192;

/// How long the decoder task sleeps when it has nothing to do: no decode
/// head, or every sink is full.
pub const NOOP_DELAY: Duration = Duration::from_millis(5);

/// Engine-wide tunables, grouped so tests can shrink delays without touching
/// global constants.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub noop_delay: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            noop_delay: NOOP_DELAY,
        }
    }
}
