//! Config tree settings.

/// Settings for a `ConfigTree`.
#[derive(Debug, Clone)]
pub struct TreeConfig {
    /// Number of recent events kept for inspection (0 = none).
    pub event_history: usize,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            event_history: 1024,
        }
    }
}

impl TreeConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of recent events kept.
    #[must_use]
    pub const fn event_history(mut self, size: usize) -> Self {
        self.event_history = size;
        self
    }
}
