//! Engine configuration.

use std::time::Duration;

/// Tuning knobs for one tree instance.
///
/// All fields have working defaults; use the chainable setters to override.
#[derive(Debug, Clone)]
pub struct TreeOptions {
    /// Maximum asynchronous tasks in flight at once.
    pub async_concurrency_limit: usize,

    /// Driver tick rate; one dispatch attempt runs per tick.
    pub tick: Duration,

    /// Once the queue has been continuously non-idle for this long,
    /// synchronous dispatch starts yielding to the host between tasks.
    pub throttle_after: Duration,

    /// Cooldown inserted before the next synchronous task while throttled.
    pub cooldown: Duration,

    /// Delay between attempts when an operation finds its target busy.
    pub busy_retry_delay: Duration,

    /// Attempts before a busy target resolves to `BusyTimeout`.
    pub busy_retry_limit: u32,

    /// Opening a node also opens its children, recursively.
    pub auto_expand_on_open: bool,

    /// Closing a node also closes its open children, recursively.
    pub auto_collapse_on_close: bool,

    /// Every open keeps at most one branch expanded tree-wide.
    pub unique_branch: bool,

    /// Closing a node discards its loaded children (back to unloaded).
    pub empty_on_collapse: bool,
}

impl Default for TreeOptions {
    fn default() -> Self {
        Self {
            async_concurrency_limit: 2,
            tick: Duration::from_millis(25),
            throttle_after: Duration::from_millis(250),
            cooldown: Duration::from_millis(50),
            busy_retry_delay: Duration::from_millis(50),
            busy_retry_limit: 10,
            auto_expand_on_open: false,
            auto_collapse_on_close: false,
            unique_branch: false,
            empty_on_collapse: false,
        }
    }
}

impl TreeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the async concurrency cap (minimum 1).
    pub fn async_concurrency_limit(mut self, limit: usize) -> Self {
        self.async_concurrency_limit = limit.max(1);
        self
    }

    pub fn tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    pub fn throttle_after(mut self, after: Duration) -> Self {
        self.throttle_after = after;
        self
    }

    pub fn cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn busy_retry_delay(mut self, delay: Duration) -> Self {
        self.busy_retry_delay = delay;
        self
    }

    pub fn busy_retry_limit(mut self, limit: u32) -> Self {
        self.busy_retry_limit = limit;
        self
    }

    pub fn auto_expand_on_open(mut self) -> Self {
        self.auto_expand_on_open = true;
        self
    }

    pub fn auto_collapse_on_close(mut self) -> Self {
        self.auto_collapse_on_close = true;
        self
    }

    pub fn unique_branch(mut self) -> Self {
        self.unique_branch = true;
        self
    }

    pub fn empty_on_collapse(mut self) -> Self {
        self.empty_on_collapse = true;
        self
    }
}
