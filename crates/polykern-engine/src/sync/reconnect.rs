//! Exponential reconnect backoff.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use polykern_core::error::{PolykernError, Result};

use crate::config::ReconnectSection;

/// Computes and awaits `min(initial * 2^n, max)` delays, `n` = waits since
/// the last reset.
#[derive(Debug, Clone)]
pub struct ReconnectManager {
    initial_delay: Duration,
    max_delay: Duration,
    current_delay: Duration,
    reconnect_count: u32,
}

impl ReconnectManager {
    /// A `max_delay` below `initial_delay` caps every wait at `max_delay`.
    pub fn new(initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            initial_delay,
            max_delay,
            current_delay: initial_delay.min(max_delay),
            reconnect_count: 0,
        }
    }

    pub fn from_config(cfg: &ReconnectSection) -> Self {
        Self::new(
            Duration::from_millis(cfg.initial_delay_ms),
            Duration::from_millis(cfg.max_delay_ms),
        )
    }

    /// Return the delay for this attempt and advance the sequence.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current_delay;
        self.reconnect_count = self.reconnect_count.saturating_add(1);
        self.current_delay = self
            .current_delay
            .checked_mul(2)
            .unwrap_or(self.max_delay)
            .min(self.max_delay);
        delay
    }

    /// Restart the sequence at `initial_delay`.
    pub fn reset(&mut self) {
        self.reconnect_count = 0;
        self.current_delay = self.initial_delay.min(self.max_delay);
    }

    /// Sleep for `next_delay()`, or return `Cancelled` as soon as `cancel` fires.
    pub async fn wait_with_context(&mut self, cancel: &CancellationToken) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(PolykernError::Cancelled);
        }
        let delay = self.next_delay();
        tracing::info!(
            delay_ms = delay.as_millis() as u64,
            attempt = self.reconnect_count,
            "waiting before reconnect"
        );
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(PolykernError::Cancelled),
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }

    /// Waits since the last reset.
    pub fn reconnect_count(&self) -> u32 {
        self.reconnect_count
    }

    /// The delay the next wait will use.
    pub fn current_delay(&self) -> Duration {
        self.current_delay
    }
}
