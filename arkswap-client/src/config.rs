use std::time::Duration;

/// Tuning knobs for the swap engine.
#[derive(Debug, Clone)]
pub struct SwapConfig {
    /// Interval of the polling fallback subscription.
    pub poll_interval: Duration,
    /// Delay between attempts when fetching settlement details.
    pub settlement_delay: Duration,
    /// Attempts when fetching settlement details.
    pub settlement_max_attempts: u32,
    /// First reconnect delay after a dropped subscription.
    pub reconnect_base_delay: Duration,
    /// Reconnect delays back off exponentially up to this bound.
    pub max_reconnect_delay: Duration,
    /// After this many consecutive push-transport failures the manager falls
    /// back to polling.
    pub max_consecutive_ws_failures: u32,
    /// Fee rate for BTC-side claim transactions.
    pub fee_rate_sat_per_vb: u64,
}

impl Default for SwapConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            settlement_delay: Duration::from_millis(2000),
            settlement_max_attempts: 5,
            reconnect_base_delay: Duration::from_millis(1000),
            max_reconnect_delay: Duration::from_millis(60_000),
            max_consecutive_ws_failures: 3,
            fee_rate_sat_per_vb: 1,
        }
    }
}
