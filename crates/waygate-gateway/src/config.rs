//! Gateway configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunable knobs for the gateway core.
///
/// Every field has a production default; the embedding system decides
/// where the values come from (file, env, flags). Tests shrink the
/// timing fields with the `with_*` builders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// How often agents are expected to heartbeat, seconds.
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,

    /// Heartbeat age past which a connection stops being ready, seconds.
    #[serde(default = "default_heartbeat_timeout")]
    pub heartbeat_timeout_secs: u64,

    /// How long a dropped agent's identity is reserved for reconnect,
    /// seconds.
    #[serde(default = "default_reconnect_grace")]
    pub reconnect_grace_secs: u64,

    /// How often the heartbeat reaper sweeps, seconds.
    #[serde(default = "default_reaper_sweep")]
    pub reaper_sweep_secs: u64,

    /// How long an attachment may sit silent before its `Register`
    /// frame, seconds.
    #[serde(default = "default_registration_timeout")]
    pub registration_timeout_secs: u64,

    /// Capacity of each agent's outbound frame queue.
    #[serde(default = "default_agent_queue_capacity")]
    pub agent_queue_capacity: usize,

    /// Capacity of each pack's request queue.
    #[serde(default = "default_pack_queue_capacity")]
    pub pack_queue_capacity: usize,

    /// Capacity of each per-request response fanout channel.
    #[serde(default = "default_fanout_capacity")]
    pub fanout_capacity: usize,

    /// Capacity of each broadcast subscriber's buffer.
    #[serde(default = "default_subscriber_capacity")]
    pub subscriber_capacity: usize,

    /// Default tool call timeout, seconds. Per-tool definitions may
    /// override it.
    #[serde(default = "default_tool_timeout")]
    pub tool_timeout_secs: u64,

    /// How long a dedupe entry absorbs retries, seconds.
    #[serde(default = "default_dedupe_ttl")]
    pub dedupe_ttl_secs: u64,

    /// How often expired dedupe entries are swept, seconds.
    #[serde(default = "default_dedupe_sweep")]
    pub dedupe_sweep_secs: u64,

    /// How many historical events `stream_events` replays when no cursor
    /// is given.
    #[serde(default = "default_replay_limit")]
    pub replay_limit: usize,
}

fn default_heartbeat_interval() -> u64 {
    30
}
fn default_heartbeat_timeout() -> u64 {
    90
}
fn default_reconnect_grace() -> u64 {
    300
}
fn default_reaper_sweep() -> u64 {
    10
}
fn default_registration_timeout() -> u64 {
    10
}
fn default_agent_queue_capacity() -> usize {
    16
}
fn default_pack_queue_capacity() -> usize {
    16
}
fn default_fanout_capacity() -> usize {
    64
}
fn default_subscriber_capacity() -> usize {
    256
}
fn default_tool_timeout() -> u64 {
    30
}
fn default_dedupe_ttl() -> u64 {
    60
}
fn default_dedupe_sweep() -> u64 {
    30
}
fn default_replay_limit() -> usize {
    100
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: default_heartbeat_interval(),
            heartbeat_timeout_secs: default_heartbeat_timeout(),
            reconnect_grace_secs: default_reconnect_grace(),
            reaper_sweep_secs: default_reaper_sweep(),
            registration_timeout_secs: default_registration_timeout(),
            agent_queue_capacity: default_agent_queue_capacity(),
            pack_queue_capacity: default_pack_queue_capacity(),
            fanout_capacity: default_fanout_capacity(),
            subscriber_capacity: default_subscriber_capacity(),
            tool_timeout_secs: default_tool_timeout(),
            dedupe_ttl_secs: default_dedupe_ttl(),
            dedupe_sweep_secs: default_dedupe_sweep(),
            replay_limit: default_replay_limit(),
        }
    }
}

impl GatewayConfig {
    /// Heartbeat timeout as a [`Duration`].
    #[must_use]
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout_secs)
    }

    /// Reconnect grace period as a [`Duration`].
    #[must_use]
    pub fn reconnect_grace(&self) -> Duration {
        Duration::from_secs(self.reconnect_grace_secs)
    }

    /// Reaper sweep interval as a [`Duration`].
    #[must_use]
    pub fn reaper_sweep(&self) -> Duration {
        Duration::from_secs(self.reaper_sweep_secs)
    }

    /// Registration deadline as a [`Duration`].
    #[must_use]
    pub fn registration_timeout(&self) -> Duration {
        Duration::from_secs(self.registration_timeout_secs)
    }

    /// Default tool timeout as a [`Duration`].
    #[must_use]
    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }

    /// Dedupe TTL as a [`Duration`].
    #[must_use]
    pub fn dedupe_ttl(&self) -> Duration {
        Duration::from_secs(self.dedupe_ttl_secs)
    }

    /// Dedupe sweep interval as a [`Duration`].
    #[must_use]
    pub fn dedupe_sweep(&self) -> Duration {
        Duration::from_secs(self.dedupe_sweep_secs)
    }

    /// Override the heartbeat timeout.
    #[must_use]
    pub fn with_heartbeat_timeout_secs(mut self, secs: u64) -> Self {
        self.heartbeat_timeout_secs = secs;
        self
    }

    /// Override the reconnect grace period.
    #[must_use]
    pub fn with_reconnect_grace_secs(mut self, secs: u64) -> Self {
        self.reconnect_grace_secs = secs;
        self
    }

    /// Override the reaper sweep interval.
    #[must_use]
    pub fn with_reaper_sweep_secs(mut self, secs: u64) -> Self {
        self.reaper_sweep_secs = secs;
        self
    }

    /// Override the dedupe TTL.
    #[must_use]
    pub fn with_dedupe_ttl_secs(mut self, secs: u64) -> Self {
        self.dedupe_ttl_secs = secs;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_values() {
        let config = GatewayConfig::default();
        assert_eq!(config.heartbeat_interval_secs, 30);
        assert_eq!(config.heartbeat_timeout_secs, 90);
        assert_eq!(config.reconnect_grace_secs, 300);
        assert_eq!(config.agent_queue_capacity, 16);
        assert_eq!(config.tool_timeout_secs, 30);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: GatewayConfig =
            serde_json::from_str(r#"{"heartbeat_timeout_secs": 5}"#).unwrap();
        assert_eq!(config.heartbeat_timeout_secs, 5);
        assert_eq!(config.reconnect_grace_secs, 300);
    }

    #[test]
    fn builders_override() {
        let config = GatewayConfig::default()
            .with_heartbeat_timeout_secs(1)
            .with_reconnect_grace_secs(2);
        assert_eq!(config.heartbeat_timeout(), Duration::from_secs(1));
        assert_eq!(config.reconnect_grace(), Duration::from_secs(2));
    }
}
