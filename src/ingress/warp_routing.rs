//! Raw TCP / IP routing settings.

use std::time::Duration;

use crate::config::schema::WarpRoutingJson;

/// Resolved warp routing settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarpRoutingConfig {
    /// Timeout for dialing a flow's destination.
    pub connect_timeout: Duration,
    /// TCP keep-alive on dialed flows; zero disables it. Only on/off is
    /// applied to the socket: keep-alive timing stays at the OS default, not this
    /// value, which is kept for serialization.
    pub tcp_keep_alive: Duration,
    /// Ceiling on concurrent flows; zero means unlimited.
    pub max_active_flows: u64,
}

impl Default for WarpRoutingConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            tcp_keep_alive: Duration::from_secs(30),
            max_active_flows: 0,
        }
    }
}

impl WarpRoutingConfig {
    /// Resolve a wire payload against the built-in defaults.
    pub fn from_json(raw: &WarpRoutingJson) -> Self {
        let defaults = Self::default();
        Self {
            connect_timeout: raw
                .connect_timeout
                .map(Duration::from_secs)
                .unwrap_or(defaults.connect_timeout),
            tcp_keep_alive: raw
                .tcp_keep_alive
                .map(Duration::from_secs)
                .unwrap_or(defaults.tcp_keep_alive),
            max_active_flows: raw.max_active_flows.unwrap_or(defaults.max_active_flows),
        }
    }

    /// Wire form. `maxActiveFlows` is omitted when unlimited.
    pub fn to_json(&self) -> WarpRoutingJson {
        WarpRoutingJson {
            connect_timeout: Some(self.connect_timeout.as_secs()),
            tcp_keep_alive: Some(self.tcp_keep_alive.as_secs()),
            max_active_flows: (self.max_active_flows > 0).then_some(self.max_active_flows),
        }
    }
}
