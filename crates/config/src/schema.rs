use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusConfig {
    pub server: ServerConfig,
    pub channels: ChannelsConfig,
}

/// Listener settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind the HTTP/WebSocket listener to.
    pub bind: String,
    pub port: u16,
    /// Log the active session table every this many seconds; 0 disables.
    pub report_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".into(),
            port: 8088,
            report_interval_secs: 0,
        }
    }
}

/// Status channel settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelsConfig {
    /// Frames queued per channel before new pushes are dropped.
    pub outbound_capacity: usize,
}

impl Default for ChannelsConfig {
    fn default() -> Self {
        Self {
            outbound_capacity: 16,
        }
    }
}

impl ServerConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}
