use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use {vstatus_config::ChannelsConfig, vstatus_sessions::SessionRegistry};

/// Shared gateway runtime state, wrapped in Arc for use across async tasks.
pub struct GatewayState {
    /// The process-wide session registry, shared with the verification flow.
    pub registry: Arc<SessionRegistry>,
    pub channels: ChannelsConfig,
    /// Server version string.
    pub version: String,
    open_channels: AtomicUsize,
}

impl GatewayState {
    pub fn new(registry: Arc<SessionRegistry>, channels: ChannelsConfig) -> Arc<Self> {
        Arc::new(Self {
            registry,
            channels,
            version: env!("CARGO_PKG_VERSION").to_string(),
            open_channels: AtomicUsize::new(0),
        })
    }

    /// Queue depth for a new status socket; never zero.
    pub fn outbound_capacity(&self) -> usize {
        self.channels.outbound_capacity.max(1)
    }

    pub(crate) fn channel_opened(&self) {
        self.open_channels.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn channel_closed(&self) {
        self.open_channels.fetch_sub(1, Ordering::Relaxed);
    }

    /// Number of status sockets currently being served.
    pub fn open_channel_count(&self) -> usize {
        self.open_channels.load(Ordering::Relaxed)
    }
}
