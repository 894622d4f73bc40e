use std::sync::Arc;

use {dashmap::DashMap, vstatus_protocol::StatusEvent};

use crate::token::SessionToken;

/// The push side of a status channel, as seen by sessions.
///
/// Every method must be callable from any thread without blocking on client
/// I/O; delivery is best-effort.
pub trait StatusNotifier: Send + Sync {
    /// Push `event` to the client. Failures are handled (and logged) by the
    /// implementor and never reported back to the caller.
    fn notify(&self, event: StatusEvent);

    /// Whether a live transport is currently bound.
    fn is_connected(&self) -> bool;

    /// Sever the notification path. Idempotent.
    fn close(&self);
}

/// Shared relation table: session token → status channel handle.
///
/// Cloning yields another handle to the same table.
#[derive(Clone, Default)]
pub struct ChannelLinks {
    inner: Arc<DashMap<SessionToken, Arc<dyn StatusNotifier>>>,
}

impl ChannelLinks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Relate `channel` to `token`, returning the channel it replaced.
    pub fn link(
        &self,
        token: SessionToken,
        channel: Arc<dyn StatusNotifier>,
    ) -> Option<Arc<dyn StatusNotifier>> {
        self.inner.insert(token, channel)
    }

    /// The channel currently related to `token`.
    ///
    /// The handle is cloned out so no map guard is held while the caller
    /// pushes through it.
    pub fn get(&self, token: &str) -> Option<Arc<dyn StatusNotifier>> {
        self.inner.get(token).map(|entry| Arc::clone(entry.value()))
    }

    pub fn contains(&self, token: &str) -> bool {
        self.inner.contains_key(token)
    }

    /// Drop the relation for `token` only if it still points at `channel`.
    ///
    /// A channel that has since been replaced by a newer one for the same
    /// token leaves the newer link alone.
    pub fn unlink(&self, token: &str, channel: &dyn StatusNotifier) -> bool {
        self.inner
            .remove_if(token, |_, linked| is_same_channel(linked, channel))
            .is_some()
    }

    /// Drop whatever relation exists for `token`.
    pub fn remove(&self, token: &str) -> Option<Arc<dyn StatusNotifier>> {
        self.inner.remove(token).map(|(_, channel)| channel)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl std::fmt::Debug for ChannelLinks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelLinks")
            .field("links", &self.inner.len())
            .finish()
    }
}

/// Identity comparison on the data pointer (vtables may differ across codegen units).
pub(crate) fn is_same_channel(
    linked: &Arc<dyn StatusNotifier>,
    channel: &dyn StatusNotifier,
) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(linked), channel)
}
