use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use {
    tokio::sync::mpsc::{self, error::TrySendError},
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

use {
    vstatus_protocol::{NOT_SUPPORTED, StatusEvent},
    vstatus_sessions::{AttachOutcome, SessionRegistry, SessionToken, StatusNotifier},
};

/// Outbound half of a status socket: text frames queued for its write loop.
pub type Transport = mpsc::Sender<String>;

/// One live status push connection, bound to a single session token.
///
/// Pushes are queued with `try_send` so a slow client never stalls the
/// thread driving the session. When the write loop has gone away the channel
/// degrades to disconnected instead of reporting an error.
pub struct StatusChannel {
    token: SessionToken,
    transport: Mutex<Option<Transport>>,
    /// Fired on close; tears down the socket's read and write loops.
    shutdown: CancellationToken,
    registry: Weak<SessionRegistry>,
}

impl StatusChannel {
    /// Bind `transport` to `token` and relate the channel to its session.
    ///
    /// An unknown token is logged and leaves the channel open and idle; the
    /// registry keeps it pending until the session-creating flow claims it.
    pub fn open(
        transport: Transport,
        token: SessionToken,
        registry: &Arc<SessionRegistry>,
    ) -> Arc<Self> {
        let channel = Arc::new(Self {
            token,
            transport: Mutex::new(Some(transport)),
            shutdown: CancellationToken::new(),
            registry: Arc::downgrade(registry),
        });
        info!(token = %channel.token, "status channel connected");

        match registry.attach_channel(&channel.token, channel.clone()) {
            AttachOutcome::Attached => {
                debug!(token = %channel.token, "status channel attached to session");
            },
            AttachOutcome::Pending => {
                warn!(
                    token = %channel.token,
                    "status channel opened before its session was registered"
                );
            },
        }
        channel
    }

    /// A channel with no transport and no registry, as if never opened.
    #[cfg(test)]
    fn unbound(token: SessionToken) -> Self {
        Self {
            token,
            transport: Mutex::new(None),
            shutdown: CancellationToken::new(),
            registry: Weak::new(),
        }
    }

    pub fn token(&self) -> &SessionToken {
        &self.token
    }

    /// Cancellation token fired when the channel closes.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.lock_transport()
            .as_ref()
            .is_some_and(|tx| !tx.is_closed())
    }

    /// Push `event` to the client. Never blocks and never fails the caller.
    pub fn send(&self, event: StatusEvent) {
        self.push(event.as_str());
    }

    /// Handle a client-originated frame. The channel is push-only: the
    /// content is logged and answered with `NOT SUPPORTED`.
    pub fn on_message(&self, text: &str) {
        info!(token = %self.token, message = text, "received message from client");
        if self.is_connected() {
            self.push(NOT_SUPPORTED);
        }
    }

    /// Sever the notification path. Idempotent; the session is unaffected.
    pub fn close(&self) {
        let had_transport = self.lock_transport().take().is_some();
        self.shutdown.cancel();
        self.detach();
        if had_transport {
            info!(token = %self.token, "status channel closed");
        }
    }

    fn push(&self, frame: &'static str) {
        let disconnected = {
            let mut transport = self.lock_transport();
            match transport.as_ref().map(|tx| tx.try_send(frame.to_string())) {
                None => {
                    warn!(token = %self.token, frame, "status push with no socket attached");
                    false
                },
                Some(Ok(())) => {
                    debug!(token = %self.token, frame, "status pushed");
                    false
                },
                Some(Err(TrySendError::Full(_))) => {
                    warn!(token = %self.token, frame, "status socket backlogged, dropping push");
                    false
                },
                Some(Err(TrySendError::Closed(_))) => {
                    transport.take();
                    true
                },
            }
        };

        if disconnected {
            warn!(token = %self.token, frame, "status socket gone, channel now disconnected");
            self.shutdown.cancel();
            self.detach();
        }
    }

    fn detach(&self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.detach_channel(self.token.as_str(), self);
        }
    }

    fn lock_transport(&self) -> MutexGuard<'_, Option<Transport>> {
        self.transport
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl StatusNotifier for StatusChannel {
    fn notify(&self, event: StatusEvent) {
        self.send(event);
    }

    fn is_connected(&self) -> bool {
        StatusChannel::is_connected(self)
    }

    fn close(&self) {
        StatusChannel::close(self);
    }
}

impl std::fmt::Debug for StatusChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusChannel")
            .field("token", &self.token)
            .field("connected", &self.is_connected())
            .finish()
    }
}
