use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU8, Ordering},
    },
    time::{Duration, Instant},
};

use {
    serde::{Deserialize, Serialize},
    tracing::debug,
    vstatus_protocol::StatusEvent,
};

use crate::{
    error::SessionError,
    links::{ChannelLinks, StatusNotifier},
    token::SessionToken,
};

// ── State ────────────────────────────────────────────────────────────────────

/// Lifecycle state of a verification session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum SessionState {
    Initialized = 0,
    Connected = 1,
    Done = 2,
    Cancelled = 3,
    TimedOut = 4,
}

impl SessionState {
    fn from_tag(tag: u8) -> Self {
        match tag {
            0 => SessionState::Initialized,
            1 => SessionState::Connected,
            2 => SessionState::Done,
            3 => SessionState::Cancelled,
            4 => SessionState::TimedOut,
            other => unreachable!("invalid session state tag {other}"),
        }
    }

    /// Terminal states accept no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionState::Done | SessionState::Cancelled | SessionState::TimedOut
        )
    }

    /// The event pushed to the client when a session enters this state.
    pub fn event(self) -> Option<StatusEvent> {
        match self {
            SessionState::Initialized => None,
            SessionState::Connected => Some(StatusEvent::Connected),
            SessionState::Done => Some(StatusEvent::Done),
            SessionState::Cancelled => Some(StatusEvent::Cancelled),
            SessionState::TimedOut => Some(StatusEvent::Timeout),
        }
    }

    pub fn can_transition_to(self, next: SessionState) -> bool {
        match (self, next) {
            (SessionState::Initialized, SessionState::Connected) => true,
            (from, to) => !from.is_terminal() && to.is_terminal(),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Initialized => "initialized",
            SessionState::Connected => "connected",
            SessionState::Done => "done",
            SessionState::Cancelled => "cancelled",
            SessionState::TimedOut => "timed_out",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Session ──────────────────────────────────────────────────────────────────

/// One in-flight verification session.
///
/// The session does not hold its status channel; it holds a handle to the
/// registry's [`ChannelLinks`] table and looks its channel up by token on
/// every transition. Sessions are created through
/// [`SessionRegistry::new_session`](crate::SessionRegistry::new_session) so
/// they always share the registry's table.
pub struct Session {
    token: SessionToken,
    state: AtomicU8,
    created_at: Instant,
    links: ChannelLinks,
}

impl Session {
    pub(crate) fn new(token: SessionToken, links: ChannelLinks) -> Self {
        Self {
            token,
            state: AtomicU8::new(SessionState::Initialized as u8),
            created_at: Instant::now(),
            links,
        }
    }

    pub fn token(&self) -> &SessionToken {
        &self.token
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_tag(self.state.load(Ordering::Acquire))
    }

    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Route future pushes for this session to `channel`, replacing any
    /// previously related channel.
    pub fn set_channel(&self, channel: Arc<dyn StatusNotifier>) {
        if self.links.link(self.token.clone(), channel).is_some() {
            debug!(token = %self.token, "replaced status channel");
        }
    }

    /// The status channel currently related to this session, if any.
    pub fn channel(&self) -> Option<Arc<dyn StatusNotifier>> {
        self.links.get(self.token.as_str())
    }

    pub fn mark_connected(&self) -> Result<(), SessionError> {
        self.transition(SessionState::Connected)
    }

    pub fn mark_done(&self) -> Result<(), SessionError> {
        self.transition(SessionState::Done)
    }

    pub fn mark_cancelled(&self) -> Result<(), SessionError> {
        self.transition(SessionState::Cancelled)
    }

    pub fn mark_timed_out(&self) -> Result<(), SessionError> {
        self.transition(SessionState::TimedOut)
    }

    /// Move to `next` exactly once, then push the matching event if a channel
    /// is related. Concurrent callers race on the compare-exchange; losers see
    /// the winner's state and are rejected if it no longer permits `next`.
    fn transition(&self, next: SessionState) -> Result<(), SessionError> {
        let mut current = self.state();
        loop {
            if !current.can_transition_to(next) {
                debug!(
                    token = %self.token,
                    from = %current,
                    to = %next,
                    "rejected session transition"
                );
                return Err(SessionError::InvalidTransition {
                    token: self.token.clone(),
                    from: current,
                    to: next,
                });
            }
            match self.state.compare_exchange(
                current as u8,
                next as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => current = SessionState::from_tag(actual),
            }
        }

        debug!(token = %self.token, from = %current, to = %next, "session transition");

        if let Some(event) = next.event()
            && let Some(channel) = self.channel()
        {
            channel.notify(event);
        }
        Ok(())
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("token", &self.token)
            .field("state", &self.state())
            .field("has_channel", &self.links.contains(self.token.as_str()))
            .finish()
    }
}
