use std::sync::Arc;

use {
    dashmap::DashMap,
    serde::Serialize,
    tracing::{debug, info},
};

use crate::{
    links::{ChannelLinks, StatusNotifier, is_same_channel},
    session::{Session, SessionState},
    token::SessionToken,
};

/// Result of relating a freshly opened status channel to its session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachOutcome {
    /// The session exists and will push through the channel.
    Attached,
    /// No session is registered under the token yet. The channel is parked
    /// until the session-creating flow calls [`SessionRegistry::claim_pending`].
    Pending,
}

/// One row of [`SessionRegistry::snapshot`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    pub token: SessionToken,
    pub state: SessionState,
    pub age_ms: u64,
    pub has_channel: bool,
}

/// Concurrent token → session map, plus the channel relation tables.
///
/// One instance is owned by the server and shared with every handler; all
/// methods take `&self` and never block on I/O.
pub struct SessionRegistry {
    sessions: DashMap<SessionToken, Arc<Session>>,
    links: ChannelLinks,
    /// Channels opened for tokens with no session yet.
    pending: DashMap<SessionToken, Arc<dyn StatusNotifier>>,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
            links: ChannelLinks::new(),
            pending: DashMap::new(),
        }
    }

    /// Create a session wired to this registry's channel relations.
    ///
    /// The session is not inserted; call [`add`](Self::add) once the token is
    /// ready to be handed to the client.
    pub fn new_session(&self, token: impl Into<SessionToken>) -> Arc<Session> {
        Arc::new(Session::new(token.into(), self.links.clone()))
    }

    /// Insert `session` under its token, overwriting any existing entry.
    pub fn add(&self, session: Arc<Session>) {
        let token = session.token().clone();
        if self.sessions.insert(token.clone(), session).is_some() {
            debug!(%token, "replaced existing session");
        } else {
            debug!(%token, "session registered");
        }
    }

    pub fn get_any(&self, token: &str) -> Option<Arc<Session>> {
        self.sessions.get(token).map(|entry| Arc::clone(entry.value()))
    }

    /// Remove the entry for `session`'s token, along with its channel relation.
    ///
    /// The channel itself is left open; closing it is up to whoever expires
    /// the session.
    pub fn remove(&self, session: &Session) -> Option<Arc<Session>> {
        let token = session.token();
        let removed = self.sessions.remove(token.as_str()).map(|(_, s)| s);
        self.links.remove(token.as_str());
        if removed.is_some() {
            debug!(%token, "session removed");
        }
        removed
    }

    /// Relate a newly opened channel to the session registered under `token`.
    ///
    /// Attachment does not depend on session state: a channel that reconnects
    /// for a still-registered session takes over from its predecessor.
    pub fn attach_channel(
        &self,
        token: &SessionToken,
        channel: Arc<dyn StatusNotifier>,
    ) -> AttachOutcome {
        // Holding the entry guard while linking keeps `remove` from
        // interleaving: it either runs first and we park the channel, or it
        // waits and then clears the link we just made.
        match self.sessions.get(token.as_str()) {
            Some(session) => {
                self.pending.remove(token.as_str());
                session.set_channel(channel);
                AttachOutcome::Attached
            },
            None => {
                self.pending.insert(token.clone(), channel);
                AttachOutcome::Pending
            },
        }
    }

    /// Explicitly bind a channel that was opened before `session` was added.
    ///
    /// Returns true when a still-connected pending channel was attached.
    pub fn claim_pending(&self, session: &Session) -> bool {
        let Some((_, channel)) = self.pending.remove(session.token().as_str()) else {
            return false;
        };
        if !channel.is_connected() {
            return false;
        }
        session.set_channel(channel);
        debug!(token = %session.token(), "claimed pending status channel");
        true
    }

    /// Forget `channel` wherever it is related to `token`. Relations that
    /// point at a different channel are left untouched.
    pub fn detach_channel(&self, token: &str, channel: &dyn StatusNotifier) {
        self.links.unlink(token, channel);
        self.pending
            .remove_if(token, |_, parked| is_same_channel(parked, channel));
    }

    pub fn links(&self) -> &ChannelLinks {
        &self.links
    }

    pub fn has_pending(&self, token: &str) -> bool {
        self.pending.contains_key(token)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn tokens(&self) -> Vec<SessionToken> {
        self.sessions.iter().map(|e| e.key().clone()).collect()
    }

    /// Point-in-time view of every registered session.
    pub fn snapshot(&self) -> Vec<SessionSummary> {
        self.sessions
            .iter()
            .map(|entry| {
                let session = entry.value();
                SessionSummary {
                    token: entry.key().clone(),
                    state: session.state(),
                    age_ms: u64::try_from(session.age().as_millis()).unwrap_or(u64::MAX),
                    has_channel: self.links.contains(entry.key().as_str()),
                }
            })
            .collect()
    }

    /// Log every active session at info level.
    pub fn log_active(&self) {
        let sessions = self.snapshot();
        info!(
            count = sessions.len(),
            pending_channels = self.pending.len(),
            "active verification sessions"
        );
        for s in &sessions {
            info!(
                token = %s.token,
                state = %s.state,
                age_ms = s.age_ms,
                has_channel = s.has_channel,
                "session"
            );
        }
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("sessions", &self.sessions.len())
            .field("links", &self.links.len())
            .field("pending", &self.pending.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use vstatus_protocol::StatusEvent;

    use super::*;
    use crate::test_support::RecordingNotifier;

    #[test]
    fn add_get_remove_cycle() {
        let registry = SessionRegistry::new();
        let s = registry.new_session("abc");
        registry.add(Arc::clone(&s));

        let found = registry.get_any("abc").unwrap();
        assert!(Arc::ptr_eq(&found, &s));
        assert_eq!(registry.len(), 1);

        let removed = registry.remove(&s).unwrap();
        assert!(Arc::ptr_eq(&removed, &s));
        assert!(registry.get_any("abc").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn remove_absent_is_noop() {
        let registry = SessionRegistry::new();
        let s = registry.new_session("never-added");
        assert!(registry.remove(&s).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn add_overwrites_same_token() {
        let registry = SessionRegistry::new();
        let first = registry.new_session("abc");
        let second = registry.new_session("abc");
        registry.add(Arc::clone(&first));
        registry.add(Arc::clone(&second));

        let found = registry.get_any("abc").unwrap();
        assert!(Arc::ptr_eq(&found, &second));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn attach_to_existing_session_routes_pushes() {
        let registry = SessionRegistry::new();
        let s = registry.new_session("abc");
        registry.add(Arc::clone(&s));
        let channel = RecordingNotifier::arc();

        assert_eq!(
            registry.attach_channel(&"abc".into(), channel.clone()),
            AttachOutcome::Attached
        );
        s.mark_connected().unwrap();
        assert_eq!(channel.events(), vec![StatusEvent::Connected]);
    }

    #[test]
    fn attach_after_terminal_does_not_reopen_lifecycle() {
        let registry = SessionRegistry::new();
        let s = registry.new_session("abc");
        registry.add(Arc::clone(&s));
        s.mark_done().unwrap();

        let channel = RecordingNotifier::arc();
        assert_eq!(
            registry.attach_channel(&"abc".into(), channel.clone()),
            AttachOutcome::Attached
        );
        assert!(s.mark_cancelled().is_err());
        assert_eq!(s.state(), SessionState::Done);
        assert!(channel.events().is_empty());
    }

    #[test]
    fn early_channel_is_not_bound_by_add() {
        let registry = SessionRegistry::new();
        let channel = RecordingNotifier::arc();
        assert_eq!(
            registry.attach_channel(&"xyz".into(), channel.clone()),
            AttachOutcome::Pending
        );
        assert!(channel.is_connected());

        let s = registry.new_session("xyz");
        registry.add(Arc::clone(&s));
        s.mark_connected().unwrap();
        assert!(s.channel().is_none());
        assert!(channel.events().is_empty());
        assert!(registry.has_pending("xyz"));
    }

    #[test]
    fn claim_pending_binds_early_channel() {
        let registry = SessionRegistry::new();
        let channel = RecordingNotifier::arc();
        registry.attach_channel(&"xyz".into(), channel.clone());

        let s = registry.new_session("xyz");
        registry.add(Arc::clone(&s));
        assert!(registry.claim_pending(&s));
        assert!(!registry.has_pending("xyz"));

        s.mark_cancelled().unwrap();
        assert_eq!(channel.events(), vec![StatusEvent::Cancelled]);
        assert!(!registry.claim_pending(&s));
    }

    #[test]
    fn claim_pending_skips_closed_channel() {
        let registry = SessionRegistry::new();
        let channel = RecordingNotifier::arc();
        registry.attach_channel(&"xyz".into(), channel.clone());
        channel.close();

        let s = registry.new_session("xyz");
        registry.add(Arc::clone(&s));
        assert!(!registry.claim_pending(&s));
        assert!(s.channel().is_none());
    }

    #[test]
    fn reconnect_replaces_previous_channel() {
        let registry = SessionRegistry::new();
        let s = registry.new_session("abc");
        registry.add(Arc::clone(&s));
        let old = RecordingNotifier::arc();
        let new = RecordingNotifier::arc();
        registry.attach_channel(&"abc".into(), old.clone());
        registry.attach_channel(&"abc".into(), new.clone());

        // The old channel disconnecting must not sever the new one.
        registry.detach_channel("abc", &*old);
        s.mark_connected().unwrap();

        assert!(old.events().is_empty());
        assert_eq!(new.events(), vec![StatusEvent::Connected]);
    }

    #[test]
    fn remove_drops_channel_relation_but_not_channel() {
        let registry = SessionRegistry::new();
        let s = registry.new_session("abc");
        registry.add(Arc::clone(&s));
        let channel = RecordingNotifier::arc();
        registry.attach_channel(&"abc".into(), channel.clone());

        registry.remove(&s);
        assert!(registry.links().is_empty());
        assert!(channel.is_connected());
        assert_eq!(channel.close_count(), 0);
    }

    #[test]
    fn detach_clears_pending_entry() {
        let registry = SessionRegistry::new();
        let channel = RecordingNotifier::arc();
        registry.attach_channel(&"xyz".into(), channel.clone());
        registry.detach_channel("xyz", &*channel);
        assert!(!registry.has_pending("xyz"));
    }

    #[test]
    fn concurrent_add_get_remove() {
        let registry = Arc::new(SessionRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    for _ in 0..100 {
                        let token = uuid::Uuid::new_v4().to_string();
                        let s = registry.new_session(token.as_str());
                        registry.add(Arc::clone(&s));
                        assert!(registry.get_any(&token).is_some());
                        registry.remove(&s);
                        assert!(registry.get_any(&token).is_none());
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert!(registry.is_empty());
    }

    #[test]
    fn tokens_lists_registered_sessions() {
        let registry = SessionRegistry::new();
        registry.add(registry.new_session("a"));
        registry.add(registry.new_session("b"));
        let mut tokens = registry.tokens();
        tokens.sort();
        assert_eq!(tokens, vec![SessionToken::from("a"), SessionToken::from("b")]);
    }

    #[test]
    fn snapshot_reports_state_and_channel() {
        let registry = SessionRegistry::new();
        let linked = registry.new_session("linked");
        let idle = registry.new_session("idle");
        registry.add(Arc::clone(&linked));
        registry.add(Arc::clone(&idle));
        registry.attach_channel(&"linked".into(), RecordingNotifier::arc());
        linked.mark_connected().unwrap();

        let mut rows = registry.snapshot();
        rows.sort_by(|a, b| a.token.cmp(&b.token));
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].token, SessionToken::from("idle"));
        assert_eq!(rows[0].state, SessionState::Initialized);
        assert!(!rows[0].has_channel);
        assert_eq!(rows[1].token, SessionToken::from("linked"));
        assert_eq!(rows[1].state, SessionState::Connected);
        assert!(rows[1].has_channel);
        assert!(rows.iter().all(|r| r.age_ms < 60_000));

        registry.log_active();
        registry.remove(&linked);
        assert_eq!(registry.snapshot().len(), 1);
    }

    #[test]
    fn attach_racing_remove_never_leaves_orphan_link() {
        for round in 0..200 {
            let registry = Arc::new(SessionRegistry::new());
            let token = format!("race-{round}");
            let s = registry.new_session(token.as_str());
            registry.add(Arc::clone(&s));

            let attacher = {
                let registry = Arc::clone(&registry);
                let token = SessionToken::from(token.as_str());
                thread::spawn(move || registry.attach_channel(&token, RecordingNotifier::arc()))
            };
            registry.remove(&s);
            let outcome = attacher.join().unwrap();

            assert!(registry.get_any(&token).is_none());
            assert!(
                !registry.links().contains(&token),
                "link outlived its session ({outcome:?})"
            );
            assert_eq!(registry.has_pending(&token), outcome == AttachOutcome::Pending);
        }
    }
}
