//! Verification session tracking.
//!
//! A [`SessionRegistry`] holds every in-flight verification [`Session`] keyed
//! by its [`SessionToken`]. Status channels (implementors of
//! [`StatusNotifier`]) are related to sessions through a separate
//! [`ChannelLinks`] table, so a session never owns the transport behind its
//! channel and removing a session can't leave a channel pointing at it.

pub mod error;
pub mod links;
pub mod registry;
pub mod session;
pub mod token;

pub use {
    error::SessionError,
    links::{ChannelLinks, StatusNotifier},
    registry::{AttachOutcome, SessionRegistry, SessionSummary},
    session::{Session, SessionState},
    token::SessionToken,
};

#[cfg(test)]
pub(crate) mod test_support;
