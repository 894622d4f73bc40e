use thiserror::Error;

use crate::{session::SessionState, token::SessionToken};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("session {token}: transition from {from} to {to} not allowed")]
    InvalidTransition {
        token: SessionToken,
        from: SessionState,
        to: SessionState,
    },
}
