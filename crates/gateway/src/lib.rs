//! Gateway: HTTP/WebSocket server delivering session status pushes.
//!
//! Lifecycle:
//! 1. Load config, build the shared [`SessionRegistry`](vstatus_sessions::SessionRegistry)
//! 2. Bind the listener and mount the status route
//! 3. Each status socket becomes a [`StatusChannel`](channel::StatusChannel)
//!    related to the session named by its token
//!
//! Session creation and the verification protocol live with the embedding
//! application, which shares the registry with [`server::start_gateway`].

pub mod channel;
pub mod server;
pub mod state;
pub mod ws;
