//! WebSocket support for the live chat
//!
//! Provides the connection/room fabric for support conversations:
//! - Per-participant rooms that fan messages out to live connections
//! - Per-connection sessions for participants and the administrator
//! - Stand-in replies while no administrator has answered
//! - Read receipts
//!
//! # Architecture
//!
//! - **Connection**: Outbound handle of a live socket
//! - **Room**: Participant-keyed pub/sub for broadcasting events
//! - **Session**: Per-socket state machine dispatching inbound envelopes
//! - **AutoReply**: Detached completion-backed replies
//! - **Receipts**: Read flags plus `messages_read` notices
//! - **State**: Shared state cloned into every connection
//! - **Handler**: Axum WebSocket route handler
//! - **Events**: Type-safe envelopes for client/server communication

pub mod auto_reply;
pub mod connection;
pub mod events;
pub mod handler;
pub mod receipts;
pub mod room;
pub mod session;
pub mod state;

pub use auto_reply::AutoReplier;
pub use handler::ws_handler;
pub use state::ChatState;
