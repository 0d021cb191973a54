//! Support chat shared types and storage
//!
//! This crate contains the message model, errors and the message store shared
//! by the relay server.

pub mod db;
pub mod error;
pub mod store;
pub mod types;

pub use db::*;
pub use error::*;
pub use store::{MemoryMessageStore, MessageStore, PgMessageStore};
pub use types::*;
