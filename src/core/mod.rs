//! Domain logic: conversation types, attachment handling, event-stream
//! parsing, the relay controller and configuration.
//!
//! Nothing in here knows about HTTP routing; [`crate::server`] maps these
//! types onto requests and responses.

pub mod attachments;
pub mod config;
pub mod error;
pub mod message;
pub mod relay;
pub mod reply;
pub mod sse;
