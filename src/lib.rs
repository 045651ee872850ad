//! Chatbot Relay is the backend for an embeddable chat widget.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`core`] owns the conversation model, attachment handling, the
//!   event-stream parser, the relay controller and configuration.
//! - [`server`] exposes the relay over HTTP (`POST /api/chat`, `GET /health`).
//! - [`ui`] holds what a chat front end needs without a DOM: the incremental
//!   markdown renderer and the widget's state reducer.
//! - [`api`] defines the wire payloads exchanged with the provider and the
//!   widget.
//!
//! Runtime entrypoints live in the binary crate (`src/main.rs`) and route
//! through [`crate::cli::main`].

pub mod api;
pub mod cli;
pub mod core;
pub mod server;
pub mod ui;
pub mod utils;
