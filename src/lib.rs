//! pairline - session backend for a streaming AI pair-programming agent.
//!
//! A browser client drives a coding agent through a small HTTP API. Each
//! session owns one agent, a transcript and an event queue that the client
//! drains over server-sent events.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐
//! │     CLI     │     │   HTTP API  │
//! └──────┬──────┘     └──────┬──────┘
//!        └─────────┬─────────┘
//!           ┌──────┴──────┐
//!           │    Core     │  sessions, driver, stream hub
//!           └──────┬──────┘
//!           ┌──────┴──────┐
//!           │ agent-core  │  CodingAgent / AgentFactory
//!           └─────────────┘
//! ```

pub mod api;
pub mod build_info;
pub mod cli;
pub mod config;
pub mod core;

pub use config::Config;
