//! Streaming text-completion client: one prompt in, partial snapshots and a
//! final value out, routed to a remote streaming backend or a local host
//! assistant depending on configuration.

pub mod app;
pub mod backend;
pub mod cli;
pub mod client;
pub mod config;
pub mod debounce;
pub mod extract;
pub mod paths;
pub mod suggest;

#[cfg(feature = "tui")]
pub mod tui;
