//! # Vortex Server
//!
//! REST service exposing tenant network lifecycle operations on top of
//! [`vortex_network::NetworkOrchestrator`].

pub mod cli;
pub mod config;
pub mod http;
pub mod server;
pub mod workloads;

pub use config::Config;
