//! # sphinx-client
//!
//! Client library for the Sphinx `searchd` daemon.
//!
//! This crate provides:
//! - Async TCP and Unix socket connections with connect and read timeouts
//! - Per-call or persistent (`open`/`close`) sessions
//! - High-level API for search, excerpts, attribute updates, keywords and status
//! - YAML and environment based configuration

pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod stream;

pub use client::Client;
pub use config::{ClientConfig, ConfigError, ServerAddress};
pub use connection::Connection;
pub use error::ClientError;
