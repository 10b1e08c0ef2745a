//! # danube-core
//!
//! Core HTTP dispatch machinery for the Danube Cloud management API.
//!
//! This crate provides the rate-limited, retrying request pipeline that every
//! resource operation goes through: a minimum-spacing rate limiter, a
//! throttle-aware retrying sender, a tolerant response decoder for the
//! server's non-uniform envelope shapes, and the generic dispatcher that ties
//! them together with datacenter-scope injection.
//!
//! ## Modules
//!
//! - [`error`] - Error types and HTTP status code mapping
//! - [`config`] - Client configuration and credentials
//! - [`limiter`] - Minimum-spacing request rate limiter
//! - [`request`] - Request descriptors, query filters, and scope injection
//! - [`envelope`] - Response envelope and decode fallback heuristics
//! - [`client`] - The dispatcher: transport, retry loop, and decoding
//! - [`version`] - Library version and user-agent string

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod client;
pub mod config;
pub mod envelope;
pub mod error;
pub mod limiter;
pub mod request;
pub mod version;

// Re-export commonly used types
pub use client::DanubeClient;
pub use config::DanubeConfig;
pub use envelope::Envelope;
pub use error::{Error, Result, ResultExt};
pub use request::{ApiRequest, Filter, Scoped};
