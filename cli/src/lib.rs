//! # csmauth
//!
//! Command-line front end for the credential cache and tenant resolution
//! engine. One interactive sign-in caches a resource manager token for every
//! tenant the user belongs to; later invocations print an authorization
//! header for a tenant, a subscription or the most recently used credential.
//!
//! ## Modules
//!
//! - [`cli`] - Command-line arguments
//! - [`commands`] - Command execution and output formatting
//! - [`config`] - Configuration file and environment loading
//! - [`logger`] - Logging configuration
//!
//! This library interface enables integration testing by providing access to internal modules.

pub mod cli;
pub mod commands;
pub mod config;
pub mod logger;
