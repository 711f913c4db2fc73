#![deny(missing_docs)]
//! Activates a Google Cloud service account from notebook secrets and
//! assembles `gsutil` transfer commands.

/// Credential activation.
pub mod activation;
/// Audit log module.
pub mod audit;
/// Command-line interface.
pub mod cli;
/// Config file parsing and validation.
pub mod config;
/// Error types.
pub mod error;
/// Secure filesystem helpers.
pub mod fs_secure;
/// Diagnostics setup for the binary.
pub mod logging;
/// External process execution.
pub mod process;
/// Secret stores.
pub mod secrets;
/// Cloud Storage transfer commands.
pub mod transfer;
/// Shared types.
pub mod types;
