//! CLA Connect: organization and repository connection backend for a CLA
//! management platform.
//!
//! Project managers register GitHub organizations and GitLab groups under a
//! project. The service reconciles what the provider reports, what is
//! registered locally and what is configured into a per-repository
//! connection status, and keeps local records current from GitHub App
//! webhooks.

pub mod audit;
pub mod autoenable;
pub mod config;
pub mod directory;
pub mod error;
pub mod provider;
pub mod reconcile;
pub mod server;
pub mod service;
pub mod store;
pub mod types;
pub mod webhooks;

#[cfg(test)]
mod test_utils;
