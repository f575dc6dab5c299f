//! Secret Synchronization Daemon
//!
//! Bridges an external secret backend (Vault, OpenBao, AWS Secrets Manager,
//! GCP Secret Manager, Azure Key Vault) with an orchestrator's native secret
//! primitive: synchronous fetch-on-demand plus background rotation.

pub mod assembly;
pub mod config;
pub mod driver;
pub mod error;
pub mod extractor;
pub mod ipc;
pub mod locator;
pub mod observability;
pub mod orchestrator;
pub mod provider;
pub mod registry;
pub mod rotation;
pub mod types;
