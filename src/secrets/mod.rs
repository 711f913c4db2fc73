//! Secret-store collaborators.
//!
//! The notebook host owns the real secret store; these providers reach it
//! through whatever the runtime exposes: exported environment variables, a
//! mounted directory, or a helper command.

/// Helper-command provider.
pub mod command;
/// Environment, directory, and in-memory providers.
pub mod provider;
/// Google Secret Manager reads through `gcloud`.
pub mod secret_manager;

use crate::{
    error::Result,
    types::{SecretName, SecretValue},
};

pub use command::CommandSecretProvider;
pub use provider::{DirSecretProvider, EnvSecretProvider, StaticSecretProvider};
pub use secret_manager::{SecretManagerClient, SecretVersionRef};

/// Name-keyed store of small string values owned by the notebook host.
pub trait SecretProvider: Send + Sync {
    /// Checks that the store is reachable from this runtime.
    ///
    /// Fails with [`crate::error::AuthError::Configuration`] when it is not.
    fn probe(&self) -> Result<()>;
    /// Fetches one secret. `Ok(None)` means the entry does not exist.
    fn get(&self, name: &SecretName) -> Result<Option<SecretValue>>;
}
