//! Ephemeral SSH trust between the two panels.
//!
//! One key pair is provisioned per migration run: [`keys::KeyProvisioner`]
//! generates it locally and deploys the public half through the peer's
//! signed API; [`authorized_keys::TrustStore`] is the receiving side of
//! that same API, editing this host's `authorized_keys` file.

pub mod authorized_keys;
pub mod keys;

pub use authorized_keys::{TrustError, TrustStore};
pub use keys::{KeyProvisioner, ProvisionError};
