//! Credential primitives: the bearer token value type, persistent storage,
//! and the acquisition sources the session walks during initialization.

pub mod sources;
pub mod store;
pub mod token;

pub use store::{CredentialStore, StoredCredentials};
pub use token::{Claims, Token};
