//! # Crosstalk Accounts Crate
//!
//! Account records and credential handling for the Crosstalk relay. The
//! relay keeps authentication deliberately narrow: usernames map to Argon2
//! password hashes, storage sits behind the [`AccountStore`] trait, and the
//! bundled [`MemoryAccountStore`] keeps every record in process memory.
//!
//! ## Architecture
//!
//! - **Store**: the [`AccountStore`] interface and its in-memory implementation
//! - **Password**: Argon2 hashing and verification helpers
//! - **Errors**: [`AuthError`], whose display strings are the client-facing
//!   authentication messages

pub mod password;
mod store;

pub use store::{AccountStore, MemoryAccountStore, UserAccount};

use thiserror::Error;

/// Authentication failures.
///
/// Apart from [`AuthError::PasswordHash`], the display strings are sent to
/// clients verbatim, so signup failures name their cause while login
/// failures stay generic.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Username and password are required")]
    MissingCredentials,
    #[error("Username already exists")]
    UsernameTaken,
    #[error("Valid invite code required")]
    InviteRequired,
    #[error("Invalid username or password")]
    InvalidCredentials,
    #[error("Invalid authentication request")]
    MalformedRequest,
    #[error("password hashing failed: {0}")]
    PasswordHash(#[from] argon2::password_hash::Error),
}
