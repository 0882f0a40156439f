use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

/// A stored account record.
#[derive(Debug, Clone)]
pub struct UserAccount {
    pub username: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Storage interface for account records.
///
/// The relay treats account storage as an external collaborator with a
/// narrow surface: exact-username lookup, an atomic claim on creation, and
/// an emptiness probe that drives the first-account invite exemption.
pub trait AccountStore: Send + Sync {
    /// Create an account, returning `false` when the username is taken.
    fn create_account(&self, username: &str, password_hash: &str) -> bool;

    /// Fetch the account matching the exact username.
    fn find_account(&self, username: &str) -> Option<UserAccount>;

    /// True once at least one account exists.
    fn has_accounts(&self) -> bool;
}

/// In-memory account store. Records live and die with the process.
#[derive(Default)]
pub struct MemoryAccountStore {
    accounts: Mutex<HashMap<String, UserAccount>>,
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AccountStore for MemoryAccountStore {
    fn create_account(&self, username: &str, password_hash: &str) -> bool {
        let mut accounts = self.accounts.lock();
        if accounts.contains_key(username) {
            return false;
        }
        accounts.insert(
            username.to_string(),
            UserAccount {
                username: username.to_string(),
                password_hash: password_hash.to_string(),
                created_at: Utc::now(),
            },
        );
        true
    }

    fn find_account(&self, username: &str) -> Option<UserAccount> {
        self.accounts.lock().get(username).cloned()
    }

    fn has_accounts(&self) -> bool {
        !self.accounts.lock().is_empty()
    }
}
