//! Signup and login rules applied ahead of session registration.

use std::sync::Arc;

use crosstalk_accounts::{password, AccountStore, AuthError};
use crosstalk_relay::InviteLedger;
use tracing::{info, warn};

/// Decides whether a connection may become an authenticated session.
///
/// Signup failures name their cause; login failures collapse into one
/// generic rejection so usernames cannot be probed.
#[derive(Clone)]
pub struct AuthGate {
    accounts: Arc<dyn AccountStore>,
    invites: InviteLedger,
}

impl AuthGate {
    pub fn new(accounts: Arc<dyn AccountStore>, invites: InviteLedger) -> Self {
        Self { accounts, invites }
    }

    /// Create an account and return the accepted username.
    ///
    /// The very first account is exempt from the invite requirement; every
    /// later signup must consume an unspent invite code. The code is burned
    /// before the username claim, so losing a simultaneous race for the
    /// same username costs the code.
    pub async fn signup(
        &self,
        username: &str,
        password: &str,
        invite_code: Option<&str>,
    ) -> Result<String, AuthError> {
        let username = username.trim();
        if username.is_empty() || password.is_empty() {
            return Err(AuthError::MissingCredentials);
        }

        if self.accounts.find_account(username).is_some() {
            return Err(AuthError::UsernameTaken);
        }

        if self.accounts.has_accounts() {
            let code = invite_code.map(str::trim).unwrap_or_default();
            if code.is_empty() || !self.invites.consume(code).await {
                warn!(username, "signup rejected: missing or spent invite code");
                return Err(AuthError::InviteRequired);
            }
        }

        let password_hash = password::hash_password(password)?;
        if !self.accounts.create_account(username, &password_hash) {
            return Err(AuthError::UsernameTaken);
        }

        info!(username, "account created");
        Ok(username.to_string())
    }

    /// Verify credentials and return the accepted username.
    ///
    /// Unknown usernames and wrong passwords are indistinguishable to the
    /// caller. Verification goes through Argon2, never a plain comparison.
    pub fn login(&self, username: &str, password: &str) -> Result<String, AuthError> {
        let username = username.trim();

        let Some(account) = self.accounts.find_account(username) else {
            return Err(AuthError::InvalidCredentials);
        };

        if !password::verify_password(password, &account.password_hash) {
            return Err(AuthError::InvalidCredentials);
        }

        info!(username, "login accepted");
        Ok(account.username)
    }
}
