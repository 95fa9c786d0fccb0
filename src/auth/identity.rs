//! Credential store: resolves a `(username, password)` pair to a [`Role`].

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::auth::AuthError;

/// Role attached to an account. Only `service_account` changes anything: it is
/// handed the denied vendor token at login.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Maintainer,
    ServiceAccount,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::Admin => "admin",
            Role::Maintainer => "maintainer",
            Role::ServiceAccount => "service_account",
        };
        f.write_str(s)
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct Account {
    username: String,
    password: String,
    role: Role,
}

impl Account {
    pub fn new(username: impl Into<String>, password: impl Into<String>, role: Role) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            role,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    fn matches(&self, username: &str, password: &str) -> bool {
        self.username == username && self.password == password
    }
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("role", &self.role)
            .finish()
    }
}

/// Source of truth for who may log in.
///
/// The gateway only needs the role back; where the accounts live is up to the
/// implementation.
pub trait IdentityProvider: Send + Sync {
    /// Fails with [`AuthError::InvalidCredentials`] on any mismatch, without
    /// telling which half was wrong.
    fn authenticate(&self, username: &str, password: &str) -> Result<Role, AuthError>;
}

/// Fixed, ordered account list loaded from configuration.
///
/// Usernames are not required to be unique; the first exact match wins.
#[derive(Debug, Clone, Default)]
pub struct StaticAccounts {
    accounts: Vec<Account>,
}

impl StaticAccounts {
    pub fn new(accounts: Vec<Account>) -> Self {
        Self { accounts }
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

impl FromIterator<Account> for StaticAccounts {
    fn from_iter<I: IntoIterator<Item = Account>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl IdentityProvider for StaticAccounts {
    fn authenticate(&self, username: &str, password: &str) -> Result<Role, AuthError> {
        self.accounts
            .iter()
            .find(|account| account.matches(username, password))
            .map(Account::role)
            .ok_or(AuthError::InvalidCredentials)
    }
}
