//! Credential checking behind a trait seam.
//!
//! The game loop only ever talks to [`CredentialStore`]; what stands behind
//! it is deployment detail. The bundled [`InMemoryCredentialStore`] keeps
//! accounts for the lifetime of the process and is what the binary and the
//! tests run against.

use log::debug;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Mutex;
use thiserror::Error;

/// Stable account identifier, distinct from the per-connection entity id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UserId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "user-{}", self.0)
    }
}

/// Proof of a successful credential check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthGrant {
    pub user_id: UserId,
    /// Whether this account may issue privileged commands.
    pub privileged: bool,
}

/// Typed failures a credential check can produce. The message text is what
/// clients see in the auth reply.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("username already taken")]
    UsernameTaken,
    #[error("invalid username or password")]
    InvalidCredentials,
}

/// Boundary between the game loop and whatever holds the accounts.
pub trait CredentialStore: Send + Sync {
    /// Checks a username/password pair against an existing account.
    fn authenticate(&self, username: &str, password: &str) -> Result<AuthGrant, AuthError>;

    /// Creates an account and authenticates it in one step. At most one of
    /// two concurrent attempts on the same username may succeed.
    fn create_account(&self, username: &str, password: &str) -> Result<AuthGrant, AuthError>;
}

struct Account {
    // The production store keeps password hashes; this stand-in holds the
    // raw string because nothing here outlives the process.
    password: String,
    user_id: UserId,
}

struct Accounts {
    by_username: HashMap<String, Account>,
    next_user_id: u64,
}

/// Process-lifetime account store. Operator usernames are fixed at
/// construction; any account created or authenticated under one of those
/// names receives a privileged grant.
pub struct InMemoryCredentialStore {
    accounts: Mutex<Accounts>,
    operators: HashSet<String>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::with_operators(std::iter::empty::<String>())
    }

    pub fn with_operators<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            accounts: Mutex::new(Accounts {
                by_username: HashMap::new(),
                next_user_id: 1,
            }),
            operators: names.into_iter().map(Into::into).collect(),
        }
    }

    fn is_operator(&self, username: &str) -> bool {
        self.operators.contains(username)
    }

    fn grant(&self, username: &str, user_id: UserId) -> AuthGrant {
        AuthGrant {
            user_id,
            privileged: self.is_operator(username),
        }
    }
}

impl Default for InMemoryCredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialStore for InMemoryCredentialStore {
    fn authenticate(&self, username: &str, password: &str) -> Result<AuthGrant, AuthError> {
        let accounts = match self.accounts.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match accounts.by_username.get(username) {
            Some(account) if account.password == password => {
                Ok(self.grant(username, account.user_id))
            }
            _ => {
                debug!("failed login for {:?}", username);
                Err(AuthError::InvalidCredentials)
            }
        }
    }

    fn create_account(&self, username: &str, password: &str) -> Result<AuthGrant, AuthError> {
        let mut accounts = match self.accounts.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if accounts.by_username.contains_key(username) {
            debug!("signup for taken username {:?}", username);
            return Err(AuthError::UsernameTaken);
        }
        let user_id = UserId(accounts.next_user_id);
        accounts.next_user_id += 1;
        accounts.by_username.insert(
            username.to_string(),
            Account {
                password: password.to_string(),
                user_id,
            },
        );
        Ok(self.grant(username, user_id))
    }
}
