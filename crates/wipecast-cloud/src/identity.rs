//! Identity: accounts, sessions and the verified-email gate in front of the comparator.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use wipecast_core::{WipecastError, WipecastResult};

const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub uid: String,
    pub email: String,
    pub email_verified: bool,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Register and sign in a new email/password account.
    async fn create_account(&self, email: &str, password: &str) -> WipecastResult<User>;

    async fn sign_in(&self, email: &str, password: &str) -> WipecastResult<User>;

    /// Sign in through an external provider (e.g. `google`) with its identity token.
    async fn sign_in_federated(&self, provider: &str, id_token: &str) -> WipecastResult<User>;

    async fn sign_out(&self) -> WipecastResult<()>;

    /// Send a verification email to the signed-in user.
    async fn send_verification_email(&self) -> WipecastResult<()>;

    fn current_user(&self) -> Option<User>;
}

/// Where a visitor is sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    SignIn,
    VerificationPending { email: String },
    Comparator(User),
}

pub struct AccessGate;

impl AccessGate {
    pub fn decide(user: Option<&User>) -> Access {
        match user {
            None => Access::SignIn,
            Some(user) if !user.email_verified => Access::VerificationPending {
                email: user.email.clone(),
            },
            Some(user) => Access::Comparator(user.clone()),
        }
    }

    pub async fn check(provider: &dyn IdentityProvider) -> Access {
        Self::decide(provider.current_user().as_ref())
    }
}

#[derive(Debug, Clone)]
struct Account {
    uid: String,
    password_digest: Option<[u8; 32]>,
    email_verified: bool,
}

/// In-process identity provider for local use and tests.
#[derive(Debug, Default)]
pub struct MemoryIdentity {
    accounts: Mutex<HashMap<String, Account>>,
    current: Mutex<Option<User>>,
    outbox: Mutex<Vec<String>>,
}

impl MemoryIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    /// Addresses verification emails were sent to, oldest first.
    pub fn sent_verifications(&self) -> Vec<String> {
        self.outbox.lock().clone()
    }

    /// Mark an address as verified, as following the emailed link would.
    pub fn confirm_email(&self, email: &str) -> WipecastResult<()> {
        let key = normalize_email(email);
        let mut accounts = self.accounts.lock();
        let account = accounts
            .get_mut(&key)
            .ok_or_else(|| WipecastError::Auth(format!("no account for {}", key)))?;
        account.email_verified = true;

        let mut current = self.current.lock();
        if let Some(user) = current.as_mut().filter(|u| u.email == key) {
            user.email_verified = true;
        }
        Ok(())
    }

    fn sign_in_as(&self, email: &str, account: &Account) -> User {
        let user = User {
            uid: account.uid.clone(),
            email: email.to_string(),
            email_verified: account.email_verified,
        };
        *self.current.lock() = Some(user.clone());
        tracing::debug!("signed in {}", user.uid);
        user
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

fn digest_password(email: &str, password: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(email.as_bytes());
    hasher.update([0u8]);
    hasher.update(password.as_bytes());
    let mut out = [0u8; 32];
    out.copy_from_slice(&hasher.finalize());
    out
}

#[async_trait]
impl IdentityProvider for MemoryIdentity {
    async fn create_account(&self, email: &str, password: &str) -> WipecastResult<User> {
        let email = normalize_email(email);
        let valid_email = email
            .split_once('@')
            .map(|(local, domain)| !local.is_empty() && domain.contains('.'))
            .unwrap_or(false);
        if !valid_email {
            return Err(WipecastError::Auth(format!("invalid email address '{}'", email)));
        }
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(WipecastError::Auth(format!(
                "password must be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }

        let account = {
            let mut accounts = self.accounts.lock();
            if accounts.contains_key(&email) {
                return Err(WipecastError::Auth(format!("{} is already registered", email)));
            }
            let account = Account {
                uid: uuid::Uuid::new_v4().simple().to_string(),
                password_digest: Some(digest_password(&email, password)),
                email_verified: false,
            };
            accounts.insert(email.clone(), account.clone());
            account
        };
        Ok(self.sign_in_as(&email, &account))
    }

    async fn sign_in(&self, email: &str, password: &str) -> WipecastResult<User> {
        let email = normalize_email(email);
        let account = self.accounts.lock().get(&email).cloned();
        match account {
            Some(account) if account.password_digest == Some(digest_password(&email, password)) => {
                Ok(self.sign_in_as(&email, &account))
            }
            _ => Err(WipecastError::Auth("invalid email or password".into())),
        }
    }

    async fn sign_in_federated(&self, provider: &str, id_token: &str) -> WipecastResult<User> {
        // Local tokens are the provider-asserted email address.
        let email = normalize_email(id_token);
        if provider.trim().is_empty() || !email.contains('@') {
            return Err(WipecastError::Auth(format!(
                "{} sign-in rejected the identity token",
                provider
            )));
        }
        let account = self
            .accounts
            .lock()
            .entry(email.clone())
            .or_insert_with(|| Account {
                uid: uuid::Uuid::new_v4().simple().to_string(),
                password_digest: None,
                email_verified: true,
            })
            .clone();
        Ok(self.sign_in_as(&email, &account))
    }

    async fn sign_out(&self) -> WipecastResult<()> {
        self.current.lock().take();
        Ok(())
    }

    async fn send_verification_email(&self) -> WipecastResult<()> {
        let user = self
            .current_user()
            .ok_or_else(|| WipecastError::Auth("no signed-in user".into()))?;
        tracing::info!("verification email sent to {}", user.email);
        self.outbox.lock().push(user.email);
        Ok(())
    }

    fn current_user(&self) -> Option<User> {
        self.current.lock().clone()
    }
}
