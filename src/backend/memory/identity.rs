use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use log::{debug, info};
use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex as TokioMutex;
use uuid::Uuid;

use crate::backend::{AuthUser, IdentityProvider, MIN_PASSWORD_LEN};
use crate::error::{ChatError, Result};

static EMAIL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is valid"));

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_PATTERN.is_match(email)
}

struct Account {
    user: AuthUser,
    salt: String,
    password_digest: String,
}

fn digest_password(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Default)]
pub struct MemoryIdentity {
    // keyed by lower-cased email
    accounts: TokioMutex<HashMap<String, Account>>,
    signed_in: TokioMutex<HashSet<String>>,
}

impl MemoryIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn is_signed_in(&self, uid: &str) -> bool {
        self.signed_in.lock().await.contains(uid)
    }
}

#[async_trait]
impl IdentityProvider for MemoryIdentity {
    async fn create_user(&self, email: &str, password: &str) -> Result<AuthUser> {
        if !is_valid_email(email) {
            return Err(ChatError::InvalidEmail);
        }
        let key = email.to_lowercase();

        let mut accounts = self.accounts.lock().await;
        if accounts.contains_key(&key) {
            return Err(ChatError::DuplicateEmail);
        }
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(ChatError::WeakCredential);
        }

        let salt = Uuid::new_v4().simple().to_string();
        let user = AuthUser {
            uid: Uuid::new_v4().simple().to_string(),
            email: email.to_string(),
            display_name: None,
            photo_url: None,
        };
        accounts.insert(
            key,
            Account {
                user: user.clone(),
                password_digest: digest_password(&salt, password),
                salt,
            },
        );
        drop(accounts);

        self.signed_in.lock().await.insert(user.uid.clone());
        info!("Created account {} for {}", user.uid, user.email);
        Ok(user)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthUser> {
        if !is_valid_email(email) {
            return Err(ChatError::InvalidEmail);
        }

        let user = {
            let accounts = self.accounts.lock().await;
            let account = accounts
                .get(&email.to_lowercase())
                .ok_or(ChatError::InvalidCredential)?;
            if digest_password(&account.salt, password) != account.password_digest {
                debug!("Password mismatch for {}", email);
                return Err(ChatError::InvalidCredential);
            }
            account.user.clone()
        };

        self.signed_in.lock().await.insert(user.uid.clone());
        Ok(user)
    }

    async fn sign_out(&self, uid: &str) -> Result<()> {
        self.signed_in.lock().await.remove(uid);
        Ok(())
    }

    async fn update_profile(
        &self,
        uid: &str,
        display_name: Option<&str>,
        photo_url: Option<&str>,
    ) -> Result<AuthUser> {
        let mut accounts = self.accounts.lock().await;
        let account = accounts
            .values_mut()
            .find(|account| account.user.uid == uid)
            .ok_or_else(|| ChatError::NotFound(format!("account {}", uid)))?;

        if let Some(name) = display_name {
            account.user.display_name = Some(name.to_string());
        }
        if let Some(photo) = photo_url {
            account.user.photo_url = Some(photo.to_string());
        }
        Ok(account.user.clone())
    }
}
