// Session management: sign-up, sign-in, sign-out and profile edits

use chrono::Utc;
use log::{error, info, warn};

use super::ChatClient;
use crate::backend::{AuthUser, MIN_PASSWORD_LEN};
use crate::error::{ChatError, Result};
use crate::models::{ProfileUpdate, User};

/// Raw sign-up input as typed into the form
#[derive(Debug, Clone, Default)]
pub struct SignUpForm {
    pub email: String,
    pub password: String,
    pub confirm_password: String,
    pub display_name: String,
    pub photo_url: Option<String>,
}

impl SignUpForm {
    /// Client-side checks run before anything reaches the identity service
    pub fn validate(&self) -> Result<()> {
        if self.email.trim().is_empty() || self.password.is_empty() || self.display_name.trim().is_empty() {
            return Err(ChatError::validation("Please fill in all required fields"));
        }
        if self.password != self.confirm_password {
            return Err(ChatError::validation("Passwords do not match"));
        }
        if self.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(ChatError::WeakCredential);
        }
        Ok(())
    }
}

fn trimmed(value: &Option<String>) -> Option<String> {
    value.as_ref().map(|v| v.trim().to_string())
}

impl ChatClient {
    /// Create an identity plus its profile document and start a session
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
        photo_url: Option<&str>,
    ) -> Result<User> {
        let display_name = display_name.trim();
        if display_name.is_empty() {
            return Err(ChatError::validation("Display name cannot be empty"));
        }

        let account = match self.backend.identity.create_user(email.trim(), password).await {
            Ok(account) => account,
            Err(e) => {
                error!("Sign up error: {}", e.code());
                return Err(e);
            }
        };

        let user = User {
            uid: account.uid.clone(),
            email: account.email.clone(),
            display_name: display_name.to_string(),
            photo_url: photo_url.map(str::to_string),
            status: self.config.default_status.clone(),
            push_token: None,
            created_at: Utc::now(),
        };
        self.backend.documents.put_user(&user).await?;
        self.backend
            .identity
            .update_profile(&user.uid, Some(display_name), photo_url)
            .await?;

        info!("Registered {} as {}", user.email, user.uid);
        self.begin_session(user.clone()).await;
        Ok(user)
    }

    /// Validate the form, then register with its contents
    pub async fn register_with_form(&self, form: &SignUpForm) -> Result<User> {
        form.validate()?;
        self.register(&form.email, &form.password, &form.display_name, form.photo_url.as_deref())
            .await
    }

    pub async fn authenticate(&self, email: &str, password: &str) -> Result<User> {
        let account = match self.backend.identity.sign_in(email.trim(), password).await {
            Ok(account) => account,
            Err(e) => {
                error!("Sign in error: {}", e.code());
                return Err(e);
            }
        };

        let user = match self.backend.documents.get_user(&account.uid).await? {
            Some(user) => user,
            None => {
                warn!("No profile document for {}, using identity record", account.uid);
                self.profile_from_account(&account)
            }
        };

        info!("Signed in as {}", user.uid);
        self.begin_session(user.clone()).await;
        Ok(user)
    }

    /// Flip presence to offline, then sign out and clear the session
    pub async fn deauthenticate(&self) -> Result<()> {
        if let Some(user) = self.current_user() {
            self.go_offline(&user.uid).await?;
            self.backend.identity.sign_out(&user.uid).await?;
            info!("Signed out {}", user.uid);
        }
        self.set_session(None);
        Ok(())
    }

    /// Partial profile update; untouched fields keep their values
    pub async fn edit_profile(&self, update: ProfileUpdate) -> Result<User> {
        let user = self.require_user()?;
        let update = ProfileUpdate {
            display_name: trimmed(&update.display_name),
            status: trimmed(&update.status),
            photo_url: update.photo_url,
            push_token: update.push_token,
        };

        if matches!(update.display_name.as_deref(), Some("")) {
            return Err(ChatError::validation("Display name cannot be empty"));
        }
        if update.is_empty() {
            return Ok(user);
        }

        let updated = self.backend.documents.update_user(&user.uid, &update).await?;
        if update.display_name.is_some() || update.photo_url.is_some() {
            self.backend
                .identity
                .update_profile(&user.uid, Some(&updated.display_name), updated.photo_url.as_deref())
                .await?;
        }

        self.set_session(Some(updated.clone()));
        Ok(updated)
    }

    /// Upload bytes to blob storage and return a retrievable URL
    pub async fn upload_image(&self, path: &str, bytes: Vec<u8>) -> Result<String> {
        self.backend.blobs.put(path, bytes).await?;
        self.backend.blobs.download_url(path).await
    }

    pub fn profile_image_path(uid: &str) -> String {
        format!("profile_images/{}_{}.jpg", uid, Utc::now().timestamp_millis())
    }

    async fn begin_session(&self, user: User) {
        let uid = user.uid.clone();
        self.set_session(Some(user));
        // Presence is advisory; a failure here must not undo the sign-in
        if let Err(e) = self.go_online(&uid).await {
            warn!("Failed to publish presence for {}: {}", uid, e);
        }
    }

    fn profile_from_account(&self, account: &AuthUser) -> User {
        User {
            uid: account.uid.clone(),
            email: account.email.clone(),
            display_name: account.display_name.clone().unwrap_or_default(),
            photo_url: account.photo_url.clone(),
            status: self.config.default_status.clone(),
            push_token: None,
            created_at: Utc::now(),
        }
    }
}
