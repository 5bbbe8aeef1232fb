// Error taxonomy shared by the client and every backend implementation.
// Variants mirror the codes the managed backend reports so callers can
// show the message in an alert and branch on the code when they need to.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ChatError>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChatError {
    #[error("The email address is already in use by another account")]
    DuplicateEmail,

    #[error("Password must be at least 6 characters")]
    WeakCredential,

    #[error("The email address is badly formatted")]
    InvalidEmail,

    #[error("The email or password is incorrect")]
    InvalidCredential,

    #[error("{0}")]
    Validation(String),

    #[error("Write rejected: {0}")]
    Write(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("No user is signed in")]
    NotSignedIn,

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),
}

impl ChatError {
    /// Backend-style error code, e.g. `auth/email-already-in-use`
    pub fn code(&self) -> &'static str {
        match self {
            ChatError::DuplicateEmail => "auth/email-already-in-use",
            ChatError::WeakCredential => "auth/weak-password",
            ChatError::InvalidEmail => "auth/invalid-email",
            ChatError::InvalidCredential => "auth/invalid-credential",
            ChatError::Validation(_) => "app/validation",
            ChatError::Write(_) => "firestore/aborted",
            ChatError::NotFound(_) => "firestore/not-found",
            ChatError::NotSignedIn => "auth/no-current-user",
            ChatError::PermissionDenied(_) => "firestore/permission-denied",
            ChatError::Unavailable(_) => "unavailable",
        }
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        ChatError::Validation(message.into())
    }
}
