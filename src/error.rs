use std::fmt;

use crate::db::RepositoryError;
use crate::identity::IdentityError;

/// Why a credential check was rejected, in terms a user can act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialFailure {
    InvalidEmail,
    WrongPassword,
    Disabled,
    UserNotFound,
}

impl fmt::Display for CredentialFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidEmail => write!(f, "Invalid email address"),
            Self::WrongPassword => write!(f, "Invalid password"),
            Self::Disabled => write!(f, "This account has been disabled"),
            Self::UserNotFound => write!(f, "User not found"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    InvalidCredential(CredentialFailure),

    #[error("Email already exists")]
    EmailInUse,

    #[error("Password is too weak")]
    WeakPassword,

    #[error("Invalid email address")]
    InvalidEmail,

    #[error("Account is blocked")]
    Blocked,

    #[error("Not found")]
    NotFound,

    #[error("Login required")]
    Unauthenticated,

    #[error("Forbidden")]
    Forbidden,

    #[error("Network error")]
    NetworkError,

    #[error("Channel unavailable")]
    ChannelUnavailable,

    #[error("Location permission denied")]
    PermissionDenied,

    #[error("Invalid input: {0}")]
    Validation(String),
}

impl From<IdentityError> for AppError {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::InvalidEmail => AppError::InvalidEmail,
            IdentityError::EmailAlreadyInUse => AppError::EmailInUse,
            IdentityError::WeakPassword => AppError::WeakPassword,
            IdentityError::WrongPassword => {
                AppError::InvalidCredential(CredentialFailure::WrongPassword)
            }
            IdentityError::UserDisabled => AppError::InvalidCredential(CredentialFailure::Disabled),
            IdentityError::UserNotFound => {
                AppError::InvalidCredential(CredentialFailure::UserNotFound)
            }
            IdentityError::InvalidResetToken => {
                AppError::Validation("Reset link is invalid or expired".into())
            }
            other => {
                tracing::error!("Identity service error: {}", other);
                AppError::NetworkError
            }
        }
    }
}

impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(_) => AppError::NotFound,
            RepositoryError::Conflict(msg) => AppError::Validation(msg),
            other => {
                tracing::error!("Document store error: {}", other);
                AppError::NetworkError
            }
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrong_password_maps_to_invalid_credential() {
        let err: AppError = IdentityError::WrongPassword.into();
        assert!(matches!(
            err,
            AppError::InvalidCredential(CredentialFailure::WrongPassword)
        ));
    }

    #[test]
    fn signup_errors_keep_their_category() {
        assert!(matches!(
            AppError::from(IdentityError::EmailAlreadyInUse),
            AppError::EmailInUse
        ));
        assert!(matches!(
            AppError::from(IdentityError::WeakPassword),
            AppError::WeakPassword
        ));
        assert!(matches!(
            AppError::from(IdentityError::InvalidEmail),
            AppError::InvalidEmail
        ));
    }

    #[test]
    fn backend_failures_become_network_errors() {
        let err: AppError = IdentityError::Unavailable("connection reset".into()).into();
        assert!(matches!(err, AppError::NetworkError));

        let err: AppError = RepositoryError::Sql(rusqlite::Error::InvalidQuery).into();
        assert!(matches!(err, AppError::NetworkError));
    }

    #[test]
    fn missing_document_maps_to_not_found() {
        let err: AppError = RepositoryError::NotFound("users/abc".into()).into();
        assert!(matches!(err, AppError::NotFound));
    }

    #[test]
    fn credential_failure_messages_are_user_facing() {
        assert_eq!(
            AppError::InvalidCredential(CredentialFailure::Disabled).to_string(),
            "This account has been disabled"
        );
    }
}
