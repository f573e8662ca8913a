//! Login, signup and the rules that keep a session valid.

pub mod session;
pub mod sync;

use chrono::{SubsecRound, Utc};

use crate::accounts::{Account, AdminAllowList, DynAccountRepository};
use crate::error::{AppError, AppResult, CredentialFailure};
use crate::identity::{normalize_email, DynIdentityService, IdentityError, IdentityId, ResetToken};
use session::SessionContext;

pub use sync::SyncHandle;

/// At sign-in a malformed email is a credential problem, not a signup one.
fn credential_error(err: IdentityError) -> AppError {
    match err {
        IdentityError::InvalidEmail => AppError::InvalidCredential(CredentialFailure::InvalidEmail),
        other => other.into(),
    }
}

#[derive(Debug, Clone, Default)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
    pub full_name: String,
    pub phone: String,
    pub national_id: String,
}

/// Session lifecycle for one client.
#[derive(Clone)]
pub struct AccessControl {
    identity: DynIdentityService,
    accounts: DynAccountRepository,
    session: SessionContext,
    admins: AdminAllowList,
}

impl AccessControl {
    pub fn new(
        identity: DynIdentityService,
        accounts: DynAccountRepository,
        session: SessionContext,
        admins: AdminAllowList,
    ) -> Self {
        Self {
            identity,
            accounts,
            session,
            admins,
        }
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    pub(crate) fn identity_service(&self) -> &DynIdentityService {
        &self.identity
    }

    pub(crate) fn accounts(&self) -> &DynAccountRepository {
        &self.accounts
    }

    pub async fn login(&self, email: &str, password: &str) -> AppResult<Account> {
        let id = self
            .identity
            .authenticate(email, password)
            .await
            .map_err(credential_error)?;

        let account = match self.accounts.get(&id).await {
            Ok(Some(account)) => account,
            Ok(None) => {
                tracing::error!("Identity {} has no account, signing out", id);
                self.sign_out_identity(&id).await;
                return Err(AppError::NotFound);
            }
            Err(e) => {
                self.sign_out_identity(&id).await;
                return Err(e.into());
            }
        };

        if account.is_blocked {
            tracing::info!("Blocked account {} refused at login", id);
            self.sign_out_identity(&id).await;
            return Err(AppError::Blocked);
        }

        self.session.establish(account.clone());
        tracing::info!("{} signed in as {}", id, account.role);
        Ok(account)
    }

    pub async fn signup(&self, request: SignupRequest) -> AppResult<Account> {
        let email = normalize_email(&request.email);
        let id = self
            .identity
            .create_identity(&email, &request.password)
            .await?;

        let account = Account {
            id,
            role: self.admins.role_for(&email),
            email,
            full_name: request.full_name.trim().to_string(),
            phone: request.phone.trim().to_string(),
            national_id: request.national_id.trim().to_string(),
            is_blocked: false,
            // Stored with microsecond precision
            created_at: Utc::now().trunc_subsecs(6),
        };

        if let Err(e) = self.accounts.create(&account).await {
            // Without an account the identity could never log in; undo it.
            if let Err(undo) = self.identity.delete_identity(&account.id).await {
                tracing::warn!("Could not remove orphaned identity {}: {}", account.id, undo);
            }
            return Err(e.into());
        }

        self.session.establish(account.clone());
        tracing::info!("New {} account {}", account.role, account.id);
        Ok(account)
    }

    /// End this client's session. Other clients signed in as the same user
    /// stay signed in. Succeeds when nobody is signed in.
    pub async fn logout(&self) -> AppResult<()> {
        if let Some(account) = self.session.clear() {
            tracing::info!("{} signed out", account.id);
        }
        Ok(())
    }

    /// Flip a user's blocked flag and return the new value.
    pub async fn toggle_block(&self, user_id: &IdentityId) -> AppResult<bool> {
        self.session.require_admin()?;
        let target = self
            .accounts
            .get(user_id)
            .await?
            .ok_or(AppError::NotFound)?;

        let blocked = !target.is_blocked;
        self.apply_block(user_id, blocked).await?;
        Ok(blocked)
    }

    /// Set the blocked flag to `blocked`. Nothing happens when it already has
    /// that value.
    pub async fn set_blocked(&self, user_id: &IdentityId, blocked: bool) -> AppResult<()> {
        self.session.require_admin()?;
        let target = self
            .accounts
            .get(user_id)
            .await?
            .ok_or(AppError::NotFound)?;

        if target.is_blocked != blocked {
            self.apply_block(user_id, blocked).await?;
        }
        Ok(())
    }

    async fn apply_block(&self, user_id: &IdentityId, blocked: bool) -> AppResult<()> {
        self.accounts.set_blocked(user_id, blocked).await?;
        tracing::info!(
            "User {} {}",
            user_id,
            if blocked { "blocked" } else { "unblocked" }
        );

        // Other clients signed in as this user re-check their session.
        if let Err(e) = self.identity.refresh(user_id).await {
            tracing::warn!("Could not publish refresh for {}: {}", user_id, e);
        }

        if blocked && self.session.is_signed_in_as(user_id) {
            self.logout().await?;
        }
        Ok(())
    }

    /// Issue a single-use reset token for the account behind `email`. The
    /// platform shell delivers it to the user.
    pub async fn request_password_reset(&self, email: &str) -> AppResult<ResetToken> {
        let token = self
            .identity
            .issue_password_reset(email)
            .await
            .map_err(credential_error)?;
        Ok(token)
    }

    pub async fn confirm_password_reset(
        &self,
        token: &ResetToken,
        new_password: &str,
    ) -> AppResult<()> {
        self.identity
            .confirm_password_reset(token, new_password)
            .await?;
        tracing::info!("Password reset completed");
        Ok(())
    }

    /// Start listening for auth-state changes that affect this session.
    pub fn spawn_sync(&self) -> SyncHandle {
        sync::spawn(
            self.identity.clone(),
            self.accounts.clone(),
            self.session.clone(),
        )
    }

    async fn sign_out_identity(&self, id: &IdentityId) {
        if let Err(e) = self.identity.sign_out(id).await {
            tracing::warn!("Sign-out of {} failed: {}", id, e);
        }
    }
}
