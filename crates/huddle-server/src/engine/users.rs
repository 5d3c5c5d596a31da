use bytes::Bytes;
use tracing::info;

use huddle_shared::types::{AccountType, Page, UserId, UserStatus};
use huddle_store::{NewUser, PublicProfile, User};

use super::{ensure_live, non_blank, require_user, AuthSession, Caller, Engine};
use crate::error::{ServerError, ServerResult};
use crate::password::{hash_password_off_thread, verify_password_off_thread};

#[derive(Debug, Clone, Default)]
pub struct NewAccount {
    pub name: Option<String>,
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub bio: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct PasswordChange {
    pub password: Option<String>,
    pub new_password: Option<String>,
    pub confirm_password: Option<String>,
}

fn required<'a>(value: &'a Option<String>, message: &str) -> ServerResult<&'a str> {
    non_blank(value.as_deref()).ok_or_else(|| ServerError::Validation(message.to_string()))
}

// Passwords keep surrounding whitespace; only emptiness is rejected.
fn required_secret<'a>(value: &'a Option<String>, message: &str) -> ServerResult<&'a str> {
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ServerError::Validation(message.to_string()))
}

impl Engine {
    pub async fn register(&self, input: NewAccount) -> ServerResult<AuthSession> {
        let name = required(&input.name, "Provide user name")?;
        let username = required(&input.username, "Provide username")?;
        let email = required(&input.email, "Provide user email")?;
        let password = required_secret(&input.password, "Provide password")?;

        {
            let db = self.db()?;
            if let Some(existing) = db.find_live_user_by_email_or_username(email, username)? {
                let field = if existing.email == email { "email" } else { "username" };
                return Err(ServerError::Conflict(format!(
                    "User with same {field} already exists"
                )));
            }
        }

        let password_hash = hash_password_off_thread(password.to_string()).await?;
        let user = self.db()?.create_user(&NewUser {
            name,
            username,
            email,
            password_hash: &password_hash,
        })?;

        info!(user = %user.id, username = %user.username, "user registered");
        let token = self.sessions.issue(user.id, user.status)?;
        Ok(AuthSession { user, token })
    }

    /// `user_info` is either the email or the username.
    pub async fn login(
        &self,
        user_info: Option<String>,
        password: Option<String>,
    ) -> ServerResult<AuthSession> {
        let user_info = required(&user_info, "Please provide email or username")?;
        let password = required_secret(&password, "Please provide the account password")?;

        let user = self
            .db()?
            .find_user_by_login(user_info)?
            .ok_or_else(|| ServerError::NotFound("No user found".to_string()))?;
        if user.status != UserStatus::Active {
            return Err(ServerError::Authorization(
                "Account is not allowed to log in".to_string(),
            ));
        }
        if !verify_password_off_thread(password.to_string(), user.password_hash.clone()).await? {
            return Err(ServerError::Authentication(
                "Password is not correct".to_string(),
            ));
        }

        info!(user = %user.id, "user logged in");
        let token = self.sessions.issue(user.id, user.status)?;
        Ok(AuthSession { user, token })
    }

    pub async fn get_profile(&self, id: UserId) -> ServerResult<User> {
        self.db()?
            .get_user(id)?
            .ok_or_else(|| ServerError::NotFound("No user profile found".to_string()))
    }

    pub async fn update_profile(
        &self,
        caller: &Caller,
        update: ProfileUpdate,
        image: Option<Bytes>,
    ) -> ServerResult<User> {
        ensure_live(&*self.db()?, caller)?;
        let profile_image = self.upload_image(image).await?;

        let db = self.db()?;
        ensure_live(&db, caller)?;
        let user = db
            .update_user_profile(
                caller.user_id,
                non_blank(update.name.as_deref()),
                non_blank(update.bio.as_deref()),
                profile_image.as_deref(),
            )?
            .ok_or_else(|| ServerError::NotFound("No user profile found".to_string()))?;

        info!(user = %user.id, "profile updated");
        Ok(user)
    }

    pub async fn reset_password(&self, caller: &Caller, change: PasswordChange) -> ServerResult<User> {
        let current = required_secret(&change.password, "Please provide password")?;
        let new_password = required_secret(&change.new_password, "Please provide new password")?;
        let confirm = required_secret(&change.confirm_password, "Please provide confirm password")?;
        if new_password != confirm {
            return Err(ServerError::Validation(
                "Confirm password & New password did not match".to_string(),
            ));
        }

        let stored = ensure_live(&*self.db()?, caller)?.password_hash;
        if !verify_password_off_thread(current.to_string(), stored).await? {
            return Err(ServerError::Authentication(
                "Password did not match".to_string(),
            ));
        }

        let new_hash = hash_password_off_thread(new_password.to_string()).await?;
        let user = self
            .db()?
            .set_user_password(caller.user_id, &new_hash)?
            .ok_or_else(|| ServerError::NotFound("No user profile found".to_string()))?;

        info!(user = %user.id, "password changed");
        Ok(user)
    }

    /// Active accounts matching `value` in name or username, with the total
    /// for pagination.
    pub async fn search_users(
        &self,
        caller: &Caller,
        value: Option<&str>,
        page: Page,
    ) -> ServerResult<(Vec<PublicProfile>, u64)> {
        let term = non_blank(value);
        let db = self.db()?;
        let users = db.search_users(term, Some(caller.user_id), page)?;

        let count_exclude = self
            .policy
            .discovery_count_excludes_own
            .then_some(caller.user_id);
        let total = db.count_users(term, count_exclude)?;
        Ok((users, total))
    }

    /// Soft-delete the caller's own account.
    pub async fn delete_account(&self, caller: &Caller) -> ServerResult<User> {
        let db = self.db()?;
        let user = db
            .get_user(caller.user_id)?
            .ok_or_else(|| ServerError::NotFound("User not found".to_string()))?;
        if user.status == UserStatus::Deleted {
            return Err(ServerError::Conflict(
                "Account has already been deleted".to_string(),
            ));
        }

        let next = user.status.transition(UserStatus::Deleted)?;
        let user = db
            .set_user_status(caller.user_id, next)?
            .ok_or_else(|| ServerError::NotFound("User not found".to_string()))?;

        info!(user = %user.id, "account deleted");
        Ok(user)
    }

    /// Operator status change through the user transition table.
    pub async fn set_user_status(&self, id: UserId, status: UserStatus) -> ServerResult<User> {
        let db = self.db()?;
        let user = require_user(&db, id)?;
        let next = user.status.transition(status)?;

        let updated = db
            .set_user_status(id, next)?
            .ok_or_else(|| ServerError::NotFound("No user found".to_string()))?;
        info!(user = %id, from = %user.status, to = %next, "user status changed");
        Ok(updated)
    }

    pub async fn set_account_type(&self, id: UserId, account_type: AccountType) -> ServerResult<User> {
        let db = self.db()?;
        let user = db
            .set_account_type(id, account_type)?
            .ok_or_else(|| ServerError::NotFound("No user found".to_string()))?;
        info!(user = %id, account_type = %account_type, "account type changed");
        Ok(user)
    }
}
