//! Argon2 password hashing.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

use crate::error::{ServerError, ServerResult};

/// Hash a password into a PHC string.
pub fn hash_password(password: &str) -> ServerResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| {
            tracing::error!(error = %e, "password hashing failed");
            ServerError::Upstream("Password hashing failed".to_string())
        })
}

/// `Ok(false)` on mismatch; `Err` only when the stored hash is unreadable.
pub fn verify_password(password: &str, stored: &str) -> ServerResult<bool> {
    let parsed = PasswordHash::new(stored).map_err(|e| {
        tracing::error!(error = %e, "stored password hash is invalid");
        ServerError::Upstream("Invalid password hash".to_string())
    })?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// [`hash_password`] on the blocking thread pool.
pub async fn hash_password_off_thread(password: String) -> ServerResult<String> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(join_error)?
}

/// [`verify_password`] on the blocking thread pool.
pub async fn verify_password_off_thread(password: String, stored: String) -> ServerResult<bool> {
    tokio::task::spawn_blocking(move || verify_password(&password, &stored))
        .await
        .map_err(join_error)?
}

fn join_error(err: tokio::task::JoinError) -> ServerError {
    tracing::error!(error = %err, "password task failed");
    ServerError::Upstream("Password hashing failed".to_string())
}
