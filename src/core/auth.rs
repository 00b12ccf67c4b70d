//! Authentication - Password hashing and the two login entry points.
//!
//! Staff log in with username and password. Students and parents log in with a
//! phone number only; the first active student carrying that phone seeds a
//! synthetic account, and the phone is kept in the session so the whole sibling
//! group stays visible.

use crate::{
    core::{
        access::{self, Principal},
        user,
    },
    entities::{Student, student},
    errors::{Error, Result},
};
use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
};
use rand::rngs::OsRng;
use sea_orm::{QueryOrder, prelude::*};
use tracing::{error, info, instrument, warn};

/// Hashes a password with argon2 and a random salt.
pub fn hash_password(plain: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| {
            error!(error = %e, "argon2 hash_password error");
            Error::PasswordHash {
                message: e.to_string(),
            }
        })
}

/// Checks `plain` against a stored argon2 hash.
///
/// Returns `Ok(false)` for a wrong password and an error only when the stored
/// hash cannot be parsed.
pub fn verify_password(plain: &str, hash: &str) -> Result<bool> {
    let parsed = PasswordHash::new(hash).map_err(|e| Error::PasswordHash {
        message: e.to_string(),
    })?;
    Ok(Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok())
}

/// Username and password login.
///
/// Unknown, inactive and password-less users, wrong passwords and unreadable
/// hashes all produce [`Error::InvalidCredentials`].
#[instrument(skip(db, password))]
pub async fn authenticate_password(
    db: &DatabaseConnection,
    username: &str,
    password: &str,
) -> Result<Principal> {
    let account = user::get_user_by_username(db, username.trim())
        .await?
        .filter(|u| u.is_active)
        .ok_or(Error::InvalidCredentials)?;

    let Some(hash) = account.password_hash.as_deref() else {
        warn!("Password login attempted for an account without a password");
        return Err(Error::InvalidCredentials);
    };
    if !verify_password(password, hash).unwrap_or(false) {
        warn!("Password login rejected");
        return Err(Error::InvalidCredentials);
    }

    let principal = access::principal_for(db, account.id, None).await?;
    info!(role = %principal.role, "Password login");
    Ok(principal)
}

/// First active student carrying exactly `phone`, by id.
async fn first_active_with_phone(db: &DatabaseConnection, phone: &str) -> Result<Option<student::Model>> {
    Student::find()
        .filter(student::Column::PhoneNumber.eq(phone))
        .filter(student::Column::IsActive.eq(true))
        .order_by_asc(student::Column::Id)
        .one(db)
        .await
        .map_err(Into::into)
}

/// Phone-number login for students and parents.
///
/// The returned principal carries the phone, which the caller keeps in the
/// session.
#[instrument(skip(db))]
pub async fn authenticate_phone(db: &DatabaseConnection, phone: &str) -> Result<Principal> {
    let phone = phone.trim();
    if phone.is_empty() {
        return Err(Error::validation("Phone number cannot be empty"));
    }

    let Some(seed) = first_active_with_phone(db, phone).await? else {
        warn!("Phone login with no matching active student");
        return Err(Error::InvalidCredentials);
    };

    let (account, profile) = user::ensure_synthetic_account(db, &seed, Some(phone)).await?;
    info!(username = %account.username, role = %profile.role, "Phone login");

    access::principal_for(db, account.id, Some(phone)).await
}
