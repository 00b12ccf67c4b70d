//! User accounts - Staff logins and synthetic student accounts.
//!
//! Creating a user always ends by ensuring its profile inside the same database
//! transaction, so no committed user is ever left without one.

use crate::{
    core::{auth, role},
    entities::{User, profile, student, user},
    errors::{Error, Result},
};
use sea_orm::{Set, TransactionTrait, prelude::*, sea_query::OnConflict};
use tracing::{info, instrument};

/// Username prefix of accounts created for phone-based logins.
pub const SYNTHETIC_PREFIX: &str = "student_";

/// Username of the synthetic account for `student_id`.
#[must_use]
pub fn synthetic_username(student_id: i64) -> String {
    format!("{SYNTHETIC_PREFIX}{student_id}")
}

/// Finds a user by username.
pub async fn get_user_by_username<C>(db: &C, username: &str) -> Result<Option<user::Model>>
where
    C: ConnectionTrait,
{
    User::find()
        .filter(user::Column::Username.eq(username))
        .one(db)
        .await
        .map_err(Into::into)
}

/// Finds a user by id.
pub async fn get_user_by_id<C>(db: &C, user_id: i64) -> Result<Option<user::Model>>
where
    C: ConnectionTrait,
{
    User::find_by_id(user_id).one(db).await.map_err(Into::into)
}

/// Input for [`create_user`].
#[derive(Debug, Clone, Copy)]
pub struct NewUser<'a> {
    /// Unique login handle
    pub username: &'a str,
    /// Plain-text password; `None` creates an account that cannot password-login
    pub password: Option<&'a str>,
    /// Display name
    pub first_name: &'a str,
}

/// Creates a user and its profile atomically.
///
/// The profile comes from the role resolver, so a plain staff handle becomes a
/// `teacher`. Use [`role::set_role`] afterwards to promote an admin.
#[instrument(skip(db, new_user), fields(username = new_user.username))]
pub async fn create_user(
    db: &DatabaseConnection,
    new_user: NewUser<'_>,
) -> Result<(user::Model, profile::Model)> {
    let username = new_user.username.trim();
    if username.is_empty() {
        return Err(Error::validation("Username cannot be empty"));
    }
    if username.starts_with(SYNTHETIC_PREFIX) {
        return Err(Error::validation(format!(
            "Usernames starting with '{SYNTHETIC_PREFIX}' are reserved for phone logins"
        )));
    }
    let password_hash = new_user.password.map(auth::hash_password).transpose()?;

    let txn = db.begin().await?;

    if get_user_by_username(&txn, username).await?.is_some() {
        return Err(Error::validation(format!(
            "Username '{username}' is already taken"
        )));
    }

    let created = user::ActiveModel {
        username: Set(username.to_string()),
        password_hash: Set(password_hash),
        first_name: Set(new_user.first_name.trim().to_string()),
        is_active: Set(true),
        date_joined: Set(chrono::Utc::now()),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    let profile = role::ensure_profile(&txn, &created, None).await?;

    txn.commit().await?;

    info!(role = %profile.role, "Created user");
    Ok((created, profile))
}

/// Gets or creates the synthetic account for `student` and stores its resolved
/// role and link.
#[instrument(skip(db, student), fields(student_id = student.id))]
pub async fn ensure_synthetic_account<C>(
    db: &C,
    student: &student::Model,
    session_phone: Option<&str>,
) -> Result<(user::Model, profile::Model)>
where
    C: ConnectionTrait,
{
    let username = synthetic_username(student.id);

    User::insert(user::ActiveModel {
        username: Set(username.clone()),
        password_hash: Set(None),
        first_name: Set(student.name.clone()),
        is_active: Set(true),
        date_joined: Set(chrono::Utc::now()),
        ..Default::default()
    })
    .on_conflict(
        OnConflict::column(user::Column::Username)
            .do_nothing()
            .to_owned(),
    )
    .exec_without_returning(db)
    .await?;

    let account = get_user_by_username(db, &username)
        .await?
        .ok_or_else(|| Error::UserNotFound {
            username: username.clone(),
        })?;

    let profile = role::store_resolution(db, &account, session_phone).await?;
    Ok((account, profile))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::entities::{Profile, Role};
    use crate::test_utils::*;

    #[test]
    fn test_synthetic_username_round_trips_through_classifier() {
        let name = synthetic_username(15);
        assert_eq!(name, "student_15");
        assert_eq!(role::classify_handle(&name), role::HandleKind::Synthetic(15));
    }

    #[tokio::test]
    async fn test_create_user_creates_profile_in_same_step() -> Result<()> {
        let db = setup_test_db().await?;
        let (created, profile) = create_user(
            &db,
            NewUser {
                username: "  ms_green ",
                password: Some("chalkboard"),
                first_name: "Olga",
            },
        )
        .await?;

        assert_eq!(created.username, "ms_green");
        assert!(created.password_hash.is_some());
        assert_eq!(profile.user_id, created.id);
        assert_eq!(profile.role, Role::Teacher);
        Ok(())
    }

    #[tokio::test]
    async fn test_create_user_rejects_reserved_prefix() -> Result<()> {
        let db = setup_test_db().await?;
        let (teacher, _) = create_user(
            &db,
            NewUser {
                username: "teacher",
                password: None,
                first_name: "",
            },
        )
        .await?;
        let student = create_test_student(&db, teacher.id, "Ann").await?;

        let reserved = create_user(
            &db,
            NewUser {
                username: &synthetic_username(student.id),
                password: Some("chalkboard"),
                first_name: "",
            },
        )
        .await;
        assert!(matches!(reserved, Err(Error::Validation { .. })));
        assert!(
            get_user_by_username(&db, &synthetic_username(student.id))
                .await?
                .is_none()
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_create_user_rejects_duplicates_and_blank() -> Result<()> {
        let db = setup_test_db().await?;
        create_test_teacher(&db, "dup").await?;

        let duplicate = create_user(
            &db,
            NewUser {
                username: "dup",
                password: None,
                first_name: "",
            },
        )
        .await;
        assert!(matches!(duplicate, Err(Error::Validation { .. })));

        let blank = create_user(
            &db,
            NewUser {
                username: "   ",
                password: None,
                first_name: "",
            },
        )
        .await;
        assert!(matches!(blank, Err(Error::Validation { .. })));
        assert_eq!(User::find().all(&db).await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_ensure_synthetic_account_is_idempotent() -> Result<()> {
        let db = setup_test_db().await?;
        let teacher = create_test_teacher(&db, "teacher").await?;
        let student = create_custom_student(&db, teacher.id, "Ann", Some("+1000")).await?;

        let (first, first_profile) = ensure_synthetic_account(&db, &student, None).await?;
        let (second, second_profile) = ensure_synthetic_account(&db, &student, None).await?;

        assert_eq!(first.id, second.id);
        assert_eq!(first.username, "student_".to_string() + &student.id.to_string());
        assert_eq!(first.first_name, "Ann");
        assert!(first.password_hash.is_none());
        assert_eq!(first_profile, second_profile);
        assert_eq!(first_profile.role, Role::Student);
        assert_eq!(first_profile.linked_student_id, Some(student.id));

        let profiles = Profile::find()
            .filter(profile::Column::UserId.eq(first.id))
            .all(&db)
            .await?;
        assert_eq!(profiles.len(), 1);
        Ok(())
    }
}
