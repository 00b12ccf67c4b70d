//! Shared test utilities for the IQ-coin service.
//!
//! This module provides common helper functions for setting up test databases
//! and creating test users and students with sensible defaults.

use crate::{
    core::{
        access::{self, Principal},
        role,
        user::{self, NewUser},
    },
    entities::{self, Role},
    errors::Result,
};
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};

/// Password given to staff created by [`create_teacher_with_password`].
pub const TEST_PASSWORD: &str = "chalkboard-42";

/// Installs a test-writer tracing subscriber once; later calls are no-ops.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("iqcoin=debug")
        .with_test_writer()
        .try_init();
}

/// Creates an in-memory `SQLite` database with all tables initialized.
/// This is the standard setup for all integration tests.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    init_test_tracing();
    let db = sea_orm::Database::connect("sqlite::memory:").await?;
    crate::config::database::create_tables(&db).await?;
    Ok(db)
}

/// Inserts a user row without a profile, the state a profile-less legacy
/// account is in.
pub async fn insert_bare_user(db: &DatabaseConnection, username: &str) -> Result<entities::UserModel> {
    entities::user::ActiveModel {
        username: Set(username.to_string()),
        password_hash: Set(None),
        first_name: Set(String::new()),
        is_active: Set(true),
        date_joined: Set(chrono::Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await
    .map_err(Into::into)
}

/// Creates a teacher account through the normal user-creation path.
///
/// # Defaults
/// * password: none (skips argon2, which is slow in debug builds)
/// * `first_name`: the username
pub async fn create_test_teacher(db: &DatabaseConnection, username: &str) -> Result<entities::UserModel> {
    let (created, _) = user::create_user(
        db,
        NewUser {
            username,
            password: None,
            first_name: username,
        },
    )
    .await?;
    Ok(created)
}

/// Creates a teacher that can log in with `password`.
pub async fn create_teacher_with_password(
    db: &DatabaseConnection,
    username: &str,
    password: &str,
) -> Result<entities::UserModel> {
    let (created, _) = user::create_user(
        db,
        NewUser {
            username,
            password: Some(password),
            first_name: username,
        },
    )
    .await?;
    Ok(created)
}

/// Creates a teacher and promotes it to admin.
pub async fn create_test_admin(db: &DatabaseConnection, username: &str) -> Result<entities::UserModel> {
    let created = create_test_teacher(db, username).await?;
    role::set_role(db, username, Role::Admin).await?;
    Ok(created)
}

/// Inserts a student directly, without provisioning a synthetic account.
///
/// # Arguments
/// * `db` - Database connection
/// * `teacher_id` - Owning teacher
/// * `name` - Student name
/// * `phone` - Optional login phone
///
/// # Defaults
/// * balance: 0
/// * active, not hidden
pub async fn create_custom_student(
    db: &DatabaseConnection,
    teacher_id: i64,
    name: &str,
    phone: Option<&str>,
) -> Result<entities::StudentModel> {
    entities::student::ActiveModel {
        name: Set(name.to_string()),
        teacher_id: Set(teacher_id),
        balance: Set(0),
        phone_number: Set(phone.map(ToString::to_string)),
        is_active: Set(true),
        is_hidden: Set(false),
        ..Default::default()
    }
    .insert(db)
    .await
    .map_err(Into::into)
}

/// Creates a student without a phone.
pub async fn create_test_student(
    db: &DatabaseConnection,
    teacher_id: i64,
    name: &str,
) -> Result<entities::StudentModel> {
    create_custom_student(db, teacher_id, name, None).await
}

/// Loads the principal of `account` as a password login would.
pub async fn principal_of(db: &DatabaseConnection, account: &entities::UserModel) -> Result<Principal> {
    access::principal_for(db, account.id, None).await
}

/// Sets up a database with one teacher owning one student.
/// Returns (db, teacher, student) for common ledger scenarios.
pub async fn setup_with_student() -> Result<(
    DatabaseConnection,
    entities::UserModel,
    entities::StudentModel,
)> {
    let db = setup_test_db().await?;
    let teacher = create_test_teacher(&db, "teacher").await?;
    let student = create_test_student(&db, teacher.id, "Student One").await?;
    Ok((db, teacher, student))
}
