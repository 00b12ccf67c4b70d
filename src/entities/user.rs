//! User entity - Login identities for staff and synthetic student accounts.
//!
//! Staff accounts carry an argon2 password hash. Accounts created for phone-based
//! logins are named `student_<id>` and have no password at all.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// User database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "users")]
pub struct Model {
    /// Unique identifier for the user
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Login handle, unique across all users
    #[sea_orm(unique)]
    pub username: String,
    /// Argon2 PHC string; `None` for synthetic student accounts
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    /// Display name (the student's name for synthetic accounts)
    pub first_name: String,
    /// Inactive users cannot log in
    pub is_active: bool,
    /// When the account was created
    pub date_joined: DateTimeUtc,
}

/// Defines relationships between User and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each user has at most one profile
    #[sea_orm(has_one = "super::profile::Entity")]
    Profile,
    /// A teacher owns many students
    #[sea_orm(has_many = "super::student::Entity")]
    Students,
    /// A teacher authored many transactions
    #[sea_orm(has_many = "super::transaction::Entity")]
    Transactions,
}

impl Related<super::profile::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Profile.def()
    }
}

impl Related<super::student::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Students.def()
    }
}

impl Related<super::transaction::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Transactions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
