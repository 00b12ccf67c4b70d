//! Profile entity - The role record attached one-to-one to every user.
//!
//! Profiles are created lazily by the role resolver the first time a user without
//! one is seen. `linked_student_id` ties student and parent accounts to a student.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The closed set of roles a profile can hold.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(10))")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Views own balance and history
    #[sea_orm(string_value = "student")]
    Student,
    /// Manages own students and their coins
    #[sea_orm(string_value = "teacher")]
    Teacher,
    /// Unrestricted staff
    #[sea_orm(string_value = "admin")]
    Admin,
    /// Views every student sharing the login phone number
    #[sea_orm(string_value = "parent")]
    Parent,
}

impl Role {
    /// Stable lowercase name, identical to the stored value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::Teacher => "teacher",
            Self::Admin => "admin",
            Self::Parent => "parent",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Profile database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "profiles")]
pub struct Model {
    /// Unique identifier for the profile
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Owning user; the unique constraint enforces one profile per user
    #[sea_orm(unique)]
    pub user_id: i64,
    /// Resolved role
    pub role: Role,
    /// Student this account logs in for (students and parents only)
    pub linked_student_id: Option<i64>,
    /// Full name, used to match teachers during bulk import
    pub full_name: Option<String>,
}

/// Defines relationships between Profile and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each profile belongs to one user
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id",
        on_delete = "Cascade"
    )]
    User,
    /// Optional link to a student record
    #[sea_orm(
        belongs_to = "super::student::Entity",
        from = "Column::LinkedStudentId",
        to = "super::student::Column::Id",
        on_delete = "SetNull"
    )]
    LinkedStudent,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
