//! Student entity - A pupil holding an IQ-coin balance.
//!
//! The balance is only ever changed by the ledger, in the same database
//! transaction as the journal row that explains the change. Students are never
//! deleted in normal operation; `is_active` and `is_hidden` soft-disable them.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Student database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "students")]
pub struct Model {
    /// Unique identifier for the student
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Student's display name
    pub name: String,
    /// Teacher (or admin) who owns this student
    pub teacher_id: i64,
    /// Current IQ-coin balance
    pub balance: i64,
    /// Login phone number; siblings may share one
    pub phone_number: Option<String>,
    /// Inactive students cannot log in and drop out of phone groups
    pub is_active: bool,
    /// Hidden students are left out of dashboards and award/deduct candidates
    pub is_hidden: bool,
}

/// Defines relationships between Student and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each student belongs to one owning teacher
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::TeacherId",
        to = "super::user::Column::Id",
        on_delete = "Cascade"
    )]
    Teacher,
    /// One student has many transactions
    #[sea_orm(has_many = "super::transaction::Entity")]
    Transactions,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Teacher.def()
    }
}

impl Related<super::transaction::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Transactions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
