//! Transaction entity - The IQ-coin journal.
//!
//! Each row records one award or deduction for one student by one teacher.
//! Rows are immutable apart from the amount of an AWARD, which may be corrected
//! once or more; `edited` is flipped when that happens.
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Direction of a journal entry.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(10))")]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionType {
    /// Coins added to the balance
    #[sea_orm(string_value = "AWARD")]
    Award,
    /// Coins removed from the balance
    #[sea_orm(string_value = "DEDUCT")]
    Deduct,
}

impl TransactionType {
    /// Signed effect of `amount` on a balance.
    #[must_use]
    pub const fn signed(self, amount: i64) -> i64 {
        match self {
            Self::Award => amount,
            Self::Deduct => -amount,
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Award => "AWARD",
            Self::Deduct => "DEDUCT",
        })
    }
}

/// Transaction database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "transactions")]
pub struct Model {
    /// Unique identifier for the transaction
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Award or deduction
    pub transaction_type: TransactionType,
    /// Always positive; direction comes from `transaction_type`
    pub amount: i64,
    /// Student whose balance this entry explains
    pub student_id: i64,
    /// Acting teacher or admin
    pub teacher_id: i64,
    /// When the entry was created, never changed afterwards
    pub timestamp: DateTimeUtc,
    /// Free text; mandatory for deductions
    pub comment: Option<String>,
    /// Set once an award amount has been corrected
    pub edited: bool,
}

/// Defines relationships between Transaction and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each transaction belongs to one student
    #[sea_orm(
        belongs_to = "super::student::Entity",
        from = "Column::StudentId",
        to = "super::student::Column::Id",
        on_delete = "Cascade"
    )]
    Student,
    /// Each transaction was made by one teacher
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::TeacherId",
        to = "super::user::Column::Id",
        on_delete = "Cascade"
    )]
    Teacher,
}

impl Related<super::student::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Student.def()
    }
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Teacher.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
