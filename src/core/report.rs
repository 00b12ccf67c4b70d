//! Dashboard generation.
//!
//! The home view is the same for every role; only the scope changes. Staff see
//! their non-hidden students and the entries they made, students and parents see
//! their phone group and its entries.

use crate::{
    core::{
        access::{self, Principal, StudentListing},
        ledger::{self, TransactionFilter},
    },
    entities::{Role, Student, student, transaction},
    errors::Result,
};
use sea_orm::{QueryOrder, prelude::*};
use serde::Serialize;
use tracing::instrument;

/// Everything the home view shows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dashboard {
    /// Role the view was built for
    pub role: Role,
    /// Visible students, sorted by name
    pub students: Vec<student::Model>,
    /// Sum of the visible balances
    pub total_balance: i64,
    /// Newest visible entries
    pub recent_transactions: Vec<transaction::Model>,
}

/// Builds the dashboard of `principal`.
///
/// # Arguments
/// * `db` - Database connection
/// * `principal` - Viewer
/// * `limit` - Number of recent transactions to include
#[instrument(skip(db, principal), fields(actor = %principal.username))]
pub async fn dashboard(
    db: &DatabaseConnection,
    principal: &Principal,
    limit: u64,
) -> Result<Dashboard> {
    let condition = access::listing_condition(db, principal, StudentListing::Dashboard).await?;
    let students = Student::find()
        .filter(condition)
        .order_by_asc(student::Column::Name)
        .all(db)
        .await?;

    let recent_transactions = ledger::history(
        db,
        principal,
        &TransactionFilter {
            limit: Some(limit),
            ..Default::default()
        },
    )
    .await?;

    Ok(Dashboard {
        role: principal.role,
        total_balance: students.iter().map(|s| s.balance).sum(),
        students,
        recent_transactions,
    })
}
