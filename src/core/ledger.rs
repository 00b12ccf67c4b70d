//! Ledger engine - Every balance change and the journal entry that explains it.
//!
//! A student's balance is only changed here, and always in the same database
//! transaction as the `transactions` row recording the change. The balance
//! update itself is a single `balance = balance + delta` statement so that two
//! requests never overwrite each other's arithmetic. Dropping the database
//! transaction on an error path rolls the whole operation back.

use crate::{
    core::access::{self, Principal},
    entities::{Student, Transaction, TransactionType, student, transaction, user},
    errors::{Error, Result},
};
use sea_orm::{
    Condition, JoinType, QueryOrder, QuerySelect, RelationTrait, Set, TransactionTrait,
    prelude::*, sea_query::Expr,
};
use std::collections::BTreeSet;
use tracing::{debug, info, instrument, warn};

fn validate_amount(amount: i64, max_amount: Option<i64>) -> Result<()> {
    if amount <= 0 || max_amount.is_some_and(|max| amount > max) {
        return Err(Error::InvalidAmount { amount });
    }
    Ok(())
}

/// Adds `delta` to a student's balance in one SQL statement.
///
/// The current balance is read first so a sum outside `i64` is rejected instead
/// of being stored by SQLite as a REAL.
async fn apply_delta<C>(db: &C, student_id: i64, delta: i64) -> Result<()>
where
    C: ConnectionTrait,
{
    let current = Student::find_by_id(student_id)
        .one(db)
        .await?
        .ok_or(Error::StudentNotFound { id: student_id })?
        .balance;
    if current.checked_add(delta).is_none() {
        warn!(student_id, current, delta, "Balance change out of range");
        return Err(Error::InvalidAmount { amount: delta });
    }

    let result = Student::update_many()
        .col_expr(
            student::Column::Balance,
            Expr::col(student::Column::Balance).add(delta),
        )
        .filter(student::Column::Id.eq(student_id))
        .exec(db)
        .await?;
    if result.rows_affected == 0 {
        return Err(Error::StudentNotFound { id: student_id });
    }
    Ok(())
}

async fn record<C>(
    db: &C,
    kind: TransactionType,
    amount: i64,
    student_id: i64,
    actor: &Principal,
    comment: Option<String>,
) -> Result<transaction::Model>
where
    C: ConnectionTrait,
{
    transaction::ActiveModel {
        transaction_type: Set(kind),
        amount: Set(amount),
        student_id: Set(student_id),
        teacher_id: Set(actor.user_id),
        timestamp: Set(chrono::Utc::now()),
        comment: Set(comment),
        edited: Set(false),
        ..Default::default()
    }
    .insert(db)
    .await
    .map_err(Into::into)
}

/// Awards `amount` coins to every student in `student_ids` as one batch.
///
/// Either every student gets exactly one AWARD row and `amount` more coins, or
/// nothing changes.
///
/// # Arguments
/// * `principal` - Acting teacher or admin
/// * `student_ids` - Targets; duplicates are collapsed
/// * `amount` - Coins per student, positive
/// * `max_amount` - Optional per-award cap from configuration
///
/// # Errors
/// `Forbidden` for non-staff, `InvalidAmount`, a validation error for an empty
/// set, and `StudentNotFound` if any target is missing, hidden, or outside the
/// principal's scope.
#[instrument(skip(db, principal), fields(actor = %principal.username))]
pub async fn award(
    db: &DatabaseConnection,
    principal: &Principal,
    student_ids: &[i64],
    amount: i64,
    max_amount: Option<i64>,
) -> Result<Vec<transaction::Model>> {
    principal.require_staff("award coins")?;
    validate_amount(amount, max_amount)?;

    let targets: BTreeSet<i64> = student_ids.iter().copied().collect();
    if targets.is_empty() {
        return Err(Error::validation("Select at least one student"));
    }

    let txn = db.begin().await?;

    let scope = access::student_scope(&txn, principal).await?;
    let students = Student::find()
        .filter(student::Column::Id.is_in(targets.iter().copied()))
        .all(&txn)
        .await?;
    for id in &targets {
        let allowed = students
            .iter()
            .find(|s| s.id == *id)
            .is_some_and(|s| !s.is_hidden && scope.contains(s));
        if !allowed {
            warn!(student_id = id, "Award target rejected");
            return Err(Error::StudentNotFound { id: *id });
        }
    }

    let mut created = Vec::with_capacity(targets.len());
    for id in &targets {
        created.push(record(&txn, TransactionType::Award, amount, *id, principal, None).await?);
        apply_delta(&txn, *id, amount).await?;
    }

    txn.commit().await?;

    info!(students = created.len(), amount, "Awarded coins");
    Ok(created)
}

/// Deducts `amount` coins from one student.
///
/// A deduction never takes a balance below zero: the current balance is
/// checked first, and the update itself is guarded by `balance >= amount`.
#[instrument(skip(db, principal, comment), fields(actor = %principal.username))]
pub async fn deduct(
    db: &DatabaseConnection,
    principal: &Principal,
    student_id: i64,
    amount: i64,
    comment: &str,
) -> Result<transaction::Model> {
    principal.require_staff("deduct coins")?;
    validate_amount(amount, None)?;
    let comment = comment.trim();
    if comment.is_empty() {
        return Err(Error::CommentRequired);
    }

    let txn = db.begin().await?;

    let target = access::ledger_target(&txn, principal, student_id).await?;
    if target.balance < amount {
        warn!(balance = target.balance, amount, "Deduction exceeds balance");
        return Err(Error::InsufficientBalance {
            current: target.balance,
            required: amount,
        });
    }

    let guarded = Student::update_many()
        .col_expr(
            student::Column::Balance,
            Expr::col(student::Column::Balance).sub(amount),
        )
        .filter(student::Column::Id.eq(student_id))
        .filter(student::Column::Balance.gte(amount))
        .exec(&txn)
        .await?;
    if guarded.rows_affected == 0 {
        return Err(Error::InsufficientBalance {
            current: target.balance,
            required: amount,
        });
    }

    let entry = record(
        &txn,
        TransactionType::Deduct,
        amount,
        student_id,
        principal,
        Some(comment.to_string()),
    )
    .await?;

    txn.commit().await?;

    info!(student_id, amount, "Deducted coins");
    Ok(entry)
}

/// Corrects the amount of an AWARD entry and moves the balance by the
/// difference.
///
/// Unlike [`deduct`], a downward correction may take the balance below zero.
/// Any teacher may correct any award.
#[instrument(skip(db, principal), fields(actor = %principal.username))]
pub async fn edit_award(
    db: &DatabaseConnection,
    principal: &Principal,
    transaction_id: i64,
    new_amount: i64,
    max_amount: Option<i64>,
) -> Result<transaction::Model> {
    principal.require_staff("edit awards")?;
    validate_amount(new_amount, max_amount)?;

    let txn = db.begin().await?;

    let entry = Transaction::find_by_id(transaction_id)
        .one(&txn)
        .await?
        .ok_or(Error::TransactionNotFound { id: transaction_id })?;
    if entry.transaction_type != TransactionType::Award {
        return Err(Error::NotEditable { id: transaction_id });
    }

    let difference = new_amount - entry.amount;
    let student_id = entry.student_id;
    if difference != 0 {
        apply_delta(&txn, student_id, difference).await?;
    }

    let mut active: transaction::ActiveModel = entry.into();
    active.amount = Set(new_amount);
    active.edited = Set(true);
    let updated = active.update(&txn).await?;

    txn.commit().await?;

    info!(transaction_id, student_id, difference, "Edited award");
    Ok(updated)
}

/// Sets a student's balance to `new_balance`, recording the difference as an
/// AWARD or DEDUCT entry.
///
/// Returns `None` when the balance already equals `new_balance`. Runs in its
/// own (nested) database transaction, so it can be called from inside a larger
/// student update.
#[instrument(skip(db, principal), fields(actor = %principal.username))]
pub async fn manual_balance_set<C>(
    db: &C,
    principal: &Principal,
    student_id: i64,
    new_balance: i64,
) -> Result<Option<transaction::Model>>
where
    C: ConnectionTrait + TransactionTrait,
{
    if new_balance < 0 {
        return Err(Error::validation("Balance cannot be negative"));
    }

    let txn = db.begin().await?;

    let target = access::managed_student(&txn, principal, student_id).await?;
    let difference = new_balance
        .checked_sub(target.balance)
        .ok_or(Error::InvalidAmount {
            amount: new_balance,
        })?;
    if difference == 0 {
        debug!(student_id, "Balance unchanged");
        return Ok(None);
    }

    let kind = if difference > 0 {
        TransactionType::Award
    } else {
        TransactionType::Deduct
    };
    let comment = format!(
        "Balance manually adjusted from {} to {new_balance}",
        target.balance
    );
    let entry = record(
        &txn,
        kind,
        difference.abs(),
        student_id,
        principal,
        Some(comment),
    )
    .await?;
    apply_delta(&txn, student_id, difference).await?;

    txn.commit().await?;

    info!(student_id, from = target.balance, to = new_balance, "Balance set manually");
    Ok(Some(entry))
}

/// Net effect of every journal entry of a student: AWARDs minus DEDUCTs.
pub async fn ledger_balance<C>(db: &C, student_id: i64) -> Result<i64>
where
    C: ConnectionTrait,
{
    let entries = Transaction::find()
        .filter(transaction::Column::StudentId.eq(student_id))
        .all(db)
        .await?;
    net_effect(&entries)
}

fn net_effect(entries: &[transaction::Model]) -> Result<i64> {
    let total: i128 = entries
        .iter()
        .map(|t| i128::from(t.transaction_type.signed(t.amount)))
        .sum();
    i64::try_from(total).map_err(|_| Error::validation("Ledger total is out of range"))
}

/// Most recent entries of one student, newest first.
pub async fn recent_for_student<C>(
    db: &C,
    student_id: i64,
    limit: u64,
) -> Result<Vec<transaction::Model>>
where
    C: ConnectionTrait,
{
    Transaction::find()
        .filter(transaction::Column::StudentId.eq(student_id))
        .order_by_desc(transaction::Column::Timestamp)
        .order_by_desc(transaction::Column::Id)
        .limit(limit)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Filters for [`history`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionFilter {
    /// Only this student (staff only)
    pub student_id: Option<i64>,
    /// Only this direction
    pub kind: Option<TransactionType>,
    /// Substring of student name, acting username or comment (staff only)
    pub search: Option<String>,
    /// Maximum number of rows
    pub limit: Option<u64>,
}

/// Transaction history visible to `principal`, newest first.
#[instrument(skip(db, principal), fields(actor = %principal.username))]
pub async fn history(
    db: &DatabaseConnection,
    principal: &Principal,
    filter: &TransactionFilter,
) -> Result<Vec<transaction::Model>> {
    let scope = access::transaction_scope(db, principal).await?;
    let mut query = Transaction::find().filter(scope.condition());

    if let Some(kind) = filter.kind {
        query = query.filter(transaction::Column::TransactionType.eq(kind));
    }

    if principal.is_staff() {
        if let Some(student_id) = filter.student_id {
            query = query.filter(transaction::Column::StudentId.eq(student_id));
        }
        if let Some(term) = filter
            .search
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
        {
            query = query
                .join(JoinType::InnerJoin, transaction::Relation::Student.def())
                .join(JoinType::InnerJoin, transaction::Relation::Teacher.def())
                .filter(
                    Condition::any()
                        .add(student::Column::Name.contains(term))
                        .add(user::Column::Username.contains(term))
                        .add(transaction::Column::Comment.contains(term)),
                );
        }
    }

    if let Some(limit) = filter.limit {
        query = query.limit(limit);
    }

    let rows = query
        .order_by_desc(transaction::Column::Timestamp)
        .order_by_desc(transaction::Column::Id)
        .all(db)
        .await?;
    debug!(rows = rows.len(), "Loaded transaction history");
    Ok(rows)
}
