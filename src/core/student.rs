//! Student management - Creating, editing and listing students.
//!
//! Balances are never written here directly; an edited balance goes through
//! [`ledger::manual_balance_set`] in the same database transaction as the rest
//! of the edit. Giving a student a phone number provisions the synthetic
//! `student_<id>` account used by phone logins.

use crate::{
    core::{
        access::{self, Principal, StudentListing},
        ledger, role, user,
    },
    entities::{Role, Student, profile, student, transaction, user as user_entity},
    errors::{Error, Result},
};
use sea_orm::{
    Condition, JoinType, QueryOrder, QuerySelect, RelationTrait, Set, TransactionTrait,
    prelude::*,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

fn clean_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::validation("Student name cannot be empty"));
    }
    Ok(name.to_string())
}

fn clean_phone(phone: Option<&str>) -> Option<String> {
    phone
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(ToString::to_string)
}

/// The owner must be an existing teacher or admin.
async fn check_owner<C>(db: &C, teacher_id: i64) -> Result<()>
where
    C: ConnectionTrait,
{
    let owner = role::get_profile(db, teacher_id).await?;
    match owner.map(|p| p.role) {
        Some(Role::Teacher | Role::Admin) => Ok(()),
        _ => Err(Error::validation(format!(
            "User {teacher_id} is not a teacher"
        ))),
    }
}

/// Input for [`create_student`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct NewStudent {
    /// Display name
    pub name: String,
    /// Login phone; blank means none
    #[serde(default)]
    pub phone_number: Option<String>,
    /// Owning teacher; admins only, defaults to the actor
    #[serde(default)]
    pub teacher_id: Option<i64>,
}

/// Creates a student with a zero balance.
#[instrument(skip(db, principal, new_student), fields(actor = %principal.username))]
pub async fn create_student(
    db: &DatabaseConnection,
    principal: &Principal,
    new_student: NewStudent,
) -> Result<student::Model> {
    principal.require_staff("create students")?;
    let name = clean_name(&new_student.name)?;
    let phone_number = clean_phone(new_student.phone_number.as_deref());

    let txn = db.begin().await?;

    let teacher_id = match new_student.teacher_id {
        Some(id) if id != principal.user_id => {
            principal.require_admin("assign students to another teacher")?;
            check_owner(&txn, id).await?;
            id
        }
        _ => principal.user_id,
    };

    let created = student::ActiveModel {
        name: Set(name),
        teacher_id: Set(teacher_id),
        balance: Set(0),
        phone_number: Set(phone_number),
        is_active: Set(true),
        is_hidden: Set(false),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    if created.phone_number.is_some() {
        user::ensure_synthetic_account(&txn, &created, None).await?;
    }

    txn.commit().await?;

    info!(student_id = created.id, teacher_id, "Created student");
    Ok(created)
}

/// Changes for [`update_student`]; `None` leaves a field alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StudentUpdate {
    /// New display name
    pub name: Option<String>,
    /// New phone; a blank string removes it
    pub phone_number: Option<String>,
    /// Enable or disable the student
    pub is_active: Option<bool>,
    /// Hide from dashboards and award lists
    pub is_hidden: Option<bool>,
    /// New balance, recorded as a ledger adjustment
    pub balance: Option<i64>,
    /// New owner (admins only)
    pub teacher_id: Option<i64>,
}

/// Edits a student the principal manages.
#[instrument(skip(db, principal, changes), fields(actor = %principal.username))]
pub async fn update_student(
    db: &DatabaseConnection,
    principal: &Principal,
    student_id: i64,
    changes: StudentUpdate,
) -> Result<student::Model> {
    let txn = db.begin().await?;

    let current = access::managed_student(&txn, principal, student_id).await?;
    let old_phone = current.phone_number.clone();
    let mut active: student::ActiveModel = current.into();

    if let Some(name) = changes.name.as_deref() {
        active.name = Set(clean_name(name)?);
    }
    if let Some(phone) = changes.phone_number.as_deref() {
        active.phone_number = Set(clean_phone(Some(phone)));
    }
    if let Some(is_active) = changes.is_active {
        active.is_active = Set(is_active);
    }
    if let Some(is_hidden) = changes.is_hidden {
        active.is_hidden = Set(is_hidden);
    }
    if let Some(teacher_id) = changes.teacher_id {
        principal.require_admin("reassign students")?;
        check_owner(&txn, teacher_id).await?;
        active.teacher_id = Set(teacher_id);
    }
    active.update(&txn).await?;

    if let Some(balance) = changes.balance {
        ledger::manual_balance_set(&txn, principal, student_id, balance).await?;
    }

    let updated = Student::find_by_id(student_id)
        .one(&txn)
        .await?
        .ok_or(Error::StudentNotFound { id: student_id })?;

    if updated.phone_number.is_some() && updated.phone_number != old_phone {
        user::ensure_synthetic_account(&txn, &updated, None).await?;
    }

    txn.commit().await?;

    info!(student_id, "Updated student");
    Ok(updated)
}

/// A student with its most recent journal entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StudentDetail {
    /// The student
    pub student: student::Model,
    /// Newest first
    pub recent_transactions: Vec<transaction::Model>,
}

/// Loads one student visible to the principal.
pub async fn get_student_detail(
    db: &DatabaseConnection,
    principal: &Principal,
    student_id: i64,
    limit: u64,
) -> Result<StudentDetail> {
    let student = access::visible_student(db, principal, student_id).await?;
    let recent_transactions = ledger::recent_for_student(db, student_id, limit).await?;
    Ok(StudentDetail {
        student,
        recent_transactions,
    })
}

/// Students for the management pages, hidden ones included, sorted by name.
///
/// Teachers search by name; admins also match phone, teacher username and
/// teacher full name.
#[instrument(skip(db, principal), fields(actor = %principal.username))]
pub async fn list_students(
    db: &DatabaseConnection,
    principal: &Principal,
    search: Option<&str>,
) -> Result<Vec<student::Model>> {
    principal.require_staff("manage students")?;
    let condition = access::listing_condition(db, principal, StudentListing::Management).await?;
    let mut query = Student::find().filter(condition);

    if let Some(term) = search.map(str::trim).filter(|t| !t.is_empty()) {
        if principal.role == Role::Admin {
            query = query
                .join(JoinType::InnerJoin, student::Relation::Teacher.def())
                .join(JoinType::LeftJoin, user_entity::Relation::Profile.def())
                .filter(
                    Condition::any()
                        .add(student::Column::Name.contains(term))
                        .add(student::Column::PhoneNumber.contains(term))
                        .add(user_entity::Column::Username.contains(term))
                        .add(profile::Column::FullName.contains(term)),
                );
        } else {
            query = query.filter(student::Column::Name.contains(term));
        }
    }

    query
        .order_by_asc(student::Column::Name)
        .order_by_asc(student::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Students the principal may award to or deduct from.
pub async fn award_candidates(
    db: &DatabaseConnection,
    principal: &Principal,
) -> Result<Vec<student::Model>> {
    principal.require_staff("change balances")?;
    let condition = access::listing_condition(db, principal, StudentListing::Candidates).await?;
    Student::find()
        .filter(condition)
        .order_by_asc(student::Column::Name)
        .all(db)
        .await
        .map_err(Into::into)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::entities::{Transaction, TransactionType, User};
    use crate::test_utils::*;

    fn named(name: &str) -> NewStudent {
        NewStudent {
            name: name.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_student_defaults() -> Result<()> {
        let db = setup_test_db().await?;
        let teacher = create_test_teacher(&db, "t").await?;
        let p = principal_of(&db, &teacher).await?;

        let created = create_student(&db, &p, named("  Ann ")).await?;
        assert_eq!(created.name, "Ann");
        assert_eq!(created.balance, 0);
        assert_eq!(created.teacher_id, teacher.id);
        assert!(created.is_active);
        assert!(!created.is_hidden);

        assert!(matches!(
            create_student(&db, &p, named(" ")).await,
            Err(Error::Validation { .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_create_student_with_phone_provisions_account() -> Result<()> {
        let db = setup_test_db().await?;
        let teacher = create_test_teacher(&db, "t").await?;
        let p = principal_of(&db, &teacher).await?;

        let created = create_student(
            &db,
            &p,
            NewStudent {
                name: "Ann".to_string(),
                phone_number: Some(" +1000 ".to_string()),
                teacher_id: None,
            },
        )
        .await?;
        assert_eq!(created.phone_number.as_deref(), Some("+1000"));

        let account = user::get_user_by_username(&db, &user::synthetic_username(created.id))
            .await?
            .unwrap();
        let profile = role::get_profile(&db, account.id).await?.unwrap();
        assert_eq!(profile.role, Role::Student);
        assert_eq!(profile.linked_student_id, Some(created.id));
        Ok(())
    }

    #[tokio::test]
    async fn test_only_admin_assigns_other_owner() -> Result<()> {
        let db = setup_test_db().await?;
        let teacher = create_test_teacher(&db, "t").await?;
        let other = create_test_teacher(&db, "other").await?;
        let admin = create_test_admin(&db, "boss").await?;
        let teacher_p = principal_of(&db, &teacher).await?;
        let admin_p = principal_of(&db, &admin).await?;

        let for_other = NewStudent {
            name: "Ann".to_string(),
            phone_number: None,
            teacher_id: Some(other.id),
        };
        assert!(matches!(
            create_student(&db, &teacher_p, for_other.clone()).await,
            Err(Error::Forbidden { .. })
        ));
        let created = create_student(&db, &admin_p, for_other).await?;
        assert_eq!(created.teacher_id, other.id);

        let reassigned = update_student(
            &db,
            &admin_p,
            created.id,
            StudentUpdate {
                teacher_id: Some(teacher.id),
                ..Default::default()
            },
        )
        .await?;
        assert_eq!(reassigned.teacher_id, teacher.id);

        let not_staff = crate::core::user::ensure_synthetic_account(&db, &created, None)
            .await?
            .0;
        assert!(matches!(
            update_student(
                &db,
                &admin_p,
                created.id,
                StudentUpdate {
                    teacher_id: Some(not_staff.id),
                    ..Default::default()
                },
            )
            .await,
            Err(Error::Validation { .. })
        ));
        assert!(matches!(
            update_student(
                &db,
                &teacher_p,
                created.id,
                StudentUpdate {
                    teacher_id: Some(other.id),
                    ..Default::default()
                },
            )
            .await,
            Err(Error::Forbidden { .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_update_student_balance_goes_through_ledger() -> Result<()> {
        let (db, teacher, ann) = setup_with_student().await?;
        let p = principal_of(&db, &teacher).await?;

        let updated = update_student(
            &db,
            &p,
            ann.id,
            StudentUpdate {
                name: Some("Anna".to_string()),
                is_hidden: Some(true),
                balance: Some(6),
                ..Default::default()
            },
        )
        .await?;
        assert_eq!(updated.name, "Anna");
        assert!(updated.is_hidden);
        assert_eq!(updated.balance, 6);

        let entries = Transaction::find().all(&db).await?;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].transaction_type, TransactionType::Award);
        assert_eq!(entries[0].amount, 6);
        assert_eq!(ledger::ledger_balance(&db, ann.id).await?, 6);
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_update_leaves_student_untouched() -> Result<()> {
        let (db, teacher, ann) = setup_with_student().await?;
        let p = principal_of(&db, &teacher).await?;

        let result = update_student(
            &db,
            &p,
            ann.id,
            StudentUpdate {
                name: Some("Renamed".to_string()),
                balance: Some(-4),
                ..Default::default()
            },
        )
        .await;
        assert!(matches!(result, Err(Error::Validation { .. })));

        let reloaded = Student::find_by_id(ann.id).one(&db).await?.unwrap();
        assert_eq!(reloaded.name, ann.name);
        Ok(())
    }

    #[tokio::test]
    async fn test_update_phone_provisions_account() -> Result<()> {
        let (db, teacher, ann) = setup_with_student().await?;
        let p = principal_of(&db, &teacher).await?;
        assert_eq!(User::find().all(&db).await?.len(), 1);

        update_student(
            &db,
            &p,
            ann.id,
            StudentUpdate {
                phone_number: Some("+2000".to_string()),
                ..Default::default()
            },
        )
        .await?;
        assert!(
            user::get_user_by_username(&db, &user::synthetic_username(ann.id))
                .await?
                .is_some()
        );

        let cleared = update_student(
            &db,
            &p,
            ann.id,
            StudentUpdate {
                phone_number: Some("  ".to_string()),
                ..Default::default()
            },
        )
        .await?;
        assert_eq!(cleared.phone_number, None);
        Ok(())
    }

    #[tokio::test]
    async fn test_detail_respects_scope() -> Result<()> {
        let (db, teacher, ann) = setup_with_student().await?;
        let other = create_test_teacher(&db, "other").await?;
        let p = principal_of(&db, &teacher).await?;
        let other_p = principal_of(&db, &other).await?;
        ledger::award(&db, &p, &[ann.id], 2, None).await?;

        let detail = get_student_detail(&db, &p, ann.id, 10).await?;
        assert_eq!(detail.student.balance, 2);
        assert_eq!(detail.recent_transactions.len(), 1);

        assert!(matches!(
            get_student_detail(&db, &other_p, ann.id, 10).await,
            Err(Error::StudentNotFound { .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_list_and_search() -> Result<()> {
        let db = setup_test_db().await?;
        let teacher = create_test_teacher(&db, "ms_green").await?;
        role::set_full_name(&db, "ms_green", "Olga Green").await?;
        let other = create_test_teacher(&db, "mr_brown").await?;
        let admin = create_test_admin(&db, "boss").await?;
        create_custom_student(&db, teacher.id, "Ann", Some("+1000")).await?;
        let hidden = create_test_student(&db, teacher.id, "Hidden").await?;
        create_test_student(&db, other.id, "Bob").await?;
        let mut hide: student::ActiveModel = hidden.into();
        hide.is_hidden = Set(true);
        hide.update(&db).await?;

        let teacher_p = principal_of(&db, &teacher).await?;
        let admin_p = principal_of(&db, &admin).await?;

        let names = |v: Vec<student::Model>| v.into_iter().map(|s| s.name).collect::<Vec<_>>();

        assert_eq!(
            names(list_students(&db, &teacher_p, None).await?),
            vec!["Ann", "Hidden"]
        );
        assert_eq!(
            names(award_candidates(&db, &teacher_p).await?),
            vec!["Ann"]
        );
        assert_eq!(
            names(list_students(&db, &teacher_p, Some("hid")).await?),
            vec!["Hidden"]
        );
        assert!(list_students(&db, &teacher_p, Some("+1000")).await?.is_empty());

        assert_eq!(
            names(list_students(&db, &admin_p, Some("+1000")).await?),
            vec!["Ann"]
        );
        assert_eq!(
            names(list_students(&db, &admin_p, Some("Olga")).await?),
            vec!["Ann", "Hidden"]
        );
        assert_eq!(
            names(list_students(&db, &admin_p, Some("brown")).await?),
            vec!["Bob"]
        );
        Ok(())
    }
}
