//! Access policy - What a resolved principal may see and change.
//!
//! | Role    | Students                 | Transactions           | Ledger writes | Edit awards | Manage students |
//! |---------|--------------------------|------------------------|---------------|-------------|-----------------|
//! | admin   | all                      | all                    | any student   | any         | any             |
//! | teacher | own                      | acted by self          | own students  | any         | own             |
//! | student | phone group, else self   | of visible students    | no            | no          | no              |
//! | parent  | phone group              | of visible students    | no            | no          | no              |
//!
//! Teachers may correct any award, not only their own.

use crate::{
    core::{role, user},
    entities::{Role, Student, student, transaction},
    errors::{Error, Result},
};
use sea_orm::{Condition, QuerySelect, QueryTrait, prelude::*};
use serde::Serialize;
use tracing::{debug, instrument};

/// An authenticated user with a resolved role; the actor of every operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    /// Id of the user
    pub user_id: i64,
    /// Username of the user
    pub username: String,
    /// Resolved role
    pub role: Role,
    /// Student linked to a student/parent account
    pub linked_student_id: Option<i64>,
    /// Phone number used at login, remembered for the session
    pub phone: Option<String>,
}

impl Principal {
    /// True for teachers and admins.
    #[must_use]
    pub const fn is_staff(&self) -> bool {
        matches!(self.role, Role::Teacher | Role::Admin)
    }

    /// Fails with [`Error::Forbidden`] unless the principal is staff.
    pub fn require_staff(&self, action: &'static str) -> Result<()> {
        if self.is_staff() {
            Ok(())
        } else {
            Err(Error::Forbidden {
                role: self.role,
                action,
            })
        }
    }

    /// Fails with [`Error::Forbidden`] unless the principal is an admin.
    pub fn require_admin(&self, action: &'static str) -> Result<()> {
        if self.role == Role::Admin {
            Ok(())
        } else {
            Err(Error::Forbidden {
                role: self.role,
                action,
            })
        }
    }
}

/// Loads the principal for a session, creating the profile if it is missing.
#[instrument(skip(db))]
pub async fn principal_for<C>(db: &C, user_id: i64, session_phone: Option<&str>) -> Result<Principal>
where
    C: ConnectionTrait,
{
    let account = user::get_user_by_id(db, user_id)
        .await?
        .filter(|u| u.is_active)
        .ok_or(Error::Unauthenticated)?;
    let profile = role::ensure_profile(db, &account, session_phone).await?;
    Ok(Principal {
        user_id: account.id,
        username: account.username,
        role: profile.role,
        linked_student_id: profile.linked_student_id,
        phone: session_phone.map(ToString::to_string),
    })
}

/// Students a principal can see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StudentScope {
    /// Every student
    All,
    /// Students owned by this teacher
    OwnedBy(i64),
    /// Active students sharing this phone number
    PhoneGroup(String),
    /// Exactly one student
    Single(i64),
    /// No students at all
    Nothing,
}

impl StudentScope {
    /// Filter over the `students` table.
    #[must_use]
    pub fn condition(&self) -> Condition {
        match self {
            Self::All => Condition::all(),
            Self::OwnedBy(teacher_id) => {
                Condition::all().add(student::Column::TeacherId.eq(*teacher_id))
            }
            Self::PhoneGroup(phone) => Condition::all()
                .add(student::Column::PhoneNumber.eq(phone.as_str()))
                .add(student::Column::IsActive.eq(true)),
            Self::Single(id) => Condition::all().add(student::Column::Id.eq(*id)),
            Self::Nothing => Condition::all().add(student::Column::Id.is_in(Vec::<i64>::new())),
        }
    }

    /// Whether `student` falls inside this scope.
    #[must_use]
    pub fn contains(&self, student: &student::Model) -> bool {
        match self {
            Self::All => true,
            Self::OwnedBy(teacher_id) => student.teacher_id == *teacher_id,
            Self::PhoneGroup(phone) => {
                student.is_active && student.phone_number.as_deref() == Some(phone.as_str())
            }
            Self::Single(id) => student.id == *id,
            Self::Nothing => false,
        }
    }
}

/// Transactions a principal can see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionScope {
    /// Every transaction
    All,
    /// Transactions made by this teacher
    ActedBy(i64),
    /// Transactions of the students in the scope
    OfStudents(StudentScope),
}

impl TransactionScope {
    /// Filter over the `transactions` table.
    #[must_use]
    pub fn condition(&self) -> Condition {
        match self {
            Self::All => Condition::all(),
            Self::ActedBy(teacher_id) => {
                Condition::all().add(transaction::Column::TeacherId.eq(*teacher_id))
            }
            Self::OfStudents(scope) => {
                let students = Student::find()
                    .select_only()
                    .column(student::Column::Id)
                    .filter(scope.condition())
                    .into_query();
                Condition::all().add(transaction::Column::StudentId.in_subquery(students))
            }
        }
    }
}

/// The phone group of a student or parent: the login phone, else the phone of
/// the linked student.
async fn phone_group<C>(db: &C, principal: &Principal) -> Result<Option<String>>
where
    C: ConnectionTrait,
{
    if let Some(phone) = &principal.phone {
        return Ok(Some(phone.clone()));
    }
    let Some(linked) = principal.linked_student_id else {
        return Ok(None);
    };
    Ok(Student::find_by_id(linked)
        .one(db)
        .await?
        .and_then(|s| s.phone_number))
}

/// Computes the student scope of `principal`.
pub async fn student_scope<C>(db: &C, principal: &Principal) -> Result<StudentScope>
where
    C: ConnectionTrait,
{
    let scope = match principal.role {
        Role::Admin => StudentScope::All,
        Role::Teacher => StudentScope::OwnedBy(principal.user_id),
        Role::Student => match phone_group(db, principal).await? {
            Some(phone) => StudentScope::PhoneGroup(phone),
            None => principal
                .linked_student_id
                .map_or(StudentScope::Nothing, StudentScope::Single),
        },
        Role::Parent => phone_group(db, principal)
            .await?
            .map_or(StudentScope::Nothing, StudentScope::PhoneGroup),
    };
    debug!(role = %principal.role, ?scope, "Computed student scope");
    Ok(scope)
}

/// Computes the transaction scope of `principal`.
pub async fn transaction_scope<C>(db: &C, principal: &Principal) -> Result<TransactionScope>
where
    C: ConnectionTrait,
{
    Ok(match principal.role {
        Role::Admin => TransactionScope::All,
        Role::Teacher => TransactionScope::ActedBy(principal.user_id),
        Role::Student | Role::Parent => {
            TransactionScope::OfStudents(student_scope(db, principal).await?)
        }
    })
}

/// Which student list is being built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StudentListing {
    /// Home page; hidden students left out
    Dashboard,
    /// Management pages; hidden students included
    Management,
    /// Award/deduct pickers; hidden students left out
    Candidates,
}

/// Condition for a student listing of `principal`.
pub async fn listing_condition<C>(
    db: &C,
    principal: &Principal,
    listing: StudentListing,
) -> Result<Condition>
where
    C: ConnectionTrait,
{
    let mut condition = student_scope(db, principal).await?.condition();
    if principal.is_staff() && listing != StudentListing::Management {
        condition = condition.add(student::Column::IsHidden.eq(false));
    }
    Ok(condition)
}

/// Loads a student the principal may see, or [`Error::StudentNotFound`].
pub async fn visible_student<C>(db: &C, principal: &Principal, student_id: i64) -> Result<student::Model>
where
    C: ConnectionTrait,
{
    let scope = student_scope(db, principal).await?;
    Student::find_by_id(student_id)
        .one(db)
        .await?
        .filter(|s| scope.contains(s))
        .ok_or(Error::StudentNotFound { id: student_id })
}

/// Loads a student the principal may award to or deduct from.
///
/// Non-staff are forbidden outright; staff only reach non-hidden students in
/// their scope.
pub async fn ledger_target<C>(db: &C, principal: &Principal, student_id: i64) -> Result<student::Model>
where
    C: ConnectionTrait,
{
    principal.require_staff("change balances")?;
    let student = visible_student(db, principal, student_id).await?;
    if student.is_hidden {
        return Err(Error::StudentNotFound { id: student_id });
    }
    Ok(student)
}

/// Loads a student the principal may edit.
pub async fn managed_student<C>(db: &C, principal: &Principal, student_id: i64) -> Result<student::Model>
where
    C: ConnectionTrait,
{
    principal.require_staff("manage students")?;
    visible_student(db, principal, student_id).await
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::test_utils::*;
    use sea_orm::{QueryOrder, Set};

    async fn listed(
        db: &DatabaseConnection,
        principal: &Principal,
        listing: StudentListing,
    ) -> Result<Vec<String>> {
        let condition = listing_condition(db, principal, listing).await?;
        Ok(Student::find()
            .filter(condition)
            .order_by_asc(student::Column::Name)
            .all(db)
            .await?
            .into_iter()
            .map(|s| s.name)
            .collect())
    }

    #[tokio::test]
    async fn test_admin_sees_everything_but_hidden_on_dashboard() -> Result<()> {
        let db = setup_test_db().await?;
        let t1 = create_test_teacher(&db, "t1").await?;
        let t2 = create_test_teacher(&db, "t2").await?;
        let admin = create_test_admin(&db, "boss").await?;
        create_custom_student(&db, t1.id, "Ann", None).await?;
        let hidden = create_custom_student(&db, t2.id, "Zed", None).await?;
        let mut hide: student::ActiveModel = hidden.into();
        hide.is_hidden = Set(true);
        hide.update(&db).await?;

        let p = principal_for(&db, admin.id, None).await?;
        assert_eq!(listed(&db, &p, StudentListing::Dashboard).await?, vec!["Ann"]);
        assert_eq!(
            listed(&db, &p, StudentListing::Management).await?,
            vec!["Ann", "Zed"]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_teacher_sees_only_own_students() -> Result<()> {
        let db = setup_test_db().await?;
        let t1 = create_test_teacher(&db, "t1").await?;
        let t2 = create_test_teacher(&db, "t2").await?;
        create_custom_student(&db, t1.id, "Ann", None).await?;
        let other = create_custom_student(&db, t2.id, "Bob", None).await?;

        let p = principal_for(&db, t1.id, None).await?;
        assert_eq!(listed(&db, &p, StudentListing::Management).await?, vec!["Ann"]);
        assert!(matches!(
            visible_student(&db, &p, other.id).await,
            Err(Error::StudentNotFound { .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_parent_sees_active_phone_group() -> Result<()> {
        let db = setup_test_db().await?;
        let t = create_test_teacher(&db, "t").await?;
        let ann = create_custom_student(&db, t.id, "Ann", Some("+1000")).await?;
        create_custom_student(&db, t.id, "Bob", Some("+1000")).await?;
        let gone = create_custom_student(&db, t.id, "Cid", Some("+1000")).await?;
        create_custom_student(&db, t.id, "Dan", Some("+2000")).await?;
        let mut inactive: student::ActiveModel = gone.into();
        inactive.is_active = Set(false);
        inactive.update(&db).await?;

        let (account, _) = user::ensure_synthetic_account(&db, &ann, None).await?;
        let p = principal_for(&db, account.id, Some("+1000")).await?;
        assert_eq!(p.role, Role::Parent);
        assert_eq!(
            listed(&db, &p, StudentListing::Dashboard).await?,
            vec!["Ann", "Bob"]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_student_without_phone_sees_only_self() -> Result<()> {
        let db = setup_test_db().await?;
        let t = create_test_teacher(&db, "t").await?;
        let ann = create_custom_student(&db, t.id, "Ann", None).await?;
        create_custom_student(&db, t.id, "Bob", None).await?;

        let (account, _) = user::ensure_synthetic_account(&db, &ann, None).await?;
        let p = principal_for(&db, account.id, None).await?;
        assert_eq!(p.role, Role::Student);
        assert_eq!(student_scope(&db, &p).await?, StudentScope::Single(ann.id));
        assert_eq!(listed(&db, &p, StudentListing::Dashboard).await?, vec!["Ann"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_unlinked_student_sees_nothing() -> Result<()> {
        let db = setup_test_db().await?;
        let t = create_test_teacher(&db, "t").await?;
        create_custom_student(&db, t.id, "Ann", None).await?;
        let lost = insert_bare_user(&db, "student_nope").await?;

        let p = principal_for(&db, lost.id, None).await?;
        assert_eq!(student_scope(&db, &p).await?, StudentScope::Nothing);
        assert!(listed(&db, &p, StudentListing::Dashboard).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_non_staff_cannot_target_ledger() -> Result<()> {
        let db = setup_test_db().await?;
        let t = create_test_teacher(&db, "t").await?;
        let ann = create_custom_student(&db, t.id, "Ann", None).await?;
        let (account, _) = user::ensure_synthetic_account(&db, &ann, None).await?;
        let p = principal_for(&db, account.id, None).await?;

        assert!(matches!(
            ledger_target(&db, &p, ann.id).await,
            Err(Error::Forbidden {
                role: Role::Student,
                ..
            })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_inactive_user_is_unauthenticated() -> Result<()> {
        let db = setup_test_db().await?;
        let t = create_test_teacher(&db, "t").await?;
        let mut disabled: crate::entities::user::ActiveModel = t.into();
        disabled.is_active = Set(false);
        let disabled = disabled.update(&db).await?;

        assert!(matches!(
            principal_for(&db, disabled.id, None).await,
            Err(Error::Unauthenticated)
        ));
        Ok(())
    }
}
