//! Role resolution - Decides which role a user holds when no profile says so.
//!
//! This is the single place where a user's role and student link are derived.
//! Password login, phone login, per-request principal loading, user creation,
//! student provisioning and the `setup-roles` command all come through here.
//!
//! Resolution is split into a pure part ([`resolve`]) over facts gathered from
//! the database ([`gather_facts`]), so the same identity and the same student /
//! phone data always produce the same answer.

use crate::{
    core::user,
    entities::{Profile, Role, Student, User, profile, student},
    errors::{Error, Result},
};
use sea_orm::{QueryOrder, Set, prelude::*, sea_query::OnConflict};
use tracing::{debug, info, instrument, warn};

/// How a username relates to the synthetic `student_<id>` scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleKind {
    /// A well-formed synthetic handle carrying a student id
    Synthetic(i64),
    /// Uses the synthetic prefix but the id does not parse
    MalformedSynthetic,
    /// Any other username
    Regular,
}

/// Classifies a username against the synthetic account pattern.
#[must_use]
pub fn classify_handle(username: &str) -> HandleKind {
    match username.strip_prefix(user::SYNTHETIC_PREFIX) {
        None => HandleKind::Regular,
        Some(rest) => rest
            .parse::<i64>()
            .map_or(HandleKind::MalformedSynthetic, HandleKind::Synthetic),
    }
}

/// Who is being resolved.
#[derive(Debug, Clone, Copy)]
pub struct Identity<'a> {
    /// The user's handle
    pub username: &'a str,
    /// Phone number remembered from a phone login, if any
    pub session_phone: Option<&'a str>,
}

/// Database facts the resolution depends on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolutionFacts {
    /// The student named by a synthetic handle, if it exists
    pub student: Option<student::Model>,
    /// Ids of active students in the relevant phone group, ascending
    pub phone_group: Vec<i64>,
}

/// Outcome of a resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    /// Role to store
    pub role: Role,
    /// Student to link, if any
    pub linked_student_id: Option<i64>,
}

const fn student_or_parent(group_size: usize) -> Role {
    if group_size > 1 {
        Role::Parent
    } else {
        Role::Student
    }
}

/// Pure resolution of a role from an identity and the gathered facts.
///
/// 1. Synthetic handle with an existing student: `parent` when the student's
///    phone is shared by more than one active student, otherwise `student`;
///    linked to that student.
/// 2. Regular handle carrying a phone that matches active students: `parent`
///    for more than one match, otherwise `student`; linked to the first match.
/// 3. Everything else is a `teacher`.
///
/// A malformed synthetic handle or a missing student falls back to an unlinked
/// `student`.
#[must_use]
pub fn resolve(identity: &Identity<'_>, facts: &ResolutionFacts) -> Resolution {
    match classify_handle(identity.username) {
        HandleKind::Synthetic(id) => match &facts.student {
            Some(student) if student.id == id => {
                let role = if student.phone_number.is_some() {
                    student_or_parent(facts.phone_group.len())
                } else {
                    Role::Student
                };
                Resolution {
                    role,
                    linked_student_id: Some(id),
                }
            }
            _ => Resolution {
                role: Role::Student,
                linked_student_id: None,
            },
        },
        HandleKind::MalformedSynthetic => Resolution {
            role: Role::Student,
            linked_student_id: None,
        },
        HandleKind::Regular => match facts.phone_group.first() {
            Some(&first) => Resolution {
                role: student_or_parent(facts.phone_group.len()),
                linked_student_id: Some(first),
            },
            None => Resolution {
                role: Role::Teacher,
                linked_student_id: None,
            },
        },
    }
}

/// Ids of active students sharing `phone`, ascending.
pub async fn active_phone_group<C>(db: &C, phone: &str) -> Result<Vec<i64>>
where
    C: ConnectionTrait,
{
    let students = Student::find()
        .filter(student::Column::PhoneNumber.eq(phone))
        .filter(student::Column::IsActive.eq(true))
        .order_by_asc(student::Column::Id)
        .all(db)
        .await?;
    Ok(students.into_iter().map(|s| s.id).collect())
}

/// Looks up everything [`resolve`] needs for `identity`.
pub async fn gather_facts<C>(db: &C, identity: &Identity<'_>) -> Result<ResolutionFacts>
where
    C: ConnectionTrait,
{
    match classify_handle(identity.username) {
        HandleKind::Synthetic(id) => {
            let student = Student::find_by_id(id).one(db).await?;
            let phone_group = match student.as_ref().and_then(|s| s.phone_number.as_deref()) {
                Some(phone) => active_phone_group(db, phone).await?,
                None => Vec::new(),
            };
            Ok(ResolutionFacts {
                student,
                phone_group,
            })
        }
        HandleKind::MalformedSynthetic => Ok(ResolutionFacts::default()),
        HandleKind::Regular => {
            let phone_group = match identity.session_phone {
                Some(phone) => active_phone_group(db, phone).await?,
                None => Vec::new(),
            };
            Ok(ResolutionFacts {
                student: None,
                phone_group,
            })
        }
    }
}

/// Gathers facts and resolves `identity`.
pub async fn resolve_identity<C>(db: &C, identity: &Identity<'_>) -> Result<Resolution>
where
    C: ConnectionTrait,
{
    let facts = gather_facts(db, identity).await?;
    let resolution = resolve(identity, &facts);
    if matches!(
        classify_handle(identity.username),
        HandleKind::Synthetic(_) | HandleKind::MalformedSynthetic
    ) && resolution.linked_student_id.is_none()
    {
        warn!(
            username = identity.username,
            "Synthetic handle without a student, falling back to unlinked student role"
        );
    }
    Ok(resolution)
}

/// Fetches the profile of `user_id`, if one exists.
pub async fn get_profile<C>(db: &C, user_id: i64) -> Result<Option<profile::Model>>
where
    C: ConnectionTrait,
{
    Profile::find()
        .filter(profile::Column::UserId.eq(user_id))
        .one(db)
        .await
        .map_err(Into::into)
}

async fn insert_if_absent<C>(
    db: &C,
    user_id: i64,
    resolution: Resolution,
) -> Result<profile::Model>
where
    C: ConnectionTrait,
{
    let model = profile::ActiveModel {
        user_id: Set(user_id),
        role: Set(resolution.role),
        linked_student_id: Set(resolution.linked_student_id),
        full_name: Set(None),
        ..Default::default()
    };

    // The unique user_id index settles concurrent creators on one row.
    Profile::insert(model)
        .on_conflict(
            OnConflict::column(profile::Column::UserId)
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(db)
        .await?;

    get_profile(db, user_id).await?.ok_or_else(|| {
        Error::Database(DbErr::RecordNotFound(format!(
            "profile for user {user_id}"
        )))
    })
}

/// Returns the user's profile, creating it from a fresh resolution when absent.
///
/// Never overwrites an existing profile.
#[instrument(skip(db, user), fields(username = %user.username))]
pub async fn ensure_profile<C>(
    db: &C,
    user: &crate::entities::UserModel,
    session_phone: Option<&str>,
) -> Result<profile::Model>
where
    C: ConnectionTrait,
{
    if let Some(existing) = get_profile(db, user.id).await? {
        debug!(role = %existing.role, "Profile already present");
        return Ok(existing);
    }

    let identity = Identity {
        username: &user.username,
        session_phone,
    };
    let resolution = resolve_identity(db, &identity).await?;
    let profile = insert_if_absent(db, user.id, resolution).await?;
    info!(role = %profile.role, linked_student = ?profile.linked_student_id, "Created missing profile");
    Ok(profile)
}

/// Re-derives role and link for `user` and stores them, creating the profile if
/// needed. `full_name` is preserved.
#[instrument(skip(db, user), fields(username = %user.username))]
pub async fn store_resolution<C>(
    db: &C,
    user: &crate::entities::UserModel,
    session_phone: Option<&str>,
) -> Result<profile::Model>
where
    C: ConnectionTrait,
{
    let identity = Identity {
        username: &user.username,
        session_phone,
    };
    let resolution = resolve_identity(db, &identity).await?;

    let profile = match get_profile(db, user.id).await? {
        Some(existing) => {
            if existing.role == resolution.role
                && existing.linked_student_id == resolution.linked_student_id
            {
                return Ok(existing);
            }
            let mut active: profile::ActiveModel = existing.into();
            active.role = Set(resolution.role);
            active.linked_student_id = Set(resolution.linked_student_id);
            active.update(db).await?
        }
        None => insert_if_absent(db, user.id, resolution).await?,
    };

    info!(role = %profile.role, linked_student = ?profile.linked_student_id, "Stored role resolution");
    Ok(profile)
}

async fn profile_for_username(db: &DatabaseConnection, username: &str) -> Result<profile::Model> {
    let user = User::find()
        .filter(crate::entities::user::Column::Username.eq(username))
        .one(db)
        .await?
        .ok_or_else(|| Error::UserNotFound {
            username: username.to_string(),
        })?;
    ensure_profile(db, &user, None).await
}

/// Administrative override of a user's role. Bypasses resolution entirely.
#[instrument(skip(db))]
pub async fn set_role(db: &DatabaseConnection, username: &str, role: Role) -> Result<profile::Model> {
    let profile = profile_for_username(db, username).await?;
    let mut active: profile::ActiveModel = profile.into();
    active.role = Set(role);
    let updated = active.update(db).await?;
    info!("Set role of {username} to {role}");
    Ok(updated)
}

/// Administrative override of a user's full name.
#[instrument(skip(db))]
pub async fn set_full_name(
    db: &DatabaseConnection,
    username: &str,
    full_name: &str,
) -> Result<profile::Model> {
    let full_name = full_name.trim();
    if full_name.is_empty() {
        return Err(Error::validation("Full name cannot be empty"));
    }
    let profile = profile_for_username(db, username).await?;
    let mut active: profile::ActiveModel = profile.into();
    active.full_name = Set(Some(full_name.to_string()));
    let updated = active.update(db).await?;
    info!("Set full name of {username} to '{full_name}'");
    Ok(updated)
}

/// A profile touched by [`ensure_all_profiles`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnsuredProfile {
    /// Username of the owner
    pub username: String,
    /// The profile as stored
    pub profile: profile::Model,
    /// Whether it was created by this pass
    pub created: bool,
}

/// Makes sure every user has a profile. Existing profiles are left untouched.
pub async fn ensure_all_profiles(db: &DatabaseConnection) -> Result<Vec<EnsuredProfile>> {
    let users = User::find()
        .order_by_asc(crate::entities::user::Column::Id)
        .all(db)
        .await?;

    let mut ensured = Vec::with_capacity(users.len());
    for user in users {
        let existed = get_profile(db, user.id).await?.is_some();
        let profile = ensure_profile(db, &user, None).await?;
        ensured.push(EnsuredProfile {
            username: user.username,
            profile,
            created: !existed,
        });
    }
    Ok(ensured)
}
