//! Bulk student import from a CSV sheet.
//!
//! One row per student with a header row naming the columns. Rows are upserted
//! by (name, owning teacher). A row that cannot be placed is counted and the
//! import moves on; only a sheet without the required columns fails as a whole.

use crate::{
    entities::{Profile, Role, Student, User, profile, student, user},
    errors::{Error, Result},
};
use csv::{ReaderBuilder, StringRecord, Trim};
use sea_orm::{Set, prelude::*};
use serde::Serialize;
use std::{collections::HashMap, fs::File, io::Read, path::Path};
use tracing::{info, instrument, warn};

/// Outcome of an import run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    /// Rows created or updated
    pub imported: usize,
    /// Rows without a student name
    pub skipped: usize,
    /// Rows whose teacher could not be found or that failed to save
    pub errors: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Name,
    Teacher,
    Phone,
    Active,
    Hidden,
}

const HEADERS: &[(Field, &[&str])] = &[
    (Field::Name, &["student_name", "имя_ученика"]),
    (Field::Teacher, &["teacher_full_name", "учитель"]),
    (Field::Phone, &["phone_number", "номер_телефона"]),
    (Field::Active, &["is_active", "активен"]),
    (Field::Hidden, &["is_hidden", "скрыт"]),
];

#[derive(Debug)]
struct Columns {
    name: usize,
    teacher: usize,
    phone: Option<usize>,
    active: Option<usize>,
    hidden: Option<usize>,
}

fn map_headers(headers: &StringRecord) -> Result<Columns> {
    let mut positions: Vec<(Field, usize)> = Vec::new();
    for (index, header) in headers.iter().enumerate() {
        let header = header.trim().to_lowercase();
        if let Some((field, _)) = HEADERS
            .iter()
            .find(|(_, names)| names.contains(&header.as_str()))
        {
            positions.push((*field, index));
        }
    }
    let position = |field: Field| {
        positions
            .iter()
            .find(|(f, _)| *f == field)
            .map(|(_, i)| *i)
    };

    let name = position(Field::Name).ok_or_else(|| Error::Import {
        message: "Required column 'student_name' not found".to_string(),
    })?;
    let teacher = position(Field::Teacher).ok_or_else(|| Error::Import {
        message: "Required column 'teacher_full_name' not found".to_string(),
    })?;
    Ok(Columns {
        name,
        teacher,
        phone: position(Field::Phone),
        active: position(Field::Active),
        hidden: position(Field::Hidden),
    })
}

/// Parses the yes/no spellings found in the sheets, falling back to `default`.
#[must_use]
pub fn parse_flag(value: Option<&str>, default: bool) -> bool {
    match value.map(|v| v.trim().to_lowercase()).as_deref() {
        Some("yes" | "true" | "1" | "да" | "active") => true,
        Some("no" | "false" | "0" | "нет" | "inactive") => false,
        _ => default,
    }
}

fn cell(record: &StringRecord, index: Option<usize>) -> Option<&str> {
    index
        .and_then(|i| record.get(i))
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Staff lookup: profile full names first, then usernames.
async fn teacher_directory(db: &DatabaseConnection) -> Result<HashMap<String, i64>> {
    let staff = User::find()
        .find_also_related(Profile)
        .all(db)
        .await?
        .into_iter()
        .filter_map(|(u, p)| {
            p.filter(|p| matches!(p.role, Role::Teacher | Role::Admin))
                .map(|p| (u, p))
        })
        .collect::<Vec<(user::Model, profile::Model)>>();

    let mut directory = HashMap::new();
    for (account, _) in &staff {
        directory.insert(account.username.clone(), account.id);
    }
    for (account, profile) in &staff {
        if let Some(full_name) = profile.full_name.as_deref().map(str::trim) {
            directory.insert(full_name.to_string(), account.id);
        }
    }
    Ok(directory)
}

async fn upsert_student(
    db: &DatabaseConnection,
    name: &str,
    teacher_id: i64,
    phone: Option<&str>,
    is_active: bool,
    is_hidden: bool,
) -> Result<()> {
    let existing = Student::find()
        .filter(student::Column::Name.eq(name))
        .filter(student::Column::TeacherId.eq(teacher_id))
        .one(db)
        .await?;

    match existing {
        Some(found) => {
            let mut active: student::ActiveModel = found.into();
            active.phone_number = Set(phone.map(ToString::to_string));
            active.is_active = Set(is_active);
            active.is_hidden = Set(is_hidden);
            active.update(db).await?;
        }
        None => {
            student::ActiveModel {
                name: Set(name.to_string()),
                teacher_id: Set(teacher_id),
                balance: Set(0),
                phone_number: Set(phone.map(ToString::to_string)),
                is_active: Set(is_active),
                is_hidden: Set(is_hidden),
                ..Default::default()
            }
            .insert(db)
            .await?;
        }
    }
    Ok(())
}

/// Imports students from CSV data.
#[instrument(skip(db, source))]
pub async fn import_students<R: Read>(db: &DatabaseConnection, source: R) -> Result<ImportSummary> {
    let (columns, records) = {
        let mut reader = ReaderBuilder::new()
            .trim(Trim::All)
            .flexible(true)
            .from_reader(source);
        let columns = map_headers(reader.headers()?)?;
        let records = reader
            .records()
            .collect::<std::result::Result<Vec<_>, _>>()?;
        (columns, records)
    };

    let directory = teacher_directory(db).await?;
    info!(teachers = directory.len(), rows = records.len(), "Starting student import");

    let mut summary = ImportSummary::default();
    for (offset, record) in records.iter().enumerate() {
        let row = offset + 2;
        if record.iter().all(|v| v.trim().is_empty()) {
            continue;
        }
        let Some(name) = cell(record, Some(columns.name)) else {
            summary.skipped += 1;
            continue;
        };
        let Some(teacher_id) =
            cell(record, Some(columns.teacher)).and_then(|t| directory.get(t).copied())
        else {
            warn!(row, name, "No teacher found for student, skipping");
            summary.errors += 1;
            continue;
        };

        let is_active = parse_flag(cell(record, columns.active), true);
        let is_hidden = parse_flag(cell(record, columns.hidden), false);
        match upsert_student(
            db,
            name,
            teacher_id,
            cell(record, columns.phone),
            is_active,
            is_hidden,
        )
        .await
        {
            Ok(()) => summary.imported += 1,
            Err(e) => {
                warn!(row, name, error = %e, "Failed to import row");
                summary.errors += 1;
            }
        }
    }

    info!(
        imported = summary.imported,
        skipped = summary.skipped,
        errors = summary.errors,
        "Student import finished"
    );
    Ok(summary)
}

/// Imports students from a CSV file on disk.
pub async fn import_students_from_path(
    db: &DatabaseConnection,
    path: &Path,
) -> Result<ImportSummary> {
    let file = File::open(path)?;
    import_students(db, file).await
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::core::role;
    use crate::test_utils::*;
    use sea_orm::QueryOrder;
    use std::io::Write;

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag(Some(" Да "), false));
        assert!(parse_flag(Some("active"), false));
        assert!(!parse_flag(Some("нет"), true));
        assert!(!parse_flag(Some("Inactive"), true));
        assert!(parse_flag(Some("maybe"), true));
        assert!(!parse_flag(None, false));
    }

    #[tokio::test]
    async fn test_import_creates_updates_and_counts() -> Result<()> {
        let db = setup_test_db().await?;
        create_test_teacher(&db, "ms_green").await?;
        role::set_full_name(&db, "ms_green", "Olga Green").await?;
        let teacher = create_test_teacher(&db, "mr_brown").await?;
        create_custom_student(&db, teacher.id, "Bob", Some("+1")).await?;

        let sheet = "\
Student_Name ,Teacher_Full_Name,phone_number,is_active,is_hidden
Ann,Olga Green,+1000,да,нет
Bob,mr_brown,+2000,no,yes
,Olga Green,,,
Cid,Nobody,,,
,,,,
";
        let summary = import_students(&db, sheet.as_bytes()).await?;
        assert_eq!(
            summary,
            ImportSummary {
                imported: 2,
                skipped: 1,
                errors: 1
            }
        );

        let students = Student::find()
            .order_by_asc(student::Column::Name)
            .all(&db)
            .await?;
        assert_eq!(students.len(), 2);
        assert_eq!(students[0].name, "Ann");
        assert_eq!(students[0].phone_number.as_deref(), Some("+1000"));
        assert!(students[0].is_active);
        assert_eq!(students[1].name, "Bob");
        assert_eq!(students[1].phone_number.as_deref(), Some("+2000"));
        assert!(!students[1].is_active);
        assert!(students[1].is_hidden);
        Ok(())
    }

    #[tokio::test]
    async fn test_import_accepts_russian_headers_from_file() -> Result<()> {
        let db = setup_test_db().await?;
        create_test_teacher(&db, "t").await?;

        let mut file = tempfile::NamedTempFile::new()?;
        writeln!(file, "имя_ученика,учитель")?;
        writeln!(file, "Вася,t")?;
        let summary = import_students_from_path(&db, file.path()).await?;
        assert_eq!(summary.imported, 1);

        let vasya = Student::find().one(&db).await?.unwrap();
        assert!(vasya.is_active);
        assert!(!vasya.is_hidden);
        assert_eq!(vasya.phone_number, None);
        Ok(())
    }

    #[tokio::test]
    async fn test_import_requires_name_and_teacher_columns() -> Result<()> {
        let db = setup_test_db().await?;
        let result = import_students(&db, "student_name,phone_number\nAnn,+1\n".as_bytes()).await;
        assert!(matches!(result, Err(Error::Import { .. })));
        Ok(())
    }
}
