//! Command line for running the server and the administrative escape hatches.

use clap::{Parser, Subcommand};
use iqcoin::{
    config::{database, settings::AppConfig},
    core::{
        import,
        role::{self, EnsuredProfile},
        user::{self, NewUser},
    },
    entities::Role,
    errors::{Error, Result},
    web::{self, AppState},
};
use sea_orm::DatabaseConnection;
use std::{path::PathBuf, sync::Arc};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "iqcoin")]
#[command(about = "IQ-coin ledger service and administration tools")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Start the HTTP API
    Serve,
    /// Create the database tables and exit
    InitDb,
    /// Create a staff account
    CreateUser {
        /// Login handle
        username: String,
        /// Password; omit for an account that cannot log in yet
        #[arg(long, env = "IQCOIN_PASSWORD")]
        password: Option<String>,
        /// Display name
        #[arg(long, default_value = "")]
        first_name: String,
        /// Promote the new account to admin
        #[arg(long)]
        admin: bool,
    },
    /// Assign roles, then give every user without a profile its default role
    SetupRoles {
        #[arg(long = "admin", value_name = "USERNAME", num_args = 1..)]
        admins: Vec<String>,
        #[arg(long = "teacher", value_name = "USERNAME", num_args = 1..)]
        teachers: Vec<String>,
        #[arg(long = "student", value_name = "USERNAME", num_args = 1..)]
        students: Vec<String>,
    },
    /// Set profile full names from `username:"Full Name"` pairs
    SetFullNames {
        #[arg(value_name = "USERNAME:FULL NAME", required = true)]
        pairs: Vec<String>,
    },
    /// Upsert students from a CSV export of the class sheet
    ImportStudents {
        #[arg(short, long, value_name = "FILE")]
        file: PathBuf,
    },
}

impl Cli {
    pub async fn run(self, config: AppConfig) -> Result<()> {
        let db = database::init_database(&config.database_url).await?;

        match self.command {
            Command::Serve => web::serve(AppState::new(db, Arc::new(config))).await,
            Command::InitDb => {
                info!("Database ready at {}", config.database_url);
                Ok(())
            }
            Command::CreateUser {
                username,
                password,
                first_name,
                admin,
            } => create_user(&db, &username, password.as_deref(), &first_name, admin).await,
            Command::SetupRoles {
                admins,
                teachers,
                students,
            } => {
                for (role, usernames) in [
                    (Role::Admin, &admins),
                    (Role::Teacher, &teachers),
                    (Role::Student, &students),
                ] {
                    assign_roles(&db, role, usernames).await?;
                }
                report_defaults(&role::ensure_all_profiles(&db).await?);
                Ok(())
            }
            Command::SetFullNames { pairs } => set_full_names(&db, &pairs).await,
            Command::ImportStudents { file } => {
                let summary = import::import_students_from_path(&db, &file).await?;
                println!(
                    "Imported {} students, skipped {}, errors {}",
                    summary.imported, summary.skipped, summary.errors
                );
                Ok(())
            }
        }
    }
}

async fn create_user(
    db: &DatabaseConnection,
    username: &str,
    password: Option<&str>,
    first_name: &str,
    admin: bool,
) -> Result<()> {
    let (created, mut profile) = user::create_user(
        db,
        NewUser {
            username,
            password,
            first_name,
        },
    )
    .await?;
    if admin {
        profile = role::set_role(db, &created.username, Role::Admin).await?;
    }
    println!("Created {} as {}", created.username, profile.role);
    Ok(())
}

/// Unknown usernames are reported and skipped; other failures abort.
async fn assign_roles(db: &DatabaseConnection, role: Role, usernames: &[String]) -> Result<()> {
    for username in usernames {
        match role::set_role(db, username, role).await {
            Ok(_) => println!("Set {username} as {role}"),
            Err(Error::UserNotFound { .. }) => {
                error!("User {username} does not exist");
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

fn report_defaults(ensured: &[EnsuredProfile]) {
    for entry in ensured.iter().filter(|e| e.created) {
        println!(
            "Created profile for {} as {} (default)",
            entry.username, entry.profile.role
        );
    }
}

/// Splits `username:Full Name` (or `username=Full Name`); quotes around the name
/// are dropped.
fn parse_pair(pair: &str) -> Result<(&str, &str)> {
    pair.split_once([':', '='])
        .map(|(username, name)| (username.trim(), name.trim().trim_matches('"').trim()))
        .filter(|(username, name)| !username.is_empty() && !name.is_empty())
        .ok_or_else(|| Error::validation(format!("Expected USERNAME:FULL NAME, got '{pair}'")))
}

async fn set_full_names(db: &DatabaseConnection, pairs: &[String]) -> Result<()> {
    for pair in pairs {
        let (username, full_name) = parse_pair(pair)?;
        match role::set_full_name(db, username, full_name).await {
            Ok(_) => println!("Set full name of {username} to {full_name}"),
            Err(Error::UserNotFound { .. }) => {
                error!("User {username} does not exist");
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
