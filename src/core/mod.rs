/// Access policy: principals, scopes and permission checks
pub mod access;

/// Password hashing and the password and phone logins
pub mod auth;

/// Bulk student import from CSV
pub mod import;

/// Balance changes and transaction history
pub mod ledger;

/// Role-specific dashboards
pub mod report;

/// Role resolution and profile maintenance
pub mod role;

/// Student create, edit and list flows
pub mod student;

/// User accounts and synthetic student accounts
pub mod user;
