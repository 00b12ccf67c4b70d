//! Entity module - Contains all SeaORM entity definitions for the database.
//! These entities represent the database tables and their relationships.
//! Each entity has a Model struct for data and an Entity struct for operations.

pub mod profile;
pub mod student;
pub mod transaction;
pub mod user;

// Re-export specific types to avoid conflicts
pub use profile::{Column as ProfileColumn, Entity as Profile, Model as ProfileModel, Role};
pub use student::{Column as StudentColumn, Entity as Student, Model as StudentModel};
pub use transaction::{
    Column as TransactionColumn, Entity as Transaction, Model as TransactionModel,
    TransactionType,
};
pub use user::{Column as UserColumn, Entity as User, Model as UserModel};
