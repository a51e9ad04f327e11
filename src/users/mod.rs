pub mod repo;
mod repo_types;
pub mod services;

pub use services::{PgUserDirectory, UserDirectory, UserError};
