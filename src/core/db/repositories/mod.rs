//! PostgreSQL implementations of the store traits

pub mod session;
pub mod user;

pub use session::SessionRepository;
pub use user::UserRepository;

use crate::core::db::store::StoreError;

/// Surface unique violations as [`StoreError::Duplicate`] carrying the
/// constraint name; everything else stays a database error.
pub(crate) fn classify(err: sqlx::Error) -> StoreError {
    if let Some(db_err) = err.as_database_error()
        && db_err.is_unique_violation()
    {
        let constraint = db_err.constraint().unwrap_or_default().to_string();
        return StoreError::Duplicate(constraint);
    }

    StoreError::Database(err)
}
