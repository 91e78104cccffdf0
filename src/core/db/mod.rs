//! Persistence for users and sessions
//!
//! [`store`] defines the contract, [`repositories`] implements it on
//! PostgreSQL and [`memory`] keeps everything in process for tests and
//! single-node deployments.

pub mod memory;
pub mod models;
pub mod pool;
pub mod repositories;
pub mod store;

pub use memory::{MemorySessionStore, MemoryUserStore};
pub use models::*;
pub use pool::{DbConfig, DbError, create_pool, create_pool_with_migrations};
pub use repositories::{SessionRepository, UserRepository};
pub use store::{RotationError, SessionStore, StoreError, UserStore};

pub use sqlx::PgPool;
