//! Repository layer: persistence contracts and SQLite implementations.
//!
//! # Responsibility
//! - Keep SQL details inside the core persistence boundary.
//! - Expose trait seams so the mutation pipeline can run against test doubles.

use crate::db::DbError;
use rusqlite::Connection;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod candidate_repo;
pub mod session_repo;
pub mod team_repo;
pub mod topic_repo;

pub use session_repo::IdentityStore;
pub use team_repo::TeamStore;

pub type StoreResult<T> = Result<T, StoreError>;

/// Error for read-only identity/team store operations.
#[derive(Debug)]
pub enum StoreError {
    Db(DbError),
    InvalidData(String),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::InvalidData(_) => None,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// SQLite-backed store handed to the mutation pipeline in production.
///
/// Implements the identity and team contracts over one connection and hands
/// that same connection to action bodies for their own repositories, so one
/// mutation never spans two connections.
pub struct SqliteMutationStore<'conn> {
    conn: &'conn mut Connection,
}

impl<'conn> SqliteMutationStore<'conn> {
    /// Wraps a migrated/ready connection.
    pub fn new(conn: &'conn mut Connection) -> Self {
        Self { conn }
    }

    /// Borrows the underlying connection for action-body repositories.
    pub fn connection(&mut self) -> &mut Connection {
        self.conn
    }
}
