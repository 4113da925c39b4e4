//! Session resolution contract and SQLite implementation.
//!
//! # Responsibility
//! - Resolve an opaque session handle to a caller identity, or to nothing.
//! - Provide provisioning helpers for users and sessions (admin/test setup;
//!   never called from the mutation pipeline).
//!
//! # Invariants
//! - Resolution is read-only and side-effect free.
//! - Expired sessions resolve to no identity, indistinguishable from unknown
//!   handles.

use crate::model::identity::{parse_role, role_to_db, Identity, Role, UserId};
use crate::repo::{SqliteMutationStore, StoreError, StoreResult};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

/// Identity resolution contract consumed by the mutation pipeline.
pub trait IdentityStore {
    /// Resolves one session handle to an identity, or `None` when the handle
    /// is unknown or expired.
    fn resolve_identity(&mut self, session_token: &str) -> StoreResult<Option<Identity>>;
}

impl IdentityStore for SqliteMutationStore<'_> {
    fn resolve_identity(&mut self, session_token: &str) -> StoreResult<Option<Identity>> {
        resolve_identity(self.connection(), session_token)
    }
}

/// Resolves one session handle against the `sessions`/`users` tables.
pub fn resolve_identity(
    conn: &Connection,
    session_token: &str,
) -> StoreResult<Option<Identity>> {
    let row = conn
        .query_row(
            "SELECT u.uuid, u.role
             FROM sessions s
             INNER JOIN users u ON u.uuid = s.user_uuid
             WHERE s.token = ?1
               AND (s.expires_at IS NULL
                    OR s.expires_at > (strftime('%s', 'now') * 1000));",
            [session_token],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                ))
            },
        )
        .optional()?;

    let Some((uuid_text, role_text)) = row else {
        return Ok(None);
    };

    let user_id = Uuid::parse_str(&uuid_text).map_err(|_| {
        StoreError::InvalidData(format!("invalid uuid value `{uuid_text}` in users.uuid"))
    })?;
    let role = parse_role(&role_text).ok_or_else(|| {
        StoreError::InvalidData(format!("invalid role value `{role_text}` in users.role"))
    })?;

    Ok(Some(Identity { user_id, role }))
}

/// Inserts one user and returns its stable id.
pub fn insert_user(conn: &Connection, display_name: &str, role: Role) -> StoreResult<UserId> {
    let user_id = Uuid::new_v4();
    conn.execute(
        "INSERT INTO users (uuid, display_name, role) VALUES (?1, ?2, ?3);",
        params![user_id.to_string(), display_name, role_to_db(role)],
    )?;
    Ok(user_id)
}

/// Inserts one session for the given user.
///
/// `expires_at` is epoch milliseconds; `None` means the session does not
/// expire.
pub fn insert_session(
    conn: &Connection,
    token: &str,
    user_id: UserId,
    expires_at: Option<i64>,
) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO sessions (token, user_uuid, expires_at) VALUES (?1, ?2, ?3);",
        params![token, user_id.to_string(), expires_at],
    )?;
    Ok(())
}
