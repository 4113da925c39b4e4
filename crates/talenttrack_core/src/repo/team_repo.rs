//! Team store contract and SQLite implementation.
//!
//! # Responsibility
//! - Load team records with their soft-delete state for the ownership guard.
//! - Answer membership probes.
//! - Provide provisioning helpers for teams (admin/test setup; never called
//!   from the mutation pipeline).
//!
//! # Invariants
//! - Lookups are read-only; the mutation pipeline never mutates teams.
//! - `deleted_at` is returned as stored so the guard can reject tombstoned
//!   teams itself.

use crate::model::identity::UserId;
use crate::model::team::{Team, TeamId};
use crate::repo::{SqliteMutationStore, StoreError, StoreResult};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

/// Team lookup contract consumed by the mutation pipeline.
pub trait TeamStore {
    /// Loads one team by id, including soft-deleted records.
    fn load_team(&mut self, team_id: TeamId) -> StoreResult<Option<Team>>;
    /// Returns whether the user is an explicit member of the team.
    fn is_team_member(&mut self, team_id: TeamId, user_id: UserId) -> StoreResult<bool>;
}

impl TeamStore for SqliteMutationStore<'_> {
    fn load_team(&mut self, team_id: TeamId) -> StoreResult<Option<Team>> {
        load_team(self.connection(), team_id)
    }

    fn is_team_member(&mut self, team_id: TeamId, user_id: UserId) -> StoreResult<bool> {
        is_team_member(self.connection(), team_id, user_id)
    }
}

/// Loads one team record by id.
pub fn load_team(conn: &Connection, team_id: TeamId) -> StoreResult<Option<Team>> {
    conn.query_row(
        "SELECT uuid, name, owner_user_uuid, deleted_at
         FROM teams
         WHERE uuid = ?1;",
        [team_id.to_string()],
        parse_team_row,
    )
    .optional()?
    .transpose()
}

/// Returns whether the user appears in `team_members` for the team.
pub fn is_team_member(conn: &Connection, team_id: TeamId, user_id: UserId) -> StoreResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM team_members
            WHERE team_uuid = ?1 AND user_uuid = ?2
        );",
        params![team_id.to_string(), user_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

/// Inserts one team and returns its stable id.
pub fn insert_team(conn: &Connection, name: &str, owner: UserId) -> StoreResult<TeamId> {
    let team_id = Uuid::new_v4();
    conn.execute(
        "INSERT INTO teams (uuid, name, owner_user_uuid) VALUES (?1, ?2, ?3);",
        params![team_id.to_string(), name, owner.to_string()],
    )?;
    Ok(team_id)
}

/// Adds one explicit membership row.
pub fn add_team_member(conn: &Connection, team_id: TeamId, user_id: UserId) -> StoreResult<()> {
    conn.execute(
        "INSERT OR IGNORE INTO team_members (team_uuid, user_uuid) VALUES (?1, ?2);",
        params![team_id.to_string(), user_id.to_string()],
    )?;
    Ok(())
}

/// Marks one team as softly deleted.
pub fn soft_delete_team(conn: &Connection, team_id: TeamId) -> StoreResult<()> {
    conn.execute(
        "UPDATE teams
         SET deleted_at = (strftime('%s', 'now') * 1000),
             updated_at = (strftime('%s', 'now') * 1000)
         WHERE uuid = ?1;",
        [team_id.to_string()],
    )?;
    Ok(())
}

fn parse_team_row(row: &Row<'_>) -> rusqlite::Result<StoreResult<Team>> {
    let uuid_text: String = row.get("uuid")?;
    let owner_text: String = row.get("owner_user_uuid")?;
    let name: String = row.get("name")?;
    let deleted_at: Option<i64> = row.get("deleted_at")?;

    Ok(parse_team_fields(uuid_text, name, owner_text, deleted_at))
}

fn parse_team_fields(
    uuid_text: String,
    name: String,
    owner_text: String,
    deleted_at: Option<i64>,
) -> StoreResult<Team> {
    let uuid = Uuid::parse_str(&uuid_text).map_err(|_| {
        StoreError::InvalidData(format!("invalid uuid value `{uuid_text}` in teams.uuid"))
    })?;
    let owner_user_uuid = Uuid::parse_str(&owner_text).map_err(|_| {
        StoreError::InvalidData(format!(
            "invalid uuid value `{owner_text}` in teams.owner_user_uuid"
        ))
    })?;

    Ok(Team {
        uuid,
        name,
        owner_user_uuid,
        deleted_at,
    })
}
