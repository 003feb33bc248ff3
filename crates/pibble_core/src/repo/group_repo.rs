//! Group and membership repository: the membership side of the resolver.
//!
//! # Responsibility
//! - Resolve penalty-eligible members in deterministic join order.
//! - Resolve one user's role inside a group.
//! - Provide the minimal writes collaborators use to seed groups/members.
//!
//! # Invariants
//! - Eligible members are students only, ordered by `joined_at ASC, user_id ASC`.

use super::{parse_uuid, RepoError, RepoResult};
use crate::model::group::{
    group_mode_to_db, group_role_to_db, parse_group_mode, parse_group_role, Group, GroupRole,
    Membership,
};
use crate::model::{GroupId, UserId};
use rusqlite::{params, Connection, OptionalExtension, Row};

const MEMBERSHIP_SELECT_SQL: &str = "SELECT
    group_id,
    user_id,
    role,
    joined_at
FROM group_memberships";

/// Repository interface for group/membership lookups.
pub trait GroupRepository {
    fn create_group(&self, group: &Group) -> RepoResult<GroupId>;
    fn get_group(&self, id: GroupId) -> RepoResult<Option<Group>>;
    /// Adds or replaces one membership row.
    fn add_member(&self, membership: &Membership) -> RepoResult<()>;
    fn get_membership(&self, group_id: GroupId, user_id: UserId)
        -> RepoResult<Option<Membership>>;
    /// Students of `group_id` in join order.
    fn list_penalty_eligible_members(&self, group_id: GroupId) -> RepoResult<Vec<Membership>>;
}

/// SQLite-backed group repository.
pub struct SqliteGroupRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteGroupRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl GroupRepository for SqliteGroupRepository<'_> {
    fn create_group(&self, group: &Group) -> RepoResult<GroupId> {
        self.conn.execute(
            "INSERT INTO groups (id, name, mode) VALUES (?1, ?2, ?3);",
            params![
                group.id.to_string(),
                group.name.as_str(),
                group_mode_to_db(group.mode),
            ],
        )?;
        Ok(group.id)
    }

    fn get_group(&self, id: GroupId) -> RepoResult<Option<Group>> {
        let row = self
            .conn
            .query_row(
                "SELECT id, name, mode FROM groups WHERE id = ?1;",
                [id.to_string()],
                |row| {
                    Ok((
                        row.get::<_, String>("id")?,
                        row.get::<_, String>("name")?,
                        row.get::<_, String>("mode")?,
                    ))
                },
            )
            .optional()?;

        let Some((id_text, name, mode_text)) = row else {
            return Ok(None);
        };
        let mode = parse_group_mode(&mode_text).ok_or_else(|| {
            RepoError::InvalidData(format!("invalid group mode `{mode_text}` in groups.mode"))
        })?;

        Ok(Some(Group {
            id: parse_uuid(&id_text, "groups.id")?,
            name,
            mode,
        }))
    }

    fn add_member(&self, membership: &Membership) -> RepoResult<()> {
        self.conn.execute(
            "INSERT INTO group_memberships (group_id, user_id, role, joined_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (group_id, user_id) DO UPDATE SET role = excluded.role;",
            params![
                membership.group_id.to_string(),
                membership.user_id.to_string(),
                group_role_to_db(membership.role),
                membership.joined_at,
            ],
        )?;
        Ok(())
    }

    fn get_membership(
        &self,
        group_id: GroupId,
        user_id: UserId,
    ) -> RepoResult<Option<Membership>> {
        let mut stmt = self.conn.prepare(&format!(
            "{MEMBERSHIP_SELECT_SQL}
             WHERE group_id = ?1 AND user_id = ?2;"
        ))?;
        let mut rows = stmt.query(params![group_id.to_string(), user_id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_membership_row(row)?));
        }
        Ok(None)
    }

    fn list_penalty_eligible_members(&self, group_id: GroupId) -> RepoResult<Vec<Membership>> {
        let mut stmt = self.conn.prepare(&format!(
            "{MEMBERSHIP_SELECT_SQL}
             WHERE group_id = ?1
               AND role = ?2
             ORDER BY joined_at ASC, user_id ASC;"
        ))?;
        let mut rows = stmt.query(params![
            group_id.to_string(),
            group_role_to_db(GroupRole::Student),
        ])?;

        let mut members = Vec::new();
        while let Some(row) = rows.next()? {
            members.push(parse_membership_row(row)?);
        }
        Ok(members)
    }
}

fn parse_membership_row(row: &Row<'_>) -> RepoResult<Membership> {
    let group_text: String = row.get("group_id")?;
    let user_text: String = row.get("user_id")?;
    let role_text: String = row.get("role")?;
    let role = parse_group_role(&role_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid role `{role_text}` in group_memberships.role"
        ))
    })?;

    Ok(Membership {
        group_id: parse_uuid(&group_text, "group_memberships.group_id")?,
        user_id: parse_uuid(&user_text, "group_memberships.user_id")?,
        role,
        joined_at: row.get("joined_at")?,
    })
}
