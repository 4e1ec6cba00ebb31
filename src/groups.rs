// Membership Service
// Group CRUD and member management, plus the read seams the ledger core
// consumes: find_group, is_member, member_ids. The core never mutates
// membership.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use tracing::debug;

use crate::auth::{self, PublicUser};
use crate::db::with_transaction;
use crate::error::{AppError, Result};

/// A group row as stored.
#[derive(Debug, Clone)]
pub struct Group {
    pub id: String,
    pub name: String,
    pub creator_id: String,
    pub created_at: String,
}

/// A group with creator and members expanded, as returned to clients.
#[derive(Debug, Clone, Serialize)]
pub struct GroupView {
    pub id: String,
    pub name: String,
    pub creator: PublicUser,
    pub members: Vec<PublicUser>,
    #[serde(rename = "createdAt")]
    pub created_at: String,
}

// ============================================================================
// READ SEAMS
// ============================================================================

/// Fetch a group or fail with 404.
pub fn find_group(conn: &Connection, group_id: &str) -> Result<Group> {
    conn.query_row(
        "SELECT id, name, creator_id, created_at FROM \"groups\" WHERE id = ?1",
        [group_id],
        |row| {
            Ok(Group {
                id: row.get(0)?,
                name: row.get(1)?,
                creator_id: row.get(2)?,
                created_at: row.get(3)?,
            })
        },
    )
    .optional()?
    .ok_or_else(|| AppError::not_found("Group not found"))
}

pub fn is_member(conn: &Connection, group_id: &str, user_id: &str) -> Result<bool> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS (SELECT 1 FROM group_members WHERE group_id = ?1 AND user_id = ?2)",
        params![group_id, user_id],
        |row| row.get(0),
    )?;
    Ok(exists)
}

/// Member ids in insertion order.
pub fn member_ids(conn: &Connection, group_id: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT user_id FROM group_members WHERE group_id = ?1 ORDER BY rowid",
    )?;
    let ids = stmt
        .query_map([group_id], |row| row.get(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(ids)
}

fn members(conn: &Connection, group_id: &str) -> Result<Vec<PublicUser>> {
    let mut stmt = conn.prepare(
        "SELECT u.id, u.name, u.email
         FROM group_members gm
         JOIN users u ON u.id = gm.user_id
         WHERE gm.group_id = ?1
         ORDER BY gm.rowid",
    )?;
    let users = stmt
        .query_map([group_id], |row| {
            Ok(PublicUser {
                id: row.get(0)?,
                name: row.get(1)?,
                email: row.get(2)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(users)
}

fn group_view(conn: &Connection, group_id: &str) -> Result<GroupView> {
    let group = find_group(conn, group_id)?;
    let creator = auth::get_user(conn, &group.creator_id)?;
    let members = members(conn, group_id)?;

    Ok(GroupView {
        id: group.id,
        name: group.name,
        creator,
        members,
        created_at: group.created_at,
    })
}

// ============================================================================
// OPERATIONS
// ============================================================================

/// Create a group. The creator is always a member; `member_emails` that
/// match registered users are added, unknown emails are ignored, and
/// duplicates collapse.
pub fn create_group(
    conn: &mut Connection,
    creator_id: &str,
    name: &str,
    member_emails: &[String],
) -> Result<GroupView> {
    let name = name.trim();
    if name.len() < 2 {
        return Err(AppError::validation("Group name must be at least 2 characters"));
    }
    if name.len() > 50 {
        return Err(AppError::validation("Group name cannot exceed 50 characters"));
    }

    let mut member_ids: Vec<String> = vec![creator_id.to_string()];
    for email in member_emails {
        if let Some(user) = auth::find_user_by_email(conn, email)? {
            if !member_ids.contains(&user.id) {
                member_ids.push(user.id);
            }
        }
    }

    let group_id = uuid::Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();

    with_transaction(conn, |tx| {
        tx.execute(
            "INSERT INTO \"groups\" (id, name, creator_id, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![group_id, name, creator_id, now],
        )?;
        for member_id in &member_ids {
            tx.execute(
                "INSERT INTO group_members (group_id, user_id) VALUES (?1, ?2)",
                params![group_id, member_id],
            )?;
        }
        Ok(())
    })?;

    debug!(group_id = %group_id, members = member_ids.len(), "created group");

    group_view(conn, &group_id)
}

/// All groups the user belongs to, newest first.
pub fn user_groups(conn: &Connection, user_id: &str) -> Result<Vec<GroupView>> {
    let mut stmt = conn.prepare(
        "SELECT g.id FROM \"groups\" g
         JOIN group_members gm ON gm.group_id = g.id
         WHERE gm.user_id = ?1
         ORDER BY g.created_at DESC",
    )?;
    let ids: Vec<String> = stmt
        .query_map([user_id], |row| row.get(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    ids.iter().map(|id| group_view(conn, id)).collect()
}

/// Fetch a group the caller is a member of (404 / 403 otherwise).
pub fn get_group(conn: &Connection, group_id: &str, user_id: &str) -> Result<GroupView> {
    find_group(conn, group_id)?;
    if !is_member(conn, group_id, user_id)? {
        return Err(AppError::forbidden("You are not a member of this group"));
    }
    group_view(conn, group_id)
}

/// Add members by email. Creator only.
pub fn add_members(
    conn: &mut Connection,
    group_id: &str,
    user_id: &str,
    member_emails: &[String],
) -> Result<GroupView> {
    let group = find_group(conn, group_id)?;
    if group.creator_id != user_id {
        return Err(AppError::forbidden("Only group creator can add members"));
    }

    let mut found = Vec::new();
    for email in member_emails {
        if let Some(user) = auth::find_user_by_email(conn, email)? {
            found.push(user);
        }
    }
    if found.is_empty() {
        return Err(AppError::validation("No valid users found with provided emails"));
    }

    let mut to_add = Vec::new();
    for user in found {
        if !is_member(conn, group_id, &user.id)? && !to_add.contains(&user.id) {
            to_add.push(user.id);
        }
    }
    if to_add.is_empty() {
        return Err(AppError::validation("All users are already members"));
    }

    with_transaction(conn, |tx| {
        for member_id in &to_add {
            tx.execute(
                "INSERT INTO group_members (group_id, user_id) VALUES (?1, ?2)",
                params![group_id, member_id],
            )?;
        }
        Ok(())
    })?;

    group_view(conn, group_id)
}

/// Remove a member. Creator only; the creator cannot be removed.
pub fn remove_member(
    conn: &Connection,
    group_id: &str,
    user_id: &str,
    member_id: &str,
) -> Result<GroupView> {
    let group = find_group(conn, group_id)?;
    if group.creator_id != user_id {
        return Err(AppError::forbidden("Only group creator can remove members"));
    }
    if member_id == group.creator_id {
        return Err(AppError::validation("Cannot remove group creator"));
    }

    conn.execute(
        "DELETE FROM group_members WHERE group_id = ?1 AND user_id = ?2",
        params![group_id, member_id],
    )?;

    group_view(conn, group_id)
}

// ============================================================================
// TESTS
// ============================================================================
