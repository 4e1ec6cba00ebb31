// Shared fixtures for module tests: an in-memory database plus seeded
// users and groups.

use rusqlite::{params, Connection};

use crate::db;

pub fn conn() -> Connection {
    db::open_in_memory().expect("in-memory database")
}

/// Insert a user whose name is the id and whose email is `<id>@example.com`.
pub fn seed_user(conn: &Connection, id: &str) {
    conn.execute(
        "INSERT INTO users (id, name, email, password_hash, created_at)
         VALUES (?1, ?1, ?1 || '@example.com', 'not-a-real-hash', '2025-01-01T00:00:00Z')",
        [id],
    )
    .expect("seed user");
}

/// Insert a group with the given members. The creator is added to the
/// member set whether or not it appears in `members`.
pub fn seed_group(conn: &Connection, group_id: &str, creator: &str, members: &[&str]) {
    conn.execute(
        "INSERT INTO \"groups\" (id, name, creator_id, created_at)
         VALUES (?1, ?1, ?2, '2025-01-01T00:00:00Z')",
        params![group_id, creator],
    )
    .expect("seed group");

    let mut all: Vec<&str> = vec![creator];
    for m in members {
        if !all.contains(m) {
            all.push(m);
        }
    }
    for member in all {
        conn.execute(
            "INSERT INTO group_members (group_id, user_id) VALUES (?1, ?2)",
            params![group_id, member],
        )
        .expect("seed membership");
    }
}

/// Users a, b, c in a group g created by a.
pub fn seed_trio(conn: &Connection) {
    for id in ["a", "b", "c"] {
        seed_user(conn, id);
    }
    seed_group(conn, "g", "a", &["b", "c"]);
}
