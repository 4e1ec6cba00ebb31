use rusqlite::{Connection, TransactionBehavior};
use std::path::Path;

use crate::error::Result;

/// Open the database at the given path with WAL mode and foreign keys on.
pub fn open(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    Ok(conn)
}

/// In-memory database with the full schema, for tests.
pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    setup_database(&conn)?;
    Ok(conn)
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // ==========================================================================
    // Users
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            email TEXT UNIQUE NOT NULL,
            password_hash TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Groups + membership
    // The groups table name is quoted: GROUPS became a SQLite keyword in 3.28
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS \"groups\" (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            creator_id TEXT NOT NULL REFERENCES users(id),
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS group_members (
            group_id TEXT NOT NULL REFERENCES \"groups\"(id),
            user_id TEXT NOT NULL REFERENCES users(id),
            PRIMARY KEY (group_id, user_id)
        )",
        [],
    )?;

    // ==========================================================================
    // Expenses (immutable once created) + ordered split rows
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS expenses (
            id TEXT PRIMARY KEY,
            group_id TEXT NOT NULL REFERENCES \"groups\"(id),
            description TEXT NOT NULL,
            amount REAL NOT NULL CHECK (amount > 0),
            paid_by TEXT NOT NULL REFERENCES users(id),
            split_type TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS expense_splits (
            expense_id TEXT NOT NULL REFERENCES expenses(id),
            user_id TEXT NOT NULL REFERENCES users(id),
            amount REAL NOT NULL,
            percentage REAL,
            position INTEGER NOT NULL,
            PRIMARY KEY (expense_id, position)
        )",
        [],
    )?;

    // ==========================================================================
    // Balance ledger cells
    // One row per ordered (debtor, creditor) pair per group; the mirrored
    // row always carries the negated amount. Rows are never deleted.
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS balances (
            group_id TEXT NOT NULL REFERENCES \"groups\"(id),
            debtor_id TEXT NOT NULL REFERENCES users(id),
            creditor_id TEXT NOT NULL REFERENCES users(id),
            amount REAL NOT NULL DEFAULT 0,
            updated_at TEXT NOT NULL,
            UNIQUE (group_id, debtor_id, creditor_id)
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_expenses_group_created
         ON expenses(group_id, created_at DESC)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_balances_debtor ON balances(debtor_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_balances_creditor ON balances(creditor_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_group_members_user ON group_members(user_id)",
        [],
    )?;

    Ok(())
}

/// Run `f` inside a single atomic transaction scope.
///
/// Opens an IMMEDIATE transaction (takes the write lock up front so two
/// writers cannot interleave), commits when `f` returns `Ok`, and rolls
/// back when it returns `Err`. The rusqlite transaction guard rolls back
/// on drop, so every exit path releases the scope. Expense creation and
/// settlement both go through here; no partial effect of either is ever
/// observable outside the scope.
pub fn with_transaction<T, F>(conn: &mut Connection, f: F) -> Result<T>
where
    F: FnOnce(&rusqlite::Transaction<'_>) -> Result<T>,
{
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let value = f(&tx)?;
    tx.commit()?;
    Ok(value)
}
