// Balance Ledger
// Pairwise signed-debt cells, keyed by (group, debtor, creditor). Every
// mutation goes through apply_debt, which upserts both mirrored cells with
// single-statement atomic increments; the read-add-write race cannot be
// expressed through this interface.

use chrono::Utc;
use rusqlite::{params, Connection, Transaction};
use tracing::debug;

use crate::auth::PublicUser;
use crate::error::Result;
use crate::split::Share;

/// One ledger cell: `amount` is how much the debtor owes the creditor.
/// Negative means the relationship is reversed. The mirrored cell always
/// holds the exact negation.
#[derive(Debug, Clone, PartialEq)]
pub struct BalanceCell {
    pub group_id: String,
    pub debtor_id: String,
    pub creditor_id: String,
    pub amount: f64,
    pub updated_at: String,
}

const UPSERT_CELL: &str = "INSERT INTO balances (group_id, debtor_id, creditor_id, amount, updated_at)
     VALUES (?1, ?2, ?3, ?4, ?5)
     ON CONFLICT (group_id, debtor_id, creditor_id)
     DO UPDATE SET amount = amount + excluded.amount, updated_at = excluded.updated_at";

/// Add `delta` to cell(debtor, creditor) and subtract it from
/// cell(creditor, debtor), creating either cell if absent.
///
/// Both updates are single-statement upsert-increments executed inside the
/// caller's transaction scope, so concurrent writers to the same pair
/// compose without lost updates and the mirror invariant holds at every
/// committed state.
pub fn apply_debt(
    tx: &Transaction<'_>,
    group_id: &str,
    debtor_id: &str,
    creditor_id: &str,
    delta: f64,
) -> Result<()> {
    let now = Utc::now().to_rfc3339();

    tx.execute(UPSERT_CELL, params![group_id, debtor_id, creditor_id, delta, now])?;
    tx.execute(UPSERT_CELL, params![group_id, creditor_id, debtor_id, -delta, now])?;

    debug!(group_id, debtor_id, creditor_id, delta, "applied debt");

    Ok(())
}

/// Apply the ledger side of an expense: for every share whose user is not
/// the payer, that user owes the payer the share amount. Shares where the
/// user is the payer are skipped (no self-debt). Returns the number of
/// pairs touched.
pub fn apply_expense_debts(
    tx: &Transaction<'_>,
    group_id: &str,
    paid_by: &str,
    shares: &[Share],
) -> Result<usize> {
    let mut touched = 0;

    for share in shares {
        if share.user_id == paid_by {
            continue;
        }
        apply_debt(tx, group_id, &share.user_id, paid_by, share.amount)?;
        touched += 1;
    }

    Ok(touched)
}

/// Fetch one cell as stored, if it has ever been materialized.
pub fn get_cell(
    conn: &Connection,
    group_id: &str,
    debtor_id: &str,
    creditor_id: &str,
) -> Result<Option<BalanceCell>> {
    use rusqlite::OptionalExtension;

    Ok(conn
        .query_row(
            "SELECT group_id, debtor_id, creditor_id, amount, updated_at FROM balances
             WHERE group_id = ?1 AND debtor_id = ?2 AND creditor_id = ?3",
            params![group_id, debtor_id, creditor_id],
            |row| {
                Ok(BalanceCell {
                    group_id: row.get(0)?,
                    debtor_id: row.get(1)?,
                    creditor_id: row.get(2)?,
                    amount: row.get(3)?,
                    updated_at: row.get(4)?,
                })
            },
        )
        .optional()?)
}

/// Current amount of cell(debtor, creditor); 0 when the cell has never
/// been materialized.
pub fn cell_amount(
    conn: &Connection,
    group_id: &str,
    debtor_id: &str,
    creditor_id: &str,
) -> Result<f64> {
    Ok(get_cell(conn, group_id, debtor_id, creditor_id)?
        .map(|cell| cell.amount)
        .unwrap_or(0.0))
}

/// A nonzero ledger row involving one user, joined with the display data
/// the view builder needs.
#[derive(Debug, Clone)]
pub struct UserCellRow {
    pub group_id: String,
    pub group_name: String,
    pub debtor: PublicUser,
    pub creditor: PublicUser,
    pub amount: f64,
}

const CELL_ROWS_SELECT: &str = "SELECT b.group_id, g.name,
            b.debtor_id, du.name, du.email,
            b.creditor_id, cu.name, cu.email,
            b.amount
     FROM balances b
     JOIN \"groups\" g ON g.id = b.group_id
     JOIN users du ON du.id = b.debtor_id
     JOIN users cu ON cu.id = b.creditor_id
     WHERE (b.debtor_id = ?1 OR b.creditor_id = ?1)
       AND b.amount != 0";

fn map_cell_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserCellRow> {
    Ok(UserCellRow {
        group_id: row.get(0)?,
        group_name: row.get(1)?,
        debtor: PublicUser {
            id: row.get(2)?,
            name: row.get(3)?,
            email: row.get(4)?,
        },
        creditor: PublicUser {
            id: row.get(5)?,
            name: row.get(6)?,
            email: row.get(7)?,
        },
        amount: row.get(8)?,
    })
}

/// Nonzero cells where the user appears as debtor or creditor.
///
/// With `group_id` set, restricted to that group; otherwise restricted to
/// the groups the user is currently a member of.
pub fn cells_for_user(
    conn: &Connection,
    user_id: &str,
    group_id: Option<&str>,
) -> Result<Vec<UserCellRow>> {
    let rows = match group_id {
        Some(group_id) => {
            let sql = format!("{CELL_ROWS_SELECT} AND b.group_id = ?2 ORDER BY b.group_id");
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![user_id, group_id], map_cell_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows
        }
        None => {
            let sql = format!(
                "{CELL_ROWS_SELECT}
                 AND b.group_id IN (SELECT group_id FROM group_members WHERE user_id = ?1)
                 ORDER BY b.group_id"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![user_id], map_cell_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows
        }
    };

    Ok(rows)
}

// ============================================================================
// TESTS
// ============================================================================
