// Settlement Engine & Balance View Builder
// Settlement is a symmetric ledger adjustment inside one transaction; the
// view builder is read-only and projects raw mirrored cells into
// "you owe" / "owes you" lists without double-reporting.

use rusqlite::Connection;
use serde::Serialize;
use tracing::debug;

use crate::auth::PublicUser;
use crate::db::with_transaction;
use crate::error::{AppError, Result};
use crate::groups;
use crate::ledger::{self, UserCellRow};

/// One line of a balance view: the counterparty and the (positive) amount.
#[derive(Debug, Clone, Serialize)]
pub struct BalanceEntry {
    pub user: PublicUser,
    pub amount: f64,
}

/// Balance summary for one user in one group.
#[derive(Debug, Clone, Serialize)]
pub struct GroupBalances {
    #[serde(rename = "youOwe")]
    pub you_owe: Vec<BalanceEntry>,
    #[serde(rename = "owesYou")]
    pub owes_you: Vec<BalanceEntry>,
    #[serde(rename = "totalYouOwe")]
    pub total_you_owe: f64,
    #[serde(rename = "totalOwesYou")]
    pub total_owes_you: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupSummary {
    pub id: String,
    pub name: String,
}

/// One group's slice of a user's cross-group balance overview.
#[derive(Debug, Clone, Serialize)]
pub struct GroupBalanceOverview {
    pub group: GroupSummary,
    #[serde(rename = "youOwe")]
    pub you_owe: Vec<BalanceEntry>,
    #[serde(rename = "owesYou")]
    pub owes_you: Vec<BalanceEntry>,
}

/// Settlement result, echoed back to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct SettlementReceipt {
    pub message: String,
    pub amount: f64,
    pub from: String,
    pub to: String,
}

// ============================================================================
// VIEW BUILDER
// ============================================================================

/// Categorize one raw cell from `user_id`'s perspective.
///
/// Every relationship is stored as a mirrored pair, so only the positive
/// row of each pair is reported: as "you owe" when the user is its debtor,
/// as "owes you" when the user is its creditor. The negative mirrored rows
/// are the redundant view of the same debt and are skipped; reporting them
/// too would double-count every relationship.
fn categorize(
    user_id: &str,
    cell: &UserCellRow,
    you_owe: &mut Vec<BalanceEntry>,
    owes_you: &mut Vec<BalanceEntry>,
) {
    if cell.amount <= 0.0 {
        return;
    }

    if cell.debtor.id == user_id {
        you_owe.push(BalanceEntry {
            user: cell.creditor.clone(),
            amount: cell.amount,
        });
    } else if cell.creditor.id == user_id {
        owes_you.push(BalanceEntry {
            user: cell.debtor.clone(),
            amount: cell.amount,
        });
    }
}

/// "You owe" / "owes you" summary for one group, with totals.
pub fn group_balances(conn: &Connection, user_id: &str, group_id: &str) -> Result<GroupBalances> {
    groups::find_group(conn, group_id)?;
    if !groups::is_member(conn, group_id, user_id)? {
        return Err(AppError::forbidden("You are not a member of this group"));
    }

    let cells = ledger::cells_for_user(conn, user_id, Some(group_id))?;

    let mut you_owe = Vec::new();
    let mut owes_you = Vec::new();
    for cell in &cells {
        categorize(user_id, cell, &mut you_owe, &mut owes_you);
    }

    let total_you_owe = you_owe.iter().map(|e| e.amount).sum();
    let total_owes_you = owes_you.iter().map(|e| e.amount).sum();

    Ok(GroupBalances {
        you_owe,
        owes_you,
        total_you_owe,
        total_owes_you,
    })
}

/// The same categorization across every group the user currently belongs
/// to, grouped by group.
pub fn overall_balances(conn: &Connection, user_id: &str) -> Result<Vec<GroupBalanceOverview>> {
    let cells = ledger::cells_for_user(conn, user_id, None)?;

    let mut overviews: Vec<GroupBalanceOverview> = Vec::new();
    for cell in &cells {
        let idx = match overviews.iter().position(|o| o.group.id == cell.group_id) {
            Some(idx) => idx,
            None => {
                overviews.push(GroupBalanceOverview {
                    group: GroupSummary {
                        id: cell.group_id.clone(),
                        name: cell.group_name.clone(),
                    },
                    you_owe: Vec::new(),
                    owes_you: Vec::new(),
                });
                overviews.len() - 1
            }
        };
        let overview = &mut overviews[idx];
        categorize(user_id, cell, &mut overview.you_owe, &mut overview.owes_you);
    }

    // A user can appear only through mirrored rows that categorize() skips;
    // drop groups whose overview came out empty.
    overviews.retain(|o| !o.you_owe.is_empty() || !o.owes_you.is_empty());

    Ok(overviews)
}

// ============================================================================
// SETTLEMENT ENGINE
// ============================================================================

/// Record a direct payment from `user_id` to `creditor_id`.
///
/// The payer's debt to the creditor decreases by `amount`; the mirrored
/// cell moves the opposite way. There is no clamping at zero: settling
/// more than the outstanding debt flips the sign and the creditor then
/// owes the payer. Settlements are free-form cash transfers, not capped
/// repayments.
pub fn settle_debt(
    conn: &mut Connection,
    user_id: &str,
    group_id: &str,
    creditor_id: &str,
    amount: f64,
) -> Result<SettlementReceipt> {
    groups::find_group(conn, group_id)?;
    if !groups::is_member(conn, group_id, user_id)?
        || !groups::is_member(conn, group_id, creditor_id)?
    {
        return Err(AppError::forbidden("Both users must be members of the group"));
    }
    if amount <= 0.0 {
        return Err(AppError::validation("Settlement amount must be greater than 0"));
    }

    with_transaction(conn, |tx| {
        ledger::apply_debt(tx, group_id, user_id, creditor_id, -amount)
    })?;

    debug!(group_id, from = user_id, to = creditor_id, amount, "settled debt");

    Ok(SettlementReceipt {
        message: "Debt settled successfully".to_string(),
        amount,
        from: user_id.to_string(),
        to: creditor_id.to_string(),
    })
}

// ============================================================================
// TESTS
// ============================================================================
