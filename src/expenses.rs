// Expense creation and listing
// Creation is the calculator → validator → transaction pipeline: all
// checks run before the scope opens, then the expense record, its split
// rows, and the 2×(members−1) ledger updates commit or abort as one unit.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use serde::Serialize;
use tracing::debug;

use crate::auth::{self, PublicUser};
use crate::db::with_transaction;
use crate::error::{AppError, Result};
use crate::groups;
use crate::ledger;
use crate::split::{self, Share, SplitSpec, SplitType};

/// Validated input for expense creation.
#[derive(Debug, Clone)]
pub struct NewExpense {
    pub group_id: String,
    pub description: String,
    pub amount: f64,
    pub split: SplitSpec,
}

/// One split of an expense with the user expanded.
#[derive(Debug, Clone, Serialize)]
pub struct SplitView {
    pub user: PublicUser,
    pub amount: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percentage: Option<f64>,
}

/// An expense with payer and split users expanded.
#[derive(Debug, Clone, Serialize)]
pub struct ExpenseView {
    pub id: String,
    #[serde(rename = "groupId")]
    pub group_id: String,
    pub description: String,
    pub amount: f64,
    #[serde(rename = "paidBy")]
    pub paid_by: PublicUser,
    #[serde(rename = "splitType")]
    pub split_type: SplitType,
    pub splits: Vec<SplitView>,
    #[serde(rename = "createdAt")]
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub pages: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExpensePage {
    pub expenses: Vec<ExpenseView>,
    pub pagination: Pagination,
}

// ============================================================================
// CREATE
// ============================================================================

/// Create an expense and apply its debts to the ledger in one atomic scope.
///
/// Order of gates: group exists (404) → caller is a member (403) → shares
/// computed and validated, every split user a member (400). Only then does
/// the transaction open; a failure anywhere leaves no partial write.
pub fn create_expense(conn: &mut Connection, user_id: &str, req: &NewExpense) -> Result<ExpenseView> {
    let description = req.description.trim();
    if description.is_empty() {
        return Err(AppError::validation("Description is required"));
    }
    if description.len() > 200 {
        return Err(AppError::validation("Description cannot exceed 200 characters"));
    }
    if req.amount <= 0.0 {
        return Err(AppError::validation("Amount must be greater than 0"));
    }

    groups::find_group(conn, &req.group_id)?;
    if !groups::is_member(conn, &req.group_id, user_id)? {
        return Err(AppError::forbidden("You are not a member of this group"));
    }

    let members = groups::member_ids(conn, &req.group_id)?;
    let shares = split::calculate_shares(req.amount, &req.split, &members, user_id)?;
    split::validate_shares(req.amount, req.split.split_type(), &shares)?;

    for share in &shares {
        if !members.contains(&share.user_id) {
            return Err(AppError::validation("All split users must be members of the group"));
        }
    }

    let expense_id = uuid::Uuid::new_v4().to_string();
    let created_at = Utc::now().to_rfc3339();
    let split_type = req.split.split_type();

    with_transaction(conn, |tx| {
        insert_expense(
            tx,
            &expense_id,
            &req.group_id,
            description,
            req.amount,
            user_id,
            split_type,
            &created_at,
            &shares,
        )?;
        ledger::apply_expense_debts(tx, &req.group_id, user_id, &shares)?;
        Ok(())
    })?;

    debug!(expense_id = %expense_id, group_id = %req.group_id, "created expense");

    expense_view(conn, &expense_id)
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn insert_expense(
    tx: &Transaction<'_>,
    expense_id: &str,
    group_id: &str,
    description: &str,
    amount: f64,
    paid_by: &str,
    split_type: SplitType,
    created_at: &str,
    shares: &[Share],
) -> Result<()> {
    tx.execute(
        "INSERT INTO expenses (id, group_id, description, amount, paid_by, split_type, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            expense_id,
            group_id,
            description,
            amount,
            paid_by,
            split_type.as_str(),
            created_at
        ],
    )?;

    for (position, share) in shares.iter().enumerate() {
        tx.execute(
            "INSERT INTO expense_splits (expense_id, user_id, amount, percentage, position)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                expense_id,
                share.user_id,
                share.amount,
                share.percentage,
                position as i64
            ],
        )?;
    }

    Ok(())
}

// ============================================================================
// READ
// ============================================================================

fn expense_view(conn: &Connection, expense_id: &str) -> Result<ExpenseView> {
    let row = conn
        .query_row(
            "SELECT id, group_id, description, amount, paid_by, split_type, created_at
             FROM expenses WHERE id = ?1",
            [expense_id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, f64>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, String>(6)?,
                ))
            },
        )
        .optional()?;

    let (id, group_id, description, amount, paid_by_id, split_type, created_at) =
        row.ok_or_else(|| AppError::not_found("Expense not found"))?;

    let split_type = SplitType::parse(&split_type)?;
    let paid_by = auth::get_user(conn, &paid_by_id)?;

    let mut stmt = conn.prepare(
        "SELECT u.id, u.name, u.email, es.amount, es.percentage
         FROM expense_splits es
         JOIN users u ON u.id = es.user_id
         WHERE es.expense_id = ?1
         ORDER BY es.position",
    )?;
    let splits = stmt
        .query_map([expense_id], |row| {
            Ok(SplitView {
                user: PublicUser {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    email: row.get(2)?,
                },
                amount: row.get(3)?,
                percentage: row.get(4)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(ExpenseView {
        id,
        group_id,
        description,
        amount,
        paid_by,
        split_type,
        splits,
        created_at,
    })
}

/// Expenses for a group, newest first, with pagination metadata.
pub fn list_expenses(
    conn: &Connection,
    user_id: &str,
    group_id: &str,
    page: i64,
    limit: i64,
) -> Result<ExpensePage> {
    groups::find_group(conn, group_id)?;
    if !groups::is_member(conn, group_id, user_id)? {
        return Err(AppError::forbidden("You are not a member of this group"));
    }

    let page = page.max(1);
    let limit = limit.clamp(1, 100);

    let total: i64 = conn.query_row(
        "SELECT COUNT(*) FROM expenses WHERE group_id = ?1",
        [group_id],
        |row| row.get(0),
    )?;
    let pages = if total == 0 { 0 } else { (total + limit - 1) / limit };
    let offset = (page - 1) * limit;

    let mut stmt = conn.prepare(
        "SELECT id FROM expenses
         WHERE group_id = ?1
         ORDER BY created_at DESC, rowid DESC
         LIMIT ?2 OFFSET ?3",
    )?;
    let ids: Vec<String> = stmt
        .query_map(params![group_id, limit, offset], |row| row.get(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let expenses = ids
        .iter()
        .map(|id| expense_view(conn, id))
        .collect::<Result<Vec<_>>>()?;

    Ok(ExpensePage {
        expenses,
        pagination: Pagination { page, limit, total, pages },
    })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::cell_amount;
    use crate::split::{ExactShare, SplitInput};
    use crate::test_support::{conn, seed_trio};

    fn equal_expense(amount: f64) -> NewExpense {
        NewExpense {
            group_id: "g".to_string(),
            description: "Dinner".to_string(),
            amount,
            split: SplitSpec::Equal { participants: vec![] },
        }
    }

    fn table_counts(conn: &Connection) -> (i64, i64) {
        let expenses: i64 = conn
            .query_row("SELECT COUNT(*) FROM expenses", [], |r| r.get(0))
            .unwrap();
        let cells: i64 = conn
            .query_row("SELECT COUNT(*) FROM balances WHERE amount != 0", [], |r| r.get(0))
            .unwrap();
        (expenses, cells)
    }

    #[test]
    fn test_create_equal_expense_updates_ledger() {
        let mut conn = conn();
        seed_trio(&conn);

        let view = create_expense(&mut conn, "a", &equal_expense(30.0)).unwrap();

        assert_eq!(view.description, "Dinner");
        assert_eq!(view.paid_by.id, "a");
        assert_eq!(view.paid_by.name, "a", "payer is expanded to a full user");
        assert_eq!(view.split_type, SplitType::Equal);
        assert_eq!(view.splits.len(), 3);

        assert_eq!(cell_amount(&conn, "g", "b", "a").unwrap(), 10.0);
        assert_eq!(cell_amount(&conn, "g", "c", "a").unwrap(), 10.0);
        assert_eq!(cell_amount(&conn, "g", "a", "b").unwrap(), -10.0);
    }

    #[test]
    fn test_create_expense_gates_group_and_membership() {
        let mut conn = conn();
        seed_trio(&conn);
        crate::test_support::seed_user(&conn, "outsider");

        let mut missing = equal_expense(30.0);
        missing.group_id = "nope".to_string();
        assert_eq!(
            create_expense(&mut conn, "a", &missing).unwrap_err().status_code(),
            404
        );

        let err = create_expense(&mut conn, "outsider", &equal_expense(30.0)).unwrap_err();
        assert_eq!(err.status_code(), 403);
        assert_eq!(err.to_string(), "You are not a member of this group");
    }

    #[test]
    fn test_validation_failure_writes_nothing() {
        let mut conn = conn();
        seed_trio(&conn);

        // EXACT shares a full unit off the total
        let bad = NewExpense {
            group_id: "g".to_string(),
            description: "Oops".to_string(),
            amount: 30.0,
            split: SplitSpec::Exact(vec![
                ExactShare { user_id: "b".into(), amount: 20.0 },
                ExactShare { user_id: "c".into(), amount: 11.0 },
            ]),
        };
        assert_eq!(create_expense(&mut conn, "a", &bad).unwrap_err().status_code(), 400);

        // split user outside the group
        crate::test_support::seed_user(&conn, "outsider");
        let foreign = NewExpense {
            group_id: "g".to_string(),
            description: "Oops".to_string(),
            amount: 30.0,
            split: SplitSpec::Exact(vec![ExactShare {
                user_id: "outsider".into(),
                amount: 30.0,
            }]),
        };
        let err = create_expense(&mut conn, "a", &foreign).unwrap_err();
        assert_eq!(err.to_string(), "All split users must be members of the group");

        assert_eq!(table_counts(&conn), (0, 0), "no partial write may survive validation");
    }

    #[test]
    fn test_failed_scope_leaves_no_partial_state() {
        let mut conn = conn();
        seed_trio(&conn);

        let shares = vec![
            Share { user_id: "b".into(), amount: 15.0, percentage: None },
            Share { user_id: "c".into(), amount: 15.0, percentage: None },
        ];

        // Fail after the expense insert and the ledger mutations: the whole
        // scope must roll back together.
        let result: Result<()> = with_transaction(&mut conn, |tx| {
            insert_expense(
                tx,
                "e1",
                "g",
                "Dinner",
                30.0,
                "a",
                SplitType::Exact,
                "2025-01-01T00:00:00Z",
                &shares,
            )?;
            ledger::apply_expense_debts(tx, "g", "a", &shares)?;
            Err(AppError::validation("simulated late failure"))
        });

        assert!(result.is_err());
        assert_eq!(table_counts(&conn), (0, 0));
        assert_eq!(cell_amount(&conn, "g", "b", "a").unwrap(), 0.0);
    }

    #[test]
    fn test_exact_split_including_payer_skips_self_debt() {
        let mut conn = conn();
        seed_trio(&conn);

        let req = NewExpense {
            group_id: "g".to_string(),
            description: "Groceries".to_string(),
            amount: 30.0,
            split: SplitSpec::Exact(vec![
                ExactShare { user_id: "a".into(), amount: 10.0 },
                ExactShare { user_id: "b".into(), amount: 20.0 },
            ]),
        };
        create_expense(&mut conn, "a", &req).unwrap();

        assert_eq!(cell_amount(&conn, "g", "a", "a").unwrap(), 0.0);
        assert_eq!(cell_amount(&conn, "g", "b", "a").unwrap(), 20.0);
    }

    #[test]
    fn test_percentage_expense_records_percentages() {
        let mut conn = conn();
        seed_trio(&conn);

        let splits = vec![
            SplitInput { user_id: "a".into(), amount: None, percentage: Some(50.0) },
            SplitInput { user_id: "b".into(), amount: None, percentage: Some(50.0) },
        ];
        let req = NewExpense {
            group_id: "g".to_string(),
            description: "Hotel".to_string(),
            amount: 200.0,
            split: SplitSpec::from_request(SplitType::Percentage, &splits).unwrap(),
        };
        let view = create_expense(&mut conn, "a", &req).unwrap();

        assert_eq!(view.splits[0].percentage, Some(50.0));
        assert_eq!(view.splits[0].amount, 100.0);
        assert_eq!(cell_amount(&conn, "g", "b", "a").unwrap(), 100.0);
    }

    #[test]
    fn test_list_expenses_pagination() {
        let mut conn = conn();
        seed_trio(&conn);

        for i in 1..=5 {
            let mut req = equal_expense(30.0);
            req.description = format!("e{}", i);
            create_expense(&mut conn, "a", &req).unwrap();
        }

        let page = list_expenses(&conn, "a", "g", 1, 2).unwrap();
        assert_eq!(page.pagination.total, 5);
        assert_eq!(page.pagination.pages, 3);
        assert_eq!(page.expenses.len(), 2);
        assert_eq!(page.expenses[0].description, "e5", "newest first");

        let last = list_expenses(&conn, "a", "g", 3, 2).unwrap();
        assert_eq!(last.expenses.len(), 1);
        assert_eq!(last.expenses[0].description, "e1");

        let empty = list_expenses(&conn, "a", "g", 9, 2).unwrap();
        assert!(empty.expenses.is_empty());
    }

    #[test]
    fn test_list_expenses_requires_membership() {
        let mut conn = conn();
        seed_trio(&conn);
        crate::test_support::seed_user(&conn, "outsider");
        create_expense(&mut conn, "a", &equal_expense(30.0)).unwrap();

        assert_eq!(
            list_expenses(&conn, "outsider", "g", 1, 20).unwrap_err().status_code(),
            403
        );
    }
}
