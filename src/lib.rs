// Split Ledger - Core Library
// Exposes all modules for use in the CLI, API server, and tests

pub mod auth;
pub mod balances;
pub mod config;
pub mod db;
pub mod error;
pub mod expenses;
pub mod groups;
pub mod ledger;
pub mod split;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used types
pub use auth::{AuthSession, PublicUser};
pub use balances::{
    group_balances, overall_balances, settle_debt,
    BalanceEntry, GroupBalanceOverview, GroupBalances, SettlementReceipt,
};
pub use config::Config;
pub use db::{open, open_in_memory, setup_database, with_transaction};
pub use error::{AppError, Result};
pub use expenses::{
    create_expense, list_expenses,
    ExpensePage, ExpenseView, NewExpense, Pagination, SplitView,
};
pub use groups::{Group, GroupView};
pub use ledger::{apply_debt, apply_expense_debts, cell_amount, get_cell, BalanceCell};
pub use split::{
    calculate_shares, validate_shares,
    ExactShare, PercentageShare, Share, SplitInput, SplitSpec, SplitType,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
