use anyhow::Result;
use std::env;
use std::path::Path;

use split_ledger::{db, Config};

fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let args: Vec<String> = env::args().collect();

    match args.get(1).map(String::as_str) {
        Some("init") => run_init()?,
        Some("stats") => run_stats()?,
        _ => print_usage(),
    }

    Ok(())
}

fn run_init() -> Result<()> {
    println!("🗄️  Split Ledger - Database Init");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let config = Config::from_env();
    let db_path = Path::new(&config.database_path);

    let conn = db::open(db_path)?;
    db::setup_database(&conn)?;

    println!("✓ Database initialized at {:?} (WAL mode)", db_path);
    println!("\nNext: cargo run --bin split-server --features server");

    Ok(())
}

fn run_stats() -> Result<()> {
    let config = Config::from_env();
    let db_path = Path::new(&config.database_path);

    if !db_path.exists() {
        eprintln!("❌ Database not found at {:?}", db_path);
        eprintln!("   Run: cargo run init");
        std::process::exit(1);
    }

    let conn = db::open(db_path)?;

    let count = |table: &str| -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM {}", table);
        Ok(conn.query_row(&sql, [], |row| row.get(0))?)
    };

    println!("📊 Split Ledger - Stats");
    println!("━━━━━━━━━━━━━━━━━━━━━━━");
    println!("  users:     {}", count("users")?);
    println!("  groups:    {}", count("\"groups\"")?);
    println!("  expenses:  {}", count("expenses")?);
    println!("  ledger cells: {}", count("balances")?);

    Ok(())
}

fn print_usage() {
    println!("Split Ledger v{}", split_ledger::VERSION);
    println!();
    println!("Usage:");
    println!("  split-ledger init     Create the database schema");
    println!("  split-ledger stats    Show row counts");
    println!();
    println!("Server:");
    println!("  cargo run --bin split-server --features server");
}
