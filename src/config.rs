// Environment-driven configuration
// Call dotenv::dotenv() in the binary before Config::from_env() so a local
// .env file can supply these in development.

use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite database file path
    pub database_path: String,

    /// Address the HTTP server binds to
    pub bind_addr: String,

    /// HMAC secret for signing JWTs
    pub jwt_secret: String,

    /// Token lifetime in hours
    pub token_ttl_hours: i64,
}

impl Config {
    pub fn from_env() -> Self {
        Config {
            database_path: env::var("SPLIT_LEDGER_DB")
                .unwrap_or_else(|_| "split-ledger.db".to_string()),
            bind_addr: env::var("SPLIT_LEDGER_ADDR")
                .unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
            jwt_secret: env::var("SPLIT_LEDGER_JWT_SECRET")
                .unwrap_or_else(|_| "dev-secret-change-me".to_string()),
            token_ttl_hours: env::var("SPLIT_LEDGER_TOKEN_TTL_HOURS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(24 * 7),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}
