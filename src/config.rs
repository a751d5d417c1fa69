//! Server configuration

use clap::Parser;

/// Crewlist server configuration, from flags or environment
#[derive(Parser, Debug, Clone)]
#[command(
    name = "crewlist",
    about = "Crewlist server - shared task lists with teammate delegation"
)]
pub struct Config {
    /// SQLite database URL
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite:crewlist.db")]
    pub database_url: String,

    /// Address to bind the HTTP listener on
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:3000")]
    pub bind_addr: String,

    /// Maximum connections in the database pool
    #[arg(long, env = "DB_MAX_CONNECTIONS", default_value_t = 5)]
    pub max_connections: u32,
}
