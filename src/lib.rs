//! Crewlist server - shared task lists with teammate delegation

pub mod api;
pub mod assignment;
pub mod config;
pub mod error;
pub mod models;
pub mod store;
pub mod team;
pub mod views;

use sqlx::SqlitePool;
use std::sync::Arc;

/// Application state shared across handlers
pub struct AppState {
    pub store: store::Store,
    pub ledger: team::TeamLedger,
    pub membership: team::Membership,
    pub assignments: assignment::AssignmentEngine,
}

impl AppState {
    pub fn new(pool: SqlitePool) -> Arc<Self> {
        Arc::new(Self {
            store: store::Store::new(pool.clone()),
            ledger: team::TeamLedger::new(pool.clone()),
            membership: team::Membership::new(pool.clone()),
            assignments: assignment::AssignmentEngine::new(pool),
        })
    }
}
