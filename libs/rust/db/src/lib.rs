pub mod models;

use sea_orm::{ConnectionTrait, DatabaseConnection, DbErr};

pub const INIT_MIGRATION: &str = include_str!("../migrations/0001_degov_agent.sql");

/// Creates every table the agent needs. Safe to run on each start.
pub async fn migrate(db: &DatabaseConnection) -> Result<(), DbErr> {
    db.execute_unprepared(INIT_MIGRATION).await?;
    Ok(())
}
