pub mod migrations;
pub mod queries;

use anyhow::Context;
use rusqlite::Connection;

pub fn init_store(path: &str) -> anyhow::Result<Connection> {
    let conn = Connection::open(path).context("failed to open local store")?;

    conn.execute_batch("PRAGMA journal_mode=WAL;")
        .context("failed to set local store pragmas")?;

    migrations::run_migrations(&conn)?;

    Ok(conn)
}
