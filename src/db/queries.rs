use rusqlite::{params, Connection, OptionalExtension};

// ── Staff colors ──

pub fn get_staff_color(conn: &Connection, staff_id: &str) -> rusqlite::Result<Option<String>> {
    conn.query_row(
        "SELECT color FROM staff_colors WHERE staff_id = ?1",
        [staff_id],
        |row| row.get(0),
    )
    .optional()
}

pub fn list_staff_colors(conn: &Connection) -> rusqlite::Result<Vec<(String, String)>> {
    let mut stmt =
        conn.prepare("SELECT staff_id, color FROM staff_colors ORDER BY assigned_at, rowid")?;
    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
    rows.collect()
}

pub fn insert_staff_color(conn: &Connection, staff_id: &str, color: &str) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO staff_colors (staff_id, color) VALUES (?1, ?2)",
        params![staff_id, color],
    )?;
    Ok(())
}

pub fn clear_staff_colors(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute("DELETE FROM staff_colors", [])?;
    Ok(())
}

// ── Preferences ──

pub fn get_preference(conn: &Connection, key: &str) -> rusqlite::Result<Option<String>> {
    conn.query_row(
        "SELECT value FROM preferences WHERE key = ?1",
        [key],
        |row| row.get(0),
    )
    .optional()
}

pub fn set_preference(conn: &Connection, key: &str, value: &str) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO preferences (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![key, value],
    )?;
    Ok(())
}

pub fn delete_preference(conn: &Connection, key: &str) -> rusqlite::Result<()> {
    conn.execute("DELETE FROM preferences WHERE key = ?1", [key])?;
    Ok(())
}
