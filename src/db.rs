use rusqlite::Connection;
use std::path::Path;

pub const DB_FILE_NAME: &str = "trackit.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;

    // Two top-level collections. Each row holds one JSON document; all reads
    // and writes go through the primitives in `store`.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS users(
            id TEXT PRIMARY KEY,
            doc TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS classes(
            id TEXT PRIMARY KEY,
            doc TEXT NOT NULL
        )",
        [],
    )?;

    // Registration looks users up by email before every insert.
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_users_email ON users(json_extract(doc, '$.email'))",
        [],
    )?;

    Ok(conn)
}
