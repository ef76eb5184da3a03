use rusqlite::Connection;

/// 创建注册表所需的表
///
/// name 与 alias 由存储层保证唯一（大小写不敏感）
pub fn create_tables(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS modules (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL COLLATE NOCASE UNIQUE,
            alias TEXT NOT NULL COLLATE NOCASE UNIQUE,
            description TEXT NOT NULL DEFAULT '',
            version TEXT NOT NULL DEFAULT '1.0.0',
            author TEXT,
            author_email TEXT,
            providers TEXT NOT NULL DEFAULT '[]',
            requirements TEXT NOT NULL DEFAULT '[]',
            is_enabled INTEGER NOT NULL DEFAULT 0,
            is_core INTEGER NOT NULL DEFAULT 0,
            path TEXT NOT NULL,
            namespace TEXT NOT NULL DEFAULT 'Modules',
            installed_at TEXT NOT NULL
        );",
    )?;
    Ok(())
}
