pub mod dao;
pub mod schema;

use anyhow::{Context, Result};
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub type DbConnection = Arc<Mutex<Connection>>;

/// 打开注册表数据库并创建表结构
pub fn init_database(db_path: &Path) -> Result<DbConnection> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("无法创建数据库目录 {}", parent.display()))?;
    }

    let conn = Connection::open(db_path)
        .with_context(|| format!("无法打开数据库 {}", db_path.display()))?;
    conn.busy_timeout(Duration::from_secs(5))?;
    schema::create_tables(&conn).context("创建表结构失败")?;

    tracing::debug!("[数据库] 已打开 {}", db_path.display());
    Ok(Arc::new(Mutex::new(conn)))
}

/// 打开内存数据库，用于嵌入式宿主和测试
pub fn init_in_memory() -> Result<DbConnection> {
    let conn = Connection::open_in_memory()?;
    schema::create_tables(&conn)?;
    Ok(Arc::new(Mutex::new(conn)))
}
