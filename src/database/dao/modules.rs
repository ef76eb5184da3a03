//! 模块注册表数据访问对象
//!
//! 提供 modules 表的 CRUD 操作。

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::PathBuf;

use crate::module::types::{ModuleEntry, NewModuleEntry};

const SELECT_COLUMNS: &str = "SELECT id, name, alias, description, version, author, author_email,
        providers, requirements, is_enabled, is_core, path, namespace, installed_at
     FROM modules";

/// 数据库行结构
struct ModuleRow {
    id: i64,
    name: String,
    alias: String,
    description: String,
    version: String,
    author: Option<String>,
    author_email: Option<String>,
    providers: String,
    requirements: String,
    is_enabled: i32,
    is_core: i32,
    path: String,
    namespace: String,
    installed_at: String,
}

impl ModuleRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            alias: row.get(2)?,
            description: row.get(3)?,
            version: row.get(4)?,
            author: row.get(5)?,
            author_email: row.get(6)?,
            providers: row.get(7)?,
            requirements: row.get(8)?,
            is_enabled: row.get(9)?,
            is_core: row.get(10)?,
            path: row.get(11)?,
            namespace: row.get(12)?,
            installed_at: row.get(13)?,
        })
    }

    fn into_entry(self) -> Result<ModuleEntry, rusqlite::Error> {
        let providers = decode_list(7, &self.providers)?;
        let requirements = decode_list(8, &self.requirements)?;
        let installed_at = DateTime::parse_from_rfc3339(&self.installed_at)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(13, Type::Text, Box::new(e)))?
            .with_timezone(&Utc);

        Ok(ModuleEntry {
            id: self.id,
            name: self.name,
            alias: self.alias,
            description: self.description,
            version: self.version,
            author: self.author,
            author_email: self.author_email,
            providers,
            requirements,
            is_enabled: self.is_enabled != 0,
            is_core: self.is_core != 0,
            path: PathBuf::from(self.path),
            namespace: self.namespace,
            installed_at,
        })
    }
}

fn encode_list(values: &[String]) -> String {
    serde_json::to_string(values).unwrap_or_else(|_| "[]".to_string())
}

fn decode_list(column: usize, raw: &str) -> Result<Vec<String>, rusqlite::Error> {
    serde_json::from_str(raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(e)))
}

pub struct ModuleDao;

impl ModuleDao {
    /// 插入新模块
    ///
    /// name 或 alias 重复时返回约束冲突错误，不会覆盖已有记录
    pub fn insert(conn: &Connection, entry: &NewModuleEntry) -> Result<i64, rusqlite::Error> {
        conn.execute(
            "INSERT INTO modules
             (name, alias, description, version, author, author_email, providers, requirements,
              is_enabled, is_core, path, namespace, installed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                entry.name,
                entry.alias,
                entry.description,
                entry.version,
                entry.author,
                entry.author_email,
                encode_list(&entry.providers),
                encode_list(&entry.requirements),
                entry.is_enabled as i32,
                entry.is_core as i32,
                entry.path.to_string_lossy().to_string(),
                entry.namespace,
                entry.installed_at.to_rfc3339(),
            ],
        )?;

        Ok(conn.last_insert_rowid())
    }

    /// 按 name 插入或更新，保留原有 installed_at
    pub fn upsert(conn: &Connection, entry: &NewModuleEntry) -> Result<(), rusqlite::Error> {
        conn.execute(
            "INSERT INTO modules
             (name, alias, description, version, author, author_email, providers, requirements,
              is_enabled, is_core, path, namespace, installed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
             ON CONFLICT(name) DO UPDATE SET
                alias = excluded.alias,
                description = excluded.description,
                version = excluded.version,
                author = excluded.author,
                author_email = excluded.author_email,
                providers = excluded.providers,
                requirements = excluded.requirements,
                is_enabled = excluded.is_enabled,
                is_core = excluded.is_core,
                path = excluded.path,
                namespace = excluded.namespace",
            params![
                entry.name,
                entry.alias,
                entry.description,
                entry.version,
                entry.author,
                entry.author_email,
                encode_list(&entry.providers),
                encode_list(&entry.requirements),
                entry.is_enabled as i32,
                entry.is_core as i32,
                entry.path.to_string_lossy().to_string(),
                entry.namespace,
                entry.installed_at.to_rfc3339(),
            ],
        )?;

        Ok(())
    }

    pub fn get_by_name(conn: &Connection, name: &str) -> Result<Option<ModuleEntry>, rusqlite::Error> {
        Self::query_one(conn, "WHERE name = ?1", name)
    }

    pub fn get_by_alias(
        conn: &Connection,
        alias: &str,
    ) -> Result<Option<ModuleEntry>, rusqlite::Error> {
        Self::query_one(conn, "WHERE alias = ?1", alias)
    }

    fn query_one(
        conn: &Connection,
        filter: &str,
        value: &str,
    ) -> Result<Option<ModuleEntry>, rusqlite::Error> {
        let sql = format!("{} {}", SELECT_COLUMNS, filter);
        let row = conn
            .query_row(&sql, params![value], ModuleRow::from_row)
            .optional()?;

        row.map(ModuleRow::into_entry).transpose()
    }

    /// 列出所有模块，按名称排序
    pub fn list(conn: &Connection) -> Result<Vec<ModuleEntry>, rusqlite::Error> {
        let sql = format!("{} ORDER BY name ASC", SELECT_COLUMNS);
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], ModuleRow::from_row)?;

        let mut modules = Vec::new();
        for row in rows {
            modules.push(row?.into_entry()?);
        }
        Ok(modules)
    }

    /// 更新启用状态
    pub fn set_enabled(conn: &Connection, name: &str, enabled: bool) -> Result<bool, rusqlite::Error> {
        let rows_affected = conn.execute(
            "UPDATE modules SET is_enabled = ?1 WHERE name = ?2",
            params![enabled as i32, name],
        )?;

        Ok(rows_affected > 0)
    }

    /// 删除模块记录
    pub fn delete(conn: &Connection, name: &str) -> Result<bool, rusqlite::Error> {
        let rows_affected = conn.execute("DELETE FROM modules WHERE name = ?1", params![name])?;
        Ok(rows_affected > 0)
    }
}
