//! 模块注册表
//!
//! 注册表以 trait 注入，默认实现基于 SQLite。
//! 唯一性由存储层保证：插入重复的 name/alias 会失败并转为冲突错误。

use rusqlite::{Connection, ErrorCode};
use std::path::Path;
use std::sync::MutexGuard;

use super::types::{ModuleEntry, ModuleError, NewModuleEntry};
use crate::database::dao::ModuleDao;
use crate::database::{self, DbConnection};

/// 注册表抽象
pub trait ModuleRegistry: Send + Sync {
    /// 新建条目，name 或 alias 已存在时返回 `ModuleError::Conflict`
    fn create(&self, entry: &NewModuleEntry) -> Result<ModuleEntry, ModuleError>;

    /// 按 name 插入或更新（同步使用），不会产生重复条目
    fn upsert(&self, entry: &NewModuleEntry) -> Result<ModuleEntry, ModuleError>;

    fn find_by_name(&self, name: &str) -> Result<Option<ModuleEntry>, ModuleError>;

    fn find_by_alias(&self, alias: &str) -> Result<Option<ModuleEntry>, ModuleError>;

    fn list(&self) -> Result<Vec<ModuleEntry>, ModuleError>;

    /// 返回是否有条目被更新
    fn set_enabled(&self, name: &str, enabled: bool) -> Result<bool, ModuleError>;

    /// 返回是否有条目被删除
    fn delete(&self, name: &str) -> Result<bool, ModuleError>;
}

/// SQLite 注册表实现
pub struct SqliteModuleRegistry {
    conn: DbConnection,
}

impl SqliteModuleRegistry {
    pub fn new(conn: DbConnection) -> Self {
        Self { conn }
    }

    /// 打开数据库文件并创建表结构
    pub fn from_path(db_path: &Path) -> Result<Self, ModuleError> {
        let conn = database::init_database(db_path)
            .map_err(|e| ModuleError::Registry(format!("{:#}", e)))?;
        Ok(Self::new(conn))
    }

    pub fn in_memory() -> Result<Self, ModuleError> {
        let conn = database::init_in_memory()
            .map_err(|e| ModuleError::Registry(format!("{:#}", e)))?;
        Ok(Self::new(conn))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, ModuleError> {
        self.conn
            .lock()
            .map_err(|e| ModuleError::Registry(format!("数据库锁已损坏: {}", e)))
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, rusqlite::Error>,
    ) -> Result<T, ModuleError> {
        let conn = self.lock()?;
        f(&conn).map_err(|e| ModuleError::Registry(e.to_string()))
    }

    fn map_insert_error(entry: &NewModuleEntry, err: rusqlite::Error) -> ModuleError {
        match &err {
            rusqlite::Error::SqliteFailure(e, message)
                if e.code == ErrorCode::ConstraintViolation =>
            {
                let detail = message.as_deref().unwrap_or_default();
                if detail.contains("modules.alias") {
                    ModuleError::Conflict(format!(
                        "Module alias '{}' is already in use.",
                        entry.alias
                    ))
                } else {
                    ModuleError::already_installed(&entry.name)
                }
            }
            _ => ModuleError::Registry(err.to_string()),
        }
    }

    fn reload(&self, name: &str) -> Result<ModuleEntry, ModuleError> {
        self.find_by_name(name)?
            .ok_or_else(|| ModuleError::Registry(format!("写入后无法读取模块 {}", name)))
    }
}

impl ModuleRegistry for SqliteModuleRegistry {
    fn create(&self, entry: &NewModuleEntry) -> Result<ModuleEntry, ModuleError> {
        {
            let conn = self.lock()?;
            ModuleDao::insert(&conn, entry).map_err(|e| Self::map_insert_error(entry, e))?;
        }
        tracing::info!("[REGISTRY] 已登记模块 {}", entry.name);
        self.reload(&entry.name)
    }

    fn upsert(&self, entry: &NewModuleEntry) -> Result<ModuleEntry, ModuleError> {
        {
            let conn = self.lock()?;
            ModuleDao::upsert(&conn, entry).map_err(|e| Self::map_insert_error(entry, e))?;
        }
        self.reload(&entry.name)
    }

    fn find_by_name(&self, name: &str) -> Result<Option<ModuleEntry>, ModuleError> {
        self.with_conn(|conn| ModuleDao::get_by_name(conn, name))
    }

    fn find_by_alias(&self, alias: &str) -> Result<Option<ModuleEntry>, ModuleError> {
        self.with_conn(|conn| ModuleDao::get_by_alias(conn, alias))
    }

    fn list(&self) -> Result<Vec<ModuleEntry>, ModuleError> {
        self.with_conn(ModuleDao::list)
    }

    fn set_enabled(&self, name: &str, enabled: bool) -> Result<bool, ModuleError> {
        self.with_conn(|conn| ModuleDao::set_enabled(conn, name, enabled))
    }

    fn delete(&self, name: &str) -> Result<bool, ModuleError> {
        let deleted = self.with_conn(|conn| ModuleDao::delete(conn, name))?;
        if deleted {
            tracing::info!("[REGISTRY] 已注销模块 {}", name);
        }
        Ok(deleted)
    }
}
