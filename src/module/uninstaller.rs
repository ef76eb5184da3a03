//! 模块卸载
//!
//! 只允许卸载已禁用的非核心模块。先删目录再删注册表条目，目录删除失败时保留条目。

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::locks::NameLocks;
use super::registry::ModuleRegistry;
use super::types::{ModuleEntry, ModuleError};

pub struct Uninstaller {
    modules_dir: PathBuf,
    registry: Arc<dyn ModuleRegistry>,
    locks: Arc<NameLocks>,
}

impl Uninstaller {
    pub fn new(
        modules_dir: PathBuf,
        registry: Arc<dyn ModuleRegistry>,
        locks: Arc<NameLocks>,
    ) -> Self {
        Self {
            modules_dir,
            registry,
            locks,
        }
    }

    /// 卸载模块，返回被删除的条目
    pub fn uninstall(&self, name: &str) -> Result<ModuleEntry, ModuleError> {
        self.locks.with_lock(name, || {
            let entry = self
                .registry
                .find_by_name(name)?
                .ok_or_else(|| ModuleError::NotFound(name.to_string()))?;

            if entry.is_core {
                return Err(ModuleError::State(
                    "Core modules cannot be uninstalled.".to_string(),
                ));
            }
            if entry.is_enabled {
                return Err(ModuleError::State(
                    "Module must be disabled before uninstalling.".to_string(),
                ));
            }

            self.remove_files(&entry.path)?;
            self.registry.delete(&entry.name)?;

            tracing::info!("[MODULE] 模块 {} 已卸载", entry.name);
            Ok(entry)
        })
    }

    fn remove_files(&self, path: &Path) -> Result<(), ModuleError> {
        if !path.exists() {
            tracing::warn!("[MODULE] 模块目录已不存在: {}", path.display());
            return Ok(());
        }

        self.ensure_inside_modules_dir(path)?;

        match fs::remove_dir_all(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ModuleError::filesystem(path, e)),
        }
    }

    /// 拒绝删除模块目录之外的路径
    fn ensure_inside_modules_dir(&self, path: &Path) -> Result<(), ModuleError> {
        let modules_dir = self
            .modules_dir
            .canonicalize()
            .map_err(|e| ModuleError::filesystem(&self.modules_dir, e))?;
        let target = path
            .canonicalize()
            .map_err(|e| ModuleError::filesystem(path, e))?;

        if target == modules_dir || !target.starts_with(&modules_dir) {
            return Err(ModuleError::Filesystem(format!(
                "{} is outside the modules directory and will not be removed.",
                path.display()
            )));
        }
        Ok(())
    }
}
