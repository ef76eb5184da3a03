//! 安装前冲突检查
//!
//! 注册表与磁盘任一处已有同名模块即视为冲突。检查与安装之间的竞争由调用方持有名称锁解决，
//! 存储层的唯一约束兜底。

use std::path::PathBuf;
use std::sync::Arc;

use crate::module::registry::ModuleRegistry;
use crate::module::types::{ModuleError, ModuleManifest};

pub struct ConflictChecker {
    modules_dir: PathBuf,
    registry: Arc<dyn ModuleRegistry>,
}

impl ConflictChecker {
    pub fn new(modules_dir: PathBuf, registry: Arc<dyn ModuleRegistry>) -> Self {
        Self {
            modules_dir,
            registry,
        }
    }

    pub fn check(&self, manifest: &ModuleManifest) -> Result<(), ModuleError> {
        let name = manifest.name.trim();
        let alias = manifest.alias.trim();

        if self.registry.find_by_name(name)?.is_some() {
            return Err(ModuleError::already_installed(name));
        }

        if self.modules_dir.join(name).exists() {
            return Err(ModuleError::Conflict(format!(
                "A directory named '{}' already exists in the modules directory.",
                name
            )));
        }

        if let Some(existing) = self.registry.find_by_alias(alias)? {
            return Err(ModuleError::Conflict(format!(
                "Module alias '{}' is already in use by '{}'.",
                alias, existing.name
            )));
        }

        Ok(())
    }
}
