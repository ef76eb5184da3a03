//! 安装工作区
//!
//! 每次安装尝试独占一个唯一命名的临时目录，离开作用域时必定删除

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::module::types::ModuleError;

pub struct Workspace {
    root: PathBuf,
    disposed: bool,
}

impl Workspace {
    /// 在 `scratch_root` 下创建新的工作区目录，根目录不存在时自动创建
    pub fn create(scratch_root: &Path) -> Result<Self, ModuleError> {
        fs::create_dir_all(scratch_root).map_err(|e| ModuleError::filesystem(scratch_root, e))?;

        let root = scratch_root.join(format!("module-{}", Uuid::new_v4().simple()));
        // create_dir 而非 create_dir_all：目录已存在时报错，不与其他尝试共用
        fs::create_dir(&root).map_err(|e| ModuleError::filesystem(&root, e))?;

        tracing::debug!("[INSTALL] 创建工作区 {}", root.display());
        Ok(Self {
            root,
            disposed: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// 递归删除工作区，可重复调用
    pub fn dispose(&mut self) -> Result<(), ModuleError> {
        if self.disposed {
            return Ok(());
        }

        match fs::remove_dir_all(&self.root) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(ModuleError::filesystem(&self.root, e)),
        }

        self.disposed = true;
        tracing::debug!("[INSTALL] 已清理工作区 {}", self.root.display());
        Ok(())
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if let Err(e) = self.dispose() {
            tracing::warn!("[INSTALL] 工作区清理失败: {}", e);
        }
    }
}
