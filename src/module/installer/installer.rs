//! 模块文件安装
//!
//! 先复制到模块目录下的 `.staging-<uuid>`，复制完整后一次 rename 到 `<modules_dir>/<name>`。
//! 复制失败只会留下暂存目录，由守卫删除，不会出现半个模块目录。

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::module::types::ModuleError;

/// 暂存目录前缀，同步扫描时会跳过
pub const STAGING_PREFIX: &str = ".staging-";

pub struct PackageInstaller {
    modules_dir: PathBuf,
}

impl PackageInstaller {
    pub fn new(modules_dir: PathBuf) -> Self {
        Self { modules_dir }
    }

    pub fn modules_dir(&self) -> &Path {
        &self.modules_dir
    }

    /// 将 `package_root` 安装为 `<modules_dir>/<name>`，返回安装目录的绝对路径
    pub fn install(&self, package_root: &Path, name: &str) -> Result<PathBuf, ModuleError> {
        fs::create_dir_all(&self.modules_dir)
            .map_err(|e| ModuleError::filesystem(&self.modules_dir, e))?;
        let modules_dir = self
            .modules_dir
            .canonicalize()
            .map_err(|e| ModuleError::filesystem(&self.modules_dir, e))?;

        let target = modules_dir.join(name);
        if target.exists() {
            return Err(ModuleError::Conflict(format!(
                "A directory named '{}' already exists in the modules directory.",
                name
            )));
        }

        let mut staging = StagingDir::create(&modules_dir)?;
        copy_dir_recursive(package_root, staging.path())?;

        fs::rename(staging.path(), &target).map_err(|e| ModuleError::filesystem(&target, e))?;
        staging.disarm();

        tracing::info!("[INSTALL] 模块文件已安装到 {}", target.display());
        Ok(target)
    }

    /// 删除已安装目录，用于登记失败后的回滚
    pub fn remove(&self, installed_path: &Path) -> Result<(), ModuleError> {
        match fs::remove_dir_all(installed_path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ModuleError::filesystem(installed_path, e)),
        }
    }
}

/// 暂存目录守卫，未 disarm 时 drop 即删除
struct StagingDir {
    path: PathBuf,
    armed: bool,
}

impl StagingDir {
    fn create(modules_dir: &Path) -> Result<Self, ModuleError> {
        let path = modules_dir.join(format!("{}{}", STAGING_PREFIX, Uuid::new_v4().simple()));
        fs::create_dir(&path).map_err(|e| ModuleError::filesystem(&path, e))?;
        Ok(Self { path, armed: true })
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for StagingDir {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Err(e) = fs::remove_dir_all(&self.path) {
            if e.kind() != io::ErrorKind::NotFound {
                tracing::warn!(
                    "[INSTALL] 暂存目录清理失败 {}: {}",
                    self.path.display(),
                    e
                );
            }
        }
    }
}

/// 递归复制目录，符号链接不复制
fn copy_dir_recursive(src: &Path, dst: &Path) -> Result<(), ModuleError> {
    let entries = fs::read_dir(src).map_err(|e| ModuleError::filesystem(src, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| ModuleError::filesystem(src, e))?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());
        let file_type = entry
            .file_type()
            .map_err(|e| ModuleError::filesystem(&src_path, e))?;

        if file_type.is_symlink() {
            tracing::warn!("[INSTALL] 跳过符号链接: {}", src_path.display());
        } else if file_type.is_dir() {
            fs::create_dir_all(&dst_path).map_err(|e| ModuleError::filesystem(&dst_path, e))?;
            copy_dir_recursive(&src_path, &dst_path)?;
        } else {
            // fs::copy 会一并复制权限位
            fs::copy(&src_path, &dst_path).map_err(|e| ModuleError::filesystem(&dst_path, e))?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn make_package(root: &Path) {
        fs::create_dir_all(root.join("app/Http/Controllers")).unwrap();
        fs::create_dir_all(root.join("resources/views")).unwrap();
        fs::write(root.join("module.json"), r#"{"name":"Blog"}"#).unwrap();
        fs::write(root.join("resources/views/index.blade.php"), "<h1>Blog</h1>").unwrap();
    }

    fn entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_install_copies_tree() {
        let source = TempDir::new().unwrap();
        let modules = TempDir::new().unwrap();
        make_package(source.path());

        let installer = PackageInstaller::new(modules.path().to_path_buf());
        let path = installer.install(source.path(), "Blog").unwrap();

        assert!(path.is_absolute());
        assert!(path.join("module.json").is_file());
        assert!(path.join("app/Http/Controllers").is_dir());
        assert_eq!(
            fs::read_to_string(path.join("resources/views/index.blade.php")).unwrap(),
            "<h1>Blog</h1>"
        );
        // 不残留暂存目录
        assert_eq!(entries(modules.path()), vec!["Blog".to_string()]);
    }

    #[test]
    fn test_install_creates_modules_dir() {
        let source = TempDir::new().unwrap();
        let base = TempDir::new().unwrap();
        make_package(source.path());

        let installer = PackageInstaller::new(base.path().join("Modules"));
        installer.install(source.path(), "Blog").unwrap();
        assert!(base.path().join("Modules/Blog").is_dir());
    }

    #[test]
    fn test_existing_target_is_untouched() {
        let source = TempDir::new().unwrap();
        let modules = TempDir::new().unwrap();
        make_package(source.path());
        fs::create_dir(modules.path().join("Blog")).unwrap();
        fs::write(modules.path().join("Blog/keep.txt"), "keep").unwrap();

        let installer = PackageInstaller::new(modules.path().to_path_buf());
        let err = installer.install(source.path(), "Blog").unwrap_err();

        assert!(matches!(err, ModuleError::Conflict(_)));
        assert!(modules.path().join("Blog/keep.txt").exists());
        assert_eq!(entries(modules.path()), vec!["Blog".to_string()]);
    }

    #[test]
    fn test_failed_copy_leaves_no_staging() {
        let modules = TempDir::new().unwrap();
        let installer = PackageInstaller::new(modules.path().to_path_buf());

        let err = installer
            .install(&modules.path().join("does-not-exist"), "Blog")
            .unwrap_err();
        assert!(matches!(err, ModuleError::Filesystem(_)));
        assert!(entries(modules.path()).is_empty());
    }

    #[test]
    fn test_remove_is_tolerant() {
        let source = TempDir::new().unwrap();
        let modules = TempDir::new().unwrap();
        make_package(source.path());

        let installer = PackageInstaller::new(modules.path().to_path_buf());
        let path = installer.install(source.path(), "Blog").unwrap();
        installer.remove(&path).unwrap();
        assert!(!path.exists());
        installer.remove(&path).unwrap();
    }
}
