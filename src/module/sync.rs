//! 注册表与模块目录同步
//!
//! 扫描模块目录中带清单的包，按 name 插入或刷新注册表条目，启用状态以激活机制为准。
//! 重复执行不会产生重复条目。目录已消失的条目只报告、不删除。

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::activation::ModuleActivator;
use super::installer::ManifestResolver;
use super::locks::NameLocks;
use super::registry::ModuleRegistry;
use super::types::{ModuleError, NewModuleEntry};
use crate::config::ModuleHostConfig;

/// 同步结果
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncReport {
    /// 新登记的模块
    pub created: Vec<String>,
    /// 已存在并刷新了元数据的模块
    pub updated: Vec<String>,
    /// 清单无效或登记冲突而跳过的目录
    pub skipped: Vec<String>,
    /// 注册表中有、磁盘上已不存在的模块
    pub missing: Vec<String>,
}

pub struct ModuleSynchronizer {
    modules_dir: PathBuf,
    manifest_file: String,
    core_modules: Vec<String>,
    default_namespace: String,
    registry: Arc<dyn ModuleRegistry>,
    activator: Arc<dyn ModuleActivator>,
    locks: Arc<NameLocks>,
}

impl ModuleSynchronizer {
    pub fn new(
        config: &ModuleHostConfig,
        registry: Arc<dyn ModuleRegistry>,
        activator: Arc<dyn ModuleActivator>,
        locks: Arc<NameLocks>,
    ) -> Self {
        Self {
            modules_dir: config.modules_dir.clone(),
            manifest_file: config.manifest_file.clone(),
            core_modules: config.core_modules.clone(),
            default_namespace: config.default_namespace.clone(),
            registry,
            activator,
            locks,
        }
    }

    pub fn sync(&self) -> Result<SyncReport, ModuleError> {
        let mut report = SyncReport::default();

        for dir in self.package_dirs()? {
            self.sync_package(&dir, &mut report)?;
        }

        for entry in self.registry.list()? {
            if !entry.path.is_dir() {
                tracing::warn!(
                    "[SYNC] 模块 {} 的目录不存在: {}",
                    entry.name,
                    entry.path.display()
                );
                report.missing.push(entry.name);
            }
        }

        tracing::info!(
            "[SYNC] 同步完成: 新增 {}, 更新 {}, 跳过 {}, 缺失 {}",
            report.created.len(),
            report.updated.len(),
            report.skipped.len(),
            report.missing.len()
        );
        Ok(report)
    }

    /// 模块目录下的直接子目录，跳过隐藏目录（含安装暂存目录）
    fn package_dirs(&self) -> Result<Vec<PathBuf>, ModuleError> {
        if !self.modules_dir.is_dir() {
            return Ok(Vec::new());
        }

        let entries = fs::read_dir(&self.modules_dir)
            .map_err(|e| ModuleError::filesystem(&self.modules_dir, e))?;
        let mut dirs: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_dir() && !is_hidden(path))
            .collect();
        dirs.sort();
        Ok(dirs)
    }

    fn sync_package(&self, dir: &Path, report: &mut SyncReport) -> Result<(), ModuleError> {
        let dir_name = dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let manifest_path = dir.join(&self.manifest_file);
        if !manifest_path.is_file() {
            tracing::debug!("[SYNC] {} 没有清单，跳过", dir.display());
            report.skipped.push(dir_name);
            return Ok(());
        }

        let manifest = match ManifestResolver::read_manifest(&manifest_path)
            .and_then(|m| ManifestResolver::validate_manifest(&m).map(|_| m))
        {
            Ok(manifest) => manifest,
            Err(e) => {
                tracing::warn!("[SYNC] 跳过 {}: {}", dir.display(), e);
                report.skipped.push(dir_name);
                return Ok(());
            }
        };

        let name = manifest.name.trim().to_string();

        self.locks.with_lock(&name, || {
            // 等锁期间目录可能已被卸载或回滚删除，持锁后重新读取
            let manifest = match ManifestResolver::read_manifest(&manifest_path)
                .and_then(|m| ManifestResolver::validate_manifest(&m).map(|_| m))
            {
                Ok(manifest) if manifest.name.trim().eq_ignore_ascii_case(&name) => manifest,
                _ => {
                    tracing::debug!("[SYNC] {} 在同步期间已变化，跳过", dir.display());
                    report.skipped.push(dir_name);
                    return Ok(());
                }
            };
            let path = match dir.canonicalize() {
                Ok(path) => path,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    report.skipped.push(dir_name);
                    return Ok(());
                }
                Err(e) => return Err(ModuleError::filesystem(dir, e)),
            };

            let existed = self.registry.find_by_name(&name)?.is_some();
            let entry = NewModuleEntry::from_manifest(&manifest, path, &self.default_namespace)
                .with_enabled(self.activator.is_active(&name)?)
                .with_core(self.is_core(&name));

            match self.registry.upsert(&entry) {
                Ok(_) if existed => report.updated.push(name.clone()),
                Ok(_) => report.created.push(name.clone()),
                Err(ModuleError::Conflict(message)) => {
                    tracing::warn!("[SYNC] 跳过 {}: {}", name, message);
                    report.skipped.push(dir_name);
                }
                Err(e) => return Err(e),
            }
            Ok(())
        })
    }

    fn is_core(&self, name: &str) -> bool {
        self.core_modules
            .iter()
            .any(|core| core.eq_ignore_ascii_case(name))
    }
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .map(|n| n.to_string_lossy().starts_with('.'))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::activation::StatusFileActivator;
    use crate::module::registry::SqliteModuleRegistry;
    use tempfile::TempDir;

    struct Fixture {
        _base: TempDir,
        config: ModuleHostConfig,
        registry: Arc<SqliteModuleRegistry>,
        activator: Arc<StatusFileActivator>,
        locks: Arc<NameLocks>,
        synchronizer: Arc<ModuleSynchronizer>,
    }

    fn fixture(core_modules: &[&str]) -> Fixture {
        let base = TempDir::new().unwrap();
        let mut config = ModuleHostConfig::with_base_dir(base.path());
        config.core_modules = core_modules.iter().map(|s| s.to_string()).collect();
        fs::create_dir_all(&config.modules_dir).unwrap();

        let registry = Arc::new(SqliteModuleRegistry::in_memory().unwrap());
        let activator = Arc::new(StatusFileActivator::new(&config.status_file));
        let locks = Arc::new(NameLocks::new());
        let synchronizer = Arc::new(ModuleSynchronizer::new(
            &config,
            registry.clone(),
            activator.clone(),
            locks.clone(),
        ));
        Fixture {
            _base: base,
            config,
            registry,
            activator,
            locks,
            synchronizer,
        }
    }

    fn write_module(config: &ModuleHostConfig, dir: &str, manifest: &str) {
        let root = config.modules_dir.join(dir);
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("module.json"), manifest).unwrap();
    }

    #[test]
    fn test_sync_registers_and_is_idempotent() {
        let f = fixture(&["Core"]);
        write_module(
            &f.config,
            "Core",
            r#"{"name":"Core","alias":"core","description":"core"}"#,
        );
        write_module(
            &f.config,
            "Blog",
            r#"{"name":"Blog","alias":"blog","description":"x","version":"2.0.0"}"#,
        );
        f.activator.activate("Blog").unwrap();

        let report = f.synchronizer.sync().unwrap();
        assert_eq!(report.created, vec!["Blog".to_string(), "Core".to_string()]);
        assert!(report.updated.is_empty());

        let blog = f.registry.find_by_name("Blog").unwrap().unwrap();
        assert!(blog.is_enabled);
        assert_eq!(blog.version, "2.0.0");
        assert!(f.registry.find_by_name("Core").unwrap().unwrap().is_core);

        let report = f.synchronizer.sync().unwrap();
        assert!(report.created.is_empty());
        assert_eq!(report.updated.len(), 2);
        assert_eq!(f.registry.list().unwrap().len(), 2);
    }

    #[test]
    fn test_sync_refreshes_metadata() {
        let f = fixture(&[]);
        write_module(
            &f.config,
            "Blog",
            r#"{"name":"Blog","alias":"blog","description":"old"}"#,
        );
        f.synchronizer.sync().unwrap();

        write_module(
            &f.config,
            "Blog",
            r#"{"name":"Blog","alias":"blog","description":"new","version":"1.1"}"#,
        );
        f.synchronizer.sync().unwrap();

        let blog = f.registry.find_by_name("Blog").unwrap().unwrap();
        assert_eq!(blog.description, "new");
        assert_eq!(blog.version, "1.1");
    }

    #[test]
    fn test_sync_skips_invalid_and_hidden() {
        let f = fixture(&[]);
        write_module(&f.config, "Broken", r#"{"name":"Broken"}"#);
        write_module(
            &f.config,
            ".staging-abc",
            r#"{"name":"Staged","alias":"staged","description":"x"}"#,
        );
        fs::create_dir_all(f.config.modules_dir.join("Empty")).unwrap();

        let report = f.synchronizer.sync().unwrap();
        assert!(report.created.is_empty());
        assert_eq!(report.skipped, vec!["Broken".to_string(), "Empty".to_string()]);
        assert!(f.registry.list().unwrap().is_empty());
    }

    #[test]
    fn test_sync_reports_missing_without_deleting() {
        let f = fixture(&[]);
        write_module(
            &f.config,
            "Blog",
            r#"{"name":"Blog","alias":"blog","description":"x"}"#,
        );
        f.synchronizer.sync().unwrap();
        fs::remove_dir_all(f.config.modules_dir.join("Blog")).unwrap();

        let report = f.synchronizer.sync().unwrap();
        assert_eq!(report.missing, vec!["Blog".to_string()]);
        assert!(f.registry.find_by_name("Blog").unwrap().is_some());
    }

    #[test]
    fn test_sync_does_not_resurrect_module_removed_while_waiting() {
        let f = fixture(&[]);
        write_module(
            &f.config,
            "Blog",
            r#"{"name":"Blog","alias":"blog","description":"x"}"#,
        );
        f.synchronizer.sync().unwrap();

        // 卸载持有同名锁期间同步开始，等锁释放时目录与条目都已删除
        let handle = f.locks.with_lock("Blog", || {
            let synchronizer = f.synchronizer.clone();
            let handle = std::thread::spawn(move || synchronizer.sync());
            std::thread::sleep(std::time::Duration::from_millis(200));
            fs::remove_dir_all(f.config.modules_dir.join("Blog")).unwrap();
            assert!(f.registry.delete("Blog").unwrap());
            handle
        });

        let report = handle.join().unwrap().unwrap();
        assert!(report.created.is_empty());
        assert!(report.updated.is_empty());
        assert!(report.missing.is_empty());
        assert!(f.registry.find_by_name("Blog").unwrap().is_none());
    }

    #[test]
    fn test_sync_without_modules_dir() {
        let f = fixture(&[]);
        fs::remove_dir_all(&f.config.modules_dir).unwrap();
        assert_eq!(f.synchronizer.sync().unwrap(), SyncReport::default());
    }
}
