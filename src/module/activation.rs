//! 模块激活
//!
//! 宿主让模块代码生效/失效的机制以 [`ModuleActivator`] 注入，
//! 默认实现 [`StatusFileActivator`] 维护一个 `{"Blog": true}` 形式的状态文件。
//! 控制器保证激活机制调用完成后才写注册表。

use fs2::FileExt;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::locks::NameLocks;
use super::registry::ModuleRegistry;
use super::types::{ModuleEntry, ModuleError};

/// 宿主激活机制
pub trait ModuleActivator: Send + Sync {
    fn activate(&self, name: &str) -> Result<(), ModuleError>;

    fn deactivate(&self, name: &str) -> Result<(), ModuleError>;

    fn is_active(&self, name: &str) -> Result<bool, ModuleError>;
}

/// 基于 JSON 状态文件的激活机制
pub struct StatusFileActivator {
    path: PathBuf,
    guard: Mutex<()>,
}

impl StatusFileActivator {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            guard: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 读取全部状态，文件不存在时为空
    pub fn statuses(&self) -> Result<BTreeMap<String, bool>, ModuleError> {
        let _guard = self.guard.lock();
        self.read_statuses()
    }

    fn read_statuses(&self) -> Result<BTreeMap<String, bool>, ModuleError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(self.activation_error(e)),
        };
        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&content).map_err(|e| self.activation_error(e))
    }

    /// 在进程内互斥与文件锁下读改写状态文件
    fn update(&self, name: &str, active: bool) -> Result<(), ModuleError> {
        let _guard = self.guard.lock();

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| self.activation_error(e))?;
        }

        let lock_file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(self.sidecar("lock"))
            .map_err(|e| self.activation_error(e))?;
        lock_file
            .lock_exclusive()
            .map_err(|e| self.activation_error(e))?;

        let result = self.read_statuses().and_then(|mut statuses| {
            // 保留文件中已有键的大小写
            let key = statuses
                .keys()
                .find(|k| k.eq_ignore_ascii_case(name))
                .cloned()
                .unwrap_or_else(|| name.to_string());
            statuses.insert(key, active);
            self.write_atomic(&statuses)
        });

        if let Err(e) = lock_file.unlock() {
            tracing::warn!("[MODULE] 释放状态文件锁失败: {}", e);
        }
        result
    }

    fn write_atomic(&self, statuses: &BTreeMap<String, bool>) -> Result<(), ModuleError> {
        let content =
            serde_json::to_string_pretty(statuses).map_err(|e| self.activation_error(e))?;
        let temp_path = self.sidecar(&format!("{}.tmp", std::process::id()));

        let mut temp_file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)
            .map_err(|e| self.activation_error(e))?;
        temp_file
            .write_all(content.as_bytes())
            .map_err(|e| self.activation_error(e))?;
        temp_file.sync_all().map_err(|e| self.activation_error(e))?;

        fs::rename(&temp_path, &self.path).map_err(|e| self.activation_error(e))
    }

    fn sidecar(&self, suffix: &str) -> PathBuf {
        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        self.path.with_file_name(format!(".{}.{}", file_name, suffix))
    }

    fn activation_error(&self, err: impl std::fmt::Display) -> ModuleError {
        ModuleError::Activation(format!("{}: {}", self.path.display(), err))
    }
}

impl ModuleActivator for StatusFileActivator {
    fn activate(&self, name: &str) -> Result<(), ModuleError> {
        self.update(name, true)?;
        tracing::info!("[MODULE] 已激活 {}", name);
        Ok(())
    }

    fn deactivate(&self, name: &str) -> Result<(), ModuleError> {
        self.update(name, false)?;
        tracing::info!("[MODULE] 已停用 {}", name);
        Ok(())
    }

    fn is_active(&self, name: &str) -> Result<bool, ModuleError> {
        Ok(self
            .statuses()?
            .iter()
            .any(|(key, active)| *active && key.eq_ignore_ascii_case(name)))
    }
}

/// 启用/禁用控制器
pub struct ActivationController {
    registry: Arc<dyn ModuleRegistry>,
    activator: Arc<dyn ModuleActivator>,
    locks: Arc<NameLocks>,
}

impl ActivationController {
    pub fn new(
        registry: Arc<dyn ModuleRegistry>,
        activator: Arc<dyn ModuleActivator>,
        locks: Arc<NameLocks>,
    ) -> Self {
        Self {
            registry,
            activator,
            locks,
        }
    }

    pub fn enable(&self, name: &str) -> Result<ModuleEntry, ModuleError> {
        self.locks.with_lock(name, || {
            let entry = self.find(name)?;
            self.activator.activate(&entry.name)?;
            self.persist(entry, true)
        })
    }

    /// 核心模块不能禁用
    pub fn disable(&self, name: &str) -> Result<ModuleEntry, ModuleError> {
        self.locks.with_lock(name, || {
            let entry = self.find(name)?;
            if entry.is_core {
                return Err(ModuleError::State(
                    "Core modules cannot be disabled.".to_string(),
                ));
            }
            self.activator.deactivate(&entry.name)?;
            self.persist(entry, false)
        })
    }

    fn find(&self, name: &str) -> Result<ModuleEntry, ModuleError> {
        self.registry
            .find_by_name(name)?
            .ok_or_else(|| ModuleError::NotFound(name.to_string()))
    }

    fn persist(&self, entry: ModuleEntry, enabled: bool) -> Result<ModuleEntry, ModuleError> {
        let updated = match self.registry.set_enabled(&entry.name, enabled) {
            Ok(true) => Ok(()),
            Ok(false) => Err(ModuleError::NotFound(entry.name.clone())),
            Err(e) => Err(e),
        };

        if let Err(e) = updated {
            // 注册表未变，尽力把激活状态恢复原样
            let revert = if entry.is_enabled {
                self.activator.activate(&entry.name)
            } else {
                self.activator.deactivate(&entry.name)
            };
            if let Err(revert_err) = revert {
                tracing::error!("[MODULE] 恢复 {} 激活状态失败: {}", entry.name, revert_err);
            }
            return Err(e);
        }

        tracing::info!(
            "[MODULE] 模块 {} 已{}",
            entry.name,
            if enabled { "启用" } else { "禁用" }
        );
        Ok(ModuleEntry {
            is_enabled: enabled,
            ..entry
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::registry::SqliteModuleRegistry;
    use crate::module::types::{ModuleManifest, NewModuleEntry};
    use std::sync::atomic::{AtomicBool, Ordering};
    use tempfile::TempDir;

    fn new_entry(name: &str) -> NewModuleEntry {
        let manifest = ModuleManifest {
            name: name.to_string(),
            alias: name.to_lowercase(),
            description: "x".to_string(),
            ..Default::default()
        };
        NewModuleEntry::from_manifest(&manifest, PathBuf::from("/modules").join(name), "Modules")
    }

    /// 可切换为失败的激活机制
    #[derive(Default)]
    struct FlakyActivator {
        fail: AtomicBool,
        active: Mutex<BTreeMap<String, bool>>,
    }

    impl ModuleActivator for FlakyActivator {
        fn activate(&self, name: &str) -> Result<(), ModuleError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(ModuleError::Activation("host refused".to_string()));
            }
            self.active.lock().insert(name.to_string(), true);
            Ok(())
        }

        fn deactivate(&self, name: &str) -> Result<(), ModuleError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(ModuleError::Activation("host refused".to_string()));
            }
            self.active.lock().insert(name.to_string(), false);
            Ok(())
        }

        fn is_active(&self, name: &str) -> Result<bool, ModuleError> {
            Ok(self.active.lock().get(name).copied().unwrap_or(false))
        }
    }

    fn controller(
        activator: Arc<dyn ModuleActivator>,
    ) -> (ActivationController, Arc<SqliteModuleRegistry>) {
        let registry = Arc::new(SqliteModuleRegistry::in_memory().unwrap());
        let controller =
            ActivationController::new(registry.clone(), activator, Arc::new(NameLocks::new()));
        (controller, registry)
    }

    #[test]
    fn test_enable_then_disable() {
        let activator = Arc::new(FlakyActivator::default());
        let (controller, registry) = controller(activator.clone());
        registry.create(&new_entry("Blog")).unwrap();

        let entry = controller.enable("Blog").unwrap();
        assert!(entry.is_enabled);
        assert!(registry.find_by_name("Blog").unwrap().unwrap().is_enabled);
        assert!(activator.is_active("Blog").unwrap());

        let entry = controller.disable("blog").unwrap();
        assert!(!entry.is_enabled);
        assert!(!registry.find_by_name("Blog").unwrap().unwrap().is_enabled);
        assert!(!activator.is_active("Blog").unwrap());
    }

    #[test]
    fn test_disable_core_module_is_state_error() {
        let (controller, registry) = controller(Arc::new(FlakyActivator::default()));
        registry
            .create(&new_entry("Core").with_core(true).with_enabled(true))
            .unwrap();

        let err = controller.disable("Core").unwrap_err();
        assert!(matches!(err, ModuleError::State(_)));
        assert_eq!(err.to_string(), "Core modules cannot be disabled.");
        assert!(registry.find_by_name("Core").unwrap().unwrap().is_enabled);
    }

    #[test]
    fn test_activation_failure_leaves_registry_unchanged() {
        let activator = Arc::new(FlakyActivator::default());
        activator.fail.store(true, Ordering::SeqCst);
        let (controller, registry) = controller(activator);
        registry.create(&new_entry("Blog")).unwrap();

        let err = controller.enable("Blog").unwrap_err();
        assert!(matches!(err, ModuleError::Activation(_)));
        assert!(!registry.find_by_name("Blog").unwrap().unwrap().is_enabled);
    }

    #[test]
    fn test_unknown_module_is_not_found() {
        let (controller, _registry) = controller(Arc::new(FlakyActivator::default()));
        let err = controller.enable("Ghost").unwrap_err();
        assert_eq!(err.to_string(), "Module 'Ghost' not found.");
    }

    #[test]
    fn test_status_file_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state").join("modules_statuses.json");
        let activator = StatusFileActivator::new(&path);

        assert!(!activator.is_active("Blog").unwrap());
        activator.activate("Blog").unwrap();
        activator.activate("Shop").unwrap();
        activator.deactivate("shop").unwrap();

        assert!(activator.is_active("blog").unwrap());
        assert!(!activator.is_active("Shop").unwrap());

        let on_disk: BTreeMap<String, bool> =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(on_disk.get("Blog"), Some(&true));
        assert_eq!(on_disk.get("Shop"), Some(&false));
        assert_eq!(on_disk.len(), 2);
    }

    #[test]
    fn test_status_file_corrupt_is_activation_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("modules_statuses.json");
        fs::write(&path, "{ not json").unwrap();

        let activator = StatusFileActivator::new(&path);
        let err = activator.activate("Blog").unwrap_err();
        assert!(matches!(err, ModuleError::Activation(_)));
        assert_eq!(fs::read_to_string(&path).unwrap(), "{ not json");
    }
}
