//! 模块管理器
//!
//! 组装安装协调器、激活控制器、卸载器与同步器，所有组件共享同一组名称锁。
//! 对外的生命周期操作都返回可直接展示的结果。

use anyhow::{Context, Result};
use std::sync::Arc;

use super::activation::{ActivationController, ModuleActivator, StatusFileActivator};
use super::installer::{InstallCoordinator, UploadedArchive};
use super::locks::NameLocks;
use super::registry::{ModuleRegistry, SqliteModuleRegistry};
use super::sync::{ModuleSynchronizer, SyncReport};
use super::types::{
    InstallResult, ModuleEntry, ModuleError, OperationResult, ProgressCallback,
};
use super::uninstaller::Uninstaller;
use crate::config::ModuleHostConfig;

pub struct ModuleManager {
    config: ModuleHostConfig,
    registry: Arc<dyn ModuleRegistry>,
    coordinator: InstallCoordinator,
    activation: ActivationController,
    uninstaller: Uninstaller,
    synchronizer: ModuleSynchronizer,
}

impl ModuleManager {
    pub fn new(
        config: ModuleHostConfig,
        registry: Arc<dyn ModuleRegistry>,
        activator: Arc<dyn ModuleActivator>,
    ) -> Self {
        let locks = Arc::new(NameLocks::new());
        Self {
            coordinator: InstallCoordinator::new(&config, registry.clone(), locks.clone()),
            activation: ActivationController::new(
                registry.clone(),
                activator.clone(),
                locks.clone(),
            ),
            uninstaller: Uninstaller::new(
                config.modules_dir.clone(),
                registry.clone(),
                locks.clone(),
            ),
            synchronizer: ModuleSynchronizer::new(&config, registry.clone(), activator, locks),
            registry,
            config,
        }
    }

    /// 按配置打开 SQLite 注册表与状态文件激活机制
    pub fn from_config(config: ModuleHostConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.modules_dir).with_context(|| {
            format!("无法创建模块目录 {}", config.modules_dir.display())
        })?;
        let registry = SqliteModuleRegistry::from_path(&config.database_path)
            .with_context(|| format!("无法打开注册表 {}", config.database_path.display()))?;
        let activator = StatusFileActivator::new(config.status_file.clone());

        tracing::info!(
            "[MODULE] 模块管理器已初始化: {}",
            config.modules_dir.display()
        );
        Ok(Self::new(config, Arc::new(registry), Arc::new(activator)))
    }

    pub fn config(&self) -> &ModuleHostConfig {
        &self.config
    }

    pub fn install(
        &self,
        upload: &UploadedArchive,
        progress: &dyn ProgressCallback,
    ) -> InstallResult {
        self.coordinator.install(upload, progress)
    }

    pub fn enable(&self, name: &str) -> OperationResult {
        let result = self.activation.enable(name);
        log_failure("启用", name, &result);
        OperationResult::from_result(result, |entry| {
            format!("Module '{}' enabled successfully.", entry.name)
        })
    }

    pub fn disable(&self, name: &str) -> OperationResult {
        let result = self.activation.disable(name);
        log_failure("禁用", name, &result);
        OperationResult::from_result(result, |entry| {
            format!("Module '{}' disabled successfully.", entry.name)
        })
    }

    pub fn uninstall(&self, name: &str) -> OperationResult {
        let result = self.uninstaller.uninstall(name);
        log_failure("卸载", name, &result);
        OperationResult::from_result(result, |entry| {
            format!("Module '{}' uninstalled successfully.", entry.name)
        })
    }

    /// 全部条目，按名称排序
    pub fn list(&self) -> Result<Vec<ModuleEntry>, ModuleError> {
        self.registry.list()
    }

    pub fn get(&self, name: &str) -> Result<ModuleEntry, ModuleError> {
        self.registry
            .find_by_name(name)?
            .ok_or_else(|| ModuleError::NotFound(name.to_string()))
    }

    pub fn find_by_alias(&self, alias: &str) -> Result<Option<ModuleEntry>, ModuleError> {
        self.registry.find_by_alias(alias)
    }

    pub fn sync(&self) -> Result<SyncReport, ModuleError> {
        self.synchronizer.sync()
    }
}

fn log_failure(action: &str, name: &str, result: &Result<ModuleEntry, ModuleError>) {
    if let Err(e) = result {
        tracing::warn!("[MODULE] {}模块 {} 失败: {}", action, name, e);
    }
}
