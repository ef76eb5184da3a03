//! 注册表登记
//!
//! 文件安装成功后唯一让模块被系统"知道"的入口，新条目始终为禁用、非核心

use std::path::PathBuf;
use std::sync::Arc;

use crate::module::registry::ModuleRegistry;
use crate::module::types::{ModuleEntry, ModuleError, ModuleManifest, NewModuleEntry};

pub struct RegistryRecorder {
    registry: Arc<dyn ModuleRegistry>,
    default_namespace: String,
}

impl RegistryRecorder {
    pub fn new(registry: Arc<dyn ModuleRegistry>, default_namespace: impl Into<String>) -> Self {
        Self {
            registry,
            default_namespace: default_namespace.into(),
        }
    }

    pub fn record(
        &self,
        manifest: &ModuleManifest,
        installed_path: PathBuf,
    ) -> Result<ModuleEntry, ModuleError> {
        let entry =
            NewModuleEntry::from_manifest(manifest, installed_path, &self.default_namespace);
        self.registry.create(&entry)
    }
}
