//! 配置管理模块
//!
//! 从 YAML 文件加载模块宿主配置，所有字段都有默认值

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::module::installer::{MAX_EXTRACTED_BYTES, MAX_UPLOAD_BYTES};
use crate::module::types::DEFAULT_NAMESPACE;

/// 清单文件名
pub const MANIFEST_FILE: &str = "module.json";

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 未设置 RUST_LOG 时使用的过滤级别
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// 模块宿主配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleHostConfig {
    /// 已安装模块所在目录
    pub modules_dir: PathBuf,
    /// 安装时解压用的临时目录根
    pub scratch_dir: PathBuf,
    /// 注册表数据库文件
    pub database_path: PathBuf,
    /// 激活状态文件
    pub status_file: PathBuf,
    pub manifest_file: String,
    /// 包根目录下必须存在的目录（相对路径）
    pub required_dirs: Vec<String>,
    /// 随宿主发布的核心模块名称
    pub core_modules: Vec<String>,
    pub default_namespace: String,
    pub max_upload_bytes: u64,
    /// 解压后总大小上限
    pub max_extracted_bytes: u64,
    pub logging: LoggingConfig,
}

impl Default for ModuleHostConfig {
    fn default() -> Self {
        let base = Self::default_base_dir();
        Self {
            modules_dir: base.join("modules"),
            scratch_dir: base.join("tmp"),
            database_path: base.join("module-host.db"),
            status_file: base.join("modules_statuses.json"),
            manifest_file: MANIFEST_FILE.to_string(),
            required_dirs: vec![
                "app/Http/Controllers".to_string(),
                "resources/views".to_string(),
            ],
            core_modules: Vec::new(),
            default_namespace: DEFAULT_NAMESPACE.to_string(),
            max_upload_bytes: MAX_UPLOAD_BYTES,
            max_extracted_bytes: MAX_EXTRACTED_BYTES,
            logging: LoggingConfig::default(),
        }
    }
}

impl ModuleHostConfig {
    /// 默认数据目录: <data_dir>/module-host
    pub fn default_base_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("module-host")
    }

    /// 以指定目录为根构建配置
    pub fn with_base_dir(base: &Path) -> Self {
        Self {
            modules_dir: base.join("modules"),
            scratch_dir: base.join("tmp"),
            database_path: base.join("module-host.db"),
            status_file: base.join("modules_statuses.json"),
            ..Self::default()
        }
    }

    /// 从 YAML 文件加载配置，文件不存在时返回默认配置
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::info!("[CONFIG] 配置文件不存在，使用默认配置: {}", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("无法读取配置文件 {}", path.display()))?;
        let config: Self = serde_yaml::from_str(&content)
            .with_context(|| format!("配置文件格式错误 {}", path.display()))?;
        Ok(config)
    }

    pub fn is_core_module(&self, name: &str) -> bool {
        self.core_modules
            .iter()
            .any(|core| core.eq_ignore_ascii_case(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = ModuleHostConfig::default();
        assert_eq!(config.max_upload_bytes, 52_428_800);
        assert_eq!(config.manifest_file, "module.json");
        assert_eq!(config.default_namespace, "Modules");
        assert_eq!(config.required_dirs.len(), 2);
    }

    #[test]
    fn test_load_missing_file_returns_defaults() {
        let dir = TempDir::new().unwrap();
        let config = ModuleHostConfig::load(&dir.path().join("missing.yaml")).unwrap();
        assert_eq!(config.max_upload_bytes, MAX_UPLOAD_BYTES);
    }

    #[test]
    fn test_load_partial_yaml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "modules_dir: /srv/app/Modules\ncore_modules:\n  - Core\nlogging:\n  level: debug\n",
        )
        .unwrap();

        let config = ModuleHostConfig::load(&path).unwrap();
        assert_eq!(config.modules_dir, PathBuf::from("/srv/app/Modules"));
        assert!(config.is_core_module("core"));
        assert!(!config.is_core_module("Blog"));
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.manifest_file, MANIFEST_FILE);
    }

    #[test]
    fn test_load_invalid_yaml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "max_upload_bytes: [not, a, number]\n").unwrap();
        assert!(ModuleHostConfig::load(&path).is_err());
    }
}
