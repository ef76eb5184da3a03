//! 模块系统类型定义
//!
//! 定义错误类型、安装阶段、进度回调、清单以及注册表条目

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// 清单未声明版本时使用的默认版本
pub const DEFAULT_VERSION: &str = "1.0.0";

/// 清单未声明命名空间时使用的默认命名空间
pub const DEFAULT_NAMESPACE: &str = "Modules";

/// 模块错误类型
///
/// Display 输出即为可直接展示给管理员的消息
#[derive(Error, Debug)]
pub enum ModuleError {
    /// 上传文件类型或大小不合法
    #[error("{0}")]
    Upload(String),

    /// 压缩包无法打开或已损坏
    #[error("Failed to extract module archive: {0}")]
    Extraction(String),

    /// 清单缺失、无法解析或缺少必需字段
    #[error("{0}")]
    Manifest(String),

    /// 包内缺少必需目录
    #[error("{0}")]
    Structure(String),

    /// 名称或别名已被占用
    #[error("{0}")]
    Conflict(String),

    /// 复制或删除文件失败
    #[error("Filesystem error: {0}")]
    Filesystem(String),

    /// 非法的生命周期状态转换
    #[error("{0}")]
    State(String),

    /// 宿主激活机制失败
    #[error("Module activation failed: {0}")]
    Activation(String),

    /// 注册表中不存在该模块
    #[error("Module '{0}' not found.")]
    NotFound(String),

    /// 注册表存储失败
    #[error("Module registry error: {0}")]
    Registry(String),
}

impl ModuleError {
    /// 构造带路径上下文的文件系统错误
    pub fn filesystem(path: &Path, err: impl fmt::Display) -> Self {
        ModuleError::Filesystem(format!("{}: {}", path.display(), err))
    }

    pub fn already_installed(name: &str) -> Self {
        ModuleError::Conflict(format!("Module '{}' is already installed.", name))
    }

    pub fn kind(&self) -> ModuleErrorKind {
        match self {
            ModuleError::Upload(_) => ModuleErrorKind::Upload,
            ModuleError::Extraction(_) => ModuleErrorKind::Extraction,
            ModuleError::Manifest(_) => ModuleErrorKind::Manifest,
            ModuleError::Structure(_) => ModuleErrorKind::Structure,
            ModuleError::Conflict(_) => ModuleErrorKind::Conflict,
            ModuleError::Filesystem(_) => ModuleErrorKind::Filesystem,
            ModuleError::State(_) => ModuleErrorKind::State,
            ModuleError::Activation(_) => ModuleErrorKind::Activation,
            ModuleError::NotFound(_) => ModuleErrorKind::NotFound,
            ModuleError::Registry(_) => ModuleErrorKind::Registry,
        }
    }
}

/// 错误分类，随操作结果一起返回给调用方
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleErrorKind {
    Upload,
    Extraction,
    Manifest,
    Structure,
    Conflict,
    Filesystem,
    State,
    Activation,
    NotFound,
    Registry,
}

/// 安装阶段
///
/// 安装流程按顺序经过以下状态，任何一步失败都直接进入 `Failed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallStage {
    /// 已接收上传
    Received,
    /// 校验上传文件
    Validating,
    /// 已解压到工作区
    Extracted,
    /// 已定位并校验清单
    ManifestResolved,
    /// 已完成冲突检查
    ConflictChecked,
    /// 文件已复制到模块目录
    Installed,
    /// 已写入注册表
    Registered,
    /// 失败
    Failed,
}

impl fmt::Display for InstallStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstallStage::Received => write!(f, "received"),
            InstallStage::Validating => write!(f, "validating"),
            InstallStage::Extracted => write!(f, "extracted"),
            InstallStage::ManifestResolved => write!(f, "manifest_resolved"),
            InstallStage::ConflictChecked => write!(f, "conflict_checked"),
            InstallStage::Installed => write!(f, "installed"),
            InstallStage::Registered => write!(f, "registered"),
            InstallStage::Failed => write!(f, "failed"),
        }
    }
}

/// 安装进度
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallProgress {
    /// 当前阶段
    pub stage: InstallStage,
    /// 状态消息
    pub message: String,
}

impl InstallProgress {
    pub fn new(stage: InstallStage, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::new(InstallStage::Failed, message)
    }
}

/// 进度回调 trait
///
/// 用于接收安装进度更新
pub trait ProgressCallback: Send + Sync {
    fn on_progress(&self, progress: InstallProgress);
}

/// 空进度回调实现
pub struct NoopProgressCallback;

impl ProgressCallback for NoopProgressCallback {
    fn on_progress(&self, _progress: InstallProgress) {}
}

/// 将闭包包装为 ProgressCallback
pub struct FnProgressCallback<F>
where
    F: Fn(InstallProgress) + Send + Sync,
{
    callback: F,
}

impl<F> FnProgressCallback<F>
where
    F: Fn(InstallProgress) + Send + Sync,
{
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> ProgressCallback for FnProgressCallback<F>
where
    F: Fn(InstallProgress) + Send + Sync,
{
    fn on_progress(&self, progress: InstallProgress) {
        (self.callback)(progress);
    }
}

/// 模块清单 (module.json)
///
/// 必需字段缺失时反序列化为空字符串，由解析器统一报告缺失的字段名
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ModuleManifest {
    /// 模块名称，同时作为安装目录名
    #[serde(default)]
    pub name: String,
    /// 路由/命名空间使用的短别名
    #[serde(default)]
    pub alias: String,
    /// 描述
    #[serde(default)]
    pub description: String,
    /// 版本
    #[serde(default)]
    pub version: Option<String>,
    /// 作者
    #[serde(default)]
    pub author: Option<String>,
    /// 作者邮箱
    #[serde(default)]
    pub author_email: Option<String>,
    /// 启用时宿主需要加载的入口
    #[serde(default)]
    pub providers: Vec<String>,
    /// 声明的依赖（仅记录）
    #[serde(default, alias = "requires")]
    pub requirements: Vec<String>,
    /// 代码命名空间根
    #[serde(default)]
    pub namespace: Option<String>,
}

/// 注册表条目
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModuleEntry {
    pub id: i64,
    pub name: String,
    pub alias: String,
    pub description: String,
    pub version: String,
    pub author: Option<String>,
    pub author_email: Option<String>,
    pub providers: Vec<String>,
    pub requirements: Vec<String>,
    pub is_enabled: bool,
    pub is_core: bool,
    /// 已安装模块目录的绝对路径
    pub path: PathBuf,
    pub namespace: String,
    pub installed_at: DateTime<Utc>,
}

/// 待写入注册表的条目（尚未分配 id）
#[derive(Debug, Clone, PartialEq)]
pub struct NewModuleEntry {
    pub name: String,
    pub alias: String,
    pub description: String,
    pub version: String,
    pub author: Option<String>,
    pub author_email: Option<String>,
    pub providers: Vec<String>,
    pub requirements: Vec<String>,
    pub is_enabled: bool,
    pub is_core: bool,
    pub path: PathBuf,
    pub namespace: String,
    pub installed_at: DateTime<Utc>,
}

impl NewModuleEntry {
    /// 由清单构建条目，缺省字段填入默认值，初始为禁用、非核心
    pub fn from_manifest(
        manifest: &ModuleManifest,
        path: PathBuf,
        default_namespace: &str,
    ) -> Self {
        Self {
            name: manifest.name.trim().to_string(),
            alias: manifest.alias.trim().to_string(),
            description: manifest.description.trim().to_string(),
            version: manifest
                .version
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .unwrap_or(DEFAULT_VERSION)
                .to_string(),
            author: manifest.author.clone(),
            author_email: manifest.author_email.clone(),
            providers: manifest.providers.clone(),
            requirements: manifest.requirements.clone(),
            is_enabled: false,
            is_core: false,
            path,
            namespace: manifest
                .namespace
                .as_deref()
                .map(str::trim)
                .filter(|ns| !ns.is_empty())
                .unwrap_or(default_namespace)
                .to_string(),
            installed_at: Utc::now(),
        }
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.is_enabled = enabled;
        self
    }

    pub fn with_core(mut self, core: bool) -> Self {
        self.is_core = core;
        self
    }
}

/// 安装结果
///
/// 安装流程对外的统一返回值，失败不会以错误形式越过协调器
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallResult {
    pub success: bool,
    pub message: String,
    pub module: Option<ModuleEntry>,
    /// 失败前到达的最后阶段
    pub failed_stage: Option<InstallStage>,
    pub error_kind: Option<ModuleErrorKind>,
}

impl InstallResult {
    pub fn success(entry: ModuleEntry) -> Self {
        Self {
            success: true,
            message: format!("Module '{}' installed successfully.", entry.name),
            module: Some(entry),
            failed_stage: None,
            error_kind: None,
        }
    }

    pub fn failure(stage: InstallStage, error: &ModuleError) -> Self {
        Self {
            success: false,
            message: error.to_string(),
            module: None,
            failed_stage: Some(stage),
            error_kind: Some(error.kind()),
        }
    }
}

/// 启用/禁用/卸载等生命周期操作的结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationResult {
    pub success: bool,
    pub message: String,
    pub module: Option<ModuleEntry>,
    pub error_kind: Option<ModuleErrorKind>,
}

impl OperationResult {
    pub fn from_result(
        result: Result<ModuleEntry, ModuleError>,
        describe: impl FnOnce(&ModuleEntry) -> String,
    ) -> Self {
        match result {
            Ok(entry) => Self {
                success: true,
                message: describe(&entry),
                module: Some(entry),
                error_kind: None,
            },
            Err(e) => Self::failure(&e),
        }
    }

    pub fn failure(error: &ModuleError) -> Self {
        Self {
            success: false,
            message: error.to_string(),
            module: None,
            error_kind: Some(error.kind()),
        }
    }
}
