//! 模块管理相关命令
//!
//! - install_module_from_file: 从本地上传文件安装模块
//! - enable_module / disable_module: 启用、禁用模块
//! - uninstall_module: 卸载模块
//! - list_installed_modules / get_installed_module: 查询注册表
//! - sync_modules: 与模块目录同步

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

use crate::module::installer::UploadedArchive;
use crate::module::{
    InstallProgress, InstallResult, ModuleEntry, ModuleError, ModuleManager, OperationResult,
    ProgressCallback, SyncReport,
};

/// 模块管理器状态
#[derive(Clone)]
pub struct ModuleManagerState(pub Arc<ModuleManager>);

/// 命令结果响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResult {
    pub success: bool,
    pub message: String,
    pub module: Option<ModuleEntry>,
}

impl CommandResult {
    fn failure(message: String) -> Self {
        Self {
            success: false,
            message,
            module: None,
        }
    }
}

impl From<InstallResult> for CommandResult {
    fn from(result: InstallResult) -> Self {
        Self {
            success: result.success,
            message: result.message,
            module: result.module,
        }
    }
}

impl From<OperationResult> for CommandResult {
    fn from(result: OperationResult) -> Self {
        Self {
            success: result.success,
            message: result.message,
            module: result.module,
        }
    }
}

/// 将安装进度写入日志
struct TracingProgressCallback;

impl ProgressCallback for TracingProgressCallback {
    fn on_progress(&self, progress: InstallProgress) {
        tracing::info!("[INSTALL] {}: {}", progress.stage, progress.message);
    }
}

/// 在阻塞线程池中执行模块操作
async fn run_blocking<T, F>(state: &ModuleManagerState, f: F) -> Result<T, String>
where
    T: Send + 'static,
    F: FnOnce(&ModuleManager) -> T + Send + 'static,
{
    let manager = state.0.clone();
    tokio::task::spawn_blocking(move || f(&manager))
        .await
        .map_err(|e| format!("模块操作异常终止: {}", e))
}

/// 从本地文件安装模块
///
/// `file_name` 为客户端提交的原始文件名，缺省时取自路径
pub async fn install_module_from_file(
    state: &ModuleManagerState,
    file_path: String,
    file_name: Option<String>,
) -> Result<CommandResult, String> {
    let path = PathBuf::from(&file_path);
    let upload = match UploadedArchive::from_path(&path) {
        Ok(upload) => match file_name {
            Some(name) => UploadedArchive {
                file_name: name,
                ..upload
            },
            None => upload,
        },
        Err(e) => return Ok(CommandResult::failure(e.to_string())),
    };

    let result = run_blocking(state, move |manager| {
        manager.install(&upload, &TracingProgressCallback)
    })
    .await;
    Ok(result.map_or_else(CommandResult::failure, CommandResult::from))
}

pub async fn enable_module(
    state: &ModuleManagerState,
    name: String,
) -> Result<CommandResult, String> {
    let result = run_blocking(state, move |manager| manager.enable(&name)).await;
    Ok(result.map_or_else(CommandResult::failure, CommandResult::from))
}

pub async fn disable_module(
    state: &ModuleManagerState,
    name: String,
) -> Result<CommandResult, String> {
    let result = run_blocking(state, move |manager| manager.disable(&name)).await;
    Ok(result.map_or_else(CommandResult::failure, CommandResult::from))
}

/// 卸载模块，只允许已禁用的非核心模块
pub async fn uninstall_module(
    state: &ModuleManagerState,
    name: String,
) -> Result<CommandResult, String> {
    let result = run_blocking(state, move |manager| manager.uninstall(&name)).await;
    Ok(result.map_or_else(CommandResult::failure, CommandResult::from))
}

/// 列出已安装模块
pub async fn list_installed_modules(
    state: &ModuleManagerState,
) -> Result<Vec<ModuleEntry>, String> {
    run_blocking(state, |manager| manager.list())
        .await?
        .map_err(|e| e.to_string())
}

/// 获取已安装模块信息
pub async fn get_installed_module(
    state: &ModuleManagerState,
    name: String,
) -> Result<ModuleEntry, String> {
    run_blocking(state, move |manager| manager.get(&name))
        .await?
        .map_err(|e: ModuleError| e.to_string())
}

pub async fn sync_modules(state: &ModuleManagerState) -> Result<SyncReport, String> {
    run_blocking(state, |manager| manager.sync())
        .await?
        .map_err(|e| e.to_string())
}
