//! 安装协调器
//!
//! 依次驱动 校验 → 解压 → 清单解析 → 冲突检查 → 文件安装 → 登记，
//! 任一步骤失败即终止并转换为统一的 [`InstallResult`]，错误不会越过本边界。
//! 工作区在离开流程时无条件清理。

use std::path::PathBuf;
use std::sync::Arc;

use super::conflict::ConflictChecker;
use super::extractor::PackageExtractor;
use super::installer::PackageInstaller;
use super::manifest::{ManifestResolver, ResolvedPackage};
use super::recorder::RegistryRecorder;
use super::validator::{ArchiveValidator, UploadedArchive};
use super::workspace::Workspace;
use crate::config::ModuleHostConfig;
use crate::module::locks::NameLocks;
use crate::module::registry::ModuleRegistry;
use crate::module::types::{
    InstallProgress, InstallResult, InstallStage, ModuleEntry, ModuleError, ProgressCallback,
};

pub struct InstallCoordinator {
    validator: ArchiveValidator,
    extractor: PackageExtractor,
    resolver: ManifestResolver,
    checker: ConflictChecker,
    installer: PackageInstaller,
    recorder: RegistryRecorder,
    scratch_dir: PathBuf,
    locks: Arc<NameLocks>,
}

impl InstallCoordinator {
    pub fn new(
        config: &ModuleHostConfig,
        registry: Arc<dyn ModuleRegistry>,
        locks: Arc<NameLocks>,
    ) -> Self {
        Self {
            validator: ArchiveValidator::new(config.max_upload_bytes),
            extractor: PackageExtractor::new(config.max_extracted_bytes),
            resolver: ManifestResolver::new(
                config.manifest_file.clone(),
                config.required_dirs.clone(),
            ),
            checker: ConflictChecker::new(config.modules_dir.clone(), registry.clone()),
            installer: PackageInstaller::new(config.modules_dir.clone()),
            recorder: RegistryRecorder::new(registry, config.default_namespace.clone()),
            scratch_dir: config.scratch_dir.clone(),
            locks,
        }
    }

    /// 安装一个上传的模块包
    pub fn install(
        &self,
        upload: &UploadedArchive,
        progress: &dyn ProgressCallback,
    ) -> InstallResult {
        let mut stage = InstallStage::Received;
        progress.on_progress(InstallProgress::new(
            stage,
            format!("Received {}", upload.file_name),
        ));
        tracing::info!(
            "[INSTALL] 开始安装 {} ({} 字节)",
            upload.file_name,
            upload.size
        );

        match self.run(upload, progress, &mut stage) {
            Ok(entry) => {
                tracing::info!("[INSTALL] 模块 {} 安装完成", entry.name);
                InstallResult::success(entry)
            }
            Err(e) => {
                tracing::warn!("[INSTALL] 安装 {} 失败 (阶段 {}): {}", upload.file_name, stage, e);
                progress.on_progress(InstallProgress::failed(e.to_string()));
                InstallResult::failure(stage, &e)
            }
        }
    }

    fn run(
        &self,
        upload: &UploadedArchive,
        progress: &dyn ProgressCallback,
        stage: &mut InstallStage,
    ) -> Result<ModuleEntry, ModuleError> {
        advance(stage, InstallStage::Validating, progress, "Validating upload");
        self.validator.validate(upload)?;

        let mut workspace = Workspace::create(&self.scratch_dir)?;
        let result = self.run_in_workspace(upload, &workspace, progress, stage);

        // 显式清理以便记录失败，未执行到这里时由 Drop 清理
        if let Err(e) = workspace.dispose() {
            tracing::warn!("[INSTALL] 工作区清理失败: {}", e);
        }
        result
    }

    fn run_in_workspace(
        &self,
        upload: &UploadedArchive,
        workspace: &Workspace,
        progress: &dyn ProgressCallback,
        stage: &mut InstallStage,
    ) -> Result<ModuleEntry, ModuleError> {
        let files = self.extractor.extract(&upload.path, workspace.path())?;
        advance(
            stage,
            InstallStage::Extracted,
            progress,
            &format!("Extracted {} files", files),
        );

        let package = self.resolver.resolve(workspace.path())?;
        advance(
            stage,
            InstallStage::ManifestResolved,
            progress,
            &format!("Found module '{}'", package.manifest.name.trim()),
        );

        let name = package.manifest.name.trim().to_string();
        self.locks
            .with_lock(&name, || self.install_locked(&package, &name, progress, stage))
    }

    /// 在名称锁内完成冲突检查、文件安装与登记
    fn install_locked(
        &self,
        package: &ResolvedPackage,
        name: &str,
        progress: &dyn ProgressCallback,
        stage: &mut InstallStage,
    ) -> Result<ModuleEntry, ModuleError> {
        self.checker.check(&package.manifest)?;
        advance(
            stage,
            InstallStage::ConflictChecked,
            progress,
            "No conflicting module found",
        );

        let installed_path = self.installer.install(&package.root, name)?;
        advance(
            stage,
            InstallStage::Installed,
            progress,
            &format!("Copied files to {}", installed_path.display()),
        );

        match self.recorder.record(&package.manifest, installed_path.clone()) {
            Ok(entry) => {
                advance(stage, InstallStage::Registered, progress, "Registered module");
                Ok(entry)
            }
            Err(e) => {
                // 目录与注册表条目同生同灭
                if let Err(rollback) = self.installer.remove(&installed_path) {
                    tracing::error!(
                        "[INSTALL] 回滚 {} 失败: {}",
                        installed_path.display(),
                        rollback
                    );
                }
                Err(e)
            }
        }
    }
}

fn advance(
    stage: &mut InstallStage,
    next: InstallStage,
    progress: &dyn ProgressCallback,
    message: &str,
) {
    *stage = next;
    tracing::debug!("[INSTALL] 阶段 {}: {}", next, message);
    progress.on_progress(InstallProgress::new(next, message));
}
