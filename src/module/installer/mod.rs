//! 模块安装流水线
//!
//! 提供从上传包到注册表条目的完整安装流程：
//! - 上传包类型与大小校验
//! - 独占工作区与 ZIP 解压
//! - 清单定位、字段与目录结构校验
//! - 冲突检查、暂存复制与注册表登记

mod conflict;
mod coordinator;
mod extractor;
mod installer;
mod manifest;
mod recorder;
mod validator;
mod workspace;

pub use conflict::ConflictChecker;
pub use coordinator::InstallCoordinator;
pub use extractor::{PackageExtractor, MAX_EXTRACTED_BYTES};
pub use installer::{PackageInstaller, STAGING_PREFIX};
pub use manifest::{ManifestResolver, ResolvedPackage};
pub use recorder::RegistryRecorder;
pub use validator::{ArchiveValidator, UploadedArchive, ACCEPTED_EXTENSION, MAX_UPLOAD_BYTES};
pub use workspace::Workspace;
