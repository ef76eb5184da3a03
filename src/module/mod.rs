//! 模块系统
//!
//! 上传模块包的安装流水线，以及基于持久注册表的启用/禁用/卸载生命周期

pub mod activation;
pub mod installer;
pub mod locks;
pub mod manager;
pub mod registry;
pub mod sync;
pub mod types;
pub mod uninstaller;

pub use activation::{ActivationController, ModuleActivator, StatusFileActivator};
pub use installer::{InstallCoordinator, UploadedArchive};
pub use locks::NameLocks;
pub use manager::ModuleManager;
pub use registry::{ModuleRegistry, SqliteModuleRegistry};
pub use sync::{ModuleSynchronizer, SyncReport};
pub use types::{
    FnProgressCallback, InstallProgress, InstallResult, InstallStage, ModuleEntry, ModuleError,
    ModuleErrorKind, ModuleManifest, NewModuleEntry, NoopProgressCallback, OperationResult,
    ProgressCallback,
};
pub use uninstaller::Uninstaller;
