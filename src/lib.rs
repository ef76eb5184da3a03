//! 运行时模块宿主
//!
//! 管理员上传模块包后，在不重启宿主进程的情况下完成校验、安装、登记，
//! 并提供启用/禁用/卸载的生命周期管理。

pub mod commands;
pub mod config;
pub mod database;
pub mod logger;
pub mod module;

pub use config::ModuleHostConfig;
pub use module::{InstallResult, ModuleEntry, ModuleError, ModuleManager, OperationResult};
