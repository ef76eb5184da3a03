//! 宿主命令
//!
//! 对外暴露的异步命令入口，阻塞的模块操作在 `spawn_blocking` 中执行

pub mod module_cmd;

pub use module_cmd::{CommandResult, ModuleManagerState};
