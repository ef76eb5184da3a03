//! 上传包验证器
//!
//! 在任何磁盘操作之前检查上传文件的类型与大小

use std::path::{Path, PathBuf};

use crate::module::types::ModuleError;

/// 唯一支持的压缩包扩展名
pub const ACCEPTED_EXTENSION: &str = "zip";

/// 上传大小上限 (50 MiB)
pub const MAX_UPLOAD_BYTES: u64 = 50 * 1024 * 1024;

/// 一次上传的模块包
#[derive(Debug, Clone)]
pub struct UploadedArchive {
    /// 上传文件在本地的位置
    pub path: PathBuf,
    /// 客户端提交的原始文件名
    pub file_name: String,
    /// 文件大小（字节）
    pub size: u64,
}

impl UploadedArchive {
    pub fn new(path: impl Into<PathBuf>, file_name: impl Into<String>, size: u64) -> Self {
        Self {
            path: path.into(),
            file_name: file_name.into(),
            size,
        }
    }

    /// 从本地文件构建，文件名与大小取自文件本身
    pub fn from_path(path: impl Into<PathBuf>) -> Result<Self, ModuleError> {
        let path = path.into();
        let metadata = std::fs::metadata(&path).map_err(|e| {
            ModuleError::Upload(format!("Uploaded file {} is not readable: {}", path.display(), e))
        })?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        Ok(Self::new(path, file_name, metadata.len()))
    }

    /// 小写扩展名
    pub fn extension(&self) -> Option<String> {
        Path::new(&self.file_name)
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
    }
}

/// 上传包验证器
pub struct ArchiveValidator {
    max_bytes: u64,
}

impl ArchiveValidator {
    pub fn new(max_bytes: u64) -> Self {
        Self { max_bytes }
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    /// 校验扩展名与大小，不产生副作用
    pub fn validate(&self, upload: &UploadedArchive) -> Result<(), ModuleError> {
        if upload.extension().as_deref() != Some(ACCEPTED_EXTENSION) {
            return Err(ModuleError::Upload(format!(
                "Unsupported file type '{}'. Only .{} module archives are accepted.",
                upload.file_name, ACCEPTED_EXTENSION
            )));
        }

        if upload.size == 0 {
            return Err(ModuleError::Upload(
                "The uploaded module archive is empty.".to_string(),
            ));
        }

        if upload.size > self.max_bytes {
            return Err(ModuleError::Upload(format!(
                "The uploaded module archive exceeds the maximum size of {} MB.",
                self.max_bytes / (1024 * 1024)
            )));
        }

        Ok(())
    }
}

impl Default for ArchiveValidator {
    fn default() -> Self {
        Self::new(MAX_UPLOAD_BYTES)
    }
}
