//! 模块包解压
//!
//! 将 ZIP 包展开到工作区。越界路径（`../`、绝对路径）和 macOS 元数据会被跳过。

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Component, Path};

use crate::module::types::ModuleError;

/// 解压后总大小上限 (200 MiB)
pub const MAX_EXTRACTED_BYTES: u64 = 200 * 1024 * 1024;

pub struct PackageExtractor {
    max_extracted_bytes: u64,
}

impl PackageExtractor {
    pub fn new(max_extracted_bytes: u64) -> Self {
        Self {
            max_extracted_bytes,
        }
    }

    /// 解压 `archive_path` 到 `dest`，返回写出的文件数
    pub fn extract(&self, archive_path: &Path, dest: &Path) -> Result<usize, ModuleError> {
        let file = File::open(archive_path).map_err(|e| {
            ModuleError::Extraction(format!("cannot open {}: {}", archive_path.display(), e))
        })?;
        let mut archive = zip::ZipArchive::new(file)
            .map_err(|e| ModuleError::Extraction(format!("not a valid ZIP archive: {}", e)))?;

        if archive.len() == 0 {
            return Err(ModuleError::Extraction("the archive is empty".to_string()));
        }

        let mut total_bytes: u64 = 0;
        let mut files_written = 0;

        for i in 0..archive.len() {
            let mut entry = archive
                .by_index(i)
                .map_err(|e| ModuleError::Extraction(format!("cannot read entry {}: {}", i, e)))?;

            let relative = match entry.enclosed_name() {
                Some(path) => path.to_path_buf(),
                None => {
                    tracing::warn!("[INSTALL] 跳过越界条目: {}", entry.name());
                    continue;
                }
            };

            if is_macos_metadata(&relative) {
                continue;
            }

            let outpath = dest.join(&relative);

            if entry.is_dir() {
                fs::create_dir_all(&outpath).map_err(|e| extraction_io(&outpath, e))?;
                continue;
            }

            if let Some(parent) = outpath.parent() {
                fs::create_dir_all(parent).map_err(|e| extraction_io(parent, e))?;
            }

            let mut outfile = File::create(&outpath).map_err(|e| extraction_io(&outpath, e))?;
            let remaining = self.max_extracted_bytes.saturating_sub(total_bytes);
            let mut limited = (&mut entry).take(remaining.saturating_add(1));
            let written =
                io::copy(&mut limited, &mut outfile).map_err(|e| extraction_io(&outpath, e))?;

            total_bytes += written;
            if total_bytes > self.max_extracted_bytes {
                return Err(ModuleError::Extraction(format!(
                    "extracted content exceeds {} MB",
                    self.max_extracted_bytes / (1024 * 1024)
                )));
            }

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                if let Some(mode) = entry.unix_mode() {
                    fs::set_permissions(&outpath, fs::Permissions::from_mode(mode & 0o777))
                        .map_err(|e| extraction_io(&outpath, e))?;
                }
            }

            files_written += 1;
        }

        tracing::debug!(
            "[INSTALL] 解压完成: {} 个文件, {} 字节",
            files_written,
            total_bytes
        );
        Ok(files_written)
    }
}

impl Default for PackageExtractor {
    fn default() -> Self {
        Self::new(MAX_EXTRACTED_BYTES)
    }
}

fn is_macos_metadata(path: &Path) -> bool {
    path.components()
        .any(|c| matches!(c, Component::Normal(name) if name == "__MACOSX"))
}

fn extraction_io(path: &Path, err: io::Error) -> ModuleError {
    ModuleError::Extraction(format!("{}: {}", path.display(), err))
}
