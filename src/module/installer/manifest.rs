//! 清单定位与校验
//!
//! 清单可以位于工作区根目录，或者恰好一层子目录中（压缩包常把内容包在单个顶层目录里）。
//! 找到清单的目录即为包根目录。

use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::MANIFEST_FILE;
use crate::module::types::{ModuleError, ModuleManifest};

/// 名称与别名的最大长度
const MAX_NAME_LEN: usize = 64;

static NAME_PATTERN: Lazy<Option<Regex>> = Lazy::new(|| compile(r"^[A-Za-z0-9_-]+$"));

/// x.y 或 x.y.z，可带 -suffix
static VERSION_PATTERN: Lazy<Option<Regex>> =
    Lazy::new(|| compile(r"^\d+\.\d+(\.\d+)?(-[0-9A-Za-z.-]+)?$"));

/// 编译失败时记录错误，对应校验一律不通过
fn compile(pattern: &str) -> Option<Regex> {
    match Regex::new(pattern) {
        Ok(re) => Some(re),
        Err(e) => {
            tracing::error!("[INSTALL] 正则编译失败 {}: {}", pattern, e);
            None
        }
    }
}

/// 解析结果：包根目录与清单
#[derive(Debug, Clone)]
pub struct ResolvedPackage {
    pub root: PathBuf,
    pub manifest: ModuleManifest,
}

pub struct ManifestResolver {
    manifest_file: String,
    required_dirs: Vec<String>,
}

impl ManifestResolver {
    pub fn new(manifest_file: impl Into<String>, required_dirs: Vec<String>) -> Self {
        Self {
            manifest_file: manifest_file.into(),
            required_dirs,
        }
    }

    pub fn manifest_file(&self) -> &str {
        &self.manifest_file
    }

    /// 定位、解析并校验清单，再检查包目录结构
    pub fn resolve(&self, workspace_root: &Path) -> Result<ResolvedPackage, ModuleError> {
        let root = self.find_package_root(workspace_root)?;
        let manifest = Self::read_manifest(&root.join(&self.manifest_file))?;
        Self::validate_manifest(&manifest)?;
        self.validate_structure(&root)?;

        Ok(ResolvedPackage { root, manifest })
    }

    /// 查找包含清单的目录
    pub fn find_package_root(&self, workspace_root: &Path) -> Result<PathBuf, ModuleError> {
        if workspace_root.join(&self.manifest_file).is_file() {
            return Ok(workspace_root.to_path_buf());
        }

        let entries = fs::read_dir(workspace_root)
            .map_err(|e| ModuleError::filesystem(workspace_root, e))?;
        let mut candidates: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                let skipped = path
                    .file_name()
                    .map(|n| {
                        let n = n.to_string_lossy();
                        n.starts_with('.') || n == "__MACOSX"
                    })
                    .unwrap_or(true);
                !skipped && path.is_dir() && path.join(&self.manifest_file).is_file()
            })
            .collect();
        // read_dir 顺序不确定，排序后取第一个
        candidates.sort();

        if candidates.len() > 1 {
            tracing::warn!(
                "[INSTALL] 发现多个包含 {} 的子目录，使用 {}",
                self.manifest_file,
                candidates[0].display()
            );
        }

        candidates.into_iter().next().ok_or_else(|| {
            ModuleError::Manifest(format!(
                "No {} manifest was found in the module archive.",
                self.manifest_file
            ))
        })
    }

    /// 读取并解析清单文件，内容必须是 JSON 对象
    pub fn read_manifest(path: &Path) -> Result<ModuleManifest, ModuleError> {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| MANIFEST_FILE.to_string());

        let content = fs::read_to_string(path).map_err(|e| {
            ModuleError::Manifest(format!("The {} manifest could not be read: {}", file_name, e))
        })?;

        let value: serde_json::Value = serde_json::from_str(&content).map_err(|e| {
            ModuleError::Manifest(format!("The {} manifest is not valid JSON: {}", file_name, e))
        })?;
        if !value.is_object() {
            return Err(ModuleError::Manifest(format!(
                "The {} manifest must be a JSON object.",
                file_name
            )));
        }

        serde_json::from_value(value).map_err(|e| {
            ModuleError::Manifest(format!("The {} manifest is malformed: {}", file_name, e))
        })
    }

    /// 校验必需字段与字段格式，报告第一个不合法的字段
    pub fn validate_manifest(manifest: &ModuleManifest) -> Result<(), ModuleError> {
        let required = [
            ("name", &manifest.name),
            ("alias", &manifest.alias),
            ("description", &manifest.description),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(ModuleError::Manifest(format!(
                    "The module manifest is missing the required field '{}'.",
                    field
                )));
            }
        }

        for (field, value) in [("name", &manifest.name), ("alias", &manifest.alias)] {
            let value = value.trim();
            if !Self::is_valid_name(value) {
                return Err(ModuleError::Manifest(format!(
                    "The manifest field '{}' may only contain letters, digits, '-' and '_'.",
                    field
                )));
            }
            if value.len() > MAX_NAME_LEN {
                return Err(ModuleError::Manifest(format!(
                    "The manifest field '{}' must not exceed {} characters.",
                    field, MAX_NAME_LEN
                )));
            }
        }

        if let Some(version) = manifest.version.as_deref().map(str::trim) {
            if !version.is_empty() && !Self::is_valid_version(version) {
                return Err(ModuleError::Manifest(format!(
                    "The manifest field 'version' has an invalid value '{}'.",
                    version
                )));
            }
        }

        Ok(())
    }

    /// 检查包根目录下的必需目录，报告第一个缺失的目录
    pub fn validate_structure(&self, package_root: &Path) -> Result<(), ModuleError> {
        for dir in &self.required_dirs {
            if !package_root.join(dir).is_dir() {
                return Err(ModuleError::Structure(format!(
                    "The module package is missing the required directory '{}'.",
                    dir
                )));
            }
        }
        Ok(())
    }

    /// 名称只允许字母、数字、连字符和下划线
    pub fn is_valid_name(name: &str) -> bool {
        NAME_PATTERN
            .as_ref()
            .map(|re| re.is_match(name))
            .unwrap_or(false)
    }

    pub fn is_valid_version(version: &str) -> bool {
        VERSION_PATTERN
            .as_ref()
            .map(|re| re.is_match(version))
            .unwrap_or(false)
    }
}

impl Default for ManifestResolver {
    fn default() -> Self {
        Self::new(
            MANIFEST_FILE,
            vec![
                "app/Http/Controllers".to_string(),
                "resources/views".to_string(),
            ],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_format_patterns_compile() {
        assert!(NAME_PATTERN.is_some());
        assert!(VERSION_PATTERN.is_some());
        assert!(compile(r"^[a-z").is_none());
    }

    fn write_package(root: &Path, manifest: &str, dirs: &[&str]) {
        fs::create_dir_all(root).unwrap();
        fs::write(root.join("module.json"), manifest).unwrap();
        for dir in dirs {
            fs::create_dir_all(root.join(dir)).unwrap();
        }
    }

    const VALID: &str = r#"{"name":"Blog","alias":"blog","description":"x"}"#;
    const LAYOUT: [&str; 2] = ["app/Http/Controllers", "resources/views"];

    #[test]
    fn test_resolve_manifest_at_root() {
        let temp = TempDir::new().unwrap();
        write_package(temp.path(), VALID, &LAYOUT);

        let package = ManifestResolver::default().resolve(temp.path()).unwrap();
        assert_eq!(package.root, temp.path());
        assert_eq!(package.manifest.name, "Blog");
    }

    #[test]
    fn test_resolve_manifest_one_level_down() {
        let temp = TempDir::new().unwrap();
        write_package(&temp.path().join("Blog-main"), VALID, &LAYOUT);

        let package = ManifestResolver::default().resolve(temp.path()).unwrap();
        assert_eq!(package.root, temp.path().join("Blog-main"));
    }

    #[test]
    fn test_manifest_two_levels_down_is_not_found() {
        let temp = TempDir::new().unwrap();
        write_package(&temp.path().join("a").join("b"), VALID, &LAYOUT);

        let err = ManifestResolver::default().resolve(temp.path()).unwrap_err();
        assert!(matches!(err, ModuleError::Manifest(_)));
        assert!(err.to_string().contains("No module.json"));
    }

    #[test]
    fn test_multiple_candidates_pick_first_sorted() {
        let temp = TempDir::new().unwrap();
        write_package(&temp.path().join("b"), VALID, &LAYOUT);
        write_package(&temp.path().join("a"), VALID, &LAYOUT);

        let root = ManifestResolver::default()
            .find_package_root(temp.path())
            .unwrap();
        assert_eq!(root, temp.path().join("a"));
    }

    #[test]
    fn test_hidden_and_metadata_dirs_are_ignored() {
        let temp = TempDir::new().unwrap();
        write_package(&temp.path().join(".hidden"), VALID, &LAYOUT);
        write_package(&temp.path().join("__MACOSX"), VALID, &LAYOUT);
        write_package(&temp.path().join("Blog"), VALID, &LAYOUT);

        let root = ManifestResolver::default()
            .find_package_root(temp.path())
            .unwrap();
        assert_eq!(root, temp.path().join("Blog"));
    }

    #[test]
    fn test_unparsable_manifest() {
        let temp = TempDir::new().unwrap();
        write_package(temp.path(), "{ not json", &LAYOUT);
        let err = ManifestResolver::default().resolve(temp.path()).unwrap_err();
        assert!(matches!(err, ModuleError::Manifest(_)));

        fs::write(temp.path().join("module.json"), r#"["Blog"]"#).unwrap();
        let err = ManifestResolver::default().resolve(temp.path()).unwrap_err();
        assert!(err.to_string().contains("JSON object"));
    }

    #[test]
    fn test_missing_required_field_is_named() {
        let cases = [
            (r#"{"alias":"blog","description":"x"}"#, "'name'"),
            (r#"{"name":"Blog","description":"x"}"#, "'alias'"),
            (r#"{"name":"Blog","alias":"blog"}"#, "'description'"),
            (r#"{"name":"Blog","alias":"  ","description":""}"#, "'alias'"),
        ];

        for (manifest, field) in cases {
            let temp = TempDir::new().unwrap();
            write_package(temp.path(), manifest, &LAYOUT);
            let err = ManifestResolver::default().resolve(temp.path()).unwrap_err();
            assert!(matches!(err, ModuleError::Manifest(_)));
            assert!(err.to_string().contains(field), "{} -> {}", manifest, err);
        }
    }

    #[test]
    fn test_missing_directory_is_structure_error() {
        let temp = TempDir::new().unwrap();
        write_package(temp.path(), VALID, &["resources/views"]);
        let err = ManifestResolver::default().resolve(temp.path()).unwrap_err();
        assert!(matches!(err, ModuleError::Structure(_)));
        assert!(err.to_string().contains("app/Http/Controllers"));

        let temp = TempDir::new().unwrap();
        write_package(temp.path(), VALID, &["app/Http/Controllers"]);
        let err = ManifestResolver::default().resolve(temp.path()).unwrap_err();
        assert!(err.to_string().contains("resources/views"));
    }

    #[test]
    fn test_name_with_path_separator_rejected() {
        let manifest = ModuleManifest {
            name: "../evil".to_string(),
            alias: "evil".to_string(),
            description: "x".to_string(),
            ..Default::default()
        };
        let err = ManifestResolver::validate_manifest(&manifest).unwrap_err();
        assert!(err.to_string().contains("'name'"));
    }

    #[test]
    fn test_invalid_version_rejected() {
        let manifest = ModuleManifest {
            name: "Blog".to_string(),
            alias: "blog".to_string(),
            description: "x".to_string(),
            version: Some("latest".to_string()),
            ..Default::default()
        };
        let err = ManifestResolver::validate_manifest(&manifest).unwrap_err();
        assert!(err.to_string().contains("'version'"));
    }

    #[test]
    fn test_is_valid_version() {
        assert!(ManifestResolver::is_valid_version("1.0"));
        assert!(ManifestResolver::is_valid_version("1.0.0"));
        assert!(ManifestResolver::is_valid_version("2.1.0-beta"));
        assert!(!ManifestResolver::is_valid_version("1"));
        assert!(!ManifestResolver::is_valid_version("1.0.0.0"));
        assert!(!ManifestResolver::is_valid_version("v1.0"));
    }
}
