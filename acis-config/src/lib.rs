use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// 应用配置的根结构。
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub export: ExportConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
}

impl AppConfig {
    /// 从显式路径加载配置。
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// 自动发现配置文件：优先读取环境变量 `ACIS_CONFIG`，否则寻找 `./config/default.toml`。
    /// 若文件缺失，则返回默认配置。
    pub fn discover() -> Result<Self, ConfigError> {
        if let Some(path) = env::var_os("ACIS_CONFIG") {
            return Self::from_file(PathBuf::from(path));
        }

        let default_path = env::current_dir()
            .map(|dir| dir.join("config").join("default.toml"))
            .map_err(|source| ConfigError::Context {
                message: "获取当前工作目录失败".to_string(),
                source,
            })?;

        if default_path.exists() {
            Self::from_file(default_path)
        } else {
            Ok(Self::default())
        }
    }
}

/// 日志配置，支持设置默认等级。
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_string()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Sat,
    Sab,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Sat => "sat",
            ExportFormat::Sab => "sab",
        }
    }
}

/// 导出缺省值。
#[derive(Debug, Clone, Deserialize)]
pub struct ExportConfig {
    #[serde(default = "ExportConfig::default_version")]
    pub version: u32,
    #[serde(default)]
    pub format: ExportFormat,
    /// 未设置时使用编解码库的缺省产品标识。
    #[serde(default)]
    pub product_id: Option<String>,
    #[serde(default = "ExportConfig::default_units")]
    pub units_in_mm: f64,
    #[serde(default)]
    pub sequence_numbers: bool,
    #[serde(default)]
    pub drop_attributes: bool,
}

impl ExportConfig {
    fn default_version() -> u32 {
        700
    }

    fn default_units() -> f64 {
        1.0
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            version: Self::default_version(),
            format: ExportFormat::default(),
            product_id: None,
            units_in_mm: Self::default_units(),
            sequence_numbers: false,
            drop_attributes: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PolicyConfig {
    #[serde(default = "PolicyConfig::default_min_export_version")]
    pub min_export_version: u32,
    #[serde(default = "PolicyConfig::default_validate")]
    pub validate_topology: bool,
}

impl PolicyConfig {
    fn default_min_export_version() -> u32 {
        700
    }

    fn default_validate() -> bool {
        true
    }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            min_export_version: Self::default_min_export_version(),
            validate_topology: Self::default_validate(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("读取配置文件 {path:?} 失败: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("解析配置文件 {path:?} 失败: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("{message}")]
    Context {
        message: String,
        #[source]
        source: std::io::Error,
    },
}
