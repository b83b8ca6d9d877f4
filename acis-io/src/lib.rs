use std::fs;
use std::path::{Path, PathBuf};

use acis_core::graph::{EntityRef, Graph, TopologyError};
use acis_core::value::Encoding;
use serde::Serialize;
use thiserror::Error;
use tracing::info;

mod exporter;
mod fields;
pub mod header;
mod loader;
pub mod policy;
pub mod record;
pub mod sab;
pub mod sat;

pub use exporter::encode_data;
pub use fields::transform_words;
pub use header::AcisHeader;
pub use policy::VersionPolicy;
pub use sab::is_sab;

use record::RecordWriter;
use sab::{SabReader, SabWriter};
use sat::{SatReader, SatWriter};

#[derive(Debug, Error)]
pub enum AcisError {
    #[error("invalid ACIS data: {0}")]
    Format(String),
    #[error(
        "record {record} ({entity_type}) references index {index}, but only {count} records exist"
    )]
    Resolution {
        record: usize,
        entity_type: String,
        index: i64,
        count: usize,
    },
    #[error("unsupported ACIS version {0}")]
    UnsupportedVersion(u32),
    #[error(transparent)]
    Export(#[from] ExportError),
    #[error("broken topology: {0}")]
    Topology(#[from] TopologyError),
    #[error("failed to read file {path:?}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write file {path:?}: {source}")]
    WriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl AcisError {
    pub(crate) fn format(message: impl Into<String>) -> Self {
        Self::Format(message.into())
    }
}

/// 导出失败的原因。导出在写出任何字节之前完成全部检查。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExportError {
    #[error("ACIS version {version} is below the minimum export version {minimum}")]
    VersionTooOld { version: u32, minimum: u32 },
    #[error("unknown ACIS export version {0}")]
    UnknownVersion(u32),
    #[error("field `{field}` of {entity_type} cannot be represented in ACIS version {version}")]
    FieldNotRepresentable {
        entity_type: String,
        field: &'static str,
        version: u32,
    },
    #[error("{entity_type} cannot be exported as ACIS version {version}: {reason}")]
    EntityNotRepresentable {
        entity_type: String,
        version: u32,
        reason: String,
    },
    #[error("export root {index} is a {found}, not a body")]
    InvalidRoot { index: i64, found: String },
    #[error("{entity_type} references missing entity {index}")]
    DanglingReference { entity_type: String, index: usize },
    #[error("value {value} of {entity_type} does not fit a 32-bit binary field")]
    ValueOutOfRange { entity_type: String, value: i64 },
}

/// 载入结果：前导、实体图与作为根的实体体。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AcisModel {
    pub header: AcisHeader,
    pub encoding: Encoding,
    pub graph: Graph,
    pub bodies: Vec<EntityRef>,
}

impl AcisModel {
    /// 以相同的实体体导出为文本。
    pub fn to_sat(&self, version: u32, options: &ExportOptions) -> Result<String, AcisError> {
        export_sat_with(&self.graph, &self.bodies, version, options)
    }

    pub fn to_sab(&self, version: u32, options: &ExportOptions) -> Result<Vec<u8>, AcisError> {
        export_sab_with(&self.graph, &self.bodies, version, options)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadOptions {
    /// 解析完成后检查环闭合、链表终止与伙伴对称。
    pub validate_topology: bool,
    pub policy: VersionPolicy,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            validate_topology: true,
            policy: VersionPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExportOptions {
    pub product_id: String,
    /// 未指定时使用当前本地时间。
    pub creation_date: Option<String>,
    pub units_in_mm: f64,
    /// 文本记录前写出 `-N` 序号。
    pub sequence_numbers: bool,
    /// 不写出也不遍历属性实体。
    pub drop_attributes: bool,
    pub policy: VersionPolicy,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            product_id: header::DEFAULT_PRODUCT_ID.to_string(),
            creation_date: None,
            units_in_mm: 1.0,
            sequence_numbers: false,
            drop_attributes: false,
            policy: VersionPolicy::default(),
        }
    }
}

/// 载入 SAT 文本或 SAB 二进制数据，按签名自动判断编码。
pub fn load(data: impl AsRef<[u8]>) -> Result<AcisModel, AcisError> {
    load_with(data.as_ref(), &LoadOptions::default())
}

pub fn load_with(data: &[u8], options: &LoadOptions) -> Result<AcisModel, AcisError> {
    if is_sab(data) {
        let mut reader = SabReader::new(data);
        return loader::load_from(&mut reader, Encoding::Sab, options);
    }
    let text = std::str::from_utf8(data)
        .map_err(|_| AcisError::format("数据既没有 SAB 签名，也不是有效的 UTF-8 文本"))?;
    if text.trim().is_empty() {
        return Err(AcisError::format("数据为空"));
    }
    let mut reader = SatReader::new(text);
    loader::load_from(&mut reader, Encoding::Sat, options)
}

fn write_with<W: RecordWriter>(
    mut writer: W,
    graph: &Graph,
    bodies: &[EntityRef],
    version: u32,
    encoding: Encoding,
    options: &ExportOptions,
) -> Result<W::Output, AcisError> {
    let (header, records) = exporter::encode_records(graph, bodies, version, encoding, options)?;
    writer.write_header(&header);
    for record in &records {
        writer.write_record(record);
    }
    info!(
        version,
        encoding = encoding.name(),
        records = records.len(),
        bodies = bodies.len(),
        "导出 ACIS 数据"
    );
    Ok(writer.finish(&header))
}

/// 把从 `bodies` 可达的实体导出为 SAT 文本。
pub fn export_sat(graph: &Graph, bodies: &[EntityRef], version: u32) -> Result<String, AcisError> {
    export_sat_with(graph, bodies, version, &ExportOptions::default())
}

pub fn export_sat_with(
    graph: &Graph,
    bodies: &[EntityRef],
    version: u32,
    options: &ExportOptions,
) -> Result<String, AcisError> {
    let writer = SatWriter::new(version, options.sequence_numbers);
    write_with(writer, graph, bodies, version, Encoding::Sat, options)
}

/// 把从 `bodies` 可达的实体导出为 SAB 二进制。
pub fn export_sab(graph: &Graph, bodies: &[EntityRef], version: u32) -> Result<Vec<u8>, AcisError> {
    export_sab_with(graph, bodies, version, &ExportOptions::default())
}

pub fn export_sab_with(
    graph: &Graph,
    bodies: &[EntityRef],
    version: u32,
    options: &ExportOptions,
) -> Result<Vec<u8>, AcisError> {
    write_with(SabWriter::new(), graph, bodies, version, Encoding::Sab, options)
}

pub trait ModelLoader {
    fn load(&self, path: &Path) -> Result<AcisModel, AcisError>;
}

pub trait ModelSaver {
    fn save(&self, model: &AcisModel, path: &Path) -> Result<(), AcisError>;
}

/// 文件读写入口，按扩展名（`.sat` / `.sab`）选择编码。
#[derive(Debug, Clone, Default)]
pub struct AcisFacade {
    pub load_options: LoadOptions,
    pub export_options: ExportOptions,
    /// 导出版本；未指定时沿用模型载入时的版本。
    pub version: Option<u32>,
    /// 强制使用的导出编码；未指定时按扩展名判断。
    pub encoding: Option<Encoding>,
}

impl AcisFacade {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_version(mut self, version: u32) -> Self {
        self.version = Some(version);
        self
    }

    pub fn with_encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = Some(encoding);
        self
    }

    /// 根据扩展名判断编码，大小写不敏感。
    pub fn encoding_for(path: &Path) -> Option<Encoding> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "sat" => Some(Encoding::Sat),
            "sab" => Some(Encoding::Sab),
            _ => None,
        }
    }
}

impl ModelLoader for AcisFacade {
    fn load(&self, path: &Path) -> Result<AcisModel, AcisError> {
        let data = fs::read(path).map_err(|source| AcisError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        load_with(&data, &self.load_options)
    }
}

impl ModelSaver for AcisFacade {
    fn save(&self, model: &AcisModel, path: &Path) -> Result<(), AcisError> {
        let encoding = self.encoding.or_else(|| Self::encoding_for(path)).ok_or_else(|| {
            AcisError::format(format!("无法从扩展名判断 {:?} 的编码", path))
        })?;
        let version = self.version.unwrap_or(model.header.version);
        let bytes = match encoding {
            Encoding::Sat => model.to_sat(version, &self.export_options)?.into_bytes(),
            Encoding::Sab => model.to_sab(version, &self.export_options)?,
        };
        fs::write(path, bytes).map_err(|source| AcisError::WriteError {
            path: path.to_path_buf(),
            source,
        })
    }
}
