use std::path::Path;

use acis_config::{AppConfig, ExportFormat};
use acis_core::entity::EntityKind;
use acis_core::value::Encoding;
use acis_io::header::DEFAULT_PRODUCT_ID;
use acis_io::{
    AcisError, AcisFacade, AcisModel, ExportOptions, LoadOptions, ModelLoader, ModelSaver,
    VersionPolicy,
};
use tracing::debug;

fn version_policy(config: &AppConfig) -> VersionPolicy {
    VersionPolicy {
        min_export_version: config.policy.min_export_version,
        ..VersionPolicy::default()
    }
}

pub fn load_options(config: &AppConfig) -> LoadOptions {
    LoadOptions {
        validate_topology: config.policy.validate_topology,
        policy: version_policy(config),
    }
}

pub fn export_options(config: &AppConfig) -> ExportOptions {
    ExportOptions {
        product_id: config
            .export
            .product_id
            .clone()
            .unwrap_or_else(|| DEFAULT_PRODUCT_ID.to_string()),
        creation_date: None,
        units_in_mm: config.export.units_in_mm,
        sequence_numbers: config.export.sequence_numbers,
        drop_attributes: config.export.drop_attributes,
        policy: version_policy(config),
    }
}

fn facade(config: &AppConfig) -> AcisFacade {
    AcisFacade {
        load_options: load_options(config),
        export_options: export_options(config),
        version: None,
        encoding: None,
    }
}

/// 打印前导信息与拓扑统计。
pub fn info(config: &AppConfig, input: &Path) -> Result<(), AcisError> {
    let model = facade(config).load(input)?;
    let header = &model.header;
    println!("文件：{}", input.display());
    println!("编码：{}", model.encoding.name());
    println!("版本：{}（{}）", header.version, header.acis_version);
    if let Some(asm_version) = &header.asm_version {
        println!("ASM 版本：{asm_version}");
    }
    println!("产品：{}", header.product_id);
    println!("创建时间：{}", header.creation_date);
    println!("单位：{} mm", header.units_in_mm);
    println!("记录数：{}", model.graph.len());
    print_counts(&model);
    Ok(())
}

fn print_counts(model: &AcisModel) {
    let graph = &model.graph;
    println!("实体体：{}", model.bodies.len());
    for body in &model.bodies {
        let lumps: Vec<_> = graph.lumps(*body).collect();
        let shells: Vec<_> = lumps.iter().flat_map(|lump| graph.shells(*lump)).collect();
        let faces = shells.iter().flat_map(|shell| graph.faces(*shell)).count();
        println!(
            "  {body}: {} 个 lump，{} 个 shell，{faces} 个面",
            lumps.len(),
            shells.len()
        );
    }
    for kind in EntityKind::ALL {
        let count = graph
            .iter()
            .filter(|(_, entity)| entity.kind() == Some(kind))
            .count();
        if count > 0 {
            println!("  {:<16}{count}", kind.name());
        }
    }
    let opaque = graph
        .iter()
        .filter(|(_, entity)| entity.data.as_opaque().is_some())
        .count();
    if opaque > 0 {
        println!("  {:<16}{opaque}", "(未识别)");
    }
}

/// 载入后按目标版本与编码写出。未指定编码时按输出扩展名判断，再退回配置。
pub fn convert(
    config: &AppConfig,
    input: &Path,
    output: &Path,
    version: Option<u32>,
    format: Option<ExportFormat>,
) -> Result<(), AcisError> {
    let mut facade = facade(config).with_version(version.unwrap_or(config.export.version));
    let format = format.or_else(|| {
        AcisFacade::encoding_for(output)
            .is_none()
            .then_some(config.export.format)
    });
    if let Some(format) = format {
        facade = facade.with_encoding(encoding_of(format));
    }
    debug!(version = ?facade.version, encoding = ?facade.encoding, "导出参数");

    let model = facade.load(input)?;
    facade.save(&model, output)
}

fn encoding_of(format: ExportFormat) -> Encoding {
    match format {
        ExportFormat::Sat => Encoding::Sat,
        ExportFormat::Sab => Encoding::Sab,
    }
}
