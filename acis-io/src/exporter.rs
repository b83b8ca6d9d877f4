use acis_core::entity::{Entity, EntityData, EntityKind, Fields};
use acis_core::graph::{EntityRef, Graph};
use acis_core::registry::ASM_HEADER_NAME;
use acis_core::value::{Encoding, Origin, RawValue, Value};
use chrono::Local;

use crate::fields::{FieldWriter, portable};
use crate::header::{AcisHeader, DATE_FORMAT, acis_version_string, asm_version_string};
use crate::policy::{self, Presence};
use crate::record::Record;
use crate::sab;
use crate::{ExportError, ExportOptions};

/// 从根实体体出发的深度优先先序遍历，返回按首次访问排列的实体。
///
/// 子节点顺序：属性、pattern、布局中的指针字段、尾随字段中的指针。
pub(crate) fn walk(
    graph: &Graph,
    bodies: &[EntityRef],
    drop_attributes: bool,
) -> Result<Vec<EntityRef>, ExportError> {
    let mut seen = vec![false; graph.len()];
    let mut order = Vec::new();
    let mut stack: Vec<(EntityRef, EntityRef)> = bodies
        .iter()
        .rev()
        .map(|body| (*body, EntityRef::NONE))
        .collect();

    while let Some((id, referrer)) = stack.pop() {
        let Some(index) = id.index() else {
            continue;
        };
        let Some(entity) = graph.get(id) else {
            return Err(ExportError::DanglingReference {
                entity_type: graph.type_name(referrer).to_string(),
                index,
            });
        };
        if seen[index] || entity.is_deleted() {
            continue;
        }
        seen[index] = true;
        order.push(id);

        let mut children = Vec::new();
        if !drop_attributes {
            children.push(entity.attributes);
        }
        children.push(entity.pattern);
        children.extend(entity.data_refs());
        stack.extend(
            children
                .into_iter()
                .rev()
                .filter(|child| !child.is_none())
                .map(|child| (child, id)),
        );
    }
    Ok(order)
}

/// 编码全部记录；任何一条失败则整体失败，不产生部分输出。
pub(crate) fn encode_records(
    graph: &Graph,
    bodies: &[EntityRef],
    version: u32,
    encoding: Encoding,
    options: &ExportOptions,
) -> Result<(AcisHeader, Vec<Record>), ExportError> {
    options.policy.check_export(version)?;
    for body in bodies {
        if graph.kind(*body) != Some(EntityKind::Body) {
            return Err(ExportError::InvalidRoot {
                index: body.index().map_or(-1, |index| index as i64),
                found: graph.type_name(*body).to_string(),
            });
        }
    }

    let asm = policy::is_asm(version);
    let offset = i64::from(asm);
    let order = walk(graph, bodies, options.drop_attributes)?;
    let mut ordinals: Vec<Option<i64>> = vec![None; graph.len()];
    for (position, id) in order.iter().enumerate() {
        if let Some(index) = id.index() {
            ordinals[index] = Some(position as i64 + offset);
        }
    }
    let ordinal = |target: EntityRef| -> i64 {
        target
            .index()
            .and_then(|index| ordinals.get(index).copied().flatten())
            .unwrap_or(-1)
    };

    let mut records = Vec::with_capacity(order.len() + 1);
    let asm_version = asm_version_string(version).map(str::to_string);
    if let Some(asm_version) = &asm_version {
        let mut writer = FieldWriter::new(encoding, version, ASM_HEADER_NAME, &ordinal);
        writer.ptr(EntityRef::NONE)?;
        writer.int(-1)?;
        writer.string(asm_version);
        records.push(Record::new(ASM_HEADER_NAME, writer.finish()));
    }
    for id in &order {
        if let Some(entity) = graph.get(*id) {
            records.push(encode_entity(entity, version, encoding, options, &ordinal)?);
        }
    }

    let header = AcisHeader {
        version,
        n_records: records.len() as u32,
        n_entities: bodies.len() as u32,
        flags: 0,
        product_id: options.product_id.clone(),
        acis_version: acis_version_string(version),
        creation_date: options
            .creation_date
            .clone()
            .unwrap_or_else(|| Local::now().format(DATE_FORMAT).to_string()),
        units_in_mm: options.units_in_mm,
        asm_version,
    };
    Ok((header, records))
}

fn encode_entity(
    entity: &Entity,
    version: u32,
    encoding: Encoding,
    options: &ExportOptions,
    ordinal: &dyn Fn(EntityRef) -> i64,
) -> Result<Record, ExportError> {
    let type_name = entity.type_name();
    let not_representable = |field: &'static str| ExportError::FieldNotRepresentable {
        entity_type: type_name.to_string(),
        field,
        version,
    };
    let mut writer = FieldWriter::new(encoding, version, type_name, ordinal);

    writer.ptr(if options.drop_attributes {
        EntityRef::NONE
    } else {
        entity.attributes
    })?;
    if policy::has_history(version) {
        writer.int(entity.history)?;
    } else if entity.history != -1 {
        return Err(not_representable("history"));
    }
    if policy::has_pattern(entity.kind(), version) {
        writer.ptr(entity.pattern)?;
    } else if !entity.pattern.is_none() {
        return Err(not_representable("pattern"));
    }

    write_data(&mut writer, &entity.data, version, encoding)?;
    if let Some(extra) = &entity.extra {
        check_preserved(type_name, &extra.values, extra.origin, version, encoding)?;
        writer.raw(&extra.values)?;
    }
    let record = Record::new(type_name, writer.finish());
    if encoding == Encoding::Sab {
        check_type_names(&record, version)?;
    }
    Ok(record)
}

/// 二进制类型名的每一段只有一字节长度前缀。
fn check_type_names(record: &Record, version: u32) -> Result<(), ExportError> {
    let nested = record.values.iter().filter_map(|value| match value {
        Value::TypeName(name) => Some(name.as_str()),
        _ => None,
    });
    for name in std::iter::once(record.name.as_str()).chain(nested) {
        if let Some(part) = sab::oversized_part(name) {
            return Err(ExportError::EntityNotRepresentable {
                entity_type: record.name.clone(),
                version,
                reason: format!(
                    "类型名段长度 {} 超过二进制上限 {}",
                    part.len(),
                    sab::MAX_TYPE_NAME_PART
                ),
            });
        }
    }
    Ok(())
}

/// 只编码实体数据部分（不含属性、历史标签与 pattern 前缀）。
pub fn encode_data(
    data: &EntityData,
    version: u32,
    encoding: Encoding,
    ordinal: impl Fn(EntityRef) -> i64,
) -> Result<Vec<RawValue>, ExportError> {
    let mut writer = FieldWriter::new(encoding, version, data.type_name(), &ordinal);
    write_data(&mut writer, data, version, encoding)?;
    Ok(writer.finish())
}

fn write_data(
    writer: &mut FieldWriter<'_>,
    data: &EntityData,
    version: u32,
    encoding: Encoding,
) -> Result<(), ExportError> {
    match data {
        EntityData::Opaque(opaque) => {
            check_preserved(&opaque.type_name, &opaque.values, opaque.origin, version, encoding)?;
            writer.raw(&opaque.values)
        }
        EntityData::Deleted => Err(ExportError::EntityNotRepresentable {
            entity_type: data.type_name().to_string(),
            version,
            reason: "已删除记录的占位节点不能写出".to_string(),
        }),
        known => {
            let (Some(kind), Some(fields)) = (known.kind(), known.to_fields()) else {
                return Ok(());
            };
            write_fields(writer, kind, &fields, version, encoding)
        }
    }
}

/// 目标版本存在的字段按布局写出，缺失的补缺省值；
/// 内存中有值但目标版本无法表达的字段导致导出失败，仅二进制字段写文本时丢弃。
fn write_fields(
    writer: &mut FieldWriter<'_>,
    kind: EntityKind,
    fields: &Fields,
    version: u32,
    encoding: Encoding,
) -> Result<(), ExportError> {
    for spec in policy::layout(kind) {
        let value = fields.get(spec.name);
        if spec.present_in(version, encoding, fields) {
            match value {
                Some(value) => writer.write(spec, value)?,
                None => writer.write(spec, &spec.default_value())?,
            }
        } else if value.is_some() && !matches!(spec.presence, Presence::SabOnly | Presence::WhenSet(_)) {
            return Err(ExportError::FieldNotRepresentable {
                entity_type: kind.name().to_string(),
                field: spec.name,
                version,
            });
        }
    }
    Ok(())
}

/// 原样保留的值只能在相同版本下、且能转换到目标编码时写出。
fn check_preserved(
    type_name: &str,
    values: &[Value],
    origin: Origin,
    version: u32,
    encoding: Encoding,
) -> Result<(), ExportError> {
    if origin.version != version {
        return Err(ExportError::EntityNotRepresentable {
            entity_type: type_name.to_string(),
            version,
            reason: format!("保留的字段来自版本 {}", origin.version),
        });
    }
    if origin.encoding != encoding && !portable(values, encoding) {
        return Err(ExportError::EntityNotRepresentable {
            entity_type: type_name.to_string(),
            version,
            reason: format!(
                "保留的 {} 字段无法转换为 {}",
                origin.encoding.name(),
                encoding.name()
            ),
        });
    }
    Ok(())
}
