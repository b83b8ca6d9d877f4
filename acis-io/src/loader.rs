use acis_core::entity::{Entity, EntityData, EntityKind, ExtraFields, Fields, Opaque};
use acis_core::graph::{EntityRef, Graph};
use acis_core::registry::{self, ASM_HEADER_NAME, TypeEntry};
use acis_core::value::{Encoding, Origin, Value};
use tracing::{debug, trace, warn};

use crate::fields::FieldReader;
use crate::header::AcisHeader;
use crate::policy;
use crate::record::{Record, RecordReader};
use crate::{AcisError, AcisModel, LoadOptions};

/// 读取前导、校验版本，然后读取全部记录并构建实体图。
pub(crate) fn load_from(
    reader: &mut dyn RecordReader,
    encoding: Encoding,
    options: &LoadOptions,
) -> Result<AcisModel, AcisError> {
    let mut header = reader.read_header()?;
    if !options.policy.supports_load(header.version) {
        return Err(AcisError::UnsupportedVersion(header.version));
    }
    let records = reader.read_all()?;
    if !reader.saw_end_marker() {
        warn!(
            version = header.version,
            encoding = encoding.name(),
            "ACIS 数据缺少结束标记"
        );
    }
    if encoding == Encoding::Sat
        && header.n_records > 0
        && header.n_records as usize != records.len()
    {
        return Err(AcisError::format(format!(
            "前导声明 {} 条记录，实际读取 {} 条",
            header.n_records,
            records.len()
        )));
    }
    debug!(
        version = header.version,
        encoding = encoding.name(),
        records = records.len(),
        "读取 ACIS 记录"
    );

    let graph = build_graph(&mut header, encoding, records)?;
    let bodies = graph.bodies();
    if options.validate_topology {
        graph.validate()?;
    }
    Ok(AcisModel {
        header,
        encoding,
        graph,
        bodies,
    })
}

/// 第一遍按记录顺序创建节点，第二遍检查并解析所有指针。
pub(crate) fn build_graph(
    header: &mut AcisHeader,
    encoding: Encoding,
    records: Vec<Record>,
) -> Result<Graph, AcisError> {
    let count = records.len();
    let mut graph = Graph::with_capacity(count);
    for (ordinal, record) in records.into_iter().enumerate() {
        if let Some(sequence) = record.sequence {
            if sequence != ordinal as i64 {
                return Err(AcisError::format(format!(
                    "记录序号 -{sequence} 与其位置 {ordinal} 不一致"
                )));
            }
        }
        let entity = match registry::type_for(&record.name) {
            TypeEntry::Deleted => Entity::deleted(),
            TypeEntry::Known(kind) => {
                decode_known(kind, record, header.version, encoding, ordinal, count)?
            }
            TypeEntry::Opaque => {
                let entity = decode_opaque(record, header.version, encoding, ordinal, count)?;
                if entity.type_name() == ASM_HEADER_NAME {
                    header.asm_version = entity.data.as_opaque().and_then(|opaque| {
                        opaque.values.iter().find_map(|value| match value {
                            Value::Str(text) | Value::LiteralStr(text) => Some(text.clone()),
                            _ => None,
                        })
                    });
                } else {
                    trace!(entity_type = entity.type_name(), ordinal, "未识别的实体类型按原样保留");
                }
                entity
            }
        };
        graph.add(entity);
    }

    for (id, entity) in graph.iter() {
        for target in entity.refs() {
            if let Some(index) = target.index() {
                if index >= count {
                    return Err(AcisError::Resolution {
                        record: id.index().unwrap_or_default(),
                        entity_type: entity.type_name().to_string(),
                        index: index as i64,
                        count,
                    });
                }
            }
        }
    }
    let detached = graph.detach_deleted();
    if detached > 0 {
        debug!(detached, "指向已删除记录的引用已置空");
    }
    Ok(graph)
}

fn decode_known(
    kind: EntityKind,
    record: Record,
    version: u32,
    encoding: Encoding,
    ordinal: usize,
    count: usize,
) -> Result<Entity, AcisError> {
    let mut reader = FieldReader::new(record.values, version, encoding, &record.name, ordinal, count);
    let attributes = reader.ptr("attributes")?;
    let history = if policy::has_history(version) {
        reader.int("history")?
    } else {
        -1
    };
    let pattern = if policy::has_pattern(Some(kind), version) {
        reader.ptr("pattern")?
    } else {
        EntityRef::NONE
    };

    let mut fields = Fields::new();
    for spec in policy::layout(kind) {
        if spec.present_in(version, encoding, &fields) {
            let value = reader.read(spec)?;
            fields.insert(spec.name, value);
        }
    }
    let data = kind.construct(&fields).map_err(|err| {
        AcisError::format(format!("第 {ordinal} 条记录 {}：{err}", record.name))
    })?;

    let rest = reader.remaining()?;
    let extra = (!rest.is_empty()).then(|| ExtraFields {
        values: rest,
        origin: Origin::new(version, encoding),
    });
    Ok(Entity {
        attributes,
        history,
        pattern,
        data,
        extra,
    })
}

/// 未识别类型只解释属性指针与历史标签，其余原样保留。
fn decode_opaque(
    record: Record,
    version: u32,
    encoding: Encoding,
    ordinal: usize,
    count: usize,
) -> Result<Entity, AcisError> {
    let mut reader = FieldReader::new(record.values, version, encoding, &record.name, ordinal, count);
    let attributes = reader.ptr("attributes")?;
    let history = if policy::has_history(version) {
        reader.int("history")?
    } else {
        -1
    };
    let values = reader.remaining()?;
    Ok(Entity {
        attributes,
        history,
        pattern: EntityRef::NONE,
        data: EntityData::Opaque(Opaque {
            type_name: record.name,
            values,
            origin: Origin::new(version, encoding),
        }),
        extra: None,
    })
}
