//! 按记录类型名分派实体构造方式。

use crate::entity::EntityKind;

/// 已删除/历史记录使用的保留类型名。
pub const DELETED_ENTITY_NAME: &str = "null-ptr";

/// ASM 流开头携带版本字符串的记录。
pub const ASM_HEADER_NAME: &str = "asm-header";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeEntry {
    Known(EntityKind),
    /// 占据序号的空占位。
    Deleted,
    /// 未识别类型，字段原样保留。
    Opaque,
}

/// 类型名查表；未知名称不是错误。
pub fn type_for(name: &str) -> TypeEntry {
    if name == DELETED_ENTITY_NAME {
        return TypeEntry::Deleted;
    }
    match EntityKind::from_name(name) {
        Some(kind) => TypeEntry::Known(kind),
        None => TypeEntry::Opaque,
    }
}
