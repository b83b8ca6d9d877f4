use serde::{Deserialize, Serialize};

use crate::geometry::{Point3, Vector3};
use crate::graph::EntityRef;

/// 数据编码方式。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Encoding {
    /// 文本编码（SAT）。
    Sat,
    /// 二进制编码（SAB）。
    Sab,
}

impl Encoding {
    pub fn name(self) -> &'static str {
        match self {
            Encoding::Sat => "SAT",
            Encoding::Sab => "SAB",
        }
    }
}

/// 记录中的单个原始字段值，两种编码共用。
///
/// `P` 为指针的表示形式：编解码阶段是记录序号（`i64`，`-1` 表示空），
/// 图构建完成后为 [`EntityRef`]。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value<P = EntityRef> {
    Int(i64),
    Double(f64),
    Bool(bool),
    /// SAT 中尚未按类型解释的裸词，例如数字或 `forward`。
    Word(String),
    Str(String),
    /// 以 32 位长度前缀存储的长字符串，SAB 中用于变换矩阵。
    LiteralStr(String),
    Enum(i64),
    Location(Point3),
    Direction(Vector3),
    Ptr(P),
    /// 记录内部出现的实体类型名（非记录开头）。
    TypeName(String),
    SubtypeStart,
    SubtypeEnd,
}

/// 编解码层使用的字段值，指针为记录序号。
pub type RawValue = Value<i64>;

impl<P> Value<P> {
    /// 转换指针表示，其余变体原样搬移。
    pub fn try_map_ptr<Q, E>(self, f: impl FnOnce(P) -> Result<Q, E>) -> Result<Value<Q>, E> {
        Ok(match self {
            Value::Int(v) => Value::Int(v),
            Value::Double(v) => Value::Double(v),
            Value::Bool(v) => Value::Bool(v),
            Value::Word(v) => Value::Word(v),
            Value::Str(v) => Value::Str(v),
            Value::LiteralStr(v) => Value::LiteralStr(v),
            Value::Enum(v) => Value::Enum(v),
            Value::Location(v) => Value::Location(v),
            Value::Direction(v) => Value::Direction(v),
            Value::Ptr(p) => Value::Ptr(f(p)?),
            Value::TypeName(v) => Value::TypeName(v),
            Value::SubtypeStart => Value::SubtypeStart,
            Value::SubtypeEnd => Value::SubtypeEnd,
        })
    }

    #[inline]
    pub fn as_ptr(&self) -> Option<&P> {
        match self {
            Value::Ptr(p) => Some(p),
            _ => None,
        }
    }

    #[inline]
    pub fn as_ptr_mut(&mut self) -> Option<&mut P> {
        match self {
            Value::Ptr(p) => Some(p),
            _ => None,
        }
    }

    /// 该值能否在 `target` 编码中无损写出。
    ///
    /// SAT 裸词缺少类型信息，无法写入 SAB；SAB 的布尔与枚举依赖所属类的词表，
    /// 无法写入 SAT。
    pub fn is_portable_to(&self, target: Encoding) -> bool {
        match self {
            Value::Ptr(_)
            | Value::Str(_)
            | Value::LiteralStr(_)
            | Value::TypeName(_)
            | Value::SubtypeStart
            | Value::SubtypeEnd => true,
            Value::Int(_) | Value::Double(_) | Value::Location(_) | Value::Direction(_) => true,
            Value::Word(_) => target == Encoding::Sat,
            Value::Bool(_) | Value::Enum(_) => target == Encoding::Sab,
        }
    }
}

/// 原样保留的数据来源，用于判断能否在目标版本/编码下重新写出。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Origin {
    pub version: u32,
    pub encoding: Encoding,
}

impl Origin {
    #[inline]
    pub fn new(version: u32, encoding: Encoding) -> Self {
        Self { version, encoding }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_ptr_only_touches_pointers() {
        let raw: RawValue = Value::Ptr(3);
        let mapped: Value<u32> = raw.try_map_ptr(|p| Ok::<_, ()>(p as u32 * 2)).unwrap();
        assert_eq!(mapped, Value::Ptr(6));

        let word: RawValue = Value::Word("forward".to_string());
        let mapped: Value<u32> = word.try_map_ptr(|_| Err(())).unwrap();
        assert_eq!(mapped, Value::Word("forward".to_string()));
    }

    #[test]
    fn portability_depends_on_target_encoding() {
        let word: RawValue = Value::Word("1.5".to_string());
        assert!(word.is_portable_to(Encoding::Sat));
        assert!(!word.is_portable_to(Encoding::Sab));

        let flag: RawValue = Value::Bool(true);
        assert!(flag.is_portable_to(Encoding::Sab));
        assert!(!flag.is_portable_to(Encoding::Sat));

        let ptr: RawValue = Value::Ptr(-1);
        assert!(ptr.is_portable_to(Encoding::Sat));
        assert!(ptr.is_portable_to(Encoding::Sab));
    }
}
