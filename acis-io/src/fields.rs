//! 按字段表把原始值解释为类型化字段，以及反向写出。

use std::vec::IntoIter;

use acis_core::entity::{FieldValue, Transform};
use acis_core::geometry::{Bound, Matrix44, Point3, Vector3};
use acis_core::graph::EntityRef;
use acis_core::value::{Encoding, RawValue, Value};

use crate::policy::{FieldKind, FieldSpec};
use crate::sat::format_double;
use crate::{AcisError, ExportError};

const ROTATE: FieldKind = FieldKind::Bool {
    false_word: "no_rotate",
    true_word: "rotate",
};
const REFLECT: FieldKind = FieldKind::Bool {
    false_word: "no_reflect",
    true_word: "reflect",
};
const SHEAR: FieldKind = FieldKind::Bool {
    false_word: "no_shear",
    true_word: "shear",
};

/// 单条记录的字段读取器。
pub(crate) struct FieldReader<'r> {
    values: IntoIter<RawValue>,
    version: u32,
    encoding: Encoding,
    name: &'r str,
    ordinal: usize,
    record_count: usize,
}

impl<'r> FieldReader<'r> {
    pub(crate) fn new(
        values: Vec<RawValue>,
        version: u32,
        encoding: Encoding,
        name: &'r str,
        ordinal: usize,
        record_count: usize,
    ) -> Self {
        Self {
            values: values.into_iter(),
            version,
            encoding,
            name,
            ordinal,
            record_count,
        }
    }

    fn invalid(&self, field: &str, detail: impl std::fmt::Display) -> AcisError {
        AcisError::format(format!(
            "第 {} 条记录 {} 的字段 {field} {detail}",
            self.ordinal, self.name
        ))
    }

    fn next(&mut self, field: &str) -> Result<RawValue, AcisError> {
        self.values
            .next()
            .ok_or_else(|| self.invalid(field, "缺失"))
    }

    fn word(&mut self, field: &str) -> Result<String, AcisError> {
        match self.next(field)? {
            Value::Word(word) => Ok(word),
            other => Err(self.invalid(field, format!("期望单词，实际为 {other:?}"))),
        }
    }

    /// `-1` 以外的负数序号立即报告为解析错误。
    pub(crate) fn resolve(&self, raw: i64) -> Result<EntityRef, AcisError> {
        EntityRef::from_raw(raw).ok_or_else(|| AcisError::Resolution {
            record: self.ordinal,
            entity_type: self.name.to_string(),
            index: raw,
            count: self.record_count,
        })
    }

    pub(crate) fn ptr(&mut self, field: &str) -> Result<EntityRef, AcisError> {
        match self.next(field)? {
            Value::Ptr(raw) => self.resolve(raw),
            other => Err(self.invalid(field, format!("期望指针，实际为 {other:?}"))),
        }
    }

    pub(crate) fn int(&mut self, field: &str) -> Result<i64, AcisError> {
        match self.next(field)? {
            Value::Int(value) | Value::Enum(value) => Ok(value),
            Value::Word(word) => word
                .parse::<i64>()
                .map_err(|_| self.invalid(field, format!("解析失败（值：\"{word}\"）"))),
            other => Err(self.invalid(field, format!("期望整数，实际为 {other:?}"))),
        }
    }

    fn double(&mut self, field: &str) -> Result<f64, AcisError> {
        match self.next(field)? {
            Value::Double(value) => Ok(value),
            Value::Int(value) => Ok(value as f64),
            Value::Word(word) => word
                .parse::<f64>()
                .map_err(|_| self.invalid(field, format!("解析失败（值：\"{word}\"）"))),
            other => Err(self.invalid(field, format!("期望浮点数，实际为 {other:?}"))),
        }
    }

    fn bool(&mut self, field: &str, false_word: &str, true_word: &str) -> Result<bool, AcisError> {
        match self.next(field)? {
            Value::Bool(value) => Ok(value),
            Value::Enum(value) => Ok(value != 0),
            Value::Word(word) if word == true_word => Ok(true),
            Value::Word(word) if word == false_word => Ok(false),
            other => Err(self.invalid(
                field,
                format!("期望 {false_word}/{true_word}，实际为 {other:?}"),
            )),
        }
    }

    /// 版本 700 之前的文本字符串是长度单词加若干空白分隔的单词。
    fn string(&mut self, field: &str) -> Result<String, AcisError> {
        match self.next(field)? {
            Value::Str(text) | Value::LiteralStr(text) => Ok(text),
            Value::Word(count) if self.encoding == Encoding::Sat => {
                let count = count
                    .parse::<usize>()
                    .map_err(|_| self.invalid(field, format!("长度前缀无效（值：\"{count}\"）")))?;
                let mut text = String::new();
                while text.chars().count() < count {
                    let word = self.word(field)?;
                    if !text.is_empty() {
                        text.push(' ');
                    }
                    text.push_str(&word);
                }
                Ok(text)
            }
            other => Err(self.invalid(field, format!("期望字符串，实际为 {other:?}"))),
        }
    }

    fn bound(&mut self, field: &str) -> Result<Bound, AcisError> {
        match self.next(field)? {
            Value::Bool(true) => Ok(Bound::Infinite),
            Value::Bool(false) => Ok(Bound::Finite(self.double(field)?)),
            Value::Word(word) if word == "I" => Ok(Bound::Infinite),
            Value::Word(word) if word == "F" => Ok(Bound::Finite(self.double(field)?)),
            other => Err(self.invalid(field, format!("期望区间端点，实际为 {other:?}"))),
        }
    }

    fn vec3(&mut self, field: &str) -> Result<[f64; 3], AcisError> {
        Ok([self.double(field)?, self.double(field)?, self.double(field)?])
    }

    fn location(&mut self, field: &str) -> Result<Point3, AcisError> {
        if self.encoding == Encoding::Sab {
            return match self.next(field)? {
                Value::Location(point) => Ok(point),
                other => Err(self.invalid(field, format!("期望位置向量，实际为 {other:?}"))),
            };
        }
        self.vec3(field).map(Point3::from_array)
    }

    fn direction(&mut self, field: &str) -> Result<Vector3, AcisError> {
        if self.encoding == Encoding::Sab {
            return match self.next(field)? {
                Value::Direction(dir) => Ok(dir),
                Value::Location(point) => Ok(Vector3(point.0)),
                other => Err(self.invalid(field, format!("期望方向向量，实际为 {other:?}"))),
            };
        }
        self.vec3(field).map(Vector3::from_array)
    }

    /// 二进制中的变换是一个字面字符串，其内容与文本编码的各单词一致。
    fn transform(&mut self, field: &str) -> Result<Transform, AcisError> {
        if self.encoding == Encoding::Sab {
            let literal = match self.next(field)? {
                Value::LiteralStr(text) | Value::Str(text) => text,
                other => {
                    return Err(self.invalid(field, format!("期望字面字符串，实际为 {other:?}")));
                }
            };
            let words = literal
                .split_whitespace()
                .map(|word| Value::Word(word.to_string()))
                .collect();
            let mut inner = FieldReader::new(
                words,
                self.version,
                Encoding::Sat,
                self.name,
                self.ordinal,
                self.record_count,
            );
            let transform = inner.transform(field)?;
            let surplus = inner.values.len();
            if surplus > 0 {
                return Err(self.invalid(field, format!("的字面字符串多出 {surplus} 个单词")));
            }
            return Ok(transform);
        }

        let mut values = [0.0; 12];
        for value in &mut values {
            *value = self.double(field)?;
        }
        let row = |i: usize, w: f64| [values[i * 3], values[i * 3 + 1], values[i * 3 + 2], w];
        let matrix = Matrix44::from_rows([row(0, 0.0), row(1, 0.0), row(2, 0.0), row(3, 1.0)]);
        let scale = self.double(field)?;
        let mut flag = |kind: FieldKind| match kind {
            FieldKind::Bool {
                false_word,
                true_word,
            } => self.bool(field, false_word, true_word),
            _ => Ok(false),
        };
        Ok(Transform {
            matrix,
            scale,
            rotate: flag(ROTATE)?,
            reflect: flag(REFLECT)?,
            shear: flag(SHEAR)?,
        })
    }

    pub(crate) fn read(&mut self, spec: &FieldSpec) -> Result<FieldValue, AcisError> {
        let field = spec.name;
        Ok(match spec.kind {
            FieldKind::Ptr => FieldValue::Ptr(self.ptr(field)?),
            FieldKind::Int => FieldValue::Int(self.int(field)?),
            FieldKind::Double => FieldValue::Double(self.double(field)?),
            FieldKind::Bool {
                false_word,
                true_word,
            } => FieldValue::Bool(self.bool(field, false_word, true_word)?),
            FieldKind::Str => FieldValue::Str(self.string(field)?),
            FieldKind::Bound => FieldValue::Bound(self.bound(field)?),
            FieldKind::Location => FieldValue::Location(self.location(field)?),
            FieldKind::Direction => FieldValue::Direction(self.direction(field)?),
            FieldKind::Transform => FieldValue::Transform(self.transform(field)?),
        })
    }

    /// 剩余的原始值，指针换成实体引用。
    pub(crate) fn remaining(mut self) -> Result<Vec<Value>, AcisError> {
        let rest: Vec<RawValue> = self.values.by_ref().collect();
        rest.into_iter()
            .map(|value| value.try_map_ptr(|raw| self.resolve(raw)))
            .collect()
    }
}

/// 单条记录的字段写出器，指针通过 `ordinal` 换算为输出序号。
pub(crate) struct FieldWriter<'a> {
    values: Vec<RawValue>,
    encoding: Encoding,
    version: u32,
    type_name: &'a str,
    ordinal: &'a dyn Fn(EntityRef) -> i64,
}

impl<'a> FieldWriter<'a> {
    pub(crate) fn new(
        encoding: Encoding,
        version: u32,
        type_name: &'a str,
        ordinal: &'a dyn Fn(EntityRef) -> i64,
    ) -> Self {
        Self {
            values: Vec::new(),
            encoding,
            version,
            type_name,
            ordinal,
        }
    }

    fn fits_binary(&self, value: i64) -> Result<(), ExportError> {
        if self.encoding == Encoding::Sab && i32::try_from(value).is_err() {
            return Err(ExportError::ValueOutOfRange {
                entity_type: self.type_name.to_string(),
                value,
            });
        }
        Ok(())
    }

    pub(crate) fn ptr(&mut self, target: EntityRef) -> Result<(), ExportError> {
        let index = (self.ordinal)(target);
        self.fits_binary(index)?;
        self.values.push(Value::Ptr(index));
        Ok(())
    }

    pub(crate) fn int(&mut self, value: i64) -> Result<(), ExportError> {
        self.fits_binary(value)?;
        self.values.push(match self.encoding {
            Encoding::Sat => Value::Word(value.to_string()),
            Encoding::Sab => Value::Int(value),
        });
        Ok(())
    }

    pub(crate) fn string(&mut self, text: &str) {
        self.values.push(Value::Str(text.to_string()));
    }

    fn double(&mut self, value: f64) {
        self.values.push(match self.encoding {
            Encoding::Sat => Value::Word(format_double(value)),
            Encoding::Sab => Value::Double(value),
        });
    }

    fn bool(&mut self, value: bool, false_word: &str, true_word: &str) {
        self.values.push(match self.encoding {
            Encoding::Sat => Value::Word(if value { true_word } else { false_word }.to_string()),
            Encoding::Sab => Value::Bool(value),
        });
    }

    fn bound(&mut self, bound: Bound) {
        match (self.encoding, bound) {
            (Encoding::Sat, Bound::Infinite) => self.values.push(Value::Word("I".to_string())),
            (Encoding::Sat, Bound::Finite(value)) => {
                self.values.push(Value::Word("F".to_string()));
                self.double(value);
            }
            (Encoding::Sab, Bound::Infinite) => self.values.push(Value::Bool(true)),
            (Encoding::Sab, Bound::Finite(value)) => {
                self.values.push(Value::Bool(false));
                self.double(value);
            }
        }
    }

    fn vec3(&mut self, coords: [f64; 3], binary: impl FnOnce([f64; 3]) -> RawValue) {
        match self.encoding {
            Encoding::Sat => coords.into_iter().for_each(|value| self.double(value)),
            Encoding::Sab => self.values.push(binary(coords)),
        }
    }

    fn transform(&mut self, transform: &Transform) {
        let words = transform_words(transform);
        match self.encoding {
            Encoding::Sat => self.values.extend(words.into_iter().map(Value::Word)),
            Encoding::Sab => self.values.push(Value::LiteralStr(words.join(" "))),
        }
    }

    pub(crate) fn write(&mut self, spec: &FieldSpec, value: &FieldValue) -> Result<(), ExportError> {
        match (spec.kind, value) {
            (FieldKind::Ptr, FieldValue::Ptr(target)) => self.ptr(*target)?,
            (FieldKind::Int, FieldValue::Int(v)) => self.int(*v)?,
            (FieldKind::Double, FieldValue::Double(v)) => self.double(*v),
            (
                FieldKind::Bool {
                    false_word,
                    true_word,
                },
                FieldValue::Bool(v),
            ) => self.bool(*v, false_word, true_word),
            (FieldKind::Str, FieldValue::Str(text)) => self.string(text),
            (FieldKind::Bound, FieldValue::Bound(bound)) => self.bound(*bound),
            (FieldKind::Location, FieldValue::Location(point)) => {
                self.vec3(point.to_array(), |c| Value::Location(Point3::from_array(c)))
            }
            (FieldKind::Direction, FieldValue::Direction(dir)) => {
                self.vec3(dir.to_array(), |c| Value::Direction(Vector3::from_array(c)))
            }
            (FieldKind::Transform, FieldValue::Transform(transform)) => self.transform(transform),
            _ => {
                return Err(ExportError::EntityNotRepresentable {
                    entity_type: self.type_name.to_string(),
                    version: self.version,
                    reason: format!("字段 {} 的值类型与布局不符", spec.name),
                });
            }
        }
        Ok(())
    }

    /// 原样写出保留的值，指针换算为输出序号。
    pub(crate) fn raw(&mut self, values: &[Value]) -> Result<(), ExportError> {
        for value in values {
            let mapped = value
                .clone()
                .try_map_ptr(|target| Ok::<_, ExportError>((self.ordinal)(target)))?;
            if let Value::Ptr(index) | Value::Int(index) = mapped {
                self.fits_binary(index)?;
            }
            self.values.push(mapped);
        }
        Ok(())
    }

    pub(crate) fn finish(self) -> Vec<RawValue> {
        self.values
    }
}

/// 变换的文本形式：12 个矩阵值、缩放与三个标志单词。
pub fn transform_words(transform: &Transform) -> Vec<String> {
    let mut words = Vec::with_capacity(16);
    for row in transform.matrix.rows() {
        words.extend(row[..3].iter().map(|value| format_double(*value)));
    }
    words.push(format_double(transform.scale));
    for (kind, value) in [
        (ROTATE, transform.rotate),
        (REFLECT, transform.reflect),
        (SHEAR, transform.shear),
    ] {
        if let FieldKind::Bool {
            false_word,
            true_word,
        } = kind
        {
            words.push(if value { true_word } else { false_word }.to_string());
        }
    }
    words
}

/// 保留的原始值能否全部在目标编码中写出。
pub(crate) fn portable(values: &[Value], encoding: Encoding) -> bool {
    values.iter().all(|value| value.is_portable_to(encoding))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reader(values: Vec<RawValue>, encoding: Encoding) -> FieldReader<'static> {
        FieldReader::new(values, 700, encoding, "test", 0, 10)
    }

    fn words(text: &str) -> Vec<RawValue> {
        text.split_whitespace()
            .map(|word| Value::Word(word.to_string()))
            .collect()
    }

    #[test]
    fn text_transform_reads_sixteen_words() {
        let mut fields = reader(
            words("1 0 0 0 1 0 0 0 1 388.5 388.5 388.5 1 no_rotate no_reflect no_shear"),
            Encoding::Sat,
        );
        let transform = fields.transform("transform").expect("读取变换失败");
        assert_eq!(transform.matrix.row(3), [388.5, 388.5, 388.5, 1.0]);
        assert!(!transform.rotate && !transform.reflect && !transform.shear);
        assert_eq!(transform.scale, 1.0);
    }

    #[test]
    fn binary_transform_is_one_literal() {
        let literal = "1 0 0 0 1 0 0 0 1 0 0 0 2 rotate no_reflect shear".to_string();
        let mut fields = reader(vec![Value::LiteralStr(literal)], Encoding::Sab);
        let transform = fields.transform("transform").expect("读取变换失败");
        assert_eq!(transform.scale, 2.0);
        assert!(transform.rotate && !transform.reflect && transform.shear);
    }

    #[test]
    fn binary_transform_rejects_surplus_words() {
        let literal = "1 0 0 0 1 0 0 0 1 0 0 0 1 no_rotate no_reflect no_shear 7".to_string();
        let mut fields = reader(vec![Value::LiteralStr(literal)], Encoding::Sab);
        assert!(matches!(
            fields.transform("transform"),
            Err(AcisError::Format(_))
        ));
    }

    #[test]
    fn bounds_in_both_encodings() {
        let mut text = reader(words("I F 2.5"), Encoding::Sat);
        assert_eq!(text.bound("u").ok(), Some(Bound::Infinite));
        assert_eq!(text.bound("v").ok(), Some(Bound::Finite(2.5)));

        let mut binary = reader(
            vec![Value::Bool(false), Value::Double(-1.0), Value::Bool(true)],
            Encoding::Sab,
        );
        assert_eq!(binary.bound("u").ok(), Some(Bound::Finite(-1.0)));
        assert_eq!(binary.bound("v").ok(), Some(Bound::Infinite));
    }

    #[test]
    fn old_strings_are_reassembled_from_words() {
        let mut fields = FieldReader::new(words("9 two words"), 500, Encoding::Sat, "edge", 3, 10);
        assert_eq!(fields.string("convexity").ok(), Some("two words".to_string()));
    }

    #[test]
    fn negative_pointer_below_none_is_resolution_error() {
        let mut fields = reader(vec![Value::Ptr(-5)], Encoding::Sat);
        match fields.ptr("lump") {
            Err(AcisError::Resolution { index, count, .. }) => {
                assert_eq!(index, -5);
                assert_eq!(count, 10);
            }
            other => panic!("期望解析错误，实际为 {other:?}"),
        }
    }

    #[test]
    fn unexpected_context_word_is_format_error() {
        let mut fields = reader(words("sideways"), Encoding::Sat);
        assert!(matches!(
            fields.bool("sense", "forward", "reversed"),
            Err(AcisError::Format(_))
        ));
    }

    #[test]
    fn writer_targets_each_encoding() {
        let ordinal = |target: EntityRef| target.index().map_or(-1, |i| i as i64 + 1);
        let mut text = FieldWriter::new(Encoding::Sat, 700, "edge", &ordinal);
        text.ptr(EntityRef::new(4)).expect("写出指针失败");
        text.bool(true, "forward", "reversed");
        text.bound(Bound::Finite(0.5));
        assert_eq!(
            text.finish(),
            vec![
                Value::Ptr(5),
                Value::Word("reversed".to_string()),
                Value::Word("F".to_string()),
                Value::Word("0.5".to_string()),
            ]
        );

        let mut binary = FieldWriter::new(Encoding::Sab, 700, "vertex", &ordinal);
        assert!(matches!(
            binary.int(i64::from(i32::MAX) + 1),
            Err(ExportError::ValueOutOfRange { .. })
        ));
    }

    #[test]
    fn identity_transform_words() {
        assert_eq!(
            transform_words(&Transform::identity()).join(" "),
            "1 0 0 0 1 0 0 0 1 0 0 0 1 no_rotate no_reflect no_shear"
        );
    }
}
