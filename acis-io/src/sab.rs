//! 二进制编码（SAB）：带一字节标签的数据块序列，数值均为小端序。

use acis_core::geometry::{Point3, Vector3};
use acis_core::value::{RawValue, Value};

use crate::AcisError;
use crate::header::{AcisHeader, NORMAL_TOLERANCE, RESOLUTION_TOLERANCE};
use crate::record::{Record, RecordReader, RecordWriter, is_end_marker};

pub const SIGNATURE: &[u8] = b"ACIS BinaryFile";
pub const ASM_SIGNATURE: &[u8] = b"ASM BinaryFile4";

/// 数据块标签。
pub mod tag {
    pub const INT: u8 = 0x04;
    pub const DOUBLE: u8 = 0x06;
    pub const STR: u8 = 0x07;
    pub const TRUE: u8 = 0x0A;
    pub const FALSE: u8 = 0x0B;
    pub const PTR: u8 = 0x0C;
    pub const TYPE_NAME: u8 = 0x0D;
    pub const TYPE_NAME_PART: u8 = 0x0E;
    pub const SUBTYPE_START: u8 = 0x0F;
    pub const SUBTYPE_END: u8 = 0x10;
    pub const RECORD_END: u8 = 0x11;
    pub const LITERAL_STR: u8 = 0x12;
    pub const LOCATION: u8 = 0x13;
    pub const DIRECTION: u8 = 0x14;
    pub const ENUM: u8 = 0x15;
    /// 另一种双精度数据块，读入后按普通双精度保存。
    pub const DOUBLE_ALT: u8 = 0x17;
}

/// 类型名每一段的最大字节数。
pub const MAX_TYPE_NAME_PART: usize = u8::MAX as usize;

/// 返回第一个超出单字节长度的类型名段。
pub(crate) fn oversized_part(name: &str) -> Option<&str> {
    name.split('-').find(|part| part.len() > MAX_TYPE_NAME_PART)
}

/// 数据是否以二进制签名开头。
pub fn is_sab(data: &[u8]) -> bool {
    data.starts_with(SIGNATURE) || data.starts_with(ASM_SIGNATURE)
}

#[derive(Debug, PartialEq)]
enum Chunk {
    Value(RawValue),
    TypeNamePart(String),
    TypeName(String),
    RecordEnd,
}

struct Decoder<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn bytes(&mut self, len: usize) -> Result<&'a [u8], AcisError> {
        let data = self.data;
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= data.len())
            .ok_or_else(|| {
                AcisError::format(format!(
                    "偏移 {} 处需要 {len} 字节，但数据只剩 {} 字节",
                    self.pos,
                    data.len().saturating_sub(self.pos)
                ))
            })?;
        let slice = &data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], AcisError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.bytes(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, AcisError> {
        Ok(self.array::<1>()?[0])
    }

    fn i32(&mut self) -> Result<i32, AcisError> {
        Ok(i32::from_le_bytes(self.array()?))
    }

    fn u32(&mut self) -> Result<u32, AcisError> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    fn f64(&mut self) -> Result<f64, AcisError> {
        Ok(f64::from_le_bytes(self.array()?))
    }

    fn vec3(&mut self) -> Result<[f64; 3], AcisError> {
        Ok([self.f64()?, self.f64()?, self.f64()?])
    }

    fn string(&mut self, len: usize) -> Result<String, AcisError> {
        let offset = self.pos;
        let bytes = self.bytes(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| AcisError::format(format!("偏移 {offset} 处的字符串不是有效的 UTF-8")))
    }

    fn chunk(&mut self) -> Result<Option<Chunk>, AcisError> {
        if self.at_end() {
            return Ok(None);
        }
        let offset = self.pos;
        let chunk = match self.u8()? {
            tag::INT => Chunk::Value(Value::Int(i64::from(self.i32()?))),
            tag::DOUBLE | tag::DOUBLE_ALT => Chunk::Value(Value::Double(self.f64()?)),
            tag::STR => {
                let len = usize::from(self.u8()?);
                Chunk::Value(Value::Str(self.string(len)?))
            }
            tag::TRUE => Chunk::Value(Value::Bool(true)),
            tag::FALSE => Chunk::Value(Value::Bool(false)),
            tag::PTR => Chunk::Value(Value::Ptr(i64::from(self.i32()?))),
            tag::TYPE_NAME => {
                let len = usize::from(self.u8()?);
                Chunk::TypeName(self.string(len)?)
            }
            tag::TYPE_NAME_PART => {
                let len = usize::from(self.u8()?);
                Chunk::TypeNamePart(self.string(len)?)
            }
            tag::SUBTYPE_START => Chunk::Value(Value::SubtypeStart),
            tag::SUBTYPE_END => Chunk::Value(Value::SubtypeEnd),
            tag::RECORD_END => Chunk::RecordEnd,
            tag::LITERAL_STR => {
                let len = self.u32()? as usize;
                Chunk::Value(Value::LiteralStr(self.string(len)?))
            }
            tag::LOCATION => Chunk::Value(Value::Location(Point3::from_array(self.vec3()?))),
            tag::DIRECTION => Chunk::Value(Value::Direction(Vector3::from_array(self.vec3()?))),
            tag::ENUM => Chunk::Value(Value::Enum(i64::from(self.i32()?))),
            other => {
                return Err(AcisError::format(format!(
                    "偏移 {offset} 处出现未知的数据块标签 0x{other:02X}"
                )));
            }
        };
        Ok(Some(chunk))
    }

    /// 读取到类型名末段为止，各段以 `-` 连接。
    fn type_name(&mut self, first: String) -> Result<String, AcisError> {
        let mut parts = vec![first];
        loop {
            match self.chunk()? {
                Some(Chunk::TypeNamePart(part)) => parts.push(part),
                Some(Chunk::TypeName(part)) => {
                    parts.push(part);
                    return Ok(parts.join("-"));
                }
                _ => {
                    return Err(AcisError::format(format!(
                        "类型名 \"{}\" 未以末段结束",
                        parts.join("-")
                    )));
                }
            }
        }
    }

    fn header_string(&mut self, context: &str) -> Result<String, AcisError> {
        match self.chunk()? {
            Some(Chunk::Value(Value::Str(text) | Value::LiteralStr(text))) => Ok(text),
            _ => Err(AcisError::format(format!("二进制前导缺少{context}"))),
        }
    }

    fn header_double(&mut self, context: &str) -> Result<f64, AcisError> {
        match self.chunk()? {
            Some(Chunk::Value(Value::Double(value))) => Ok(value),
            _ => Err(AcisError::format(format!("二进制前导缺少{context}"))),
        }
    }
}

pub struct SabReader<'a> {
    decoder: Decoder<'a>,
    ended: bool,
}

impl<'a> SabReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            decoder: Decoder::new(data),
            ended: false,
        }
    }
}

impl RecordReader for SabReader<'_> {
    fn read_header(&mut self) -> Result<AcisHeader, AcisError> {
        let signature = self.decoder.bytes(SIGNATURE.len())?;
        if signature != SIGNATURE && signature != ASM_SIGNATURE {
            return Err(AcisError::format("缺少 ACIS 二进制签名"));
        }
        let mut count = |context: &str| -> Result<u32, AcisError> {
            let value = self.decoder.i32()?;
            u32::try_from(value)
                .map_err(|_| AcisError::format(format!("{context} 不能为负数（值：{value}）")))
        };
        let version = count("版本号")?;
        let n_records = count("记录数")?;
        let n_entities = count("实体数")?;
        let flags = count("标志位")?;

        let product_id = self.decoder.header_string("产品标识")?;
        let acis_version = self.decoder.header_string("ACIS 版本")?;
        let creation_date = self.decoder.header_string("创建日期")?;
        let units_in_mm = self.decoder.header_double("单位")?;
        self.decoder.header_double("分辨率容差")?;
        self.decoder.header_double("法向容差")?;

        Ok(AcisHeader {
            version,
            n_records,
            n_entities,
            flags,
            product_id,
            acis_version,
            creation_date,
            units_in_mm,
            asm_version: None,
        })
    }

    fn next_record(&mut self) -> Result<Option<Record>, AcisError> {
        if self.ended {
            return Ok(None);
        }
        let name = match self.decoder.chunk()? {
            None => return Ok(None),
            Some(Chunk::TypeName(name)) => name,
            Some(Chunk::TypeNamePart(part)) => self.decoder.type_name(part)?,
            Some(other) => {
                return Err(AcisError::format(format!(
                    "偏移 {} 处的记录未以类型名开头（{other:?}）",
                    self.decoder.pos
                )));
            }
        };
        if is_end_marker(&name) {
            self.ended = true;
            return Ok(None);
        }

        let mut values = Vec::new();
        loop {
            match self.decoder.chunk()? {
                Some(Chunk::RecordEnd) => break,
                Some(Chunk::Value(value)) => values.push(value),
                Some(Chunk::TypeName(inner)) => values.push(Value::TypeName(inner)),
                Some(Chunk::TypeNamePart(part)) => {
                    values.push(Value::TypeName(self.decoder.type_name(part)?));
                }
                None => {
                    return Err(AcisError::format(format!(
                        "记录 {name} 在数据末尾缺少结束标记"
                    )));
                }
            }
        }
        Ok(Some(Record {
            sequence: None,
            name,
            values,
        }))
    }

    fn saw_end_marker(&self) -> bool {
        self.ended
    }
}

#[derive(Default)]
pub struct SabWriter {
    out: Vec<u8>,
}

impl SabWriter {
    pub fn new() -> Self {
        Self::default()
    }

    fn i32(&mut self, value: i32) {
        self.out.extend_from_slice(&value.to_le_bytes());
    }

    fn f64(&mut self, value: f64) {
        self.out.extend_from_slice(&value.to_le_bytes());
    }

    fn tagged_i32(&mut self, tag: u8, value: i64) {
        self.out.push(tag);
        self.i32(value as i32);
    }

    fn double(&mut self, value: f64) {
        self.out.push(tag::DOUBLE);
        self.f64(value);
    }

    fn vec3(&mut self, tag: u8, coords: [f64; 3]) {
        self.out.push(tag);
        for value in coords {
            self.f64(value);
        }
    }

    fn short(&mut self, tag: u8, text: &str) {
        self.out.push(tag);
        self.out.push(text.len() as u8);
        self.out.extend_from_slice(text.as_bytes());
    }

    fn literal(&mut self, text: &str) {
        self.out.push(tag::LITERAL_STR);
        self.out
            .extend_from_slice(&(text.len() as u32).to_le_bytes());
        self.out.extend_from_slice(text.as_bytes());
    }

    /// 超过 255 字节的字符串改用 32 位长度前缀。
    fn string(&mut self, text: &str) {
        if text.len() <= usize::from(u8::MAX) {
            self.short(tag::STR, text);
        } else {
            self.literal(text);
        }
    }

    /// 类型名按 `-` 拆分，末段使用 `TYPE_NAME`，其余使用 `TYPE_NAME_PART`。
    fn type_name(&mut self, name: &str) {
        let parts: Vec<&str> = name.split('-').collect();
        let last = parts.len() - 1;
        for (index, part) in parts.iter().enumerate() {
            let tag = if index == last {
                tag::TYPE_NAME
            } else {
                tag::TYPE_NAME_PART
            };
            self.short(tag, part);
        }
    }

    fn value(&mut self, value: &RawValue) {
        match value {
            Value::Int(v) => self.tagged_i32(tag::INT, *v),
            Value::Enum(v) => self.tagged_i32(tag::ENUM, *v),
            Value::Ptr(v) => self.tagged_i32(tag::PTR, *v),
            Value::Double(v) => self.double(*v),
            Value::Bool(true) => self.out.push(tag::TRUE),
            Value::Bool(false) => self.out.push(tag::FALSE),
            Value::Word(text) | Value::Str(text) => self.string(text),
            Value::LiteralStr(text) => self.literal(text),
            Value::Location(p) => self.vec3(tag::LOCATION, p.to_array()),
            Value::Direction(v) => self.vec3(tag::DIRECTION, v.to_array()),
            Value::TypeName(name) => self.type_name(name),
            Value::SubtypeStart => self.out.push(tag::SUBTYPE_START),
            Value::SubtypeEnd => self.out.push(tag::SUBTYPE_END),
        }
    }
}

impl RecordWriter for SabWriter {
    type Output = Vec<u8>;

    fn write_header(&mut self, header: &AcisHeader) {
        let signature = if header.is_asm() {
            ASM_SIGNATURE
        } else {
            SIGNATURE
        };
        self.out.extend_from_slice(signature);
        for count in [
            header.version,
            header.n_records,
            header.n_entities,
            header.flags,
        ] {
            self.i32(count as i32);
        }
        self.string(&header.product_id);
        self.string(&header.acis_version);
        self.string(&header.creation_date);
        self.double(header.units_in_mm);
        self.double(RESOLUTION_TOLERANCE);
        self.double(NORMAL_TOLERANCE);
    }

    fn write_record(&mut self, record: &Record) {
        self.type_name(&record.name);
        for value in &record.values {
            self.value(value);
        }
        self.out.push(tag::RECORD_END);
    }

    /// 结束标记只写类型名，不带记录结束块。
    fn finish(mut self, header: &AcisHeader) -> Vec<u8> {
        self.type_name(header.end_marker());
        self.out
    }
}
