//! 两种编码共用的记录抽象。

use acis_core::value::RawValue;

use crate::AcisError;
use crate::header::AcisHeader;

/// 一条记录：类型名与按顺序排列的原始字段值，指针仍为序号。
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// 文本编码中可选的 `-N` 序号。
    pub sequence: Option<i64>,
    pub name: String,
    pub values: Vec<RawValue>,
}

impl Record {
    pub fn new(name: impl Into<String>, values: Vec<RawValue>) -> Self {
        Self {
            sequence: None,
            name: name.into(),
            values,
        }
    }
}

/// 记录读取端。`next_record` 在遇到结束标记或数据耗尽时返回 `None`。
pub trait RecordReader {
    fn read_header(&mut self) -> Result<AcisHeader, AcisError>;

    fn next_record(&mut self) -> Result<Option<Record>, AcisError>;

    /// 是否读到了显式的结束标记。
    fn saw_end_marker(&self) -> bool;

    fn read_all(&mut self) -> Result<Vec<Record>, AcisError> {
        let mut records = Vec::new();
        while let Some(record) = self.next_record()? {
            records.push(record);
        }
        Ok(records)
    }
}

/// 记录写出端。
pub trait RecordWriter {
    type Output;

    fn write_header(&mut self, header: &AcisHeader);

    fn write_record(&mut self, record: &Record);

    fn finish(self, header: &AcisHeader) -> Self::Output;
}

/// 文本与二进制共用的结束标记。
pub const END_OF_ACIS_DATA: &str = "End-of-ACIS-data";
pub const END_OF_ASM_DATA: &str = "End-of-ASM-data";
pub const BEGIN_OF_HISTORY_DATA: &str = "Begin-of-ACIS-History-Data";

pub fn is_end_marker(name: &str) -> bool {
    matches!(
        name,
        END_OF_ACIS_DATA | END_OF_ASM_DATA | BEGIN_OF_HISTORY_DATA
    )
}
