//! 文本编码（SAT）：空白分隔的记录，以 `#` 结束。

use acis_core::value::{RawValue, Value};

use crate::AcisError;
use crate::header::AcisHeader;
use crate::policy;
use crate::record::{Record, RecordReader, RecordWriter, is_end_marker};

/// 按 ACIS 的习惯格式化浮点数：常规量级用最短十进制表示，其余用科学计数法。
pub fn format_double(value: f64) -> String {
    if value == 0.0 {
        return "0".to_string();
    }
    let magnitude = value.abs();
    if (1e-5..1e16).contains(&magnitude) {
        format!("{value}")
    } else {
        format!("{value:e}")
    }
}

fn format_counted(text: &str, at_strings: bool) -> String {
    let count = text.chars().count();
    if at_strings {
        format!("@{count} {text}")
    } else {
        format!("{count} {text}")
    }
}

fn format_token(value: &RawValue, at_strings: bool) -> String {
    match value {
        Value::Int(v) | Value::Enum(v) => v.to_string(),
        Value::Double(v) => format_double(*v),
        Value::Bool(v) => v.to_string(),
        Value::Word(word) => word.clone(),
        Value::Str(text) | Value::LiteralStr(text) => format_counted(text, at_strings),
        Value::Location(p) => p.to_array().map(format_double).join(" "),
        Value::Direction(v) => v.to_array().map(format_double).join(" "),
        Value::Ptr(index) => format!("${index}"),
        Value::TypeName(name) => name.clone(),
        Value::SubtypeStart => "{".to_string(),
        Value::SubtypeEnd => "}".to_string(),
    }
}

/// 把字段值按文本编码拼接为一行（不含类型名与 `#`）。
pub fn format_values(values: &[RawValue], version: u32) -> String {
    let at_strings = policy::uses_at_strings(version);
    values
        .iter()
        .map(|value| format_token(value, at_strings))
        .collect::<Vec<_>>()
        .join(" ")
}

pub struct SatReader<'a> {
    source: &'a str,
    body: &'a str,
    pos: usize,
    line: usize,
    ended: bool,
}

impl<'a> SatReader<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            body: "",
            pos: 0,
            line: 4,
            ended: false,
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.body[self.pos..].chars().next() {
            if !ch.is_whitespace() {
                break;
            }
            if ch == '\n' {
                self.line += 1;
            }
            self.pos += ch.len_utf8();
        }
    }

    fn next_token(&mut self) -> Option<&'a str> {
        self.skip_whitespace();
        let body = self.body;
        let rest = &body[self.pos..];
        if rest.is_empty() {
            return None;
        }
        let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        self.pos += end;
        Some(&rest[..end])
    }

    /// 读取紧跟在 `@N` 之后、以一个空白分隔的 N 个字符。
    fn take_chars(&mut self, count: usize) -> Result<String, AcisError> {
        let body = self.body;
        let rest = &body[self.pos..];
        match rest.chars().next() {
            Some(ch) if ch.is_whitespace() => {}
            _ if count == 0 => return Ok(String::new()),
            _ => {
                return Err(AcisError::format(format!(
                    "第 {} 行的字符串长度前缀后缺少空白",
                    self.line
                )));
            }
        }
        let start = rest
            .char_indices()
            .nth(1)
            .map(|(index, _)| index)
            .unwrap_or(rest.len());
        let text = &rest[start..];
        let end = match text.char_indices().nth(count) {
            Some((index, _)) => index,
            None if text.chars().count() == count => text.len(),
            None => {
                return Err(AcisError::format(format!(
                    "第 {} 行的字符串声明长度 {count} 超出数据末尾",
                    self.line
                )));
            }
        };
        let value = &text[..end];
        self.line += value.matches('\n').count();
        self.pos += start + end;
        Ok(value.to_string())
    }

    fn parse_value(&mut self, token: &str) -> Result<RawValue, AcisError> {
        match token {
            "{" => return Ok(Value::SubtypeStart),
            "}" => return Ok(Value::SubtypeEnd),
            _ => {}
        }
        if let Some(index) = token.strip_prefix('$') {
            return index.parse::<i64>().map(Value::Ptr).map_err(|_| {
                AcisError::format(format!("第 {} 行的指针 \"{token}\" 无法解析", self.line))
            });
        }
        if let Some(count) = token.strip_prefix('@') {
            if let Ok(count) = count.parse::<usize>() {
                return self.take_chars(count).map(Value::Str);
            }
        }
        Ok(Value::Word(token.to_string()))
    }
}

impl RecordReader for SatReader<'_> {
    fn read_header(&mut self) -> Result<AcisHeader, AcisError> {
        let mut parts = self.source.splitn(4, '\n');
        let mut lines = [""; 3];
        for (index, slot) in lines.iter_mut().enumerate() {
            *slot = parts
                .next()
                .map(|line| line.trim_end_matches('\r'))
                .ok_or_else(|| {
                    AcisError::format(format!("文本前导不完整，缺少第 {} 行", index + 1))
                })?;
        }
        self.body = parts.next().unwrap_or("");
        self.pos = 0;
        AcisHeader::from_sat_preamble(lines)
    }

    fn next_record(&mut self) -> Result<Option<Record>, AcisError> {
        if self.ended {
            return Ok(None);
        }
        let Some(first) = self.next_token() else {
            return Ok(None);
        };

        let (sequence, name) = match first
            .strip_prefix('-')
            .and_then(|digits| digits.parse::<i64>().ok())
        {
            Some(sequence) => {
                let name = self.next_token().ok_or_else(|| {
                    AcisError::format(format!("序号 {first} 之后缺少记录类型名"))
                })?;
                (Some(sequence), name)
            }
            None => (None, first),
        };

        if is_end_marker(name) {
            self.ended = true;
            return Ok(None);
        }

        let mut values = Vec::new();
        loop {
            let token = self.next_token().ok_or_else(|| {
                AcisError::format(format!("记录 {name} 在数据末尾缺少结束符 #"))
            })?;
            if token == "#" {
                break;
            }
            values.push(self.parse_value(token)?);
        }
        Ok(Some(Record {
            sequence,
            name: name.to_string(),
            values,
        }))
    }

    fn saw_end_marker(&self) -> bool {
        self.ended
    }
}

pub struct SatWriter {
    out: String,
    at_strings: bool,
    sequence_numbers: bool,
    ordinal: usize,
}

impl SatWriter {
    pub fn new(version: u32, sequence_numbers: bool) -> Self {
        Self {
            out: String::new(),
            at_strings: policy::uses_at_strings(version),
            sequence_numbers,
            ordinal: 0,
        }
    }
}

impl RecordWriter for SatWriter {
    type Output = String;

    fn write_header(&mut self, header: &AcisHeader) {
        self.out.push_str(&header.to_sat_preamble());
    }

    fn write_record(&mut self, record: &Record) {
        self.out.push('\n');
        if self.sequence_numbers {
            self.out.push_str(&format!("-{} ", self.ordinal));
        }
        self.out.push_str(&record.name);
        for value in &record.values {
            self.out.push(' ');
            self.out.push_str(&format_token(value, self.at_strings));
        }
        self.out.push_str(" #");
        self.ordinal += 1;
    }

    fn finish(mut self, header: &AcisHeader) -> String {
        self.out.push('\n');
        self.out.push_str(header.end_marker());
        self.out.push('\n');
        self.out
    }
}
