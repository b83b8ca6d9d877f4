use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::AcisError;
use crate::policy;
use crate::record::{END_OF_ACIS_DATA, END_OF_ASM_DATA};
use crate::sat::format_double;

pub const DEFAULT_PRODUCT_ID: &str = "acis-io ACIS Builder";
/// 创建日期格式，例如 `Mon Jan  5 10:00:00 2026`。
pub const DATE_FORMAT: &str = "%a %b %e %H:%M:%S %Y";
pub const RESOLUTION_TOLERANCE: f64 = 1e-6;
pub const NORMAL_TOLERANCE: f64 = 1e-10;

/// 文本前导第 3 行中固定的两个容差写法。
const SAT_TOLERANCES: &str = "9.9999999999999995e-007 1e-010";

/// 版本号对应的 ACIS 版本字符串。
pub fn acis_version_string(version: u32) -> String {
    match version {
        400 => "ACIS 4.00 NT".to_string(),
        700 => "ACIS 32.0 NT".to_string(),
        20800 => "ACIS 208.00 NT".to_string(),
        21800 => "ACIS 218.00 NT".to_string(),
        22300 => "ACIS 223.00 NT".to_string(),
        other => format!("ACIS {}.{:02} NT", other / 100, other % 100),
    }
}

/// `asm-header` 记录携带的 ASM 版本字符串。
pub fn asm_version_string(version: u32) -> Option<&'static str> {
    match version {
        v if v >= 22300 => Some("222.0.0.1700"),
        v if v >= policy::ASM_HEADER => Some("208.0.4.7009"),
        _ => None,
    }
}

/// 文件前导信息。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcisHeader {
    pub version: u32,
    pub n_records: u32,
    pub n_entities: u32,
    pub flags: u32,
    pub product_id: String,
    pub acis_version: String,
    /// 原样保留的创建日期字符串。
    pub creation_date: String,
    pub units_in_mm: f64,
    /// ASM 流中 `asm-header` 记录的版本字符串。
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asm_version: Option<String>,
}

impl AcisHeader {
    pub fn new(version: u32) -> Self {
        Self {
            version,
            n_records: 0,
            n_entities: 0,
            flags: 0,
            product_id: DEFAULT_PRODUCT_ID.to_string(),
            acis_version: acis_version_string(version),
            creation_date: Local::now().format(DATE_FORMAT).to_string(),
            units_in_mm: 1.0,
            asm_version: asm_version_string(version).map(str::to_string),
        }
    }

    /// 标志位 0 表示文件末尾带有历史数据。
    #[inline]
    pub fn has_history(&self) -> bool {
        self.flags & 1 != 0
    }

    #[inline]
    pub fn is_asm(&self) -> bool {
        policy::is_asm(self.version)
    }

    pub fn end_marker(&self) -> &'static str {
        if self.is_asm() {
            END_OF_ASM_DATA
        } else {
            END_OF_ACIS_DATA
        }
    }

    /// 解析创建日期；日期中的连续空格会先被规整。
    pub fn parsed_date(&self) -> Option<NaiveDateTime> {
        let normalized = self
            .creation_date
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        NaiveDateTime::parse_from_str(&normalized, DATE_FORMAT).ok()
    }

    /// 文本编码的三行前导，不含结尾换行。
    pub fn to_sat_preamble(&self) -> String {
        let prefix = if policy::uses_at_strings(self.version) {
            "@"
        } else {
            ""
        };
        let mut strings = String::new();
        for value in [&self.product_id, &self.acis_version, &self.creation_date] {
            strings.push_str(&format!("{prefix}{} {value} ", value.chars().count()));
        }
        format!(
            "{} {} {} {} \n{strings}\n{} {SAT_TOLERANCES} ",
            self.version,
            self.n_records,
            self.n_entities,
            self.flags,
            format_double(self.units_in_mm),
        )
    }

    /// 解析文本编码的三行前导。
    pub fn from_sat_preamble(lines: [&str; 3]) -> Result<Self, AcisError> {
        let mut counts = lines[0].split_whitespace();
        let version_token = counts
            .next()
            .ok_or_else(|| AcisError::format("文本前导缺少版本号"))?;
        let version = version_token
            .parse::<u32>()
            .map_err(|_| AcisError::format(format!("无法识别的版本号 \"{version_token}\"")))?;
        let mut next_count = |context: &str| -> Result<u32, AcisError> {
            match counts.next() {
                Some(token) => token.parse::<u32>().map_err(|_| {
                    AcisError::format(format!("{context} 解析失败（值：\"{token}\"）"))
                }),
                None => Ok(0),
            }
        };
        let n_records = next_count("记录数")?;
        let n_entities = next_count("实体数")?;
        let flags = next_count("标志位")?;

        let rest = lines[1];
        let (product_id, rest) = take_counted(rest, "产品标识")?;
        let (acis_version, rest) = take_counted(rest, "ACIS 版本")?;
        let (creation_date, _) = take_counted(rest, "创建日期")?;

        let units_token = lines[2]
            .split_whitespace()
            .next()
            .ok_or_else(|| AcisError::format("文本前导缺少单位"))?;
        let units_in_mm = units_token
            .parse::<f64>()
            .map_err(|_| AcisError::format(format!("单位解析失败（值：\"{units_token}\"）")))?;

        Ok(Self {
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
}

/// 读取 `[@]N <N 个字符>` 形式的字符串，返回内容与剩余部分。
fn take_counted<'a>(raw: &'a str, context: &str) -> Result<(String, &'a str), AcisError> {
    let raw = raw.trim_start();
    let body = raw.strip_prefix('@').unwrap_or(raw);
    let digits_end = body
        .find(|ch: char| !ch.is_ascii_digit())
        .unwrap_or(body.len());
    let count = body[..digits_end]
        .parse::<usize>()
        .map_err(|_| AcisError::format(format!("{context} 缺少长度前缀")))?;
    let after = &body[digits_end..];
    let text = after
        .strip_prefix(' ')
        .ok_or_else(|| AcisError::format(format!("{context} 长度前缀后缺少空格")))?;
    let end = match text.char_indices().nth(count) {
        Some((index, _)) => index,
        None if text.chars().count() == count => text.len(),
        None => {
            return Err(AcisError::format(format!(
                "{context} 声明长度 {count} 超出行尾"
            )));
        }
    };
    Ok((text[..end].to_string(), &text[end..]))
}
