//! 规则遍历结果（自有、可序列化）
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::io::Write;

use crate::matches::{Match, ScanContext};
use crate::meta::MetaValue;
use crate::rule::Rule;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleReport {
    pub identifier: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub tags: Vec<String>,
    pub metas: Vec<MetaReport>,
    pub strings: Vec<StringReport>,
}

impl RuleReport {
    /// 报告中的匹配总数
    pub fn match_count(&self) -> usize {
        self.strings.iter().map(|s| s.matches.len()).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaReport {
    pub identifier: String,
    /// 类型码无法识别时为 null
    pub value: Option<ReportValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReportValue {
    Boolean(bool),
    Integer(i64),
    String(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StringReport {
    pub identifier: String,
    pub matches: Vec<MatchReport>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchReport {
    pub offset: i64,
    pub length: usize,
    /// 文本视图（首个 0 字节处截断）
    pub text: String,
    /// 文本视图是否丢失了内容
    pub truncated: bool,
    /// 完整字节的十六进制
    pub hex: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub private: bool,
}

impl MatchReport {
    pub fn from_match(m: &Match<'_>) -> Self {
        Self {
            offset: m.offset(),
            length: m.length(),
            text: m.value_as_text(),
            truncated: m.is_text_truncated(),
            hex: hex::encode(m.as_bytes()),
            private: m.is_private(),
        }
    }

    /// 由纯文本构造（如解析 yara 文本输出时）
    pub fn from_text(offset: i64, text: &str) -> Self {
        Self {
            offset,
            length: text.len(),
            text: text.to_string(),
            truncated: false,
            hex: hex::encode(text.as_bytes()),
            private: false,
        }
    }
}

fn report_value(v: MetaValue<'_>) -> Option<ReportValue> {
    match v {
        MetaValue::Integer(i) => Some(ReportValue::Integer(i)),
        MetaValue::Boolean(b) => Some(ReportValue::Boolean(b)),
        MetaValue::String(s) => Some(ReportValue::String(s.into_owned())),
        MetaValue::Unknown(_) => None,
    }
}

/// 经游标遍历一条规则；`include_private` 时私有匹配也列出（带标记）
pub fn report_rule(rule: &Rule<'_>, ctx: ScanContext<'_>, include_private: bool) -> RuleReport {
    let metas = rule
        .metas()
        .map(|m| MetaReport {
            identifier: m.identifier().map(|s| s.into_owned()).unwrap_or_default(),
            value: report_value(m.value()),
        })
        .collect();

    let strings = rule
        .strings()
        .map(|s| {
            let matches = if include_private {
                ctx.all_matches(&s).map(|m| MatchReport::from_match(&m)).collect()
            } else {
                s.matches(ctx).map(|m| MatchReport::from_match(&m)).collect()
            };
            StringReport { identifier: s.identifier().map(|i| i.into_owned()).unwrap_or_default(), matches }
        })
        .collect();

    RuleReport {
        identifier: rule.identifier().map(|s| s.into_owned()).unwrap_or_default(),
        namespace: rule.namespace().map(|s| s.into_owned()),
        tags: rule.tags().map(|t| t.into_owned()).collect(),
        metas,
        strings,
    }
}

/// 以 JSON 数组流式写出报告，返回写出的条数
pub fn write_reports<'a, I>(reports: I, out: &mut dyn Write) -> Result<usize>
where
    I: IntoIterator<Item = &'a RuleReport>,
{
    write!(out, "[")?;
    let mut n = 0;
    for r in reports {
        if n > 0 { write!(out, ",")?; }
        serde_json::to_writer(&mut *out, r)?;
        n += 1;
    }
    write!(out, "]")?;
    Ok(n)
}
