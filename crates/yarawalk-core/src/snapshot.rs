//! 扫描结果快照（TOML / JSON）
//!
//! 快照按引擎在扫描结束后呈现的样子描述规则、标签、元数据、字符串与匹配，
//! 由 [`crate::layout::NativeLayout`] 展开为原生内存布局后再经游标遍历。
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanSnapshot {
    #[serde(default)]
    pub rules: Vec<SnapshotRule>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRule {
    pub identifier: String,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metas: Vec<SnapshotMeta>,
    #[serde(default)]
    pub strings: Vec<SnapshotString>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMeta {
    pub identifier: String,
    pub value: SnapshotMetaValue,
}

/// 元数据值：按 TOML/JSON 原生类型区分
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SnapshotMetaValue {
    Boolean(bool),
    Integer(i64),
    String(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotString {
    pub identifier: String,
    #[serde(default)]
    pub matches: Vec<SnapshotMatch>,
}

/// 单次匹配；内容用 `data`（文本）或 `hex`（十六进制字节）给出
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMatch {
    pub offset: i64,
    #[serde(default)]
    pub base: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hex: Option<String>,
    #[serde(default)]
    pub private: bool,
}

impl SnapshotMatch {
    /// 匹配字节；`hex` 优先于 `data`
    pub fn bytes(&self) -> Result<Vec<u8>> {
        match (&self.hex, &self.data) {
            (Some(h), _) => hex::decode(h).with_context(|| format!("invalid hex match data at offset {}", self.offset)),
            (None, Some(d)) => Ok(d.as_bytes().to_vec()),
            (None, None) => Ok(Vec::new()),
        }
    }
}

pub fn parse_snapshot_toml(txt: &str) -> Result<ScanSnapshot> {
    Ok(toml::from_str(txt)?)
}

pub fn parse_snapshot_json(txt: &str) -> Result<ScanSnapshot> {
    Ok(serde_json::from_str(txt)?)
}

/// 按扩展名加载快照：`.json` 走 JSON，其余按 TOML
pub fn load_snapshot(path: &Path) -> Result<ScanSnapshot> {
    let txt = std::fs::read_to_string(path).with_context(|| format!("read snapshot {}", path.display()))?;
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .map_or(false, |e| e.eq_ignore_ascii_case("json"));
    let parsed = if is_json { parse_snapshot_json(&txt) } else { parse_snapshot_toml(&txt) };
    parsed.with_context(|| format!("parse snapshot {}", path.display()))
}
