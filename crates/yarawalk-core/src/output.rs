//! yara 命令行文本输出解析（`yara -g -m -s`）
//!
//! 规则行：`Identifier [tag,tag] [id=value,...] target`；
//! 字符串行：`0xOFFSET:$id: value`，归属于最近的规则行。
use anyhow::{anyhow, bail, Result};
use regex::Regex;

use crate::report::{MatchReport, MetaReport, ReportValue, RuleReport, StringReport};

/// 逐行解析器；同一字符串标识的连续行累积到同一个字符串下
#[derive(Debug)]
pub struct OutputParser {
    rule_rx: Regex,
    string_rx: Regex,
    done: Vec<RuleReport>,
    current: Option<RuleReport>,
}

impl OutputParser {
    pub fn new() -> Result<Self> {
        Ok(Self {
            rule_rx: Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)\s*\[([^\]]*)\]\s*\[(.*)$")?,
            string_rx: Regex::new(r"^0x([0-9a-fA-F]+):(\$[A-Za-z0-9_]*): ?(.*)$")?,
            done: Vec::new(),
            current: None,
        })
    }

    pub fn on_line(&mut self, line: &str) -> Result<()> {
        let line = line.trim_end_matches(&['\r', '\n'][..]);
        if line.trim().is_empty() { return Ok(()); }
        if line.starts_with("0x") { self.on_string(line) } else { self.on_rule(line) }
    }

    /// 结束解析，返回全部规则（按出现顺序）
    pub fn finish(mut self) -> Vec<RuleReport> {
        if let Some(rule) = self.current.take() { self.done.push(rule); }
        self.done
    }

    fn on_rule(&mut self, line: &str) -> Result<()> {
        let caps = self.rule_rx.captures(line).ok_or_else(|| anyhow!("malformed rule line: {line:?}"))?;
        let tags = caps[2]
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect();
        let Some(entries) = split_meta(&caps[3]) else { bail!("unterminated metadata in rule line: {line:?}") };
        let metas = entries.iter().filter_map(|e| parse_meta(e)).collect();

        if let Some(prev) = self.current.take() { self.done.push(prev); }
        self.current = Some(RuleReport {
            identifier: caps[1].to_string(),
            namespace: None,
            tags,
            metas,
            strings: Vec::new(),
        });
        Ok(())
    }

    fn on_string(&mut self, line: &str) -> Result<()> {
        let Some(rule) = self.current.as_mut() else { bail!("string line before any rule line: {line:?}") };
        let caps = self.string_rx.captures(line).ok_or_else(|| anyhow!("malformed string line: {line:?}"))?;
        let offset = i64::from_str_radix(&caps[1], 16).map_err(|e| anyhow!("bad offset in {line:?}: {e}"))?;
        let identifier = &caps[2];
        let m = MatchReport::from_text(offset, &caps[3]);

        match rule.strings.last_mut() {
            Some(s) if s.identifier == identifier => s.matches.push(m),
            _ => rule.strings.push(StringReport { identifier: identifier.to_string(), matches: vec![m] }),
        }
        Ok(())
    }
}

/// 一次性解析完整输出
pub fn parse_output(text: &str) -> Result<Vec<RuleReport>> {
    let mut p = OutputParser::new()?;
    for line in text.lines() {
        p.on_line(line)?;
    }
    Ok(p.finish())
}

/// 按引号切分元数据段，直到引号外的 `]`；未闭合时返回 None
fn split_meta(s: &str) -> Option<Vec<String>> {
    let mut entries = Vec::new();
    let mut cur = String::new();
    let mut in_str = false;
    let mut escaped = false;
    for c in s.chars() {
        if in_str {
            cur.push(c);
            if escaped { escaped = false; } else if c == '\\' { escaped = true; } else if c == '"' { in_str = false; }
            continue;
        }
        match c {
            '"' => { in_str = true; cur.push(c); }
            ',' => entries.push(std::mem::take(&mut cur)),
            ']' => {
                if !cur.trim().is_empty() || !entries.is_empty() { entries.push(cur); }
                return Some(entries);
            }
            _ => cur.push(c),
        }
    }
    None
}

/// `id=value`；格式不对的条目返回 None 并被跳过
fn parse_meta(entry: &str) -> Option<MetaReport> {
    let (id, value) = entry.split_once('=')?;
    let id = id.trim();
    let mut chars = id.chars();
    let head_ok = chars.next().map_or(false, |c| c.is_ascii_alphabetic() || c == '_');
    if !head_ok || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') { return None; }

    let value = value.trim();
    let parsed = if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        ReportValue::String(unescape(&value[1..value.len() - 1]))
    } else if value == "true" || value == "false" {
        ReportValue::Boolean(value == "true")
    } else {
        ReportValue::Integer(parse_int(value)?)
    };
    Some(MetaReport { identifier: id.to_string(), value: Some(parsed) })
}

fn parse_int(s: &str) -> Option<i64> {
    let (neg, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let v = match digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        Some(hex) => i64::from_str_radix(hex, 16).ok()?,
        None => digits.parse::<i64>().ok()?,
    };
    Some(if neg { -v } else { v })
}

/// 还原 `\"`、`\'`、`\\`、`\n`、`\t`；其他反斜杠原样保留
pub fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' { out.push(c); continue; }
        let rep = match chars.peek() {
            Some('"') => '"',
            Some('\'') => '\'',
            Some('\\') => '\\',
            Some('n') => '\n',
            Some('t') => '\t',
            _ => { out.push(c); continue; }
        };
        chars.next();
        out.push(rep);
    }
    out
}
