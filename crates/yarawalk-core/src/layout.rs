//! 快照 → 引擎原生内存布局
//!
//! 按引擎扫描结束后的样子摆放：标签块以空串结尾，元数据/字符串数组末项带标志，
//! 匹配节点组成双向链表，匹配表按全局字符串下标索引。布局独占全部内存，
//! 投影借用布局，drop 时一并释放。
use std::ffi::{c_char, CString};
use std::ops::Range;
use std::ptr;

use anyhow::{bail, Context, Result};

use crate::ffi::{
    RawMatch, RawMatches, RawMeta, RawRule, RawScanContext, RawString, META_FLAGS_LAST_IN_RULE,
    STRING_FLAGS_LAST_IN_RULE,
};
use crate::matches::ScanContext;
use crate::meta::MetaType;
use crate::rule::Rule;
use crate::snapshot::{ScanSnapshot, SnapshotMetaValue, SnapshotRule};

/// 一次扫描结果的原生布局
///
/// 内部结构互相以裸指针引用，所有缓冲区建好后不再增长，地址保持稳定。
#[derive(Debug)]
pub struct NativeLayout {
    // 以下缓冲区只为持有内存，经由裸指针访问
    #[allow(dead_code)]
    text: Vec<CString>,
    #[allow(dead_code)]
    tag_blocks: Vec<Vec<u8>>,
    #[allow(dead_code)]
    meta_arrays: Vec<Vec<RawMeta>>,
    #[allow(dead_code)]
    string_arrays: Vec<Vec<RawString>>,
    #[allow(dead_code)]
    match_data: Vec<Vec<u8>>,
    nodes: Vec<RawMatch>,
    table: Vec<RawMatches>,
    rules: Vec<RawRule>,
    context: Box<RawScanContext>,
}

impl NativeLayout {
    pub fn build(snapshot: &ScanSnapshot) -> Result<Self> {
        let mut b = Builder::default();
        let mut rules = Vec::with_capacity(snapshot.rules.len());
        for rule in &snapshot.rules {
            let raw = b.rule(rule).with_context(|| format!("rule {:?}", rule.identifier))?;
            rules.push(raw);
        }

        let Builder { text, tag_blocks, meta_arrays, string_arrays, match_data, mut nodes, ranges } = b;
        let num_strings = u32::try_from(ranges.len()).context("too many strings in snapshot")?;

        // 节点数组不再变动，此后才可以取地址互相链接
        let base = nodes.as_mut_ptr();
        let mut table = Vec::with_capacity(ranges.len());
        for range in &ranges {
            table.push(link_chain(base, range.clone()));
        }

        let context = Box::new(RawScanContext { flags: 0, matches: table.as_ptr(), num_strings });
        Ok(Self { text, tag_blocks, meta_arrays, string_arrays, match_data, nodes, table, rules, context })
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// 第 `i` 条规则；越界时为空句柄
    pub fn rule(&self, i: usize) -> Rule<'_> {
        match self.rules.get(i) {
            // SAFETY: 规则及其引用的全部内存由 self 拥有
            Some(raw) => unsafe { Rule::from_ptr(raw) },
            None => Rule::absent(),
        }
    }

    pub fn rules(&self) -> impl Iterator<Item = Rule<'_>> + '_ {
        (0..self.rules.len()).map(move |i| self.rule(i))
    }

    pub fn context(&self) -> ScanContext<'_> {
        // SAFETY: 上下文与匹配表由 self 拥有，槽位数即 num_strings
        unsafe { ScanContext::from_ptr(&*self.context) }
    }

    /// 全部字符串描述符数（匹配表槽位数）
    pub fn num_strings(&self) -> usize {
        self.table.len()
    }

    /// 匹配节点总数（含私有节点）
    pub fn num_match_nodes(&self) -> usize {
        self.nodes.len()
    }
}

/// 把 `range` 内的节点按正序链接起来，返回匹配表槽位
fn link_chain(base: *mut RawMatch, range: Range<usize>) -> RawMatches {
    if range.is_empty() {
        return RawMatches::empty();
    }
    let (start, end) = (range.start, range.end);
    for i in range {
        // SAFETY: i 在节点数组范围内
        unsafe {
            let node = base.add(i);
            (*node).prev = if i > start { base.add(i - 1) } else { ptr::null_mut() };
            (*node).next = if i + 1 < end { base.add(i + 1) } else { ptr::null_mut() };
        }
    }
    RawMatches {
        head: unsafe { base.add(start) },
        tail: unsafe { base.add(end - 1) },
        count: (end - start) as i32,
    }
}

#[derive(Default)]
struct Builder {
    text: Vec<CString>,
    tag_blocks: Vec<Vec<u8>>,
    meta_arrays: Vec<Vec<RawMeta>>,
    string_arrays: Vec<Vec<RawString>>,
    match_data: Vec<Vec<u8>>,
    nodes: Vec<RawMatch>,
    /// 每个全局字符串下标对应的节点区间
    ranges: Vec<Range<usize>>,
}

impl Builder {
    fn cstr(&mut self, s: &str, what: &str) -> Result<*const c_char> {
        let Ok(c) = CString::new(s) else { bail!("{what} {s:?} contains a NUL byte") };
        // CString 的缓冲区在堆上，放入 Vec 后指针不变
        let p = c.as_ptr();
        self.text.push(c);
        Ok(p)
    }

    fn rule(&mut self, rule: &SnapshotRule) -> Result<RawRule> {
        let identifier = self.cstr(&rule.identifier, "rule identifier")?;
        let ns = match &rule.namespace {
            Some(ns) => self.cstr(ns, "namespace")?,
            None => ptr::null(),
        };
        let tags = self.tags(&rule.tags)?;
        let metas = self.metas(rule)?;
        let strings = self.strings(rule)?;
        Ok(RawRule { flags: 0, identifier, tags, metas, strings, ns })
    }

    fn tags(&mut self, tags: &[String]) -> Result<*const c_char> {
        if tags.is_empty() { return Ok(ptr::null()); }
        let mut block = Vec::with_capacity(tags.iter().map(|t| t.len() + 1).sum::<usize>() + 1);
        for t in tags {
            if t.is_empty() { bail!("empty tag would terminate the tag list early"); }
            if t.as_bytes().contains(&0) { bail!("tag {t:?} contains a NUL byte"); }
            block.extend_from_slice(t.as_bytes());
            block.push(0);
        }
        block.push(0);
        let p = block.as_ptr().cast::<c_char>();
        self.tag_blocks.push(block);
        Ok(p)
    }

    fn metas(&mut self, rule: &SnapshotRule) -> Result<*const RawMeta> {
        if rule.metas.is_empty() { return Ok(ptr::null()); }
        let mut arr = Vec::with_capacity(rule.metas.len());
        for m in &rule.metas {
            let identifier = self.cstr(&m.identifier, "meta identifier")?;
            let (type_, string, integer) = match &m.value {
                SnapshotMetaValue::Integer(v) => (MetaType::Integer, ptr::null(), *v),
                SnapshotMetaValue::Boolean(v) => (MetaType::Boolean, ptr::null(), i64::from(*v)),
                SnapshotMetaValue::String(s) => (MetaType::String, self.cstr(s, "meta value")?, 0),
            };
            arr.push(RawMeta { identifier, string, integer, type_: type_.as_raw(), flags: 0 });
        }
        if let Some(last) = arr.last_mut() {
            last.flags |= META_FLAGS_LAST_IN_RULE;
        }
        let p = arr.as_ptr();
        self.meta_arrays.push(arr);
        Ok(p)
    }

    fn strings(&mut self, rule: &SnapshotRule) -> Result<*const RawString> {
        if rule.strings.is_empty() { return Ok(ptr::null()); }
        let mut arr = Vec::with_capacity(rule.strings.len());
        for s in &rule.strings {
            let identifier = self.cstr(&s.identifier, "string identifier")?;
            let idx = u32::try_from(self.ranges.len()).context("too many strings in snapshot")?;

            let start = self.nodes.len();
            for m in &s.matches {
                let bytes = m.bytes()?;
                let Ok(len) = i32::try_from(bytes.len()) else {
                    bail!("match data at offset {} is too long ({} bytes)", m.offset, bytes.len());
                };
                let data = if bytes.is_empty() { ptr::null() } else { bytes.as_ptr() };
                self.match_data.push(bytes);
                self.nodes.push(RawMatch {
                    base: m.base,
                    offset: m.offset,
                    match_length: len,
                    data_length: len,
                    data,
                    prev: ptr::null_mut(),
                    next: ptr::null_mut(),
                    is_private: m.private,
                });
            }
            self.ranges.push(start..self.nodes.len());

            arr.push(RawString { flags: 0, idx, length: 0, identifier, string: ptr::null() });
        }
        if let Some(last) = arr.last_mut() {
            last.flags |= STRING_FLAGS_LAST_IN_RULE;
        }
        let p = arr.as_ptr();
        self.string_arrays.push(arr);
        Ok(p)
    }
}
