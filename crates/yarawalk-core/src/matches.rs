//! 匹配投影：扫描上下文、匹配链游标与私有匹配过滤
//!
//! 原始链只实现一次（[`RawMatchCursor`]），公开视图 [`PublicMatches`]
//! 在其上组合过滤器，私有节点只被穿过，从不返回。
use std::iter::{Filter, FusedIterator};
use std::marker::PhantomData;
use std::ptr;

use crate::cursor::{Chain, Cursor};
use crate::ffi::{RawMatch, RawScanContext};
use crate::strings::StringDescriptor;

/// 单次扫描的上下文（借用，生命周期即扫描期）
#[derive(Debug, Clone, Copy)]
pub struct ScanContext<'c> {
    raw: Option<&'c RawScanContext>,
}

impl<'c> ScanContext<'c> {
    /// # Safety
    /// `ptr` 为空，或指向在 `'c` 内有效且不会被并发修改的扫描上下文；
    /// 其匹配表至少有 `num_strings` 个槽位。
    pub unsafe fn from_ptr(ptr: *const RawScanContext) -> Self {
        Self { raw: unsafe { ptr.as_ref() } }
    }

    pub fn absent() -> Self {
        Self { raw: None }
    }

    pub fn is_absent(&self) -> bool {
        self.raw.is_none()
    }

    /// 按字符串描述符的下标取匹配链表头；越界或上下文为空时返回末尾
    pub fn matches_head(&self, string: &StringDescriptor<'_>) -> RawMatchCursor<'c> {
        let Some(ctx) = self.raw else { return RawMatchCursor::end() };
        let idx = string.index();
        if ctx.matches.is_null() || idx >= ctx.num_strings {
            return RawMatchCursor::end();
        }
        // SAFETY: idx 已做越界检查，匹配表在 'c 内有效
        let slot = unsafe { &*ctx.matches.add(idx as usize) };
        unsafe { RawMatchCursor::from_ptr(slot.head) }
    }

    /// 公开匹配（跳过私有节点）
    pub fn matches(&self, string: &StringDescriptor<'_>) -> PublicMatches<'c> {
        PublicMatches::new(self.matches_head(string))
    }

    /// 完整匹配链（含私有节点，调试用）
    pub fn all_matches(&self, string: &StringDescriptor<'_>) -> MatchChain<'c> {
        Chain::new(self.matches_head(string))
    }
}

/// 一次匹配（只读视图）
#[derive(Debug, Clone, Copy)]
pub struct Match<'c> {
    raw: &'c RawMatch,
}

impl<'c> Match<'c> {
    /// 在被扫描数据中的字节偏移
    pub fn offset(&self) -> i64 {
        self.raw.offset
    }

    pub fn base(&self) -> i64 {
        self.raw.base
    }

    /// 记录的匹配数据长度
    pub fn length(&self) -> usize {
        usize::try_from(self.raw.data_length).unwrap_or(0)
    }

    pub fn is_private(&self) -> bool {
        self.raw.is_private
    }

    /// 零拷贝的匹配字节，借用自扫描上下文
    pub fn as_bytes(&self) -> &'c [u8] {
        let len = self.length();
        if self.raw.data.is_null() || len == 0 {
            return &[];
        }
        // SAFETY: 引擎保证 data 指向至少 data_length 字节，生命周期同上下文
        unsafe { std::slice::from_raw_parts(self.raw.data, len) }
    }

    /// 精确长度的字节拷贝，内嵌 0 字节也不丢失
    pub fn value_as_bytes(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }

    /// 文本视图：在第一个 0 字节处截断，非法 UTF-8 做有损替换
    ///
    /// 这是尽力而为的文本表示；需要无损内容时使用 [`Match::value_as_bytes`]，
    /// 是否发生截断可用 [`Match::is_text_truncated`] 判断。
    pub fn value_as_text(&self) -> String {
        let bytes = self.as_bytes();
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        String::from_utf8_lossy(&bytes[..end]).into_owned()
    }

    /// 文本视图是否因内嵌 0 字节而丢失了内容
    pub fn is_text_truncated(&self) -> bool {
        self.as_bytes().contains(&0)
    }

    /// 链上下一个公开匹配
    pub fn next_public(&self) -> Option<Match<'c>> {
        // SAFETY: next 为空或指向同一匹配链中的节点
        PublicMatches::new(unsafe { RawMatchCursor::from_ptr(self.raw.next) }).next()
    }
}

/// 匹配链中的位置
#[derive(Debug, Clone, Copy)]
pub struct RawMatchCursor<'c> {
    pos: *const RawMatch,
    _context: PhantomData<&'c RawMatch>,
}

impl<'c> RawMatchCursor<'c> {
    /// # Safety
    /// `pos` 为空，或指向 `'c` 内有效、以 `next == null` 终止的链表节点。
    pub unsafe fn from_ptr(pos: *const RawMatch) -> Self {
        Self { pos, _context: PhantomData }
    }

    pub fn end() -> Self {
        Self { pos: ptr::null(), _context: PhantomData }
    }

    pub fn is_end(&self) -> bool {
        self.pos.is_null()
    }
}

impl<'c> Cursor for RawMatchCursor<'c> {
    type Item = Match<'c>;

    fn advance(self) -> Option<(Match<'c>, Self)> {
        // SAFETY: 构造时保证
        let raw: &'c RawMatch = unsafe { self.pos.as_ref() }?;
        Some((Match { raw }, Self { pos: raw.next, _context: PhantomData }))
    }
}

/// 原始匹配链（含私有节点）
pub type MatchChain<'c> = Chain<RawMatchCursor<'c>>;

fn is_public(m: &Match<'_>) -> bool {
    !m.is_private()
}

/// 只含公开匹配的视图，保持原始相对顺序
#[derive(Debug, Clone)]
pub struct PublicMatches<'c> {
    inner: Filter<MatchChain<'c>, fn(&Match<'c>) -> bool>,
}

impl<'c> PublicMatches<'c> {
    pub fn new(head: RawMatchCursor<'c>) -> Self {
        Self { inner: Chain::new(head).filter(is_public as fn(&Match<'c>) -> bool) }
    }
}

impl<'c> Iterator for PublicMatches<'c> {
    type Item = Match<'c>;

    fn next(&mut self) -> Option<Match<'c>> {
        self.inner.next()
    }
}

impl<'c> FusedIterator for PublicMatches<'c> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ffi::{RawMatches, RawString, STRING_FLAGS_LAST_IN_RULE};
    use crate::strings::StringCursor;

    /// 测试用链表：节点装箱以固定地址
    struct TestChain {
        nodes: Vec<Box<RawMatch>>,
        _data: Vec<Vec<u8>>,
    }

    impl TestChain {
        fn new(entries: &[(i64, &str, bool)]) -> Self {
            let mut nodes: Vec<Box<RawMatch>> = Vec::new();
            let mut data = Vec::new();
            for (offset, bytes, private) in entries {
                let bytes = bytes.as_bytes().to_vec();
                nodes.push(Box::new(RawMatch {
                    base: 0,
                    offset: *offset,
                    match_length: bytes.len() as i32,
                    data_length: bytes.len() as i32,
                    data: bytes.as_ptr(),
                    prev: ptr::null_mut(),
                    next: ptr::null_mut(),
                    is_private: *private,
                }));
                data.push(bytes);
            }
            for i in 1..nodes.len() {
                let cur: *mut RawMatch = &mut *nodes[i];
                let prev: *mut RawMatch = &mut *nodes[i - 1];
                nodes[i].prev = prev;
                nodes[i - 1].next = cur;
            }
            Self { nodes, _data: data }
        }

        fn head(&self) -> RawMatchCursor<'_> {
            match self.nodes.first() {
                Some(n) => unsafe { RawMatchCursor::from_ptr(&**n) },
                None => RawMatchCursor::end(),
            }
        }
    }

    fn offsets(m: PublicMatches<'_>) -> Vec<i64> {
        m.map(|m| m.offset()).collect()
    }

    #[test]
    fn private_nodes_are_traversed_but_never_returned() {
        let chain = TestChain::new(&[(10, "x", true), (20, "y", false), (30, "z", true), (40, "w", false)]);
        assert_eq!(offsets(PublicMatches::new(chain.head())), vec![20, 40]);
        assert_eq!(Chain::new(chain.head()).count(), 4);
    }

    #[test]
    fn all_private_chain_is_empty() {
        let chain = TestChain::new(&[(1, "a", true), (2, "b", true)]);
        assert!(offsets(PublicMatches::new(chain.head())).is_empty());
    }

    #[test]
    fn trailing_private_node_does_not_leak() {
        let chain = TestChain::new(&[(1, "a", false), (2, "b", true)]);
        assert_eq!(offsets(PublicMatches::new(chain.head())), vec![1]);
    }

    #[test]
    fn next_public_skips_private_neighbours() {
        let chain = TestChain::new(&[(1, "a", false), (2, "b", true), (3, "c", true), (4, "d", false)]);
        let first = PublicMatches::new(chain.head()).next().unwrap();
        let second = first.next_public().unwrap();
        assert_eq!(second.offset(), 4);
        assert!(second.next_public().is_none());
    }

    #[test]
    fn text_view_truncates_at_embedded_zero_but_bytes_do_not() {
        let chain = TestChain::new(&[(0, "ab\0cd", false)]);
        let m = PublicMatches::new(chain.head()).next().unwrap();
        assert_eq!(m.value_as_text(), "ab");
        assert!(m.is_text_truncated());
        assert_eq!(m.value_as_bytes(), b"ab\0cd".to_vec());
        assert_eq!(m.length(), 5);
    }

    #[test]
    fn leading_zero_byte_gives_empty_text() {
        let chain = TestChain::new(&[(0, "\0xy", false)]);
        let m = PublicMatches::new(chain.head()).next().unwrap();
        assert_eq!(m.value_as_text(), "");
        assert!(m.is_text_truncated());
        assert_eq!(m.value_as_bytes(), b"\0xy".to_vec());
    }

    #[test]
    fn public_view_is_debuggable_and_clonable() {
        let chain = TestChain::new(&[(1, "a", true), (2, "b", false)]);
        let view = PublicMatches::new(chain.head());
        assert!(format!("{view:?}").contains("PublicMatches"));
        assert_eq!(offsets(view.clone()), offsets(view));
    }

    #[test]
    fn text_view_is_complete_for_clean_text() {
        let chain = TestChain::new(&[(0, "Hello world", false)]);
        let m = PublicMatches::new(chain.head()).next().unwrap();
        assert_eq!(m.value_as_text(), "Hello world");
        assert!(!m.is_text_truncated());
    }

    #[test]
    fn empty_match_data_yields_empty_views() {
        let chain = TestChain::new(&[(5, "", false)]);
        let m = PublicMatches::new(chain.head()).next().unwrap();
        assert!(m.as_bytes().is_empty());
        assert_eq!(m.value_as_text(), "");
        assert_eq!(m.offset(), 5);
    }

    #[test]
    fn context_lookup_uses_string_index_and_bounds() {
        let chain = TestChain::new(&[(10, "s", true), (50, "s", false)]);
        let head: *mut RawMatch = chain.nodes[0].as_ref() as *const RawMatch as *mut RawMatch;
        let table = [RawMatches::empty(), RawMatches { head, tail: ptr::null_mut(), count: 2 }];
        let ctx_raw = RawScanContext { flags: 0, matches: table.as_ptr(), num_strings: 2 };
        let ctx = unsafe { ScanContext::from_ptr(&ctx_raw) };

        let id = std::ffi::CString::new("$s").unwrap();
        let strings = [
            RawString { flags: 0, idx: 1, length: 0, identifier: id.as_ptr(), string: ptr::null() },
            RawString { flags: 0, idx: 0, length: 0, identifier: id.as_ptr(), string: ptr::null() },
            RawString { flags: STRING_FLAGS_LAST_IN_RULE, idx: 9, length: 0, identifier: id.as_ptr(), string: ptr::null() },
        ];
        let descs: Vec<_> = Chain::new(unsafe { StringCursor::from_ptr(strings.as_ptr()) }).collect();

        assert_eq!(offsets(ctx.matches(&descs[0])), vec![50]);
        assert_eq!(ctx.all_matches(&descs[0]).count(), 2);
        assert!(offsets(ctx.matches(&descs[1])).is_empty());
        // 越界下标视为空链
        assert!(ctx.matches_head(&descs[2]).is_end());
        // 空上下文同样是空链
        assert!(ScanContext::absent().matches_head(&descs[0]).is_end());
    }
}
