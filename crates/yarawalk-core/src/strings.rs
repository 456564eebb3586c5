//! 规则字符串描述符投影与游标
use std::borrow::Cow;
use std::marker::PhantomData;
use std::ptr;

use crate::cursor::{Chain, Cursor};
use crate::ffi::{self, c_text, RawString};
use crate::matches::{PublicMatches, ScanContext};

/// 规则中的一个命名子模式
#[derive(Debug, Clone, Copy)]
pub struct StringDescriptor<'r> {
    raw: &'r RawString,
}

impl<'r> StringDescriptor<'r> {
    pub fn identifier(&self) -> Option<Cow<'r, str>> {
        // SAFETY: 引擎保证标识符在规则集生命周期内有效
        unsafe { c_text(self.raw.identifier) }
    }

    /// 在扫描上下文匹配表中的下标
    pub fn index(&self) -> u32 {
        self.raw.idx
    }

    pub fn is_last(&self) -> bool {
        ffi::string_is_last_in_rule(self.raw)
    }

    /// 该字符串在 `context` 中的公开匹配
    pub fn matches<'c>(&self, context: ScanContext<'c>) -> PublicMatches<'c> {
        context.matches(self)
    }
}

/// 字符串描述符数组中的位置
#[derive(Debug, Clone, Copy)]
pub struct StringCursor<'r> {
    pos: *const RawString,
    _rule: PhantomData<&'r RawString>,
}

/// 规则字符串迭代器
pub type Strings<'r> = Chain<StringCursor<'r>>;

impl<'r> StringCursor<'r> {
    /// # Safety
    /// `pos` 为空，或指向 `'r` 内有效的描述符数组，且数组末项带有末项标志。
    pub unsafe fn from_ptr(pos: *const RawString) -> Self {
        Self { pos, _rule: PhantomData }
    }

    pub fn end() -> Self {
        Self { pos: ptr::null(), _rule: PhantomData }
    }

    pub fn is_end(&self) -> bool {
        self.pos.is_null()
    }
}

impl<'r> Cursor for StringCursor<'r> {
    type Item = StringDescriptor<'r>;

    fn advance(self) -> Option<(StringDescriptor<'r>, Self)> {
        // SAFETY: 构造时保证 pos 为空或指向数组内的有效元素
        let raw: &'r RawString = unsafe { self.pos.as_ref() }?;
        let next = if ffi::string_is_last_in_rule(raw) {
            ptr::null()
        } else {
            unsafe { self.pos.add(1) }
        };
        Some((StringDescriptor { raw }, Self { pos: next, _rule: PhantomData }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;

    fn raw(identifier: &CString, idx: u32, last: bool) -> RawString {
        RawString {
            flags: if last { ffi::STRING_FLAGS_LAST_IN_RULE } else { 0 },
            idx,
            length: 0,
            identifier: identifier.as_ptr(),
            string: ptr::null(),
        }
    }

    #[test]
    fn yields_identifiers_and_indices_in_order() {
        let (a, b) = (CString::new("$a").unwrap(), CString::new("$b").unwrap());
        let strings = [raw(&a, 7, false), raw(&b, 8, true)];
        let items: Vec<(String, u32)> = Chain::new(unsafe { StringCursor::from_ptr(strings.as_ptr()) })
            .map(|s| (s.identifier().unwrap().into_owned(), s.index()))
            .collect();
        assert_eq!(items, vec![("$a".to_string(), 7), ("$b".to_string(), 8)]);
    }

    #[test]
    fn only_the_final_entry_is_flagged_last() {
        let s = CString::new("$s").unwrap();
        let strings = [raw(&s, 0, false), raw(&s, 1, false), raw(&s, 2, true)];
        let flags: Vec<bool> = Chain::new(unsafe { StringCursor::from_ptr(strings.as_ptr()) })
            .map(|d| d.is_last())
            .collect();
        assert_eq!(flags, vec![false, false, true]);
    }

    #[test]
    fn other_flags_do_not_terminate() {
        let a = CString::new("$a").unwrap();
        let mut first = raw(&a, 0, false);
        first.flags = 0x1 | 0x20;
        let strings = [first, raw(&a, 1, true)];
        let count = Chain::new(unsafe { StringCursor::from_ptr(strings.as_ptr()) }).count();
        assert_eq!(count, 2);
    }

    #[test]
    fn absent_head_yields_nothing() {
        assert!(StringCursor::end().is_end());
        assert!(StringCursor::end().advance().is_none());
    }
}
