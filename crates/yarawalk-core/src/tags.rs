//! 标签链游标
use std::borrow::Cow;
use std::ffi::{c_char, CStr};
use std::marker::PhantomData;
use std::ptr;

use crate::cursor::{Chain, Cursor};
use crate::ffi::RawRule;

/// 标签块中的位置：指向某个 NUL 结尾标签的起始字节
///
/// 一条规则的全部标签共享同一块连续内存，游标只前移，不做分配。
#[derive(Debug, Clone, Copy)]
pub struct TagCursor<'r> {
    pos: *const c_char,
    _rule: PhantomData<&'r RawRule>,
}

/// 规则标签迭代器
pub type Tags<'r> = Chain<TagCursor<'r>>;

impl<'r> TagCursor<'r> {
    /// # Safety
    /// `pos` 为空，或指向在 `'r` 内有效、以空串终止的标签块。
    pub unsafe fn from_ptr(pos: *const c_char) -> Self {
        Self { pos, _rule: PhantomData }
    }

    /// 末尾位置
    pub fn end() -> Self {
        Self { pos: ptr::null(), _rule: PhantomData }
    }

    pub fn is_end(&self) -> bool {
        if self.pos.is_null() { return true; }
        // SAFETY: 非空位置总指向标签块内的一个字节
        unsafe { *self.pos == 0 }
    }
}

impl<'r> Cursor for TagCursor<'r> {
    type Item = Cow<'r, str>;

    fn advance(self) -> Option<(Cow<'r, str>, Self)> {
        if self.pos.is_null() {
            return None;
        }
        // SAFETY: 构造时保证 pos 位于 'r 内有效的标签块中
        let text = unsafe { CStr::from_ptr(self.pos) };
        let len = text.to_bytes().len();
        if len == 0 {
            return None;
        }
        // 跳过文本及其 NUL 终止符；块末的空串保证新位置仍在块内
        let next = unsafe { self.pos.add(len + 1) };
        Some((text.to_string_lossy(), Self { pos: next, _rule: PhantomData }))
    }
}
