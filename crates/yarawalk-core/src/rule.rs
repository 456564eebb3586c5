//! 规则投影
use std::borrow::Cow;

use crate::cursor::Chain;
use crate::ffi::{c_text, RawRule};
use crate::meta::{MetaCursor, Metas};
use crate::strings::{StringCursor, Strings};
use crate::tags::{TagCursor, Tags};

/// 编译后规则的只读投影
///
/// 规则由规则集拥有，投影从不修改或释放它。空句柄是合法状态：
/// 所有访问器返回缺省值（`None` 或空游标），不会报错。
#[derive(Debug, Clone, Copy)]
pub struct Rule<'r> {
    raw: Option<&'r RawRule>,
}

impl<'r> Rule<'r> {
    /// # Safety
    /// `ptr` 为空，或指向在 `'r` 内有效的规则，其标签块、元数据数组与
    /// 字符串数组遵守引擎的哨兵约定。
    pub unsafe fn from_ptr(ptr: *const RawRule) -> Self {
        Self { raw: unsafe { ptr.as_ref() } }
    }

    pub fn absent() -> Self {
        Self { raw: None }
    }

    pub fn is_absent(&self) -> bool {
        self.raw.is_none()
    }

    pub fn identifier(&self) -> Option<Cow<'r, str>> {
        let raw = self.raw?;
        // SAFETY: from_ptr 的约定
        unsafe { c_text(raw.identifier) }
    }

    /// 所属命名空间
    pub fn namespace(&self) -> Option<Cow<'r, str>> {
        let raw = self.raw?;
        unsafe { c_text(raw.ns) }
    }

    pub fn tags_head(&self) -> TagCursor<'r> {
        match self.raw {
            Some(raw) => unsafe { TagCursor::from_ptr(raw.tags) },
            None => TagCursor::end(),
        }
    }

    pub fn metas_head(&self) -> MetaCursor<'r> {
        match self.raw {
            Some(raw) => unsafe { MetaCursor::from_ptr(raw.metas) },
            None => MetaCursor::end(),
        }
    }

    pub fn strings_head(&self) -> StringCursor<'r> {
        match self.raw {
            Some(raw) => unsafe { StringCursor::from_ptr(raw.strings) },
            None => StringCursor::end(),
        }
    }

    pub fn tags(&self) -> Tags<'r> {
        Chain::new(self.tags_head())
    }

    pub fn metas(&self) -> Metas<'r> {
        Chain::new(self.metas_head())
    }

    pub fn strings(&self) -> Strings<'r> {
        Chain::new(self.strings_head())
    }
}
