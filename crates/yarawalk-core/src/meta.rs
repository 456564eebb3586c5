//! 规则元数据投影与游标
use std::borrow::Cow;
use std::marker::PhantomData;
use std::ptr;

use crate::cursor::{Chain, Cursor};
use crate::ffi::{self, c_text, RawMeta};

/// 元数据类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaType {
    Integer,
    String,
    Boolean,
}

impl MetaType {
    pub fn from_raw(code: i32) -> Option<Self> {
        match code {
            ffi::META_TYPE_INTEGER => Some(MetaType::Integer),
            ffi::META_TYPE_STRING => Some(MetaType::String),
            ffi::META_TYPE_BOOLEAN => Some(MetaType::Boolean),
            _ => None,
        }
    }

    pub fn as_raw(self) -> i32 {
        match self {
            MetaType::Integer => ffi::META_TYPE_INTEGER,
            MetaType::String => ffi::META_TYPE_STRING,
            MetaType::Boolean => ffi::META_TYPE_BOOLEAN,
        }
    }
}

/// 按类型解读后的元数据值
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetaValue<'r> {
    Integer(i64),
    String(Cow<'r, str>),
    Boolean(bool),
    /// 引擎给出了无法识别的类型码
    Unknown(i32),
}

/// 一条元数据（只读视图）
#[derive(Debug, Clone, Copy)]
pub struct Meta<'r> {
    raw: &'r RawMeta,
}

impl<'r> Meta<'r> {
    pub fn identifier(&self) -> Option<Cow<'r, str>> {
        // SAFETY: 引擎保证标识符在规则集生命周期内有效
        unsafe { c_text(self.raw.identifier) }
    }

    pub fn raw_type(&self) -> i32 {
        self.raw.type_
    }

    pub fn meta_type(&self) -> Option<MetaType> {
        MetaType::from_raw(self.raw.type_)
    }

    /// 文本值；非字符串类型通常为空
    pub fn string(&self) -> Option<Cow<'r, str>> {
        // SAFETY: 同上
        unsafe { c_text(self.raw.string) }
    }

    /// 整数值（布尔型以 0/1 存放）
    pub fn integer(&self) -> i64 {
        self.raw.integer
    }

    pub fn value(&self) -> MetaValue<'r> {
        match self.meta_type() {
            Some(MetaType::Integer) => MetaValue::Integer(self.raw.integer),
            Some(MetaType::Boolean) => MetaValue::Boolean(self.raw.integer != 0),
            Some(MetaType::String) => MetaValue::String(self.string().unwrap_or(Cow::Borrowed(""))),
            None => MetaValue::Unknown(self.raw.type_),
        }
    }

    /// 是否为规则内最后一条元数据
    pub fn is_last(&self) -> bool {
        ffi::meta_is_last_in_rule(self.raw)
    }
}

/// 元数据数组中的位置
#[derive(Debug, Clone, Copy)]
pub struct MetaCursor<'r> {
    pos: *const RawMeta,
    _rule: PhantomData<&'r RawMeta>,
}

/// 规则元数据迭代器
pub type Metas<'r> = Chain<MetaCursor<'r>>;

impl<'r> MetaCursor<'r> {
    /// # Safety
    /// `pos` 为空，或指向 `'r` 内有效的元数据数组，且数组末项带有末项标志。
    pub unsafe fn from_ptr(pos: *const RawMeta) -> Self {
        Self { pos, _rule: PhantomData }
    }

    pub fn end() -> Self {
        Self { pos: ptr::null(), _rule: PhantomData }
    }

    pub fn is_end(&self) -> bool {
        self.pos.is_null()
    }
}

impl<'r> Cursor for MetaCursor<'r> {
    type Item = Meta<'r>;

    fn advance(self) -> Option<(Meta<'r>, Self)> {
        // SAFETY: 构造时保证 pos 为空或指向数组内的有效元素
        let raw: &'r RawMeta = unsafe { self.pos.as_ref() }?;
        // 先检查当前项是否为末项，末项之后不再前移
        let next = if ffi::meta_is_last_in_rule(raw) {
            ptr::null()
        } else {
            unsafe { self.pos.add(1) }
        };
        Some((Meta { raw }, Self { pos: next, _rule: PhantomData }))
    }
}
