//! 扫描引擎原生结构的内存布局镜像（#[repr(C)]）
//!
//! 这些结构由外部引擎创建并拥有，本 crate 只读遍历，从不释放。
//! 哨兵约定：
//! - 标签块以一个空字符串（单个 NUL）结尾；
//! - 元数据/字符串数组的最后一项带有 "last in rule" 标志位；
//! - 匹配链以 `next == null` 结尾，`is_private` 节点仅作为遍历途经点。
use std::borrow::Cow;
use std::ffi::{c_char, c_void, CStr};
use std::ptr;

/// 元数据类型码
pub const META_TYPE_INTEGER: i32 = 1;
pub const META_TYPE_STRING: i32 = 2;
pub const META_TYPE_BOOLEAN: i32 = 3;

/// 元数据数组末项标志
pub const META_FLAGS_LAST_IN_RULE: i32 = 1;
/// 字符串描述符数组末项标志
pub const STRING_FLAGS_LAST_IN_RULE: u32 = 0x1000;

/// 编译后的规则
#[repr(C)]
#[derive(Debug)]
pub struct RawRule {
    pub flags: i32,
    pub identifier: *const c_char,
    /// 连续存放的 NUL 结尾标签，空串终止
    pub tags: *const c_char,
    pub metas: *const RawMeta,
    pub strings: *const RawString,
    /// 命名空间名称（可为空）
    pub ns: *const c_char,
}

/// 规则元数据项
#[repr(C)]
#[derive(Debug)]
pub struct RawMeta {
    pub identifier: *const c_char,
    pub string: *const c_char,
    pub integer: i64,
    pub type_: i32,
    pub flags: i32,
}

/// 规则字符串描述符；`idx` 为扫描上下文匹配表下标
#[repr(C)]
#[derive(Debug)]
pub struct RawString {
    pub flags: u32,
    pub idx: u32,
    pub length: i32,
    pub identifier: *const c_char,
    pub string: *const u8,
}

/// 单个匹配节点（双向链表，按时间正序）
#[repr(C)]
#[derive(Debug)]
pub struct RawMatch {
    pub base: i64,
    pub offset: i64,
    pub match_length: i32,
    pub data_length: i32,
    pub data: *const u8,
    pub prev: *mut RawMatch,
    pub next: *mut RawMatch,
    pub is_private: bool,
}

/// 匹配表中的一个槽位：某个字符串描述符的匹配链
#[repr(C)]
#[derive(Debug)]
pub struct RawMatches {
    pub head: *mut RawMatch,
    pub tail: *mut RawMatch,
    pub count: i32,
}

impl RawMatches {
    /// 空槽位
    pub const fn empty() -> Self {
        Self { head: ptr::null_mut(), tail: ptr::null_mut(), count: 0 }
    }
}

/// 单次扫描的上下文
#[repr(C)]
#[derive(Debug)]
pub struct RawScanContext {
    pub flags: i32,
    /// 匹配表首地址，按 `RawString::idx` 索引
    pub matches: *const RawMatches,
    /// 匹配表槽位数，仅用于下标越界检查
    pub num_strings: u32,
}

/// 模块导入描述符，引擎在扫描前交给调用方填充模块数据
#[repr(C)]
#[derive(Debug)]
pub struct RawModuleImport {
    pub module_name: *const c_char,
    pub module_data: *mut c_void,
    pub module_data_size: usize,
}

/// 引擎谓词：元数据是否为规则内最后一项
#[inline]
pub fn meta_is_last_in_rule(meta: &RawMeta) -> bool {
    meta.flags & META_FLAGS_LAST_IN_RULE != 0
}

/// 引擎谓词：字符串描述符是否为规则内最后一项
#[inline]
pub fn string_is_last_in_rule(string: &RawString) -> bool {
    string.flags & STRING_FLAGS_LAST_IN_RULE != 0
}

/// 读取可能为空的 C 字符串（非法 UTF-8 做有损替换）
///
/// # Safety
/// `ptr` 为空，或指向在 `'a` 内有效的 NUL 结尾字符串。
pub(crate) unsafe fn c_text<'a>(ptr: *const c_char) -> Option<Cow<'a, str>> {
    if ptr.is_null() {
        return None;
    }
    // SAFETY: 由调用方保证
    Some(unsafe { CStr::from_ptr(ptr) }.to_string_lossy())
}
