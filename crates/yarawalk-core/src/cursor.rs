//! 游标抽象：可复制的位置描述 + 纯函数推进
//!
//! 各类原生序列（标签块、元数据数组、字符串数组、匹配链）只需实现 [`Cursor`]，
//! 由统一的 [`Chain`] 驱动为惰性、单遍的迭代器，从不物化整条序列。
use std::iter::FusedIterator;

/// 原生序列上的位置
pub trait Cursor: Copy {
    type Item;

    /// 读取当前元素并返回下一位置；已到末尾时返回 `None`
    fn advance(self) -> Option<(Self::Item, Self)>;
}

/// 由游标驱动的迭代器
#[derive(Debug, Clone)]
pub struct Chain<C> {
    cursor: C,
}

impl<C: Cursor> Chain<C> {
    pub fn new(cursor: C) -> Self {
        Self { cursor }
    }

    /// 当前位置（尚未被读取的下一个元素）
    pub fn cursor(&self) -> C {
        self.cursor
    }
}

impl<C: Cursor> Iterator for Chain<C> {
    type Item = C::Item;

    fn next(&mut self) -> Option<C::Item> {
        // 到达末尾时游标保持不动，后续调用继续返回 None
        let (item, next) = self.cursor.advance()?;
        self.cursor = next;
        Some(item)
    }
}

impl<C: Cursor> FusedIterator for Chain<C> {}
