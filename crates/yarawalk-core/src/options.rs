//! 遍历选项与统计信息
use std::path::PathBuf;

/// 批量遍历选项
#[derive(Debug, Clone, Default)]
pub struct WalkOptions {
    /// 线程数：None 表示自动（等于 CPU 核数）；Some(1) 走串行
    pub threads: Option<usize>,
    /// 同时列出私有匹配（带 `private` 标记），调试用
    pub include_private: bool,
    /// 快照文件大小上限（字节）；超过则跳过
    pub max_snapshot_size: Option<u64>,
    /// 模块数据配置（TOML）；遍历期间保持绑定
    pub module_config: Option<PathBuf>,
}

/// 遍历统计信息（便于 CLI 打印）
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WalkStats {
    pub files_walked: usize,
    pub files_skipped: usize,
    pub rules_reported: usize,
    pub matches_reported: usize,
    pub modules_bound: usize,
}
