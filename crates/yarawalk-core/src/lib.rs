//! 扫描结果投影库
//!
//! 设计要点：
//! - 引擎拥有的规则、元数据、字符串描述符与匹配链以只读投影暴露，投影从不释放引擎内存。
//! - 每种原生序列只实现一个可复制的游标 + `advance`，由通用的 [`Chain`] 惰性驱动。
//! - 私有匹配在原始链上以过滤器跳过，对外只见公开匹配。
//! - 模块数据以只读映射绑定，句柄独占映射，drop 即解除。
//! - 快照 → 原生布局 → 游标遍历 → JSON 报告，批量遍历时输出顺序稳定可复现。

pub mod ffi;

mod cursor;
mod tags;
mod meta;
mod strings;
mod matches;
mod rule;
mod error;
mod compiler;
mod mapped;
mod module;
mod config;
mod snapshot;
mod layout;
mod report;
mod options;
mod batch;
mod output;

pub use cursor::{Chain, Cursor};
pub use tags::{TagCursor, Tags};
pub use meta::{Meta, MetaCursor, MetaType, MetaValue, Metas};
pub use strings::{StringCursor, StringDescriptor, Strings};
pub use matches::{Match, MatchChain, PublicMatches, RawMatchCursor, ScanContext};
pub use rule::Rule;
pub use error::{Error, Result};
pub use compiler::{add_rules_content, add_rules_file, CompileDiagnostic, ErrorCode, ErrorLevel, RuleCompiler};
pub use mapped::MappedFile;
pub use module::{bind, module_name, unbind, ModuleData, ModuleDataSet, ModuleImport, ModuleSlot};
pub use config::{load_module_config, parse_module_config, ModuleDataConfig, ModuleDataEntry};
pub use snapshot::{
    load_snapshot, parse_snapshot_json, parse_snapshot_toml, ScanSnapshot, SnapshotMatch, SnapshotMeta,
    SnapshotMetaValue, SnapshotRule, SnapshotString,
};
pub use layout::NativeLayout;
pub use report::{report_rule, write_reports, MatchReport, MetaReport, ReportValue, RuleReport, StringReport};
pub use options::{WalkOptions, WalkStats};
pub use batch::walk_and_write;
pub use output::{parse_output, unescape, OutputParser};
