//! 错误类型
//!
//! 遍历中遇到空句柄不是错误，而是空结果；这里只描述资源问题与引擎失败。
use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::compiler::{CompileDiagnostic, ErrorCode};

#[derive(Debug, Error)]
pub enum Error {
    /// 文件无法打开，或不是普通文件
    #[error("could not open {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// 文件已打开但映射失败
    #[error("could not map {}: {source}", .path.display())]
    Map {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// 模块导入描述符为空
    #[error("module import descriptor is absent")]
    ModuleAbsent,

    /// 模块名无法表示为 C 字符串
    #[error("invalid module name {0:?}")]
    InvalidModuleName(String),

    /// 规则文件无法打开
    #[error("could not open rules file {}: {source}", .path.display())]
    RulesFileOpen {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// 引擎返回了非零状态
    #[error("engine reported status {code}")]
    Engine {
        code: i32,
        diagnostics: Vec<CompileDiagnostic>,
    },
}

impl Error {
    /// 与引擎错误码对齐的数值，便于跨语言边界传递
    pub fn code(&self) -> i32 {
        match self {
            Error::Io { .. } | Error::RulesFileOpen { .. } => ErrorCode::CouldNotOpenFile as i32,
            Error::Map { .. } => ErrorCode::CouldNotMapFile as i32,
            Error::ModuleAbsent | Error::InvalidModuleName(_) => ErrorCode::InvalidArgument as i32,
            Error::Engine { code, .. } => *code,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    fn io(kind: io::ErrorKind) -> io::Error {
        io::Error::new(kind, "boom")
    }

    #[test]
    fn open_and_map_failures_carry_distinct_codes() {
        let open = Error::Io { path: "/x".into(), source: io(io::ErrorKind::NotFound) };
        let map = Error::Map { path: "/x".into(), source: io(io::ErrorKind::OutOfMemory) };
        assert_eq!(open.code(), ErrorCode::CouldNotOpenFile as i32);
        assert_eq!(map.code(), ErrorCode::CouldNotMapFile as i32);
        assert_ne!(open.code(), map.code());
        assert!(open.to_string().starts_with("could not open /x"));
        assert!(map.to_string().starts_with("could not map /x"));
    }

    #[test]
    fn argument_and_engine_codes() {
        assert_eq!(Error::ModuleAbsent.code(), ErrorCode::InvalidArgument as i32);
        assert_eq!(Error::InvalidModuleName("a\0b".into()).code(), ErrorCode::InvalidArgument as i32);
        assert_eq!(Error::Engine { code: 7, diagnostics: vec![] }.code(), 7);
    }
}
