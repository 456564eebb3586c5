//! 规则文件添加：外部编译器的接缝
//!
//! 编译本身由外部引擎完成，这里只负责打开规则文件、把引擎状态码
//! 转换为区分明确的失败值。
use std::fs::File;
use std::path::Path;

use tracing::{debug, error, warn};

use crate::error::{Error, Result};

/// 本 crate 用到的引擎状态码
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ErrorCode {
    Success = 0,
    InsufficientMemory = 1,
    CouldNotAttachToProcess = 2,
    CouldNotOpenFile = 3,
    CouldNotMapFile = 4,
    InvalidFile = 6,
    CorruptFile = 7,
    UnsupportedFileVersion = 8,
    InvalidRegularExpression = 9,
    InvalidHexString = 10,
    SyntaxError = 11,
    ScanTimeout = 26,
    CallbackError = 28,
    InvalidArgument = 29,
    TooManyMatches = 30,
}

impl ErrorCode {
    pub fn from_raw(code: i32) -> Option<Self> {
        use ErrorCode::*;
        let known = [
            Success, InsufficientMemory, CouldNotAttachToProcess, CouldNotOpenFile,
            CouldNotMapFile, InvalidFile, CorruptFile, UnsupportedFileVersion,
            InvalidRegularExpression, InvalidHexString, SyntaxError, ScanTimeout,
            CallbackError, InvalidArgument, TooManyMatches,
        ];
        known.into_iter().find(|c| *c as i32 == code)
    }
}

/// 编译诊断级别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorLevel {
    Error,
    Warning,
}

impl ErrorLevel {
    pub fn from_raw(level: i32) -> Option<Self> {
        match level {
            0 => Some(ErrorLevel::Error),
            1 => Some(ErrorLevel::Warning),
            _ => None,
        }
    }
}

/// 编译器回调报告的一条诊断
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileDiagnostic {
    pub level: ErrorLevel,
    /// 正在编译的文件名（字符串源为空）
    pub file_name: Option<String>,
    pub line: u64,
    pub message: String,
}

/// 外部规则编译器
///
/// 返回值为引擎状态：0 表示成功，非零为错误数或错误码。
pub trait RuleCompiler {
    fn add_file(&mut self, file: &File, namespace: Option<&str>, file_name: &str) -> i32;

    fn add_string(&mut self, source: &str, namespace: Option<&str>) -> i32;

    /// 取走自上次调用以来收集的诊断
    fn take_diagnostics(&mut self) -> Vec<CompileDiagnostic> {
        Vec::new()
    }
}

/// 打开规则文件并交给编译器
/// - 文件无法打开：`Error::RulesFileOpen`
/// - 引擎报告失败：`Error::Engine`
pub fn add_rules_file<C: RuleCompiler + ?Sized>(
    compiler: &mut C,
    path: &Path,
    namespace: Option<&str>,
    file_name: &str,
) -> Result<()> {
    let file = File::open(path).map_err(|source| {
        warn!(path = %path.display(), %source, "could not open rules file");
        Error::RulesFileOpen { path: path.to_path_buf(), source }
    })?;
    let status = compiler.add_file(&file, namespace, file_name);
    // 文件句柄在此处关闭，与编译结果无关
    drop(file);
    check_status(compiler, status)?;
    debug!(path = %path.display(), ?namespace, "rules file added");
    Ok(())
}

/// 添加内存中的规则源
pub fn add_rules_content<C: RuleCompiler + ?Sized>(
    compiler: &mut C,
    source: &str,
    namespace: Option<&str>,
) -> Result<()> {
    let status = compiler.add_string(source, namespace);
    check_status(compiler, status)
}

fn check_status<C: RuleCompiler + ?Sized>(compiler: &mut C, status: i32) -> Result<()> {
    let diagnostics = compiler.take_diagnostics();
    if status == ErrorCode::Success as i32 {
        for d in diagnostics.iter().filter(|d| d.level == ErrorLevel::Warning) {
            warn!(file = ?d.file_name, line = d.line, message = %d.message, "compiler warning");
        }
        return Ok(());
    }
    for d in &diagnostics {
        error!(file = ?d.file_name, line = d.line, level = ?d.level, message = %d.message, "compiler diagnostic");
    }
    Err(Error::Engine { code: status, diagnostics })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};

    /// 记录输入、返回预设状态的假编译器
    #[derive(Default)]
    struct FakeCompiler {
        status: i32,
        seen: Vec<String>,
        pending: Vec<CompileDiagnostic>,
    }

    impl RuleCompiler for FakeCompiler {
        fn add_file(&mut self, mut file: &File, _namespace: Option<&str>, file_name: &str) -> i32 {
            let mut text = String::new();
            file.read_to_string(&mut text).unwrap();
            self.seen.push(format!("{file_name}:{text}"));
            self.status
        }

        fn add_string(&mut self, source: &str, _namespace: Option<&str>) -> i32 {
            self.seen.push(source.to_string());
            self.status
        }

        fn take_diagnostics(&mut self) -> Vec<CompileDiagnostic> {
            std::mem::take(&mut self.pending)
        }
    }

    #[test]
    fn missing_file_is_reported_as_open_failure() {
        let mut compiler = FakeCompiler::default();
        let err = add_rules_file(&mut compiler, Path::new("/nonexistent/rules.yar"), None, "rules.yar").unwrap_err();
        assert!(matches!(err, Error::RulesFileOpen { .. }));
        assert_eq!(err.code(), ErrorCode::CouldNotOpenFile as i32);
        assert!(compiler.seen.is_empty());
    }

    #[test]
    fn readable_file_is_handed_to_the_compiler() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        write!(tmp, "rule a {{ condition: true }}").unwrap();
        let mut compiler = FakeCompiler::default();
        add_rules_file(&mut compiler, tmp.path(), Some("ns"), "a.yar").unwrap();
        assert_eq!(compiler.seen, vec!["a.yar:rule a { condition: true }"]);
    }

    #[test]
    fn engine_failure_keeps_status_and_diagnostics() {
        let mut compiler = FakeCompiler {
            status: 2,
            pending: vec![CompileDiagnostic {
                level: ErrorLevel::Error,
                file_name: None,
                line: 3,
                message: "syntax error".into(),
            }],
            ..Default::default()
        };
        match add_rules_content(&mut compiler, "rule {", None).unwrap_err() {
            Error::Engine { code, diagnostics } => {
                assert_eq!(code, 2);
                assert_eq!(diagnostics.len(), 1);
                assert_eq!(diagnostics[0].line, 3);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn codes_and_levels_decode() {
        assert_eq!(ErrorCode::from_raw(3), Some(ErrorCode::CouldNotOpenFile));
        assert_eq!(ErrorCode::from_raw(5), None);
        assert_eq!(ErrorLevel::from_raw(1), Some(ErrorLevel::Warning));
        assert_eq!(ErrorLevel::from_raw(7), None);
    }
}
