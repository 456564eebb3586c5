//! 模块数据配置加载（TOML）
use anyhow::{bail, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// 单个模块的数据文件
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ModuleDataEntry {
    pub name: String,
    pub path: PathBuf,
}

/// 顶层配置文件结构
#[derive(Debug, Clone, Deserialize)]
struct ModuleFile {
    #[serde(default)]
    modules: Vec<ModuleDataEntry>,
}

/// 模块名 → 数据文件，保持声明顺序
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleDataConfig {
    entries: Vec<ModuleDataEntry>,
}

impl ModuleDataConfig {
    /// 由 (模块名, 路径) 构建；空模块名跳过，重复模块名报错
    pub fn from_entries<I, N, P>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (N, P)>,
        N: Into<String>,
        P: Into<PathBuf>,
    {
        let mut seen: HashSet<String> = HashSet::new();
        let mut out = Vec::new();
        for (name, path) in entries {
            let name = name.into();
            if name.is_empty() { continue; }
            if !seen.insert(name.clone()) {
                bail!("module {name:?} is configured more than once");
            }
            out.push(ModuleDataEntry { name, path: path.into() });
        }
        Ok(Self { entries: out })
    }

    pub fn entries(&self) -> &[ModuleDataEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// 解析 TOML 文本；相对路径以 `base_dir` 为基准
pub fn parse_module_config(txt: &str, base_dir: Option<&Path>) -> Result<ModuleDataConfig> {
    let parsed: ModuleFile = toml::from_str(txt)?;
    ModuleDataConfig::from_entries(parsed.modules.into_iter().map(|e| {
        let path = match base_dir {
            Some(base) if e.path.is_relative() => base.join(&e.path),
            _ => e.path,
        };
        (e.name, path)
    }))
}

/// 从文件加载模块数据配置
pub fn load_module_config(path: &Path) -> Result<ModuleDataConfig> {
    let txt = std::fs::read_to_string(path)?;
    parse_module_config(&txt, path.parent())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_modules_in_order() {
        let cfg = parse_module_config(
            r#"
            [[modules]]
            name = "pe"
            path = "/data/pe.bin"

            [[modules]]
            name = "cuckoo"
            path = "report.json"
            "#,
            Some(Path::new("/etc/yarawalk")),
        )
        .unwrap();
        assert_eq!(cfg.len(), 2);
        assert_eq!(cfg.entries()[0].path, PathBuf::from("/data/pe.bin"));
        assert_eq!(cfg.entries()[1].name, "cuckoo");
        assert_eq!(cfg.entries()[1].path, PathBuf::from("/etc/yarawalk/report.json"));
    }

    #[test]
    fn empty_document_has_no_modules() {
        assert!(parse_module_config("", None).unwrap().is_empty());
    }

    #[test]
    fn duplicate_module_names_are_rejected() {
        let err = parse_module_config(
            r#"
            [[modules]]
            name = "pe"
            path = "a"
            [[modules]]
            name = "pe"
            path = "b"
            "#,
            None,
        )
        .unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn empty_names_are_skipped() {
        let cfg = ModuleDataConfig::from_entries([("", "a"), ("pe", "b")]).unwrap();
        assert_eq!(cfg.entries().len(), 1);
        assert_eq!(cfg.entries()[0].name, "pe");
    }

    #[test]
    fn loads_from_file_relative_to_its_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("modules.toml");
        std::fs::write(&path, "[[modules]]\nname = \"pe\"\npath = \"pe.bin\"\n").unwrap();
        let cfg = load_module_config(&path).unwrap();
        assert_eq!(cfg.entries()[0].path, dir.path().join("pe.bin"));
    }
}
