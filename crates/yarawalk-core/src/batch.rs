//! 批量遍历主流程与并行调度
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::load_module_config;
use crate::layout::NativeLayout;
use crate::module::ModuleDataSet;
use crate::options::{WalkOptions, WalkStats};
use crate::report::{report_rule, RuleReport};
use crate::snapshot::load_snapshot;

/// 遍历目录中的快照文件，并将每个文件的规则报告以 JSON 数组流式写入 `out`
///
/// 稳定性保证：文件按文件名排序，并行时由 writer 按原始顺序重排后输出。
/// 每项形如 `{"file": 名称, "rules": [...]}`；无法读取或超限的快照跳过并计数。
pub fn walk_and_write(input_dir: &Path, out: &mut dyn Write, opts: &WalkOptions) -> Result<WalkStats> {
    let mut stats = WalkStats::default();

    // 模块数据在整个遍历期间保持绑定
    let modules = match &opts.module_config {
        Some(path) => {
            let config = load_module_config(path).with_context(|| format!("load module config {}", path.display()))?;
            ModuleDataSet::bind_all(&config).context("bind module data")?
        }
        None => ModuleDataSet::default(),
    };
    stats.modules_bound = modules.len();

    let files = collect_snapshots(input_dir);
    let threads = opts.threads.unwrap_or_else(num_cpus::get);
    info!(files = files.len(), threads, modules = modules.len(), "walking snapshots");

    let mut w = ItemWriter::new(out)?;
    if threads > 1 && files.len() > 1 {
        walk_parallel(&files, &mut w, opts, &mut stats, threads)?;
    } else {
        for path in &files {
            let res = walk_one(path, opts);
            w.write(path, res, &mut stats)?;
        }
    }
    w.finish()?;

    drop(modules);
    Ok(stats)
}

/// 收集单层目录下的 `.toml` / `.json` 快照，按文件名排序
fn collect_snapshots(input_dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = vec![];
    for entry in WalkDir::new(input_dir).min_depth(1).max_depth(1) {
        let entry = match entry { Ok(e) => e, Err(_) => continue };
        if !entry.file_type().is_file() { continue; }
        let is_snapshot = entry
            .path()
            .extension()
            .and_then(|e| e.to_str())
            .map_or(false, |e| e.eq_ignore_ascii_case("toml") || e.eq_ignore_ascii_case("json"));
        if is_snapshot { files.push(entry.into_path()); }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    files
}

/// 处理单个快照：加载、展开为原生布局、经游标生成报告
///
/// 布局在本函数内创建并释放，只有自有的报告离开当前线程。
fn walk_one(path: &Path, opts: &WalkOptions) -> Result<Vec<RuleReport>> {
    if let Some(max) = opts.max_snapshot_size {
        let md = std::fs::metadata(path)?;
        if md.len() > max { anyhow::bail!("snapshot is {} bytes, limit is {max}", md.len()); }
    }
    let snapshot = load_snapshot(path)?;
    let layout = NativeLayout::build(&snapshot).with_context(|| format!("lay out {}", path.display()))?;
    let ctx = layout.context();
    Ok(layout.rules().map(|r| report_rule(&r, ctx, opts.include_private)).collect())
}

/// 并行调度：
/// - Rayon 线程池并行处理快照
/// - 当前线程作为 writer，按 idx 重排后流式输出，保证稳定顺序
fn walk_parallel(
    files: &[PathBuf],
    w: &mut ItemWriter<'_>,
    opts: &WalkOptions,
    stats: &mut WalkStats,
    threads: usize,
) -> Result<()> {
    use crossbeam_channel as channel;
    use rayon::prelude::*;

    type Msg = (usize /*idx*/, Result<Vec<RuleReport>>);

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .context("build rayon pool")?;

    std::thread::scope(|s| -> Result<()> {
        // rx 归 writer 所有：writer 出错返回时随之释放，worker 的发送立即失败而不会阻塞
        let (tx, rx) = channel::bounded::<Msg>(256);
        s.spawn(move || {
            pool.install(|| {
                files.par_iter().enumerate().for_each(|(idx, path)| {
                    let _ = tx.send((idx, walk_one(path, opts)));
                });
            });
            // tx 在此处释放，writer 随之收到关闭信号
        });

        let mut next_idx: usize = 0;
        let mut buffer: BTreeMap<usize, Result<Vec<RuleReport>>> = BTreeMap::new();
        while let Ok((idx, res)) = rx.recv() {
            buffer.insert(idx, res);
            while let Some(res) = buffer.remove(&next_idx) {
                w.write(&files[next_idx], res, stats)?;
                next_idx += 1;
            }
        }
        debug!(written = next_idx, pending = buffer.len(), "parallel walk drained");
        Ok(())
    })
}

/// JSON 数组的流式写出端
struct ItemWriter<'w> {
    out: &'w mut dyn Write,
    first: bool,
}

impl<'w> ItemWriter<'w> {
    fn new(out: &'w mut dyn Write) -> Result<Self> {
        write!(out, "[")?;
        Ok(Self { out, first: true })
    }

    fn write(&mut self, path: &Path, res: Result<Vec<RuleReport>>, stats: &mut WalkStats) -> Result<()> {
        let file_name = match path.file_name().and_then(|s| s.to_str()) {
            Some(s) => s,
            None => { stats.files_skipped += 1; return Ok(()); }
        };
        let reports = match res {
            Ok(r) => r,
            Err(e) => {
                warn!(file = file_name, error = %format!("{e:#}"), "snapshot skipped");
                stats.files_skipped += 1;
                return Ok(());
            }
        };
        stats.files_walked += 1;
        stats.rules_reported += reports.len();
        stats.matches_reported += reports.iter().map(RuleReport::match_count).sum::<usize>();

        if !self.first { write!(self.out, ",")?; } else { self.first = false; }
        let item = serde_json::json!({ "file": file_name, "rules": reports });
        serde_json::to_writer(&mut *self.out, &item)?;
        Ok(())
    }

    fn finish(self) -> Result<()> {
        write!(self.out, "]")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RULE: &str = r#"
        [[rules]]
        identifier = "r"
        [[rules.strings]]
        identifier = "$s"
        matches = [{ offset = 10, data = "x", private = true }, { offset = 50, data = "y" }]
    "#;

    fn fixture() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.toml"), RULE).unwrap();
        std::fs::write(dir.path().join("a.json"), r#"{"rules":[{"identifier":"j","tags":["t"]}]}"#).unwrap();
        std::fs::write(dir.path().join("c.toml"), "not = [valid").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
        dir
    }

    fn run(dir: &Path, opts: &WalkOptions) -> (serde_json::Value, WalkStats) {
        let mut out: Vec<u8> = Vec::new();
        let stats = walk_and_write(dir, &mut out, opts).unwrap();
        (serde_json::from_slice(&out).unwrap(), stats)
    }

    #[test]
    fn serial_walk_is_sorted_and_skips_bad_files() {
        let dir = fixture();
        let (json, stats) = run(dir.path(), &WalkOptions { threads: Some(1), ..Default::default() });
        let files: Vec<&str> = json.as_array().unwrap().iter().map(|i| i["file"].as_str().unwrap()).collect();
        assert_eq!(files, vec!["a.json", "b.toml"]);
        assert_eq!(json[1]["rules"][0]["strings"][0]["matches"][0]["offset"], 50);
        assert_eq!(stats.files_walked, 2);
        assert_eq!(stats.files_skipped, 1);
        assert_eq!(stats.rules_reported, 2);
        assert_eq!(stats.matches_reported, 1);
    }

    #[test]
    fn parallel_walk_matches_serial_output() {
        let dir = fixture();
        for i in 0..20 {
            std::fs::write(dir.path().join(format!("z{i:02}.toml")), RULE).unwrap();
        }
        let (serial, s1) = run(dir.path(), &WalkOptions { threads: Some(1), ..Default::default() });
        let (parallel, s2) = run(dir.path(), &WalkOptions { threads: Some(4), ..Default::default() });
        assert_eq!(serial, parallel);
        assert_eq!(s1, s2);
    }

    #[test]
    fn size_limit_skips_large_snapshots() {
        let dir = fixture();
        let opts = WalkOptions { threads: Some(1), max_snapshot_size: Some(50), ..Default::default() };
        let (json, stats) = run(dir.path(), &opts);
        assert_eq!(json.as_array().unwrap().len(), 1);
        assert_eq!(stats.files_skipped, 2);
    }

    #[test]
    fn include_private_lists_every_node() {
        let dir = fixture();
        let opts = WalkOptions { threads: Some(1), include_private: true, ..Default::default() };
        let (json, stats) = run(dir.path(), &opts);
        assert_eq!(json[1]["rules"][0]["strings"][0]["matches"][0]["private"], true);
        assert_eq!(stats.matches_reported, 2);
    }

    #[test]
    fn module_config_is_bound_for_the_run() {
        let dir = fixture();
        let data_dir = tempfile::tempdir().unwrap();
        std::fs::write(data_dir.path().join("pe.bin"), b"MZ").unwrap();
        let cfg = data_dir.path().join("modules.toml");
        std::fs::write(&cfg, "[[modules]]\nname = \"pe\"\npath = \"pe.bin\"\n").unwrap();
        let opts = WalkOptions { threads: Some(1), module_config: Some(cfg), ..Default::default() };
        let (_, stats) = run(dir.path(), &opts);
        assert_eq!(stats.modules_bound, 1);
    }

    #[test]
    fn missing_module_data_fails_the_run() {
        let dir = fixture();
        let data_dir = tempfile::tempdir().unwrap();
        let cfg = data_dir.path().join("modules.toml");
        std::fs::write(&cfg, "[[modules]]\nname = \"pe\"\npath = \"missing.bin\"\n").unwrap();
        let opts = WalkOptions { module_config: Some(cfg), ..Default::default() };
        assert!(walk_and_write(dir.path(), &mut Vec::<u8>::new(), &opts).is_err());
    }
}
