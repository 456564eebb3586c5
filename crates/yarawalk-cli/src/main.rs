use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use tracing::info;
use yarawalk_core::{bind, parse_output, unbind, walk_and_write, write_reports, ModuleImport, WalkOptions};

/// 命令行入口（基于 clap）
#[derive(Parser, Debug)]
#[command(name = "yarawalk", version, about = "扫描结果遍历与报告")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 遍历快照目录并生成 result.json
    Walk {
        /// 输入目录（.toml / .json 快照）
        #[arg(long)]
        input: PathBuf,

        /// 输出文件（JSON 数组）
        #[arg(long, default_value = "./result.json")]
        output: PathBuf,

        /// 线程数（"auto"=CPU 核心数）
        #[arg(long, default_value = "auto")]
        threads: String,

        /// 同时输出私有匹配（调试用）
        #[arg(long)]
        include_private: bool,

        /// 快照文件大小上限（字节）
        #[arg(long)]
        max_file_size: Option<u64>,

        /// 模块数据配置（TOML）
        #[arg(long)]
        modules: Option<PathBuf>,
    },
    /// 解析 `yara -g -m -s` 的文本输出
    Parse {
        #[arg(long)]
        input: PathBuf,

        #[arg(long, default_value = "./result.json")]
        output: PathBuf,
    },
    /// 将数据文件绑定到模块，打印大小后释放
    Bind {
        #[arg(long)]
        module: String,

        #[arg(long)]
        data: PathBuf,
    },
}

fn main() -> Result<()> {
    // 初始化日志（支持通过 RUST_LOG 控制等级，例如 info、debug）
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Walk { input, output, threads, include_private, max_file_size, modules } => {
            info!(?input, ?output, "starting walk");
            let mut out = BufWriter::new(File::create(&output).context("create output file")?);

            let opts = WalkOptions {
                threads: parse_threads(&threads),
                include_private,
                max_snapshot_size: max_file_size,
                module_config: modules,
            };
            let stats = walk_and_write(&input, &mut out, &opts).context("walk and write failed")?;
            out.flush().ok();

            info!(
                files_walked = stats.files_walked,
                files_skipped = stats.files_skipped,
                rules_reported = stats.rules_reported,
                matches_reported = stats.matches_reported,
                modules_bound = stats.modules_bound,
                "walk finished"
            );
        }
        Commands::Parse { input, output } => {
            let text = std::fs::read_to_string(&input).with_context(|| format!("read {}", input.display()))?;
            let rules = parse_output(&text).context("parse yara output")?;
            let mut out = BufWriter::new(File::create(&output).context("create output file")?);
            let n = write_reports(&rules, &mut out)?;
            out.flush().ok();
            info!(rules = n, ?output, "parse finished");
        }
        Commands::Bind { module, data } => {
            let mut import = ModuleImport::new(&module)?;
            let handle = bind(Some(import.as_raw_mut()), &data)
                .with_context(|| format!("bind {} to module {module}", data.display()))?;
            info!(module = import.name(), path = %handle.path().display(), size = handle.len(), "module data bound");
            println!("{}\t{}\t{}", import.name(), handle.path().display(), handle.len());
            unbind(Some(handle));
        }
    }

    Ok(())
}

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, FmtSubscriber};
    // 支持通过环境变量 RUST_LOG 控制日志等级，如：RUST_LOG=debug
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder().with_env_filter(env_filter).finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// 解析线程参数
fn parse_threads(s: &str) -> Option<usize> {
    if s.eq_ignore_ascii_case("auto") { return None; }
    match s.parse::<usize>() {
        Ok(n) if n >= 1 => Some(n),
        _ => None,
    }
}
