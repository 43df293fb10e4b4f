use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand};
use serde_json::Value;

use ruchain::result::Outcome;
use ruchain::runner::{ExecutionReporter, ExecutionSchedule, ExecutionScheduler, SchedulingConfig};
use ruchain::variable::Session;

pub type Result<T> = std::result::Result<T, anyhow::Error>;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 执行计划文件 (.json / .toml)
    Run(RunArgs),
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// 计划文件路径
    pub path: PathBuf,

    /// 以 JSON 输出完整执行结果
    #[arg(long)]
    pub json: bool,

    /// 并行执行调用链
    #[arg(long)]
    pub parallel: bool,

    /// 工作池大小（最小 5）
    #[arg(long)]
    pub threads: Option<usize>,

    /// 请求集合重复轮数
    #[arg(long)]
    pub iterations: Option<usize>,

    /// 具名传输层
    #[arg(long)]
    pub transport: Option<String>,

    /// 不执行断言
    #[arg(long)]
    pub skip_assertions: bool,

    /// 显示全部断言和响应内容
    #[arg(short, long)]
    pub verbose: bool,

    /// 覆盖环境变量 KEY=VALUE，可重复
    #[arg(long = "var", value_name = "KEY=VALUE", value_parser = parse_var)]
    pub vars: Vec<(String, String)>,
}

impl RunArgs {
    pub fn scheduling_config(&self) -> SchedulingConfig {
        let defaults = SchedulingConfig::default();
        SchedulingConfig {
            transport: self.transport.clone(),
            parallel: self.parallel,
            thread_count: self.threads.unwrap_or(defaults.thread_count),
            iterations: self.iterations.unwrap_or(defaults.iterations),
            run_assertions: !self.skip_assertions,
        }
    }

    /// `--var` 写入环境变量，优先级最高
    pub fn apply_vars(&self, schedule: &mut ExecutionSchedule) {
        for (key, value) in &self.vars {
            schedule
                .environment
                .vars
                .insert(key.clone(), Value::String(value.clone()));
        }
    }
}

fn parse_var(s: &str) -> std::result::Result<(String, String), String> {
    Session::parse_var(s).ok_or_else(|| format!("无效的变量参数 '{}'，应为 KEY=VALUE", s))
}

/// 执行计划，返回执行是否成功
pub async fn run(args: RunArgs) -> Result<bool> {
    let mut schedule = ExecutionSchedule::from_path(&args.path)
        .with_context(|| format!("无法加载计划文件 {}", args.path.display()))?;
    args.apply_vars(&mut schedule);

    let scheduler = ExecutionScheduler::new(args.scheduling_config())?;
    let reporter = ExecutionReporter::new(args.verbose);

    if !args.json {
        reporter.print_header(&schedule, &args.path.display().to_string());
    }

    let result = scheduler.execute(schedule).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        reporter.print_result(&result);
        reporter.print_summary(&result);
    }

    Ok(result.is_successful())
}
