//! 中心线预测批量评估: 逐对计算指标, 聚合, 按组筛选训练配置并输出报告.
//!
//! 参数见 [`utils::loader`].

use std::process::ExitCode;

use utils::loader::RunConfig;

mod report;
mod runner;

fn main() -> ExitCode {
    if let Err(e) = simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Info)
        .env()
        .init()
    {
        eprintln!("logger: {e}");
    }

    let cfg = match RunConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            log::error!("invalid configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    println!("Evaluating experiment `{}`...", cfg.experiment);
    let report = match runner::run(&cfg) {
        Ok(r) => r,
        Err(e) => {
            log::error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    utils::sep();
    if let Err(e) = report.analyze() {
        log::error!("writing report: {e}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
