//! 呼吸门控 4D 体数据的低秩 + 稀疏分解流水线.

use std::error::Error;

use clap::Parser;
use log::LevelFilter;
use simple_logger::SimpleLogger;
use utils::config::{read_config_file, PipelineConfig};

mod cli;
mod report;
mod runner;

fn main() -> Result<(), Box<dyn Error>> {
    let args = cli::Cli::parse();

    let level = if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    SimpleLogger::new().with_level(level).init()?;

    let config = match &args.config {
        Some(path) => {
            log::info!("读取配置文件 `{}`", path.display());
            read_config_file(path)?
        }
        None => PipelineConfig::default(),
    };

    runner::run(&config, args.command)
}
