use clap::Parser;
use env_logger::Env;

use imcheck::cli::SubCommandExtend;
use imcheck::config::{Opts, Settings, SubCommand};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let opts = Opts::parse();
    let settings = Settings::from_opts(&opts)?;

    match &opts.subcmd {
        SubCommand::Compare(config) => config.run(&opts, &settings).await,
        SubCommand::Validate(config) => config.run(&opts, &settings).await,
        SubCommand::Batch(config) => config.run(&opts, &settings).await,
        SubCommand::Thresholds(config) => config.run(&opts, &settings).await,
    }
}
