use clap::Parser;

use crate::cli::SubCommandExtend;
use crate::config::{Opts, Settings};

#[derive(Parser, Debug, Clone)]
pub struct ThresholdsCommand {}

impl SubCommandExtend for ThresholdsCommand {
    async fn run(&self, _opts: &Opts, settings: &Settings) -> anyhow::Result<()> {
        print!("{}", settings.thresholds.to_toml_string()?);
        Ok(())
    }
}
