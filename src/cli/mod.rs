mod batch;
mod compare;
mod thresholds;
mod validate;

pub use batch::*;
pub use compare::*;
pub use thresholds::*;
pub use validate::*;

use crate::config::{Opts, Settings};

pub trait SubCommandExtend {
    fn run(
        &self,
        opts: &Opts,
        settings: &Settings,
    ) -> impl std::future::Future<Output = anyhow::Result<()>> + Send;
}
