pub mod cli;
pub mod comparator;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod evaluate;
mod metrics;
pub mod report;
pub mod similarity;
pub mod utils;
pub mod validator;

pub use comparator::{ImageComparator, ImagePair};
pub use config::{Opts, Settings};
pub use error::{Error, Result, Stage};
pub use evaluate::{EvaluationResult, Metric, MetricSet, ThresholdConfig, Tier, evaluate};
pub use report::{HtmlReporter, ValidationReporter};
pub use validator::{AssetValidator, ValidationRecord};
