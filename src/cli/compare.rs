use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use serde_json::json;
use tokio::task::block_in_place;

use crate::cli::SubCommandExtend;
use crate::comparator::ImageComparator;
use crate::config::{Opts, Settings};
use crate::evaluate::{EvaluationResult, MetricSet, evaluate};

#[derive(Parser, Debug, Clone)]
pub struct CompareCommand {
    /// 生成资源路径，比较在该图片的尺寸上进行
    pub generated: PathBuf,
    /// 参考资源路径
    pub reference: PathBuf,
    /// 诊断图输出目录，不填则不生成
    #[arg(short, long, value_name = "DIR")]
    pub diagnostics: Option<PathBuf>,
    /// 输出格式
    #[arg(long, value_name = "FORMAT", default_value = "table")]
    pub output_format: OutputFormat,
}

impl SubCommandExtend for CompareCommand {
    async fn run(&self, _opts: &Opts, settings: &Settings) -> anyhow::Result<()> {
        let comparator = ImageComparator::new();
        let metrics = block_in_place(|| {
            comparator.compare(&self.generated, &self.reference, self.diagnostics.as_deref())
        })?;
        let evaluation = evaluate(&metrics, &settings.thresholds)?;

        print_result(&metrics, &evaluation, &self.output_format)
    }
}

fn print_result(
    metrics: &MetricSet,
    evaluation: &EvaluationResult,
    format: &OutputFormat,
) -> Result<()> {
    match format {
        OutputFormat::Json => {
            let output = json!({ "metrics": metrics, "pass_fail": evaluation });
            println!("{}", serde_json::to_string_pretty(&output)?)
        }
        OutputFormat::Table => {
            for (metric, value) in metrics.iter() {
                match evaluation.get(metric) {
                    Some(e) => println!("{:.4}\t{}\t{}", value, metric, e.status),
                    None => println!("{:.4}\t{}", value, metric),
                }
            }
            println!("overall\t{}", evaluation.overall());
        }
    }
    Ok(())
}

#[derive(ValueEnum, Debug, Clone)]
pub enum OutputFormat {
    Json,
    Table,
}
