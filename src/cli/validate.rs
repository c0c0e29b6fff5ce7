use std::path::PathBuf;

use anyhow::bail;
use clap::Parser;
use serde_json::Value;
use tokio::task::block_in_place;

use crate::cli::SubCommandExtend;
use crate::config::{Opts, Settings};
use crate::evaluate::Tier;
use crate::validator::{AssetValidator, Metadata, ValidationRecord};

#[derive(Parser, Debug, Clone)]
pub struct ValidateCommand {
    /// 生成资源路径
    pub generated: PathBuf,
    /// 参考资源路径
    pub reference: PathBuf,
    /// 运行名称，不填则自动生成
    #[arg(short, long, value_name = "NAME")]
    pub name: Option<String>,
    /// 附加到校验记录中的元数据，可重复
    /// 例：--meta prompt='a knight' --meta seed=42
    #[arg(short, long = "meta", value_name = "KEY=VALUE", value_parser = parse_meta, verbatim_doc_comment)]
    pub metadata: Vec<(String, String)>,
    /// 通过外部校验服务校验，需要配置 API key
    #[arg(long, conflicts_with = "name")]
    pub external: bool,
    /// 外部校验服务的项目名称
    #[arg(long, value_name = "NAME", requires = "external")]
    pub project_name: Option<String>,
    /// 总体评级为 reject 时以非零状态退出
    #[arg(long)]
    pub fail_on_reject: bool,
}

fn parse_meta(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("元数据格式应为 KEY=VALUE: {s}")),
    }
}

impl ValidateCommand {
    fn metadata(&self) -> Option<Metadata> {
        if self.metadata.is_empty() {
            return None;
        }
        let metadata = self
            .metadata
            .iter()
            .map(|(key, value)| (key.clone(), Value::String(value.clone())))
            .collect();
        Some(metadata)
    }
}

impl SubCommandExtend for ValidateCommand {
    async fn run(&self, _opts: &Opts, settings: &Settings) -> anyhow::Result<()> {
        let validator = AssetValidator::new(settings.clone());
        let record = block_in_place(|| {
            if self.external {
                validator.validate_with_external_service(
                    &self.generated,
                    &self.reference,
                    self.project_name.as_deref(),
                    self.metadata(),
                )
            } else {
                validator.validate_asset(
                    &self.generated,
                    &self.reference,
                    self.name.as_deref(),
                    self.metadata(),
                )
            }
        })?;

        print_record(&record);

        if self.fail_on_reject && record.overall() == Tier::Reject {
            bail!("{} 的总体评级为 reject", record.validation_id());
        }
        Ok(())
    }
}

fn print_record(record: &ValidationRecord) {
    for (metric, evaluation) in record.pass_fail().iter() {
        println!("{:.4}\t{}\t{}", evaluation.value, metric, evaluation.status);
    }
    println!("overall\t{}", record.overall());
    if let Some(path) = record.report_path() {
        println!("report\t{}", path.display());
    }
}
