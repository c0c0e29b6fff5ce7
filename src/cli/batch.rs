use std::path::{Path, PathBuf};

use anyhow::anyhow;
use clap::Parser;
use indicatif::{ParallelProgressIterator, ProgressBar};
use log::{error, info, warn};
use rayon::prelude::*;
use regex::Regex;
use tokio::task::{block_in_place, spawn_blocking};
use walkdir::WalkDir;

use crate::cli::SubCommandExtend;
use crate::config::{Opts, RunDir, Settings};
use crate::evaluate::Tier;
use crate::metrics;
use crate::report::{BatchFailure, BatchSummary, render_batch};
use crate::utils::pb_style;
use crate::validator::{AssetValidator, ValidationRecord, check_run_name, generate_run_name};

#[derive(Parser, Debug, Clone)]
pub struct BatchCommand {
    /// 生成资源所在目录
    pub generated_dir: PathBuf,
    /// 参考资源所在目录，按相对路径与生成资源配对
    pub reference_dir: PathBuf,
    /// 扫描的文件后缀名，多个后缀用逗号分隔
    #[arg(short, long, default_value = "jpg,png")]
    pub suffix: String,
    /// 批量报告的运行名称，不填则自动生成
    #[arg(short, long, value_name = "NAME")]
    pub name: Option<String>,
    /// prometheus 主动推送地址，全部校验完成后推送一次
    #[arg(long, value_name = "URL")]
    pub prometheus_push: Option<String>,
    /// 自定义 instance 标签值
    #[arg(long, value_name = "NAME", default_value = "imcheck")]
    pub prometheus_instance: String,
    /// prometheus 认证信息，格式为 username:password
    #[arg(long, value_name = "AUTH")]
    pub prometheus_auth: Option<String>,
}

impl BatchCommand {
    /// 扫描生成资源，返回 (生成资源, 参考资源) 对
    fn scan(&self, re_suf: &Regex) -> Vec<(PathBuf, PathBuf)> {
        let mut pairs: Vec<_> = WalkDir::new(&self.generated_dir)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| {
                re_suf.is_match(&entry.path().extension().unwrap_or_default().to_string_lossy())
            })
            .filter_map(|entry| {
                let relative = entry.path().strip_prefix(&self.generated_dir).ok()?;
                Some((entry.path().to_path_buf(), self.reference_dir.join(relative)))
            })
            .collect();
        pairs.sort();
        pairs
    }
}

impl SubCommandExtend for BatchCommand {
    async fn run(&self, _opts: &Opts, settings: &Settings) -> anyhow::Result<()> {
        let re_suf = format!("(?i)^({})$", self.suffix.replace(',', "|"));
        let re_suf = Regex::new(&re_suf).map_err(|e| anyhow!("无效的后缀: {e}"))?;

        let run_name = match &self.name {
            Some(name) => {
                check_run_name(name)?;
                name.clone()
            }
            None => generate_run_name("batch"),
        };
        let run_dir = RunDir::new(settings.validation_dir.join(&run_name));

        info!("开始扫描目录: {}", self.generated_dir.display());
        let pairs = self.scan(&re_suf);
        info!("扫描完成，共 {} 个生成资源", pairs.len());

        let validator = AssetValidator::new(settings.clone());
        let results = block_in_place(|| {
            let pb = ProgressBar::new(pairs.len() as u64)
                .with_style(pb_style())
                .with_message("校验中...");
            let results: Vec<_> = pairs
                .into_par_iter()
                .progress_with(pb.clone())
                .map(|(generated, reference)| {
                    let result = validate_pair(&validator, &generated, &reference);
                    (generated, result)
                })
                .collect();
            pb.finish_with_message("校验完成");
            results
        });

        let mut records = vec![];
        let mut failures = vec![];
        for (generated, result) in results {
            match result {
                Ok(record) => records.push(record),
                Err(e) => {
                    warn!("{}: {e}", generated.display());
                    failures.push(BatchFailure { generated, error: e.to_string() });
                }
            }
        }

        let summary = BatchSummary::new(&records, failures);
        let report_path = block_in_place(|| render_batch(&summary, run_dir.path()))?;

        for tier in Tier::ALL {
            println!("{}\t{}", tier, summary.counts.get(&tier).copied().unwrap_or_default());
        }
        println!("error\t{}", summary.failures.len());
        println!("report\t{}", report_path.display());

        if let Some(url) = self.prometheus_push.clone() {
            let instance = self.prometheus_instance.clone();
            let auth = self.prometheus_auth.clone();
            let r = spawn_blocking(move || metrics::push(&url, &instance, auth.as_deref())).await?;
            if let Err(e) = r {
                error!("推送指标失败: {e}");
            }
        }

        Ok(())
    }
}

fn validate_pair(
    validator: &AssetValidator,
    generated: &Path,
    reference: &Path,
) -> crate::Result<ValidationRecord> {
    validator.validate_asset(generated, reference, None, None)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn test_scan_pairs_by_relative_path() {
        let generated = tempfile::tempdir().unwrap();
        let reference = tempfile::tempdir().unwrap();
        fs::create_dir(generated.path().join("sprites")).unwrap();
        fs::write(generated.path().join("a.PNG"), b"").unwrap();
        fs::write(generated.path().join("sprites/b.jpg"), b"").unwrap();
        fs::write(generated.path().join("notes.txt"), b"").unwrap();

        let command = BatchCommand {
            generated_dir: generated.path().to_path_buf(),
            reference_dir: reference.path().to_path_buf(),
            suffix: "jpg,png".to_string(),
            name: None,
            prometheus_push: None,
            prometheus_instance: "imcheck".to_string(),
            prometheus_auth: None,
        };
        let re_suf = Regex::new("(?i)^(jpg|png)$").unwrap();
        let pairs = command.scan(&re_suf);

        assert_eq!(
            pairs,
            vec![
                (generated.path().join("a.PNG"), reference.path().join("a.PNG")),
                (generated.path().join("sprites/b.jpg"), reference.path().join("sprites/b.jpg")),
            ]
        );
    }
}
