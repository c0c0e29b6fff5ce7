use std::fs;
use std::path::{Component, Path, PathBuf};
use std::time::Instant;

use chrono::{DateTime, Local};
use log::{info, warn};
use rand::distr::{Alphanumeric, SampleString};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::comparator::ImageComparator;
use crate::config::{RunDir, Settings};
use crate::error::{Asset, Error, Result};
use crate::evaluate::{EvaluationResult, MetricSet, Tier, evaluate};
use crate::metrics;
use crate::report::{HtmlReporter, ValidationReporter};

/// 调用方元数据中不可覆盖的字段
pub const RESERVED_METADATA_KEYS: [&str; 4] =
    ["validation_id", "timestamp", "generated_asset", "reference_asset"];

/// 外部校验服务未指定项目时使用的名称
pub const DEFAULT_PROJECT_NAME: &str = "Game Asset Evaluation";

/// 调用方可传入的自由元数据
pub type Metadata = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordMetadata {
    pub validation_id: String,
    pub timestamp: DateTime<Local>,
    /// 生成资源的文件名
    pub generated_asset: String,
    /// 参考资源的文件名
    pub reference_asset: String,
    #[serde(flatten)]
    pub extra: Metadata,
}

impl RecordMetadata {
    fn new(validation_id: String, generated: &Path, reference: &Path, extra: Metadata) -> Self {
        let mut extra = extra;
        for key in RESERVED_METADATA_KEYS {
            if extra.remove(key).is_some() {
                warn!("元数据字段 {key} 为保留字段，已忽略调用方传入的值");
            }
        }
        Self {
            validation_id,
            timestamp: Local::now(),
            generated_asset: basename(generated),
            reference_asset: basename(reference),
            extra,
        }
    }
}

fn basename(path: &Path) -> String {
    path.file_name().map(|name| name.to_string_lossy().into_owned()).unwrap_or_default()
}

/// 外部校验服务的接入状态
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "integration", rename_all = "snake_case")]
pub enum ExternalService {
    /// 远程调用尚未实现，记录中的指标全部来自本地比较
    NotIntegrated { project_name: String },
}

impl ExternalService {
    /// 获取外部服务给出的评级
    pub fn require_remote_verdict(&self) -> Result<Tier> {
        match self {
            Self::NotIntegrated { .. } => Err(Error::NotImplemented("外部校验服务")),
        }
    }
}

/// 记录所处的阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordState {
    /// 指标和评级已填充
    Computed,
    /// 报告路径已附加
    Reported,
}

/// 单次校验的完整记录，创建后不再修改
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationRecord {
    metadata: RecordMetadata,
    metrics: MetricSet,
    pass_fail: EvaluationResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    report_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    external_service: Option<ExternalService>,
}

impl ValidationRecord {
    /// 读取已保存的校验记录
    pub fn read(path: &Path) -> Result<Self> {
        let data = fs::read(path).map_err(Error::persist(path))?;
        Ok(serde_json::from_slice(&data)?)
    }

    pub fn metadata(&self) -> &RecordMetadata {
        &self.metadata
    }

    pub fn validation_id(&self) -> &str {
        &self.metadata.validation_id
    }

    pub fn metrics(&self) -> &MetricSet {
        &self.metrics
    }

    pub fn pass_fail(&self) -> &EvaluationResult {
        &self.pass_fail
    }

    pub fn overall(&self) -> Tier {
        self.pass_fail.overall()
    }

    pub fn report_path(&self) -> Option<&Path> {
        self.report_path.as_deref()
    }

    pub fn external_service(&self) -> Option<&ExternalService> {
        self.external_service.as_ref()
    }

    pub fn state(&self) -> RecordState {
        match self.report_path {
            Some(_) => RecordState::Reported,
            None => RecordState::Computed,
        }
    }

    fn reported(self, report_path: PathBuf) -> Self {
        Self { report_path: Some(report_path), ..self }
    }
}

/// 生成运行名称：前缀 + 时间戳 + 8 位随机后缀
pub fn generate_run_name(prefix: &str) -> String {
    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    let suffix = Alphanumeric.sample_string(&mut rand::rng(), 8).to_lowercase();
    format!("{prefix}_{timestamp}_{suffix}")
}

pub(crate) fn check_run_name(name: &str) -> Result<()> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(Error::InvalidSetting(format!("无效的运行名称: {name:?}"))),
    }
}

/// 校验流程入口：比较、分级、生成报告并保存记录
pub struct AssetValidator {
    settings: Settings,
    comparator: ImageComparator,
    reporter: Box<dyn ValidationReporter>,
}

impl AssetValidator {
    pub fn new(settings: Settings) -> Self {
        let reporter = HtmlReporter::new(settings.thresholds.clone());
        Self { settings, comparator: ImageComparator::new(), reporter: Box::new(reporter) }
    }

    /// 替换报告生成器
    pub fn with_reporter(mut self, reporter: impl ValidationReporter + 'static) -> Self {
        self.reporter = Box::new(reporter);
        self
    }

    /// 返回指定运行名称的输出目录
    pub fn run_dir(&self, run_name: &str) -> RunDir {
        RunDir::new(self.settings.validation_dir.join(run_name))
    }

    /// 校验生成资源
    ///
    /// # Arguments
    ///
    /// * `generated` - 生成资源路径，其尺寸决定比较尺寸
    /// * `reference` - 参考资源路径
    /// * `run_name` - 运行名称，省略时自动生成
    /// * `metadata` - 附加到记录中的元数据
    pub fn validate_asset(
        &self,
        generated: &Path,
        reference: &Path,
        run_name: Option<&str>,
        metadata: Option<Metadata>,
    ) -> Result<ValidationRecord> {
        let run_name = run_name.map(str::to_owned);
        self.run(generated, reference, run_name, metadata.unwrap_or_default(), None)
    }

    /// 通过外部校验服务校验
    ///
    /// 远程调用尚未接入：需要配置 API key，实际指标来自本地比较，
    /// 记录中会标明 `external_service.integration = "not_integrated"`
    pub fn validate_with_external_service(
        &self,
        generated: &Path,
        reference: &Path,
        project_name: Option<&str>,
        metadata: Option<Metadata>,
    ) -> Result<ValidationRecord> {
        if self.settings.external_api_key.is_none() {
            return Err(Error::MissingCredential("外部校验服务 API key"));
        }
        warn!("外部校验服务尚未接入，结果仅来自本地比较");

        let external = ExternalService::NotIntegrated {
            project_name: project_name.unwrap_or(DEFAULT_PROJECT_NAME).to_string(),
        };
        let run_name = generate_run_name("external");
        self.run(generated, reference, Some(run_name), metadata.unwrap_or_default(), Some(external))
    }

    fn run(
        &self,
        generated: &Path,
        reference: &Path,
        run_name: Option<String>,
        metadata: Metadata,
        external_service: Option<ExternalService>,
    ) -> Result<ValidationRecord> {
        let start = Instant::now();

        for (asset, path) in [(Asset::Generated, generated), (Asset::Reference, reference)] {
            if !path.exists() {
                return Err(Error::NotFound { asset, path: path.to_path_buf() });
            }
        }

        let run_name = run_name.unwrap_or_else(|| generate_run_name("validation"));
        check_run_name(&run_name)?;
        let run_dir = self.run_dir(&run_name);
        info!("开始校验 {}: {} vs {}", run_name, generated.display(), reference.display());

        let metrics = self.comparator.compare(generated, reference, Some(run_dir.path()))?;
        let pass_fail = evaluate(&metrics, &self.settings.thresholds)?;

        let record = ValidationRecord {
            metadata: RecordMetadata::new(run_name, generated, reference, metadata),
            metrics,
            pass_fail,
            report_path: None,
            external_service,
        };

        let report_path = self.reporter.render(&record, generated, reference, run_dir.path())?;
        let record = record.reported(report_path);
        persist(&record, &run_dir)?;

        let elapsed = start.elapsed().as_secs_f32();
        metrics::observe_validation(&record, elapsed);
        info!(
            "校验完成 {}: {}，耗时 {:.2}s",
            record.validation_id(),
            record.overall(),
            elapsed
        );

        Ok(record)
    }
}

/// 写入临时文件后重命名，避免留下不完整的记录
fn persist(record: &ValidationRecord, run_dir: &RunDir) -> Result<PathBuf> {
    let tmp_file = run_dir.results_tmp();
    let path = run_dir.results();
    let data = serde_json::to_vec_pretty(record)?;
    fs::write(&tmp_file, data).map_err(Error::persist(&tmp_file))?;
    if let Err(e) = fs::rename(&tmp_file, &path) {
        let _ = fs::remove_file(&tmp_file);
        return Err(Error::persist(&path)(e));
    }
    Ok(path)
}
