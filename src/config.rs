use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use clap::{Parser, Subcommand};
use directories::ProjectDirs;
use log::{debug, info};
use serde::Deserialize;

use crate::cli::*;
use crate::error::{Error, Result};
use crate::evaluate::{Metric, MetricThreshold, ThresholdConfig};

static PROJECT_DIRS: LazyLock<ProjectDirs> = LazyLock::new(|| {
    ProjectDirs::from("", "imcheck", "imcheck").expect("failed to get project dir")
});

static CONF_DIR: LazyLock<String> =
    LazyLock::new(|| PROJECT_DIRS.config_dir().to_string_lossy().into_owned());

fn default_config_dir() -> &'static str {
    CONF_DIR.as_str()
}

/// 默认的校验结果目录
pub fn default_validation_dir() -> PathBuf {
    PROJECT_DIRS.data_dir().join("validation")
}

#[derive(Parser, Debug, Clone)]
#[command(name = "imcheck", version)]
pub struct Opts {
    #[command(subcommand)]
    pub subcmd: SubCommand,
    /// 配置文件目录，会读取其中的 imcheck.toml
    #[arg(short, long, default_value = default_config_dir())]
    pub conf_dir: PathBuf,
    /// 校验结果输出目录，优先于配置文件
    #[arg(short = 'o', long, value_name = "DIR")]
    pub validation_dir: Option<PathBuf>,
    /// 外部校验服务的 API key
    #[arg(long, value_name = "KEY", env = "IMCHECK_EXTERNAL_API_KEY", hide_env_values = true)]
    pub external_api_key: Option<String>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum SubCommand {
    /// 比较两张图片并输出相似度指标
    Compare(CompareCommand),
    /// 校验生成资源，保存校验记录和报告
    Validate(ValidateCommand),
    /// 批量校验目录中的生成资源
    Batch(BatchCommand),
    /// 输出当前生效的阈值配置
    Thresholds(ThresholdsCommand),
}

/// 配置文件格式，所有字段均可省略
#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    validation_dir: Option<PathBuf>,
    external_api_key: Option<String>,
    #[serde(default)]
    thresholds: BTreeMap<Metric, MetricThreshold>,
}

/// 进程级配置，在启动时构造一次并传给各组件
#[derive(Debug, Clone)]
pub struct Settings {
    pub validation_dir: PathBuf,
    pub external_api_key: Option<String>,
    pub thresholds: ThresholdConfig,
}

impl Settings {
    pub fn new(validation_dir: impl Into<PathBuf>) -> Self {
        Self {
            validation_dir: validation_dir.into(),
            external_api_key: None,
            thresholds: ThresholdConfig::default(),
        }
    }

    pub fn with_thresholds(mut self, thresholds: ThresholdConfig) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn with_external_api_key(mut self, key: impl Into<String>) -> Self {
        self.external_api_key = Some(key.into());
        self
    }

    /// 读取配置目录中的 imcheck.toml，文件不存在时使用默认配置
    pub fn load(conf_dir: &Path) -> Result<Self> {
        let path = conf_dir.join("imcheck.toml");
        if !path.exists() {
            debug!("配置文件 {} 不存在，使用默认配置", path.display());
            return Ok(Self::new(default_validation_dir()));
        }

        info!("读取配置文件: {}", path.display());
        let invalid = |reason: String| Error::ConfigFile { path: path.clone(), reason };
        let text = fs::read_to_string(&path).map_err(|e| invalid(e.to_string()))?;
        Self::from_toml_str(&text).map_err(|e| match e {
            Error::InvalidSetting(reason) => invalid(reason),
            other => other,
        })
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let file: SettingsFile =
            toml::from_str(text).map_err(|e| Error::InvalidSetting(e.to_string()))?;
        let thresholds =
            ThresholdConfig::default().with_overrides(file.thresholds).map_err(|e| match e {
                Error::Configuration(reason) => Error::InvalidSetting(reason),
                other => other,
            })?;
        Ok(Self {
            validation_dir: file.validation_dir.unwrap_or_else(default_validation_dir),
            external_api_key: file.external_api_key.filter(|key| !key.is_empty()),
            thresholds,
        })
    }

    /// 读取配置文件后应用命令行参数
    pub fn from_opts(opts: &Opts) -> Result<Self> {
        let mut settings = Self::load(&opts.conf_dir)?;
        if let Some(dir) = &opts.validation_dir {
            settings.validation_dir = dir.clone();
        }
        if let Some(key) = opts.external_api_key.as_ref().filter(|key| !key.is_empty()) {
            settings.external_api_key = Some(key.clone());
        }
        Ok(settings)
    }
}

pub const RESULTS_FILE: &str = "validation_results.json";
pub const REPORT_FILE: &str = "validation_report.html";
pub const SUMMARY_CHART_FILE: &str = "metrics_summary.png";
pub const SIDE_BY_SIDE_FILE: &str = "side_by_side_comparison.png";
pub const EDGE_COMPARISON_FILE: &str = "edge_comparison.png";
pub const HISTOGRAM_COMPARISON_FILE: &str = "histogram_comparison.png";
pub const DIFFERENCE_FILE: &str = "difference_visualization.png";

/// 单次校验的输出目录
#[derive(Debug, Clone)]
pub struct RunDir {
    path: PathBuf,
}

impl RunDir {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// 创建目录，已存在时不做任何事
    pub fn create(&self) -> Result<()> {
        fs::create_dir_all(&self.path).map_err(Error::persist(&self.path))
    }

    /// 返回校验记录文件的路径
    pub fn results(&self) -> PathBuf {
        self.path.join(RESULTS_FILE)
    }

    /// 返回校验记录临时文件的路径
    pub fn results_tmp(&self) -> PathBuf {
        self.path.join(format!("{RESULTS_FILE}.tmp"))
    }

    pub fn report(&self) -> PathBuf {
        self.path.join(REPORT_FILE)
    }

    pub fn summary_chart(&self) -> PathBuf {
        self.path.join(SUMMARY_CHART_FILE)
    }

    pub fn side_by_side(&self) -> PathBuf {
        self.path.join(SIDE_BY_SIDE_FILE)
    }

    pub fn edge_comparison(&self) -> PathBuf {
        self.path.join(EDGE_COMPARISON_FILE)
    }

    pub fn histogram_comparison(&self) -> PathBuf {
        self.path.join(HISTOGRAM_COMPARISON_FILE)
    }

    pub fn difference(&self) -> PathBuf {
        self.path.join(DIFFERENCE_FILE)
    }

    /// 返回全部诊断图的路径
    pub fn diagnostics(&self) -> [PathBuf; 4] {
        [self.side_by_side(), self.edge_comparison(), self.histogram_comparison(), self.difference()]
    }

    pub fn batch_report(&self) -> PathBuf {
        self.path.join("batch_report.html")
    }

    pub fn batch_summary(&self) -> PathBuf {
        self.path.join("batch_summary.json")
    }
}
