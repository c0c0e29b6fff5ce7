use std::collections::BTreeMap;
use std::fmt;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// 参与校验的相似度指标
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// 结构相似度
    Ssim,
    /// 颜色直方图相关性
    ColorMatch,
    /// 边缘重合度 (IoU)
    EdgeAccuracy,
}

impl Metric {
    pub const ALL: [Metric; 3] = [Metric::Ssim, Metric::ColorMatch, Metric::EdgeAccuracy];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ssim => "ssim",
            Self::ColorMatch => "color_match",
            Self::EdgeAccuracy => "edge_accuracy",
        }
    }

    /// 报告中展示的名称
    pub fn label(&self) -> &'static str {
        match self {
            Self::Ssim => "SSIM (Structural Similarity)",
            Self::ColorMatch => "Color Match",
            Self::EdgeAccuracy => "Edge Accuracy",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Ssim => "Measures structural similarity between images (0-1, higher is better)",
            Self::ColorMatch => "Measures color histogram similarity (0-1, higher is better)",
            Self::EdgeAccuracy => "Measures similarity of edge features (0-1, higher is better)",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 一次比较得到的全部指标，取值均在 [0, 1] 之间
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetricSet(BTreeMap<Metric, f64>);

impl MetricSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// 插入一个指标值
    ///
    /// NaN 视为计算错误；超出 [0, 1] 的值（例如负相关）被截断到边界
    pub fn insert(&mut self, metric: Metric, value: f64) -> Result<()> {
        if value.is_nan() {
            return Err(Error::Computation { metric, reason: "结果为 NaN".to_string() });
        }
        let clamped = value.clamp(0.0, 1.0);
        if clamped != value {
            warn!("指标 {metric} 的值 {value} 超出 [0, 1]，截断为 {clamped}");
        }
        self.0.insert(metric, clamped);
        Ok(())
    }

    pub fn from_values(values: impl IntoIterator<Item = (Metric, f64)>) -> Result<Self> {
        let mut set = Self::new();
        for (metric, value) in values {
            set.insert(metric, value)?;
        }
        Ok(set)
    }

    pub fn get(&self, metric: Metric) -> Option<f64> {
        self.0.get(&metric).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Metric, f64)> + '_ {
        self.0.iter().map(|(metric, value)| (*metric, *value))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// 评级，顺序为 reject < acceptable < excellent
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Reject,
    Acceptable,
    Excellent,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::Reject, Tier::Acceptable, Tier::Excellent];

    /// 按两个阈值对指标值分级
    pub fn classify(value: f64, threshold: &MetricThreshold) -> Self {
        if value < threshold.reject {
            Self::Reject
        } else if value < threshold.acceptable {
            Self::Acceptable
        } else {
            Self::Excellent
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reject => "reject",
            Self::Acceptable => "acceptable",
            Self::Excellent => "excellent",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 单个指标的阈值，低于 `reject` 为 reject，不低于 `acceptable` 为 excellent
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricThreshold {
    pub reject: f64,
    pub acceptable: f64,
}

impl MetricThreshold {
    pub fn new(reject: f64, acceptable: f64) -> Self {
        Self { reject, acceptable }
    }

    fn validate(&self, metric: Metric) -> Result<()> {
        if !self.reject.is_finite() || !self.acceptable.is_finite() {
            return Err(Error::Configuration(format!("{metric} 的阈值必须是有限数值")));
        }
        if self.reject >= self.acceptable {
            return Err(Error::Configuration(format!(
                "{metric} 的 reject 阈值 ({}) 必须小于 acceptable 阈值 ({})",
                self.reject, self.acceptable
            )));
        }
        Ok(())
    }
}

/// 各指标的阈值配置，进程启动时加载一次
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThresholdConfig(BTreeMap<Metric, MetricThreshold>);

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self(BTreeMap::from([
            (Metric::Ssim, MetricThreshold::new(0.6, 0.8)),
            (Metric::ColorMatch, MetricThreshold::new(0.7, 0.9)),
            (Metric::EdgeAccuracy, MetricThreshold::new(0.75, 0.9)),
        ]))
    }
}

impl ThresholdConfig {
    /// 创建部分配置，只检查每一项阈值本身是否合法
    pub fn new(entries: impl IntoIterator<Item = (Metric, MetricThreshold)>) -> Result<Self> {
        let config = Self(entries.into_iter().collect());
        for (metric, threshold) in &config.0 {
            threshold.validate(*metric)?;
        }
        Ok(config)
    }

    /// 从 TOML 文本加载并完整校验
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(s).map_err(|e| Error::Configuration(format!("无法解析阈值配置: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string(self).map_err(|e| Error::Configuration(format!("无法序列化阈值配置: {e}")))
    }

    /// 校验全部阈值，并要求三个指标都有配置
    pub fn validate(&self) -> Result<()> {
        for (metric, threshold) in &self.0 {
            threshold.validate(*metric)?;
        }
        let missing: Vec<_> =
            Metric::ALL.iter().filter(|m| !self.0.contains_key(m)).map(|m| m.as_str()).collect();
        if !missing.is_empty() {
            return Err(Error::Configuration(format!("缺少指标阈值: {}", missing.join(", "))));
        }
        Ok(())
    }

    /// 用给定阈值覆盖对应指标，并重新校验
    pub fn with_overrides(
        mut self,
        overrides: impl IntoIterator<Item = (Metric, MetricThreshold)>,
    ) -> Result<Self> {
        self.0.extend(overrides);
        self.validate()?;
        Ok(self)
    }

    pub fn get(&self, metric: Metric) -> Option<&MetricThreshold> {
        self.0.get(&metric)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Metric, &MetricThreshold)> + '_ {
        self.0.iter().map(|(metric, threshold)| (*metric, threshold))
    }
}

/// 单个指标的评级结果
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricEvaluation {
    pub status: Tier,
    pub value: f64,
}

/// 全部指标的评级，`overall` 为其中最差的一级
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    #[serde(flatten)]
    metrics: BTreeMap<Metric, MetricEvaluation>,
    overall: Tier,
}

impl EvaluationResult {
    pub fn overall(&self) -> Tier {
        self.overall
    }

    pub fn get(&self, metric: Metric) -> Option<&MetricEvaluation> {
        self.metrics.get(&metric)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Metric, &MetricEvaluation)> + '_ {
        self.metrics.iter().map(|(metric, evaluation)| (*metric, evaluation))
    }
}

/// 按阈值对指标分级
///
/// 只处理同时出现在 `metrics` 和 `config` 中的指标，没有任何指标可分级时返回配置错误
pub fn evaluate(metrics: &MetricSet, config: &ThresholdConfig) -> Result<EvaluationResult> {
    let evaluations: BTreeMap<_, _> = metrics
        .iter()
        .filter_map(|(metric, value)| {
            let threshold = config.get(metric)?;
            Some((metric, MetricEvaluation { status: Tier::classify(value, threshold), value }))
        })
        .collect();

    let overall = evaluations
        .values()
        .map(|evaluation| evaluation.status)
        .min()
        .ok_or_else(|| Error::Configuration("阈值配置中没有任何可用于分级的指标".to_string()))?;

    Ok(EvaluationResult { metrics: evaluations, overall })
}
