use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::evaluate::Metric;

/// 校验流程的各个阶段，用于定位错误发生的位置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Config,
    Load,
    Compare,
    Evaluate,
    Persist,
    Report,
    External,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Config => "config",
            Self::Load => "load",
            Self::Compare => "compare",
            Self::Evaluate => "evaluate",
            Self::Persist => "persist",
            Self::Report => "report",
            Self::External => "external",
        };
        f.write_str(name)
    }
}

/// 输入资源的角色
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Asset {
    Generated,
    Reference,
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Generated => f.write_str("生成资源"),
            Self::Reference => f.write_str("参考资源"),
        }
    }
}

#[derive(Error, Debug)]
pub enum Error {
    /// 输入文件不存在或无法解码
    #[error("{asset}不存在或无法解码: {}", path.display())]
    NotFound { asset: Asset, path: PathBuf },

    /// 阈值配置缺失或无效
    #[error("配置错误: {0}")]
    Configuration(String),

    /// 运行名称、配置项等设置无效
    #[error("配置错误: {0}")]
    InvalidSetting(String),

    /// 调用外部服务但未配置凭据
    #[error("配置错误: 未提供 {0}")]
    MissingCredential(&'static str),

    /// 配置文件无法读取或解析
    #[error("配置文件 {} 无效: {reason}", path.display())]
    ConfigFile { path: PathBuf, reason: String },

    /// 某个指标计算失败，不返回部分结果
    #[error("指标 {metric} 计算失败: {reason}")]
    Computation { metric: Metric, reason: String },

    /// 图片解码后的预处理失败
    #[error("图片处理失败: {0}")]
    Image(#[source] opencv::Error),

    /// 诊断图生成失败
    #[error("诊断图生成失败: {0}")]
    Diagnostics(#[source] opencv::Error),

    #[error("无法写入 {}: {source}", path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("校验记录序列化失败: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("报告生成失败: {0}")]
    Report(String),

    /// 尚未接入的功能，不能伪造成功结果
    #[error("尚未实现: {0}")]
    NotImplemented(&'static str),
}

impl Error {
    /// 返回出错的阶段
    pub fn stage(&self) -> Stage {
        match self {
            Self::NotFound { .. } | Self::Image(_) => Stage::Load,
            Self::Configuration(_) => Stage::Evaluate,
            Self::ConfigFile { .. } | Self::InvalidSetting(_) => Stage::Config,
            Self::Computation { .. } | Self::Diagnostics(_) => Stage::Compare,
            Self::Persist { .. } | Self::Serialize(_) => Stage::Persist,
            Self::Report(_) => Stage::Report,
            Self::MissingCredential(_) | Self::NotImplemented(_) => Stage::External,
        }
    }

    /// 是否属于配置类错误
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_)
                | Self::InvalidSetting(_)
                | Self::MissingCredential(_)
                | Self::ConfigFile { .. }
        )
    }

    pub(crate) fn computation(metric: Metric) -> impl FnOnce(opencv::Error) -> Self {
        move |e| Self::Computation { metric, reason: e.to_string() }
    }

    pub(crate) fn persist(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Self::Persist { path, source }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
