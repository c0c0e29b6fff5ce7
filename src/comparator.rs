use std::path::Path;

use log::debug;
use opencv::core::{Mat, Size};
use opencv::prelude::*;

use crate::config::RunDir;
use crate::diagnostics;
use crate::error::{Asset, Error, Result};
use crate::evaluate::{Metric, MetricSet};
use crate::similarity;
use crate::utils;

/// 已加载且尺寸一致的一对图片
///
/// **注意：比较不对称。** 两张图片尺寸不同时，参考图会被缩放到生成图的尺寸，
/// 生成图的尺寸始终是权威尺寸。交换参数顺序会改变缩放目标，进而改变指标值。
pub struct ImagePair {
    generated: Mat,
    reference: Mat,
    reference_resized: bool,
}

impl ImagePair {
    /// 读取两张图片，必要时将参考图缩放到生成图的尺寸
    pub fn load(generated: &Path, reference: &Path) -> Result<Self> {
        let generated = read_asset(generated, Asset::Generated)?;
        let reference = read_asset(reference, Asset::Reference)?;
        Self::new(generated, reference)
    }

    pub fn new(generated: Mat, reference: Mat) -> Result<Self> {
        let target = generated.size().map_err(Error::Image)?;
        let source = reference.size().map_err(Error::Image)?;
        if target == source {
            return Ok(Self { generated, reference, reference_resized: false });
        }

        debug!(
            "参考图尺寸 {}x{} 与生成图 {}x{} 不一致，缩放参考图",
            source.width, source.height, target.width, target.height
        );
        let reference = utils::resize_area(&reference, target).map_err(Error::Image)?;
        Ok(Self { generated, reference, reference_resized: true })
    }

    /// 比较时使用的公共尺寸，即生成图的尺寸
    pub fn size(&self) -> Size {
        Size::new(self.generated.cols(), self.generated.rows())
    }

    pub fn reference_resized(&self) -> bool {
        self.reference_resized
    }

    pub fn generated(&self) -> &Mat {
        &self.generated
    }

    pub fn reference(&self) -> &Mat {
        &self.reference
    }
}

fn read_asset(path: &Path, asset: Asset) -> Result<Mat> {
    let not_found = || Error::NotFound { asset, path: path.to_path_buf() };
    if !path.is_file() {
        return Err(not_found());
    }
    // OpenCV 解码失败也按找不到处理
    utils::imread(path).ok().flatten().ok_or_else(not_found)
}

/// 对生成图和参考图计算全部相似度指标
#[derive(Debug, Default, Clone)]
pub struct ImageComparator;

impl ImageComparator {
    pub fn new() -> Self {
        Self
    }

    /// 比较两张图片
    ///
    /// 给出 `diagnostics_dir` 时，会在指标计算成功后把四张诊断图写入该目录
    pub fn compare(
        &self,
        generated: &Path,
        reference: &Path,
        diagnostics_dir: Option<&Path>,
    ) -> Result<MetricSet> {
        let pair = ImagePair::load(generated, reference)?;
        let metrics = self.compare_pair(&pair)?;

        if let Some(dir) = diagnostics_dir {
            let run_dir = RunDir::new(dir);
            run_dir.create()?;
            diagnostics::write_all(&pair, &run_dir).map_err(Error::Diagnostics)?;
        }

        Ok(metrics)
    }

    /// 对已加载的图片对计算指标，任意一项失败都不返回部分结果
    pub fn compare_pair(&self, pair: &ImagePair) -> Result<MetricSet> {
        let (a, b) = (pair.generated(), pair.reference());
        let ssim = similarity::structural_similarity(a, b).map_err(Error::computation(Metric::Ssim))?;
        let color = similarity::color_histogram_similarity(a, b)
            .map_err(Error::computation(Metric::ColorMatch))?;
        let edge =
            similarity::edge_overlap(a, b).map_err(Error::computation(Metric::EdgeAccuracy))?;

        debug!("ssim = {ssim:.4}, color_match = {color:.4}, edge_accuracy = {edge:.4}");

        MetricSet::from_values([
            (Metric::Ssim, ssim),
            (Metric::ColorMatch, color),
            (Metric::EdgeAccuracy, edge),
        ])
    }
}
