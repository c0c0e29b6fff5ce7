use std::path::Path;

use indicatif::ProgressStyle;
use ndarray::Array2;
use opencv::core::{self, Mat, Size, Vector};
use opencv::prelude::*;
use opencv::{imgcodecs, imgproc};

/// 以三通道 BGR 读取图片，alpha 通道会被丢弃
///
/// 文件不存在或无法解码时返回 `None`
pub fn imread(path: &Path) -> opencv::Result<Option<Mat>> {
    let img = imgcodecs::imread(&path.to_string_lossy(), imgcodecs::IMREAD_COLOR)?;
    if img.empty() {
        return Ok(None);
    }
    Ok(Some(img))
}

pub fn imwrite(path: &Path, img: &impl core::ToInputArray) -> opencv::Result<()> {
    let flags = Vector::<i32>::new();
    if !imgcodecs::imwrite(&path.to_string_lossy(), img, &flags)? {
        return Err(opencv::Error::new(
            core::StsError,
            format!("无法写入图片: {}", path.display()),
        ));
    }
    Ok(())
}

/// 使用区域插值缩放到指定尺寸
pub fn resize_area(img: &Mat, size: Size) -> opencv::Result<Mat> {
    let mut output = Mat::default();
    imgproc::resize(img, &mut output, size, 0.0, 0.0, imgproc::INTER_AREA)?;
    Ok(output)
}

/// BGR 转灰度，单通道图片原样复制
pub fn to_gray(img: &Mat) -> opencv::Result<Mat> {
    if img.channels() == 1 {
        return img.try_clone();
    }
    let mut output = Mat::default();
    imgproc::cvt_color_def(img, &mut output, imgproc::COLOR_BGR2GRAY)?;
    Ok(output)
}

/// 灰度转三通道，便于与彩色图片拼接
pub fn to_bgr(img: &Mat) -> opencv::Result<Mat> {
    if img.channels() == 3 {
        return img.try_clone();
    }
    let mut output = Mat::default();
    imgproc::cvt_color_def(img, &mut output, imgproc::COLOR_GRAY2BGR)?;
    Ok(output)
}

/// 将 8 位单通道图片转换为浮点矩阵
pub fn gray_to_array(gray: &Mat) -> opencv::Result<Array2<f64>> {
    let (rows, cols) = (gray.rows() as usize, gray.cols() as usize);
    let owned;
    let gray = if gray.is_continuous() {
        gray
    } else {
        owned = gray.try_clone()?;
        &owned
    };
    let data = gray.data_typed::<u8>()?.iter().map(|&v| v as f64).collect();
    Array2::from_shape_vec((rows, cols), data)
        .map_err(|e| opencv::Error::new(core::StsBadSize, e.to_string()))
}

/// 检查两张图片尺寸是否一致
pub fn ensure_same_size(a: &Mat, b: &Mat) -> opencv::Result<()> {
    if a.size()? != b.size()? || a.channels() != b.channels() {
        return Err(opencv::Error::new(
            core::StsUnmatchedSizes,
            format!(
                "图片尺寸不一致: {}x{}x{} vs {}x{}x{}",
                a.cols(),
                a.rows(),
                a.channels(),
                b.cols(),
                b.rows(),
                b.channels()
            ),
        ));
    }
    Ok(())
}

pub fn pb_style() -> ProgressStyle {
    ProgressStyle::with_template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
        .expect("failed to build progress style")
        .progress_chars("##-")
}
