//! 三种相互独立的图片相似度指标
//!
//! 所有函数都要求输入两张尺寸相同的三通道 BGR 图片。

use ndarray::{Array2, ArrayView2};
use opencv::core::{self, Mat, Vector};
use opencv::imgproc;
use opencv::prelude::*;

use crate::utils;

/// SSIM 默认窗口边长
const SSIM_WIN_SIZE: usize = 7;
const SSIM_K1: f64 = 0.01;
const SSIM_K2: f64 = 0.03;
/// 8 位图片的取值范围
const DATA_RANGE: f64 = 255.0;

/// Canny 滞后阈值
pub const CANNY_LOW: f64 = 100.0;
pub const CANNY_HIGH: f64 = 200.0;

const HIST_BINS: i32 = 256;

/// 灰度图上的平均结构相似度
pub fn structural_similarity(a: &Mat, b: &Mat) -> opencv::Result<f64> {
    utils::ensure_same_size(a, b)?;
    let x = utils::gray_to_array(&utils::to_gray(a)?)?;
    let y = utils::gray_to_array(&utils::to_gray(b)?)?;
    Ok(ssim_gray(x.view(), y.view()))
}

/// 对两个同尺寸灰度矩阵计算平均 SSIM
///
/// 使用均匀窗口和样本协方差，只统计完全落在图片内部的窗口。
/// 图片小于默认窗口时，窗口缩小为不超过短边的最大奇数。调用方保证两者形状相同。
fn ssim_gray(x: ArrayView2<f64>, y: ArrayView2<f64>) -> f64 {
    assert_eq!(x.dim(), y.dim(), "ssim inputs must have the same shape");
    let (rows, cols) = x.dim();
    if rows == 0 || cols == 0 {
        return 1.0;
    }

    let win = window_size(rows, cols);
    let np = (win * win) as f64;
    let cov_norm = if win > 1 { np / (np - 1.0) } else { 1.0 };
    let c1 = (SSIM_K1 * DATA_RANGE).powi(2);
    let c2 = (SSIM_K2 * DATA_RANGE).powi(2);

    let sx = integral(x.iter().copied(), rows, cols);
    let sy = integral(y.iter().copied(), rows, cols);
    let sxx = integral(x.iter().map(|v| v * v), rows, cols);
    let syy = integral(y.iter().map(|v| v * v), rows, cols);
    let sxy = integral(x.iter().zip(y.iter()).map(|(a, b)| a * b), rows, cols);

    let mut total = 0.0;
    let mut count = 0usize;
    for i in 0..=rows - win {
        for j in 0..=cols - win {
            let ux = window_sum(&sx, i, j, win) / np;
            let uy = window_sum(&sy, i, j, win) / np;
            let uxx = window_sum(&sxx, i, j, win) / np;
            let uyy = window_sum(&syy, i, j, win) / np;
            let uxy = window_sum(&sxy, i, j, win) / np;

            let vx = cov_norm * (uxx - ux * ux);
            let vy = cov_norm * (uyy - uy * uy);
            let vxy = cov_norm * (uxy - ux * uy);

            let numerator = (2.0 * ux * uy + c1) * (2.0 * vxy + c2);
            let denominator = (ux * ux + uy * uy + c1) * (vx + vy + c2);
            total += numerator / denominator;
            count += 1;
        }
    }

    total / count as f64
}

fn window_size(rows: usize, cols: usize) -> usize {
    let win = SSIM_WIN_SIZE.min(rows).min(cols);
    if win % 2 == 0 { win - 1 } else { win }
}

/// 积分图，尺寸为 (rows + 1, cols + 1)
fn integral(values: impl Iterator<Item = f64>, rows: usize, cols: usize) -> Array2<f64> {
    let mut out = Array2::zeros((rows + 1, cols + 1));
    let mut values = values;
    for i in 0..rows {
        let mut row_sum = 0.0;
        for j in 0..cols {
            row_sum += values.next().unwrap_or_default();
            out[[i + 1, j + 1]] = out[[i, j + 1]] + row_sum;
        }
    }
    out
}

fn window_sum(table: &Array2<f64>, i: usize, j: usize, win: usize) -> f64 {
    table[[i + win, j + win]] - table[[i, j + win]] - table[[i + win, j]] + table[[i, j]]
}

/// 三个颜色通道直方图相关系数的平均值
///
/// 每个通道 256 个 bin，先做 min-max 归一化再计算 Pearson 相关系数。
/// 结果可能为负数，由调用方决定如何处理。
pub fn color_histogram_similarity(a: &Mat, b: &Mat) -> opencv::Result<f64> {
    utils::ensure_same_size(a, b)?;
    let mut total = 0.0;
    for channel in 0..3 {
        let hist_a = normalized_histogram(a, channel)?;
        let hist_b = normalized_histogram(b, channel)?;
        total += imgproc::compare_hist(&hist_a, &hist_b, imgproc::HISTCMP_CORREL)?;
    }
    Ok(total / 3.0)
}

/// 单通道 256 bin 直方图，数值为像素计数
pub fn channel_histogram(img: &Mat, channel: i32) -> opencv::Result<Mat> {
    let images = Vector::<Mat>::from_iter([img.try_clone()?]);
    let mut hist = Mat::default();
    imgproc::calc_hist(
        &images,
        &Vector::<i32>::from_iter([channel]),
        &Mat::default(),
        &mut hist,
        &Vector::<i32>::from_iter([HIST_BINS]),
        &Vector::<f32>::from_iter([0.0, 256.0]),
        false,
    )?;
    Ok(hist)
}

fn normalized_histogram(img: &Mat, channel: i32) -> opencv::Result<Mat> {
    let hist = channel_histogram(img, channel)?;
    let mut output = Mat::default();
    core::normalize(&hist, &mut output, 0.0, 1.0, core::NORM_MINMAX, -1, &Mat::default())?;
    Ok(output)
}

/// Canny 边缘图，边缘像素为 255
pub fn edge_map(img: &Mat) -> opencv::Result<Mat> {
    let gray = utils::to_gray(img)?;
    let mut edges = Mat::default();
    imgproc::canny(&gray, &mut edges, CANNY_LOW, CANNY_HIGH, 3, false)?;
    Ok(edges)
}

/// 两张边缘图的交并比
///
/// 两张图都没有检测到边缘时视为完全一致，返回 1.0
pub fn edge_overlap(a: &Mat, b: &Mat) -> opencv::Result<f64> {
    utils::ensure_same_size(a, b)?;
    let edges_a = edge_map(a)?;
    let edges_b = edge_map(b)?;

    let mut intersection = Mat::default();
    core::bitwise_and(&edges_a, &edges_b, &mut intersection, &Mat::default())?;
    let mut union = Mat::default();
    core::bitwise_or(&edges_a, &edges_b, &mut union, &Mat::default())?;

    let union = core::count_non_zero(&union)?;
    if union == 0 {
        return Ok(1.0);
    }
    let intersection = core::count_non_zero(&intersection)?;
    Ok(intersection as f64 / union as f64)
}

#[cfg(test)]
mod tests {
    use ndarray::{Array2, s};
    use opencv::core::{CV_8UC3, Rect, Scalar};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use rstest::rstest;

    use super::*;

    fn solid(rows: i32, cols: i32, bgr: (f64, f64, f64)) -> Mat {
        Mat::new_rows_cols_with_default(rows, cols, CV_8UC3, Scalar::new(bgr.0, bgr.1, bgr.2, 0.0))
            .unwrap()
    }

    /// 黑白棋盘格，边缘丰富
    fn checkerboard(rows: i32, cols: i32, cell: i32) -> Mat {
        let mut img = solid(rows, cols, (0.0, 0.0, 0.0));
        for r in (0..rows).step_by(cell as usize) {
            for c in (0..cols).step_by(cell as usize) {
                if (r / cell + c / cell) % 2 == 0 {
                    let rect = Rect::new(c, r, cell.min(cols - c), cell.min(rows - r));
                    imgproc::rectangle(&mut img, rect, Scalar::all(255.0), -1, imgproc::LINE_8, 0)
                        .unwrap();
                }
            }
        }
        img
    }

    fn gradient(rows: i32, cols: i32) -> Mat {
        let mut img = solid(rows, cols, (0.0, 0.0, 0.0));
        for r in 0..rows {
            for c in 0..cols {
                let v = ((r * 7 + c * 3) % 256) as u8;
                *img.at_2d_mut::<core::Vec3b>(r, c).unwrap() = core::VecN([v, 255 - v, v / 2]);
            }
        }
        img
    }

    #[rstest]
    #[case::solid(solid(64, 64, (0.0, 0.0, 255.0)))]
    #[case::checkerboard(checkerboard(64, 48, 8))]
    #[case::gradient(gradient(33, 21))]
    #[case::tiny(gradient(3, 5))]
    #[case::single_pixel(solid(1, 1, (10.0, 20.0, 30.0)))]
    fn test_identical_images_are_perfect(#[case] img: Mat) {
        assert_eq!(structural_similarity(&img, &img).unwrap(), 1.0);
        assert_eq!(edge_overlap(&img, &img).unwrap(), 1.0);
        assert!((color_histogram_similarity(&img, &img).unwrap() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_ssim_detects_structure_change() {
        let a = checkerboard(64, 64, 8);
        let b = checkerboard(64, 64, 16);
        let value = structural_similarity(&a, &b).unwrap();
        assert!(value < 0.9, "ssim = {value}");
    }

    #[test]
    fn test_ssim_small_images_do_not_panic() {
        for (rows, cols) in [(1, 7), (2, 2), (4, 9), (6, 6)] {
            let a = gradient(rows, cols);
            let b = solid(rows, cols, (128.0, 128.0, 128.0));
            let value = structural_similarity(&a, &b).unwrap();
            assert!(value.is_finite());
        }
    }

    /// 逐窗口直接计算的 SSIM，用中心化公式求方差
    fn ssim_direct(x: &Array2<f64>, y: &Array2<f64>) -> f64 {
        let (rows, cols) = x.dim();
        let win = window_size(rows, cols);
        let np = (win * win) as f64;
        let c1 = (SSIM_K1 * DATA_RANGE).powi(2);
        let c2 = (SSIM_K2 * DATA_RANGE).powi(2);

        let mut values = vec![];
        for i in 0..=rows - win {
            for j in 0..=cols - win {
                let wx = x.slice(s![i..i + win, j..j + win]);
                let wy = y.slice(s![i..i + win, j..j + win]);
                let ux = wx.sum() / np;
                let uy = wy.sum() / np;
                let dx = wx.mapv(|v| v - ux);
                let dy = wy.mapv(|v| v - uy);
                let vx = (&dx * &dx).sum() / (np - 1.0);
                let vy = (&dy * &dy).sum() / (np - 1.0);
                let vxy = (&dx * &dy).sum() / (np - 1.0);
                values.push(
                    ((2.0 * ux * uy + c1) * (2.0 * vxy + c2))
                        / ((ux * ux + uy * uy + c1) * (vx + vy + c2)),
                );
            }
        }
        values.iter().sum::<f64>() / values.len() as f64
    }

    fn random_gray(rng: &mut StdRng, rows: usize, cols: usize) -> Array2<f64> {
        Array2::from_shape_fn((rows, cols), |_| rng.random_range(0..=255u8) as f64)
    }

    #[rstest]
    #[case(20, 30)]
    #[case(64, 64)]
    #[case(7, 7)]
    #[case(100, 37)]
    #[case(5, 6)]
    fn test_ssim_matches_direct_windows_on_noise(#[case] rows: usize, #[case] cols: usize) {
        let mut rng = StdRng::seed_from_u64((rows * 1000 + cols) as u64);
        let x = random_gray(&mut rng, rows, cols);
        let y = random_gray(&mut rng, rows, cols);

        let fast = ssim_gray(x.view(), y.view());
        let direct = ssim_direct(&x, &y);
        assert!((fast - direct).abs() < 1e-10, "{rows}x{cols}: {fast} vs {direct}");
    }

    #[rstest]
    #[case(32, 32)]
    #[case(5, 6)]
    fn test_ssim_matches_direct_windows_on_structure(#[case] rows: usize, #[case] cols: usize) {
        let x = Array2::from_shape_fn((rows, cols), |(r, c)| ((r * 7 + c * 3) % 256) as f64);
        let y = Array2::from_shape_fn((rows, cols), |(r, c)| {
            if (r / 4 + c / 4) % 2 == 0 { 255.0 } else { ((r * c) % 97) as f64 }
        });

        let fast = ssim_gray(x.view(), y.view());
        let direct = ssim_direct(&x, &y);
        assert!((fast - direct).abs() < 1e-10, "{rows}x{cols}: {fast} vs {direct}");
    }

    #[test]
    fn test_ssim_sample_covariance_on_step() {
        // 单个 3x3 窗口: x 为 0..9, y = 2x
        let x = Array2::from_shape_fn((3, 3), |(r, c)| (r * 3 + c) as f64);
        let y = x.mapv(|v| 2.0 * v);
        let c1 = (SSIM_K1 * DATA_RANGE).powi(2);
        let c2 = (SSIM_K2 * DATA_RANGE).powi(2);
        // 均值 4 和 8, 样本方差 7.5 和 30, 样本协方差 15
        let expected = ((2.0 * 4.0 * 8.0 + c1) * (2.0 * 15.0 + c2))
            / ((16.0 + 64.0 + c1) * (7.5 + 30.0 + c2));
        assert!((ssim_gray(x.view(), y.view()) - expected).abs() < 1e-12);
    }

    #[test]
    fn test_ssim_window_size() {
        assert_eq!(window_size(100, 100), 7);
        assert_eq!(window_size(6, 100), 5);
        assert_eq!(window_size(3, 2), 1);
        assert_eq!(window_size(1, 1), 1);
    }

    #[test]
    fn test_ssim_gray_uniform_offset() {
        let x = Array2::from_elem((16, 16), 100.0);
        let y = Array2::from_elem((16, 16), 50.0);
        let c1 = (SSIM_K1 * DATA_RANGE).powi(2);
        let expected = (2.0 * 100.0 * 50.0 + c1) / (100.0f64.powi(2) + 50.0f64.powi(2) + c1);
        assert!((ssim_gray(x.view(), y.view()) - expected).abs() < 1e-12);
    }

    #[test]
    fn test_edge_overlap_solid_colors() {
        let red = solid(64, 64, (0.0, 0.0, 255.0));
        let blue = solid(64, 64, (255.0, 0.0, 0.0));
        assert_eq!(edge_overlap(&red, &blue).unwrap(), 1.0);
    }

    #[test]
    fn test_edge_overlap_edges_vs_none() {
        let board = checkerboard(64, 64, 8);
        let flat = solid(64, 64, (0.0, 0.0, 0.0));
        assert_eq!(edge_overlap(&board, &flat).unwrap(), 0.0);
    }

    #[test]
    fn test_color_histogram_is_symmetric() {
        let a = gradient(40, 40);
        let b = checkerboard(40, 40, 5);
        let ab = color_histogram_similarity(&a, &b).unwrap();
        let ba = color_histogram_similarity(&b, &a).unwrap();
        assert!((ab - ba).abs() < 1e-12);
    }

    #[test]
    fn test_color_histogram_disjoint_colors() {
        let red = solid(64, 64, (0.0, 0.0, 255.0));
        let blue = solid(64, 64, (255.0, 0.0, 0.0));
        let value = color_histogram_similarity(&red, &blue).unwrap();
        // 只有绿色通道一致，另外两个通道接近 0 相关
        assert!(value < 0.4, "color_match = {value}");
    }

    #[test]
    fn test_mismatched_sizes_fail() {
        let a = solid(10, 10, (0.0, 0.0, 0.0));
        let b = solid(10, 12, (0.0, 0.0, 0.0));
        assert!(structural_similarity(&a, &b).is_err());
        assert!(color_histogram_similarity(&a, &b).is_err());
        assert!(edge_overlap(&a, &b).is_err());
    }
}
