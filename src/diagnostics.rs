//! 供人工检查的诊断图，不参与指标计算

use log::debug;
use opencv::core::{self, CV_8UC1, CV_8UC3, Mat, Point, Scalar, Vector};
use opencv::imgproc;
use opencv::prelude::*;

use crate::comparator::ImagePair;
use crate::config::RunDir;
use crate::similarity;
use crate::utils;

const TITLE_HEIGHT: i32 = 28;
const GAP: i32 = 8;
const PLOT_HEIGHT: i32 = 120;
const COLOR_BAR_WIDTH: i32 = 24;

const CHANNELS: [(&str, (f64, f64, f64)); 3] =
    [("Blue", (255.0, 0.0, 0.0)), ("Green", (0.0, 160.0, 0.0)), ("Red", (0.0, 0.0, 255.0))];

/// 写出全部四张诊断图
pub fn write_all(pair: &ImagePair, run_dir: &RunDir) -> opencv::Result<()> {
    utils::imwrite(&run_dir.side_by_side(), &side_by_side_panel(pair)?)?;
    utils::imwrite(&run_dir.edge_comparison(), &edge_panel(pair)?)?;
    utils::imwrite(&run_dir.histogram_comparison(), &histogram_panel(pair)?)?;
    utils::imwrite(&run_dir.difference(), &difference_heat_map(pair)?)?;
    debug!("诊断图已写入 {}", run_dir.path().display());
    Ok(())
}

/// 生成图与参考图并排
pub fn side_by_side_panel(pair: &ImagePair) -> opencv::Result<Mat> {
    let left = titled(pair.generated(), "Generated Asset")?;
    let right = titled(pair.reference(), "Reference Asset")?;
    hstack(&left, &right)
}

/// 两张图的 Canny 边缘图并排
pub fn edge_panel(pair: &ImagePair) -> opencv::Result<Mat> {
    let left = titled(&similarity::edge_map(pair.generated())?, "Generated Asset Edges")?;
    let right = titled(&similarity::edge_map(pair.reference())?, "Reference Asset Edges")?;
    hstack(&left, &right)
}

/// 三行两列的通道直方图，左列为生成图，右列为参考图
pub fn histogram_panel(pair: &ImagePair) -> opencv::Result<Mat> {
    let mut rows = Vector::<Mat>::new();
    for (channel, (name, color)) in CHANNELS.iter().enumerate() {
        let color = Scalar::new(color.0, color.1, color.2, 0.0);
        let left = histogram_plot(
            pair.generated(),
            channel as i32,
            color,
            &format!("Generated Asset - {name} Channel"),
        )?;
        let right = histogram_plot(
            pair.reference(),
            channel as i32,
            color,
            &format!("Reference Asset - {name} Channel"),
        )?;
        rows.push(hstack(&left, &right)?);
    }
    let mut output = Mat::default();
    core::vconcat(&rows, &mut output)?;
    Ok(output)
}

fn histogram_plot(img: &Mat, channel: i32, color: Scalar, title: &str) -> opencv::Result<Mat> {
    let hist = similarity::channel_histogram(img, channel)?;
    let counts = hist.data_typed::<f32>()?;
    let max = counts.iter().copied().fold(0.0f32, f32::max).max(1.0);

    let mut canvas =
        Mat::new_rows_cols_with_default(PLOT_HEIGHT, counts.len() as i32, CV_8UC3, Scalar::all(255.0))?;
    let curve: Vector<Point> = counts
        .iter()
        .enumerate()
        .map(|(bin, &count)| {
            let y = PLOT_HEIGHT - 1 - ((count / max) * (PLOT_HEIGHT - 1) as f32).round() as i32;
            Point::new(bin as i32, y)
        })
        .collect();
    let curves = Vector::<Vector<Point>>::from_iter([curve]);
    imgproc::polylines(&mut canvas, &curves, false, color, 1, imgproc::LINE_AA, 0)?;
    titled(&canvas, title)
}

/// 逐像素绝对差的热力图，右侧附带色标
pub fn difference_heat_map(pair: &ImagePair) -> opencv::Result<Mat> {
    let mut diff = Mat::default();
    core::absdiff(pair.generated(), pair.reference(), &mut diff)?;
    let diff = utils::to_gray(&diff)?;
    let mut heat = Mat::default();
    imgproc::apply_color_map(&diff, &mut heat, imgproc::COLORMAP_JET)?;

    let rows = heat.rows();
    let mut bar = Mat::new_rows_cols_with_default(rows, COLOR_BAR_WIDTH, CV_8UC1, Scalar::all(0.0))?;
    for r in 0..rows {
        // 顶部为最大差值
        let v = if rows > 1 { 255 - (r * 255 / (rows - 1)) } else { 255 };
        for c in 0..COLOR_BAR_WIDTH {
            *bar.at_2d_mut::<u8>(r, c)? = v as u8;
        }
    }
    let mut colored_bar = Mat::default();
    imgproc::apply_color_map(&bar, &mut colored_bar, imgproc::COLORMAP_JET)?;

    titled(&hstack(&heat, &colored_bar)?, "Difference Visualization")
}

/// 在图片上方加白色标题栏
fn titled(img: &Mat, title: &str) -> opencv::Result<Mat> {
    let img = utils::to_bgr(img)?;
    let mut output = Mat::default();
    core::copy_make_border(
        &img,
        &mut output,
        TITLE_HEIGHT,
        0,
        0,
        0,
        core::BORDER_CONSTANT,
        Scalar::all(255.0),
    )?;
    imgproc::put_text(
        &mut output,
        title,
        Point::new(4, TITLE_HEIGHT - 9),
        imgproc::FONT_HERSHEY_SIMPLEX,
        0.45,
        Scalar::all(0.0),
        1,
        imgproc::LINE_AA,
        false,
    )?;
    Ok(output)
}

/// 横向拼接，两图之间留白，高度不同时底部补白
fn hstack(left: &Mat, right: &Mat) -> opencv::Result<Mat> {
    let height = left.rows().max(right.rows());
    let left = pad(left, height - left.rows(), GAP)?;
    let right = pad(right, height - right.rows(), 0)?;
    let mut output = Mat::default();
    core::hconcat2(&left, &right, &mut output)?;
    Ok(output)
}

fn pad(img: &Mat, bottom: i32, right: i32) -> opencv::Result<Mat> {
    let mut output = Mat::default();
    core::copy_make_border(
        img,
        &mut output,
        0,
        bottom,
        0,
        right,
        core::BORDER_CONSTANT,
        Scalar::all(255.0),
    )?;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(rows: i32, cols: i32) -> ImagePair {
        let a = Mat::new_rows_cols_with_default(rows, cols, CV_8UC3, Scalar::new(0.0, 0.0, 255.0, 0.0))
            .unwrap();
        let b = Mat::new_rows_cols_with_default(rows, cols, CV_8UC3, Scalar::new(255.0, 0.0, 0.0, 0.0))
            .unwrap();
        ImagePair::new(a, b).unwrap()
    }

    #[test]
    fn test_panel_shapes() {
        let pair = pair(40, 30);

        let side = side_by_side_panel(&pair).unwrap();
        assert_eq!(side.rows(), 40 + TITLE_HEIGHT);
        assert_eq!(side.cols(), 30 * 2 + GAP);
        assert_eq!(side.channels(), 3);

        let edges = edge_panel(&pair).unwrap();
        assert_eq!(edges.rows(), side.rows());

        let hist = histogram_panel(&pair).unwrap();
        assert_eq!(hist.rows(), 3 * (PLOT_HEIGHT + TITLE_HEIGHT));
        assert_eq!(hist.cols(), 256 * 2 + GAP);

        let heat = difference_heat_map(&pair).unwrap();
        assert_eq!(heat.rows(), 40 + TITLE_HEIGHT);
        assert_eq!(heat.cols(), 30 + GAP + COLOR_BAR_WIDTH);
    }

    #[test]
    fn test_single_pixel_pair() {
        let pair = pair(1, 1);
        assert!(side_by_side_panel(&pair).is_ok());
        assert!(difference_heat_map(&pair).is_ok());
    }
}
