use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use opencv::core::{CV_8UC3, Mat, Point, Rect, Scalar};
use opencv::imgproc;
use serde::{Deserialize, Serialize};

use crate::config::{
    DIFFERENCE_FILE, EDGE_COMPARISON_FILE, HISTOGRAM_COMPARISON_FILE, RunDir, SIDE_BY_SIDE_FILE,
    SUMMARY_CHART_FILE,
};
use crate::error::{Error, Result};
use crate::evaluate::{Metric, MetricSet, ThresholdConfig, Tier};
use crate::utils;
use crate::validator::ValidationRecord;

/// 根据校验记录生成可读报告
pub trait ValidationReporter: Send + Sync {
    /// 生成报告并返回报告路径
    fn render(
        &self,
        record: &ValidationRecord,
        generated: &Path,
        reference: &Path,
        output_dir: &Path,
    ) -> Result<PathBuf>;
}

/// HTML 报告，附带指标柱状图
pub struct HtmlReporter {
    thresholds: ThresholdConfig,
}

impl HtmlReporter {
    pub fn new(thresholds: ThresholdConfig) -> Self {
        Self { thresholds }
    }
}

impl ValidationReporter for HtmlReporter {
    fn render(
        &self,
        record: &ValidationRecord,
        _generated: &Path,
        _reference: &Path,
        output_dir: &Path,
    ) -> Result<PathBuf> {
        let run_dir = RunDir::new(output_dir);
        run_dir.create()?;

        let report_path = run_dir.report();
        fs::write(&report_path, render_html(record))
            .map_err(|e| Error::Report(format!("{}: {e}", report_path.display())))?;

        let chart = summary_chart(record.metrics(), &self.thresholds)
            .map_err(|e| Error::Report(format!("无法绘制指标图: {e}")))?;
        utils::imwrite(&run_dir.summary_chart(), &chart)
            .map_err(|e| Error::Report(format!("无法保存指标图: {e}")))?;

        Ok(report_path)
    }
}

const STYLE: &str = r#"
body { font-family: 'Segoe UI', Tahoma, Geneva, Verdana, sans-serif; line-height: 1.6; color: #333; max-width: 1200px; margin: 0 auto; padding: 20px; }
h1, h2, h3 { color: #2c3e50; }
.report-header { background-color: #f8f9fa; padding: 20px; border-radius: 5px; margin-bottom: 30px; border-left: 5px solid #007bff; }
.status-excellent { color: #28a745; font-weight: bold; }
.status-acceptable { color: #ffc107; font-weight: bold; }
.status-reject { color: #dc3545; font-weight: bold; }
.metrics-table { width: 100%; border-collapse: collapse; margin: 20px 0; }
.metrics-table th, .metrics-table td { padding: 12px 15px; border: 1px solid #ddd; text-align: left; }
.metrics-table th { background-color: #f8f9fa; }
.metrics-table tr:nth-child(even) { background-color: #f2f2f2; }
.full-width-image { width: 100%; margin: 20px 0; box-shadow: 0 4px 6px rgba(0,0,0,0.1); }
.full-width-image img { max-width: 100%; display: block; }
.full-width-image h3 { background-color: #f8f9fa; margin: 0; padding: 10px; border-bottom: 1px solid #ddd; }
footer { margin-top: 50px; padding-top: 20px; border-top: 1px solid #eee; text-align: center; font-size: 14px; color: #777; }
"#;

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn status_cell(tier: Tier) -> String {
    format!(r#"<td class="status-{tier}">{}</td>"#, tier.as_str().to_uppercase())
}

/// 渲染单次校验的 HTML 报告
pub fn render_html(record: &ValidationRecord) -> String {
    let metadata = record.metadata();
    let timestamp = metadata.timestamp.to_rfc3339();
    let overall = record.overall();

    let mut html = String::new();
    let _ = write!(
        html,
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>Asset Validation Report</title>
<style>{STYLE}</style>
</head>
<body>
<div class="report-header">
<h1>Game Asset Validation Report</h1>
<p><strong>Validation ID:</strong> {id}</p>
<p><strong>Generated:</strong> {timestamp}</p>
<p><strong>Overall Status:</strong> <span class="status-{overall}">{overall_upper}</span></p>
</div>
<h2>Asset Information</h2>
<p><strong>Generated Asset:</strong> {generated}</p>
<p><strong>Reference Asset:</strong> {reference}</p>
"#,
        id = escape(&metadata.validation_id),
        overall_upper = overall.as_str().to_uppercase(),
        generated = escape(&metadata.generated_asset),
        reference = escape(&metadata.reference_asset),
    );

    if !metadata.extra.is_empty() {
        html.push_str("<h2>Metadata</h2>\n<ul>\n");
        for (key, value) in &metadata.extra {
            let value = match value {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            let _ = writeln!(html, "<li><strong>{}:</strong> {}</li>", escape(key), escape(&value));
        }
        html.push_str("</ul>\n");
    }

    html.push_str(
        "<h2>Validation Metrics</h2>\n<table class=\"metrics-table\">\n<thead><tr><th>Metric</th><th>Value</th><th>Status</th><th>Description</th></tr></thead>\n<tbody>\n",
    );
    for (metric, evaluation) in record.pass_fail().iter() {
        let _ = writeln!(
            html,
            "<tr><td>{}</td><td>{:.3}</td>{}<td>{}</td></tr>",
            metric.label(),
            evaluation.value,
            status_cell(evaluation.status),
            metric.description()
        );
    }
    html.push_str("</tbody>\n</table>\n");

    if let Some(external) = record.external_service() {
        let crate::validator::ExternalService::NotIntegrated { project_name } = external;
        let _ = writeln!(
            html,
            "<h2>External Validation</h2>\n<p>Project <strong>{}</strong>: the external service is not integrated, metrics above come from the local comparison.</p>",
            escape(project_name)
        );
    }

    for (section, caption, file) in [
        ("Metrics Summary", "Metric Scores", SUMMARY_CHART_FILE),
        ("Side by Side Comparison", "Generated vs. Reference", SIDE_BY_SIDE_FILE),
        ("Edge Detection", "Edge Comparison", EDGE_COMPARISON_FILE),
        ("Color Distribution", "Color Histogram Comparison", HISTOGRAM_COMPARISON_FILE),
        ("Difference Visualization", "Pixel Differences", DIFFERENCE_FILE),
    ] {
        let _ = writeln!(
            html,
            "<h2>{section}</h2>\n<div class=\"full-width-image\">\n<h3>{caption}</h3>\n<img src=\"{file}\" alt=\"{caption}\">\n</div>"
        );
    }

    let _ = write!(
        html,
        "<footer>\n<p>Game Asset Validation System | Generated on {timestamp}</p>\n</footer>\n</body>\n</html>\n"
    );
    html
}

const CHART_WIDTH: i32 = 640;
const CHART_HEIGHT: i32 = 400;
const CHART_MARGIN: i32 = 48;
const BAR_COLORS: [(f64, f64, f64); 3] =
    [(219.0, 152.0, 52.0), (113.0, 204.0, 46.0), (60.0, 76.0, 231.0)];

/// 指标柱状图，每根柱子上标出该指标的 reject / acceptable 阈值
pub fn summary_chart(metrics: &MetricSet, thresholds: &ThresholdConfig) -> opencv::Result<Mat> {
    let mut canvas =
        Mat::new_rows_cols_with_default(CHART_HEIGHT, CHART_WIDTH, CV_8UC3, Scalar::all(255.0))?;
    let plot_height = (CHART_HEIGHT - 2 * CHART_MARGIN) as f64;
    let baseline = CHART_HEIGHT - CHART_MARGIN;
    let y_of = |value: f64| baseline - (value.clamp(0.0, 1.0) * plot_height).round() as i32;

    let black = Scalar::all(0.0);
    imgproc::put_text(
        &mut canvas,
        "Validation Metrics Summary",
        Point::new(CHART_MARGIN, CHART_MARGIN / 2 + 6),
        imgproc::FONT_HERSHEY_SIMPLEX,
        0.6,
        black,
        1,
        imgproc::LINE_AA,
        false,
    )?;
    imgproc::line(
        &mut canvas,
        Point::new(CHART_MARGIN, baseline),
        Point::new(CHART_WIDTH - CHART_MARGIN, baseline),
        black,
        1,
        imgproc::LINE_8,
        0,
    )?;

    let count = metrics.len().max(1) as i32;
    let slot = (CHART_WIDTH - 2 * CHART_MARGIN) / count;
    let bar_width = slot / 2;

    for (i, (metric, value)) in metrics.iter().enumerate() {
        let left = CHART_MARGIN + slot * i as i32 + (slot - bar_width) / 2;
        let (b, g, r) = BAR_COLORS[i % BAR_COLORS.len()];
        let top = y_of(value);
        imgproc::rectangle(
            &mut canvas,
            Rect::new(left, top, bar_width, (baseline - top).max(1)),
            Scalar::new(b, g, r, 0.0),
            -1,
            imgproc::LINE_8,
            0,
        )?;

        if let Some(threshold) = thresholds.get(metric) {
            for (cutoff, color) in [
                (threshold.reject, Scalar::new(0.0, 0.0, 200.0, 0.0)),
                (threshold.acceptable, Scalar::new(0.0, 160.0, 0.0, 0.0)),
            ] {
                let y = y_of(cutoff);
                imgproc::line(
                    &mut canvas,
                    Point::new(left - 6, y),
                    Point::new(left + bar_width + 6, y),
                    color,
                    1,
                    imgproc::LINE_AA,
                    0,
                )?;
            }
        }

        imgproc::put_text(
            &mut canvas,
            &format!("{value:.3}"),
            Point::new(left, top - 6),
            imgproc::FONT_HERSHEY_SIMPLEX,
            0.45,
            black,
            1,
            imgproc::LINE_AA,
            false,
        )?;
        imgproc::put_text(
            &mut canvas,
            metric.as_str(),
            Point::new(left, baseline + 20),
            imgproc::FONT_HERSHEY_SIMPLEX,
            0.45,
            black,
            1,
            imgproc::LINE_AA,
            false,
        )?;
    }

    Ok(canvas)
}

/// 批量校验中单个资源的摘要
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchEntry {
    pub validation_id: String,
    pub generated_asset: String,
    pub reference_asset: String,
    pub metrics: MetricSet,
    pub overall: Tier,
    pub report_path: Option<PathBuf>,
}

/// 批量校验中失败的资源
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchFailure {
    pub generated: PathBuf,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub counts: BTreeMap<Tier, usize>,
    pub validations: Vec<BatchEntry>,
    pub failures: Vec<BatchFailure>,
}

impl BatchSummary {
    pub fn new(records: &[ValidationRecord], failures: Vec<BatchFailure>) -> Self {
        let mut counts: BTreeMap<Tier, usize> = Tier::ALL.iter().map(|tier| (*tier, 0)).collect();
        let validations = records
            .iter()
            .map(|record| {
                *counts.entry(record.overall()).or_default() += 1;
                let metadata = record.metadata();
                BatchEntry {
                    validation_id: metadata.validation_id.clone(),
                    generated_asset: metadata.generated_asset.clone(),
                    reference_asset: metadata.reference_asset.clone(),
                    metrics: record.metrics().clone(),
                    overall: record.overall(),
                    report_path: record.report_path().map(Path::to_path_buf),
                }
            })
            .collect();
        Self { total: records.len() + failures.len(), counts, validations, failures }
    }
}

/// 生成批量校验报告，返回 HTML 报告路径
pub fn render_batch(summary: &BatchSummary, output_dir: &Path) -> Result<PathBuf> {
    let run_dir = RunDir::new(output_dir);
    run_dir.create()?;

    let json = serde_json::to_vec_pretty(summary)?;
    fs::write(run_dir.batch_summary(), json).map_err(Error::persist(run_dir.batch_summary()))?;

    let mut html = String::new();
    let _ = write!(
        html,
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"UTF-8\">\n<title>Batch Validation Report</title>\n<style>{STYLE}</style>\n</head>\n<body>\n<div class=\"report-header\">\n<h1>Batch Validation Report</h1>\n<p><strong>Assets:</strong> {}</p>\n",
        summary.total
    );
    for (tier, count) in &summary.counts {
        let _ = writeln!(
            html,
            "<p><span class=\"status-{tier}\">{}</span>: {count}</p>",
            tier.as_str().to_uppercase()
        );
    }
    let _ = writeln!(html, "<p><span class=\"status-reject\">ERROR</span>: {}</p>\n</div>", summary.failures.len());

    html.push_str("<table class=\"metrics-table\">\n<thead><tr><th>Generated</th><th>Reference</th>");
    for metric in Metric::ALL {
        let _ = write!(html, "<th>{}</th>", metric.label());
    }
    html.push_str("<th>Overall</th><th>Report</th></tr></thead>\n<tbody>\n");

    for entry in &summary.validations {
        let _ = write!(
            html,
            "<tr><td>{}</td><td>{}</td>",
            escape(&entry.generated_asset),
            escape(&entry.reference_asset)
        );
        for metric in Metric::ALL {
            match entry.metrics.get(metric) {
                Some(value) => {
                    let _ = write!(html, "<td>{value:.3}</td>");
                }
                None => html.push_str("<td>-</td>"),
            }
        }
        html.push_str(&status_cell(entry.overall));
        match &entry.report_path {
            Some(path) => {
                let link = path
                    .strip_prefix(output_dir.parent().unwrap_or(output_dir))
                    .map(|p| Path::new("..").join(p))
                    .unwrap_or_else(|_| path.clone());
                let _ = writeln!(
                    html,
                    "<td><a href=\"{}\">{}</a></td></tr>",
                    escape(&link.to_string_lossy()),
                    escape(&entry.validation_id)
                );
            }
            None => html.push_str("<td>-</td></tr>\n"),
        }
    }
    html.push_str("</tbody>\n</table>\n");

    if !summary.failures.is_empty() {
        html.push_str("<h2>Failures</h2>\n<ul>\n");
        for failure in &summary.failures {
            let _ = writeln!(
                html,
                "<li>{}: {}</li>",
                escape(&failure.generated.to_string_lossy()),
                escape(&failure.error)
            );
        }
        html.push_str("</ul>\n");
    }

    let _ = write!(
        html,
        "<footer>\n<p>Game Asset Validation System | Generated on {}</p>\n</footer>\n</body>\n</html>\n",
        Local::now().to_rfc3339()
    );

    let report_path = run_dir.batch_report();
    fs::write(&report_path, html)
        .map_err(|e| Error::Report(format!("{}: {e}", report_path.display())))?;
    Ok(report_path)
}
