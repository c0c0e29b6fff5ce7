use std::sync::LazyLock;

use prometheus::*;

use crate::validator::ValidationRecord;

static METRIC_VALIDATION_COUNT: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "imcheck_validation_count",
        "count of completed validations",
        &["overall"]
    )
    .unwrap()
});

static METRIC_VALIDATION_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    register_histogram_vec!(
        "imcheck_validation_duration",
        "duration of the per-asset validation in seconds",
        &["overall"]
    )
    .unwrap()
});

static METRIC_VALUE: LazyLock<HistogramVec> = LazyLock::new(|| {
    register_histogram_vec!(
        "imcheck_metric_value",
        "similarity metric value of the per-asset validation",
        &["metric"],
        (1..=20).map(|x| x as f64 * 0.05).collect()
    )
    .unwrap()
});

/// 记录一次完成的校验
pub fn observe_validation(record: &ValidationRecord, duration: f32) {
    let overall = record.overall().as_str();

    METRIC_VALIDATION_COUNT.with_label_values(&[overall]).inc();
    METRIC_VALIDATION_DURATION.with_label_values(&[overall]).observe(duration as f64);
    for (metric, value) in record.metrics().iter() {
        METRIC_VALUE.with_label_values(&[metric.as_str()]).observe(value);
    }
}

/// 将当前进程的指标推送到 pushgateway
///
/// `auth` 格式为 `username:password`
pub fn push(url: &str, instance: &str, auth: Option<&str>) -> Result<()> {
    let auth = auth.and_then(|s| {
        s.split_once(':').map(|(username, password)| BasicAuthentication {
            username: username.to_string(),
            password: password.to_string(),
        })
    });
    push_metrics(
        "imcheck",
        labels! {
            "instance".to_string() => instance.to_string(),
        },
        url,
        gather(),
        auth,
    )
}
